//! Trainable data-driven attribution model.
//!
//! A logistic-regression-style weighting over per-touchpoint channel and
//! position features, fit against historical journey outcomes. Trained
//! parameters are an immutable, versioned value swapped in atomically on a
//! successful run: inference clones the active `Arc` and computes without
//! holding any lock, and a failed or interrupted run leaves the previous
//! parameters in force.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::Array1;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use attribution_core::error::{AttribResult, AttributionError};
use attribution_core::types::{Channel, JourneyOutcome, Touchpoint};

/// Channel one-hot slots + is_first + is_last + position ratio + recency + bias.
pub const FEATURE_DIM: usize = Channel::FEATURE_SLOTS + 5;

/// Days over which the recency feature saturates.
const RECENCY_HORIZON_DAYS: f64 = 30.0;

/// One immutable, versioned parameter set produced by a training run.
pub struct TrainedParameters {
    pub weights: Array1<f64>,
    pub version: u64,
    pub provenance: TrainingProvenance,
}

/// Where a parameter set came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingProvenance {
    pub trained_at: DateTime<Utc>,
    pub journeys: usize,
    pub converted_journeys: usize,
    pub epochs: usize,
    pub final_loss: f64,
}

/// Output of a fitting run, not yet active. Produced off to the side so a
/// cancelled or timed-out run can be discarded without touching live state.
pub struct FittedModel {
    weights: Array1<f64>,
    provenance: TrainingProvenance,
}

pub struct DataDrivenModel {
    state: RwLock<Option<Arc<TrainedParameters>>>,
}

impl DataDrivenModel {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.state.read().is_some()
    }

    /// Provenance of the currently active parameters, if any.
    pub fn provenance(&self) -> Option<TrainingProvenance> {
        self.state.read().as_ref().map(|p| p.provenance.clone())
    }

    /// Version of the currently active parameters (0 = never trained).
    pub fn version(&self) -> u64 {
        self.state.read().as_ref().map(|p| p.version).unwrap_or(0)
    }

    fn current(&self) -> Option<Arc<TrainedParameters>> {
        self.state.read().clone()
    }

    /// Fit new parameters from historical journeys and swap them in.
    ///
    /// On any error the previously active parameters remain in force.
    pub fn train(
        &self,
        journeys: &[JourneyOutcome],
        epochs: usize,
        learning_rate: f64,
        min_journeys: usize,
    ) -> AttribResult<TrainingProvenance> {
        let fitted = fit(journeys, epochs, learning_rate, min_journeys)?;
        Ok(self.install(fitted))
    }

    /// Swap a fitted parameter set in as the active version. Readers see
    /// either the old or the new parameters, never a partial update.
    pub fn install(&self, fitted: FittedModel) -> TrainingProvenance {
        let mut state = self.state.write();
        let version = state.as_ref().map(|p| p.version).unwrap_or(0) + 1;
        let provenance = fitted.provenance.clone();
        *state = Some(Arc::new(TrainedParameters {
            weights: fitted.weights,
            version,
            provenance: fitted.provenance,
        }));
        drop(state);

        info!(
            version,
            journeys = provenance.journeys,
            converted = provenance.converted_journeys,
            loss = provenance.final_loss,
            "Data-driven model trained"
        );
        provenance
    }

    /// Normalized per-touchpoint credits under the active parameters.
    ///
    /// Fails with `ModelNotTrained` before the first successful training run.
    pub fn credits(
        &self,
        touchpoints: &[Touchpoint],
        conversion_at: DateTime<Utc>,
    ) -> AttribResult<Vec<f64>> {
        let params = self.current().ok_or(AttributionError::ModelNotTrained)?;
        if touchpoints.is_empty() {
            return Ok(Vec::new());
        }

        let n = touchpoints.len();
        let scores: Vec<f64> = touchpoints
            .iter()
            .enumerate()
            .map(|(i, tp)| {
                let features = touchpoint_features(tp, i, n, conversion_at);
                sigmoid(params.weights.dot(&features))
            })
            .collect();

        // Sigmoid outputs are strictly positive, so the sum never vanishes.
        let total: f64 = scores.iter().sum();
        Ok(scores.into_iter().map(|s| s / total).collect())
    }
}

impl Default for DataDrivenModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Fit a candidate parameter set by gradient descent on mean-pooled journey
/// features. Pure with respect to model state: nothing becomes active until
/// the result is installed.
///
/// Journeys without touchpoints carry no signal and are dropped before the
/// minimum-count check.
pub fn fit(
    journeys: &[JourneyOutcome],
    epochs: usize,
    learning_rate: f64,
    min_journeys: usize,
) -> AttribResult<FittedModel> {
    let usable: Vec<&JourneyOutcome> = journeys
        .iter()
        .filter(|j| !j.touchpoints.is_empty())
        .collect();

    if usable.len() < min_journeys {
        return Err(AttributionError::InsufficientTrainingData {
            required: min_journeys,
            available: usable.len(),
        });
    }

    let rows: Vec<(Array1<f64>, f64)> = usable
        .iter()
        .map(|j| {
            let label = if j.converted { 1.0 } else { 0.0 };
            (journey_features(&j.touchpoints), label)
        })
        .collect();

    let mut weights = Array1::<f64>::zeros(FEATURE_DIM);
    let m = rows.len() as f64;
    let mut loss = 0.0;

    for epoch in 0..epochs {
        let mut gradient = Array1::<f64>::zeros(FEATURE_DIM);
        loss = 0.0;
        for (features, label) in &rows {
            let prediction = sigmoid(weights.dot(features));
            gradient = gradient + features * (prediction - label);
            loss -= label * prediction.max(f64::MIN_POSITIVE).ln()
                + (1.0 - label) * (1.0 - prediction).max(f64::MIN_POSITIVE).ln();
        }
        weights = weights - gradient * (learning_rate / m);
        loss /= m;

        if epoch % 50 == 0 {
            debug!(epoch, loss, "Training epoch complete");
        }
    }

    let converted = usable.iter().filter(|j| j.converted).count();
    Ok(FittedModel {
        weights,
        provenance: TrainingProvenance {
            trained_at: Utc::now(),
            journeys: usable.len(),
            converted_journeys: converted,
            epochs,
            final_loss: loss,
        },
    })
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Feature vector for one touchpoint within a journey of length `n` ending
/// at `journey_end`.
fn touchpoint_features(
    tp: &Touchpoint,
    index: usize,
    n: usize,
    journey_end: DateTime<Utc>,
) -> Array1<f64> {
    let mut features = Array1::<f64>::zeros(FEATURE_DIM);
    features[tp.channel.feature_index()] = 1.0;

    let base = Channel::FEATURE_SLOTS;
    features[base] = if index == 0 { 1.0 } else { 0.0 };
    features[base + 1] = if index == n - 1 { 1.0 } else { 0.0 };
    features[base + 2] = if n > 1 {
        index as f64 / (n - 1) as f64
    } else {
        0.0
    };

    let age_days = (journey_end - tp.timestamp).num_seconds() as f64 / 86_400.0;
    features[base + 3] = 1.0 - (age_days / RECENCY_HORIZON_DAYS).clamp(0.0, 1.0);

    // Bias term.
    features[base + 4] = 1.0;
    features
}

/// Mean-pooled journey features used as the training input row.
fn journey_features(touchpoints: &[Touchpoint]) -> Array1<f64> {
    let n = touchpoints.len();
    let end = touchpoints
        .last()
        .map(|tp| tp.timestamp)
        .unwrap_or_else(Utc::now);
    let mut pooled = Array1::<f64>::zeros(FEATURE_DIM);
    for (i, tp) in touchpoints.iter().enumerate() {
        pooled = pooled + touchpoint_features(tp, i, n, end);
    }
    pooled / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn journey(channels: &[Channel], converted: bool) -> JourneyOutcome {
        let now = Utc::now();
        let touchpoints = channels
            .iter()
            .enumerate()
            .map(|(i, ch)| {
                Touchpoint::new(
                    "user_1",
                    ch.clone(),
                    now - Duration::days((channels.len() - i) as i64),
                )
            })
            .collect();
        JourneyOutcome {
            user_id: "user_1".to_string(),
            touchpoints,
            converted,
        }
    }

    fn training_set() -> Vec<JourneyOutcome> {
        let mut journeys = Vec::new();
        // Email-heavy journeys convert, display-only journeys do not.
        for _ in 0..6 {
            journeys.push(journey(&[Channel::PaidSearch, Channel::Email], true));
        }
        for _ in 0..6 {
            journeys.push(journey(&[Channel::Display, Channel::Display], false));
        }
        journeys
    }

    #[test]
    fn test_inference_before_training_fails() {
        let model = DataDrivenModel::new();
        let tps = vec![Touchpoint::new("user_1", Channel::Email, Utc::now())];
        let err = model.credits(&tps, Utc::now()).unwrap_err();
        assert!(matches!(err, AttributionError::ModelNotTrained));
    }

    #[test]
    fn test_training_below_minimum_keeps_prior_state() {
        let model = DataDrivenModel::new();
        model.train(&training_set(), 50, 0.1, 10).unwrap();
        let version_before = model.version();

        let err = model
            .train(&training_set()[..3], 50, 0.1, 10)
            .unwrap_err();
        assert!(matches!(
            err,
            AttributionError::InsufficientTrainingData {
                required: 10,
                available: 3
            }
        ));
        assert_eq!(model.version(), version_before);
        assert!(model.is_trained());
    }

    #[test]
    fn test_credits_normalize_after_training() {
        let model = DataDrivenModel::new();
        model.train(&training_set(), 100, 0.1, 10).unwrap();

        let now = Utc::now();
        let tps = vec![
            Touchpoint::new("user_1", Channel::Display, now - Duration::days(5)),
            Touchpoint::new("user_1", Channel::PaidSearch, now - Duration::days(2)),
            Touchpoint::new("user_1", Channel::Email, now - Duration::days(1)),
        ];
        let credits = model.credits(&tps, now).unwrap();

        assert_eq!(credits.len(), 3);
        let sum: f64 = credits.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(credits.iter().all(|c| *c > 0.0));
    }

    #[test]
    fn test_retraining_bumps_version() {
        let model = DataDrivenModel::new();
        model.train(&training_set(), 50, 0.1, 10).unwrap();
        assert_eq!(model.version(), 1);
        model.train(&training_set(), 50, 0.1, 10).unwrap();
        assert_eq!(model.version(), 2);
    }

    #[test]
    fn test_empty_journeys_dropped_before_count() {
        let model = DataDrivenModel::new();
        let mut journeys = training_set()[..5].to_vec();
        journeys.push(JourneyOutcome {
            user_id: "user_2".to_string(),
            touchpoints: Vec::new(),
            converted: true,
        });
        let err = model.train(&journeys, 50, 0.1, 6).unwrap_err();
        assert!(matches!(
            err,
            AttributionError::InsufficientTrainingData { available: 5, .. }
        ));
    }
}
