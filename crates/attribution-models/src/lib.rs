//! Weighting model set — the closed family of attribution models, selected
//! by exhaustive match over `ModelType` rather than open string dispatch.

pub mod data_driven;
pub mod rules;

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

pub use data_driven::{DataDrivenModel, FittedModel, TrainedParameters, TrainingProvenance};

use attribution_core::config::EngineConfig;
use attribution_core::error::{AttribResult, AttributionError};
use attribution_core::types::{AttributionResult, ConversionEvent, ModelType, Touchpoint};

/// Holds the static model parameters and the shared trainable model, and
/// dispatches credit computation for every model kind.
pub struct ModelSet {
    half_life_days: f64,
    data_driven: Arc<DataDrivenModel>,
}

impl ModelSet {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            half_life_days: config.time_decay_half_life_days,
            data_driven: Arc::new(DataDrivenModel::new()),
        }
    }

    /// The shared trainable model (training happens through this handle).
    pub fn data_driven(&self) -> Arc<DataDrivenModel> {
        Arc::clone(&self.data_driven)
    }

    /// Apply one model to a pre-sorted, lookback-filtered touchpoint
    /// sequence. Non-empty outputs carry credits summing to 1.0; an empty
    /// input yields an empty result with the conversion value preserved.
    pub fn compute(
        &self,
        model_type: ModelType,
        touchpoints: &[Touchpoint],
        conversion: &ConversionEvent,
    ) -> AttribResult<AttributionResult> {
        validate_input(touchpoints, conversion)?;

        let credits = match model_type {
            ModelType::FirstTouch => rules::first_touch(touchpoints.len()),
            ModelType::LastTouch => rules::last_touch(touchpoints.len()),
            ModelType::Linear => rules::linear(touchpoints.len()),
            ModelType::TimeDecay => {
                rules::time_decay(touchpoints, conversion.timestamp, self.half_life_days)
            }
            ModelType::PositionBased => rules::position_based(touchpoints.len()),
            ModelType::DataDriven => self
                .data_driven
                .credits(touchpoints, conversion.timestamp)?,
        };

        let credited = touchpoints
            .iter()
            .zip(credits)
            .map(|(tp, credit)| {
                let mut tp = tp.clone();
                tp.credit = Some(credit);
                tp
            })
            .collect();

        Ok(AttributionResult {
            id: Uuid::new_v4(),
            conversion_id: conversion.id,
            conversion_value: conversion.value,
            model_type,
            touchpoints: credited,
            calculated_at: Utc::now(),
        })
    }
}

/// Fail-fast contract checks: callers must hand us an ascending sequence and
/// a non-negative conversion value.
fn validate_input(touchpoints: &[Touchpoint], conversion: &ConversionEvent) -> AttribResult<()> {
    if conversion.value < 0.0 {
        return Err(AttributionError::Contract(format!(
            "negative conversion value {} for conversion {}",
            conversion.value, conversion.id
        )));
    }
    for pair in touchpoints.windows(2) {
        if pair[0].timestamp > pair[1].timestamp {
            return Err(AttributionError::Contract(format!(
                "touchpoints out of order for conversion {}",
                conversion.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attribution_core::types::Channel;
    use chrono::Duration;

    fn model_set() -> ModelSet {
        ModelSet::new(&EngineConfig::default())
    }

    fn sequence(n: usize) -> Vec<Touchpoint> {
        let now = Utc::now();
        (0..n)
            .map(|i| {
                Touchpoint::new(
                    "user_1",
                    Channel::Social,
                    now - Duration::days((n - i) as i64),
                )
            })
            .collect()
    }

    #[test]
    fn test_every_static_model_reconciles() {
        let set = model_set();
        let conversion = ConversionEvent::new("user_1", 250.0, Utc::now());
        for model in [
            ModelType::FirstTouch,
            ModelType::LastTouch,
            ModelType::Linear,
            ModelType::TimeDecay,
            ModelType::PositionBased,
        ] {
            for n in 1..=6 {
                let result = set.compute(model, &sequence(n), &conversion).unwrap();
                assert!(result.credits_reconcile(), "{model} failed at n={n}");
                assert_eq!(result.conversion_value, 250.0);
            }
        }
    }

    #[test]
    fn test_empty_sequence_preserves_value() {
        let set = model_set();
        let conversion = ConversionEvent::new("user_1", 99.0, Utc::now());
        let result = set
            .compute(ModelType::Linear, &[], &conversion)
            .unwrap();
        assert!(result.touchpoints.is_empty());
        assert_eq!(result.conversion_value, 99.0);
    }

    #[test]
    fn test_unsorted_input_fails_fast() {
        let set = model_set();
        let conversion = ConversionEvent::new("user_1", 10.0, Utc::now());
        let mut tps = sequence(3);
        tps.reverse();
        let err = set.compute(ModelType::Linear, &tps, &conversion).unwrap_err();
        assert!(matches!(err, AttributionError::Contract(_)));
    }

    #[test]
    fn test_negative_value_fails_fast() {
        let set = model_set();
        let conversion = ConversionEvent::new("user_1", -5.0, Utc::now());
        let err = set
            .compute(ModelType::FirstTouch, &sequence(2), &conversion)
            .unwrap_err();
        assert!(matches!(err, AttributionError::Contract(_)));
    }

    #[test]
    fn test_data_driven_untrained_propagates() {
        let set = model_set();
        let conversion = ConversionEvent::new("user_1", 10.0, Utc::now());
        let err = set
            .compute(ModelType::DataDriven, &sequence(2), &conversion)
            .unwrap_err();
        assert!(matches!(err, AttributionError::ModelNotTrained));
    }
}
