//! Attribution orchestration — model selection, touchpoint retrieval,
//! credit computation, result persistence, training, and reporting views.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use attribution_core::config::AppConfig;
use attribution_core::error::{AttribResult, AttributionError};
use attribution_core::types::{
    AttributionResult, ConversionEvent, DateRange, ModelConfig, ModelType, Touchpoint,
};
use attribution_models::{data_driven, DataDrivenModel, ModelSet, TrainingProvenance};
use attribution_roi::{ChannelRoi, PathEfficiency, RoiCalculator};

use crate::repository::{AttributionRepository, ModelPerformance};

/// Read-only aggregation view for a period: channel ROI, the most common
/// conversion paths ranked by efficiency, and cross-model performance.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InsightsReport {
    pub range: DateRange,
    pub channel_roi: Vec<ChannelRoi>,
    pub top_paths: Vec<PathEfficiency>,
    pub model_performance: Vec<ModelPerformance>,
    pub generated_at: DateTime<Utc>,
}

/// One attribution computation per conversion; calls are independent and
/// safe to run fully in parallel. The only shared mutable state is the
/// data-driven model's versioned parameter set.
pub struct AttributionEngine {
    repository: Arc<dyn AttributionRepository>,
    models: ModelSet,
    /// Per-model configuration; the lookback window bounds touchpoint
    /// eligibility for each model kind.
    model_configs: DashMap<ModelType, ModelConfig>,
    calculator: Arc<RoiCalculator>,
    config: AppConfig,
}

impl AttributionEngine {
    pub fn new(repository: Arc<dyn AttributionRepository>, config: AppConfig) -> Self {
        let model_configs = DashMap::new();
        for model_type in ModelType::ALL {
            let mut mc = ModelConfig::new(model_type.as_str(), model_type);
            mc.lookback_window_days = config.engine.default_lookback_days;
            model_configs.insert(model_type, mc);
        }
        Self {
            models: ModelSet::new(&config.engine),
            model_configs,
            calculator: Arc::new(RoiCalculator::new(&config.roi)),
            repository,
            config,
        }
    }

    /// Override one model's lookback window.
    pub fn set_lookback_window(&self, model_type: ModelType, days: i64) {
        if let Some(mut mc) = self.model_configs.get_mut(&model_type) {
            mc.lookback_window_days = days;
        }
    }

    fn lookback_days(&self, model_type: ModelType) -> i64 {
        self.model_configs
            .get(&model_type)
            .map(|mc| mc.lookback_window_days)
            .unwrap_or(self.config.engine.default_lookback_days)
    }

    /// The shared trainable model handle.
    pub fn data_driven(&self) -> Arc<DataDrivenModel> {
        self.models.data_driven()
    }

    /// The cost calculator, for channel-rate overrides.
    pub fn calculator(&self) -> Arc<RoiCalculator> {
        Arc::clone(&self.calculator)
    }

    /// Persist a touchpoint. Idempotent on touchpoint id.
    pub async fn track_touchpoint(&self, tp: Touchpoint) -> AttribResult<()> {
        debug!(touchpoint_id = %tp.id, user_id = %tp.user_id, channel = %tp.channel, "Tracking touchpoint");
        self.repository.save_touchpoint(tp).await?;
        Ok(())
    }

    /// Persist a conversion event without attributing it.
    pub async fn record_conversion(&self, conversion: ConversionEvent) -> AttribResult<()> {
        self.repository.save_conversion(conversion).await?;
        Ok(())
    }

    /// Attribute one conversion under one model: persist the conversion,
    /// pull the lookback-windowed touchpoints, compute credits, persist the
    /// result atomically, and derive ROI as a logged side effect.
    ///
    /// A conversion with no attributable touchpoints is a valid, reportable
    /// outcome, not an error. Bounded by the configured attribution timeout;
    /// a timed-out call is safe to retry because attribution is
    /// deterministic per (conversion, model).
    pub async fn process_conversion(
        &self,
        conversion: ConversionEvent,
        model_type: ModelType,
    ) -> AttribResult<AttributionResult> {
        let conversion_id = conversion.id;
        let timeout = StdDuration::from_secs(self.config.engine.attribution_timeout_secs);
        tokio::time::timeout(timeout, self.process_inner(conversion, model_type))
            .await
            .map_err(|_| {
                AttributionError::Timeout(format!(
                    "attribution of conversion {conversion_id} under {model_type}"
                ))
            })?
    }

    async fn process_inner(
        &self,
        conversion: ConversionEvent,
        model_type: ModelType,
    ) -> AttribResult<AttributionResult> {
        self.repository.save_conversion(conversion.clone()).await?;

        let touchpoints = self.windowed_touchpoints(&conversion, model_type).await?;
        let result = self.models.compute(model_type, &touchpoints, &conversion)?;
        self.repository
            .save_attribution_result(result.clone())
            .await?;

        let summary = self.calculator.roi_summary(&result);
        info!(
            conversion_id = %conversion.id,
            model = %model_type,
            touchpoints = result.touchpoints.len(),
            value = conversion.value,
            cost = summary.total_cost,
            roas = summary.roas,
            "Conversion attributed"
        );
        Ok(result)
    }

    /// Touchpoints eligible for a conversion: the model's lookback window
    /// anchored at the conversion timestamp, ascending.
    async fn windowed_touchpoints(
        &self,
        conversion: &ConversionEvent,
        model_type: ModelType,
    ) -> AttribResult<Vec<Touchpoint>> {
        let from = conversion.timestamp - Duration::days(self.lookback_days(model_type));
        let touchpoints = self
            .repository
            .touchpoints_in_window(&conversion.user_id, from, conversion.timestamp)
            .await?;
        Ok(touchpoints)
    }

    /// Attribute every historical conversion of a user under every
    /// requested model, persisting the results for later reporting.
    pub async fn analyze_journey(
        &self,
        user_id: &str,
        model_types: &[ModelType],
    ) -> AttribResult<HashMap<ModelType, Vec<AttributionResult>>> {
        let conversions = self.repository.conversions_by_user(user_id).await?;
        let mut by_model: HashMap<ModelType, Vec<AttributionResult>> = HashMap::new();

        for conversion in &conversions {
            for model_type in model_types {
                let touchpoints = self.windowed_touchpoints(conversion, *model_type).await?;
                let result = self.models.compute(*model_type, &touchpoints, conversion)?;
                self.repository
                    .save_attribution_result(result.clone())
                    .await?;
                by_model.entry(*model_type).or_default().push(result);
            }
        }

        info!(
            user_id,
            conversions = conversions.len(),
            models = model_types.len(),
            "Journey analyzed"
        );
        Ok(by_model)
    }

    /// Compute one conversion under several models side by side, without
    /// persisting, for model-selection decision support.
    pub async fn compare_models(
        &self,
        conversion_id: Uuid,
        model_types: &[ModelType],
    ) -> AttribResult<HashMap<ModelType, AttributionResult>> {
        let conversion = self
            .repository
            .conversion(conversion_id)
            .await?
            .ok_or(AttributionError::ConversionNotFound(conversion_id))?;

        let mut comparison = HashMap::new();
        for model_type in model_types {
            let touchpoints = self.windowed_touchpoints(&conversion, *model_type).await?;
            let result = self.models.compute(*model_type, &touchpoints, &conversion)?;
            comparison.insert(*model_type, result);
        }
        Ok(comparison)
    }

    /// Gather journeys for the period and fit the data-driven model.
    ///
    /// The candidate is fit off to the side and installed only on success:
    /// a failure or timeout leaves the previously trained parameters in
    /// force, and in-flight inference is never blocked by the run.
    pub async fn train_data_driven_model(
        &self,
        range: DateRange,
        epochs: Option<usize>,
    ) -> AttribResult<TrainingProvenance> {
        let timeout = StdDuration::from_secs(self.config.engine.training_timeout_secs);
        let fitted = match tokio::time::timeout(timeout, self.fit_candidate(range, epochs)).await {
            Err(_) => {
                warn!("Training timed out; previously trained parameters remain active");
                return Err(AttributionError::Timeout(
                    "data-driven model training".to_string(),
                ));
            }
            Ok(candidate) => candidate.map_err(|e| {
                warn!(error = %e, "Training rejected; prior parameters untouched");
                e
            })?,
        };

        Ok(self.models.data_driven().install(fitted))
    }

    /// Fetch journeys for the period and fit a candidate parameter set. The
    /// whole run, fetch included, counts against the training deadline.
    async fn fit_candidate(
        &self,
        range: DateRange,
        epochs: Option<usize>,
    ) -> AttribResult<data_driven::FittedModel> {
        let journeys = self
            .repository
            .training_data(range, self.config.engine.default_lookback_days)
            .await?;
        let epochs = epochs.unwrap_or(self.config.engine.training_epochs);
        let learning_rate = self.config.engine.training_learning_rate;
        let min_journeys = self.config.engine.min_training_journeys;

        info!(journeys = journeys.len(), epochs, "Starting data-driven training");
        let handle = tokio::task::spawn_blocking(move || {
            data_driven::fit(&journeys, epochs, learning_rate, min_journeys)
        });
        handle
            .await
            .map_err(|e| anyhow::anyhow!("training task failed: {e}"))?
    }

    /// Channel-level ROI over all results in the period.
    pub async fn channel_performance(&self, range: DateRange) -> AttribResult<Vec<ChannelRoi>> {
        let results = self.repository.results_in_range(range).await?;
        Ok(self.calculator.channel_roi(&results))
    }

    /// Combined reporting view for a period.
    pub async fn insights(&self, range: DateRange) -> AttribResult<InsightsReport> {
        let channel_roi = self.channel_performance(range).await?;
        let paths = self
            .repository
            .common_paths(range, self.config.roi.common_path_limit)
            .await?;
        let model_performance = self.repository.model_performance(range).await?;

        Ok(InsightsReport {
            range,
            channel_roi,
            top_paths: self.calculator.path_efficiency(&paths),
            model_performance,
            generated_at: Utc::now(),
        })
    }
}
