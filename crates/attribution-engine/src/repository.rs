//! Persistence boundary consumed by the engine.
//!
//! Any store satisfying these query contracts works; the engine depends
//! only on this trait, never on a query language. All methods are
//! I/O-shaped and awaited without in-process locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use attribution_core::types::{
    AttributionResult, ConversionEvent, ConversionPath, DateRange, JourneyOutcome, ModelType,
    Touchpoint,
};

/// Cross-model aggregate over stored results in a range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub model_type: ModelType,
    pub results: u64,
    pub attributed_value: f64,
    pub avg_touchpoints: f64,
}

#[async_trait]
pub trait AttributionRepository: Send + Sync {
    /// Upsert keyed by touchpoint id. Re-submission updates metadata only
    /// and never duplicates; an assigned credit survives the update.
    async fn save_touchpoint(&self, tp: Touchpoint) -> anyhow::Result<()>;

    /// A user's touchpoints in `[now - lookback_days, now]`, ascending.
    async fn touchpoints_by_user(
        &self,
        user_id: &str,
        lookback_days: i64,
    ) -> anyhow::Result<Vec<Touchpoint>>;

    /// A user's touchpoints within an explicit window, ascending. Used when
    /// attributing conversions whose window is anchored at the conversion
    /// timestamp rather than at the current time.
    async fn touchpoints_in_window(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Touchpoint>>;

    async fn save_conversion(&self, conversion: ConversionEvent) -> anyhow::Result<()>;

    async fn conversion(&self, id: Uuid) -> anyhow::Result<Option<ConversionEvent>>;

    async fn conversions_by_user(&self, user_id: &str) -> anyhow::Result<Vec<ConversionEvent>>;

    /// Atomic write of a result together with all its per-touchpoint
    /// credits: readers observe the whole result or none of it.
    async fn save_attribution_result(&self, result: AttributionResult) -> anyhow::Result<()>;

    async fn results_in_range(&self, range: DateRange) -> anyhow::Result<Vec<AttributionResult>>;

    /// One `(touchpoint sequence, converted)` entry per user journey in the
    /// range; converting journeys claim the `lookback_days` of touchpoints
    /// before their conversion.
    async fn training_data(
        &self,
        range: DateRange,
        lookback_days: i64,
    ) -> anyhow::Result<Vec<JourneyOutcome>>;

    /// Distinct channel sequences of converting journeys in the range,
    /// ranked by conversion count, at most `limit` rows.
    async fn common_paths(
        &self,
        range: DateRange,
        limit: usize,
    ) -> anyhow::Result<Vec<ConversionPath>>;

    /// Per-model aggregates over stored results in the range.
    async fn model_performance(&self, range: DateRange)
        -> anyhow::Result<Vec<ModelPerformance>>;
}
