//! Shared data model for the attribution pipeline: touchpoints, conversions,
//! model identifiers, and attribution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AttributionError;

/// Tolerance used when checking that a credit vector sums to 1.0.
pub const CREDIT_EPSILON: f64 = 1e-9;

/// Marketing channel a touchpoint arrived through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    PaidSearch,
    Display,
    Social,
    Email,
    Organic,
    Direct,
    Referral,
    Affiliate,
    Other(String),
}

impl Channel {
    pub fn as_str(&self) -> &str {
        match self {
            Channel::PaidSearch => "paid_search",
            Channel::Display => "display",
            Channel::Social => "social",
            Channel::Email => "email",
            Channel::Organic => "organic",
            Channel::Direct => "direct",
            Channel::Referral => "referral",
            Channel::Affiliate => "affiliate",
            Channel::Other(name) => name.as_str(),
        }
    }

    /// Stable feature index for the known channels. `Other` channels share
    /// the final slot.
    pub fn feature_index(&self) -> usize {
        match self {
            Channel::PaidSearch => 0,
            Channel::Display => 1,
            Channel::Social => 2,
            Channel::Email => 3,
            Channel::Organic => 4,
            Channel::Direct => 5,
            Channel::Referral => 6,
            Channel::Affiliate => 7,
            Channel::Other(_) => 8,
        }
    }

    /// Number of channel feature slots, including the shared `Other` slot.
    pub const FEATURE_SLOTS: usize = 9;
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded marketing interaction. Immutable once recorded except
/// for `credit`, which attribution fills in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Touchpoint {
    pub id: Uuid,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub channel: Channel,
    pub campaign: Option<String>,
    pub source: Option<String>,
    pub medium: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Fraction of a conversion's value assigned by a model, in [0, 1].
    /// `None` until attribution runs.
    pub credit: Option<f64>,
}

impl Touchpoint {
    pub fn new(user_id: &str, channel: Channel, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            timestamp,
            channel,
            campaign: None,
            source: None,
            medium: None,
            metadata: serde_json::Value::Null,
            credit: None,
        }
    }

    pub fn with_campaign(mut self, campaign: &str) -> Self {
        self.campaign = Some(campaign.to_string());
        self
    }
}

/// A terminal, value-bearing event. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub id: Uuid,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    /// Monetary value, non-negative.
    pub value: f64,
    pub currency: String,
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

impl ConversionEvent {
    pub fn new(user_id: &str, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            timestamp,
            value,
            currency: "USD".to_string(),
            transaction_id: None,
            items: Vec::new(),
        }
    }
}

/// The closed set of attribution model kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    FirstTouch,
    LastTouch,
    Linear,
    TimeDecay,
    PositionBased,
    DataDriven,
}

impl ModelType {
    pub const ALL: [ModelType; 6] = [
        ModelType::FirstTouch,
        ModelType::LastTouch,
        ModelType::Linear,
        ModelType::TimeDecay,
        ModelType::PositionBased,
        ModelType::DataDriven,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::FirstTouch => "first_touch",
            ModelType::LastTouch => "last_touch",
            ModelType::Linear => "linear",
            ModelType::TimeDecay => "time_decay",
            ModelType::PositionBased => "position_based",
            ModelType::DataDriven => "data_driven",
        }
    }

    /// Parse a model name. Unrecognized strings fail with `UnknownModel`.
    pub fn parse(name: &str) -> Result<Self, AttributionError> {
        match name {
            "first_touch" => Ok(ModelType::FirstTouch),
            "last_touch" => Ok(ModelType::LastTouch),
            "linear" => Ok(ModelType::Linear),
            "time_decay" => Ok(ModelType::TimeDecay),
            "position_based" => Ok(ModelType::PositionBased),
            "data_driven" => Ok(ModelType::DataDriven),
            other => Err(AttributionError::UnknownModel(other.to_string())),
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelType {
    type Err = AttributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelType::parse(s)
    }
}

/// Named model configuration: which kind to run and how far back to look.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: Uuid,
    pub name: String,
    pub model_type: ModelType,
    /// Days before the conversion within which touchpoints are eligible.
    pub lookback_window_days: i64,
}

impl ModelConfig {
    pub fn new(name: &str, model_type: ModelType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            model_type,
            lookback_window_days: 30,
        }
    }
}

/// The output of applying one model to one conversion. Append-only per
/// (conversion, model) pair; recomputation creates a new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionResult {
    pub id: Uuid,
    pub conversion_id: Uuid,
    pub conversion_value: f64,
    pub model_type: ModelType,
    /// Ordered ascending by timestamp, each with `credit` populated.
    /// Empty when the conversion had no attributable touchpoints.
    pub touchpoints: Vec<Touchpoint>,
    pub calculated_at: DateTime<Utc>,
}

impl AttributionResult {
    /// Sum of assigned credits. 0.0 for the empty-touchpoint case.
    pub fn total_credit(&self) -> f64 {
        self.touchpoints.iter().filter_map(|t| t.credit).sum()
    }

    /// Whether credits satisfy the sum-to-one invariant (or the list is empty).
    pub fn credits_reconcile(&self) -> bool {
        if self.touchpoints.is_empty() {
            return true;
        }
        let sum = self.total_credit();
        let non_negative = self
            .touchpoints
            .iter()
            .all(|t| t.credit.unwrap_or(0.0) >= 0.0);
        non_negative && (sum - 1.0).abs() < CREDIT_EPSILON
    }
}

/// Inclusive time range for reporting and training queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// One historical user journey used for training: the ordered touchpoints
/// and whether the journey ended in a conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyOutcome {
    pub user_id: String,
    pub touchpoints: Vec<Touchpoint>,
    pub converted: bool,
}

/// A distinct channel sequence observed across converting journeys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionPath {
    pub path: Vec<Channel>,
    pub conversions: u64,
    pub total_value: f64,
}
