use serde::Deserialize;

/// Root engine configuration. Loaded from environment variables with the
/// prefix `ATTRIBUTION__` and optional TOML config files.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub roi: RoiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Days of touchpoint history eligible for a conversion.
    #[serde(default = "default_lookback_days")]
    pub default_lookback_days: i64,
    /// Half-life in days for the time-decay model.
    #[serde(default = "default_half_life_days")]
    pub time_decay_half_life_days: f64,
    /// Minimum journeys required before a training run is accepted.
    #[serde(default = "default_min_training_journeys")]
    pub min_training_journeys: usize,
    #[serde(default = "default_training_epochs")]
    pub training_epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub training_learning_rate: f64,
    /// Bound on a single attribution calculation, in seconds.
    #[serde(default = "default_attribution_timeout_secs")]
    pub attribution_timeout_secs: u64,
    /// Bound on a training run, in seconds.
    #[serde(default = "default_training_timeout_secs")]
    pub training_timeout_secs: u64,
}

fn default_lookback_days() -> i64 { 30 }
fn default_half_life_days() -> f64 { 7.0 }
fn default_min_training_journeys() -> usize { 10 }
fn default_training_epochs() -> usize { 200 }
fn default_learning_rate() -> f64 { 0.1 }
fn default_attribution_timeout_secs() -> u64 { 10 }
fn default_training_timeout_secs() -> u64 { 300 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_lookback_days: default_lookback_days(),
            time_decay_half_life_days: default_half_life_days(),
            min_training_journeys: default_min_training_journeys(),
            training_epochs: default_training_epochs(),
            training_learning_rate: default_learning_rate(),
            attribution_timeout_secs: default_attribution_timeout_secs(),
            training_timeout_secs: default_training_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoiConfig {
    /// Default cost-per-action when a channel has no configured rate.
    #[serde(default = "default_base_cost")]
    pub default_channel_cost: f64,
    /// How many common paths reporting queries return.
    #[serde(default = "default_common_path_limit")]
    pub common_path_limit: usize,
}

fn default_base_cost() -> f64 { 1.0 }
fn default_common_path_limit() -> usize { 10 }

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            default_channel_cost: default_base_cost(),
            common_path_limit: default_common_path_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment (prefix `ATTRIBUTION__`)
    /// layered over an optional `attribution.toml` in the working directory.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("attribution").required(false))
            .add_source(
                config::Environment::with_prefix("ATTRIBUTION")
                    .separator("__")
                    .try_parsing(true),
            );
        builder.build()?.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            roi: RoiConfig::default(),
        }
    }
}
