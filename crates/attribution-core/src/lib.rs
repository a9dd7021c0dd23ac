pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, EngineConfig, RoiConfig};
pub use error::{AttribResult, AttributionError};
