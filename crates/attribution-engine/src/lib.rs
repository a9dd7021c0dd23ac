//! Multi-touch attribution engine — orchestrates model selection,
//! touchpoint retrieval, credit computation, result persistence, training,
//! and reporting views over the repository boundary.

pub mod engine;
pub mod memory;
pub mod repository;

pub use engine::{AttributionEngine, InsightsReport};
pub use memory::InMemoryRepository;
pub use repository::{AttributionRepository, ModelPerformance};
