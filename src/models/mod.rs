//! Toxicity model lifecycle, inference and score aggregation

pub mod aggregator;
pub mod classifier;
pub mod inference;
pub mod loader;

pub use aggregator::ScoreAggregator;
pub use classifier::{OnnxToxicityClassifier, ToxicityClassifier};
pub use inference::InferenceExecutor;
pub use loader::{ModelLoader, ModelStatus, SharedClassifier};
