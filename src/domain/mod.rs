//! Domain models - passenger features, prediction log rows, the model interface
//!
//! - `types` - request/response payloads and the log entry/row types
//! - `model` - the `Model` trait and the artifact-backed logistic model

pub mod model;
pub mod types;

// Re-export commonly used types at module level
pub use model::{LogisticModel, Model, ModelError};
pub use types::{PassengerFeatures, PredictionLogEntry, PredictionLogRow};
