//! Services - request handling
//!
//! - `prediction` - the prediction handler (infer, persist, respond)

pub mod prediction;

pub use prediction::{HandlerError, InitError, PredictionHandler};
