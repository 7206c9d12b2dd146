//! IO modules - external system interfaces
//!
//! - `store` - SQLite prediction log
//! - `http` - HTTP transport (hyper server and routing)
//! - `prometheus` - Prometheus text rendering for GET /metrics

pub mod http;
pub mod prometheus;
pub mod store;

// Re-export commonly used types
pub use http::ApiState;
pub use store::{LogStore, StoreError};
