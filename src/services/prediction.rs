//! Prediction handler - validates, infers, persists, responds
//!
//! `PredictionHandler` is the per-process context: the read-only model, the
//! log store location and the metrics sink. It holds no mutable state of its
//! own, so one instance serves all concurrent requests.

use crate::domain::model::{LogisticModel, Model, ModelError};
use crate::domain::types::{
    round_probability, LogsResponse, PassengerFeatures, PredictResponse, PredictionLogEntry,
    StatusResponse, LOG_STATUS_SAVED,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::store::{LogStore, StoreError};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

/// Rows returned by `handle_logs`
pub const RECENT_LOGS_LIMIT: u32 = 5;

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_MESSAGE: &str = "Titanic API with Database is ready!";

/// Startup failures; the service must not serve requests after one of these
#[derive(Debug, Error)]
pub enum InitError {
    #[error("model artifact not found at {0}; export a trained model first")]
    ModelNotFound(PathBuf),

    #[error("failed to load model: {0}")]
    Model(#[source] ModelError),

    #[error("failed to prepare prediction log store: {0}")]
    Store(#[from] StoreError),
}

impl From<ModelError> for InitError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::NotFound(path) => InitError::ModelNotFound(path),
            other => InitError::Model(other),
        }
    }
}

/// Request-level failures
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("inference failed: {0}")]
    Inference(#[from] ModelError),

    #[error("prediction log store failed: {0}")]
    Persistence(#[from] StoreError),
}

pub struct PredictionHandler {
    model: Arc<dyn Model>,
    store: LogStore,
    metrics: Arc<Metrics>,
}

impl PredictionHandler {
    pub fn new(model: Arc<dyn Model>, store: LogStore, metrics: Arc<Metrics>) -> Self {
        Self { model, store, metrics }
    }

    /// Prepare the log table, then load the model artifact named in `config`
    pub async fn initialize(config: &Config, metrics: Arc<Metrics>) -> Result<Self, InitError> {
        let store = LogStore::new(config.store_path());
        store.ensure_schema().await?;

        let model = LogisticModel::load(config.model_path())?;

        info!(
            model_path = %config.model_path(),
            store_path = %config.store_path(),
            "prediction_handler_initialized"
        );
        Ok(Self::new(Arc::new(model), store, metrics))
    }

    /// Same as `initialize`, with an already constructed model
    pub async fn initialize_with_model(
        model: Arc<dyn Model>,
        store: LogStore,
        metrics: Arc<Metrics>,
    ) -> Result<Self, InitError> {
        store.ensure_schema().await?;
        Ok(Self::new(model, store, metrics))
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn handle_root(&self) -> StatusResponse {
        StatusResponse { status: STATUS_RUNNING.to_string(), message: STATUS_MESSAGE.to_string() }
    }

    /// Classify one passenger and append the result to the log store.
    ///
    /// Nothing is returned as success unless both inference and the insert
    /// succeeded.
    pub async fn handle_predict(
        &self,
        features: PassengerFeatures,
    ) -> Result<PredictResponse, HandlerError> {
        let (prediction, probability) = self.infer(&features).inspect_err(|e| {
            self.metrics.record_inference_failure();
            error!(features = ?features, error = %e, "predict_inference_failed");
        })?;

        let entry = PredictionLogEntry::new(&features, prediction, probability, now_iso8601());
        let id = self.store.insert(&entry).await.inspect_err(|e| {
            self.metrics.record_store_failure();
            error!(features = ?features, error = %e, "predict_persist_failed");
        })?;

        self.metrics.record_prediction(prediction);
        info!(
            id = %id,
            pclass = %features.class,
            age = %features.age,
            fare = %features.fare,
            prediction = %prediction,
            probability = %probability,
            "prediction_logged"
        );

        Ok(PredictResponse {
            survived_prediction: prediction,
            survival_probability: round_probability(probability),
            log_status: LOG_STATUS_SAVED.to_string(),
        })
    }

    /// The most recent log rows, newest first
    pub async fn handle_logs(&self) -> Result<LogsResponse, HandlerError> {
        let recent_logs = self.store.recent(RECENT_LOGS_LIMIT).await.inspect_err(|e| {
            self.metrics.record_store_failure();
            error!(error = %e, "logs_query_failed");
        })?;

        self.metrics.record_log_query();
        Ok(LogsResponse { recent_logs })
    }

    /// Run label and probability inference and check the outputs are usable
    fn infer(&self, features: &PassengerFeatures) -> Result<(i64, f64), ModelError> {
        let start = Instant::now();
        let prediction = self.model.predict(features)?;
        let probability = self.model.predict_probability(features)?;
        self.metrics.record_inference_latency(start.elapsed().as_micros() as u64);

        if !matches!(prediction, 0 | 1) {
            return Err(ModelError::InvalidOutput(format!("label {prediction} is not 0 or 1")));
        }
        if !(0.0..=1.0).contains(&probability) {
            return Err(ModelError::InvalidOutput(format!(
                "probability {probability} outside [0, 1]"
            )));
        }
        Ok((prediction, probability))
    }
}

/// Local wall-clock time, ISO 8601 with microseconds and no offset
fn now_iso8601() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
