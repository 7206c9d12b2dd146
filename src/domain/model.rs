//! Survival classifier interface and the artifact-backed logistic model
//!
//! Training happens offline. The exported artifact is a small JSON document
//! holding the fitted coefficients; it is read once at startup and never
//! mutated afterwards.

use crate::domain::types::PassengerFeatures;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Feature columns the artifact must have been fitted on, in order
pub const FEATURE_COLUMNS: [&str; 3] = ["pclass", "age", "fare"];

const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("feature `{name}` is not a finite number")]
    NonFiniteFeature { name: &'static str },

    #[error("model produced an invalid output: {0}")]
    InvalidOutput(String),
}

/// A binary classifier over passenger features.
///
/// Implementations must be safe to share across concurrent requests and
/// must not mutate themselves during inference.
pub trait Model: Send + Sync {
    /// Predicted label: 1 = survived, 0 = did not survive
    fn predict(&self, features: &PassengerFeatures) -> Result<i64, ModelError>;

    /// Probability of the positive (survived) class
    fn predict_probability(&self, features: &PassengerFeatures) -> Result<f64, ModelError>;
}

/// On-disk artifact layout
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    features: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
    #[serde(default = "default_threshold")]
    threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// Logistic regression over (pclass, age, fare)
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticModel {
    coefficients: [f64; 3],
    intercept: f64,
    threshold: f64,
}

impl LogisticModel {
    pub fn new(coefficients: [f64; 3], intercept: f64, threshold: f64) -> Result<Self, ModelError> {
        if coefficients.iter().any(|c| !c.is_finite()) || !intercept.is_finite() {
            return Err(ModelError::InvalidArtifact("coefficients must be finite".to_string()));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ModelError::InvalidArtifact(format!(
                "threshold {threshold} outside [0, 1]"
            )));
        }
        Ok(Self { coefficients, intercept, threshold })
    }

    /// Load a fitted model from its JSON artifact
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ModelError::NotFound(path.to_path_buf()),
            _ => ModelError::Io { path: path.to_path_buf(), source },
        })?;
        let model = Self::from_json(&content)
            .map_err(|e| match e {
                ModelError::Parse { source, .. } => {
                    ModelError::Parse { path: path.to_path_buf(), source }
                }
                other => other,
            })?;

        info!(
            path = %path.display(),
            coefficients = ?model.coefficients,
            intercept = %model.intercept,
            threshold = %model.threshold,
            "model_loaded"
        );
        Ok(model)
    }

    /// Parse an artifact from its JSON text
    pub fn from_json(content: &str) -> Result<Self, ModelError> {
        let artifact: ModelArtifact = serde_json::from_str(content)
            .map_err(|source| ModelError::Parse { path: PathBuf::new(), source })?;

        if artifact.features != FEATURE_COLUMNS {
            return Err(ModelError::InvalidArtifact(format!(
                "expected features {:?}, found {:?}",
                FEATURE_COLUMNS, artifact.features
            )));
        }
        let coefficients: [f64; 3] = artifact.coefficients.as_slice().try_into().map_err(|_| {
            ModelError::InvalidArtifact(format!(
                "expected {} coefficients, found {}",
                FEATURE_COLUMNS.len(),
                artifact.coefficients.len()
            ))
        })?;

        Self::new(coefficients, artifact.intercept, artifact.threshold)
    }

    fn check_features(features: &PassengerFeatures) -> Result<[f64; 3], ModelError> {
        let vector = features.to_vector();
        for (value, name) in vector.iter().zip(FEATURE_COLUMNS) {
            if !value.is_finite() {
                return Err(ModelError::NonFiniteFeature { name });
            }
        }
        Ok(vector)
    }
}

impl Model for LogisticModel {
    fn predict(&self, features: &PassengerFeatures) -> Result<i64, ModelError> {
        let probability = self.predict_probability(features)?;
        Ok(i64::from(probability >= self.threshold))
    }

    fn predict_probability(&self, features: &PassengerFeatures) -> Result<f64, ModelError> {
        let vector = Self::check_features(features)?;
        let z = self.intercept
            + vector.iter().zip(self.coefficients.iter()).map(|(x, c)| x * c).sum::<f64>();
        Ok(sigmoid(z))
    }
}

#[inline]
fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
