//! Shared request, response and log types for the prediction API

use serde::{Deserialize, Serialize};

/// Acknowledgement returned once a prediction has been written to the store
pub const LOG_STATUS_SAVED: &str = "Saved to Database";

/// Decimal places kept in `survival_probability`
const PROBABILITY_DECIMALS: i32 = 4;

/// One passenger to classify.
///
/// No range validation is done here: a negative age or fare is passed to the
/// model as-is. The JSON key is `pclass`; `class` is accepted as an alias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassengerFeatures {
    #[serde(rename = "pclass", alias = "class")]
    pub class: i64,
    pub age: f64,
    pub fare: f64,
}

impl PassengerFeatures {
    pub fn new(class: i64, age: f64, fare: f64) -> Self {
        Self { class, age, fare }
    }

    /// Feature vector in model column order (pclass, age, fare)
    pub fn to_vector(&self) -> [f64; 3] {
        [self.class as f64, self.age, self.fare]
    }
}

/// A prediction about to be appended to the log store.
///
/// The identifier is assigned by the store on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionLogEntry {
    pub class: i64,
    pub age: f64,
    pub fare: f64,
    pub prediction: i64,
    pub probability: f64,
    /// ISO 8601 local time
    pub timestamp: String,
}

impl PredictionLogEntry {
    pub fn new(
        features: &PassengerFeatures,
        prediction: i64,
        probability: f64,
        timestamp: String,
    ) -> Self {
        Self {
            class: features.class,
            age: features.age,
            fare: features.fare,
            prediction,
            probability,
            timestamp,
        }
    }
}

/// A stored log row, serialized as a JSON array in column order:
/// `[id, pclass, age, fare, prediction, probability, timestamp]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogRow(pub i64, pub i64, pub f64, pub f64, pub i64, pub f64, pub String);

impl PredictionLogRow {
    pub fn id(&self) -> i64 {
        self.0
    }

    pub fn class(&self) -> i64 {
        self.1
    }

    pub fn age(&self) -> f64 {
        self.2
    }

    pub fn fare(&self) -> f64 {
        self.3
    }

    pub fn prediction(&self) -> i64 {
        self.4
    }

    pub fn probability(&self) -> f64 {
        self.5
    }

    pub fn timestamp(&self) -> &str {
        &self.6
    }
}

impl From<(i64, i64, f64, f64, i64, f64, String)> for PredictionLogRow {
    fn from(row: (i64, i64, f64, f64, i64, f64, String)) -> Self {
        Self(row.0, row.1, row.2, row.3, row.4, row.5, row.6)
    }
}

/// Body of `GET /`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

/// Body of `POST /predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub survived_prediction: i64,
    pub survival_probability: f64,
    pub log_status: String,
}

/// Body of `GET /logs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsResponse {
    pub recent_logs: Vec<PredictionLogRow>,
}

/// Body of every non-2xx JSON response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

/// Round a probability to the precision reported to clients
pub fn round_probability(probability: f64) -> f64 {
    let scale = 10f64.powi(PROBABILITY_DECIMALS);
    (probability * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_accept_pclass_and_class_keys() {
        let a: PassengerFeatures =
            serde_json::from_str(r#"{"pclass": 3, "age": 22.0, "fare": 7.25}"#).unwrap();
        let b: PassengerFeatures =
            serde_json::from_str(r#"{"class": 3, "age": 22.0, "fare": 7.25}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, PassengerFeatures::new(3, 22.0, 7.25));
    }

    #[test]
    fn test_features_accept_integer_age_and_fare() {
        let f: PassengerFeatures =
            serde_json::from_str(r#"{"pclass": 1, "age": 38, "fare": 71}"#).unwrap();
        assert_eq!(f.age, 38.0);
        assert_eq!(f.fare, 71.0);
    }

    #[test]
    fn test_features_reject_missing_field_and_wrong_kind() {
        assert!(serde_json::from_str::<PassengerFeatures>(r#"{"pclass": 3, "age": 22.0}"#).is_err());
        assert!(serde_json::from_str::<PassengerFeatures>(
            r#"{"pclass": "third", "age": 22.0, "fare": 7.25}"#
        )
        .is_err());
        assert!(serde_json::from_str::<PassengerFeatures>(
            r#"{"pclass": 2.5, "age": 22.0, "fare": 7.25}"#
        )
        .is_err());
    }

    #[test]
    fn test_negative_values_are_not_validated() {
        let f: PassengerFeatures =
            serde_json::from_str(r#"{"pclass": -1, "age": -5.0, "fare": -10.0}"#).unwrap();
        assert_eq!(f.to_vector(), [-1.0, -5.0, -10.0]);
    }

    #[test]
    fn test_log_row_serializes_as_array() {
        let row = PredictionLogRow(7, 3, 22.0, 7.25, 0, 0.1234567, "2024-01-01T10:00:00".into());
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json, serde_json::json!([7, 3, 22.0, 7.25, 0, 0.1234567, "2024-01-01T10:00:00"]));
    }

    #[test]
    fn test_round_probability() {
        assert_eq!(round_probability(0.123456), 0.1235);
        assert_eq!(round_probability(0.99999), 1.0);
        assert_eq!(round_probability(0.0), 0.0);
        assert_eq!(round_probability(0.5), 0.5);
    }

    #[test]
    fn test_log_entry_copies_features() {
        let features = PassengerFeatures::new(2, 30.5, 13.0);
        let entry = PredictionLogEntry::new(&features, 1, 0.61, "ts".to_string());
        assert_eq!(entry.class, 2);
        assert_eq!(entry.age, 30.5);
        assert_eq!(entry.fare, 13.0);
        assert_eq!(entry.prediction, 1);
        assert_eq!(entry.probability, 0.61);
    }
}
