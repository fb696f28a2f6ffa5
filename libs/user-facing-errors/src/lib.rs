//! Structured error codes shared by the core dispatch layer and anything
//! talking to it across a process boundary (§6.3 console/RPC bridge).
//!
//! These mirror `query_core::CoreError`'s variants but carry no `Box<dyn
//! Error>` source, so they serialize cleanly to the bridge's wire format.

use serde::{Deserialize, Serialize};

/// The §7 error taxonomy, as a wire-stable, serializable code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum KnownError {
    DuplicateEntry { model: String, keys: Vec<String> },
    UnsupportedExpression { operator: String, driver: String },
    ModelMismatch { model: String, field: String },
    DriverUnavailable { table: String },
    BackendError { message: String, statement: Option<String> },
}

impl KnownError {
    pub fn code(&self) -> &'static str {
        match self {
            KnownError::DuplicateEntry { .. } => "duplicate-entry",
            KnownError::UnsupportedExpression { .. } => "unsupported-expression",
            KnownError::ModelMismatch { .. } => "model-mismatch",
            KnownError::DriverUnavailable { .. } => "driver-unavailable",
            KnownError::BackendError { .. } => "backend-error",
        }
    }
}

impl std::fmt::Display for KnownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KnownError::DuplicateEntry { model, keys } => {
                write!(f, "duplicate entry for {model} on {}", keys.join(", "))
            }
            KnownError::UnsupportedExpression { operator, driver } => {
                write!(f, "{driver} cannot lower operator {operator}")
            }
            KnownError::ModelMismatch { model, field } => {
                write!(f, "field `{field}` is not declared on model `{model}`")
            }
            KnownError::DriverUnavailable { table } => write!(f, "no driver bound for table `{table}`"),
            KnownError::BackendError { message, .. } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for KnownError {}

/// The envelope actually sent across the console/RPC bridge (§6.3):
/// a known, structured error or an opaque message for anything else.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserFacingError {
    Known(KnownError),
    Unknown { message: String },
}

impl UserFacingError {
    pub fn marshal(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "message": "serialization failed" }))
    }

    pub fn unmarshal(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_error_round_trips_through_json() {
        let err = UserFacingError::Known(KnownError::ModelMismatch { model: "t".into(), field: "x".into() });
        let json = err.marshal();
        let back = UserFacingError::unmarshal(&json).unwrap();
        match back {
            UserFacingError::Known(KnownError::ModelMismatch { model, field }) => {
                assert_eq!(model, "t");
                assert_eq!(field, "x");
            }
            _ => panic!("expected a known error"),
        }
    }

    #[test]
    fn code_matches_taxonomy_name() {
        assert_eq!(KnownError::DriverUnavailable { table: "t".into() }.code(), "driver-unavailable");
    }
}
