use query_connector::ConnectorError;
use query_structure::SchemaError;
use thiserror::Error;
use user_facing_errors::{KnownError, UserFacingError};

/// Dispatch-layer errors (§7). Mirrors `ConnectorError`'s taxonomy so a
/// caller never has to match on a connector-crate type, adding the one case
/// that only makes sense above the connector boundary: no driver bound to
/// the table a selection targets.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("duplicate entry on model `{model}` for key(s) {}", keys.join(", "))]
    DuplicateEntry { model: String, keys: Vec<String> },

    #[error("{driver} cannot lower operator `{operator}`")]
    UnsupportedExpression { driver: &'static str, operator: String },

    #[error("field `{field}` is not declared on model `{model}`")]
    ModelMismatch { model: String, field: String },

    #[error("no driver is bound to table `{table}`")]
    DriverUnavailable { table: String },

    #[error("backend error: {message}")]
    BackendError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Structural errors from declaring/merging models or resolving a
    /// query's field paths against the registry (§7 policy: "the retrieval
    /// pass surfaces structural errors before any I/O").
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// The wire-stable shape sent across the console/RPC bridge (§6.3). Schema
/// errors have no one-to-one §7 taxonomy entry (they arise from declaring
/// models, not from dispatching a query), so they serialize as `Unknown`.
impl From<&CoreError> for UserFacingError {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::DuplicateEntry { model, keys } => {
                UserFacingError::Known(KnownError::DuplicateEntry { model: model.clone(), keys: keys.clone() })
            }
            CoreError::UnsupportedExpression { driver, operator } => UserFacingError::Known(
                KnownError::UnsupportedExpression { operator: operator.clone(), driver: driver.to_string() },
            ),
            CoreError::ModelMismatch { model, field } => {
                UserFacingError::Known(KnownError::ModelMismatch { model: model.clone(), field: field.clone() })
            }
            CoreError::DriverUnavailable { table } => {
                UserFacingError::Known(KnownError::DriverUnavailable { table: table.clone() })
            }
            CoreError::BackendError { message, .. } => {
                UserFacingError::Known(KnownError::BackendError { message: message.clone(), statement: None })
            }
            CoreError::Schema(e) => UserFacingError::Unknown { message: e.to_string() },
        }
    }
}

impl From<ConnectorError> for CoreError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::DuplicateEntry { model, keys } => CoreError::DuplicateEntry { model, keys },
            ConnectorError::UnsupportedExpression { driver, operator } => {
                CoreError::UnsupportedExpression { driver, operator }
            }
            ConnectorError::ModelMismatch { model, field } => CoreError::ModelMismatch { model, field },
            ConnectorError::Backend { message, statement, source } => CoreError::BackendError {
                message: match statement {
                    Some(stmt) => format!("{message} (statement: {stmt})"),
                    None => message,
                },
                source,
            },
        }
    }
}
