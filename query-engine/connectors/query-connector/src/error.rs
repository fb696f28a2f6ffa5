use thiserror::Error;

/// Errors a `Connector` implementation raises (§7). `query-core` wraps these
/// into `CoreError` with `#[from]`, adding the dispatch-level cases
/// (`driver-unavailable`) that only make sense above the connector boundary.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("duplicate entry on model `{model}` for key(s) {}", keys.join(", "))]
    DuplicateEntry { model: String, keys: Vec<String> },

    #[error("{driver} cannot lower operator `{operator}`")]
    UnsupportedExpression { driver: &'static str, operator: String },

    #[error("field `{field}` is not declared on model `{model}`")]
    ModelMismatch { model: String, field: String },

    #[error("backend error: {message}")]
    Backend {
        message: String,
        statement: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    pub fn backend(message: impl Into<String>) -> Self {
        ConnectorError::Backend { message: message.into(), statement: None, source: None }
    }

    pub fn backend_with_statement(message: impl Into<String>, statement: impl Into<String>) -> Self {
        ConnectorError::Backend { message: message.into(), statement: Some(statement.into()), source: None }
    }
}
