//! Connection-target parsing (§1.3). `connection-string` (`quaint`'s own
//! dependency for this) is JDBC-shaped and a poor fit for the two trivial
//! schemes this workspace's connectors actually need, so this is a few
//! lines of manual scheme-prefix parsing instead (see DESIGN.md).

use thiserror::Error;

/// A parsed connection target (§1.3). One variant per connector this
/// workspace ships; a real multi-backend facade would make this open
/// (a trait object or a registry of scheme handlers), but two demonstration
/// connectors don't justify that abstraction yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectorConfig {
    Memory,
    Sqlite { path: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("connection string `{0}` has no recognised scheme (expected memory:// or sqlite:...)")]
    UnrecognisedScheme(String),
}

impl ConnectorConfig {
    /// Parses `memory://`, `sqlite:///path/to/file.db`, or `sqlite::memory:`.
    pub fn parse(connection_string: &str) -> Result<Self, ConfigError> {
        if connection_string.starts_with("memory://") {
            return Ok(ConnectorConfig::Memory);
        }
        if let Some(rest) = connection_string.strip_prefix("sqlite://") {
            return Ok(ConnectorConfig::Sqlite { path: rest.to_string() });
        }
        if let Some(rest) = connection_string.strip_prefix("sqlite:") {
            return Ok(ConnectorConfig::Sqlite { path: rest.to_string() });
        }
        Err(ConfigError::UnrecognisedScheme(connection_string.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_scheme() {
        assert_eq!(ConnectorConfig::parse("memory://").unwrap(), ConnectorConfig::Memory);
    }

    #[test]
    fn parses_sqlite_file_path() {
        assert_eq!(
            ConnectorConfig::parse("sqlite:///path/to/file.db").unwrap(),
            ConnectorConfig::Sqlite { path: "/path/to/file.db".to_string() }
        );
    }

    #[test]
    fn parses_sqlite_in_memory_shorthand() {
        assert_eq!(
            ConnectorConfig::parse("sqlite::memory:").unwrap(),
            ConnectorConfig::Sqlite { path: ":memory:".to_string() }
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(ConnectorConfig::parse("postgres://localhost/db").is_err());
    }
}
