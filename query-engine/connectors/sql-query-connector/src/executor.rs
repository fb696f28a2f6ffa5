use async_trait::async_trait;
use query_connector::{ConnectorError, DatabaseStats, IndexInfo};
use query_structure::{ModelRegistry, Value};
use sql_query_builder::Dialect;
use std::collections::BTreeMap;

pub type Row = BTreeMap<String, Value>;

/// The low-level surface a concrete SQL driver supplies: text-plus-
/// parameters in, rows or an affected-row count out. `sql-query-connector`'s
/// `Connector` impl compiles a `Selection` down to this surface; it never
/// touches a driver crate directly (§9: "one concrete skeleton
/// parameterised by a record of dialect hooks" — this trait is the other
/// half of that parameterisation, the I/O half).
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, ConnectorError>;

    /// Runs a statement with no result set, returning the affected row
    /// count (`sqlite3_changes`-style).
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64, ConnectorError>;

    async fn ensure_table(&self, registry: &ModelRegistry, table: &str) -> Result<(), ConnectorError>;

    async fn drop_table(&self, table: Option<&str>) -> Result<(), ConnectorError>;

    async fn stats(&self) -> Result<DatabaseStats, ConnectorError>;

    async fn create_index(&self, table: &str, fields: &[String], unique: bool, name: &str) -> Result<(), ConnectorError>;

    async fn drop_index(&self, table: &str, name: &str) -> Result<(), ConnectorError>;

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, ConnectorError>;

    /// Opens a transaction, returning a handle scoped to it. Every
    /// `SqlExecutor` method on the handle runs inside that transaction
    /// until `commit`/`rollback` (§5).
    async fn begin_transaction(&self) -> Result<Box<dyn SqlTransactionHandle>, ConnectorError>;
}

#[async_trait]
pub trait SqlTransactionHandle: SqlExecutor {
    async fn commit(self: Box<Self>) -> Result<(), ConnectorError>;

    async fn rollback(self: Box<Self>) -> Result<(), ConnectorError>;
}
