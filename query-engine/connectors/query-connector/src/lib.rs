//! The abstract driver contract (§4.9) every backend implements: the
//! in-memory reference executor, the generic SQL connector, and any document
//! backend. `query-core`'s `Database` facade dispatches through this trait
//! without knowing which concrete backend is bound.

pub mod args;
pub mod error;
pub mod stats;

pub use args::{RemoveResult, UpsertResult, WriteArgs, WriteResult};
pub use error::ConnectorError;
pub use stats::{DatabaseStats, IndexInfo, TableStats};

use async_trait::async_trait;
use query_structure::{ModelRegistry, Selection, Value};

/// What a connector can and cannot do, so the retrieval/compilation layers
/// can fail fast (`UnsupportedExpression`) instead of producing a statement
/// the backend would reject (Open Question 2: aggregate-over-subquery
/// requires array support such as SQLite's `json_each`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The backend can materialise a JSON array as a queryable row source
    /// (`json_each` in SQLite, `jsonb_array_elements` in PostgreSQL).
    pub json_array_aggregation: bool,
}

/// The driver contract (§4.9). Every method that performs I/O is async and
/// instrumented; `query-core` is the only caller.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Idempotent on repeated calls (§4.9 lifecycle contract).
    async fn start(&self) -> Result<(), ConnectorError>;

    /// Idempotent on repeated calls.
    async fn stop(&self) -> Result<(), ConnectorError>;

    /// Ensures storage matches `registry`'s declaration of `table`,
    /// performing legacy-name migrations where needed.
    async fn prepare(&self, registry: &ModelRegistry, table: &str) -> Result<(), ConnectorError>;

    async fn get(
        &self,
        registry: &ModelRegistry,
        selection: &Selection,
    ) -> Result<Vec<std::collections::BTreeMap<String, Value>>, ConnectorError>;

    async fn eval(&self, registry: &ModelRegistry, selection: &Selection) -> Result<Value, ConnectorError>;

    async fn set(&self, registry: &ModelRegistry, selection: &Selection) -> Result<WriteResult, ConnectorError>;

    async fn remove(&self, registry: &ModelRegistry, selection: &Selection) -> Result<RemoveResult, ConnectorError>;

    async fn create(
        &self,
        registry: &ModelRegistry,
        selection: &Selection,
    ) -> Result<std::collections::BTreeMap<String, Value>, ConnectorError>;

    async fn upsert(&self, registry: &ModelRegistry, selection: &Selection) -> Result<UpsertResult, ConnectorError>;

    /// Opens a new session in which subsequent calls are serialized and
    /// visible only to this session until `commit` (§5). The returned handle
    /// owns everything it needs (an `Arc`-backed storage handle, a snapshot,
    /// a lock guard) rather than borrowing from `self`, so it can be held
    /// past the call that produced it.
    async fn start_transaction(&self) -> Result<Box<dyn Transaction>, ConnectorError>;

    async fn drop_table(&self, table: Option<&str>) -> Result<(), ConnectorError>;

    async fn drop_all(&self) -> Result<(), ConnectorError>;

    async fn stats(&self) -> Result<DatabaseStats, ConnectorError>;

    async fn create_index(&self, table: &str, fields: &[String], unique: bool, name: &str) -> Result<(), ConnectorError>;

    async fn drop_index(&self, table: &str, name: &str) -> Result<(), ConnectorError>;

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, ConnectorError>;
}

/// A connector bound to one transactional session. Exposes the same CRUD
/// surface as `Connector` (so `query-core`'s dispatch code doesn't need a
/// separate code path inside a transaction) plus `commit`/`rollback`.
#[async_trait]
pub trait Transaction: Connector {
    async fn commit(self: Box<Self>) -> Result<(), ConnectorError>;

    async fn rollback(self: Box<Self>) -> Result<(), ConnectorError>;
}
