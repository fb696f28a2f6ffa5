//! A generic, dialect-driven `Connector` built on `sql-query-builder`
//! (§4.6, §4.9). A concrete driver (`sqlite-connector`) only has to
//! implement [`SqlExecutor`]; everything above that — compiling a
//! `Selection`, rendering it, folding results into `Connector`'s return
//! types — lives here once.

mod dispatch;
pub mod executor;

pub use executor::{Row, SqlExecutor, SqlTransactionHandle};

use async_trait::async_trait;
use query_connector::{
    Capabilities, ConnectorError, Connector, DatabaseStats, IndexInfo, RemoveResult, Transaction, UpsertResult,
    WriteResult,
};
use query_structure::{ModelRegistry, Selection, Value};
use std::sync::Arc;

/// Wraps one `SqlExecutor` as a full `Connector`. Cheap to clone — every
/// clone shares the same executor (typically a pooled connection handle).
#[derive(Clone)]
pub struct SqlConnector {
    executor: Arc<dyn SqlExecutor>,
    capabilities: Capabilities,
}

impl SqlConnector {
    pub fn new(executor: Arc<dyn SqlExecutor>, capabilities: Capabilities) -> Self {
        SqlConnector { executor, capabilities }
    }
}

#[async_trait]
impl Connector for SqlConnector {
    fn name(&self) -> &'static str {
        self.executor.dialect().name()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn start(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    #[tracing::instrument(skip(self, registry))]
    async fn prepare(&self, registry: &ModelRegistry, table: &str) -> Result<(), ConnectorError> {
        self.executor.ensure_table(registry, table).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn get(&self, registry: &ModelRegistry, selection: &Selection) -> Result<Vec<Row>, ConnectorError> {
        dispatch::get(self.executor.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn eval(&self, registry: &ModelRegistry, selection: &Selection) -> Result<Value, ConnectorError> {
        dispatch::eval(self.executor.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn set(&self, registry: &ModelRegistry, selection: &Selection) -> Result<WriteResult, ConnectorError> {
        dispatch::set(self.executor.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn remove(&self, registry: &ModelRegistry, selection: &Selection) -> Result<RemoveResult, ConnectorError> {
        dispatch::remove(self.executor.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn create(&self, registry: &ModelRegistry, selection: &Selection) -> Result<Row, ConnectorError> {
        dispatch::create(self.executor.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn upsert(&self, registry: &ModelRegistry, selection: &Selection) -> Result<UpsertResult, ConnectorError> {
        dispatch::upsert(self.executor.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self))]
    async fn start_transaction(&self) -> Result<Box<dyn Transaction>, ConnectorError> {
        let handle = self.executor.begin_transaction().await?;
        Ok(Box::new(SqlTransaction { handle, capabilities: self.capabilities }))
    }

    async fn drop_table(&self, table: Option<&str>) -> Result<(), ConnectorError> {
        self.executor.drop_table(table).await
    }

    async fn drop_all(&self) -> Result<(), ConnectorError> {
        self.executor.drop_table(None).await
    }

    async fn stats(&self) -> Result<DatabaseStats, ConnectorError> {
        self.executor.stats().await
    }

    async fn create_index(&self, table: &str, fields: &[String], unique: bool, name: &str) -> Result<(), ConnectorError> {
        self.executor.create_index(table, fields, unique, name).await
    }

    async fn drop_index(&self, table: &str, name: &str) -> Result<(), ConnectorError> {
        self.executor.drop_index(table, name).await
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, ConnectorError> {
        self.executor.get_indexes(table).await
    }
}

/// One in-flight SQL transaction session (§5). Delegates to the same
/// `dispatch` functions `SqlConnector` does, just against the
/// transaction-scoped executor handle.
pub struct SqlTransaction {
    handle: Box<dyn SqlTransactionHandle>,
    capabilities: Capabilities,
}

#[async_trait]
impl Connector for SqlTransaction {
    fn name(&self) -> &'static str {
        self.handle.dialect().name()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn start(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    #[tracing::instrument(skip(self, registry))]
    async fn prepare(&self, registry: &ModelRegistry, table: &str) -> Result<(), ConnectorError> {
        self.handle.ensure_table(registry, table).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn get(&self, registry: &ModelRegistry, selection: &Selection) -> Result<Vec<Row>, ConnectorError> {
        dispatch::get(self.handle.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn eval(&self, registry: &ModelRegistry, selection: &Selection) -> Result<Value, ConnectorError> {
        dispatch::eval(self.handle.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn set(&self, registry: &ModelRegistry, selection: &Selection) -> Result<WriteResult, ConnectorError> {
        dispatch::set(self.handle.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn remove(&self, registry: &ModelRegistry, selection: &Selection) -> Result<RemoveResult, ConnectorError> {
        dispatch::remove(self.handle.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn create(&self, registry: &ModelRegistry, selection: &Selection) -> Result<Row, ConnectorError> {
        dispatch::create(self.handle.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn upsert(&self, registry: &ModelRegistry, selection: &Selection) -> Result<UpsertResult, ConnectorError> {
        dispatch::upsert(self.handle.as_ref(), registry, selection).await
    }

    #[tracing::instrument(skip(self))]
    async fn start_transaction(&self) -> Result<Box<dyn Transaction>, ConnectorError> {
        Err(ConnectorError::backend("nested transactions are not supported"))
    }

    async fn drop_table(&self, table: Option<&str>) -> Result<(), ConnectorError> {
        self.handle.drop_table(table).await
    }

    async fn drop_all(&self) -> Result<(), ConnectorError> {
        self.handle.drop_table(None).await
    }

    async fn stats(&self) -> Result<DatabaseStats, ConnectorError> {
        self.handle.stats().await
    }

    async fn create_index(&self, table: &str, fields: &[String], unique: bool, name: &str) -> Result<(), ConnectorError> {
        self.handle.create_index(table, fields, unique, name).await
    }

    async fn drop_index(&self, table: &str, name: &str) -> Result<(), ConnectorError> {
        self.handle.drop_index(table, name).await
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, ConnectorError> {
        self.handle.get_indexes(table).await
    }
}

#[async_trait]
impl Transaction for SqlTransaction {
    #[tracing::instrument(skip(self))]
    async fn commit(self: Box<Self>) -> Result<(), ConnectorError> {
        self.handle.commit().await
    }

    #[tracing::instrument(skip(self))]
    async fn rollback(self: Box<Self>) -> Result<(), ConnectorError> {
        self.handle.rollback().await
    }
}
