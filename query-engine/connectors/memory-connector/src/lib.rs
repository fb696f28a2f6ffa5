//! The in-memory reference executor (§4.8). Its semantics are the ground
//! truth every other connector (SQL, document) must reproduce: this crate is
//! consulted, not optimised against, when a behaviour is ambiguous elsewhere.

mod eval;
mod exec;
mod query;
mod storage;
mod write;

use async_trait::async_trait;
use query_connector::{
    Capabilities, ConnectorError, DatabaseStats, IndexInfo, RemoveResult, TableStats, Transaction, UpsertResult,
    WriteResult,
};
use query_connector::Connector;
use query_structure::{ModelRegistry, Selection, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use storage::{Snapshot, Storage};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A process-resident connector over [`Storage`]. Cheap to clone — every
/// clone shares the same tables and transaction lock.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    storage: Arc<Storage>,
    tx_lock: Arc<Mutex<()>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        MemoryConnector::default()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { json_array_aggregation: true }
    }

    async fn start(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    #[tracing::instrument(skip(self, _registry))]
    async fn prepare(&self, _registry: &ModelRegistry, table: &str) -> Result<(), ConnectorError> {
        self.storage.ensure_table(table);
        Ok(())
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn get(
        &self,
        registry: &ModelRegistry,
        selection: &Selection,
    ) -> Result<Vec<BTreeMap<String, Value>>, ConnectorError> {
        exec::execute_get(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn eval(&self, registry: &ModelRegistry, selection: &Selection) -> Result<Value, ConnectorError> {
        exec::execute_eval(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn set(&self, registry: &ModelRegistry, selection: &Selection) -> Result<WriteResult, ConnectorError> {
        write::execute_set(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn remove(&self, registry: &ModelRegistry, selection: &Selection) -> Result<RemoveResult, ConnectorError> {
        write::execute_remove(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn create(
        &self,
        registry: &ModelRegistry,
        selection: &Selection,
    ) -> Result<BTreeMap<String, Value>, ConnectorError> {
        write::execute_create(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn upsert(&self, registry: &ModelRegistry, selection: &Selection) -> Result<UpsertResult, ConnectorError> {
        write::execute_upsert(&self.storage, registry, selection)
    }

    /// §5: the in-memory connector provides serializability "trivially" — a
    /// single writer session is in flight at a time, so every transaction
    /// already sees a consistent, isolated view without MVCC bookkeeping.
    #[tracing::instrument(skip(self))]
    async fn start_transaction(&self) -> Result<Box<dyn Transaction>, ConnectorError> {
        let guard = self.tx_lock.clone().lock_owned().await;
        let snapshot = self.storage.snapshot();
        Ok(Box::new(MemoryTransaction { storage: self.storage.clone(), snapshot: Some(snapshot), _guard: guard }))
    }

    async fn drop_table(&self, table: Option<&str>) -> Result<(), ConnectorError> {
        match table {
            Some(table) => self.storage.drop_table(table),
            None => self.storage.drop_all(),
        }
        Ok(())
    }

    async fn drop_all(&self) -> Result<(), ConnectorError> {
        self.storage.drop_all();
        Ok(())
    }

    async fn stats(&self) -> Result<DatabaseStats, ConnectorError> {
        let tables = self
            .storage
            .table_names()
            .into_iter()
            .map(|name| {
                let rows = self.storage.row_count(&name);
                (name, TableStats { rows })
            })
            .collect();
        Ok(DatabaseStats { backend: self.name(), tables })
    }

    async fn create_index(&self, table: &str, fields: &[String], unique: bool, name: &str) -> Result<(), ConnectorError> {
        self.storage.create_index(table, IndexInfo { name: name.to_string(), fields: fields.to_vec(), unique });
        Ok(())
    }

    async fn drop_index(&self, table: &str, name: &str) -> Result<(), ConnectorError> {
        self.storage.drop_index(table, name);
        Ok(())
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, ConnectorError> {
        Ok(self.storage.get_indexes(table))
    }
}

/// One in-flight transaction session. Holds the process-wide write lock for
/// its lifetime; `rollback` restores the snapshot taken at `start_transaction`,
/// `commit` simply drops it.
pub struct MemoryTransaction {
    storage: Arc<Storage>,
    snapshot: Option<Snapshot>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl Connector for MemoryTransaction {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { json_array_aggregation: true }
    }

    async fn start(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    #[tracing::instrument(skip(self, _registry))]
    async fn prepare(&self, _registry: &ModelRegistry, table: &str) -> Result<(), ConnectorError> {
        self.storage.ensure_table(table);
        Ok(())
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn get(
        &self,
        registry: &ModelRegistry,
        selection: &Selection,
    ) -> Result<Vec<BTreeMap<String, Value>>, ConnectorError> {
        exec::execute_get(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn eval(&self, registry: &ModelRegistry, selection: &Selection) -> Result<Value, ConnectorError> {
        exec::execute_eval(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn set(&self, registry: &ModelRegistry, selection: &Selection) -> Result<WriteResult, ConnectorError> {
        write::execute_set(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn remove(&self, registry: &ModelRegistry, selection: &Selection) -> Result<RemoveResult, ConnectorError> {
        write::execute_remove(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn create(
        &self,
        registry: &ModelRegistry,
        selection: &Selection,
    ) -> Result<BTreeMap<String, Value>, ConnectorError> {
        write::execute_create(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self, registry, selection))]
    async fn upsert(&self, registry: &ModelRegistry, selection: &Selection) -> Result<UpsertResult, ConnectorError> {
        write::execute_upsert(&self.storage, registry, selection)
    }

    #[tracing::instrument(skip(self))]
    async fn start_transaction(&self) -> Result<Box<dyn Transaction>, ConnectorError> {
        Err(ConnectorError::backend("nested transactions are not supported"))
    }

    async fn drop_table(&self, table: Option<&str>) -> Result<(), ConnectorError> {
        match table {
            Some(table) => self.storage.drop_table(table),
            None => self.storage.drop_all(),
        }
        Ok(())
    }

    async fn drop_all(&self) -> Result<(), ConnectorError> {
        self.storage.drop_all();
        Ok(())
    }

    async fn stats(&self) -> Result<DatabaseStats, ConnectorError> {
        let tables = self
            .storage
            .table_names()
            .into_iter()
            .map(|name| {
                let rows = self.storage.row_count(&name);
                (name, TableStats { rows })
            })
            .collect();
        Ok(DatabaseStats { backend: self.name(), tables })
    }

    async fn create_index(&self, table: &str, fields: &[String], unique: bool, name: &str) -> Result<(), ConnectorError> {
        self.storage.create_index(table, IndexInfo { name: name.to_string(), fields: fields.to_vec(), unique });
        Ok(())
    }

    async fn drop_index(&self, table: &str, name: &str) -> Result<(), ConnectorError> {
        self.storage.drop_index(table, name);
        Ok(())
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, ConnectorError> {
        Ok(self.storage.get_indexes(table))
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    #[tracing::instrument(skip(self))]
    async fn commit(self: Box<Self>) -> Result<(), ConnectorError> {
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn rollback(mut self: Box<Self>) -> Result<(), ConnectorError> {
        if let Some(snapshot) = self.snapshot.take() {
            self.storage.restore(snapshot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use query_structure::{Field, FieldKind, ModelConfig, Query};

    fn registry_with_counters() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Field::new("id", FieldKind::Integer));
        fields.insert("total".to_string(), Field::new("total", FieldKind::Float));
        registry
            .extend("counters", fields, ModelConfig { auto_inc: true, ..Default::default() })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn create_then_get_round_trips_a_row() {
        let connector = MemoryConnector::new();
        let registry = registry_with_counters();
        connector.prepare(&registry, "counters").await.unwrap();

        let mut row = BTreeMap::new();
        row.insert("total".to_string(), Value::Float(3.0));
        let created = connector
            .create(&registry, &Selection::create("counters", row))
            .await
            .unwrap();
        assert_eq!(created.get("id"), Some(&Value::Int(1)));

        let mut sel = Selection::get("counters");
        sel.model = Some("counters".to_string());
        sel.tables.insert(sel.r#ref.0.clone(), "counters".to_string());
        let rows = connector.get(&registry, &sel).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn rollback_restores_pre_transaction_state() {
        let connector = MemoryConnector::new();
        let registry = registry_with_counters();
        connector.prepare(&registry, "counters").await.unwrap();

        let tx = connector.start_transaction().await.unwrap();
        let mut row = BTreeMap::new();
        row.insert("total".to_string(), Value::Float(1.0));
        tx.create(&registry, &Selection::create("counters", row)).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(connector.storage.row_count("counters"), 0);
    }

    #[tokio::test]
    async fn remove_deletes_matching_rows() {
        let connector = MemoryConnector::new();
        let registry = registry_with_counters();
        connector.prepare(&registry, "counters").await.unwrap();

        let mut row = BTreeMap::new();
        row.insert("total".to_string(), Value::Float(1.0));
        connector.create(&registry, &Selection::create("counters", row)).await.unwrap();

        let mut sel = Selection::remove("counters");
        sel.tables.insert(sel.r#ref.0.clone(), "counters".to_string());
        sel.query = Query::empty().field("id", query_structure::filter::FieldPredicate::eq(1i64));
        let result = connector.remove(&registry, &sel).await.unwrap();
        assert_eq!(result.removed, 1);
        assert_eq!(connector.storage.row_count("counters"), 0);
    }
}
