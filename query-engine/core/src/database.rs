//! The `Database` facade (§6.1 public API surface, §5 concurrency model):
//! owns the model registry and every registered driver, binds tables to
//! drivers, and dispatches each operation through the retrieval pass before
//! delegating to the bound `Connector`.
//!
//! Registry and driver-registration state is read far more often than
//! written, so it lives behind `tokio::sync::RwLock` rather than
//! `parking_lot` — dispatch methods hold a read guard across the `.await`
//! that calls into a connector, and a `parking_lot` guard held across an
//! await point would risk blocking the runtime thread it's polled on.

use crate::error::CoreError;
use indexmap::IndexMap;
use query_connector::{Connector, DatabaseStats, IndexInfo, RemoveResult, TableStats, Transaction, UpsertResult, WriteResult};
use query_structure::{retrieve, DriverId, Field, ModelConfig, ModelRegistry, Selection, TypeAlias, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

struct DriverEntry {
    connector: Arc<dyn Connector>,
    #[allow(dead_code)] // kept for diagnostics/logging, not read by dispatch
    name: Option<String>,
}

/// The process-wide facade (§4.1, §5 "Shared resources"): one registry, one
/// set of registered drivers, shared by every caller. Typically held behind
/// an `Arc` so callers can clone cheaply and share one instance.
pub struct Database {
    registry: RwLock<ModelRegistry>,
    drivers: RwLock<Vec<DriverEntry>>,
    table_driver: RwLock<BTreeMap<String, DriverId>>,
    /// Tables that have already gone through the `prepare()` barrier (§5,
    /// §9 design note: "prepare is called lazily on first I/O against a
    /// table, then cached for the lifetime of the process").
    prepared: RwLock<BTreeSet<String>>,
    /// Serializes `with_transaction` calls: "the next `withTransaction`
    /// awaits the previous task" (§5).
    tx_lock: Arc<Mutex<()>>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Database {
            registry: RwLock::new(ModelRegistry::new()),
            drivers: RwLock::new(Vec::new()),
            table_driver: RwLock::new(BTreeMap::new()),
            prepared: RwLock::new(BTreeSet::new()),
            tx_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Declares or extends a model (§4.2 `extend`).
    #[tracing::instrument(skip(self, fields))]
    pub async fn extend(
        &self,
        table: impl Into<String> + std::fmt::Debug,
        fields: IndexMap<String, Field>,
        config: ModelConfig,
    ) -> Result<(), CoreError> {
        let mut registry = self.registry.write().await;
        registry.extend(table, fields, config)?;
        Ok(())
    }

    /// Registers a user type alias (§4.2 `define`).
    pub async fn define(&self, alias: TypeAlias) {
        self.registry.write().await.define(alias);
    }

    /// Registers a started connector and binds it to the given tables (§4.1
    /// `connect`). The base `connect(driverCtor, config, name?)` operation
    /// doesn't say how tables map to drivers, since a driver constructed
    /// from a bare connection string has no way to know which models it's
    /// meant to serve — so this takes the table list explicitly, with
    /// `name` kept as an optional human-readable label.
    #[tracing::instrument(skip(self, connector, tables))]
    pub async fn connect(
        &self,
        connector: Arc<dyn Connector>,
        tables: impl IntoIterator<Item = impl Into<String>>,
        name: Option<String>,
    ) -> Result<DriverId, CoreError> {
        connector.start().await?;
        let mut drivers = self.drivers.write().await;
        let id = DriverId(drivers.len());
        drivers.push(DriverEntry { connector, name });
        drop(drivers);

        let mut table_driver = self.table_driver.write().await;
        for table in tables {
            table_driver.insert(table.into(), id);
        }
        Ok(id)
    }

    async fn resolve(&self, sel: Selection) -> Result<(Selection, Arc<dyn Connector>), CoreError> {
        let registry = self.registry.read().await;
        let table_driver = self.table_driver.read().await;
        let resolver = |table: &str| table_driver.get(table).copied();
        let retrieved = retrieve(sel, &registry, &resolver)?;
        let table = retrieved.table_name().unwrap_or("?").to_string();
        let driver_id = retrieved.driver.ok_or(CoreError::DriverUnavailable { table: table.clone() })?;
        let drivers = self.drivers.read().await;
        let connector = drivers
            .get(driver_id.0)
            .map(|entry| entry.connector.clone())
            .ok_or(CoreError::DriverUnavailable { table: table.clone() })?;
        drop(drivers);
        self.ensure_prepared(&registry, &retrieved, connector.as_ref()).await?;
        Ok((retrieved, connector))
    }

    async fn ensure_prepared(
        &self,
        registry: &ModelRegistry,
        sel: &Selection,
        connector: &dyn Connector,
    ) -> Result<(), CoreError> {
        let mut tables: Vec<&String> = sel.tables.values().collect();
        tables.sort();
        tables.dedup();
        let mut prepared = self.prepared.write().await;
        for table in tables {
            if prepared.insert(table.clone()) {
                connector.prepare(registry, table).await?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, selection))]
    pub async fn get(&self, selection: Selection) -> Result<Vec<BTreeMap<String, Value>>, CoreError> {
        let (selection, connector) = self.resolve(selection).await?;
        let registry = self.registry.read().await;
        Ok(connector.get(&registry, &selection).await?)
    }

    #[tracing::instrument(skip(self, selection))]
    pub async fn eval(&self, selection: Selection) -> Result<Value, CoreError> {
        let (selection, connector) = self.resolve(selection).await?;
        let registry = self.registry.read().await;
        Ok(connector.eval(&registry, &selection).await?)
    }

    #[tracing::instrument(skip(self, selection))]
    pub async fn set(&self, selection: Selection) -> Result<WriteResult, CoreError> {
        let (selection, connector) = self.resolve(selection).await?;
        let registry = self.registry.read().await;
        Ok(connector.set(&registry, &selection).await?)
    }

    #[tracing::instrument(skip(self, selection))]
    pub async fn remove(&self, selection: Selection) -> Result<RemoveResult, CoreError> {
        let (selection, connector) = self.resolve(selection).await?;
        let registry = self.registry.read().await;
        Ok(connector.remove(&registry, &selection).await?)
    }

    #[tracing::instrument(skip(self, selection))]
    pub async fn create(&self, selection: Selection) -> Result<BTreeMap<String, Value>, CoreError> {
        let (selection, connector) = self.resolve(selection).await?;
        let registry = self.registry.read().await;
        Ok(connector.create(&registry, &selection).await?)
    }

    #[tracing::instrument(skip(self, selection))]
    pub async fn upsert(&self, selection: Selection) -> Result<UpsertResult, CoreError> {
        let (selection, connector) = self.resolve(selection).await?;
        let registry = self.registry.read().await;
        Ok(connector.upsert(&registry, &selection).await?)
    }

    async fn driver_for_table(&self, table: &str) -> Result<Arc<dyn Connector>, CoreError> {
        let driver_id = self
            .table_driver
            .read()
            .await
            .get(table)
            .copied()
            .ok_or_else(|| CoreError::DriverUnavailable { table: table.to_string() })?;
        self.drivers
            .read()
            .await
            .get(driver_id.0)
            .map(|entry| entry.connector.clone())
            .ok_or_else(|| CoreError::DriverUnavailable { table: table.to_string() })
    }

    /// Drops one table, or every table on every registered driver if
    /// `table` is `None` (§4.9 `drop`).
    pub async fn drop(&self, table: Option<&str>) -> Result<(), CoreError> {
        match table {
            Some(table) => {
                let connector = self.driver_for_table(table).await?;
                connector.drop_table(Some(table)).await?;
                self.prepared.write().await.remove(table);
            }
            None => self.drop_all().await?,
        }
        Ok(())
    }

    /// Resets every registered driver (§6.1 `dropAll`). Clears the
    /// prepare-barrier cache, since every table just went away.
    pub async fn drop_all(&self) -> Result<(), CoreError> {
        let drivers = self.drivers.read().await;
        for entry in drivers.iter() {
            entry.connector.drop_all().await?;
        }
        drop(drivers);
        self.prepared.write().await.clear();
        Ok(())
    }

    /// Stops every registered driver (§6.1 `stopAll`): lifecycle shutdown,
    /// idempotent per `Connector::stop`'s contract.
    pub async fn stop_all(&self) -> Result<(), CoreError> {
        let drivers = self.drivers.read().await;
        for entry in drivers.iter() {
            entry.connector.stop().await?;
        }
        Ok(())
    }

    /// Aggregates `stats` across every registered driver (§4.9 `stats`,
    /// supplemented per §2: the driver contract names the operation without
    /// a concrete shape across more than one connector).
    pub async fn stats(&self) -> Result<DatabaseStats, CoreError> {
        let drivers = self.drivers.read().await;
        let mut tables: BTreeMap<String, TableStats> = BTreeMap::new();
        let mut backend: &'static str = "empty";
        for entry in drivers.iter() {
            let stats = entry.connector.stats().await?;
            backend = if drivers.len() == 1 { stats.backend } else { "multi" };
            tables.extend(stats.tables);
        }
        Ok(DatabaseStats { backend, tables })
    }

    pub async fn create_index(&self, table: &str, fields: &[String], unique: bool, name: &str) -> Result<(), CoreError> {
        let connector = self.driver_for_table(table).await?;
        Ok(connector.create_index(table, fields, unique, name).await?)
    }

    pub async fn drop_index(&self, table: &str, name: &str) -> Result<(), CoreError> {
        let connector = self.driver_for_table(table).await?;
        Ok(connector.drop_index(table, name).await?)
    }

    pub async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, CoreError> {
        let connector = self.driver_for_table(table).await?;
        Ok(connector.get_indexes(table).await?)
    }

    /// Runs `f` against a transactional `Session` spanning every
    /// registered driver (§5: "all connectors opened by one client share a
    /// transaction boundary"). Calls are serialized: the next
    /// `with_transaction` waits for this one's commit or rollback before
    /// opening its own session.
    #[tracing::instrument(skip(self, f))]
    pub async fn with_transaction<F, Fut, T>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Session) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let _serialize = self.tx_lock.clone().lock_owned().await;

        let registry = self.registry.read().await.clone();
        let table_driver = self.table_driver.read().await.clone();
        let driver_count = self.drivers.read().await.len();

        let mut handles = Vec::with_capacity(driver_count);
        for i in 0..driver_count {
            let connector = self.drivers.read().await[i].connector.clone();
            let handle = connector.start_transaction().await?;
            handles.push((DriverId(i), handle));
        }

        let session = Session { registry, table_driver, handles };
        let result = f(&session).await;

        match result {
            Ok(value) => {
                for (_, handle) in session.handles {
                    handle.commit().await?;
                }
                Ok(value)
            }
            Err(err) => {
                for (_, handle) in session.handles {
                    if let Err(rollback_err) = handle.rollback().await {
                        tracing::warn!(error = %rollback_err, "rollback failed for one driver, continuing to roll back the rest");
                    }
                }
                Err(err)
            }
        }
    }
}

/// One transactional session opened by `with_transaction`, exposing the
/// same CRUD surface as `Database` but dispatching to the open `Transaction`
/// handle for each driver instead of the committed `Connector`. Commits
/// every handle on success, rolls every handle back on the first error —
/// best-effort atomicity across drivers, not a two-phase commit (§9 Open
/// Question: multi-driver transactions are out of scope for a real
/// coordinator, so this session just fans the same outcome out to all of
/// them).
pub struct Session {
    registry: ModelRegistry,
    table_driver: BTreeMap<String, DriverId>,
    handles: Vec<(DriverId, Box<dyn Transaction>)>,
}

impl Session {
    fn handle_for(&self, driver_id: DriverId) -> Option<&dyn Transaction> {
        self.handles.iter().find(|(id, _)| *id == driver_id).map(|(_, h)| h.as_ref())
    }

    fn resolve(&self, sel: Selection) -> Result<(Selection, &dyn Transaction), CoreError> {
        let resolver = |table: &str| self.table_driver.get(table).copied();
        let retrieved = retrieve(sel, &self.registry, &resolver)?;
        let table = retrieved.table_name().unwrap_or("?").to_string();
        let driver_id = retrieved.driver.ok_or(CoreError::DriverUnavailable { table: table.clone() })?;
        let handle = self.handle_for(driver_id).ok_or(CoreError::DriverUnavailable { table })?;
        Ok((retrieved, handle))
    }

    pub async fn get(&self, selection: Selection) -> Result<Vec<BTreeMap<String, Value>>, CoreError> {
        let (selection, handle) = self.resolve(selection)?;
        Ok(handle.get(&self.registry, &selection).await?)
    }

    pub async fn eval(&self, selection: Selection) -> Result<Value, CoreError> {
        let (selection, handle) = self.resolve(selection)?;
        Ok(handle.eval(&self.registry, &selection).await?)
    }

    pub async fn set(&self, selection: Selection) -> Result<WriteResult, CoreError> {
        let (selection, handle) = self.resolve(selection)?;
        Ok(handle.set(&self.registry, &selection).await?)
    }

    pub async fn remove(&self, selection: Selection) -> Result<RemoveResult, CoreError> {
        let (selection, handle) = self.resolve(selection)?;
        Ok(handle.remove(&self.registry, &selection).await?)
    }

    pub async fn create(&self, selection: Selection) -> Result<BTreeMap<String, Value>, CoreError> {
        let (selection, handle) = self.resolve(selection)?;
        Ok(handle.create(&self.registry, &selection).await?)
    }

    pub async fn upsert(&self, selection: Selection) -> Result<UpsertResult, CoreError> {
        let (selection, handle) = self.resolve(selection)?;
        Ok(handle.upsert(&self.registry, &selection).await?)
    }
}
