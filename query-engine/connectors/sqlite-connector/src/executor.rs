//! [`SqliteExecutor`]/[`SqliteTransactionHandle`]: the `SqlExecutor` surface
//! `sql-query-connector` drives, backed by one shared `rusqlite::Connection`
//! (§6.4). Transactions are plain `BEGIN`/`COMMIT`/`ROLLBACK` statements
//! against that same connection rather than `rusqlite::Transaction<'conn>`,
//! whose borrow can't cross the `async_trait` boxed-trait-object boundary
//! this crate needs to hand a transaction handle back through `Connector`.

use crate::convert::{from_ref, SqlValue};
use crate::dialect::SqliteDialect;
use crate::schema::create_table_sql;
use async_trait::async_trait;
use parking_lot::Mutex;
use query_connector::{ConnectorError, DatabaseStats, IndexInfo, TableStats};
use query_structure::ModelRegistry;
use query_value::Value;
use rusqlite::Connection;
use sql_query_builder::Dialect;
use sql_query_connector::{Row, SqlExecutor, SqlTransactionHandle};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Schema(#[from] query_structure::SchemaError),
}

impl From<SqliteError> for ConnectorError {
    fn from(err: SqliteError) -> Self {
        ConnectorError::backend(err.to_string())
    }
}

/// Shared connection state. `Arc`-wrapped so `SqliteExecutor` and every
/// `SqliteTransactionHandle` it opens operate on the exact same connection
/// — required for `BEGIN`-based transactions to actually scope the writes
/// issued through the handle.
struct Shared {
    conn: Mutex<Connection>,
    dialect: SqliteDialect,
}

impl Shared {
    fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ConnectorError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(SqliteError::from)?;
        let bound: Vec<SqlValue> = params.iter().map(SqlValue).collect();
        let bound_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|v| v as &dyn rusqlite::ToSql).collect();

        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query(bound_refs.as_slice()).map_err(SqliteError::from)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(SqliteError::from)? {
            let mut map: Row = BTreeMap::new();
            for (i, name) in column_names.iter().enumerate() {
                let value_ref = row.get_ref(i).map_err(SqliteError::from)?;
                map.insert(name.clone(), from_ref(value_ref));
            }
            out.push(map);
        }
        Ok(out)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, ConnectorError> {
        let conn = self.conn.lock();
        let bound: Vec<SqlValue> = params.iter().map(SqlValue).collect();
        let bound_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        let changed = conn.execute(sql, bound_refs.as_slice()).map_err(SqliteError::from)?;
        Ok(changed as u64)
    }

    fn table_names(&self) -> Result<Vec<String>, ConnectorError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'")
            .map_err(SqliteError::from)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(SqliteError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(SqliteError::from)?;
        Ok(names)
    }
}

pub struct SqliteExecutor {
    shared: Arc<Shared>,
}

impl SqliteExecutor {
    /// Opens a connection at `path` (a filesystem path, or `:memory:`),
    /// registering the `regexp` scalar function every `$regex` compile
    /// relies on (§6.4).
    pub fn open(path: &str) -> Result<Self, SqliteError> {
        let conn = Connection::open(path)?;
        crate::regexp::register(&conn)?;
        Ok(SqliteExecutor { shared: Arc::new(Shared { conn: Mutex::new(conn), dialect: SqliteDialect }) })
    }
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    fn dialect(&self) -> &dyn Dialect {
        &self.shared.dialect
    }

    #[tracing::instrument(skip(self, params))]
    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, ConnectorError> {
        self.shared.query_rows(sql, &params)
    }

    #[tracing::instrument(skip(self, params))]
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64, ConnectorError> {
        self.shared.exec(sql, &params)
    }

    #[tracing::instrument(skip(self, registry))]
    async fn ensure_table(&self, registry: &ModelRegistry, table: &str) -> Result<(), ConnectorError> {
        let model = registry.model(table).map_err(SqliteError::from)?;
        self.shared.exec(&create_table_sql(model), &[])?;
        Ok(())
    }

    async fn drop_table(&self, table: Option<&str>) -> Result<(), ConnectorError> {
        match table {
            Some(table) => {
                self.shared.exec(&format!("DROP TABLE IF EXISTS {}", self.shared.dialect.quote_ident(table)), &[])?;
            }
            None => {
                for name in self.shared.table_names()? {
                    self.shared.exec(&format!("DROP TABLE IF EXISTS {}", self.shared.dialect.quote_ident(&name)), &[])?;
                }
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<DatabaseStats, ConnectorError> {
        let mut tables = BTreeMap::new();
        for name in self.shared.table_names()? {
            let sql = format!("SELECT COUNT(*) AS rows FROM {}", self.shared.dialect.quote_ident(&name));
            let rows = self.shared.query_rows(&sql, &[])?;
            let count = rows
                .into_iter()
                .next()
                .and_then(|mut r| r.remove("rows"))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0) as u64;
            tables.insert(name, TableStats { rows: count });
        }
        Ok(DatabaseStats { backend: self.shared.dialect.name(), tables })
    }

    async fn create_index(&self, table: &str, fields: &[String], unique: bool, name: &str) -> Result<(), ConnectorError> {
        let cols: Vec<String> = fields.iter().map(|f| self.shared.dialect.quote_ident(f)).collect();
        let kw = if unique { "UNIQUE INDEX" } else { "INDEX" };
        let sql = format!(
            "CREATE {kw} IF NOT EXISTS {} ON {} ({})",
            self.shared.dialect.quote_ident(name),
            self.shared.dialect.quote_ident(table),
            cols.join(", ")
        );
        self.shared.exec(&sql, &[])?;
        Ok(())
    }

    async fn drop_index(&self, _table: &str, name: &str) -> Result<(), ConnectorError> {
        let sql = format!("DROP INDEX IF EXISTS {}", self.shared.dialect.quote_ident(name));
        self.shared.exec(&sql, &[])?;
        Ok(())
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, ConnectorError> {
        let conn = self.shared.conn.lock();
        let mut list_stmt = conn.prepare("PRAGMA index_list(?)").map_err(SqliteError::from)?;
        let rows = list_stmt
            .query_map([table], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(2)? != 0)))
            .map_err(SqliteError::from)?
            .collect::<Result<Vec<(String, bool)>, _>>()
            .map_err(SqliteError::from)?;

        let mut out = Vec::new();
        for (name, unique) in rows {
            // SQLite auto-names some indexes ("sqlite_autoindex_..."); these
            // back implicit UNIQUE/PRIMARY KEY constraints, not a
            // `createIndex` call, so they're not reported here.
            if name.starts_with("sqlite_autoindex_") {
                continue;
            }
            let mut info_stmt = conn.prepare("PRAGMA index_info(?)").map_err(SqliteError::from)?;
            let fields = info_stmt
                .query_map([&name], |row| row.get::<_, String>(2))
                .map_err(SqliteError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(SqliteError::from)?;
            out.push(IndexInfo { name, fields, unique });
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self))]
    async fn begin_transaction(&self) -> Result<Box<dyn SqlTransactionHandle>, ConnectorError> {
        self.shared.exec("BEGIN", &[])?;
        Ok(Box::new(SqliteTransactionHandle { shared: self.shared.clone() }))
    }
}

/// One in-flight `BEGIN`-scoped session over the same shared connection
/// `SqliteExecutor` opened. `commit`/`rollback` are the only ways out; a
/// dropped handle that took neither leaves the connection mid-transaction,
/// same as a bare `rusqlite::Transaction` would.
pub struct SqliteTransactionHandle {
    shared: Arc<Shared>,
}

#[async_trait]
impl SqlExecutor for SqliteTransactionHandle {
    fn dialect(&self) -> &dyn Dialect {
        &self.shared.dialect
    }

    #[tracing::instrument(skip(self, params))]
    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, ConnectorError> {
        self.shared.query_rows(sql, &params)
    }

    #[tracing::instrument(skip(self, params))]
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64, ConnectorError> {
        self.shared.exec(sql, &params)
    }

    #[tracing::instrument(skip(self, registry))]
    async fn ensure_table(&self, registry: &ModelRegistry, table: &str) -> Result<(), ConnectorError> {
        let model = registry.model(table).map_err(SqliteError::from)?;
        self.shared.exec(&create_table_sql(model), &[])?;
        Ok(())
    }

    async fn drop_table(&self, table: Option<&str>) -> Result<(), ConnectorError> {
        match table {
            Some(table) => {
                self.shared.exec(&format!("DROP TABLE IF EXISTS {}", self.shared.dialect.quote_ident(table)), &[])?;
            }
            None => {
                for name in self.shared.table_names()? {
                    self.shared.exec(&format!("DROP TABLE IF EXISTS {}", self.shared.dialect.quote_ident(&name)), &[])?;
                }
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<DatabaseStats, ConnectorError> {
        let mut tables = BTreeMap::new();
        for name in self.shared.table_names()? {
            let sql = format!("SELECT COUNT(*) AS rows FROM {}", self.shared.dialect.quote_ident(&name));
            let rows = self.shared.query_rows(&sql, &[])?;
            let count = rows
                .into_iter()
                .next()
                .and_then(|mut r| r.remove("rows"))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0) as u64;
            tables.insert(name, TableStats { rows: count });
        }
        Ok(DatabaseStats { backend: self.shared.dialect.name(), tables })
    }

    async fn create_index(&self, table: &str, fields: &[String], unique: bool, name: &str) -> Result<(), ConnectorError> {
        let cols: Vec<String> = fields.iter().map(|f| self.shared.dialect.quote_ident(f)).collect();
        let kw = if unique { "UNIQUE INDEX" } else { "INDEX" };
        let sql = format!(
            "CREATE {kw} IF NOT EXISTS {} ON {} ({})",
            self.shared.dialect.quote_ident(name),
            self.shared.dialect.quote_ident(table),
            cols.join(", ")
        );
        self.shared.exec(&sql, &[])?;
        Ok(())
    }

    async fn drop_index(&self, _table: &str, name: &str) -> Result<(), ConnectorError> {
        let sql = format!("DROP INDEX IF EXISTS {}", self.shared.dialect.quote_ident(name));
        self.shared.exec(&sql, &[])?;
        Ok(())
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, ConnectorError> {
        let conn = self.shared.conn.lock();
        let mut list_stmt = conn.prepare("PRAGMA index_list(?)").map_err(SqliteError::from)?;
        let rows = list_stmt
            .query_map([table], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(2)? != 0)))
            .map_err(SqliteError::from)?
            .collect::<Result<Vec<(String, bool)>, _>>()
            .map_err(SqliteError::from)?;

        let mut out = Vec::new();
        for (name, unique) in rows {
            if name.starts_with("sqlite_autoindex_") {
                continue;
            }
            let mut info_stmt = conn.prepare("PRAGMA index_info(?)").map_err(SqliteError::from)?;
            let fields = info_stmt
                .query_map([&name], |row| row.get::<_, String>(2))
                .map_err(SqliteError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(SqliteError::from)?;
            out.push(IndexInfo { name, fields, unique });
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self))]
    async fn begin_transaction(&self) -> Result<Box<dyn SqlTransactionHandle>, ConnectorError> {
        Err(ConnectorError::backend("nested transactions are not supported"))
    }
}

#[async_trait]
impl SqlTransactionHandle for SqliteTransactionHandle {
    #[tracing::instrument(skip(self))]
    async fn commit(self: Box<Self>) -> Result<(), ConnectorError> {
        self.shared.exec("COMMIT", &[])?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn rollback(self: Box<Self>) -> Result<(), ConnectorError> {
        self.shared.exec("ROLLBACK", &[])?;
        Ok(())
    }
}
