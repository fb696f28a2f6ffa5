use parking_lot::RwLock;
use query_connector::IndexInfo;
use query_value::Value;
use std::collections::BTreeMap;

pub type Row = BTreeMap<String, Value>;

/// The process-resident state backing `MemoryConnector` (§4.8, §6.2). Tables
/// hold rows in insertion order; `fields` is the `_fields` auto-increment
/// table of §6.2 keyed by `(table, field)`; `indexes` is metadata-only
/// bookkeeping for `createIndex`/`dropIndex`/`getIndexes` (§2 of
/// SPEC_FULL.md — no real index storage engine is implemented).
#[derive(Default)]
pub struct Storage {
    tables: RwLock<BTreeMap<String, Vec<Row>>>,
    fields: RwLock<BTreeMap<(String, String), i64>>,
    indexes: RwLock<BTreeMap<String, Vec<IndexInfo>>>,
}

/// A restorable copy of everything a transaction might mutate, used to
/// implement rollback without a real WAL (§5: the in-memory connector's
/// serializability is "trivial" — a single writer at a time).
pub struct Snapshot {
    tables: BTreeMap<String, Vec<Row>>,
    fields: BTreeMap<(String, String), i64>,
    indexes: BTreeMap<String, Vec<IndexInfo>>,
}

impl Storage {
    pub fn table_rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    pub fn ensure_table(&self, table: &str) {
        self.tables.write().entry(table.to_string()).or_default();
    }

    pub fn replace_table(&self, table: &str, rows: Vec<Row>) {
        self.tables.write().insert(table.to_string(), rows);
    }

    pub fn with_table_mut<T>(&self, table: &str, f: impl FnOnce(&mut Vec<Row>) -> T) -> T {
        let mut guard = self.tables.write();
        f(guard.entry(table.to_string()).or_default())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn row_count(&self, table: &str) -> u64 {
        self.tables.read().get(table).map(|t| t.len() as u64).unwrap_or(0)
    }

    /// Returns the next value of the `(table, field)` auto-increment counter,
    /// seeding it from `seed` the first time it's consulted (§4.2: "initial =
    /// 1" on an empty model, "max(existing) + 1" on one with rows).
    pub fn next_auto_increment(&self, table: &str, field: &str, seed: impl FnOnce() -> i64) -> i64 {
        let mut fields = self.fields.write();
        let counter = fields.entry((table.to_string(), field.to_string())).or_insert_with(seed);
        *counter += 1;
        *counter
    }

    pub fn create_index(&self, table: &str, info: IndexInfo) {
        self.indexes.write().entry(table.to_string()).or_default().push(info);
    }

    pub fn drop_index(&self, table: &str, name: &str) {
        if let Some(list) = self.indexes.write().get_mut(table) {
            list.retain(|i| i.name != name);
        }
    }

    pub fn get_indexes(&self, table: &str) -> Vec<IndexInfo> {
        self.indexes.read().get(table).cloned().unwrap_or_default()
    }

    pub fn unique_indexes(&self, table: &str) -> Vec<Vec<String>> {
        self.indexes
            .read()
            .get(table)
            .map(|list| list.iter().filter(|i| i.unique).map(|i| i.fields.clone()).collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tables: self.tables.read().clone(),
            fields: self.fields.read().clone(),
            indexes: self.indexes.read().clone(),
        }
    }

    pub fn restore(&self, snapshot: Snapshot) {
        *self.tables.write() = snapshot.tables;
        *self.fields.write() = snapshot.fields;
        *self.indexes.write() = snapshot.indexes;
    }

    pub fn drop_table(&self, table: &str) {
        self.tables.write().remove(table);
        self.fields.write().retain(|(t, _), _| t != table);
        self.indexes.write().remove(table);
    }

    pub fn drop_all(&self) {
        self.tables.write().clear();
        self.fields.write().clear();
        self.indexes.write().clear();
    }
}
