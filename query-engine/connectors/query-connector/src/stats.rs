use std::collections::BTreeMap;

/// Per-table shape of `Connector::stats` (§4.9, supplemented per
/// SPEC_FULL.md §2 — the driver contract names `stats` without a concrete
/// shape, so we give it one consistent across connectors).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    pub rows: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub backend: &'static str,
    pub tables: BTreeMap<String, TableStats>,
}

/// `createIndex`/`getIndexes` metadata (§4.9, §2 supplement: bookkeeping, not
/// a real index storage engine).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}
