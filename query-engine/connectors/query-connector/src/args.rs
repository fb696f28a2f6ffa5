use query_structure::{Expression, Selection, SelectionArgs, UpsertArgs, Value};
use std::collections::BTreeMap;

/// The write-side payload of a `Selection`, lifted out of `SelectionArgs` so
/// a connector can dispatch on operation shape without re-deriving it from
/// `SelectionType` (mirrors a driver contract's typical `WriteArgs` split
/// between row/update payload and the read path).
#[derive(Debug)]
pub enum WriteArgs<'a> {
    Set(&'a [(String, Expression)]),
    Upsert(&'a UpsertArgs),
    Remove,
    Create(&'a BTreeMap<String, Value>),
}

impl<'a> WriteArgs<'a> {
    pub fn from_selection(selection: &'a Selection) -> Option<Self> {
        match &selection.args {
            SelectionArgs::Set(updates) => Some(WriteArgs::Set(updates)),
            SelectionArgs::Upsert(args) => Some(WriteArgs::Upsert(args)),
            SelectionArgs::Remove => Some(WriteArgs::Remove),
            SelectionArgs::Create(row) => Some(WriteArgs::Create(row)),
            SelectionArgs::Get(_) | SelectionArgs::Eval(_) => None,
        }
    }
}

/// Result of `set` (§4.9: `{matched, modified?}`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteResult {
    pub matched: u64,
    pub modified: Option<u64>,
}

/// Result of `remove` (§4.9: `{removed}`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoveResult {
    pub removed: u64,
}

/// Result of `upsert` (§4.9: `{inserted, matched, modified?}`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpsertResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: Option<u64>,
}
