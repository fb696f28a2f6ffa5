use crate::expr::Expression;
use crate::filter::Query;
use indexmap::IndexMap;
use query_value::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// A opaque token identifying the driver a selection was bound to by the
/// retrieval pass (§3.6 `driver`). Kept as a bare index rather than a trait
/// object so `query-structure` — which every connector crate depends on —
/// never has to depend back on the connector trait itself; the `Database`
/// facade in `query-core` is what resolves a `DriverId` to a live connector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DriverId(pub usize);

/// A selection's generated alias, unique among selections in one
/// compilation (§3.6 `ref`, glossary).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref(pub String);

static REF_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Ref {
    /// Generates a fresh alias. Monotonic within a process so two
    /// selections built in the same compilation never collide.
    pub fn fresh(prefix: &str) -> Self {
        let n = REF_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
        Ref(format!("{prefix}_{n}"))
    }
}

/// `table` (§3.6): a plain table name, a nested selection (subquery-as-source),
/// or a join map from alias to selection.
#[derive(Clone, Debug)]
pub enum Table {
    Named(String),
    Sub(Box<Selection>),
    Join(IndexMap<String, Selection>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug)]
pub struct SortTerm {
    pub expr: Expression,
    pub direction: SortDirection,
}

/// `get`'s operation-specific payload (§3.6).
#[derive(Clone, Debug, Default)]
pub struct GetArgs {
    pub fields: Option<Vec<String>>,
    pub sort: Vec<SortTerm>,
    /// `None` means the declared default, infinity.
    pub limit: Option<u64>,
    pub offset: u64,
    pub group: Option<Vec<String>>,
    pub having: Query,
}

/// `upsert`'s payload: rows to insert/update and the key-set used to match
/// existing rows.
#[derive(Clone, Debug, Default)]
pub struct UpsertArgs {
    pub rows: Vec<BTreeMap<String, Value>>,
    pub keys: Vec<String>,
}

#[derive(Clone, Debug)]
pub enum Args {
    Get(GetArgs),
    Eval(Vec<Expression>),
    Set(Vec<(String, Expression)>),
    Upsert(UpsertArgs),
    Remove,
    Create(BTreeMap<String, Value>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SelectionType {
    Get,
    Eval,
    Set,
    Upsert,
    Remove,
    Create,
}

/// An immutable selection value (§3.6): a single chainable description of a
/// get/eval/set/upsert/remove/create operation.
#[derive(Clone, Debug)]
pub struct Selection {
    pub r#ref: Ref,
    pub table: Table,
    pub query: Query,
    pub r#type: SelectionType,
    pub args: Args,
    /// The effective model of the produced rows, resolved by the retrieval
    /// pass from `table`. `None` before retrieval.
    pub model: Option<String>,
    /// Map from ref to model name for every reachable selection (its own
    /// plus nested), populated by retrieval.
    pub tables: BTreeMap<String, String>,
    /// Set by the retrieval pass when this selection is bound to a driver.
    pub driver: Option<DriverId>,
}

impl Selection {
    fn new(table: Table, r#type: SelectionType, args: Args) -> Self {
        Selection {
            r#ref: Ref::fresh("sel"),
            table,
            query: Query::empty(),
            r#type,
            args,
            model: None,
            tables: BTreeMap::new(),
            driver: None,
        }
    }

    pub fn get(table: impl Into<String>) -> Self {
        Selection::new(Table::Named(table.into()), SelectionType::Get, Args::Get(GetArgs::default()))
    }

    pub fn from_subquery(sub: Selection) -> Self {
        Selection::new(Table::Sub(Box::new(sub)), SelectionType::Get, Args::Get(GetArgs::default()))
    }

    pub fn join(members: IndexMap<String, Selection>) -> Self {
        Selection::new(Table::Join(members), SelectionType::Get, Args::Get(GetArgs::default()))
    }

    pub fn eval(table: impl Into<String>, expressions: Vec<Expression>) -> Self {
        Selection::new(Table::Named(table.into()), SelectionType::Eval, Args::Eval(expressions))
    }

    pub fn set(table: impl Into<String>, updates: Vec<(String, Expression)>) -> Self {
        Selection::new(Table::Named(table.into()), SelectionType::Set, Args::Set(updates))
    }

    pub fn upsert(table: impl Into<String>, rows: Vec<BTreeMap<String, Value>>, keys: Vec<String>) -> Self {
        Selection::new(Table::Named(table.into()), SelectionType::Upsert, Args::Upsert(UpsertArgs { rows, keys }))
    }

    pub fn remove(table: impl Into<String>) -> Self {
        Selection::new(Table::Named(table.into()), SelectionType::Remove, Args::Remove)
    }

    pub fn create(table: impl Into<String>, row: BTreeMap<String, Value>) -> Self {
        Selection::new(Table::Named(table.into()), SelectionType::Create, Args::Create(row))
    }

    pub fn filter(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn project(mut self, fields: Vec<String>) -> Self {
        if let Args::Get(args) = &mut self.args {
            args.fields = Some(fields);
        }
        self
    }

    pub fn sort(mut self, expr: Expression, direction: SortDirection) -> Self {
        if let Args::Get(args) = &mut self.args {
            args.sort.push(SortTerm { expr, direction });
        }
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        if let Args::Get(args) = &mut self.args {
            args.limit = Some(n);
        }
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        if let Args::Get(args) = &mut self.args {
            args.offset = n;
        }
        self
    }

    pub fn group_by(mut self, keys: Vec<String>) -> Self {
        if let Args::Get(args) = &mut self.args {
            args.group = Some(keys);
        }
        self
    }

    pub fn having(mut self, query: Query) -> Self {
        if let Args::Get(args) = &mut self.args {
            args.having = query;
        }
        self
    }

    /// The table name this selection directly targets, if it is a plain
    /// named table (not a subquery or join).
    pub fn table_name(&self) -> Option<&str> {
        match &self.table {
            Table::Named(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain_is_immutable_value_semantics() {
        let base = Selection::get("users");
        let filtered = base.clone().filter(Query::empty().field("id", crate::filter::FieldPredicate::eq(1i64)));
        assert!(matches!(base.query.fields.len(), 0));
        assert_eq!(filtered.query.fields.len(), 1);
    }

    #[test]
    fn refs_are_unique_across_selections() {
        let a = Selection::get("t");
        let b = Selection::get("t");
        assert_ne!(a.r#ref, b.r#ref);
    }
}
