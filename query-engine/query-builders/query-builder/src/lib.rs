//! A small, dialect-independent SQL statement AST (§4.6): `Select`/`Insert`/
//! `Update`/`Delete`. `sql-query-builder` lowers a [`query_structure::Selection`]
//! into these types; a concrete dialect (`sqlite-connector`) renders them to
//! text and bind parameters.

use query_value::Value;

/// A bound parameter placeholder, carried inline in the tree so a dialect
/// can choose its own placeholder syntax (`?`, `$1`, …) at render time.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlExpr {
    Column { table: Option<String>, name: String },
    Param(Value),
    /// A JSON-path extraction, the shared target of §4.5 field-path lowering:
    /// `column -> path[0] -> path[1] -> …`.
    JsonExtract { column: Box<SqlExpr>, path: Vec<String> },
    /// `fn_name(args…)` — the dialect hook table decides the rendered name
    /// (`SUM`, `json_extract`, the registered `regexp` function, …).
    Call { function: String, args: Vec<SqlExpr> },
    BinaryOp { op: &'static str, lhs: Box<SqlExpr>, rhs: Box<SqlExpr> },
    UnaryOp { op: &'static str, expr: Box<SqlExpr> },
    /// `CASE WHEN cond THEN then ELSE else END`.
    Case { when: Vec<(SqlExpr, SqlExpr)>, or_else: Box<SqlExpr> },
    /// A parenthesised scalar subquery (`$exec`, §4.7). Kept as a nested
    /// statement rather than pre-rendered text so the outer render pass
    /// collects its bound parameters in the right position.
    Sub(Box<SelectStatement>),
    /// `EXISTS (select)`, the `$el` lowering (§3.7): negate with `UnaryOp`.
    Exists(Box<SelectStatement>),
    Raw(String),
}

impl SqlExpr {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        SqlExpr::Column { table: Some(table.into()), name: name.into() }
    }

    pub fn bare_column(name: impl Into<String>) -> Self {
        SqlExpr::Column { table: None, name: name.into() }
    }

    pub fn param(value: Value) -> Self {
        SqlExpr::Param(value)
    }

    pub fn and(self, other: SqlExpr) -> Self {
        SqlExpr::BinaryOp { op: "AND", lhs: Box::new(self), rhs: Box::new(other) }
    }

    pub fn or(self, other: SqlExpr) -> Self {
        SqlExpr::BinaryOp { op: "OR", lhs: Box::new(self), rhs: Box::new(other) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug)]
pub struct OrderTerm {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

/// A `FROM` source: a named table, a subselect, or a join of several
/// sources (§4.6 "selection-to-statement shape").
#[derive(Clone, Debug)]
pub enum FromItem {
    Table { name: String, alias: String },
    Sub { query: Box<SelectStatement>, alias: String },
    Join { members: Vec<(String, FromItem)> },
    /// A table-valued function call, e.g. `json_each(col) AS alias` (`$el`
    /// lowering, §3.7).
    TableFn { function: String, args: Vec<SqlExpr>, alias: String },
}

#[derive(Clone, Debug)]
pub struct Projection {
    pub expr: SqlExpr,
    pub alias: String,
}

#[derive(Clone, Debug, Default)]
pub struct SelectStatement {
    pub projections: Vec<Projection>,
    pub from: Option<FromItem>,
    pub r#where: Option<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Option<SqlExpr>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl SelectStatement {
    pub fn new(from: FromItem) -> Self {
        SelectStatement { from: Some(from), ..Default::default() }
    }
}

/// A `SET` assignment: `column = expr`, one entry per dotted top-level key
/// after JSON-merge lowering (§4.5: nested paths become a merge+set chain).
#[derive(Clone, Debug)]
pub struct Assignment {
    pub column: String,
    pub value: SqlExpr,
}

#[derive(Clone, Debug)]
pub struct UpdateStatement {
    pub table: String,
    pub assignments: Vec<Assignment>,
    pub r#where: Option<SqlExpr>,
}

#[derive(Clone, Debug)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlExpr>>,
    /// Present for an `upsert`: the conflict target key-set plus the
    /// per-column `CASE` update expression (§4.6 "per-row CASE").
    pub on_conflict: Option<OnConflict>,
}

#[derive(Clone, Debug)]
pub struct OnConflict {
    pub keys: Vec<String>,
    pub updates: Vec<Assignment>,
}

#[derive(Clone, Debug)]
pub struct DeleteStatement {
    pub table: String,
    pub r#where: Option<SqlExpr>,
}

#[derive(Clone, Debug)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}
