//! Renders the dialect-independent [`query_builder`] AST to SQL text plus a
//! positional parameter list, using a [`Dialect`]'s identifier/placeholder
//! hooks. A handful of `SqlExpr::Call` function names are handled here
//! rather than passed straight through — markers `compile.rs` emits for
//! constructs with no single portable function name (`__IN`, `__IN_ARRAY`,
//! `__IS_NULL`, …).

use crate::dialect::{Dialect, Placeholder};
use query_builder::{
    Assignment, DeleteStatement, FromItem, InsertStatement, Projection, SelectStatement, SqlExpr, Statement,
    UpdateStatement,
};
use query_value::Value;

#[derive(Clone, Debug)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<Value>,
}

struct Renderer<'d> {
    dialect: &'d dyn Dialect,
    params: Vec<Value>,
}

impl<'d> Renderer<'d> {
    fn new(dialect: &'d dyn Dialect) -> Self {
        Renderer { dialect, params: Vec::new() }
    }

    fn placeholder(&mut self, value: Value) -> String {
        self.params.push(value);
        match self.dialect.placeholder() {
            Placeholder::Question => "?".to_string(),
            Placeholder::Numbered => format!("${}", self.params.len()),
        }
    }

    fn ident(&self, name: &str) -> String {
        self.dialect.quote_ident(name)
    }

    fn qualified(&self, table: &Option<String>, name: &str) -> String {
        match table {
            Some(t) => format!("{}.{}", self.ident(t), self.ident(name)),
            None => self.ident(name),
        }
    }

    fn expr(&mut self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Column { table, name } => self.qualified(table, name),
            SqlExpr::Param(v) => self.placeholder(v.clone()),
            SqlExpr::JsonExtract { column, path } => {
                let col = self.expr(column);
                let json_path = format!("$.{}", path.join("."));
                let ph = self.placeholder(Value::String(json_path));
                format!("{}({}, {})", self.dialect.json_extract_fn(), col, ph)
            }
            SqlExpr::Call { function, args } => self.call(function, args),
            SqlExpr::BinaryOp { op, lhs, rhs } => {
                let l = self.expr(lhs);
                let r = self.expr(rhs);
                format!("({l} {op} {r})")
            }
            SqlExpr::UnaryOp { op, expr } => {
                let e = self.expr(expr);
                format!("({op} {e})")
            }
            SqlExpr::Case { when, or_else } => {
                let mut sql = "CASE".to_string();
                for (cond, then) in when {
                    let c = self.expr(cond);
                    let t = self.expr(then);
                    sql.push_str(&format!(" WHEN {c} THEN {t}"));
                }
                let e = self.expr(or_else);
                sql.push_str(&format!(" ELSE {e} END"));
                sql
            }
            SqlExpr::Sub(select) => format!("({})", self.select(select)),
            SqlExpr::Exists(select) => format!("EXISTS ({})", self.select(select)),
            SqlExpr::Raw(s) => s.clone(),
        }
    }

    /// Renders one `Call` node. Names prefixed `__` are lowering markers
    /// introduced by `compile.rs`, not real SQL functions; everything else
    /// is rendered as a plain `fn(args…)` call.
    fn call(&mut self, function: &str, args: &[SqlExpr]) -> String {
        match function {
            "__IN" | "__NOT_IN" => {
                let Some((needle, values)) = args.split_first() else { return "1=1".to_string() };
                let negate = function == "__NOT_IN";
                if values.is_empty() {
                    return if negate { "1=1".to_string() } else { "1=0".to_string() };
                }
                let needle_sql = self.expr(needle);
                let list: Vec<String> = values.iter().map(|v| self.expr(v)).collect();
                let op = if negate { "NOT IN" } else { "IN" };
                format!("{needle_sql} {op} ({})", list.join(", "))
            }
            "__IS_NULL" => {
                let e = self.expr(&args[0]);
                format!("{e} IS NULL")
            }
            "__CI_PATTERN" => {
                let e = self.expr(&args[0]);
                format!("('(?i)' || {e})")
            }
            "__IN_ARRAY" | "__NOT_IN_ARRAY" => {
                let needle = self.expr(&args[0]);
                let haystack = self.expr(&args[1]);
                let exists = format!("SELECT 1 FROM json_each({haystack}) WHERE value = {needle}");
                if function == "__IN_ARRAY" {
                    format!("EXISTS ({exists})")
                } else {
                    format!("NOT EXISTS ({exists})")
                }
            }
            "COALESCE_SUM" => {
                let e = args.first().map(|a| self.expr(a)).unwrap_or_else(|| "0".to_string());
                format!("COALESCE(SUM({e}), 0)")
            }
            "COALESCE_ARRAY" => {
                let e = args.first().map(|a| self.expr(a)).unwrap_or_else(|| "NULL".to_string());
                format!("COALESCE({}({e}), '[]')", self.dialect.group_array_fn())
            }
            "CAST_REAL" => {
                let e = args.first().map(|a| self.expr(a)).unwrap_or_else(|| "NULL".to_string());
                format!("CAST({e} AS REAL)")
            }
            "excluded" => {
                // only ever called with a single bare-column argument, see
                // `compile_upsert`.
                match args.first() {
                    Some(SqlExpr::Column { name, .. }) => format!("excluded.{}", self.ident(name)),
                    _ => "excluded".to_string(),
                }
            }
            other => {
                let rendered: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("{other}({})", rendered.join(", "))
            }
        }
    }

    fn from_item(&mut self, item: &FromItem) -> String {
        match item {
            FromItem::Table { name, alias } => format!("{} AS {}", self.ident(name), self.ident(alias)),
            FromItem::Sub { query, alias } => {
                let inner = self.select(query);
                format!("({inner}) AS {}", self.ident(alias))
            }
            FromItem::Join { members } => {
                let rendered: Vec<String> = members.iter().map(|(_, item)| self.from_item(item)).collect();
                rendered.join(", ")
            }
            FromItem::TableFn { function, args, alias } => {
                let rendered: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
                format!("{function}({}) AS {}", rendered.join(", "), self.ident(alias))
            }
        }
    }

    fn projection(&mut self, projections: &[Projection]) -> String {
        if projections.is_empty() {
            return "*".to_string();
        }
        projections
            .iter()
            .map(|p| {
                let e = self.expr(&p.expr);
                format!("{e} AS {}", self.ident(&p.alias))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn select(&mut self, stmt: &SelectStatement) -> String {
        let projections = self.projection(&stmt.projections);
        let mut sql = format!("SELECT {projections}");
        if let Some(from) = &stmt.from {
            let from_sql = self.from_item(from);
            sql.push_str(&format!(" FROM {from_sql}"));
        }
        if let Some(where_) = &stmt.r#where {
            let w = self.expr(where_);
            sql.push_str(&format!(" WHERE {w}"));
        }
        if !stmt.group_by.is_empty() {
            let group: Vec<String> = stmt.group_by.iter().map(|e| self.expr(e)).collect();
            sql.push_str(&format!(" GROUP BY {}", group.join(", ")));
        }
        if let Some(having) = &stmt.having {
            let h = self.expr(having);
            sql.push_str(&format!(" HAVING {h}"));
        }
        if !stmt.order_by.is_empty() {
            let order: Vec<String> = stmt
                .order_by
                .iter()
                .map(|term| {
                    let e = self.expr(&term.expr);
                    let dir = match term.direction {
                        query_builder::SortDirection::Asc => "ASC",
                        query_builder::SortDirection::Desc => "DESC",
                    };
                    format!("{e} {dir}")
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        if let Some(limit) = stmt.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        } else if stmt.offset > 0 {
            sql.push_str(" LIMIT -1");
        }
        if stmt.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", stmt.offset));
        }
        sql
    }

    fn insert(&mut self, stmt: &InsertStatement) -> String {
        let table = self.ident(&stmt.table);
        let columns: Vec<String> = stmt.columns.iter().map(|c| self.ident(c)).collect();
        let rows: Vec<String> = stmt
            .rows
            .iter()
            .map(|row| {
                let values: Vec<String> = row.iter().map(|e| self.expr(e)).collect();
                format!("({})", values.join(", "))
            })
            .collect();
        let mut sql = format!("INSERT INTO {table} ({}) VALUES {}", columns.join(", "), rows.join(", "));
        if let Some(conflict) = &stmt.on_conflict {
            let keys: Vec<String> = conflict.keys.iter().map(|k| self.ident(k)).collect();
            if conflict.updates.is_empty() {
                sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", keys.join(", ")));
            } else {
                let sets = self.assignments(&conflict.updates);
                sql.push_str(&format!(" ON CONFLICT ({}) DO UPDATE SET {sets}", keys.join(", ")));
            }
        }
        sql
    }

    fn assignments(&mut self, assignments: &[Assignment]) -> String {
        assignments
            .iter()
            .map(|a| {
                let v = self.expr(&a.value);
                format!("{} = {v}", self.ident(&a.column))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn update(&mut self, stmt: &UpdateStatement) -> String {
        let table = self.ident(&stmt.table);
        let sets = self.assignments(&stmt.assignments);
        let mut sql = format!("UPDATE {table} SET {sets}");
        if let Some(where_) = &stmt.r#where {
            let w = self.expr(where_);
            sql.push_str(&format!(" WHERE {w}"));
        }
        sql
    }

    fn delete(&mut self, stmt: &DeleteStatement) -> String {
        let table = self.ident(&stmt.table);
        let mut sql = format!("DELETE FROM {table}");
        if let Some(where_) = &stmt.r#where {
            let w = self.expr(where_);
            sql.push_str(&format!(" WHERE {w}"));
        }
        sql
    }
}

pub fn render_select(dialect: &dyn Dialect, stmt: &SelectStatement) -> Rendered {
    let mut r = Renderer::new(dialect);
    let sql = r.select(stmt);
    Rendered { sql, params: r.params }
}

pub fn render_insert(dialect: &dyn Dialect, stmt: &InsertStatement) -> Rendered {
    let mut r = Renderer::new(dialect);
    let sql = r.insert(stmt);
    Rendered { sql, params: r.params }
}

pub fn render_update(dialect: &dyn Dialect, stmt: &UpdateStatement) -> Rendered {
    let mut r = Renderer::new(dialect);
    let sql = r.update(stmt);
    Rendered { sql, params: r.params }
}

pub fn render_delete(dialect: &dyn Dialect, stmt: &DeleteStatement) -> Rendered {
    let mut r = Renderer::new(dialect);
    let sql = r.delete(stmt);
    Rendered { sql, params: r.params }
}

pub fn render(dialect: &dyn Dialect, stmt: &Statement) -> Rendered {
    match stmt {
        Statement::Select(s) => render_select(dialect, s),
        Statement::Insert(s) => render_insert(dialect, s),
        Statement::Update(s) => render_update(dialect, s),
        Statement::Delete(s) => render_delete(dialect, s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestDialect;
    impl Dialect for TestDialect {
        fn name(&self) -> &'static str {
            "test"
        }
        fn placeholder(&self) -> Placeholder {
            Placeholder::Question
        }
        fn quote_ident(&self, ident: &str) -> String {
            format!("\"{ident}\"")
        }
    }

    #[test]
    fn renders_a_simple_select_with_where() {
        let mut select = SelectStatement::new(FromItem::Table { name: "users".into(), alias: "u".into() });
        select.projections.push(Projection { expr: SqlExpr::column("u", "id"), alias: "id".into() });
        select.r#where = Some(SqlExpr::BinaryOp {
            op: "=",
            lhs: Box::new(SqlExpr::column("u", "id")),
            rhs: Box::new(SqlExpr::param(Value::Int(1))),
        });

        let rendered = render_select(&TestDialect, &select);
        assert_eq!(rendered.sql, "SELECT \"u\".\"id\" AS \"id\" FROM \"users\" AS \"u\" WHERE (\"u\".\"id\" = ?)");
        assert_eq!(rendered.params, vec![Value::Int(1)]);
    }
}
