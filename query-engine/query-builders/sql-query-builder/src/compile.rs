//! Lowers a [`query_structure::Selection`] into the dialect-independent
//! [`query_builder`] AST (§4.5 "filter compiler contract", §4.6
//! "selection-to-statement shape", §4.7 "aggregate compilation").

use crate::dialect::Dialect;
use query_builder::{
    Assignment, DeleteStatement, FromItem, InsertStatement, OnConflict, OrderTerm, Projection, SelectStatement,
    SortDirection as SqlSortDirection, SqlExpr, UpdateStatement,
};
use query_structure::{
    expr::Args as ExprArgs, filter::FieldMatcher, filter::FieldPredicate, filter::Query, model::Model,
    registry::ModelRegistry, selection::Args as SelArgs, selection::GetArgs, selection::Selection,
    selection::SortDirection, selection::Table, Expression, Operator, SchemaError,
};
use query_value::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0} is not a {1} selection")]
    WrongSelectionKind(String, &'static str),
    #[error("selection is not bound to a model")]
    NotBoundToModel,
    #[error("unknown field {field} on model {model}")]
    UnknownField { model: String, field: String },
    #[error("operator {0:?} has no SQL lowering in this dialect")]
    UnsupportedOperator(Operator),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

fn model_of<'a>(registry: &'a ModelRegistry, sel: &Selection) -> Result<&'a Model, CompileError> {
    let name = sel.model.as_deref().ok_or(CompileError::NotBoundToModel)?;
    Ok(registry.model(name)?)
}

fn field_expr<'a>(model: &'a Model, name: &str) -> Result<&'a query_structure::Field, CompileError> {
    model.field(name).ok_or_else(|| CompileError::UnknownField { model: model.name.clone(), field: name.to_string() })
}

/// Lowers `table.path` into either a plain column reference or a
/// `json_extract(column, path…)` call, per §4.5 "field-path lowering": the
/// first dotted segment is always the column, anything after it is a JSON
/// path into that column's value.
fn lower_ref(_dialect: &dyn Dialect, table: &str, path: &str) -> SqlExpr {
    let mut segments = path.splitn(2, '.');
    let column = segments.next().unwrap_or(path);
    match segments.next() {
        None => SqlExpr::column(table, column),
        Some(rest) => SqlExpr::JsonExtract {
            column: Box::new(SqlExpr::column(table, column)),
            path: rest.split('.').map(str::to_string).collect(),
        },
    }
}

fn op_children(args: &ExprArgs) -> Vec<&Expression> {
    match args {
        ExprArgs::Unary(a) => vec![a.as_ref()],
        ExprArgs::Binary(a, b) => vec![a.as_ref(), b.as_ref()],
        ExprArgs::Ternary(a, b, c) => vec![a.as_ref(), b.as_ref(), c.as_ref()],
        ExprArgs::Nary(items) => items.iter().collect(),
        ExprArgs::Map(items) => items.values().collect(),
        ExprArgs::Nullary => Vec::new(),
    }
}

/// Compiles one expression tree to a `SqlExpr`. `own_ref` names the table
/// alias an unqualified `ref` binds to.
pub fn compile_expr(
    dialect: &dyn Dialect,
    expr: &Expression,
    own_ref: &str,
    registry: &ModelRegistry,
) -> Result<SqlExpr, CompileError> {
    match expr {
        Expression::Ref { table, path, .. } => Ok(lower_ref(dialect, table.as_deref().unwrap_or(own_ref), path)),
        Expression::Literal { value, .. } => Ok(SqlExpr::param(value.clone())),
        Expression::Exec { selection, .. } => compile_subquery_expr(dialect, selection, registry),
        Expression::Op { operator, args, .. } => compile_op(dialect, *operator, args, own_ref, registry),
    }
}

/// `$exec` (§4.3, §4.7 "two aggregate compilation modes"): compiled as a
/// correlated scalar subquery — `SELECT <value-expr> FROM (<get-select>)` —
/// regardless of whether the inner expression is aggregate, since a
/// `SELECT` returning exactly one row is always usable as a scalar
/// subquery in a dialect-independent way. A dialect that wants to avoid the
/// extra `FROM (…)` wrapping for the aggregate case is free to specialise
/// this in its own connector layer; this shared skeleton favours the
/// simpler, always-correct form. Kept as a nested `SqlExpr::Sub` rather
/// than pre-rendered text so the subquery's own bound parameters are
/// collected by the same render pass as the outer statement.
fn compile_subquery_expr(dialect: &dyn Dialect, sub: &Selection, registry: &ModelRegistry) -> Result<SqlExpr, CompileError> {
    match &sub.r#type {
        query_structure::SelectionType::Eval => {
            let SelArgs::Eval(exprs) = &sub.args else {
                return Err(CompileError::WrongSelectionKind(sub.r#ref.0.clone(), "eval"));
            };
            let Some(last) = exprs.last() else {
                return Ok(SqlExpr::param(Value::Null));
            };
            let inner_select = compile_get_like_source(dialect, sub, registry)?;
            let value_expr = compile_expr(dialect, last, &sub.r#ref.0, registry)?;
            let mut select = SelectStatement::new(FromItem::Sub { query: Box::new(inner_select), alias: sub.r#ref.0.clone() });
            select.projections.push(Projection { expr: value_expr, alias: "value".to_string() });
            Ok(SqlExpr::Sub(Box::new(select)))
        }
        _ => {
            let select = compile_get(dialect, sub, registry)?;
            Ok(SqlExpr::Sub(Box::new(select)))
        }
    }
}

/// Builds the `FROM` source a subquery's own filter/group/having/sort runs
/// against, without its projection — used when compiling an `eval`'s
/// `$exec`, whose projection is the outer expression, not the inner
/// selection's own field list.
fn compile_get_like_source(dialect: &dyn Dialect, sel: &Selection, registry: &ModelRegistry) -> Result<SelectStatement, CompileError> {
    compile_get(dialect, sel, registry)
}

fn scalar_fn(op: Operator) -> Option<&'static str> {
    Some(match op {
        Operator::Abs => "ABS",
        Operator::Floor => "FLOOR",
        Operator::Ceil => "CEIL",
        Operator::Round => "ROUND",
        Operator::Exp => "EXP",
        Operator::Log => "LOG",
        Operator::Pow => "POWER",
        Operator::Random => "RANDOM",
        Operator::Concat => "CONCAT",
        _ => return None,
    })
}

fn binary_op(op: Operator) -> Option<&'static str> {
    Some(match op {
        Operator::Add => "+",
        Operator::Subtract => "-",
        Operator::Multiply => "*",
        Operator::Divide => "/",
        Operator::Modulo => "%",
        Operator::Eq => "=",
        Operator::Ne => "!=",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::And => "AND",
        Operator::Or => "OR",
        _ => return None,
    })
}

fn compile_op(
    dialect: &dyn Dialect,
    operator: Operator,
    args: &ExprArgs,
    own_ref: &str,
    registry: &ModelRegistry,
) -> Result<SqlExpr, CompileError> {
    let children: Result<Vec<SqlExpr>, CompileError> =
        op_children(args).into_iter().map(|c| compile_expr(dialect, c, own_ref, registry)).collect();
    let children = children?;

    if let Some(sql_op) = binary_op(operator) {
        let [lhs, rhs]: [SqlExpr; 2] = children.try_into().map_err(|_| CompileError::UnsupportedOperator(operator))?;
        return Ok(SqlExpr::BinaryOp { op: sql_op, lhs: Box::new(lhs), rhs: Box::new(rhs) });
    }
    if let Some(name) = scalar_fn(operator) {
        return Ok(SqlExpr::Call { function: name.to_string(), args: children });
    }

    match operator {
        Operator::If => {
            let [cond, then, or_else]: [SqlExpr; 3] = children.try_into().map_err(|_| CompileError::UnsupportedOperator(operator))?;
            Ok(SqlExpr::Case { when: vec![(cond, then)], or_else: Box::new(or_else) })
        }
        Operator::IfNull => {
            let [a, b]: [SqlExpr; 2] = children.try_into().map_err(|_| CompileError::UnsupportedOperator(operator))?;
            Ok(SqlExpr::Call { function: "COALESCE".to_string(), args: vec![a, b] })
        }
        Operator::Number => {
            let [a]: [SqlExpr; 1] = children.try_into().map_err(|_| CompileError::UnsupportedOperator(operator))?;
            Ok(SqlExpr::Call { function: "CAST_REAL".to_string(), args: vec![a] })
        }
        Operator::Not => {
            let [a]: [SqlExpr; 1] = children.try_into().map_err(|_| CompileError::UnsupportedOperator(operator))?;
            Ok(SqlExpr::UnaryOp { op: "NOT", expr: Box::new(a) })
        }
        Operator::Xor => {
            let [a, b]: [SqlExpr; 2] = children.try_into().map_err(|_| CompileError::UnsupportedOperator(operator))?;
            // a XOR b ≡ (a OR b) AND NOT (a AND b); no dialect here has a
            // native boolean XOR operator.
            let or = SqlExpr::BinaryOp { op: "OR", lhs: Box::new(a.clone()), rhs: Box::new(b.clone()) };
            let and = SqlExpr::BinaryOp { op: "AND", lhs: Box::new(a), rhs: Box::new(b) };
            Ok(SqlExpr::BinaryOp { op: "AND", lhs: Box::new(or), rhs: Box::new(SqlExpr::UnaryOp { op: "NOT", expr: Box::new(and) }) })
        }
        Operator::In | Operator::Nin => {
            // The `$in`/`$nin` *operators* (as opposed to the `In`/`Nin`
            // filter matchers above) compare a value against an
            // array-valued expression rather than a literal list, so they
            // lower to a membership test over that array rather than a
            // flattened `IN (…)` list.
            let [needle, haystack]: [SqlExpr; 2] = children.try_into().map_err(|_| CompileError::UnsupportedOperator(operator))?;
            Ok(SqlExpr::Call {
                function: if operator == Operator::In { "__IN_ARRAY".to_string() } else { "__NOT_IN_ARRAY".to_string() },
                args: vec![needle, haystack],
            })
        }
        Operator::Regex => {
            let [haystack, pattern]: [SqlExpr; 2] = children.try_into().map_err(|_| CompileError::UnsupportedOperator(operator))?;
            Ok(SqlExpr::Call { function: dialect.regex_fn().to_string(), args: vec![pattern, haystack] })
        }
        Operator::Sum => Ok(SqlExpr::Call { function: "COALESCE_SUM".to_string(), args: children }),
        Operator::Avg => Ok(SqlExpr::Call { function: "AVG".to_string(), args: children }),
        Operator::Min => Ok(SqlExpr::Call { function: "MIN".to_string(), args: children }),
        Operator::Max => Ok(SqlExpr::Call { function: "MAX".to_string(), args: children }),
        Operator::Count => Ok(SqlExpr::Call { function: "COUNT".to_string(), args: children }),
        Operator::Length => {
            if children.len() == 1 {
                Ok(SqlExpr::Call { function: dialect.json_length_fn().to_string(), args: children })
            } else {
                Ok(SqlExpr::Call { function: "COUNT".to_string(), args: children })
            }
        }
        Operator::Array => Ok(SqlExpr::Call { function: "COALESCE_ARRAY".to_string(), args: children }),
        Operator::Object => {
            // `Args::Map` — handled separately since it carries key names,
            // not a positional child list (mirrors the retrieval pass's
            // special-casing of `$object`, `query-structure/src/retrieval.rs`).
            let ExprArgs::Map(map) = args else { return Err(CompileError::UnsupportedOperator(operator)) };
            let mut call_args = Vec::with_capacity(map.len() * 2);
            for (key, child) in map {
                call_args.push(SqlExpr::param(Value::String(key.clone())));
                call_args.push(compile_expr(dialect, child, own_ref, registry)?);
            }
            Ok(SqlExpr::Call { function: dialect.json_object_fn().to_string(), args: call_args })
        }
        Operator::Get => {
            let [obj, key]: [SqlExpr; 2] = children.try_into().map_err(|_| CompileError::UnsupportedOperator(operator))?;
            match &key {
                SqlExpr::Param(Value::String(k)) => Ok(SqlExpr::JsonExtract { column: Box::new(obj), path: vec![k.clone()] }),
                _ => Ok(SqlExpr::Call { function: dialect.json_extract_fn().to_string(), args: vec![obj, key] }),
            }
        }
        _ => Err(CompileError::UnsupportedOperator(operator)),
    }
}

/// `$el` (§3.7 "at least one array element matches the nested query") lowers
/// to `EXISTS (SELECT 1 FROM json_each(field) AS alias WHERE …)`, the nested
/// query compiled with `alias` as its own-ref so its field paths address the
/// element: `"value"` is the element itself, `"value.sub"` a JSON path into
/// it (matches the ordinary field-path lowering `lower_ref` already does).
/// The alias is derived from the field path, not generated fresh, so a
/// second `$el` over the same field within one query would collide — this
/// shared skeleton doesn't support nested `$el` within `$el` on the same path.
fn compile_el(dialect: &dyn Dialect, field_expr: SqlExpr, nested: &Query, path: &str, own_ref: &str, registry: &ModelRegistry) -> Result<SqlExpr, CompileError> {
    let alias = format!("{}_{}_el", own_ref, path).replace(['.', '-'], "_");
    let mut inner = SelectStatement::new(FromItem::TableFn { function: "json_each".to_string(), args: vec![field_expr], alias: alias.clone() });
    inner.projections.push(Projection { expr: SqlExpr::param(Value::Int(1)), alias: "matched".to_string() });
    inner.r#where = compile_query(dialect, nested, &alias, registry)?;
    Ok(SqlExpr::Exists(Box::new(inner)))
}

fn compile_matcher(
    dialect: &dyn Dialect,
    field_expr: SqlExpr,
    matcher: &FieldMatcher,
    path: &str,
    own_ref: &str,
    registry: &ModelRegistry,
) -> Result<SqlExpr, CompileError> {
    Ok(match matcher {
        FieldMatcher::Eq(v) => SqlExpr::BinaryOp { op: "=", lhs: Box::new(field_expr), rhs: Box::new(SqlExpr::param(v.clone())) },
        FieldMatcher::Ne(v) => SqlExpr::BinaryOp { op: "!=", lhs: Box::new(field_expr), rhs: Box::new(SqlExpr::param(v.clone())) },
        FieldMatcher::Lt(v) => SqlExpr::BinaryOp { op: "<", lhs: Box::new(field_expr), rhs: Box::new(SqlExpr::param(v.clone())) },
        FieldMatcher::Lte(v) => SqlExpr::BinaryOp { op: "<=", lhs: Box::new(field_expr), rhs: Box::new(SqlExpr::param(v.clone())) },
        FieldMatcher::Gt(v) => SqlExpr::BinaryOp { op: ">", lhs: Box::new(field_expr), rhs: Box::new(SqlExpr::param(v.clone())) },
        FieldMatcher::Gte(v) => SqlExpr::BinaryOp { op: ">=", lhs: Box::new(field_expr), rhs: Box::new(SqlExpr::param(v.clone())) },
        FieldMatcher::In(vs) => SqlExpr::Call {
            function: "__IN".to_string(),
            args: std::iter::once(field_expr).chain(vs.iter().cloned().map(SqlExpr::param)).collect(),
        },
        FieldMatcher::Nin(vs) => SqlExpr::Call {
            function: "__NOT_IN".to_string(),
            args: std::iter::once(field_expr).chain(vs.iter().cloned().map(SqlExpr::param)).collect(),
        },
        FieldMatcher::Exists(want) => {
            let is_null = SqlExpr::Call { function: "__IS_NULL".to_string(), args: vec![field_expr] };
            if *want {
                SqlExpr::UnaryOp { op: "NOT", expr: Box::new(is_null) }
            } else {
                is_null
            }
        }
        FieldMatcher::Regex { pattern, case_insensitive } => {
            let pattern_expr = if *case_insensitive {
                SqlExpr::param(Value::String(format!("(?i){pattern}")))
            } else {
                SqlExpr::param(Value::String(pattern.clone()))
            };
            SqlExpr::Call { function: dialect.regex_fn().to_string(), args: vec![pattern_expr, field_expr] }
        }
        FieldMatcher::RegexFor { field, case_insensitive } => {
            let pattern_expr = SqlExpr::bare_column(field.clone());
            let pattern_expr = if *case_insensitive {
                SqlExpr::Call { function: "__CI_PATTERN".to_string(), args: vec![pattern_expr] }
            } else {
                pattern_expr
            };
            SqlExpr::Call { function: dialect.regex_fn().to_string(), args: vec![pattern_expr, field_expr] }
        }
        FieldMatcher::El(nested) => return compile_el(dialect, field_expr, nested, path, own_ref, registry),
        FieldMatcher::Size(n) => SqlExpr::BinaryOp {
            op: "=",
            lhs: Box::new(SqlExpr::Call { function: "json_array_length".to_string(), args: vec![field_expr] }),
            rhs: Box::new(SqlExpr::param(Value::Int(*n))),
        },
        FieldMatcher::BitsAllSet(mask) => bit_test(field_expr, *mask, "=", *mask),
        FieldMatcher::BitsAllClear(mask) => bit_test(field_expr, *mask, "=", 0),
        FieldMatcher::BitsAnySet(mask) => bit_test(field_expr, *mask, "!=", 0),
        FieldMatcher::BitsAnyClear(mask) => bit_test(field_expr, *mask, "!=", *mask),
    })
}

fn bit_test(field_expr: SqlExpr, mask: u64, cmp: &'static str, expect: u64) -> SqlExpr {
    let anded = SqlExpr::BinaryOp { op: "&", lhs: Box::new(field_expr), rhs: Box::new(SqlExpr::param(Value::UnsignedInt(mask))) };
    SqlExpr::BinaryOp { op: cmp, lhs: Box::new(anded), rhs: Box::new(SqlExpr::param(Value::UnsignedInt(expect))) }
}

fn compile_predicate(
    dialect: &dyn Dialect,
    path: &str,
    predicate: &FieldPredicate,
    own_ref: &str,
    registry: &ModelRegistry,
) -> Result<SqlExpr, CompileError> {
    Ok(match predicate {
        FieldPredicate::Matcher(m) => compile_matcher(dialect, lower_ref(dialect, own_ref, path), m, path, own_ref, registry)?,
        FieldPredicate::And(items) => {
            let parts: Result<Vec<SqlExpr>, CompileError> =
                items.iter().map(|p| compile_predicate(dialect, path, p, own_ref, registry)).collect();
            fold(parts?.into_iter(), "AND", SqlExpr::Raw("1=1".into()))
        }
        FieldPredicate::Or(items) => {
            let parts: Result<Vec<SqlExpr>, CompileError> =
                items.iter().map(|p| compile_predicate(dialect, path, p, own_ref, registry)).collect();
            fold(parts?.into_iter(), "OR", SqlExpr::Raw("1=0".into()))
        }
        FieldPredicate::Not(inner) => {
            SqlExpr::UnaryOp { op: "NOT", expr: Box::new(compile_predicate(dialect, path, inner, own_ref, registry)?) }
        }
    })
}

fn fold(mut items: impl Iterator<Item = SqlExpr>, op: &'static str, empty: SqlExpr) -> SqlExpr {
    let Some(first) = items.next() else { return empty };
    items.fold(first, |acc, next| SqlExpr::BinaryOp { op, lhs: Box::new(acc), rhs: Box::new(next) })
}

/// Folds a `Query` (§3.7) into a single `WHERE`-clause expression, `AND`ing
/// field predicates, nested `$and`/`$or`/`$not` groups, and `$expr`
/// clauses. Mirrors `memory-connector/src/query.rs`'s `eval_query`, the
/// in-memory ground truth for this same fold.
pub fn compile_query(
    dialect: &dyn Dialect,
    query: &Query,
    own_ref: &str,
    registry: &ModelRegistry,
) -> Result<Option<SqlExpr>, CompileError> {
    if query.is_trivially_true() {
        return Ok(None);
    }
    let mut parts: Vec<SqlExpr> = Vec::new();
    for (path, predicate) in &query.fields {
        parts.push(compile_predicate(dialect, path, predicate, own_ref, registry)?);
    }
    for nested in &query.and {
        if let Some(e) = compile_query(dialect, nested, own_ref, registry)? {
            parts.push(e);
        }
    }
    if !query.or.is_empty() {
        let mut or_parts = Vec::new();
        for nested in &query.or {
            if let Some(e) = compile_query(dialect, nested, own_ref, registry)? {
                or_parts.push(e);
            }
        }
        parts.push(fold(or_parts.into_iter(), "OR", SqlExpr::Raw("1=0".into())));
    }
    for nested in &query.not {
        if let Some(e) = compile_query(dialect, nested, own_ref, registry)? {
            parts.push(SqlExpr::UnaryOp { op: "NOT", expr: Box::new(e) });
        }
    }
    for expr in &query.expr {
        parts.push(compile_expr(dialect, expr, own_ref, registry)?);
    }
    Ok(Some(fold(parts.into_iter(), "AND", SqlExpr::Raw("1=1".into()))))
}

fn compile_from(dialect: &dyn Dialect, sel: &Selection, registry: &ModelRegistry) -> Result<FromItem, CompileError> {
    match &sel.table {
        Table::Named(name) => Ok(FromItem::Table { name: name.clone(), alias: sel.r#ref.0.clone() }),
        Table::Sub(sub) => Ok(FromItem::Sub { query: Box::new(compile_get(dialect, sub, registry)?), alias: sel.r#ref.0.clone() }),
        Table::Join(members) => {
            let mut out = Vec::with_capacity(members.len());
            for (alias, member) in members {
                out.push((alias.clone(), compile_from(dialect, member, registry)?));
            }
            Ok(FromItem::Join { members: out })
        }
    }
}

fn sort_direction(d: SortDirection) -> SqlSortDirection {
    match d {
        SortDirection::Asc => SqlSortDirection::Asc,
        SortDirection::Desc => SqlSortDirection::Desc,
    }
}

fn projection_fields<'a>(model: &'a Model, args: &'a GetArgs) -> Vec<&'a str> {
    match &args.fields {
        Some(fields) => fields.iter().map(String::as_str).collect(),
        None => model.default_projection(),
    }
}

/// `get` → `SELECT … FROM … WHERE … GROUP BY … HAVING … ORDER BY … LIMIT …
/// OFFSET …` (§4.6).
pub fn compile_get(dialect: &dyn Dialect, sel: &Selection, registry: &ModelRegistry) -> Result<SelectStatement, CompileError> {
    let SelArgs::Get(args) = &sel.args else {
        return Err(CompileError::WrongSelectionKind(sel.r#ref.0.clone(), "get"));
    };

    let from = compile_from(dialect, sel, registry)?;
    let mut select = SelectStatement::new(from);
    select.r#where = compile_query(dialect, &sel.query, &sel.r#ref.0, registry)?;

    if let Some(model) = sel.model.as_deref().map(|n| registry.model(n)).transpose()? {
        for name in projection_fields(model, args) {
            let field = field_expr(model, name)?;
            let expr = match &field.expr {
                Some(e) => compile_expr(dialect, e, &sel.r#ref.0, registry)?,
                None => SqlExpr::column(sel.r#ref.0.clone(), name),
            };
            select.projections.push(Projection { expr, alias: name.to_string() });
        }
    }

    if let Some(group) = &args.group {
        select.group_by = group.iter().map(|k| SqlExpr::column(sel.r#ref.0.clone(), k)).collect();
    }
    select.having = compile_query(dialect, &args.having, &sel.r#ref.0, registry)?;
    select.order_by = args
        .sort
        .iter()
        .map(|term| Ok(OrderTerm { expr: compile_expr(dialect, &term.expr, &sel.r#ref.0, registry)?, direction: sort_direction(term.direction) }))
        .collect::<Result<_, CompileError>>()?;
    select.limit = args.limit;
    select.offset = args.offset;

    Ok(select)
}

/// `eval` → `SELECT <expr> AS value FROM (<get-select-without-projection>) ref`
/// (§4.6). The inner select carries the filter/group/having/sort/limit;
/// the outer projects the evaluated expression.
pub fn compile_eval(dialect: &dyn Dialect, sel: &Selection, registry: &ModelRegistry) -> Result<SelectStatement, CompileError> {
    let SelArgs::Eval(exprs) = &sel.args else {
        return Err(CompileError::WrongSelectionKind(sel.r#ref.0.clone(), "eval"));
    };
    let Some(last) = exprs.last() else {
        let mut select = SelectStatement::new(FromItem::Table { name: "__dual".to_string(), alias: "__dual".to_string() });
        select.projections.push(Projection { expr: SqlExpr::param(Value::Null), alias: "value".to_string() });
        return Ok(select);
    };

    let inner = compile_get_like_source(dialect, sel, registry)?;
    let value_expr = compile_expr(dialect, last, &sel.r#ref.0, registry)?;
    let mut select = SelectStatement::new(FromItem::Sub { query: Box::new(inner), alias: sel.r#ref.0.clone() });
    select.projections.push(Projection { expr: value_expr, alias: "value".to_string() });
    Ok(select)
}

/// `set` → `UPDATE table SET col = expr, … WHERE …` (§4.6, §4.8
/// `executeUpdate`). A dotted update path lowers to a JSON merge: the
/// top-level column is re-set to `json_set(column, '$.rest', value)` so a
/// nested path updates without clobbering its siblings.
pub fn compile_set(dialect: &dyn Dialect, sel: &Selection, registry: &ModelRegistry) -> Result<UpdateStatement, CompileError> {
    let SelArgs::Set(updates) = &sel.args else {
        return Err(CompileError::WrongSelectionKind(sel.r#ref.0.clone(), "set"));
    };
    let table = sel.table_name().ok_or(CompileError::NotBoundToModel)?.to_string();

    let mut assignments = Vec::with_capacity(updates.len());
    for (path, expr) in updates {
        let value = compile_expr(dialect, expr, &sel.r#ref.0, registry)?;
        let mut segments = path.splitn(2, '.');
        let column = segments.next().unwrap_or(path).to_string();
        let assignment_value = match segments.next() {
            None => value,
            Some(rest) => SqlExpr::Call {
                function: "json_set".to_string(),
                args: vec![
                    SqlExpr::bare_column(column.clone()),
                    SqlExpr::param(Value::String(format!("$.{rest}"))),
                    value,
                ],
            },
        };
        assignments.push(Assignment { column, value: assignment_value });
    }

    Ok(UpdateStatement { table, assignments, r#where: compile_query(dialect, &sel.query, &sel.r#ref.0, registry)? })
}

/// `create` → `INSERT INTO table (cols…) VALUES (vals…)` (§4.6, §6.2). Fills
/// each unset field's declared default, and — for an auto-increment model
/// whose primary key wasn't supplied — omits that column entirely so the
/// backend's native `AUTOINCREMENT` assigns it (the connector layer reads
/// the generated value back via `RETURNING *`, §9: SQL backends delegate
/// auto-increment to the database rather than reimplementing
/// `_fields`-style bookkeeping the way the in-memory connector does).
pub fn compile_create(_dialect: &dyn Dialect, sel: &Selection, registry: &ModelRegistry) -> Result<InsertStatement, CompileError> {
    let SelArgs::Create(fields) = &sel.args else {
        return Err(CompileError::WrongSelectionKind(sel.r#ref.0.clone(), "create"));
    };
    let table = sel.table_name().ok_or(CompileError::NotBoundToModel)?.to_string();
    let model = model_of(registry, sel)?;

    let mut row: BTreeMap<String, Value> = fields.clone();
    for (name, field) in &model.fields {
        if !row.contains_key(name) {
            if let Some(initial) = &field.initial {
                row.insert(name.clone(), initial.clone());
            }
        }
    }

    if model.auto_inc {
        if let query_structure::PrimaryKey::Single(key) = &model.primary {
            if row.get(key).map(Value::is_null).unwrap_or(true) {
                row.remove(key);
            }
        }
    }

    let columns: Vec<String> = row.keys().cloned().collect();
    let values: Vec<SqlExpr> = columns.iter().map(|c| SqlExpr::param(row.get(c).cloned().unwrap_or(Value::Null))).collect();
    Ok(InsertStatement { table, columns, rows: vec![values], on_conflict: None })
}

/// `upsert` → `INSERT … ON CONFLICT (keys) DO UPDATE SET col = CASE …` (§4.6,
/// §4.9, §8 property 7). Each non-key column's `CASE` guards against
/// rewriting a row whose incoming value is already identical, matching
/// the in-memory connector's idempotence.
pub fn compile_upsert(_dialect: &dyn Dialect, sel: &Selection) -> Result<InsertStatement, CompileError> {
    let SelArgs::Upsert(args) = &sel.args else {
        return Err(CompileError::WrongSelectionKind(sel.r#ref.0.clone(), "upsert"));
    };
    let table = sel.table_name().ok_or(CompileError::NotBoundToModel)?.to_string();

    let mut columns: Vec<String> = Vec::new();
    for row in &args.rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows: Vec<Vec<SqlExpr>> =
        args.rows.iter().map(|row| columns.iter().map(|c| SqlExpr::param(row.get(c).cloned().unwrap_or(Value::Null))).collect()).collect();

    let updates: Vec<Assignment> = columns
        .iter()
        .filter(|c| !args.keys.contains(c))
        .map(|c| Assignment { column: c.clone(), value: SqlExpr::Call { function: "excluded".to_string(), args: vec![SqlExpr::bare_column(c.clone())] } })
        .collect();

    Ok(InsertStatement { table, columns, rows, on_conflict: Some(OnConflict { keys: args.keys.clone(), updates }) })
}

/// `remove` → `DELETE FROM table WHERE …` (§4.6).
pub fn compile_remove(dialect: &dyn Dialect, sel: &Selection, registry: &ModelRegistry) -> Result<DeleteStatement, CompileError> {
    let table = sel.table_name().ok_or(CompileError::NotBoundToModel)?.to_string();
    Ok(DeleteStatement { table, r#where: compile_query(dialect, &sel.query, &sel.r#ref.0, registry)? })
}

