//! The actual `get`/`eval`/`set`/`remove`/`create`/`upsert` bodies, each a
//! compile (via `sql-query-builder`) + render + `SqlExecutor` round trip.
//! Shared between `SqlConnector` and `SqlTransaction` so neither duplicates
//! this logic — only the thin `Connector` trait wiring in `lib.rs` repeats
//! per wrapper, the same split `memory-connector` draws between `exec.rs`/
//! `write.rs` and its two `Connector` impls.

use crate::executor::{Row, SqlExecutor};
use query_connector::{ConnectorError, RemoveResult, UpsertResult, WriteResult};
use query_structure::filter::FieldPredicate;
use query_structure::selection::Args as SelArgs;
use query_structure::{Expression, ModelRegistry, Query, Selection};
use query_value::Value;
use sql_query_builder::CompileError;

fn compile_err(driver: &'static str, err: CompileError) -> ConnectorError {
    match err {
        CompileError::UnsupportedOperator(op) => {
            ConnectorError::UnsupportedExpression { driver, operator: op.name().to_string() }
        }
        CompileError::UnknownField { model, field } => ConnectorError::ModelMismatch { model, field },
        other => ConnectorError::backend(other.to_string()),
    }
}

pub async fn get(executor: &dyn SqlExecutor, registry: &ModelRegistry, sel: &Selection) -> Result<Vec<Row>, ConnectorError> {
    let name = executor.dialect().name();
    let select = sql_query_builder::compile_get(executor.dialect(), sel, registry).map_err(|e| compile_err(name, e))?;
    let rendered = sql_query_builder::render_select(executor.dialect(), &select);
    executor.query(&rendered.sql, rendered.params).await
}

pub async fn eval(executor: &dyn SqlExecutor, registry: &ModelRegistry, sel: &Selection) -> Result<Value, ConnectorError> {
    let name = executor.dialect().name();
    let SelArgs::Eval(exprs) = &sel.args else {
        return Err(ConnectorError::backend("eval called on a non-eval selection"));
    };
    let is_aggregate = exprs.last().map(Expression::is_aggregate).unwrap_or(false);

    let select = sql_query_builder::compile_eval(executor.dialect(), sel, registry).map_err(|e| compile_err(name, e))?;
    let rendered = sql_query_builder::render_select(executor.dialect(), &select);
    let rows = executor.query(&rendered.sql, rendered.params).await?;

    if is_aggregate {
        Ok(rows.into_iter().next().and_then(|mut r| r.remove("value")).unwrap_or(Value::Null))
    } else {
        Ok(Value::Array(rows.into_iter().filter_map(|mut r| r.remove("value")).collect()))
    }
}

/// §9 open question (this crate): a plain SQL `UPDATE`'s affected-row count
/// reports every row the `WHERE` clause matched, whether or not any column
/// actually changed value — unlike the in-memory connector, which compares
/// old and new values per row. SQL `set` therefore always reports
/// `modified: None`; only `matched` is populated.
pub async fn set(executor: &dyn SqlExecutor, registry: &ModelRegistry, sel: &Selection) -> Result<WriteResult, ConnectorError> {
    let name = executor.dialect().name();
    let update = sql_query_builder::compile_set(executor.dialect(), sel, registry).map_err(|e| compile_err(name, e))?;
    let rendered = sql_query_builder::render_update(executor.dialect(), &update);
    let matched = executor.execute(&rendered.sql, rendered.params).await?;
    Ok(WriteResult { matched, modified: None })
}

pub async fn remove(executor: &dyn SqlExecutor, registry: &ModelRegistry, sel: &Selection) -> Result<RemoveResult, ConnectorError> {
    let name = executor.dialect().name();
    let delete = sql_query_builder::compile_remove(executor.dialect(), sel, registry).map_err(|e| compile_err(name, e))?;
    let rendered = sql_query_builder::render_delete(executor.dialect(), &delete);
    let removed = executor.execute(&rendered.sql, rendered.params).await?;
    Ok(RemoveResult { removed })
}

pub async fn create(executor: &dyn SqlExecutor, registry: &ModelRegistry, sel: &Selection) -> Result<Row, ConnectorError> {
    let name = executor.dialect().name();
    let insert = sql_query_builder::compile_create(executor.dialect(), sel, registry).map_err(|e| compile_err(name, e))?;
    let mut rendered = sql_query_builder::render_insert(executor.dialect(), &insert);
    if executor.dialect().supports_returning() {
        rendered.sql.push_str(" RETURNING *");
        let rows = executor.query(&rendered.sql, rendered.params).await?;
        rows.into_iter().next().ok_or_else(|| ConnectorError::backend("insert returned no row"))
    } else {
        executor.execute(&rendered.sql, rendered.params).await?;
        Ok(Row::new())
    }
}

/// `upsert` (§4.9, §8 property 7): for each incoming row, `get` any existing
/// row matching `keys`; if found and any field actually differs, `set` just
/// that row (idempotent — an identical row counts as matched, not
/// modified); otherwise `create` it. This keeps the accurate
/// `{inserted, matched, modified}` breakdown the in-memory connector
/// provides, at the cost of one extra round trip per row versus a single
/// batched `INSERT ... ON CONFLICT`.
pub async fn upsert(executor: &dyn SqlExecutor, registry: &ModelRegistry, sel: &Selection) -> Result<UpsertResult, ConnectorError> {
    let SelArgs::Upsert(args) = &sel.args else {
        return Err(ConnectorError::backend("upsert called on a non-upsert selection"));
    };
    let table = sel.table_name().ok_or_else(|| ConnectorError::backend("upsert requires a named table"))?;

    let mut inserted = 0u64;
    let mut matched = 0u64;
    let mut modified = 0u64;

    for incoming in &args.rows {
        let mut key_query = Query::empty();
        for key in &args.keys {
            let value = incoming.get(key).cloned().unwrap_or(Value::Null);
            key_query = key_query.field(key.clone(), FieldPredicate::eq(value));
        }

        let mut lookup = Selection::get(table).filter(key_query.clone()).limit(1);
        lookup.model = sel.model.clone();
        lookup.tables = sel.tables.clone();
        lookup.driver = sel.driver;

        let existing = get(executor, registry, &lookup).await?;

        match existing.into_iter().next() {
            Some(existing_row) => {
                matched += 1;
                let changed = incoming.iter().any(|(k, v)| existing_row.get(k) != Some(v));
                if changed {
                    let updates: Vec<(String, Expression)> =
                        incoming.iter().map(|(k, v)| (k.clone(), Expression::literal(v.clone()))).collect();
                    let mut update_sel = Selection::set(table, updates).filter(key_query);
                    update_sel.model = sel.model.clone();
                    update_sel.tables = sel.tables.clone();
                    update_sel.driver = sel.driver;
                    set(executor, registry, &update_sel).await?;
                    modified += 1;
                }
            }
            None => {
                let mut create_sel = Selection::create(table, incoming.clone());
                create_sel.model = sel.model.clone();
                create_sel.tables = sel.tables.clone();
                create_sel.driver = sel.driver;
                create(executor, registry, &create_sel).await?;
                inserted += 1;
            }
        }
    }

    Ok(UpsertResult { inserted, matched, modified: Some(modified) })
}
