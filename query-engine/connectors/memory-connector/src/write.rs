use crate::query::{eval_query, Env};
use crate::storage::{Row, Storage};
use query_connector::{ConnectorError, RemoveResult, UpsertResult, WriteResult};
use query_structure::{Model, ModelRegistry, Selection, SelectionArgs as Args, UpsertArgs};
use query_value::Value;
use std::collections::BTreeMap;

fn table_name(sel: &Selection) -> Result<&str, ConnectorError> {
    sel.table_name().ok_or_else(|| ConnectorError::backend("write operations require a named table"))
}

/// Falls back to the selection's table name when `model` hasn't been set by
/// the retrieval pass — for a `Table::Named` selection `retrieve()` would
/// resolve to the same name anyway, so a connector called directly (bypassing
/// `Database`/`retrieve()`, as the tests in this crate do) sees identical
/// behaviour.
fn model_of<'a>(registry: &'a ModelRegistry, sel: &Selection) -> Result<&'a Model, ConnectorError> {
    let name = sel
        .model
        .as_deref()
        .or_else(|| sel.table_name())
        .ok_or_else(|| ConnectorError::backend("selection not bound to a model"))?;
    registry.model(name).map_err(|e| ConnectorError::backend(e.to_string()))
}

/// Checks `row` against every key-set the model declares unique (primary +
/// `unique`) against the rows already in `existing`, excluding `skip_index`
/// (the row's own slot, for an in-place update) (§7 `duplicate-entry`).
fn check_unique(model: &Model, row: &Row, existing: &[Row], skip_index: Option<usize>) -> Result<(), ConnectorError> {
    let mut key_sets: Vec<Vec<String>> = vec![model.primary.keys().into_iter().map(String::from).collect()];
    key_sets.extend(model.unique.iter().cloned());

    for keys in &key_sets {
        let candidate: Vec<&Value> = keys.iter().map(|k| row.get(k).unwrap_or(&Value::Null)).collect();
        if candidate.iter().all(|v| v.is_null()) {
            continue;
        }
        for (i, other) in existing.iter().enumerate() {
            if Some(i) == skip_index {
                continue;
            }
            let other_key: Vec<&Value> = keys.iter().map(|k| other.get(k).unwrap_or(&Value::Null)).collect();
            if candidate == other_key {
                return Err(ConnectorError::DuplicateEntry { model: model.name.clone(), keys: keys.clone() });
            }
        }
    }
    Ok(())
}

/// `create` (§4.9, §6.2): assigns the auto-increment primary when unset,
/// otherwise enforces primary/unique uniqueness before inserting.
pub fn execute_create(
    storage: &Storage,
    registry: &ModelRegistry,
    sel: &Selection,
) -> Result<Row, ConnectorError> {
    let Args::Create(fields) = &sel.args else {
        return Err(ConnectorError::backend("execute_create called on a non-create selection"));
    };
    let table = table_name(sel)?;
    let model = model_of(registry, sel)?;

    let mut row = fields.clone();
    for (name, field) in &model.fields {
        if !row.contains_key(name) {
            if let Some(initial) = &field.initial {
                row.insert(name.clone(), initial.clone());
            }
        }
    }

    if model.auto_inc {
        let query_structure::PrimaryKey::Single(key) = &model.primary else {
            return Err(ConnectorError::backend("autoInc requires a single-column primary"));
        };
        if row.get(key).map(Value::is_null).unwrap_or(true) {
            let existing = storage.table_rows(table);
            let next = storage.next_auto_increment(table, key, || {
                existing.iter().filter_map(|r| r.get(key)).filter_map(Value::as_f64).map(|f| f as i64).max().unwrap_or(0)
            });
            row.insert(key.clone(), Value::Int(next));
        }
    }

    storage.with_table_mut(table, |rows| {
        check_unique(model, &row, rows, None)?;
        rows.push(row.clone());
        Ok::<_, ConnectorError>(())
    })?;

    Ok(row)
}

/// `set` (§4.6, §4.8 `executeUpdate`): applies each `(path, expr)` update to
/// every row `sel.query` matches, merging through dotted paths and creating
/// intermediate objects on demand (literal scenario S4).
pub fn execute_set(storage: &Storage, registry: &ModelRegistry, sel: &Selection) -> Result<WriteResult, ConnectorError> {
    let Args::Set(updates) = &sel.args else {
        return Err(ConnectorError::backend("execute_set called on a non-set selection"));
    };
    let table = table_name(sel)?;
    let own_ref = sel.r#ref.0.clone();

    let mut matched = 0u64;
    let mut modified = 0u64;

    storage.with_table_mut(table, |rows| {
        for row in rows.iter_mut() {
            let mut env = Env::new();
            env.insert(own_ref.clone(), row.clone());
            if !eval_query(&env, &sel.query, &own_ref, Some((registry, storage)), Some(&sel.tables))? {
                continue;
            }
            matched += 1;
            let mut changed = false;
            for (path, expr) in updates {
                let value = crate::eval::eval_expr(
                    crate::eval::EvalCtx::Row(&env),
                    expr,
                    &sel.tables,
                    &own_ref,
                    registry,
                    storage,
                )?;
                if set_path(row, path, value) {
                    changed = true;
                }
            }
            if changed {
                modified += 1;
            }
        }
        Ok::<_, ConnectorError>(())
    })?;

    Ok(WriteResult { matched, modified: Some(modified) })
}

/// Sets `row[path] = value`, creating any missing intermediate object along
/// the dotted path. Returns whether the final value actually changed.
fn set_path(row: &mut Row, path: &str, value: Value) -> bool {
    let segments: Vec<&str> = path.split('.').collect();
    let (head, rest) = segments.split_first().expect("split always yields at least one segment");
    if rest.is_empty() {
        let changed = row.get(*head) != Some(&value);
        row.insert(head.to_string(), value);
        return changed;
    }
    let entry = row.entry(head.to_string()).or_insert_with(|| Value::Object(BTreeMap::new()));
    set_path_object(entry, rest, value)
}

/// Merges `new_value` into `value` at `segments`, coercing a non-object
/// in the way to an empty object first.
fn set_path_object(value: &mut Value, segments: &[&str], new_value: Value) -> bool {
    if !matches!(value, Value::Object(_)) {
        *value = Value::Object(BTreeMap::new());
    }
    let Value::Object(map) = value else {
        unreachable!("just normalized to Object above")
    };
    let (head, rest) = segments.split_first().expect("non-empty by construction");
    if rest.is_empty() {
        let changed = map.get(*head) != Some(&new_value);
        map.insert(head.to_string(), new_value);
        return changed;
    }
    let entry = map.entry(head.to_string()).or_insert_with(|| Value::Object(BTreeMap::new()));
    set_path_object(entry, rest, new_value)
}

/// `remove` (§4.9): deletes every row `sel.query` matches.
pub fn execute_remove(storage: &Storage, registry: &ModelRegistry, sel: &Selection) -> Result<RemoveResult, ConnectorError> {
    let table = table_name(sel)?;
    let own_ref = sel.r#ref.0.clone();

    let mut removed = 0u64;
    storage.with_table_mut(table, |rows| {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows.drain(..) {
            let mut env = Env::new();
            env.insert(own_ref.clone(), row.clone());
            if eval_query(&env, &sel.query, &own_ref, Some((registry, storage)), Some(&sel.tables))? {
                removed += 1;
            } else {
                kept.push(row);
            }
        }
        *rows = kept;
        Ok::<_, ConnectorError>(())
    })?;

    Ok(RemoveResult { removed })
}

/// `upsert` (§4.9, §8 property 7): for each row in the batch, match existing
/// rows by `keys`; update on match, insert otherwise. Idempotent: applying
/// the same batch twice yields `{inserted: 0, matched: n, modified: 0}` on
/// the second pass, since an update that writes identical values counts as
/// matched but not modified.
pub fn execute_upsert(storage: &Storage, registry: &ModelRegistry, sel: &Selection) -> Result<UpsertResult, ConnectorError> {
    let Args::Upsert(UpsertArgs { rows: batch, keys }) = &sel.args else {
        return Err(ConnectorError::backend("execute_upsert called on a non-upsert selection"));
    };
    let table = table_name(sel)?;
    let model = model_of(registry, sel)?;

    let mut inserted = 0u64;
    let mut matched = 0u64;
    let mut modified = 0u64;

    storage.with_table_mut(table, |rows| {
        for incoming in batch {
            let incoming_key: Vec<&Value> = keys.iter().map(|k| incoming.get(k).unwrap_or(&Value::Null)).collect();
            let existing_index = rows.iter().position(|row| {
                keys.iter().map(|k| row.get(k).unwrap_or(&Value::Null)).collect::<Vec<_>>() == incoming_key
            });

            match existing_index {
                Some(i) => {
                    matched += 1;
                    let changed = incoming.iter().any(|(k, v)| rows[i].get(k) != Some(v));
                    if changed {
                        check_unique(model, incoming, rows, Some(i))?;
                        rows[i].extend(incoming.clone());
                        modified += 1;
                    }
                }
                None => {
                    check_unique(model, incoming, rows, None)?;
                    rows.push(incoming.clone());
                    inserted += 1;
                }
            }
        }
        Ok::<_, ConnectorError>(())
    })?;

    Ok(UpsertResult { inserted, matched, modified: Some(modified) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_path_creates_missing_intermediate_objects() {
        let mut row = Row::new();
        let mut meta = BTreeMap::new();
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), Value::Int(1));
        meta.insert("a".to_string(), Value::Object(a));
        row.insert("id".to_string(), Value::Int(1));
        row.insert("meta".to_string(), Value::Object(meta));

        set_path(&mut row, "meta.a.c", Value::Int(2));

        let meta = row.get("meta").unwrap().as_object().unwrap();
        let a = meta.get("a").unwrap().as_object().unwrap();
        assert_eq!(a.get("b"), Some(&Value::Int(1)));
        assert_eq!(a.get("c"), Some(&Value::Int(2)));
    }

    #[test]
    fn set_path_reports_no_change_for_identical_value() {
        let mut row = Row::new();
        row.insert("x".to_string(), Value::Int(1));
        assert!(!set_path(&mut row, "x", Value::Int(1)));
        assert!(set_path(&mut row, "x", Value::Int(2)));
    }
}
