use crate::eval::{eval_expr, EvalCtx};
use crate::query::{eval_query, Env};
use crate::storage::{Row, Storage};
use query_connector::ConnectorError;
use query_structure::{
    ExprArgs, Field, GetArgs, Model, ModelRegistry, Selection, SelectionArgs as Args, SortDirection, Table,
};
use query_value::{total_cmp, Value};

pub fn op_children(args: &ExprArgs) -> Vec<&query_structure::Expression> {
    match args {
        ExprArgs::Unary(a) => vec![a.as_ref()],
        ExprArgs::Binary(a, b) => vec![a.as_ref(), b.as_ref()],
        ExprArgs::Ternary(a, b, c) => vec![a.as_ref(), b.as_ref(), c.as_ref()],
        ExprArgs::Nary(items) => items.iter().collect(),
        ExprArgs::Map(items) => items.values().collect(),
        ExprArgs::Nullary => Vec::new(),
    }
}

/// Materialises the candidate row environments `sel.table` denotes, before
/// `sel.query`/sort/group/having/limit are applied (§4.8 "table
/// materialisation"): a named table resolves to its stored rows in
/// insertion order, a child selection recurses through its own full `get`
/// pipeline, and a join takes the Cartesian product of its members.
fn candidates(storage: &Storage, registry: &ModelRegistry, sel: &Selection) -> Result<Vec<Env>, ConnectorError> {
    match &sel.table {
        Table::Named(name) => Ok(storage
            .table_rows(name)
            .into_iter()
            .map(|row| {
                let mut env = Env::new();
                env.insert(sel.r#ref.0.clone(), row);
                env
            })
            .collect()),
        Table::Sub(sub) => Ok(execute_get(storage, registry, sub)?
            .into_iter()
            .map(|row| {
                let mut env = Env::new();
                env.insert(sel.r#ref.0.clone(), row);
                env
            })
            .collect()),
        Table::Join(members) => {
            let mut acc = vec![Env::new()];
            for (alias, member) in members {
                let member_rows = execute_get(storage, registry, member)?;
                let mut next = Vec::with_capacity(acc.len() * member_rows.len().max(1));
                for base in &acc {
                    for row in &member_rows {
                        let mut combined = base.clone();
                        combined.insert(alias.clone(), row.clone());
                        next.push(combined);
                    }
                }
                acc = next;
            }
            Ok(acc)
        }
    }
}

/// Reads a field's value for one output row: a virtual field evaluates its
/// expression (aggregated over `group` when the expression is aggregate,
/// §4.8 "aggregate fields are computed over the partition"); a stored field
/// is read straight from `env`.
fn field_value(
    registry: &ModelRegistry,
    storage: &Storage,
    tables: &std::collections::BTreeMap<String, String>,
    own_ref: &str,
    field: &Field,
    env: &Env,
    group: Option<&[Env]>,
) -> Result<Value, ConnectorError> {
    match &field.expr {
        Some(expr) if expr.is_aggregate() => {
            let partition: Vec<Env> = group.map(|g| g.to_vec()).unwrap_or_else(|| vec![env.clone()]);
            eval_expr(EvalCtx::Group(&partition), expr, tables, own_ref, registry, storage)
        }
        Some(expr) => eval_expr(EvalCtx::Row(env), expr, tables, own_ref, registry, storage),
        None => Ok(env.get(own_ref).and_then(|r| r.get(&field.name)).cloned().unwrap_or(Value::Null)),
    }
}

fn projection_fields<'a>(model: &'a Model, args: &'a GetArgs) -> Vec<&'a str> {
    match &args.fields {
        Some(fields) => fields.iter().map(String::as_str).collect(),
        None => model.default_projection(),
    }
}

fn sort_key(
    sel: &Selection,
    env: &Env,
    registry: &ModelRegistry,
    storage: &Storage,
) -> Result<Vec<(Value, SortDirection)>, ConnectorError> {
    let Args::Get(args) = &sel.args else { return Ok(Vec::new()) };
    args.sort
        .iter()
        .map(|term| {
            let v = eval_expr(EvalCtx::Row(env), &term.expr, &sel.tables, &sel.r#ref.0, registry, storage)?;
            Ok((v, term.direction))
        })
        .collect()
}

fn apply_sort(rows: &mut [(Env, Vec<(Value, SortDirection)>)]) {
    rows.sort_by(|(_, a), (_, b)| {
        for ((av, dir), (bv, _)) in a.iter().zip(b.iter()) {
            let ord = total_cmp(av, bv);
            let ord = if *dir == SortDirection::Desc { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// The full `get` pipeline (§4.6/§4.8): materialise, filter, (group,) sort,
/// having, limit/offset, project.
pub fn execute_get(storage: &Storage, registry: &ModelRegistry, sel: &Selection) -> Result<Vec<Row>, ConnectorError> {
    let Args::Get(args) = &sel.args else {
        return Err(ConnectorError::backend("execute_get called on a non-get selection"));
    };

    let candidates = candidates(storage, registry, sel)?;
    let own_ref = sel.r#ref.0.clone();

    let mut filtered = Vec::new();
    for env in candidates {
        if eval_query(&env, &sel.query, &own_ref, Some((registry, storage)), Some(&sel.tables))? {
            filtered.push(env);
        }
    }

    let model = sel
        .model
        .as_deref()
        .or_else(|| sel.table_name())
        .map(|name| registry.model(name))
        .transpose()
        .map_err(|e| ConnectorError::backend(e.to_string()))?;

    let rows: Vec<Env> = if let (Some(group_keys), Some(model)) = (&args.group, model) {
        group_and_project(storage, registry, sel, args, model, group_keys, filtered)?
    } else {
        let mut out = Vec::with_capacity(filtered.len());
        for env in filtered {
            let row = flatten_row(&env, sel);
            let mut projected_env = Env::new();
            let row = if let Some(model) = model {
                project_one(registry, storage, sel, model, args, &env, &row, None)?
            } else {
                row
            };
            projected_env.insert(own_ref.clone(), row);
            out.push(projected_env);
        }
        out
    };

    // Having, sort, limit/offset operate on the (possibly grouped/projected)
    // output rows, each re-wrapped as its own single-row environment.
    let mut having_ok = Vec::new();
    for env in rows {
        if eval_query(&env, &args.having, &own_ref, Some((registry, storage)), Some(&sel.tables))? {
            having_ok.push(env);
        }
    }

    let mut keyed: Vec<(Env, Vec<(Value, SortDirection)>)> = having_ok
        .into_iter()
        .map(|env| {
            let key = sort_key(sel, &env, registry, storage)?;
            Ok((env, key))
        })
        .collect::<Result<Vec<_>, ConnectorError>>()?;
    apply_sort(&mut keyed);

    let offset = args.offset as usize;
    let limit = args.limit.map(|l| l as usize);
    let page: Vec<Row> = keyed
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(env, _)| env.get(&own_ref).cloned().unwrap_or_default())
        .collect();

    Ok(page)
}

/// For a join, a plain `Row` consumer (a projection, a nested `$exec`, a
/// sort expression with no table qualifier) sees a flattened merge of every
/// joined alias; field name collisions resolve to the last alias merged in
/// declaration order. Named/subquery selections just return their own row.
fn flatten_row(env: &Env, sel: &Selection) -> Row {
    match &sel.table {
        Table::Join(members) => {
            let mut merged = Row::new();
            for (alias, _) in members {
                if let Some(row) = env.get(alias) {
                    merged.extend(row.clone());
                }
            }
            merged
        }
        _ => env.get(&sel.r#ref.0).cloned().unwrap_or_default(),
    }
}

fn project_one(
    registry: &ModelRegistry,
    storage: &Storage,
    sel: &Selection,
    model: &Model,
    args: &GetArgs,
    env: &Env,
    flattened: &Row,
    group: Option<&[Env]>,
) -> Result<Row, ConnectorError> {
    // A virtual field's expression may reach a specific joined alias
    // (`table.path`) or read the selection's own flattened row (a bare
    // `path`, §4.5) — so the environment it evaluates against carries both.
    let mut combined = env.clone();
    combined.insert(sel.r#ref.0.clone(), flattened.clone());

    let mut out = Row::new();
    for name in projection_fields(model, args) {
        let Some(field) = model.field(name) else {
            return Err(ConnectorError::ModelMismatch { model: model.name.clone(), field: name.to_string() });
        };
        let value = field_value(registry, storage, &sel.tables, &sel.r#ref.0, field, &combined, group)?;
        out.insert(name.to_string(), value);
    }
    Ok(out)
}

fn group_and_project(
    storage: &Storage,
    registry: &ModelRegistry,
    sel: &Selection,
    args: &GetArgs,
    model: &Model,
    group_keys: &[String],
    rows: Vec<Env>,
) -> Result<Vec<Env>, ConnectorError> {
    let own_ref = sel.r#ref.0.clone();
    let mut groups: Vec<(Vec<Value>, Vec<Env>)> = Vec::new();

    for env in rows {
        let flattened = flatten_row(&env, sel);
        let key: Vec<Value> = group_keys.iter().map(|k| flattened.get(k).cloned().unwrap_or(Value::Null)).collect();
        if let Some((_, partition)) = groups.iter_mut().find(|(k, _)| k == &key) {
            partition.push(env);
        } else {
            groups.push((key, vec![env]));
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, partition) in &groups {
        let mut seed = Row::new();
        for (name, value) in group_keys.iter().zip(key.iter()) {
            seed.insert(name.clone(), value.clone());
        }
        let mut seed_env = Env::new();
        seed_env.insert(own_ref.clone(), seed.clone());

        let mut projected = Row::new();
        for name in projection_fields(model, args) {
            let Some(field) = model.field(name) else {
                return Err(ConnectorError::ModelMismatch { model: model.name.clone(), field: name.to_string() });
            };
            let value = if group_keys.iter().any(|k| k == name) {
                seed.get(name).cloned().unwrap_or(Value::Null)
            } else {
                field_value(registry, storage, &sel.tables, &own_ref, field, &seed_env, Some(partition))?
            };
            projected.insert(name.to_string(), value);
        }

        let mut env = Env::new();
        env.insert(own_ref.clone(), projected);
        out.push(env);
    }

    Ok(out)
}

/// `eval`'s pipeline: materialise + filter, then evaluate the final
/// expression either per-row (non-aggregate — wraps the whole result in an
/// array, §4.4 step 6) or over the whole filtered set at once (aggregate).
pub fn execute_eval(storage: &Storage, registry: &ModelRegistry, sel: &Selection) -> Result<Value, ConnectorError> {
    let Args::Eval(exprs) = &sel.args else {
        return Err(ConnectorError::backend("execute_eval called on a non-eval selection"));
    };
    let Some(expr) = exprs.last() else {
        return Ok(Value::Null);
    };

    let own_ref = sel.r#ref.0.clone();
    let candidates = candidates(storage, registry, sel)?;
    let mut filtered = Vec::new();
    for env in candidates {
        if eval_query(&env, &sel.query, &own_ref, Some((registry, storage)), Some(&sel.tables))? {
            filtered.push(env);
        }
    }

    if expr.is_aggregate() {
        eval_expr(EvalCtx::Group(&filtered), expr, &sel.tables, &own_ref, registry, storage)
    } else {
        let mut values = Vec::with_capacity(filtered.len());
        for env in &filtered {
            values.push(eval_expr(EvalCtx::Row(env), expr, &sel.tables, &own_ref, registry, storage)?);
        }
        Ok(Value::Array(values))
    }
}
