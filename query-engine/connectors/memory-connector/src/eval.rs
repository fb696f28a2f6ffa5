use crate::query::Env;
use crate::storage::Storage;
use query_connector::ConnectorError;
use query_structure::{Expression, ExprArgs as Args, ModelRegistry, Operator, Selection, SelectionType};
use query_value::{total_cmp, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// `executeEval(env, expr)` (§4.8): aggregates accept either a single row
/// (per-row evaluation) or a whole partition (aggregate context, used for
/// ungrouped `eval` over a whole table and for grouped virtual fields).
pub enum EvalCtx<'a> {
    Row(&'a Env),
    Group(&'a [Env]),
}

impl<'a> EvalCtx<'a> {
    /// The representative row for a non-aggregate read (e.g. a group-by key
    /// field) inside this context. `None` for a group with no rows — the
    /// caller treats that as a missing value rather than panicking.
    fn as_row(&self) -> Option<&'a Env> {
        match self {
            EvalCtx::Row(env) => Some(env),
            EvalCtx::Group(rows) => rows.first(),
        }
    }
}

pub fn eval_expr(
    ctx: EvalCtx,
    expr: &Expression,
    tables: &BTreeMap<String, String>,
    own_ref: &str,
    registry: &ModelRegistry,
    storage: &Storage,
) -> Result<Value, ConnectorError> {
    match expr {
        Expression::Ref { table, path, .. } => {
            let table_ref = table.as_deref().unwrap_or(own_ref);
            Ok(ctx
                .as_row()
                .and_then(|row_env| resolve_path(row_env, table_ref, path))
                .unwrap_or(Value::Null))
        }
        Expression::Literal { value, .. } => Ok(value.clone()),
        Expression::Exec { selection, .. } => eval_exec(selection, tables, registry, storage),
        Expression::Op { operator, args, .. } if operator.is_aggregate() => {
            eval_aggregate(ctx, operator, args, tables, own_ref, registry, storage)
        }
        Expression::Op { operator, args, .. } => eval_op(ctx, operator, args, tables, own_ref, registry, storage),
    }
}

fn resolve_path(env: &Env, table_ref: &str, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = env.get(table_ref)?.get(first)?.clone();
    for segment in segments {
        current = current.get_path_segment(segment)?.clone();
    }
    Some(current)
}

fn eval_exec(
    selection: &Selection,
    _outer_tables: &BTreeMap<String, String>,
    registry: &ModelRegistry,
    storage: &Storage,
) -> Result<Value, ConnectorError> {
    match selection.r#type {
        SelectionType::Get => {
            let rows = crate::exec::execute_get(storage, registry, selection)?;
            Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
        }
        SelectionType::Eval => crate::exec::execute_eval(storage, registry, selection),
        _ => Err(ConnectorError::backend("$exec only supports get/eval selections")),
    }
}

fn one_arg<'a>(args: &'a Args) -> Option<&'a Expression> {
    match args {
        Args::Unary(a) => Some(a.as_ref()),
        Args::Nary(items) if items.len() == 1 => items.first(),
        _ => None,
    }
}

fn eval_aggregate(
    ctx: EvalCtx,
    operator: &Operator,
    args: &Args,
    tables: &BTreeMap<String, String>,
    own_ref: &str,
    registry: &ModelRegistry,
    storage: &Storage,
) -> Result<Value, ConnectorError> {
    let rows: &[Env] = match &ctx {
        EvalCtx::Group(rows) => rows,
        EvalCtx::Row(env) => std::slice::from_ref(*env),
    };

    let Some(inner) = one_arg(args) else {
        return Err(ConnectorError::backend(format!("{} expects exactly one argument", operator.name())));
    };

    let values = rows
        .iter()
        .map(|row| eval_expr(EvalCtx::Row(row), inner, tables, own_ref, registry, storage))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match operator {
        Operator::Sum => Value::Float(values.iter().filter_map(Value::as_f64).sum()),
        Operator::Avg => {
            let nums: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::Float(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Operator::Count | Operator::Length => {
            Value::Int(values.iter().filter(|v| !v.is_null()).count() as i64)
        }
        Operator::Min => values
            .into_iter()
            .filter(|v| !v.is_null())
            .min_by(|a, b| total_cmp(a, b))
            .unwrap_or(Value::Null),
        Operator::Max => values
            .into_iter()
            .filter(|v| !v.is_null())
            .max_by(|a, b| total_cmp(a, b))
            .unwrap_or(Value::Null),
        Operator::Array => Value::Array(values),
        other => return Err(ConnectorError::backend(format!("{} is not an aggregate", other.name()))),
    })
}

fn eval_op(
    ctx: EvalCtx,
    operator: &Operator,
    args: &Args,
    tables: &BTreeMap<String, String>,
    own_ref: &str,
    registry: &ModelRegistry,
    storage: &Storage,
) -> Result<Value, ConnectorError> {
    let eval_child = |e: &Expression, storage: &Storage| -> Result<Value, ConnectorError> {
        let child_ctx = match &ctx {
            EvalCtx::Row(env) => EvalCtx::Row(env),
            EvalCtx::Group(rows) => EvalCtx::Group(rows),
        };
        eval_expr(child_ctx, e, tables, own_ref, registry, storage)
    };

    macro_rules! children {
        () => {{
            let mut out = Vec::new();
            for child in crate::exec::op_children(args) {
                out.push(eval_child(child, storage)?);
            }
            out
        }};
    }

    Ok(match operator {
        Operator::If => {
            let vals = children!();
            if vals[0].as_bool().unwrap_or(false) {
                vals[1].clone()
            } else {
                vals[2].clone()
            }
        }
        Operator::IfNull => {
            let vals = children!();
            if vals[0].is_null() {
                vals[1].clone()
            } else {
                vals[0].clone()
            }
        }
        Operator::Add | Operator::Subtract | Operator::Multiply | Operator::Divide | Operator::Modulo => {
            let vals = children!();
            let nums: Vec<f64> = vals.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect();
            let result = match operator {
                Operator::Add => nums.iter().sum(),
                Operator::Subtract => nums[1..].iter().fold(nums[0], |acc, n| acc - n),
                Operator::Multiply => nums.iter().product(),
                Operator::Divide => nums[1..].iter().fold(nums[0], |acc, n| acc / n),
                Operator::Modulo => nums[1..].iter().fold(nums[0], |acc, n| acc % n),
                _ => unreachable!(),
            };
            Value::Float(result)
        }
        Operator::Abs => Value::Float(children!()[0].as_f64().unwrap_or(0.0).abs()),
        Operator::Floor => Value::Float(children!()[0].as_f64().unwrap_or(0.0).floor()),
        Operator::Ceil => Value::Float(children!()[0].as_f64().unwrap_or(0.0).ceil()),
        Operator::Round => Value::Float(children!()[0].as_f64().unwrap_or(0.0).round()),
        Operator::Exp => Value::Float(children!()[0].as_f64().unwrap_or(0.0).exp()),
        Operator::Log => Value::Float(children!()[0].as_f64().unwrap_or(0.0).ln()),
        Operator::Pow => {
            let vals = children!();
            Value::Float(vals[0].as_f64().unwrap_or(0.0).powf(vals[1].as_f64().unwrap_or(0.0)))
        }
        Operator::Random => Value::Float(0.5), // deterministic stand-in; a real driver would source entropy
        Operator::Number => Value::Float(children!()[0].as_f64().unwrap_or(0.0)),
        Operator::Eq => Value::Boolean(eq2(&children!())),
        Operator::Ne => Value::Boolean(!eq2(&children!())),
        Operator::Gt => Value::Boolean(cmp2(&children!()) == Ordering::Greater),
        Operator::Gte => Value::Boolean(cmp2(&children!()) != Ordering::Less),
        Operator::Lt => Value::Boolean(cmp2(&children!()) == Ordering::Less),
        Operator::Lte => Value::Boolean(cmp2(&children!()) != Ordering::Greater),
        Operator::In => {
            let vals = children!();
            let needle = &vals[0];
            Value::Boolean(vals[1..].iter().any(|v| total_cmp(v, needle) == Ordering::Equal))
        }
        Operator::Nin => {
            let vals = children!();
            let needle = &vals[0];
            Value::Boolean(!vals[1..].iter().any(|v| total_cmp(v, needle) == Ordering::Equal))
        }
        Operator::Concat => {
            Value::String(children!().iter().map(Value::coerce_to_string).collect::<Vec<_>>().join(""))
        }
        Operator::Regex => {
            let vals = children!();
            let pattern = vals[1].coerce_to_string();
            let re = regex::Regex::new(&pattern).map_err(|e| ConnectorError::backend(e.to_string()))?;
            Value::Boolean(re.is_match(&vals[0].coerce_to_string()))
        }
        Operator::And => Value::Boolean(children!().iter().all(|v| v.as_bool().unwrap_or(false))),
        Operator::Or => Value::Boolean(children!().iter().any(|v| v.as_bool().unwrap_or(false))),
        Operator::Xor => {
            let vals = children!();
            Value::Boolean(vals.iter().filter(|v| v.as_bool().unwrap_or(false)).count() % 2 == 1)
        }
        Operator::Not => Value::Boolean(!children!()[0].as_bool().unwrap_or(false)),
        Operator::Object => {
            let Args::Map(map) = args else {
                return Err(ConnectorError::backend("$object requires a key-map argument"));
            };
            let mut out = BTreeMap::new();
            for (key, child) in map {
                out.insert(key.clone(), eval_child(child, storage)?);
            }
            Value::Object(out)
        }
        Operator::Get => {
            let vals = children!();
            vals[0].get_path_segment(&vals[1].coerce_to_string()).cloned().unwrap_or(Value::Null)
        }
        aggregate => return eval_aggregate(ctx, aggregate, args, tables, own_ref, registry, storage),
    })
}

fn eq2(vals: &[Value]) -> bool {
    total_cmp(&vals[0], &vals[1]) == Ordering::Equal
}

fn cmp2(vals: &[Value]) -> Ordering {
    total_cmp(&vals[0], &vals[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Row;

    fn empty_registry() -> ModelRegistry {
        ModelRegistry::new()
    }

    #[test]
    fn sum_over_group_matches_arithmetic() {
        let registry = empty_registry();
        let storage = Storage::default();
        let rows: Vec<Env> = (1..=3)
            .map(|n| {
                let mut row = Row::new();
                row.insert("v".to_string(), Value::Int(n));
                let mut env = Env::new();
                env.insert("r".to_string(), row);
                env
            })
            .collect();
        let tables = BTreeMap::new();
        let expr = Expression::unary(Operator::Sum, Expression::local("v"));
        let result = eval_expr(EvalCtx::Group(&rows), &expr, &tables, "r", &registry, &storage).unwrap();
        assert_eq!(result.as_f64(), Some(6.0));
    }

    #[test]
    fn avg_of_empty_group_is_null() {
        let registry = empty_registry();
        let storage = Storage::default();
        let tables = BTreeMap::new();
        let expr = Expression::unary(Operator::Avg, Expression::local("v"));
        let result = eval_expr(EvalCtx::Group(&[]), &expr, &tables, "r", &registry, &storage).unwrap();
        assert!(matches!(result, Value::Null));
    }

    #[test]
    fn sum_of_empty_group_is_zero() {
        let registry = empty_registry();
        let storage = Storage::default();
        let tables = BTreeMap::new();
        let expr = Expression::unary(Operator::Sum, Expression::local("v"));
        let result = eval_expr(EvalCtx::Group(&[]), &expr, &tables, "r", &registry, &storage).unwrap();
        assert_eq!(result.as_f64(), Some(0.0));
    }
}
