use crate::eval::{eval_expr, EvalCtx};
use crate::storage::{Row, Storage};
use query_connector::ConnectorError;
use query_structure::{FieldMatcher, FieldPredicate, ModelRegistry, Query};
use query_value::{total_cmp, Value};
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub type Env = BTreeMap<String, Row>;

/// Reaches a dotted path into the row bound to `own_ref` (§4.8
/// `executeQuery`: field matchers are always evaluated against the
/// selection's own row, never a joined alias — a matcher never carries a
/// table qualifier).
fn resolve(env: &Env, own_ref: &str, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = env.get(own_ref)?.get(first)?.clone();
    for segment in segments {
        current = current.get_path_segment(segment)?.clone();
    }
    Some(current)
}

fn eq(a: &Value, b: &Value) -> bool {
    total_cmp(a, b) == Ordering::Equal
}

fn to_bits(v: &Value) -> u64 {
    v.as_f64().map(|f| f as i64 as u64).unwrap_or(0)
}

fn eval_matcher(value: Option<&Value>, matcher: &FieldMatcher, env: &Env, own_ref: &str) -> Result<bool, ConnectorError> {
    let null = Value::Null;
    let v = value.unwrap_or(&null);
    Ok(match matcher {
        FieldMatcher::Eq(target) => eq(v, target),
        FieldMatcher::Ne(target) => !eq(v, target),
        FieldMatcher::Lt(target) => total_cmp(v, target) == Ordering::Less,
        FieldMatcher::Lte(target) => total_cmp(v, target) != Ordering::Greater,
        FieldMatcher::Gt(target) => total_cmp(v, target) == Ordering::Greater,
        FieldMatcher::Gte(target) => total_cmp(v, target) != Ordering::Less,
        FieldMatcher::In(list) => list.iter().any(|t| eq(v, t)),
        FieldMatcher::Nin(list) => !list.iter().any(|t| eq(v, t)),
        FieldMatcher::Exists(want) => value.is_some() == *want,
        FieldMatcher::Regex { pattern, case_insensitive } => {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map_err(|e| ConnectorError::backend(e.to_string()))?;
            re.is_match(&v.coerce_to_string())
        }
        FieldMatcher::RegexFor { field, case_insensitive } => {
            let pattern = resolve(env, own_ref, field).unwrap_or(Value::Null).coerce_to_string();
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map_err(|e| ConnectorError::backend(e.to_string()))?;
            re.is_match(&v.coerce_to_string())
        }
        FieldMatcher::El(nested) => match v {
            Value::Array(items) => {
                for item in items {
                    let mut element_env = Env::new();
                    let row: Row = item.as_object().cloned().unwrap_or_else(|| {
                        let mut r = Row::new();
                        r.insert("_value".to_string(), item.clone());
                        r
                    });
                    element_env.insert(own_ref.to_string(), row);
                    if eval_query(&element_env, nested, own_ref, None, None)? {
                        return Ok(true);
                    }
                }
                false
            }
            _ => false,
        },
        FieldMatcher::Size(n) => match v {
            Value::Array(items) => items.len() as i64 == *n,
            Value::List(items) => items.len() as i64 == *n,
            Value::Object(fields) => fields.len() as i64 == *n,
            _ => false,
        },
        FieldMatcher::BitsAllSet(mask) => to_bits(v) & mask == *mask,
        FieldMatcher::BitsAllClear(mask) => to_bits(v) & mask == 0,
        FieldMatcher::BitsAnySet(mask) => to_bits(v) & mask != 0,
        FieldMatcher::BitsAnyClear(mask) => to_bits(v) & mask != *mask,
    })
}

fn eval_predicate(env: &Env, own_ref: &str, path: &str, predicate: &FieldPredicate) -> Result<bool, ConnectorError> {
    let value = resolve(env, own_ref, path);
    match predicate {
        FieldPredicate::Matcher(m) => eval_matcher(value.as_ref(), m, env, own_ref),
        FieldPredicate::And(items) => {
            for item in items {
                if !eval_predicate(env, own_ref, path, item)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        FieldPredicate::Or(items) => {
            for item in items {
                if eval_predicate(env, own_ref, path, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        FieldPredicate::Not(inner) => Ok(!eval_predicate(env, own_ref, path, inner)?),
    }
}

/// `executeQuery(row, query, ref)` (§4.8): folds a filter predicate tree
/// against one candidate environment. `registry`/`storage` are only needed
/// to evaluate `$expr` clauses that contain a `$exec` subquery; `El` recurses
/// without them since nested element queries in this reference executor
/// don't themselves carry subqueries.
pub fn eval_query(
    env: &Env,
    query: &Query,
    own_ref: &str,
    registry: Option<(&ModelRegistry, &Storage)>,
    tables: Option<&BTreeMap<String, String>>,
) -> Result<bool, ConnectorError> {
    for (path, predicate) in &query.fields {
        if !eval_predicate(env, own_ref, path, predicate)? {
            return Ok(false);
        }
    }
    for nested in &query.and {
        if !eval_query(env, nested, own_ref, registry, tables)? {
            return Ok(false);
        }
    }
    if !query.or.is_empty() {
        let mut any = false;
        for nested in &query.or {
            if eval_query(env, nested, own_ref, registry, tables)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }
    for nested in &query.not {
        if eval_query(env, nested, own_ref, registry, tables)? {
            return Ok(false);
        }
    }
    if let Some((registry, storage)) = registry {
        let empty = BTreeMap::new();
        let tables = tables.unwrap_or(&empty);
        for expr in &query.expr {
            let value = eval_expr(EvalCtx::Row(env), expr, tables, own_ref, registry, storage)?;
            if !value.as_bool().unwrap_or(false) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_structure::filter::Query as Q;

    #[test]
    fn eq_matches_across_numeric_variants() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(1));
        let mut env = Env::new();
        env.insert("r".to_string(), row);
        let q = Q::empty().field("id", FieldPredicate::eq(1i64));
        assert!(eval_query(&env, &q, "r", None, None).unwrap());
    }

    #[test]
    fn empty_or_list_is_vacuously_true_when_never_used() {
        let env = Env::new();
        assert!(eval_query(&env, &Q::empty(), "r", None, None).unwrap());
    }
}
