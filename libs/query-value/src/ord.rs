use crate::Value;
use std::cmp::Ordering;

/// Rank used to order values of different variants against each other.
/// `Null` sorts below everything (§4.8: "null < any value").
fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Boolean(_) => 1,
        Value::Int(_) | Value::UnsignedInt(_) | Value::Float(_) | Value::Decimal(_) => 2,
        Value::String(_) => 3,
        Value::Binary(_) => 4,
        Value::Date(_) => 5,
        Value::Time(_) => 6,
        Value::Timestamp(_) => 7,
        Value::List(_) => 8,
        Value::Array(_) => 9,
        Value::Object(_) => 10,
    }
}

/// The stable total order the in-memory executor's sort step uses: null
/// below any value, numbers compared numerically, strings lexicographically,
/// booleans as 0/1, and otherwise different variants ordered by a fixed rank
/// so the comparator never panics or becomes intransitive.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Boolean(x), Value::Boolean(y)) => (*x as u8).cmp(&(*y as u8)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Time(x), Value::Time(y)) => x.cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
        (Value::Binary(x), Value::Binary(y)) => x.cmp(y),
        _ if is_numeric(a) && is_numeric(b) => {
            a.as_f64().unwrap_or(f64::NAN).partial_cmp(&b.as_f64().unwrap_or(f64::NAN)).unwrap_or(Ordering::Equal)
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::UnsignedInt(_) | Value::Float(_) | Value::Decimal(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_below_everything() {
        assert_eq!(total_cmp(&Value::Null, &Value::Int(-100)), Ordering::Less);
    }

    #[test]
    fn numbers_compare_numerically_across_variants() {
        assert_eq!(total_cmp(&Value::Int(1), &Value::Float(1.5)), Ordering::Less);
    }

    #[test]
    fn strings_compare_lexicographically() {
        assert_eq!(total_cmp(&Value::text("a"), &Value::text("b")), Ordering::Less);
    }
}
