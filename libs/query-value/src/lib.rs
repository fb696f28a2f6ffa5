//! The leaf run-time value every layer of the query algebra ultimately produces
//! or consumes: row fields, literals, expression results, driver write args.
//!
//! Kept deliberately small and dependency-light (mirrors `prisma-value` in the
//! teacher workspace) so that `query-structure`, `query-connector` and every
//! connector crate can share one canonical representation instead of each
//! inventing their own.

mod convert;
mod decimal;
mod ord;

pub use decimal::Decimal;
pub use ord::total_cmp;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// A leaf run-time value.
///
/// `Value` has one variant per §3.1 field kind family plus `Array`/`Object`
/// for the structural encodings (`list`/`json`) and `Null`, which is a valid
/// instance of every nullable kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    UnsignedInt(u64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    /// The `list` encoding: an ordered sequence of strings in delimited form,
    /// represented here already split into elements.
    List(Vec<String>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UnsignedInt(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => Some(d.to_f64()),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The coercion `$regex` and other string matchers apply: every
    /// non-string value is rendered through its display form.
    pub fn coerce_to_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Reach one level into a container value by key (object field or array
    /// index encoded as a decimal string), used by `$get` and dotted update
    /// paths.
    pub fn get_path_segment(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UnsignedInt(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Binary(b) => write!(f, "{}", hex::encode(b)),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::List(items) => write!(f, "{}", items.join(",")),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_numbers_to_display_string() {
        assert_eq!(Value::Int(42).coerce_to_string(), "42");
        assert_eq!(Value::Null.coerce_to_string(), "");
    }

    #[test]
    fn path_segment_walks_objects_and_arrays() {
        let mut obj = BTreeMap::new();
        obj.insert("a".to_string(), Value::Array(vec![Value::Int(1), Value::Int(2)]));
        let v = Value::Object(obj);
        let a = v.get_path_segment("a").unwrap();
        assert_eq!(a.get_path_segment("1"), Some(&Value::Int(2)));
    }
}
