//! `query_value::Value` <-> `rusqlite` conversions.
//!
//! Write-side (`to_sql`) is fully typed: every `Value` variant has one
//! unambiguous SQLite storage encoding. Read-side (`from_ref`) cannot be:
//! SQLite itself only remembers the storage class a column held (NULL,
//! INTEGER, REAL, TEXT, BLOB), and `SqlExecutor::query`'s signature carries
//! no `ModelRegistry` to recover the declared field kind from. A `TEXT`
//! column therefore always comes back as `Value::String`, even if it holds
//! a `Date`/`Timestamp`/`Decimal` written through this same module — a
//! known limitation of this demonstration connector (see DESIGN.md).

use chrono::{DateTime, Utc};
use query_value::Value;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Result as SqliteResult, ToSql};

/// Wraps a `&Value` so it can be passed directly as a `rusqlite` bind
/// parameter via `&[&dyn ToSql]`.
pub struct SqlValue<'a>(pub &'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> SqliteResult<ToSqlOutput<'_>> {
        use rusqlite::types::Value as SqliteValue;

        let v = match self.0 {
            Value::Null => SqliteValue::Null,
            Value::Boolean(b) => SqliteValue::Integer(if *b { 1 } else { 0 }),
            Value::Int(i) => SqliteValue::Integer(*i),
            Value::UnsignedInt(u) => SqliteValue::Integer(*u as i64),
            Value::Float(f) => SqliteValue::Real(*f),
            Value::Decimal(d) => SqliteValue::Text(d.to_string()),
            Value::String(s) => SqliteValue::Text(s.clone()),
            Value::Binary(b) => SqliteValue::Blob(b.clone()),
            Value::Date(d) => SqliteValue::Text(d.to_string()),
            Value::Time(t) => SqliteValue::Text(t.to_string()),
            Value::Timestamp(ts) => SqliteValue::Text(ts.to_rfc3339()),
            Value::List(items) => SqliteValue::Text(items.join(",")),
            Value::Array(_) | Value::Object(_) => SqliteValue::Text(json_encode(self.0)),
        };
        Ok(ToSqlOutput::Owned(v))
    }
}

/// Encodes an `Array`/`Object` value as JSON text, the storage form every
/// `json_*` dialect hook operates on.
fn json_encode(value: &Value) -> String {
    fn to_json(v: &Value) -> serde_json::Value {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::UnsignedInt(u) => serde_json::Value::from(*u),
            Value::Float(f) => serde_json::json!(f),
            Value::Decimal(d) => serde_json::Value::String(d.to_string()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Binary(b) => serde_json::Value::String(hex_encode(b)),
            Value::Date(d) => serde_json::Value::String(d.to_string()),
            Value::Time(t) => serde_json::Value::String(t.to_string()),
            Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Value::List(items) => serde_json::Value::String(items.join(",")),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
            Value::Object(map) => {
                serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect())
            }
        }
    }
    to_json(value).to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes a row column back into a `Value`, using only the SQLite storage
/// class (§ limitation documented above).
pub fn from_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => {
            let s = String::from_utf8_lossy(t).into_owned();
            Value::String(s)
        }
        ValueRef::Blob(b) => Value::Binary(b.to_vec()),
    }
}

/// Parses an RFC3339 timestamp column, used by `schema`'s read-back of
/// auto-increment-adjacent bookkeeping where the caller already knows the
/// column is a timestamp. Not used by the generic `from_ref` path.
#[allow(dead_code)]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}
