//! Console/RPC wire format (§6.3): lets a driver run in a different process
//! from the `Database` facade by marshaling every `Value` to plain JSON.
//!
//! Most JSON types round-trip natively (`null`, `bool`, numbers, arrays,
//! objects). The remaining `Value` variants — anything whose JSON shape
//! would otherwise be indistinguishable from a plain string — get a
//! one-character prefix: `s` string, `b` base64 binary, `B` decimal digits,
//! `d` ISO date/time/timestamp. Regex patterns don't live on `Value` at all
//! (they're a `FieldMatcher` variant), so they get their own helper pair
//! producing the `r` = `[source, flags]` shape instead.

use query_value::{Decimal, Value};
use serde_json::{json, Value as Json};
use std::str::FromStr;

fn tagged(tag: char, body: &str) -> Json {
    Json::String(format!("{tag}{body}"))
}

/// Marshals a `Value` into the wire format. Recurses into `Array`/`Object`;
/// `List` elements are marshaled as plain strings (the `list` encoding is a
/// delimited string in the first place, so nothing is lost by not tagging
/// it specially — it always unmarshals back as `Array`, not `List`).
pub fn marshal(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::UnsignedInt(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::Decimal(d) => tagged('B', &d.to_string()),
        Value::String(s) => tagged('s', s),
        Value::Binary(b) => tagged('b', &base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b)),
        Value::Date(d) => tagged('d', &d.to_string()),
        Value::Time(t) => tagged('d', &t.to_string()),
        Value::Timestamp(t) => tagged('d', &t.to_rfc3339()),
        Value::List(items) => Json::Array(items.iter().map(|s| tagged('s', s)).collect()),
        Value::Array(items) => Json::Array(items.iter().map(marshal).collect()),
        Value::Object(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), marshal(v))).collect()),
    }
}

/// Inverts `marshal`. A tagged string with an unrecognised or missing tag
/// falls back to a plain `Value::String` of the whole text rather than
/// erroring — the bridge is a thin convenience, not a validating boundary.
pub fn unmarshal(value: &Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => unmarshal_tagged_string(s),
        Json::Array(items) => Value::Array(items.iter().map(unmarshal).collect()),
        Json::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), unmarshal(v))).collect()),
    }
}

fn unmarshal_tagged_string(s: &str) -> Value {
    let mut chars = s.chars();
    let tag = match chars.next() {
        Some(c) => c,
        None => return Value::String(String::new()),
    };
    let body = chars.as_str();
    match tag {
        's' => Value::String(body.to_string()),
        'b' => match base64::Engine::decode(&base64::engine::general_purpose::STANDARD, body) {
            Ok(bytes) => Value::Binary(bytes),
            Err(_) => Value::String(s.to_string()),
        },
        'B' => Decimal::from_str(body).map(Value::Decimal).unwrap_or_else(|_| Value::String(s.to_string())),
        'd' => unmarshal_date(body).unwrap_or_else(|| Value::String(s.to_string())),
        _ => Value::String(s.to_string()),
    }
}

fn unmarshal_date(body: &str) -> Option<Value> {
    use chrono::{DateTime, NaiveDate, NaiveTime};
    if let Ok(ts) = DateTime::parse_from_rfc3339(body) {
        return Some(Value::Timestamp(ts.with_timezone(&chrono::Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(body, "%Y-%m-%d") {
        return Some(Value::Date(date));
    }
    NaiveTime::parse_from_str(body, "%H:%M:%S%.f").ok().map(Value::Time)
}

/// Marshals a regex matcher's `(pattern, case_insensitive)` pair to the
/// `[source, flags]` wire shape. Not part of `marshal`/`unmarshal` since
/// `Value` has no regex variant — `FieldMatcher::Regex` carries its pattern
/// as a plain field pair, not a leaf value.
pub fn marshal_regex(pattern: &str, case_insensitive: bool) -> Json {
    json!([pattern, if case_insensitive { "i" } else { "" }])
}

pub fn unmarshal_regex(value: &Json) -> Option<(String, bool)> {
    let arr = value.as_array()?;
    let source = arr.first()?.as_str()?.to_string();
    let flags = arr.get(1).and_then(Json::as_str).unwrap_or("");
    Some((source, flags.contains('i')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    #[test]
    fn strings_round_trip_through_the_s_tag() {
        let value = Value::String("hello".to_string());
        let wire = marshal(&value);
        assert_eq!(wire, Json::String("shello".to_string()));
        assert_eq!(unmarshal(&wire), value);
    }

    #[test]
    fn binary_round_trips_through_base64() {
        let value = Value::Binary(vec![0xde, 0xad, 0xbe, 0xef]);
        let wire = marshal(&value);
        assert!(wire.as_str().unwrap().starts_with('b'));
        assert_eq!(unmarshal(&wire), value);
    }

    #[test]
    fn decimal_round_trips_through_bigint_digits() {
        let value = Value::Decimal(Decimal::from_str("123.456").unwrap());
        let wire = marshal(&value);
        assert_eq!(wire, Json::String("B123.456".to_string()));
        assert_eq!(unmarshal(&wire), value);
    }

    #[test]
    fn date_round_trips() {
        let value = Value::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        let wire = marshal(&value);
        assert_eq!(unmarshal(&wire), value);
    }

    #[test]
    fn timestamp_round_trips() {
        let value = Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 5, 12, 30, 0).unwrap());
        let wire = marshal(&value);
        assert_eq!(unmarshal(&wire), value);
    }

    #[test]
    fn time_round_trips() {
        let value = Value::Time(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        let wire = marshal(&value);
        assert_eq!(unmarshal(&wire), value);
    }

    #[test]
    fn null_bool_and_numbers_pass_through_as_plain_json() {
        assert_eq!(marshal(&Value::Null), Json::Null);
        assert_eq!(marshal(&Value::Boolean(true)), Json::Bool(true));
        assert_eq!(marshal(&Value::Int(42)), json!(42));
    }

    #[test]
    fn arrays_and_objects_recurse() {
        let value = Value::Array(vec![Value::Int(1), Value::String("x".to_string())]);
        let wire = marshal(&value);
        assert_eq!(wire, json!([1, "sx"]));
        assert_eq!(unmarshal(&wire), value);
    }

    #[test]
    fn regex_marshals_to_source_flags_tuple() {
        let wire = marshal_regex("^a.*z$", true);
        assert_eq!(wire, json!(["^a.*z$", "i"]));
        assert_eq!(unmarshal_regex(&wire), Some(("^a.*z$".to_string(), true)));
    }

    #[test]
    fn regex_without_case_insensitive_flag_has_empty_flags() {
        let wire = marshal_regex("abc", false);
        assert_eq!(unmarshal_regex(&wire), Some(("abc".to_string(), false)));
    }
}
