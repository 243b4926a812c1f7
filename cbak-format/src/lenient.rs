//! Lenient field decoding for hand-edited and legacy backups
//!
//! Older backups stored flags and counters as strings (`"1"`, `"17"`) and
//! numeric type codes where text is expected. The helpers here accept every
//! representation seen in the wild and normalize it to the typed model.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Interpret textual flag values (`1`, `0`, `true`, `false`, `yes`, `no`).
///
/// Empty input is `Ok(None)`; an unrecognized value is an error.
pub fn parse_flag(text: &str) -> Result<Option<bool>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(Some(true)),
        "0" | "false" | "no" => Ok(Some(false)),
        other => match other.parse::<i64>() {
            Ok(n) => Ok(Some(n != 0)),
            Err(_) => Err(format!("'{trimmed}' is not a flag")),
        },
    }
}

/// Interpret a textual integer, tolerating surrounding whitespace.
pub fn parse_integer(text: &str) -> Result<Option<i64>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<i64>()
        .map(Some)
        .map_err(|_| format!("'{trimmed}' is not an integer"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Optional text; numbers and booleans keep their textual form.
pub fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected text, found {}",
            type_name(&other)
        ))),
    }
}

/// Optional flag from a boolean, number or flag-like string.
pub fn opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(i != 0)),
            None => Err(de::Error::custom(format!("'{n}' is not a flag"))),
        },
        Some(Value::String(s)) => parse_flag(&s).map_err(de::Error::custom),
        Some(other) => Err(de::Error::custom(format!(
            "expected flag, found {}",
            type_name(&other)
        ))),
    }
}

/// Required flag; `null` and a missing field both mean `false`.
pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(opt_bool(deserializer)?.unwrap_or(false))
}

/// Optional signed integer from a number or numeric string.
pub fn opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(i)),
            None => Err(de::Error::custom(format!("'{n}' is not an integer"))),
        },
        Some(Value::String(s)) => parse_integer(&s).map_err(de::Error::custom),
        Some(other) => Err(de::Error::custom(format!(
            "expected integer, found {}",
            type_name(&other)
        ))),
    }
}

/// Optional unsigned counter from a number or numeric string.
pub fn opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match opt_i64(deserializer)? {
        None => Ok(None),
        Some(n) => u32::try_from(n)
            .map(Some)
            .map_err(|_| de::Error::custom(format!("counter {n} out of range"))),
    }
}

/// List that may be written as `null` by older exporters.
pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
