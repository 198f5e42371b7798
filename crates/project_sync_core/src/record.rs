//! The loosely-typed resource record and its typed accessors.
//!
//! GitLab resources are exchanged as JSON objects whose shape is discovered at
//! runtime from the reference documentation. A [`Record`] is such an object;
//! the helpers here read fields out of it with a typed result instead of
//! panicking on unexpected shapes.

use serde_json::{Map, Number, Value};

use crate::errors::FieldProblem;

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;

/// One item of a section: a string-keyed mapping of scalars, lists and maps.
pub type Record = Map<String, Value>;

/// Prefix of keys that annotate data instead of being data.
///
/// `comment:<field>` annotates one field, a bare `comment:` key annotates the
/// whole record (typically a list item).
pub const COMMENT_PREFIX: &str = "comment:";

/// Returns `true` for keys that carry annotations.
pub fn is_comment_key(key: &str) -> bool {
    key.starts_with(COMMENT_PREFIX)
}

/// Key of the annotation attached to `field`.
pub fn comment_key(field: &str) -> String {
    format!("{COMMENT_PREFIX}{field}")
}

/// Name of a JSON value's type as used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Converts whole floating point numbers to integers, recursively.
///
/// Generic decoders produce `1.0` where GitLab expects `1`. Fractional values
/// and values outside the integer range are left alone.
pub fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if !n.is_f64() {
                return;
            }
            if let Some(integer) = n.as_f64().and_then(whole_number) {
                *n = integer;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(map) => map.values_mut().for_each(normalize_numbers),
        _ => {}
    }
}

fn whole_number(f: f64) -> Option<Number> {
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    if f >= 0.0 && f <= u64::MAX as f64 {
        Some(Number::from(f as u64))
    } else if f < 0.0 && f >= i64::MIN as f64 {
        Some(Number::from(f as i64))
    } else {
        None
    }
}

/// Removes every annotation key from a value, recursively.
pub fn strip_comments(value: &mut Value) {
    match value {
        Value::Object(map) => strip_record_comments(map),
        Value::Array(items) => items.iter_mut().for_each(strip_comments),
        _ => {}
    }
}

/// Removes every annotation key from a record, recursively.
pub fn strip_record_comments(record: &mut Record) {
    record.retain(|key, _| !is_comment_key(key));
    record.values_mut().for_each(strip_comments);
}

/// Reads an optional non-negative integer field. `null` counts as absent.
pub fn optional_u64(record: &Record, field: &str) -> Result<Option<u64>, FieldProblem> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or(FieldProblem::WrongType {
            expected: "non-negative integer",
            found: if n.is_f64() { "float" } else { "negative integer" },
        }),
        Some(other) => Err(FieldProblem::WrongType {
            expected: "integer",
            found: type_name(other),
        }),
    }
}

/// Reads an optional string field. `null` counts as absent.
pub fn optional_str<'a>(record: &'a Record, field: &str) -> Result<Option<&'a str>, FieldProblem> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(FieldProblem::WrongType {
            expected: "string",
            found: type_name(other),
        }),
    }
}

/// Reads an optional list of records. `null` counts as absent.
pub fn optional_records(record: &Record, field: &str) -> Result<Option<Vec<Record>>, FieldProblem> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                other => Err(FieldProblem::WrongType {
                    expected: "mapping",
                    found: type_name(other),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(FieldProblem::WrongType {
            expected: "list",
            found: type_name(other),
        }),
    }
}

/// Renders a scalar field as text for use in keys and messages.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Returns the record's data fields, ignoring annotations.
pub fn data_fields(record: &Record) -> impl Iterator<Item = (&String, &Value)> {
    record.iter().filter(|(key, _)| !is_comment_key(key))
}

/// Returns `true` when every data field of `desired` has the same value in `existing`.
///
/// Fields listed in `ignore` are skipped. Fields only present in `existing`
/// do not count as differences: GitLab keeps values that are not sent.
pub fn is_subset_of(desired: &Record, existing: &Record, ignore: &[&str]) -> bool {
    data_fields(desired)
        .filter(|(key, _)| !ignore.contains(&key.as_str()))
        .all(|(key, value)| match existing.get(key) {
            Some(current) => values_match(value, current),
            None => value.is_null(),
        })
}

fn values_match(desired: &Value, existing: &Value) -> bool {
    match (desired, existing) {
        (Value::Object(d), Value::Object(e)) => is_subset_of(d, e, &[]),
        (Value::Array(d), Value::Array(e)) => {
            d.len() == e.len() && d.iter().zip(e).all(|(d, e)| values_match(d, e))
        }
        (Value::Number(d), Value::Number(e)) => d.as_f64() == e.as_f64(),
        _ => desired == existing,
    }
}
