use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::error::AppError;

/// Per-plan variable store: `last` after every step plus `save_as` names.
pub type Bindings = HashMap<String, Value>;

/// Split a candidate `$name[.field]` reference.
///
/// Only full-string matches count: a string like `"$ from type Event"`
/// (a WAQL query) is not a reference and passes through untouched.
#[must_use]
pub fn parse_var_ref(s: &str) -> Option<(&str, Option<&str>)> {
    let body = s.strip_prefix('$')?;
    let (name, field) = match body.split_once('.') {
        Some((name, field)) => (name, Some(field)),
        None => (body, None),
    };
    if !is_identifier(name) {
        return None;
    }
    if let Some(field) = field {
        if field.is_empty() || !field.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
    }
    Some((name, field))
}

fn is_identifier(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Pre-pass: find the first reference to a variable not in `known`,
/// recursing through sequences and mappings.
#[must_use]
pub fn find_unknown_ref(value: &Value, known: &HashSet<String>) -> Option<String> {
    match value {
        Value::String(s) => match parse_var_ref(s) {
            Some((name, _)) if !known.contains(name) => Some(name.to_owned()),
            _ => None,
        },
        Value::Array(list) => list.iter().find_map(|v| find_unknown_ref(v, known)),
        Value::Object(map) => map.values().find_map(|v| find_unknown_ref(v, known)),
        _ => None,
    }
}

/// Substitute `$name[.field]` references with bound values, recursing
/// through nested sequences and mappings.
///
/// # Errors
///
/// `Validation` on an unknown variable, a missing field on a mapping
/// binding, or a `.field` access on a scalar binding.
pub fn resolve(value: &Value, bindings: &Bindings) -> Result<Value, AppError> {
    match value {
        Value::String(s) => match parse_var_ref(s) {
            Some((name, field)) => resolve_ref(name, field, bindings),
            None => Ok(value.clone()),
        },
        Value::Array(list) => {
            let resolved: Result<Vec<Value>, AppError> =
                list.iter().map(|v| resolve(v, bindings)).collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, v) in map {
                resolved.insert(key.clone(), resolve(v, bindings)?);
            }
            Ok(Value::Object(resolved))
        }
        _ => Ok(value.clone()),
    }
}

fn resolve_ref(
    name: &str,
    field: Option<&str>,
    bindings: &Bindings,
) -> Result<Value, AppError> {
    let Some(bound) = bindings.get(name) else {
        return Err(AppError::unknown_variable(name));
    };
    let Some(field) = field else {
        return Ok(bound.clone());
    };

    match bound {
        Value::Object(map) => map.get(field).cloned().ok_or_else(|| {
            AppError::validation(format!("'${name}' has no field '{field}'"))
        }),
        // Projection over a sequence of mappings; entries without the
        // field are skipped.
        Value::Array(list) => Ok(Value::Array(
            list.iter()
                .filter_map(|entry| entry.get(field).cloned())
                .collect(),
        )),
        _ => Err(AppError::validation(format!(
            "'${name}' is not a mapping or sequence; cannot take field '{field}'"
        ))),
    }
}
