use serde_json::{Map, Value};

use crate::error::AppError;

/// Argument map for one verb invocation, after variable resolution.
pub type Args = Map<String, Value>;

/// Fetch a required string argument; empty strings are rejected.
pub fn require_str<'a>(args: &'a Args, field: &str) -> Result<&'a str, AppError> {
    match args.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => Err(AppError::invalid_field(
            field,
            format!("'{field}' must be a non-empty string"),
        )),
        Some(_) => Err(AppError::invalid_field(
            field,
            format!("'{field}' must be a string"),
        )),
        None => Err(AppError::invalid_field(
            field,
            format!("missing required argument '{field}'"),
        )),
    }
}

/// Fetch an optional string argument; `null` and absence are equivalent.
pub fn opt_str<'a>(args: &'a Args, field: &str) -> Result<Option<&'a str>, AppError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(AppError::invalid_field(
            field,
            format!("'{field}' must be a string"),
        )),
    }
}

/// Fetch a required list of non-empty strings; the list itself must be
/// non-empty.
pub fn require_str_list(args: &Args, field: &str) -> Result<Vec<String>, AppError> {
    let list = require_list(args, field)?;
    let mut out = Vec::with_capacity(list.len());
    for entry in list {
        match entry {
            Value::String(s) if !s.is_empty() => out.push(s.clone()),
            _ => {
                return Err(AppError::invalid_field(
                    field,
                    format!("all entries of '{field}' must be non-empty strings"),
                ));
            }
        }
    }
    Ok(out)
}

/// Fetch a required non-empty array argument.
pub fn require_list<'a>(args: &'a Args, field: &str) -> Result<&'a Vec<Value>, AppError> {
    match args.get(field) {
        Some(Value::Array(list)) if !list.is_empty() => Ok(list),
        Some(Value::Array(_)) => Err(AppError::invalid_field(
            field,
            format!("'{field}' must be a non-empty list"),
        )),
        Some(_) => Err(AppError::invalid_field(
            field,
            format!("'{field}' must be a list"),
        )),
        None => Err(AppError::invalid_field(
            field,
            format!("missing required argument '{field}'"),
        )),
    }
}

/// Fetch an optional array argument; `null` and absence are equivalent.
pub fn opt_list<'a>(args: &'a Args, field: &str) -> Result<Option<&'a Vec<Value>>, AppError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(list)) => Ok(Some(list)),
        Some(_) => Err(AppError::invalid_field(
            field,
            format!("'{field}' must be a list"),
        )),
    }
}

/// Fetch a required finite number.
pub fn require_f64(args: &Args, field: &str) -> Result<f64, AppError> {
    match args.get(field).and_then(Value::as_f64) {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(AppError::invalid_field(
            field,
            format!("'{field}' must be a finite number"),
        )),
    }
}

/// Fetch a required non-negative integer (delays, durations).
pub fn require_non_negative_ms(args: &Args, field: &str) -> Result<u64, AppError> {
    match args.get(field) {
        Some(value) => value.as_u64().ok_or_else(|| {
            AppError::invalid_field(
                field,
                format!("'{field}' must be a non-negative integer"),
            )
        }),
        None => Err(AppError::invalid_field(
            field,
            format!("missing required argument '{field}'"),
        )),
    }
}

/// Like [`require_non_negative_ms`] but defaulting to zero when absent.
pub fn opt_non_negative_ms(args: &Args, field: &str) -> Result<u64, AppError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| {
            AppError::invalid_field(
                field,
                format!("'{field}' must be a non-negative integer"),
            )
        }),
    }
}

/// Fetch a required scalar (string, number, or bool) property value.
pub fn require_scalar<'a>(args: &'a Args, field: &str) -> Result<&'a Value, AppError> {
    match args.get(field) {
        Some(value @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
            if matches!(value, Value::String(s) if s.is_empty()) {
                return Err(AppError::invalid_field(
                    field,
                    format!("'{field}' must not be an empty string"),
                ));
            }
            Ok(value)
        }
        Some(Value::Null) | None => Err(AppError::invalid_field(
            field,
            format!("'{field}' must not be null"),
        )),
        Some(_) => Err(AppError::invalid_field(
            field,
            format!("'{field}' must be a string, number, or boolean"),
        )),
    }
}

/// Require every named list to have the same length.
pub fn require_same_length(lists: &[(&str, usize)]) -> Result<(), AppError> {
    let Some((_, first)) = lists.first() else {
        return Ok(());
    };
    if lists.iter().any(|(_, len)| len != first) {
        let described = lists
            .iter()
            .map(|(name, len)| format!("{name}={len}"))
            .collect::<Vec<_>>()
            .join(" ");
        return Err(AppError::validation(format!("length mismatch: {described}")));
    }
    Ok(())
}

/// Fetch a required `[x, y, z]` position triple.
pub fn require_position(args: &Args, field: &str) -> Result<[f64; 3], AppError> {
    let list = require_list(args, field)?;
    let coords: Vec<f64> = list.iter().filter_map(Value::as_f64).collect();
    if coords.len() != 3 || list.len() != 3 {
        return Err(AppError::invalid_field(
            field,
            format!("'{field}' must be a [x, y, z] triple of numbers"),
        ));
    }
    Ok([coords[0], coords[1], coords[2]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Args {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn require_str_accepts_non_empty() {
        let a = args(json!({"name": "Explosion"}));
        assert_eq!(require_str(&a, "name").unwrap(), "Explosion");
    }

    #[test]
    fn require_str_rejects_empty_and_missing() {
        let a = args(json!({"name": ""}));
        assert!(require_str(&a, "name").is_err());
        assert!(require_str(&a, "other").is_err());
    }

    #[test]
    fn require_str_list_rejects_mixed_entries() {
        let a = args(json!({"names": ["ok", 3]}));
        let err = require_str_list(&a, "names").unwrap_err();
        assert!(err.message.contains("non-empty strings"));
    }

    #[test]
    fn require_str_list_rejects_empty_list() {
        let a = args(json!({"names": []}));
        assert!(require_str_list(&a, "names").is_err());
    }

    #[test]
    fn opt_str_treats_null_as_absent() {
        let a = args(json!({"path": null}));
        assert_eq!(opt_str(&a, "path").unwrap(), None);
    }

    #[test]
    fn non_negative_ms_rejects_negative_and_float() {
        let a = args(json!({"delay_ms": -5}));
        assert!(require_non_negative_ms(&a, "delay_ms").is_err());
        let a = args(json!({"delay_ms": 1.5}));
        assert!(require_non_negative_ms(&a, "delay_ms").is_err());
        let a = args(json!({"delay_ms": 250}));
        assert_eq!(require_non_negative_ms(&a, "delay_ms").unwrap(), 250);
    }

    #[test]
    fn same_length_mismatch_names_the_lists() {
        let err = require_same_length(&[("names", 2), ("paths", 3)]).unwrap_err();
        assert!(err.message.contains("names=2"));
        assert!(err.message.contains("paths=3"));
    }

    #[test]
    fn require_scalar_rejects_null_and_containers() {
        let a = args(json!({"value": null}));
        assert!(require_scalar(&a, "value").is_err());
        let a = args(json!({"value": {"nested": true}}));
        assert!(require_scalar(&a, "value").is_err());
        let a = args(json!({"value": false}));
        assert_eq!(require_scalar(&a, "value").unwrap(), &json!(false));
    }

    #[test]
    fn require_position_wants_three_numbers() {
        let a = args(json!({"position": [1.0, 2.0, 3.0]}));
        assert_eq!(require_position(&a, "position").unwrap(), [1.0, 2.0, 3.0]);
        let a = args(json!({"position": [1.0, 2.0]}));
        assert!(require_position(&a, "position").is_err());
        let a = args(json!({"position": [1.0, "two", 3.0]}));
        assert!(require_position(&a, "position").is_err());
    }
}
