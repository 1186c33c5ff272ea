//! Structural JSON Schema checking for tools whose input is only described by a schema
//! (provider tools). Covers the subset agents actually emit: `type`, `properties`,
//! `required`, `additionalProperties: false`, `enum`, `items`, numeric bounds, string
//! length and `pattern`.

use serde_json::{Map, Value};

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(expected: &str, v: &Value) -> bool {
    match expected {
        "number" => v.is_number(),
        "integer" => {
            v.is_i64() || v.is_u64() || v.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        other => type_name(v) == other,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}.{key}")
    }
}

fn label(path: &str) -> &str {
    if path.is_empty() {
        "input"
    } else {
        path
    }
}

fn check_type(schema: &Map<String, Value>, value: &Value, path: &str) -> Result<(), String> {
    let expected: Vec<&str> = match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };
    if expected.iter().any(|t| matches_type(t, value)) {
        return Ok(());
    }
    Err(format!(
        "{}: expected {}, received {}",
        label(path),
        expected.join(" | "),
        type_name(value)
    ))
}

fn check_object(
    schema: &Map<String, Value>,
    obj: &Map<String, Value>,
    path: &str,
) -> Result<(), String> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(key) {
                return Err(format!("{}: Required", join(path, key)));
            }
        }
    }
    let props = schema.get("properties").and_then(Value::as_object);
    for (key, v) in obj {
        match props.and_then(|p| p.get(key)) {
            Some(sub) => check_at(sub, v, &join(path, key))?,
            None => {
                if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                    return Err(format!("{}: unrecognized key", join(path, key)));
                }
            }
        }
    }
    Ok(())
}

fn check_bounds(schema: &Map<String, Value>, value: &Value, path: &str) -> Result<(), String> {
    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err(format!("{}: must be >= {min}", label(path)));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                return Err(format!("{}: must be <= {max}", label(path)));
            }
        }
    }
    if let Some(s) = value.as_str() {
        let len = u64::try_from(s.chars().count()).unwrap_or(u64::MAX);
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if len < min {
                return Err(format!("{}: must contain at least {min} character(s)", label(path)));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if len > max {
                return Err(format!("{}: must contain at most {max} character(s)", label(path)));
            }
        }
        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            let re = regex::Regex::new(pattern)
                .map_err(|e| format!("{}: invalid schema pattern: {e}", label(path)))?;
            if !re.is_match(s) {
                return Err(format!("{}: does not match pattern {pattern}", label(path)));
            }
        }
    }
    Ok(())
}

fn check_at(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    // `true`, `{}` and non-object schemas accept anything.
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    check_type(schema, value, path)?;

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{}: must be one of {}", label(path), Value::Array(allowed.clone())));
        }
    }

    check_bounds(schema, value, path)?;

    match value {
        Value::Object(obj) => check_object(schema, obj, path),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check_at(item_schema, item, &join(path, &i.to_string()))?;
                }
            }
            Ok(())
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
    }
}

/// Check `value` against `schema`, returning the first violation as a readable message.
pub fn check(schema: &Value, value: &Value) -> Result<(), String> {
    check_at(schema, value, "")
}
