//! Input schema validation
//!
//! 툴이 선언하는 JSON Schema 부분집합만 지원한다:
//! `type`, `required`, `properties`, `enum`, `items`, `minimum`, `additionalProperties: false`

use serde_json::{Map, Value};
use warden_foundation::{Error, Result};

/// 입력을 스키마로 검사. 첫 위반을 `Validation` 에러로 돌려준다
pub fn validate(schema: &Value, input: &Value) -> Result<()> {
    check(schema, input, "arguments")
}

fn check(schema: &Value, value: &Value, path: &str) -> Result<()> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        let accepted: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !accepted.is_empty() && !accepted.iter().any(|t| matches_type(t, value)) {
            return Err(Error::Validation(format!(
                "{} must be {}, got {}",
                path,
                accepted.join(" or "),
                type_name(value)
            )));
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            let names: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(Error::Validation(format!(
                "{} must be one of {}",
                path,
                names.join(", ")
            )));
        }
    }

    if let (Some(minimum), Some(actual)) = (
        schema.get("minimum").and_then(Value::as_f64),
        value.as_f64(),
    ) {
        if actual < minimum {
            return Err(Error::Validation(format!(
                "{} must be >= {}",
                path, minimum
            )));
        }
    }

    match value {
        Value::Object(fields) => check_object(schema, fields, path),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{}[{}]", path, i))?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_object(schema: &Map<String, Value>, fields: &Map<String, Value>, path: &str) -> Result<()> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for key in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(key) {
                return Err(Error::Validation(format!(
                    "{}.{} is required",
                    path, key
                )));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (key, field) in fields {
        match properties.and_then(|p| p.get(key)) {
            Some(field_schema) => check(field_schema, field, &format!("{}.{}", path, key))?,
            None if closed => {
                return Err(Error::Validation(format!(
                    "{}.{} is not allowed",
                    path, key
                )));
            }
            None => {}
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => true,
    }
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
