use std::fs;

use camino::Utf8Path;
use serde_json::Value;

use crate::error::CmorError;

pub fn read_json(path: &Utf8Path) -> Result<Value, CmorError> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| CmorError::Parse {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|err| CmorError::Parse {
        path: path.to_string(),
        message: err.to_string(),
    })
}

/// Strings verbatim, numbers and booleans via their JSON text.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// A single string becomes a one-element list; arrays keep their scalar members.
pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

pub fn field_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(scalar_string)
}
