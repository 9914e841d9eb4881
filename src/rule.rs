use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::SchemaVersion;
use crate::error::CmorError;
use crate::json::{read_json, scalar_string};

/// Per-file generation parameters handed over by the configuration layer.
///
/// Values are kept as strings: JSON scalars are stringified and string lists
/// are joined with single spaces. Nested objects and nulls are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub struct Rule {
    params: BTreeMap<String, String>,
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.params.insert(key.to_string(), value.to_string());
    }

    pub fn from_path(path: &Utf8Path) -> Result<Self, CmorError> {
        Self::try_from(read_json(path)?).map_err(|err| match err {
            CmorError::Parse { message, .. } => CmorError::Parse {
                path: path.to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First present key out of `keys`.
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    pub fn require(&self, key: &str) -> Result<&str, CmorError> {
        self.get(key)
            .ok_or_else(|| CmorError::MissingKey(key.to_string()))
    }

    pub fn schema(&self) -> Result<Option<SchemaVersion>, CmorError> {
        self.get("cmor_version").map(str::parse).transpose()
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl TryFrom<Value> for Rule {
    type Error = CmorError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(CmorError::Parse {
                path: "rule".to_string(),
                message: "a rule must be a JSON object".to_string(),
            });
        };
        let mut params = BTreeMap::new();
        for (key, value) in map {
            let text = match &value {
                Value::Array(items) => Some(
                    items
                        .iter()
                        .filter_map(scalar_string)
                        .collect::<Vec<_>>()
                        .join(" "),
                ),
                other => scalar_string(other),
            };
            if let Some(text) = text {
                params.insert(key, text);
            }
        }
        Ok(Self { params })
    }
}
