use std::collections::BTreeMap;

use serde::Serialize;

use crate::bounds::BoundsArray;

/// One-dimensional labelled values with string attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataArray {
    pub name: String,
    pub values: Vec<f64>,
    pub attrs: BTreeMap<String, String>,
}

impl DataArray {
    pub fn new(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            values,
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        self.attrs.insert(key.to_string(), value.to_string());
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn units(&self) -> Option<&str> {
        self.attr("units")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Coordinates and data variables plus any cell bounds derived for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub variables: BTreeMap<String, DataArray>,
    pub bounds: BTreeMap<String, BoundsArray>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, array: DataArray) -> Self {
        self.insert(array);
        self
    }

    pub fn insert(&mut self, array: DataArray) {
        self.variables.insert(array.name.clone(), array);
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.variables.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataArray> {
        self.variables.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.bounds.contains_key(name)
    }
}
