//! CMIP7 data request content: per-variable metadata keyed by compound name
//! and the experiment to variable request lists.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::domain::CompoundName;
use crate::error::CmorError;
use crate::fetch::RemoteFetcher;
use crate::json::{field_string, read_json};
use crate::locator::{ResourceKind, ResourceLocator};
use crate::table::DataRequestTable;
use crate::variable::DataRequestVariable;

#[derive(Debug, Clone, PartialEq)]
pub struct DataRequestMetadata {
    version: Option<String>,
    raw: Value,
}

/// Optional filters for [`DataRequestMetadata::find_variants`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VariantFilter<'a> {
    pub realm: Option<&'a str>,
    pub frequency: Option<&'a str>,
    pub region: Option<&'a str>,
}

impl DataRequestMetadata {
    pub fn from_value(raw: Value) -> Result<Self, CmorError> {
        if !raw.get("Compound Name").is_some_and(Value::is_object) {
            return Err(CmorError::MissingField {
                field: "Compound Name".to_string(),
                context: "CMIP7 variable metadata".to_string(),
            });
        }
        let version = raw
            .get("Header")
            .and_then(|header| field_string(header, "dreq content version"));
        Ok(Self { version, raw })
    }

    pub fn from_path(path: &Utf8Path) -> Result<Self, CmorError> {
        info!(path = %path, "loading CMIP7 metadata");
        Self::from_value(read_json(path)?)
    }

    pub fn load<F: RemoteFetcher>(
        locator: &ResourceLocator<F>,
        version: Option<String>,
        user_path: Option<Utf8PathBuf>,
    ) -> Result<Self, CmorError> {
        let requested = version.clone();
        let resolved = locator
            .locate_kind(ResourceKind::Cmip7Metadata, version, user_path)
            .into_result()?;
        let mut metadata = Self::from_path(&resolved.path)?;
        if metadata.version.is_none() {
            metadata.version = requested;
        }
        Ok(metadata)
    }

    /// `dreq content version` from the header.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    fn entries(&self) -> &Map<String, Value> {
        static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
        self.raw
            .get("Compound Name")
            .and_then(Value::as_object)
            .unwrap_or_else(|| EMPTY.get_or_init(Map::new))
    }

    pub fn compound_names(&self) -> impl Iterator<Item = &str> {
        self.entries().keys().map(String::as_str)
    }

    pub fn entry(&self, compound_name: &str) -> Option<&Value> {
        self.entries().get(compound_name)
    }

    pub fn variable(&self, compound_name: &str) -> Result<DataRequestVariable, CmorError> {
        let entry = self
            .entry(compound_name)
            .ok_or_else(|| CmorError::VariableNotFound {
                field: "cmip7_compound_name".to_string(),
                value: compound_name.to_string(),
                table: "CMIP7 data request".to_string(),
            })?;
        DataRequestVariable::from_cmip7_entry(compound_name, entry)
    }

    /// First entry whose `cmip6_compound_name` equals `name`, e.g. `Amon.tas`.
    pub fn variable_by_cmip6_name(&self, name: &str) -> Result<DataRequestVariable, CmorError> {
        self.entries()
            .iter()
            .find(|(_, entry)| field_string(entry, "cmip6_compound_name").as_deref() == Some(name))
            .map(|(key, entry)| DataRequestVariable::from_cmip7_entry(key, entry))
            .unwrap_or_else(|| {
                Err(CmorError::VariableNotFound {
                    field: "cmip6_compound_name".to_string(),
                    value: name.to_string(),
                    table: "CMIP7 data request".to_string(),
                })
            })
    }

    /// Every variant of a physical variable across brandings, frequencies and regions.
    ///
    /// Entries whose key is not a 5-part compound name are skipped. Each result
    /// carries its key under `cmip7_compound_name`.
    pub fn find_variants(&self, variable: &str, filter: VariantFilter<'_>) -> Vec<Value> {
        self.entries()
            .iter()
            .filter_map(|(key, entry)| {
                let compound = key.parse::<CompoundName>().ok()?;
                let keep = compound.variable == variable
                    && filter.realm.is_none_or(|realm| compound.realm == realm)
                    && filter.frequency.is_none_or(|freq| compound.frequency == freq)
                    && filter.region.is_none_or(|region| compound.region == region);
                if !keep {
                    return None;
                }
                let mut variant = entry.clone();
                if let Value::Object(map) = &mut variant {
                    map.insert("cmip7_compound_name".to_string(), Value::String(key.clone()));
                }
                Some(variant)
            })
            .collect()
    }

    pub fn variables(&self) -> Result<Vec<DataRequestVariable>, CmorError> {
        self.entries()
            .iter()
            .map(|(key, entry)| DataRequestVariable::from_cmip7_entry(key, entry))
            .collect()
    }

    pub fn table(&self, table_id: &str) -> Result<DataRequestTable, CmorError> {
        DataRequestTable::cmip7_from_all_var_info(table_id, &self.raw)
    }
}

/// Experiment to priority to requested compound names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExperimentsData {
    #[serde(default)]
    experiment: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl ExperimentsData {
    pub fn from_value(value: Value) -> Result<Self, CmorError> {
        serde_json::from_value(value).map_err(|err| CmorError::Parse {
            path: "experiments data".to_string(),
            message: err.to_string(),
        })
    }

    pub fn from_path(path: &Utf8Path) -> Result<Self, CmorError> {
        info!(path = %path, "loading experiments data");
        serde_json::from_value(read_json(path)?).map_err(|err| CmorError::Parse {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    pub fn experiments(&self) -> Vec<&str> {
        self.experiment.keys().map(String::as_str).collect()
    }

    pub fn variables_for(
        &self,
        experiment: &str,
    ) -> Result<&BTreeMap<String, Vec<String>>, CmorError> {
        self.experiment
            .get(experiment)
            .ok_or_else(|| CmorError::InvalidChoice {
                field: "experiment".to_string(),
                value: experiment.to_string(),
                allowed: self.experiment.keys().take(10).cloned().collect(),
            })
    }

    pub fn variables_for_priority(
        &self,
        experiment: &str,
        priority: &str,
    ) -> Result<&[String], CmorError> {
        let by_priority = self.variables_for(experiment)?;
        by_priority
            .get(priority)
            .map(Vec::as_slice)
            .ok_or_else(|| CmorError::InvalidChoice {
                field: format!("priority for experiment {experiment}"),
                value: priority.to_string(),
                allowed: by_priority.keys().cloned().collect(),
            })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn sample() -> DataRequestMetadata {
        DataRequestMetadata::from_value(json!({
            "Header": {"dreq content version": "v1.2.2.2"},
            "Compound Name": {
                "atmos.tas.tavg-h2m-hxy-u.mon.GLB": {
                    "frequency": "mon", "modeling_realm": "atmos", "units": "K",
                    "cmip6_table": "Amon", "cmip6_compound_name": "Amon.tas"
                },
                "atmos.clt.tavg-u-hxy-u.mon.GLB": {
                    "frequency": "mon", "modeling_realm": "atmos", "units": "%",
                    "cmip6_table": "Amon", "cmip6_compound_name": "Amon.clt"
                },
                "atmos.clt.tavg-u-hxy-u.day.GLB": {
                    "frequency": "day", "modeling_realm": "atmos", "units": "%",
                    "cmip6_table": "day", "cmip6_compound_name": "day.clt"
                },
                "legacy.clt": {"frequency": "mon"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn version_from_header() {
        assert_eq!(sample().version(), Some("v1.2.2.2"));
    }

    #[test]
    fn variants_skip_malformed_keys() {
        let metadata = sample();
        let all = metadata.find_variants("clt", VariantFilter::default());
        assert_eq!(all.len(), 2);
        let daily = metadata.find_variants(
            "clt",
            VariantFilter {
                frequency: Some("day"),
                ..VariantFilter::default()
            },
        );
        assert_eq!(daily.len(), 1);
        assert_eq!(
            daily[0]["cmip7_compound_name"],
            json!("atmos.clt.tavg-u-hxy-u.day.GLB")
        );
    }

    #[test]
    fn lookup_by_cmip6_name() {
        let metadata = sample();
        let tas = metadata.variable_by_cmip6_name("Amon.tas").unwrap();
        assert_eq!(tas.units, "K");
        assert_matches!(
            metadata.variable_by_cmip6_name("Omon.tos"),
            Err(CmorError::VariableNotFound { .. })
        );
    }

    #[test]
    fn experiment_priorities() {
        let data = ExperimentsData::from_value(json!({
            "Header": {},
            "experiment": {
                "historical": {"Core": ["atmos.tas.tavg-h2m-hxy-u.mon.GLB"], "High": []},
                "piControl": {"Core": []}
            }
        }))
        .unwrap();
        assert_eq!(data.experiments(), vec!["historical", "piControl"]);
        assert_eq!(data.variables_for_priority("historical", "Core").unwrap().len(), 1);
        assert_matches!(
            data.variables_for_priority("historical", "Low"),
            Err(CmorError::InvalidChoice { .. })
        );
        assert_matches!(data.variables_for("amip"), Err(CmorError::InvalidChoice { .. }));
    }
}
