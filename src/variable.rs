use std::sync::Arc;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{CompoundName, SchemaVersion};
use crate::error::CmorError;
use crate::json::{field_string, read_json};
use crate::table::TableHeader;

/// Attribute used to look a variable up in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableField {
    Name,
    OutName,
    StandardName,
    Cmip6CompoundName,
    Cmip7CompoundName,
}

impl VariableField {
    pub fn as_str(self) -> &'static str {
        match self {
            VariableField::Name => "name",
            VariableField::OutName => "out_name",
            VariableField::StandardName => "standard_name",
            VariableField::Cmip6CompoundName => "cmip6_compound_name",
            VariableField::Cmip7CompoundName => "cmip7_compound_name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cmip7Details {
    pub compound_name: CompoundName,
    pub cmip6_compound_name: Option<String>,
    pub cmip6_table: Option<String>,
    pub branding_label: String,
    pub region: String,
    pub physical_parameter_name: Option<String>,
    pub spatial_shape: Option<String>,
    pub temporal_shape: Option<String>,
}

/// Request metadata of a single variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRequestVariable {
    pub schema: SchemaVersion,
    pub name: String,
    pub out_name: String,
    pub standard_name: String,
    pub long_name: String,
    pub frequency: String,
    pub units: String,
    pub cell_methods: String,
    pub cell_measures: String,
    pub dimensions: Vec<String>,
    pub positive: String,
    pub modeling_realm: String,
    pub comment: String,
    #[serde(rename = "type")]
    pub variable_type: String,
    pub table_name: Option<String>,
    #[serde(skip)]
    pub table_header: Option<Arc<TableHeader>>,
    pub cmip7: Option<Cmip7Details>,
}

impl DataRequestVariable {
    /// Parses one `variable_entry` member of a CMIP6 table.
    pub fn from_cmip6_entry(
        name: &str,
        data: &Value,
        header: Option<Arc<TableHeader>>,
    ) -> Result<Self, CmorError> {
        let mut variable = Self::common(SchemaVersion::Cmip6, name, data)?;
        variable.table_name = header.as_ref().map(|header| header.table_id.clone());
        variable.table_header = header;
        Ok(variable)
    }

    /// Parses one CMIP7 entry keyed by its compound name.
    pub fn from_cmip7_entry(key: &str, data: &Value) -> Result<Self, CmorError> {
        let compound = field_string(data, "cmip7_compound_name")
            .unwrap_or_else(|| key.to_string())
            .parse::<CompoundName>()?;
        let mut variable = Self::common(SchemaVersion::Cmip7, &compound.variable, data)?;
        let cmip6_table = field_string(data, "cmip6_cmor_table")
            .or_else(|| field_string(data, "cmip6_table"))
            .filter(|value| !value.is_empty());
        variable.table_name = cmip6_table.clone();
        variable.cmip7 = Some(Cmip7Details {
            branding_label: field_string(data, "branding_label")
                .unwrap_or_else(|| compound.branding.clone()),
            region: field_string(data, "region").unwrap_or_else(|| compound.region.clone()),
            cmip6_compound_name: field_string(data, "cmip6_compound_name")
                .filter(|value| !value.is_empty()),
            cmip6_table,
            physical_parameter_name: field_string(data, "physical_parameter_name"),
            spatial_shape: field_string(data, "spatial_shape"),
            temporal_shape: field_string(data, "temporal_shape"),
            compound_name: compound,
        });
        Ok(variable)
    }

    /// Reads `name` from a CMIP6 table file such as `CMIP6_Omon.json`.
    pub fn from_json_file(path: &Utf8Path, name: &str) -> Result<Self, CmorError> {
        let data = read_json(path)?;
        let header = data.get("Header").ok_or_else(|| CmorError::MissingField {
            field: "Header".to_string(),
            context: path.to_string(),
        })?;
        let header = Arc::new(TableHeader::cmip6_from_value(header)?);
        let entry = data
            .get("variable_entry")
            .and_then(|entries| entries.get(name))
            .ok_or_else(|| CmorError::VariableNotFound {
                field: VariableField::Name.as_str().to_string(),
                value: name.to_string(),
                table: header.table_id.clone(),
            })?;
        Self::from_cmip6_entry(name, entry, Some(header))
    }

    fn common(schema: SchemaVersion, name: &str, data: &Value) -> Result<Self, CmorError> {
        let text = |key: &str| field_string(data, key).unwrap_or_default();
        let frequency = field_string(data, "frequency").ok_or_else(|| CmorError::MissingField {
            field: "frequency".to_string(),
            context: format!("variable {name}"),
        })?;
        let out_name = field_string(data, "out_name")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| name.to_string());
        Ok(Self {
            schema,
            name: name.to_string(),
            out_name,
            standard_name: text("standard_name"),
            long_name: text("long_name"),
            frequency,
            units: text("units"),
            cell_methods: text("cell_methods"),
            cell_measures: text("cell_measures"),
            dimensions: text("dimensions")
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            positive: text("positive"),
            modeling_realm: text("modeling_realm"),
            comment: text("comment"),
            variable_type: text("type"),
            table_name: None,
            table_header: None,
            cmip7: None,
        })
    }

    /// Table the variable belongs to: the header's id, else the grouping table name.
    pub fn table_id(&self) -> Option<&str> {
        self.table_header
            .as_ref()
            .map(|header| header.table_id.as_str())
            .or(self.table_name.as_deref())
    }

    pub fn variable_id(&self) -> &str {
        &self.name
    }

    pub fn compound_name(&self) -> Option<&CompoundName> {
        self.cmip7.as_ref().map(|details| &details.compound_name)
    }

    /// `<table>.<variable>`, recorded for CMIP7 and derived for CMIP6.
    pub fn cmip6_compound_name(&self) -> Option<String> {
        match &self.cmip7 {
            Some(details) => details.cmip6_compound_name.clone(),
            None => self.table_id().map(|table| format!("{table}.{}", self.name)),
        }
    }

    pub fn field(&self, field: VariableField) -> Option<String> {
        match field {
            VariableField::Name => Some(self.name.clone()),
            VariableField::OutName => Some(self.out_name.clone()),
            VariableField::StandardName => Some(self.standard_name.clone()),
            VariableField::Cmip6CompoundName => self.cmip6_compound_name(),
            VariableField::Cmip7CompoundName => self.compound_name().map(ToString::to_string),
        }
    }

    /// Realm words; CMIP tables write several realms space-separated.
    pub fn realms(&self) -> Vec<&str> {
        self.modeling_realm.split_whitespace().collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn cmip7_entry_carries_compound_parts() {
        let data = json!({
            "frequency": "mon",
            "modeling_realm": "atmos",
            "units": "K",
            "out_name": "tas",
            "dimensions": "longitude latitude time height2m",
            "cmip6_table": "Amon",
            "cmip6_compound_name": "Amon.tas",
            "branding_label": "tavg-h2m-hxy-u",
            "region": "GLB"
        });
        let variable =
            DataRequestVariable::from_cmip7_entry("atmos.tas.tavg-h2m-hxy-u.mon.GLB", &data)
                .unwrap();
        assert_eq!(variable.name, "tas");
        assert_eq!(variable.dimensions.len(), 4);
        assert_eq!(variable.table_id(), Some("Amon"));
        assert_eq!(variable.cmip6_compound_name().as_deref(), Some("Amon.tas"));
        assert_eq!(
            variable.field(VariableField::Cmip7CompoundName).as_deref(),
            Some("atmos.tas.tavg-h2m-hxy-u.mon.GLB")
        );
    }

    #[test]
    fn cmip7_entry_rejects_short_compound_name() {
        let data = json!({"frequency": "mon"});
        let err = DataRequestVariable::from_cmip7_entry("Amon.tas", &data).unwrap_err();
        assert_matches!(err, CmorError::Format { .. });
    }

    #[test]
    fn frequency_is_required() {
        let err = DataRequestVariable::from_cmip6_entry("tas", &json!({"units": "K"}), None)
            .unwrap_err();
        assert_matches!(err, CmorError::MissingField { field, .. } if field == "frequency");
    }
}
