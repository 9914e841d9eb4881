use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use std::vec;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{SchemaVersion, approx_interval};
use crate::error::CmorError;
use crate::json::{field_string, read_json, string_list};
use crate::variable::{DataRequestVariable, VariableField};

const CMIP6_SKIPPED_FILES: &[&str] = &[
    "CMIP6_CV_test.json",
    "CMIP6_coordinate.json",
    "CMIP6_CV.json",
    "CMIP6_formula_terms.json",
    "CMIP6_grids.json",
    "CMIP6_input_example.json",
];

const DATA_SPECS_REPLACEMENTS: &[(&str, &str)] = &[("01.00.33", "1.0.33"), ("01.00.27", "1.0.27")];

pub const ALL_VAR_INFO: &str = "all_var_info.json";

/// Dotted version with optional minor and patch components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SpecVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SpecVersion {
    type Err = CmorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let format_error = || CmorError::Format {
            kind: "version".to_string(),
            value: value.to_string(),
            expected: "'<major>[.<minor>[.<patch>]]'".to_string(),
        };
        let trimmed = value.trim().trim_start_matches('v');
        let parts = trimmed
            .split('.')
            .map(|part| part.parse::<u64>().map_err(|_| format_error()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [major] => Ok(Self::new(*major, 0, 0)),
            [major, minor] => Ok(Self::new(*major, *minor, 0)),
            [major, minor, patch] => Ok(Self::new(*major, *minor, *patch)),
            _ => Err(format_error()),
        }
    }
}

impl Serialize for SpecVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Fixed metadata shared by every variable of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableHeader {
    pub schema: SchemaVersion,
    pub table_id: String,
    pub realm: Vec<String>,
    pub table_date: NaiveDate,
    pub approx_interval: Option<f64>,
    pub generic_levels: Vec<String>,
    pub data_specs_version: SpecVersion,
    pub cmor_version: SpecVersion,
    pub mip_era: String,
    pub conventions: String,
    pub missing_value: f64,
    pub int_missing_value: i64,
    pub product: String,
}

impl TableHeader {
    pub fn cmip6_from_value(data: &Value) -> Result<Self, CmorError> {
        let required = |key: &str| {
            field_string(data, key).ok_or_else(|| CmorError::MissingField {
                field: key.to_string(),
                context: "CMIP6 table header".to_string(),
            })
        };
        let table_id = required("table_id")?;
        let table_id = table_id.strip_prefix("Table ").unwrap_or(&table_id).to_string();
        let interval = required("approx_interval")?;
        let approx_interval = if interval.trim().is_empty() {
            None
        } else {
            Some(parse_float("approx_interval", &interval)?)
        };

        let mut header = Self {
            schema: SchemaVersion::Cmip6,
            table_id,
            realm: vec![required("realm")?],
            table_date: parse_date(&required("table_date")?)?,
            approx_interval,
            generic_levels: required("generic_levels")?
                .split(' ')
                .map(str::to_string)
                .collect(),
            data_specs_version: SpecVersion::new(1, 0, 33),
            cmor_version: SpecVersion::new(3, 5, 0),
            mip_era: "CMIP6".to_string(),
            conventions: "CF-1.7 CMIP-6.2".to_string(),
            missing_value: 1.0e20,
            int_missing_value: -999,
            product: "model-output".to_string(),
        };

        if let Some(version) = field_string(data, "data_specs_version") {
            let corrected = DATA_SPECS_REPLACEMENTS
                .iter()
                .fold(version, |acc, (old, new)| acc.replace(old, new));
            header.data_specs_version = corrected.parse()?;
        }
        if let Some(version) = field_string(data, "cmor_version") {
            header.cmor_version = version.parse()?;
        }
        if let Some(value) = field_string(data, "missing_value") {
            header.missing_value = parse_float("missing_value", &value)?;
        }
        if let Some(value) = field_string(data, "int_missing_value") {
            header.int_missing_value = value.trim().parse().map_err(|_| CmorError::Format {
                kind: "int_missing_value".to_string(),
                value: value.clone(),
                expected: "an integer".to_string(),
            })?;
        }
        if let Some(value) = field_string(data, "product") {
            header.product = value;
        }
        if let Some(value) = field_string(data, "mip_era") {
            header.mip_era = value;
        }
        if let Some(value) = field_string(data, "Conventions") {
            header.conventions = value;
        }
        Ok(header)
    }

    /// CMIP7 headers carry only id, realm, interval and levels; the rest is fixed.
    pub fn cmip7(
        table_id: String,
        realm: Vec<String>,
        approx_interval: Option<f64>,
        generic_levels: Vec<String>,
    ) -> Self {
        Self {
            schema: SchemaVersion::Cmip7,
            table_id,
            realm,
            table_date: NaiveDate::from_ymd_opt(2024, 11, 22).unwrap_or_default(),
            approx_interval,
            generic_levels,
            data_specs_version: SpecVersion::new(1, 0, 0),
            cmor_version: SpecVersion::new(3, 5, 0),
            mip_era: "CMIP7".to_string(),
            conventions: "CF-1.7 CMIP-7.0".to_string(),
            missing_value: 1.0e20,
            int_missing_value: -999,
            product: "model-output".to_string(),
        }
    }

    pub fn cmip7_from_value(data: &Value) -> Self {
        let table_id = field_string(data, "table_id").unwrap_or_else(|| "unknown".to_string());
        let realm = data.get("realm").map(string_list).unwrap_or_default();
        let approx_interval = data.get("approx_interval").and_then(Value::as_f64);
        let generic_levels = match data.get("generic_levels") {
            Some(Value::String(levels)) => levels.split_whitespace().map(str::to_string).collect(),
            Some(other) => string_list(other),
            None => Vec::new(),
        };
        Self::cmip7(table_id, realm, approx_interval, generic_levels)
    }

    /// Synthesizes a header from the members of one CMIP6-compatible table.
    pub fn cmip7_from_members(
        table_id: &str,
        members: &[DataRequestVariable],
    ) -> Result<Self, CmorError> {
        let realm = members
            .iter()
            .map(|member| member.modeling_realm.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut smallest: Option<f64> = None;
        for member in members {
            if let Some(interval) = approx_interval(&member.frequency)? {
                smallest = Some(smallest.map_or(interval, |current| current.min(interval)));
            }
        }
        Ok(Self::cmip7(table_id.to_string(), realm, smallest, Vec::new()))
    }
}

/// Variables of one table plus their shared header.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequestTable {
    header: Arc<TableHeader>,
    variables: Vec<DataRequestVariable>,
}

impl DataRequestTable {
    pub fn new(header: Arc<TableHeader>, variables: Vec<DataRequestVariable>) -> Self {
        Self { header, variables }
    }

    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    pub fn table_id(&self) -> &str {
        &self.header.table_id
    }

    pub fn variables(&self) -> &[DataRequestVariable] {
        &self.variables
    }

    /// First variable whose `field` equals `value`.
    pub fn get_variable(
        &self,
        value: &str,
        field: VariableField,
    ) -> Result<&DataRequestVariable, CmorError> {
        self.variables
            .iter()
            .find(|variable| variable.field(field).as_deref() == Some(value))
            .ok_or_else(|| CmorError::VariableNotFound {
                field: field.as_str().to_string(),
                value: value.to_string(),
                table: self.table_id().to_string(),
            })
    }

    pub fn from_value(schema: SchemaVersion, data: &Value) -> Result<Self, CmorError> {
        let header_value = data.get("Header").ok_or_else(|| CmorError::MissingField {
            field: "Header".to_string(),
            context: "data request table".to_string(),
        })?;
        match schema {
            SchemaVersion::Cmip6 => {
                let header = Arc::new(TableHeader::cmip6_from_value(header_value)?);
                let entries = data
                    .get("variable_entry")
                    .and_then(Value::as_object)
                    .ok_or_else(|| CmorError::MissingField {
                        field: "variable_entry".to_string(),
                        context: format!("table {}", header.table_id),
                    })?;
                let variables = entries
                    .iter()
                    .map(|(name, entry)| {
                        DataRequestVariable::from_cmip6_entry(name, entry, Some(Arc::clone(&header)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::new(header, variables))
            }
            SchemaVersion::Cmip7 => {
                let header = Arc::new(TableHeader::cmip7_from_value(header_value));
                let entries = compound_entries(data)?;
                let mut variables = Vec::with_capacity(entries.len());
                for (key, entry) in entries {
                    let mut variable = match key.split_once('.') {
                        Some((table, name)) if !name.contains('.') => {
                            let mut variable = DataRequestVariable::from_cmip6_entry(name, entry, None)?;
                            variable.schema = SchemaVersion::Cmip7;
                            variable.table_name = Some(table.to_string());
                            variable
                        }
                        _ => DataRequestVariable::from_cmip7_entry(key, entry)?,
                    };
                    variable.table_header = Some(Arc::clone(&header));
                    variables.push(variable);
                }
                Ok(Self::new(header, variables))
            }
        }
    }

    pub fn from_json_file(schema: SchemaVersion, path: &Utf8Path) -> Result<Self, CmorError> {
        let data = read_json(path)?;
        Self::from_value(schema, &data).map_err(|err| match err {
            CmorError::MissingField { field, context } => CmorError::MissingField {
                field,
                context: format!("{context} ({path})"),
            },
            other => other,
        })
    }

    /// Builds the CMIP6-compatible table `table_id` out of CMIP7 `all_var_info` data.
    pub fn cmip7_from_all_var_info(table_id: &str, all_var_info: &Value) -> Result<Self, CmorError> {
        let entries = compound_entries(all_var_info)?;
        let mut members = entries
            .iter()
            .filter(|(_, entry)| grouping_table(entry).as_deref() == Some(table_id))
            .map(|(key, entry)| DataRequestVariable::from_cmip7_entry(key, entry))
            .collect::<Result<Vec<_>, _>>()?;
        if members.is_empty() {
            members = entries
                .iter()
                .filter(|(key, _)| key.starts_with(table_id))
                .map(|(key, entry)| DataRequestVariable::from_cmip7_entry(key, entry))
                .collect::<Result<Vec<_>, _>>()?;
        }
        if members.is_empty() {
            return Err(CmorError::TableNotFound(table_id.to_string()));
        }
        let header = Arc::new(TableHeader::cmip7_from_members(table_id, &members)?);
        for member in &mut members {
            member.table_header = Some(Arc::clone(&header));
        }
        Ok(Self::new(header, members))
    }

    /// Lazily parses every table under `path`; each call rescans the directory.
    pub fn find_all(schema: SchemaVersion, path: &Utf8Path) -> Result<TableIter, CmorError> {
        match schema {
            SchemaVersion::Cmip6 => {
                let entries = fs::read_dir(path.as_std_path())
                    .map_err(|_| CmorError::DirectoryNotFound(path.to_string()))?;
                let mut files = Vec::new();
                for entry in entries {
                    let entry = entry.map_err(|err| CmorError::Filesystem(err.to_string()))?;
                    let Ok(file) = Utf8PathBuf::from_path_buf(entry.path()) else {
                        continue;
                    };
                    let Some(name) = file.file_name() else {
                        continue;
                    };
                    if name.starts_with("CMIP6_")
                        && name.ends_with(".json")
                        && !CMIP6_SKIPPED_FILES.contains(&name)
                    {
                        files.push(file);
                    }
                }
                files.sort();
                Ok(TableIter::Cmip6 {
                    files: files.into_iter(),
                })
            }
            SchemaVersion::Cmip7 => {
                let file = if path.as_std_path().is_dir() {
                    path.join(ALL_VAR_INFO)
                } else {
                    path.to_path_buf()
                };
                let data = read_json(&file)?;
                let table_ids = compound_entries(&data)?
                    .values()
                    .filter_map(grouping_table)
                    .collect::<BTreeSet<_>>();
                Ok(TableIter::Cmip7 {
                    data: Arc::new(data),
                    table_ids: table_ids.into_iter().collect::<Vec<_>>().into_iter(),
                })
            }
        }
    }

    pub fn table_map(
        schema: SchemaVersion,
        path: &Utf8Path,
    ) -> Result<BTreeMap<String, DataRequestTable>, CmorError> {
        Self::find_all(schema, path)?
            .map(|table| table.map(|table| (table.table_id().to_string(), table)))
            .collect()
    }
}

pub enum TableIter {
    Cmip6 {
        files: vec::IntoIter<Utf8PathBuf>,
    },
    Cmip7 {
        data: Arc<Value>,
        table_ids: vec::IntoIter<String>,
    },
}

impl Iterator for TableIter {
    type Item = Result<DataRequestTable, CmorError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            TableIter::Cmip6 { files } => {
                let file = files.next()?;
                Some(DataRequestTable::from_json_file(SchemaVersion::Cmip6, &file))
            }
            TableIter::Cmip7 { data, table_ids } => {
                let table_id = table_ids.next()?;
                Some(DataRequestTable::cmip7_from_all_var_info(&table_id, data))
            }
        }
    }
}

fn compound_entries(data: &Value) -> Result<&serde_json::Map<String, Value>, CmorError> {
    data.get("Compound Name")
        .and_then(Value::as_object)
        .ok_or_else(|| CmorError::MissingField {
            field: "Compound Name".to_string(),
            context: "CMIP7 variable metadata".to_string(),
        })
}

fn grouping_table(entry: &Value) -> Option<String> {
    field_string(entry, "cmip6_cmor_table")
        .or_else(|| field_string(entry, "cmip6_table"))
        .filter(|value| !value.is_empty())
}

fn parse_float(field: &str, value: &str) -> Result<f64, CmorError> {
    value.trim().parse().map_err(|_| CmorError::Format {
        kind: field.to_string(),
        value: value.to_string(),
        expected: "a number".to_string(),
    })
}

fn parse_date(value: &str) -> Result<NaiveDate, CmorError> {
    const FORMATS: &[&str] = &["%d %B %Y", "%d %b %Y", "%B %d %Y", "%B %d, %Y", "%Y-%m-%d", "%Y%m%d", "%d/%m/%Y"];
    let trimmed = value.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| CmorError::Format {
            kind: "table_date".to_string(),
            value: value.to_string(),
            expected: "a calendar date such as '18 November 2020'".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn omon() -> Value {
        json!({
            "Header": {
                "data_specs_version": "01.00.33",
                "cmor_version": "3.5",
                "table_id": "Table Omon",
                "realm": "ocean",
                "table_date": "18 November 2020",
                "missing_value": "1e20",
                "int_missing_value": "-999",
                "product": "model-output",
                "approx_interval": "30.00000",
                "generic_levels": "olevel",
                "mip_era": "CMIP6",
                "Conventions": "CF-1.7 CMIP-6.3"
            },
            "variable_entry": {
                "thetao": {"frequency": "mon", "modeling_realm": "ocean", "units": "degC", "out_name": "thetao"},
                "tos": {"frequency": "mon", "modeling_realm": "ocean", "units": "degC", "out_name": "tos"}
            }
        })
    }

    #[test]
    fn header_serializes_dates_and_versions() {
        let table = DataRequestTable::from_value(SchemaVersion::Cmip6, &omon()).unwrap();
        let value = serde_json::to_value(table.header()).unwrap();
        assert_eq!(value["table_date"], "2020-11-18");
        assert_eq!(value["data_specs_version"], "1.0.33");
        assert_eq!(value["table_id"], "Omon");
    }

    #[test]
    fn cmip6_header_corrections() {
        let table = DataRequestTable::from_value(SchemaVersion::Cmip6, &omon()).unwrap();
        let header = table.header();
        assert_eq!(header.table_id, "Omon");
        assert_eq!(header.realm, vec!["ocean"]);
        assert_eq!(header.data_specs_version, SpecVersion::new(1, 0, 33));
        assert_eq!(header.table_date, NaiveDate::from_ymd_opt(2020, 11, 18).unwrap());
        assert_eq!(header.approx_interval, Some(30.0));
        assert_eq!(header.conventions, "CF-1.7 CMIP-6.3");
        assert_eq!(header.int_missing_value, -999);
    }

    #[test]
    fn empty_interval_is_none() {
        let mut data = omon();
        data["Header"]["approx_interval"] = json!("");
        let table = DataRequestTable::from_value(SchemaVersion::Cmip6, &data).unwrap();
        assert_eq!(table.header().approx_interval, None);
    }

    #[test]
    fn get_variable_first_match_and_error() {
        let table = DataRequestTable::from_value(SchemaVersion::Cmip6, &omon()).unwrap();
        let tos = table.get_variable("tos", VariableField::OutName).unwrap();
        assert_eq!(tos.table_id(), Some("Omon"));
        let err = table.get_variable("tas", VariableField::Name).unwrap_err();
        assert_matches!(err, CmorError::VariableNotFound { ref field, ref value, .. } if field == "name" && value == "tas");
        assert!(err.to_string().contains("name=tas"));
    }

    #[test]
    fn spec_version_optional_components() {
        assert_eq!("3.5".parse::<SpecVersion>().unwrap(), SpecVersion::new(3, 5, 0));
        assert_eq!("1".parse::<SpecVersion>().unwrap().to_string(), "1.0.0");
        assert_matches!("1.x".parse::<SpecVersion>(), Err(CmorError::Format { .. }));
    }

    #[test]
    fn cmip7_groups_by_cmip6_table() {
        let data = json!({
            "Compound Name": {
                "atmos.tas.tavg-h2m-hxy-u.mon.GLB": {"frequency": "mon", "modeling_realm": "atmos", "cmip6_table": "Amon"},
                "atmos.clt.tavg-u-hxy-u.mon.GLB": {"frequency": "mon", "modeling_realm": "atmos", "cmip6_table": "Amon"},
                "atmos.clt.tavg-u-hxy-u.day.GLB": {"frequency": "day", "modeling_realm": "atmos", "cmip6_table": "day"}
            }
        });
        let amon = DataRequestTable::cmip7_from_all_var_info("Amon", &data).unwrap();
        assert_eq!(amon.variables().len(), 2);
        assert_eq!(amon.header().approx_interval, Some(30.0));
        assert_eq!(amon.header().realm, vec!["atmos"]);
        assert_eq!(amon.header().mip_era, "CMIP7");

        let fallback = DataRequestTable::cmip7_from_all_var_info("atmos.clt", &data).unwrap();
        assert_eq!(fallback.variables().len(), 2);
        assert_eq!(fallback.header().approx_interval, Some(1.0));

        assert_matches!(
            DataRequestTable::cmip7_from_all_var_info("Omon", &data),
            Err(CmorError::TableNotFound(_))
        );
    }
}
