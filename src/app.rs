use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::array::DataArray;
use crate::attributes::{Clock, Cmip6GlobalAttributes, Cmip7GlobalAttributes, GlobalAttributes};
use crate::config::ResolvedConfig;
use crate::cv::{ControlledVocabularies, ExperimentSummary};
use crate::domain::SchemaVersion;
use crate::dreq::DataRequestMetadata;
use crate::error::CmorError;
use crate::fetch::RemoteFetcher;
use crate::locator::{ResourceKind, ResourceLocator, Tier};
use crate::rule::Rule;
use crate::table::{ALL_VAR_INFO, DataRequestTable};
use crate::units::{DimensionlessMappings, UnitConversionEngine};
use crate::variable::{DataRequestVariable, VariableField};

#[derive(Debug, Clone, Serialize)]
pub struct LocateResult {
    pub resource: String,
    pub version: Option<String>,
    pub path: String,
    pub tier: Tier,
}

#[derive(Debug, Clone, Serialize)]
pub struct CvResult {
    pub schema: SchemaVersion,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<CvCategory>,
    pub experiments: Vec<ExperimentSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CvCategory {
    pub name: String,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct TablesResult {
    pub schema: SchemaVersion,
    pub path: String,
    pub tables: Vec<TableSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table_id: String,
    pub realm: Vec<String>,
    pub frequency_interval: Option<f64>,
    pub variables: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttrsResult {
    pub schema: SchemaVersion,
    pub variable: String,
    pub table_id: Option<String>,
    pub global_attributes: BTreeMap<String, String>,
    pub subdir_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResult {
    pub from_unit: String,
    pub to_unit: String,
    pub dimensionless_alias: Option<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ConvertRequest {
    pub from_unit: String,
    pub to_unit: String,
    pub alias: Option<String>,
    /// Looks the alias up in the dimensionless mappings when no alias is given.
    pub variable: Option<String>,
}

pub struct App<F: RemoteFetcher> {
    locator: ResourceLocator<F>,
    config: ResolvedConfig,
}

impl<F: RemoteFetcher> App<F> {
    pub fn new(locator: ResourceLocator<F>, config: ResolvedConfig) -> Self {
        Self { locator, config }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn locator(&self) -> &ResourceLocator<F> {
        &self.locator
    }

    pub fn locate(
        &self,
        kind: ResourceKind,
        version: Option<String>,
        path: Option<Utf8PathBuf>,
    ) -> Result<LocateResult, CmorError> {
        let spec = kind.spec();
        let version = version.or_else(|| self.configured_version(kind));
        let path = path.or_else(|| self.configured_path(kind));
        let resolved = self.locator.locate_kind(kind, version.clone(), path).into_result()?;
        Ok(LocateResult {
            resource: spec.name.to_string(),
            version: version.or_else(|| spec.default_version.map(str::to_string)),
            path: resolved.path.to_string(),
            tier: resolved.tier,
        })
    }

    pub fn controlled_vocabularies(
        &self,
        schema: SchemaVersion,
    ) -> Result<ControlledVocabularies, CmorError> {
        let kind = ResourceKind::cvs(schema);
        ControlledVocabularies::load(
            &self.locator,
            schema,
            self.configured_path(kind),
            self.configured_version(kind),
        )
    }

    pub fn cv(&self, schema: SchemaVersion, category: Option<&str>) -> Result<CvResult, CmorError> {
        let cv = self.controlled_vocabularies(schema)?;
        let category = category
            .map(|name| {
                cv.category(name).map(|content| CvCategory {
                    name: name.to_string(),
                    content: content.clone(),
                })
            })
            .transpose()?;
        Ok(CvResult {
            schema,
            categories: cv.categories().map(str::to_string).collect(),
            category,
            experiments: cv.experiment_summaries(),
        })
    }

    pub fn tables(&self, schema: SchemaVersion) -> Result<TablesResult, CmorError> {
        let kind = ResourceKind::tables(schema);
        let resolved = self
            .locator
            .locate_kind(kind, self.configured_version(kind), self.configured_path(kind))
            .into_result()?;
        let tables = DataRequestTable::find_all(schema, &resolved.path)?
            .map(|table| {
                table.map(|table| TableSummary {
                    table_id: table.table_id().to_string(),
                    realm: table.header().realm.clone(),
                    frequency_interval: table.header().approx_interval,
                    variables: table.variables().len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!(schema = %schema, count = tables.len(), "listed data request tables");
        Ok(TablesResult {
            schema,
            path: resolved.path.to_string(),
            tables,
        })
    }

    /// Data request entry the rule is about.
    ///
    /// CMIP6 rules name `table_id` and `cmor_variable`. CMIP7 rules name a
    /// `compound_name`, or `table_id` and `cmor_variable` as a CMIP6-style key.
    pub fn rule_variable(
        &self,
        schema: SchemaVersion,
        rule: &Rule,
    ) -> Result<DataRequestVariable, CmorError> {
        match schema {
            SchemaVersion::Cmip6 => {
                let table_id = rule.require("table_id")?;
                let name = rule.require("cmor_variable")?;
                let kind = ResourceKind::Cmip6Tables;
                let resolved = self
                    .locator
                    .locate_kind(kind, self.configured_version(kind), self.configured_path(kind))
                    .into_result()?;
                let file = resolved.path.join(format!("CMIP6_{table_id}.json"));
                let table = DataRequestTable::from_json_file(SchemaVersion::Cmip6, &file)?;
                table.get_variable(name, VariableField::Name).cloned()
            }
            SchemaVersion::Cmip7 => cmip7_variable(&self.data_request_metadata()?, rule),
        }
    }

    /// Generated CMIP7 metadata when it can be located, else the packaged
    /// `all_var_info.json`.
    pub fn data_request_metadata(&self) -> Result<DataRequestMetadata, CmorError> {
        match DataRequestMetadata::load(
            &self.locator,
            self.config.dreq_version.clone(),
            self.config.cmip7_metadata.clone(),
        ) {
            Ok(metadata) => Ok(metadata),
            Err(CmorError::ResolutionExhausted { resource, .. }) => {
                warn!(resource = %resource, "falling back to packaged CMIP7 variable info");
                let kind = ResourceKind::Cmip7Tables;
                let resolved = self
                    .locator
                    .locate_kind(kind, self.configured_version(kind), self.configured_path(kind))
                    .into_result()?;
                let file = if resolved.path.as_std_path().is_dir() {
                    resolved.path.join(ALL_VAR_INFO)
                } else {
                    resolved.path
                };
                DataRequestMetadata::from_path(&file)
            }
            Err(other) => Err(other),
        }
    }

    pub fn attrs(&self, rule: &Rule, clock: &dyn Clock) -> Result<AttrsResult, CmorError> {
        let schema = rule.schema()?.unwrap_or(self.config.schema_version);
        let cv = self.controlled_vocabularies(schema)?;
        let (variable, dreq_version) = match schema {
            SchemaVersion::Cmip6 => (self.rule_variable(schema, rule)?, None),
            SchemaVersion::Cmip7 => {
                let metadata = self.data_request_metadata()?;
                let version = metadata.version().map(str::to_string);
                (cmip7_variable(&metadata, rule)?, version)
            }
        };
        let resolver: Box<dyn GlobalAttributes + '_> = match schema {
            SchemaVersion::Cmip6 => Box::new(Cmip6GlobalAttributes::new(&variable, &cv, rule)),
            SchemaVersion::Cmip7 => Box::new(
                Cmip7GlobalAttributes::new(Some(&variable), &cv, rule)
                    .with_data_request_version(dreq_version.as_deref()),
            ),
        };
        let global_attributes = resolver.global_attributes()?;
        let subdir_path = resolver.subdir_path(clock)?;
        info!(schema = %schema, variable = %variable.name, path = %subdir_path, "resolved global attributes");
        Ok(AttrsResult {
            schema,
            variable: variable.name.clone(),
            table_id: variable.table_id().map(str::to_string),
            global_attributes,
            subdir_path,
        })
    }

    pub fn dimensionless_mappings(&self) -> Result<DimensionlessMappings, CmorError> {
        let path = self
            .config
            .dimensionless_mappings
            .clone()
            .unwrap_or_else(|| DimensionlessMappings::packaged(self.locator.packaged()));
        if !path.as_std_path().exists() {
            warn!(path = %path, "no dimensionless mappings found");
            return Ok(DimensionlessMappings::new());
        }
        DimensionlessMappings::from_path(&path)
    }

    pub fn convert(&self, values: Vec<f64>, request: &ConvertRequest) -> Result<ConvertResult, CmorError> {
        let alias = match (&request.alias, &request.variable) {
            (Some(alias), _) => Some(alias.clone()),
            (None, Some(variable)) => self
                .dimensionless_mappings()?
                .alias_for(variable, &request.to_unit)?
                .map(str::to_string),
            (None, None) => None,
        };
        let array = DataArray::new(
            request.variable.as_deref().unwrap_or("values"),
            values,
        )
        .with_attr("units", &request.from_unit);
        let mut engine = UnitConversionEngine::new();
        let converted = engine.convert(&array, &request.from_unit, &request.to_unit, alias.as_deref())?;
        Ok(ConvertResult {
            from_unit: request.from_unit.clone(),
            to_unit: converted.units().unwrap_or(&request.to_unit).to_string(),
            dimensionless_alias: alias,
            values: converted.values,
        })
    }

    fn configured_path(&self, kind: ResourceKind) -> Option<Utf8PathBuf> {
        match kind {
            ResourceKind::Cmip6Cvs | ResourceKind::Cmip7Cvs => self.config.cv_dir.clone(),
            ResourceKind::Cmip6Tables | ResourceKind::Cmip7Tables => self.config.tables_dir.clone(),
            ResourceKind::Cmip7Metadata => self.config.cmip7_metadata.clone(),
        }
    }

    fn configured_version(&self, kind: ResourceKind) -> Option<String> {
        match kind {
            ResourceKind::Cmip6Cvs | ResourceKind::Cmip7Cvs => self.config.cv_version.clone(),
            ResourceKind::Cmip6Tables | ResourceKind::Cmip7Tables => {
                self.config.tables_version.clone()
            }
            ResourceKind::Cmip7Metadata => self.config.dreq_version.clone(),
        }
    }
}

fn cmip7_variable(metadata: &DataRequestMetadata, rule: &Rule) -> Result<DataRequestVariable, CmorError> {
    if let Some(compound_name) = rule.get("compound_name") {
        return metadata.variable(compound_name);
    }
    let table_id = rule.require("table_id")?;
    let name = rule.require("cmor_variable")?;
    metadata.variable_by_cmip6_name(&format!("{table_id}.{name}"))
}
