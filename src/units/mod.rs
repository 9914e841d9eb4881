//! Unit conversion of data arrays towards the units a data request asks for.
//!
//! Conversion to or from a dimensionless quantity is ambiguous, so a
//! per-variable alias table says what a dimensionless target unit stands
//! for in a given case (for example `0.001` meaning `g kg-1` for salinity).
//! The recorded unit is always the requested one, never the alias.

pub mod chemistry;
pub mod registry;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::array::{DataArray, Dataset};
use crate::error::CmorError;
use crate::json::read_json;
use crate::providers::PackagedResources;
use crate::rule::Rule;
use crate::variable::DataRequestVariable;

pub use registry::{Dimension, ParsedUnit, UnitDef, UnitRegistry};

static CHEMICAL_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mol(?P<symbol>\w+)").expect("valid regex"));

pub const DIMENSIONLESS_MAPPINGS_FILE: &str = "dimensionless_mappings.json";

/// Variable name to target unit to alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionlessMappings(BTreeMap<String, BTreeMap<String, Option<String>>>);

impl DimensionlessMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Utf8Path) -> Result<Self, CmorError> {
        serde_json::from_value(read_json(path)?).map_err(|err| CmorError::Parse {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    /// The table shipped in the data directory.
    pub fn packaged(packaged: &PackagedResources) -> Utf8PathBuf {
        packaged.root().join(DIMENSIONLESS_MAPPINGS_FILE)
    }

    pub fn insert(&mut self, variable: &str, unit: &str, alias: Option<&str>) {
        self.0
            .entry(variable.to_string())
            .or_default()
            .insert(unit.to_string(), alias.map(str::to_string));
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.0.contains_key(variable)
    }

    /// `None` when the variable needs no alias. A listed variable without a
    /// usable entry for `unit` is an error.
    pub fn alias_for(&self, variable: &str, unit: &str) -> Result<Option<&str>, CmorError> {
        let Some(units) = self.0.get(variable) else {
            return Ok(None);
        };
        match units.get(unit) {
            None => Err(CmorError::MissingDimensionlessMapping {
                variable: variable.to_string(),
                unit: unit.to_string(),
            }),
            Some(None) => Err(CmorError::EmptyDimensionlessMapping {
                variable: variable.to_string(),
                unit: unit.to_string(),
            }),
            Some(Some(alias)) if alias.is_empty() => Err(CmorError::EmptyDimensionlessMapping {
                variable: variable.to_string(),
                unit: unit.to_string(),
            }),
            Some(Some(alias)) => Ok(Some(alias.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitConversionSpec {
    pub from_unit: String,
    pub to_unit: String,
    pub dimensionless_alias: Option<String>,
}

/// Source unit, target unit and alias for converting `array` to `variable`.
///
/// A `model_unit` in the rule takes precedence over the array's `units`.
pub fn resolve_units(
    array: &DataArray,
    rule: &Rule,
    variable: &DataRequestVariable,
    mappings: &DimensionlessMappings,
) -> Result<UnitConversionSpec, CmorError> {
    let mut from_unit = array.units();
    if let Some(model_unit) = rule.get("model_unit") {
        info!(
            model_unit,
            dataset_unit = from_unit.unwrap_or("<unset>"),
            "user defined units take precedence over dataset units"
        );
        from_unit = Some(model_unit);
    }
    let to_unit = variable.units.clone();
    let alias = mappings.alias_for(&variable.name, &to_unit)?;
    if let Some(alias) = alias {
        info!(alias, unit = %to_unit, variable = %variable.name, "using dimensionless unit alias");
    }
    let from_unit = from_unit.ok_or_else(|| CmorError::MissingUnit(array.name.clone()))?;
    if to_unit.is_empty() && alias.is_none() {
        return Err(CmorError::MissingTargetUnit(variable.name.clone()));
    }
    Ok(UnitConversionSpec {
        from_unit: from_unit.to_string(),
        to_unit,
        dimensionless_alias: alias.map(str::to_string),
    })
}

/// Owns the unit registry of one conversion session. Chemical units such as
/// `molC` are registered on first sight.
#[derive(Debug, Clone, Default)]
pub struct UnitConversionEngine {
    registry: UnitRegistry,
}

impl UnitConversionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: UnitRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Registers `mol<Symbol> = <molar mass> g` when `unit` does not parse
    /// because of an unknown `mol<Symbol>` term.
    pub fn handle_chemicals(&mut self, unit: &str) -> Result<(), CmorError> {
        match self.registry.parse(unit) {
            Ok(_) => return Ok(()),
            Err(CmorError::UndefinedUnit(_)) => {}
            Err(other) => return Err(other),
        }
        let Some(captures) = CHEMICAL_UNIT.captures(unit) else {
            return Ok(());
        };
        let matched = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
        let symbol = captures.name("symbol").map(|m| m.as_str()).unwrap_or_default();
        let element = chemistry::element(symbol).ok_or_else(|| CmorError::UnknownElement {
            symbol: symbol.to_string(),
            unit: matched.to_string(),
        })?;
        debug!(element = element.name, unit, "chemical element detected in units");
        debug!("registering definition: {matched} = {} * g", element.molar_mass);
        self.registry.define_alias(matched, element.molar_mass, "g")
    }

    /// Converts `array` from `from_unit` to `to_unit`, computing through
    /// `dimensionless_alias` when given. The result's `units` is `to_unit`.
    pub fn convert(
        &mut self,
        array: &DataArray,
        from_unit: &str,
        to_unit: &str,
        dimensionless_alias: Option<&str>,
    ) -> Result<DataArray, CmorError> {
        self.handle_chemicals(from_unit)?;
        let target = dimensionless_alias
            .filter(|alias| !alias.is_empty())
            .unwrap_or(to_unit);
        self.handle_chemicals(target)?;

        let source = self.registry.parse(from_unit)?;
        let destination = self.registry.parse(target)?;
        if source.dimension != destination.dimension {
            return Err(CmorError::IncompatibleUnits {
                from: from_unit.to_string(),
                to: target.to_string(),
            });
        }

        let mut converted = array.clone();
        if !source.is_scaled() && !destination.is_scaled() {
            for value in &mut converted.values {
                *value = destination.from_si(source.to_si(*value));
            }
            converted.set_attr("units", target);
        } else {
            if destination.is_dimensionless() {
                return Err(CmorError::ScaledDimensionless {
                    from: from_unit.to_string(),
                    to: target.to_string(),
                });
            }
            debug!(from = from_unit, to = target, "factoring out unit scaling");
            for value in &mut converted.values {
                let base = source.to_si(*value * source.factor);
                *value = destination.from_si(base) / destination.factor;
            }
            converted.set_attr("units", &destination.unit_string());
        }
        if converted.units() != Some(to_unit) {
            converted.set_attr("units", to_unit);
        }
        Ok(converted)
    }

    pub fn convert_spec(
        &mut self,
        array: &DataArray,
        spec: &UnitConversionSpec,
    ) -> Result<DataArray, CmorError> {
        self.convert(
            array,
            &spec.from_unit,
            &spec.to_unit,
            spec.dimensionless_alias.as_deref(),
        )
    }

    pub fn handle_unit_conversion(
        &mut self,
        array: &DataArray,
        rule: &Rule,
        variable: &DataRequestVariable,
        mappings: &DimensionlessMappings,
    ) -> Result<DataArray, CmorError> {
        let spec = resolve_units(array, rule, variable, mappings)?;
        self.convert_spec(array, &spec)
    }

    /// Converts the rule's `model_variable` inside `dataset` in place.
    pub fn handle_dataset_unit_conversion(
        &mut self,
        dataset: &mut Dataset,
        rule: &Rule,
        variable: &DataRequestVariable,
        mappings: &DimensionlessMappings,
    ) -> Result<(), CmorError> {
        let name = rule.require("model_variable")?;
        let array = dataset.get(name).ok_or_else(|| CmorError::MissingField {
            field: name.to_string(),
            context: "dataset".to_string(),
        })?;
        let converted = self.handle_unit_conversion(array, rule, variable, mappings)?;
        dataset.insert(converted);
        Ok(())
    }
}
