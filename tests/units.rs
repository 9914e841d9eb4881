use assert_matches::assert_matches;

use cmorkit::array::{DataArray, Dataset};
use cmorkit::error::CmorError;
use cmorkit::rule::Rule;
use cmorkit::units::{DimensionlessMappings, UnitConversionEngine, resolve_units};
use cmorkit::variable::DataRequestVariable;
use serde_json::json;

fn variable(name: &str, units: &str) -> DataRequestVariable {
    DataRequestVariable::from_cmip6_entry(
        name,
        &json!({"frequency": "mon", "modeling_realm": "ocean", "units": units}),
        None,
    )
    .unwrap()
}

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() <= 1e-9 * expected.abs().max(1.0)
}

#[test]
fn kelvin_to_celsius() {
    let mut engine = UnitConversionEngine::new();
    let array = DataArray::new("tas", vec![273.15, 300.0]).with_attr("units", "K");

    let converted = engine.convert(&array, "K", "degC", None).unwrap();

    assert!(close(converted.values[0], 0.0));
    assert!(close(converted.values[1], 26.85));
    assert_eq!(converted.units(), Some("degC"));
}

#[test]
fn pascal_to_hectopascal() {
    let mut engine = UnitConversionEngine::new();
    let array = DataArray::new("psl", vec![101_325.0]).with_attr("units", "Pa");

    let converted = engine.convert(&array, "Pa", "hPa", None).unwrap();

    assert!(close(converted.values[0], 1013.25));
}

#[test]
fn molar_carbon_is_registered_on_demand() {
    let mut engine = UnitConversionEngine::new();
    assert!(!engine.registry().is_defined("molC"));

    engine.handle_chemicals("molC m-2 s-1").unwrap();

    assert!(engine.registry().is_defined("molC"));
    let parsed = engine.registry().parse("molC").unwrap();
    assert!(close(parsed.to_si(1.0), 0.0120107));
}

#[test]
fn unknown_element_is_reported() {
    let mut engine = UnitConversionEngine::new();

    assert_matches!(
        engine.handle_chemicals("molXx m-2"),
        Err(CmorError::UnknownElement { symbol, unit }) if symbol == "Xx" && unit == "molXx"
    );
}

#[test]
fn rule_unit_overrides_array_unit() {
    let array = DataArray::new("tos", vec![288.15]).with_attr("units", "degC");
    let rule = Rule::new().with("model_unit", "K");
    let spec = resolve_units(&array, &rule, &variable("tos", "degC"), &DimensionlessMappings::new()).unwrap();

    assert_eq!(spec.from_unit, "K");
    assert_eq!(spec.to_unit, "degC");
    assert_eq!(spec.dimensionless_alias, None);
}

#[test]
fn array_without_units_needs_override() {
    let array = DataArray::new("tos", vec![15.0]);

    assert_matches!(
        resolve_units(&array, &Rule::new(), &variable("tos", "degC"), &DimensionlessMappings::new()),
        Err(CmorError::MissingUnit(name)) if name == "tos"
    );
}

#[test]
fn salinity_alias_keeps_requested_unit() {
    let mut mappings = DimensionlessMappings::new();
    mappings.insert("so", "0.001", Some("g kg-1"));
    let mut engine = UnitConversionEngine::new();
    let array = DataArray::new("so", vec![34.5]).with_attr("units", "psu");

    let converted = engine
        .handle_unit_conversion(&array, &Rule::new(), &variable("so", "0.001"), &mappings)
        .unwrap();

    assert!(close(converted.values[0], 34.5));
    assert_eq!(converted.units(), Some("0.001"));
}

#[test]
fn dataset_variable_is_converted_in_place() {
    let mut dataset = Dataset::new()
        .with_variable(DataArray::new("temp", vec![10.0, 20.0]).with_attr("units", "degC"))
        .with_variable(DataArray::new("depth", vec![5.0, 15.0]).with_attr("units", "m"));
    let rule = Rule::new().with("model_variable", "temp");
    let mut engine = UnitConversionEngine::new();

    engine
        .handle_dataset_unit_conversion(&mut dataset, &rule, &variable("thetao", "K"), &DimensionlessMappings::new())
        .unwrap();

    let temp = dataset.get("temp").unwrap();
    assert!(close(temp.values[0], 283.15));
    assert_eq!(temp.units(), Some("K"));
    assert_eq!(dataset.get("depth").unwrap().units(), Some("m"));
}

#[test]
fn packaged_mappings_cover_salinity() {
    let path = camino::Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/dimensionless_mappings.json");
    let mappings = DimensionlessMappings::from_path(&path).unwrap();

    assert_eq!(mappings.alias_for("sos", "0.001").unwrap(), Some("g kg-1"));
    assert_eq!(mappings.alias_for("tas", "K").unwrap(), None);
}
