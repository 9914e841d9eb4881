use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use cmorkit::config::{CONFIG_FILE_ENV, Config, ConfigLoader};
use cmorkit::domain::SchemaVersion;
use cmorkit::error::CmorError;

#[test]
fn parse_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("cmorkit.json");
    fs::write(
        &path,
        r#"{
            "schema_version": "cmip7",
            "cv_dir": "/srv/cmip/CMIP7-CVs",
            "dreq_version": "v1.2.2.2",
            "dimensionless_mappings": "/srv/cmip/mappings.json"
        }"#,
    )
    .unwrap();

    let env = [("CMORKIT_TABLES_VERSION", "01.00.33")];
    let resolved = ConfigLoader::resolve_with_env(path.to_str(), &env).unwrap();

    assert_eq!(resolved.schema_version, SchemaVersion::Cmip7);
    assert_eq!(resolved.cv_dir, Some(Utf8PathBuf::from("/srv/cmip/CMIP7-CVs")));
    assert_eq!(resolved.dreq_version.as_deref(), Some("v1.2.2.2"));
    assert_eq!(resolved.tables_version.as_deref(), Some("01.00.33"));
    assert_eq!(resolved.cmip7_metadata, None);
}

#[test]
fn config_file_from_environment() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("elsewhere.json");
    fs::write(&path, r#"{"cv_version": "6.2.15.0"}"#).unwrap();
    let path = path.to_str().unwrap().to_string();

    let env = [(CONFIG_FILE_ENV, path.as_str())];
    let resolved = ConfigLoader::resolve_with_env(None, &env).unwrap();

    assert_eq!(resolved.schema_version, SchemaVersion::Cmip6);
    assert_eq!(resolved.cv_version.as_deref(), Some("6.2.15.0"));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let env: [(&str, &str); 0] = [];

    assert_matches!(
        ConfigLoader::resolve_with_env(path.to_str(), &env),
        Err(CmorError::ConfigRead(_))
    );
}

#[test]
fn malformed_config_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("cmorkit.json");
    fs::write(&path, r#"{"schema_version": "cmip5"}"#).unwrap();
    let env: [(&str, &str); 0] = [];

    assert_matches!(
        ConfigLoader::resolve_with_env(path.to_str(), &env),
        Err(CmorError::ConfigParse(_))
    );
}

#[test]
fn invalid_schema_override() {
    let env = [("CMORKIT_SCHEMA", "CMIP5")];

    assert_matches!(
        ConfigLoader::resolve_config(Config::default(), &env),
        Err(CmorError::InvalidChoice { field, .. }) if field == "cmor_version"
    );
}
