use std::env;
use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::SchemaVersion;
use crate::error::CmorError;

pub const DEFAULT_CONFIG_FILE: &str = "cmorkit.json";
pub const CONFIG_FILE_ENV: &str = "CMORKIT_CONFIG_FILE";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<SchemaVersion>,
    #[serde(default)]
    pub cv_dir: Option<String>,
    #[serde(default)]
    pub cv_version: Option<String>,
    #[serde(default)]
    pub tables_dir: Option<String>,
    #[serde(default)]
    pub tables_version: Option<String>,
    #[serde(default)]
    pub cmip7_metadata: Option<String>,
    #[serde(default)]
    pub dreq_version: Option<String>,
    #[serde(default)]
    pub dimensionless_mappings: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schema_version: SchemaVersion,
    pub cv_dir: Option<Utf8PathBuf>,
    pub cv_version: Option<String>,
    pub tables_dir: Option<Utf8PathBuf>,
    pub tables_version: Option<String>,
    pub cmip7_metadata: Option<Utf8PathBuf>,
    pub dreq_version: Option<String>,
    pub dimensionless_mappings: Option<Utf8PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: SchemaVersion::Cmip6,
            cv_dir: None,
            cv_version: None,
            tables_dir: None,
            tables_version: None,
            cmip7_metadata: None,
            dreq_version: None,
            dimensionless_mappings: None,
        }
    }
}

/// Source of environment overrides, replaceable in tests.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|value| !value.is_empty())
    }
}

impl<K: AsRef<str>, V: AsRef<str>, const N: usize> EnvSource for [(K, V); N] {
    fn var(&self, key: &str) -> Option<String> {
        self.iter()
            .find(|(name, _)| name.as_ref() == key)
            .map(|(_, value)| value.as_ref().to_string())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CmorError> {
        Self::resolve_with_env(path, &ProcessEnv)
    }

    /// `path`, then `$CMORKIT_CONFIG_FILE`, then `cmorkit.json` in the working
    /// directory. Only the last one may be absent.
    pub fn resolve_with_env(
        path: Option<&str>,
        env: &dyn EnvSource,
    ) -> Result<ResolvedConfig, CmorError> {
        let explicit = path.map(str::to_string).or_else(|| env.var(CONFIG_FILE_ENV));
        let config_path = match &explicit {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if explicit.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| CmorError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| CmorError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, env)
    }

    pub fn resolve_config(config: Config, env: &dyn EnvSource) -> Result<ResolvedConfig, CmorError> {
        let schema_version = match env.var("CMORKIT_SCHEMA") {
            Some(value) => value.parse()?,
            None => config.schema_version.unwrap_or(SchemaVersion::Cmip6),
        };
        let pick = |key: &str, value: Option<String>| env.var(key).or(value);
        let path = |key: &str, value: Option<String>| pick(key, value).map(Utf8PathBuf::from);

        Ok(ResolvedConfig {
            schema_version,
            cv_dir: path("CMORKIT_CV_DIR", config.cv_dir),
            cv_version: pick("CMORKIT_CV_VERSION", config.cv_version),
            tables_dir: path("CMORKIT_TABLES_DIR", config.tables_dir),
            tables_version: pick("CMORKIT_TABLES_VERSION", config.tables_version),
            cmip7_metadata: path("CMORKIT_CMIP7_METADATA", config.cmip7_metadata),
            dreq_version: pick("CMORKIT_DREQ_VERSION", config.dreq_version),
            dimensionless_mappings: path(
                "CMORKIT_DIMENSIONLESS_MAPPINGS",
                config.dimensionless_mappings,
            ),
        })
    }
}
