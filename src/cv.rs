use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::domain::SchemaVersion;
use crate::error::CmorError;
use crate::fetch::RemoteFetcher;
use crate::json::{read_json, scalar_string, string_list};
use crate::locator::{ResourceKind, ResourceLocator};

/// Top-level keys every CMIP6 CV file carries; repeating them is not a collision.
const CMIP6_SHARED_KEYS: &[&str] = &["version_metadata"];

const CMIP7_SKIPPED_FILES: &[&str] = &["graph.jsonld", "graph.min.jsonld"];

/// Controlled vocabulary of one CMIP phase, keyed by category.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlledVocabularies {
    schema: SchemaVersion,
    categories: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentSummary {
    pub id: String,
    pub start: String,
    pub end: String,
    pub parents: Vec<String>,
}

impl ControlledVocabularies {
    pub fn from_categories(schema: SchemaVersion, categories: BTreeMap<String, Value>) -> Self {
        Self { schema, categories }
    }

    pub fn load<F: RemoteFetcher>(
        locator: &ResourceLocator<F>,
        schema: SchemaVersion,
        user_dir: Option<Utf8PathBuf>,
        version: Option<String>,
    ) -> Result<Self, CmorError> {
        let resolved = locator
            .locate_kind(ResourceKind::cvs(schema), version, user_dir)
            .into_result()?;
        info!(schema = %schema, path = %resolved.path, tier = %resolved.tier, "loading controlled vocabularies");
        Self::from_directory(schema, &resolved.path)
    }

    pub fn from_directory(schema: SchemaVersion, directory: &Utf8Path) -> Result<Self, CmorError> {
        if !directory.as_std_path().is_dir() {
            return Err(CmorError::DirectoryNotFound(directory.to_string()));
        }
        let categories = match schema {
            SchemaVersion::Cmip6 => load_cmip6(directory)?,
            SchemaVersion::Cmip7 => load_cmip7(directory)?,
        };
        Ok(Self { schema, categories })
    }

    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }

    pub fn get(&self, category: &str) -> Option<&Value> {
        self.categories.get(category)
    }

    pub fn category(&self, category: &str) -> Result<&Value, CmorError> {
        self.get(category)
            .ok_or_else(|| CmorError::MissingCategory(category.to_string()))
    }

    pub fn entry(&self, category: &str, key: &str) -> Result<&Value, CmorError> {
        self.category(category)?
            .get(key)
            .ok_or_else(|| CmorError::MissingCvEntry {
                category: category.to_string(),
                key: key.to_string(),
            })
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.categories
    }

    pub fn experiment_summaries(&self) -> Vec<ExperimentSummary> {
        let (category, start_keys, end_keys, parent_keys): (&str, &[&str], &[&str], &[&str]) =
            match self.schema {
                SchemaVersion::Cmip6 => (
                    "experiment_id",
                    &["start_year"],
                    &["end_year"],
                    &["parent_experiment_id"],
                ),
                SchemaVersion::Cmip7 => (
                    "experiment",
                    &["start", "start-year"],
                    &["end", "end-year"],
                    &["parent-experiment", "parent_experiment_id"],
                ),
            };
        let Some(Value::Object(experiments)) = self.get(category) else {
            return Vec::new();
        };
        experiments
            .iter()
            .map(|(id, data)| ExperimentSummary {
                id: id.clone(),
                start: first_scalar(data, start_keys).unwrap_or_else(|| "N/A".to_string()),
                end: first_scalar(data, end_keys).unwrap_or_else(|| "N/A".to_string()),
                parents: parent_keys
                    .iter()
                    .find_map(|key| data.get(*key))
                    .map(string_list)
                    .unwrap_or_default(),
            })
            .collect()
    }
}

fn first_scalar(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| data.get(*key))
        .and_then(scalar_string)
}

fn load_cmip6(directory: &Utf8Path) -> Result<BTreeMap<String, Value>, CmorError> {
    let mut categories = BTreeMap::new();
    let mut origin = BTreeMap::<String, Utf8PathBuf>::new();
    for path in json_files(directory, |name| name.ends_with(".json"))? {
        let document = expect_object(&path, read_json(&path)?)?;
        for (key, value) in document {
            if let Some(first) = origin.get(&key) {
                if !CMIP6_SHARED_KEYS.contains(&key.as_str()) {
                    return Err(CmorError::DuplicateCvKey {
                        key,
                        first: first.to_string(),
                        second: path.to_string(),
                    });
                }
            }
            origin.insert(key.clone(), path.clone());
            categories.insert(key, value);
        }
    }
    debug!(count = categories.len(), "loaded CMIP6 categories");
    Ok(categories)
}

fn load_cmip7(directory: &Utf8Path) -> Result<BTreeMap<String, Value>, CmorError> {
    let mut categories = BTreeMap::new();

    let experiment_dir = directory.join("experiment");
    if experiment_dir.as_std_path().is_dir() {
        let mut entries = Map::new();
        let files = json_files(&experiment_dir, |name| {
            name.ends_with(".json") && !name.starts_with('@') && !CMIP7_SKIPPED_FILES.contains(&name)
        })?;
        for path in files {
            let data = read_json(&path)?;
            let id = data
                .get("id")
                .and_then(scalar_string)
                .or_else(|| path.file_stem().map(str::to_string))
                .unwrap_or_default();
            entries.insert(id, data);
        }
        categories.insert("experiment".to_string(), Value::Object(entries));
    }

    let project_dir = directory.join("project");
    if project_dir.as_std_path().is_dir() {
        for path in json_files(&project_dir, |name| name.ends_with("-list.json"))? {
            let Some(category) = path
                .file_stem()
                .and_then(|stem| stem.strip_suffix("-list"))
                .map(str::to_string)
            else {
                continue;
            };
            let mut data = read_json(&path)?;
            let value = match data.get_mut(&category) {
                Some(inner) => inner.take(),
                None => data,
            };
            categories.insert(category, value);
        }
    }

    debug!(count = categories.len(), "loaded CMIP7 categories");
    Ok(categories)
}

fn expect_object(path: &Utf8Path, value: Value) -> Result<Map<String, Value>, CmorError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(CmorError::Parse {
            path: path.to_string(),
            message: "expected a JSON object at the top level".to_string(),
        }),
    }
}

/// Files in `directory` whose names pass `keep`, sorted by name.
fn json_files(
    directory: &Utf8Path,
    keep: impl Fn(&str) -> bool,
) -> Result<Vec<Utf8PathBuf>, CmorError> {
    let entries = fs::read_dir(directory.as_std_path())
        .map_err(|err| CmorError::Filesystem(format!("read {directory}: {err}")))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| CmorError::Filesystem(err.to_string()))?;
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
            continue;
        };
        let matches = path.file_name().map(&keep).unwrap_or(false);
        if matches && path.as_std_path().is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn write(dir: &Utf8Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path()).unwrap();
        }
        fs::write(path.as_std_path(), content).unwrap();
    }

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, path)
    }

    #[test]
    fn cmip6_merges_disjoint_files() {
        let (_temp, dir) = temp_dir();
        write(&dir, "CMIP6_activity_id.json", r#"{"activity_id": {"CMIP": "core"}, "version_metadata": {"a": 1}}"#);
        write(&dir, "CMIP6_frequency.json", r#"{"frequency": {"mon": "monthly"}, "version_metadata": {"b": 2}}"#);
        let cv = ControlledVocabularies::from_directory(SchemaVersion::Cmip6, &dir).unwrap();
        assert_eq!(cv.entry("activity_id", "CMIP").unwrap(), "core");
        assert_eq!(cv.entry("frequency", "mon").unwrap(), "monthly");
    }

    #[test]
    fn cmip6_rejects_colliding_categories() {
        let (_temp, dir) = temp_dir();
        write(&dir, "CMIP6_a.json", r#"{"frequency": {"mon": "monthly"}}"#);
        write(&dir, "CMIP6_b.json", r#"{"frequency": {"day": "daily"}}"#);
        let err = ControlledVocabularies::from_directory(SchemaVersion::Cmip6, &dir).unwrap_err();
        assert_matches!(err, CmorError::DuplicateCvKey { key, .. } if key == "frequency");
    }

    #[test]
    fn malformed_json_names_file() {
        let (_temp, dir) = temp_dir();
        write(&dir, "CMIP6_broken.json", "{\"frequency\": ");
        let err = ControlledVocabularies::from_directory(SchemaVersion::Cmip6, &dir).unwrap_err();
        assert_matches!(err, CmorError::Parse { ref path, .. } if path.ends_with("CMIP6_broken.json"));
    }

    #[test]
    fn missing_directory() {
        let (_temp, dir) = temp_dir();
        let err = ControlledVocabularies::from_directory(SchemaVersion::Cmip7, &dir.join("nope"))
            .unwrap_err();
        assert_matches!(err, CmorError::DirectoryNotFound(_));
    }

    #[test]
    fn cmip7_skips_control_files_and_keys_by_id() {
        let (_temp, dir) = temp_dir();
        write(&dir, "experiment/@context.json", r#"{"id": "context"}"#);
        write(&dir, "experiment/graph.jsonld", "{}");
        write(&dir, "experiment/historical.json", r#"{"id": "historical", "start": 1850, "end": 2021, "parent-experiment": ["picontrol"]}"#);
        write(&dir, "experiment/amip.json", r#"{"description": "AMIP"}"#);
        write(&dir, "project/frequency-list.json", r#"{"frequency": ["mon", "day"]}"#);
        write(&dir, "project/license-list.json", r#"{"@context": "x", "items": ["cc-by"]}"#);

        let cv = ControlledVocabularies::from_directory(SchemaVersion::Cmip7, &dir).unwrap();
        let experiments = cv.category("experiment").unwrap().as_object().unwrap();
        assert_eq!(experiments.len(), 2);
        assert!(experiments.contains_key("historical"));
        assert!(experiments.contains_key("amip"));
        assert!(!experiments.contains_key("context"));
        assert_eq!(cv.category("frequency").unwrap(), &serde_json::json!(["mon", "day"]));
        assert!(cv.category("license").unwrap().get("items").is_some());

        let summaries = cv.experiment_summaries();
        let historical = summaries.iter().find(|s| s.id == "historical").unwrap();
        assert_eq!(historical.start, "1850");
        assert_eq!(historical.parents, vec!["picontrol"]);
        let amip = summaries.iter().find(|s| s.id == "amip").unwrap();
        assert_eq!(amip.start, "N/A");
    }
}
