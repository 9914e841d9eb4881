use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CmorError {
    #[error("resource {resource} could not be located (tried: {})", attempted.join(", "))]
    #[diagnostic(help("pass an explicit path, populate the cache, set CMORKIT_DATA_DIR, or run `git submodule update --init`"))]
    ResolutionExhausted {
        resource: String,
        attempted: Vec<String>,
    },

    #[error("file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("ambiguous {field}: candidates {}; set `{field}` in the rule to choose one", candidates.join(", "))]
    Ambiguity {
        field: String,
        candidates: Vec<String>,
    },

    #[error("invalid {field} `{value}`, must be one of: {}", allowed.join(", "))]
    InvalidChoice {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("`{kind}` must be of the form {expected}, got: {value}")]
    Format {
        kind: String,
        value: String,
        expected: String,
    },

    #[error("missing source unit for {0}: no `units` attribute and no `model_unit` override")]
    MissingUnit(String),

    #[error("missing target unit for {0} and no dimensionless alias")]
    MissingTargetUnit(String),

    #[error("undefined unit `{0}`")]
    UndefinedUnit(String),

    #[error("Unknown chemical element {symbol} in {unit}")]
    UnknownElement { symbol: String, unit: String },

    #[error("dimensionless mapping for {variable} has no entry for unit `{unit}`")]
    MissingDimensionlessMapping { variable: String, unit: String },

    #[error("empty dimensionless mapping for {variable} with unit `{unit}`")]
    #[diagnostic(help("fill in the alias in the dimensionless mappings file"))]
    EmptyDimensionlessMapping { variable: String, unit: String },

    #[error("cannot convert from `{from}` to `{to}`")]
    IncompatibleUnits { from: String, to: String },

    #[error("scaled unit `{from}` cannot be converted to dimensionless `{to}`")]
    ScaledDimensionless { from: String, to: String },

    #[error("missing required rule key: {0}")]
    MissingKey(String),

    #[error("missing field `{field}` in {context}")]
    MissingField { field: String, context: String },

    #[error("A Variable with the attribute {field}={value} not found in the table {table}.")]
    VariableNotFound {
        field: String,
        value: String,
        table: String,
    },

    #[error("no data request table found for {0}")]
    TableNotFound(String),

    #[error("controlled vocabulary has no category {0}")]
    MissingCategory(String),

    #[error("controlled vocabulary category {category} has no entry {key}")]
    MissingCvEntry { category: String, key: String },

    #[error("duplicate controlled vocabulary key `{key}` in {first} and {second}")]
    DuplicateCvKey {
        key: String,
        first: String,
        second: String,
    },

    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("unknown frequency: {0}")]
    UnknownFrequency(String),

    #[error("unsupported global attribute: {0}")]
    UnsupportedAttribute(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("remote fetch failed: {0}")]
    Fetch(String),

    #[error("archive download returned status {status}: {message}")]
    FetchStatus { status: u16, message: String },

    #[error("resource {0} has no remote source")]
    NoRemote(String),
}
