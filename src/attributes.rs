//! Global attributes and archival directory paths for CMIP6 and CMIP7 output.
//!
//! Both schemas share the [`GlobalAttributes`] contract: walk the required
//! attribute list and resolve every name through its accessor. The schemas
//! differ only in where each accessor looks (controlled vocabulary, table
//! header, variable metadata or the rule).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::cv::ControlledVocabularies;
use crate::domain::{CompoundName, SchemaVersion, VariantLabel};
use crate::error::CmorError;
use crate::json::{scalar_string, string_list};
use crate::rule::Rule;
use crate::table::TableHeader;
use crate::variable::DataRequestVariable;

const HANDLE_PREFIX: &str = "hdl:21.14100/";
const FURTHER_INFO_BASE: &str = "https://furtherinfo.es-doc.org/";

macro_rules! required_attributes {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Global attribute names a CMIP file may be required to carry.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum RequiredAttribute {
            $($variant),+
        }

        impl RequiredAttribute {
            pub const ALL: &'static [RequiredAttribute] = &[$(RequiredAttribute::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(RequiredAttribute::$variant => $name),+
                }
            }
        }

        impl FromStr for RequiredAttribute {
            type Err = CmorError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($name => Ok(RequiredAttribute::$variant),)+
                    other => Err(CmorError::UnsupportedAttribute(other.to_string())),
                }
            }
        }
    };
}

required_attributes! {
    Conventions => "Conventions",
    ActivityId => "activity_id",
    CreationDate => "creation_date",
    DataSpecsVersion => "data_specs_version",
    Experiment => "experiment",
    ExperimentId => "experiment_id",
    ForcingIndex => "forcing_index",
    Frequency => "frequency",
    FurtherInfoUrl => "further_info_url",
    Grid => "grid",
    GridLabel => "grid_label",
    InitializationIndex => "initialization_index",
    Institution => "institution",
    InstitutionId => "institution_id",
    License => "license",
    MipEra => "mip_era",
    NominalResolution => "nominal_resolution",
    PhysicsIndex => "physics_index",
    Product => "product",
    RealizationIndex => "realization_index",
    Realm => "realm",
    Source => "source",
    SourceId => "source_id",
    SourceType => "source_type",
    SubExperiment => "sub_experiment",
    SubExperimentId => "sub_experiment_id",
    TableId => "table_id",
    TrackingId => "tracking_id",
    VariableId => "variable_id",
    VariantLabel => "variant_label",
}

impl fmt::Display for RequiredAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the date used for the `vYYYYMMDD` version segment.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

type Attr = Result<String, CmorError>;

/// One accessor per required attribute.
///
/// Accessors whose value comes straight from the rule are provided; the
/// schema implementations supply the rest.
pub trait GlobalAttributes {
    fn rule(&self) -> &Rule;

    fn required_attributes(&self) -> Result<Vec<RequiredAttribute>, CmorError>;

    fn activity_id(&self) -> Attr;
    fn conventions(&self) -> Attr;
    fn data_specs_version(&self) -> Attr;
    fn experiment(&self) -> Attr;
    fn frequency(&self) -> Attr;
    fn grid(&self) -> Attr;
    fn institution(&self) -> Attr;
    fn institution_id(&self) -> Attr;
    fn license(&self) -> Attr;
    fn mip_era(&self) -> Attr;
    fn nominal_resolution(&self) -> Attr;
    fn product(&self) -> Attr;
    fn realm(&self) -> Attr;
    fn source(&self) -> Attr;
    fn source_type(&self) -> Attr;
    fn sub_experiment_id(&self) -> Attr;
    fn table_id(&self) -> Attr;

    fn variant_label(&self) -> Attr {
        self.rule().require("variant_label").map(str::to_string)
    }

    fn variant(&self) -> Result<VariantLabel, CmorError> {
        self.variant_label()?.parse()
    }

    fn realization_index(&self) -> Attr {
        Ok(self.variant()?.realization_index.to_string())
    }

    fn initialization_index(&self) -> Attr {
        Ok(self.variant()?.initialization_index.to_string())
    }

    fn physics_index(&self) -> Attr {
        Ok(self.variant()?.physics_index.to_string())
    }

    fn forcing_index(&self) -> Attr {
        Ok(self.variant()?.forcing_index.to_string())
    }

    fn source_id(&self) -> Attr {
        self.rule().require("source_id").map(str::to_string)
    }

    fn experiment_id(&self) -> Attr {
        self.rule().require("experiment_id").map(str::to_string)
    }

    fn grid_label(&self) -> Attr {
        self.rule().require("grid_label").map(str::to_string)
    }

    fn creation_date(&self) -> Attr {
        self.rule().require("creation_date").map(str::to_string)
    }

    fn variable_id(&self) -> Attr {
        self.rule().require("cmor_variable").map(str::to_string)
    }

    /// Fresh handle on every call.
    fn tracking_id(&self) -> Attr {
        Ok(format!("{HANDLE_PREFIX}{}", Uuid::new_v4()))
    }

    fn sub_experiment(&self) -> Attr {
        let id = self.sub_experiment_id()?;
        if id == "none" {
            return Ok(id);
        }
        Ok(id.split_whitespace().next().unwrap_or("none").to_string())
    }

    fn further_info_url(&self) -> Attr {
        Ok(format!(
            "{FURTHER_INFO_BASE}{}.{}.{}.{}.{}.{}",
            self.mip_era()?,
            self.institution_id()?,
            self.source_id()?,
            self.experiment_id()?,
            self.sub_experiment_id()?,
            self.variant_label()?,
        ))
    }

    fn resolve(&self, attribute: RequiredAttribute) -> Attr {
        use RequiredAttribute as A;
        match attribute {
            A::Conventions => self.conventions(),
            A::ActivityId => self.activity_id(),
            A::CreationDate => self.creation_date(),
            A::DataSpecsVersion => self.data_specs_version(),
            A::Experiment => self.experiment(),
            A::ExperimentId => self.experiment_id(),
            A::ForcingIndex => self.forcing_index(),
            A::Frequency => self.frequency(),
            A::FurtherInfoUrl => self.further_info_url(),
            A::Grid => self.grid(),
            A::GridLabel => self.grid_label(),
            A::InitializationIndex => self.initialization_index(),
            A::Institution => self.institution(),
            A::InstitutionId => self.institution_id(),
            A::License => self.license(),
            A::MipEra => self.mip_era(),
            A::NominalResolution => self.nominal_resolution(),
            A::PhysicsIndex => self.physics_index(),
            A::Product => self.product(),
            A::RealizationIndex => self.realization_index(),
            A::Realm => self.realm(),
            A::Source => self.source(),
            A::SourceId => self.source_id(),
            A::SourceType => self.source_type(),
            A::SubExperiment => self.sub_experiment(),
            A::SubExperimentId => self.sub_experiment_id(),
            A::TableId => self.table_id(),
            A::TrackingId => self.tracking_id(),
            A::VariableId => self.variable_id(),
            A::VariantLabel => self.variant_label(),
        }
    }

    fn global_attributes(&self) -> Result<BTreeMap<String, String>, CmorError> {
        self.required_attributes()?
            .into_iter()
            .map(|attribute| Ok((attribute.as_str().to_string(), self.resolve(attribute)?)))
            .collect()
    }

    /// `mip_era/activity_id/institution_id/source_id/experiment_id/member_id/table_id/variable_id/grid_label/vYYYYMMDD`
    fn subdir_path(&self, clock: &dyn Clock) -> Attr {
        let mut member_id = self.variant_label()?;
        let sub_experiment_id = self.sub_experiment_id()?;
        if sub_experiment_id != "none" {
            member_id = format!("{member_id}-{sub_experiment_id}");
        }
        let version = format!("v{}", clock.today().format("%Y%m%d"));
        Ok([
            self.mip_era()?,
            self.activity_id()?,
            self.institution_id()?,
            self.source_id()?,
            self.experiment_id()?,
            member_id,
            self.table_id()?,
            self.variable_id()?,
            self.grid_label()?,
            version,
        ]
        .join("/"))
    }
}

/// Picks the attribute strategy for `schema`.
pub fn resolver<'a>(
    schema: SchemaVersion,
    variable: &'a DataRequestVariable,
    cv: &'a ControlledVocabularies,
    rule: &'a Rule,
) -> Box<dyn GlobalAttributes + 'a> {
    match schema {
        SchemaVersion::Cmip6 => Box::new(Cmip6GlobalAttributes::new(variable, cv, rule)),
        SchemaVersion::Cmip7 => Box::new(Cmip7GlobalAttributes::new(Some(variable), cv, rule)),
    }
}

fn non_empty<'r>(rule: &'r Rule, keys: &[&str]) -> Option<&'r str> {
    keys.iter()
        .filter_map(|key| rule.get(key))
        .find(|value| !value.is_empty())
}

fn missing(field: &str, context: impl Into<String>) -> CmorError {
    CmorError::MissingField {
        field: field.to_string(),
        context: context.into(),
    }
}

fn text_field(value: &Value, key: &str, context: &str) -> Attr {
    value
        .get(key)
        .and_then(scalar_string)
        .ok_or_else(|| missing(key, context))
}

/// Resolves a single value out of a candidate list, honouring a rule override.
fn choose(field: &str, candidates: Vec<String>, user: Option<&str>) -> Attr {
    match candidates.len() {
        0 => Err(missing(field, "controlled vocabulary")),
        1 => Ok(candidates.into_iter().next().unwrap_or_default()),
        _ => match user {
            Some(choice) if candidates.iter().any(|c| c == choice) => Ok(choice.to_string()),
            Some(choice) => Err(CmorError::InvalidChoice {
                field: field.to_string(),
                value: choice.to_string(),
                allowed: candidates,
            }),
            None => Err(CmorError::Ambiguity {
                field: field.to_string(),
                candidates,
            }),
        },
    }
}

fn parse_required(names: Vec<String>) -> Result<Vec<RequiredAttribute>, CmorError> {
    names.iter().map(|name| name.parse()).collect()
}

static OPTIONAL_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("valid regex"));
static LICENSE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<.*?>").expect("valid regex"));

/// Substitutes `<...>` placeholders in order; `[...]` sections are dropped
/// when no further info url is given.
pub fn fill_license_template(template: &str, args: &[&str], keep_optional: bool) -> Attr {
    let text = if keep_optional {
        template.to_string()
    } else {
        OPTIONAL_SECTION.replace_all(template, "").into_owned()
    };
    let mut values = args.iter();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for found in LICENSE_PLACEHOLDER.find_iter(&text) {
        let value = values.next().ok_or_else(|| CmorError::Format {
            kind: "license".to_string(),
            value: template.to_string(),
            expected: format!("at most {} placeholders", args.len()),
        })?;
        out.push_str(&text[last..found.start()]);
        out.push_str(value);
        last = found.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// CMIP6 strategy: most facts come from the `source_id` and `experiment_id`
/// vocabularies, the rest from the table header.
pub struct Cmip6GlobalAttributes<'a> {
    variable: &'a DataRequestVariable,
    cv: &'a ControlledVocabularies,
    rule: &'a Rule,
}

impl<'a> Cmip6GlobalAttributes<'a> {
    pub fn new(
        variable: &'a DataRequestVariable,
        cv: &'a ControlledVocabularies,
        rule: &'a Rule,
    ) -> Self {
        Self { variable, cv, rule }
    }

    fn source_entry(&self) -> Result<&'a Value, CmorError> {
        let source_id = self.source_id()?;
        self.cv.entry("source_id", &source_id)
    }

    fn experiment_entry(&self) -> Result<&'a Value, CmorError> {
        let experiment_id = self.experiment_id()?;
        self.cv.entry("experiment_id", &experiment_id)
    }

    fn model_component(&self) -> Result<&'a Value, CmorError> {
        let realm = self.realm()?;
        self.source_entry()?
            .get("model_component")
            .and_then(|components| components.get(&realm))
            .ok_or_else(|| missing(&format!("model_component.{realm}"), "source_id entry"))
    }

    fn header_field<T>(
        &self,
        field: &str,
        get: impl Fn(&TableHeader) -> T,
    ) -> Result<T, CmorError> {
        self.variable
            .table_header
            .as_deref()
            .map(get)
            .ok_or_else(|| missing(field, format!("table header of {}", self.variable.name)))
    }
}

impl GlobalAttributes for Cmip6GlobalAttributes<'_> {
    fn rule(&self) -> &Rule {
        self.rule
    }

    fn required_attributes(&self) -> Result<Vec<RequiredAttribute>, CmorError> {
        parse_required(string_list(self.cv.category("required_global_attributes")?))
    }

    fn activity_id(&self) -> Attr {
        let candidates = self
            .experiment_entry()?
            .get("activity_id")
            .map(string_list)
            .unwrap_or_default();
        choose("activity_id", candidates, self.rule.get("activity_id"))
    }

    fn conventions(&self) -> Attr {
        self.header_field("Conventions", |header| header.conventions.clone())
    }

    fn data_specs_version(&self) -> Attr {
        self.header_field("data_specs_version", |header| header.data_specs_version.to_string())
    }

    fn experiment(&self) -> Attr {
        text_field(self.experiment_entry()?, "experiment", "experiment_id entry")
    }

    fn frequency(&self) -> Attr {
        Ok(self.variable.frequency.clone())
    }

    fn grid(&self) -> Attr {
        let description = text_field(self.model_component()?, "description", "model component")?;
        if description == "none" {
            if let Some(user) = non_empty(self.rule, &["description", "grid"]) {
                return Ok(user.to_string());
            }
        }
        Ok(description)
    }

    fn institution(&self) -> Attr {
        let institution_id = self.institution_id()?;
        let entry = self.cv.entry("institution_id", &institution_id)?;
        scalar_string(entry).ok_or_else(|| missing(&institution_id, "institution_id vocabulary"))
    }

    fn institution_id(&self) -> Attr {
        let candidates = self
            .source_entry()?
            .get("institution_id")
            .map(string_list)
            .unwrap_or_default();
        choose("institution_id", candidates, self.rule.get("institution_id"))
    }

    fn license(&self) -> Attr {
        let institution_id = self.institution_id()?;
        let license_key = self
            .source_entry()?
            .get("license_info")
            .and_then(|info| info.get("id"))
            .and_then(scalar_string)
            .ok_or_else(|| missing("license_info.id", "source_id entry"))?;
        let license = self.cv.category("license")?;
        let option = license
            .get("license_options")
            .and_then(|options| options.get(&license_key))
            .ok_or_else(|| missing(&format!("license_options.{license_key}"), "license vocabulary"))?;
        let license_url = text_field(option, "license_url", "license option")?;
        let license_id = text_field(option, "license_id", "license option")?;
        let template = text_field(license, "license", "license vocabulary")?;
        match self.rule.get("further_info_url") {
            Some(url) => fill_license_template(
                &template,
                &[&institution_id, &license_id, &license_url, url],
                true,
            ),
            None => fill_license_template(&template, &[&institution_id, &license_id, &license_url], false),
        }
    }

    fn mip_era(&self) -> Attr {
        self.header_field("mip_era", |header| header.mip_era.clone())
    }

    fn nominal_resolution(&self) -> Attr {
        let component = self.model_component()?;
        // Some CV releases misspell the key; the misspelt one wins when both exist.
        let resolution = ["native_ominal_resolution", "native_nominal_resolution"]
            .iter()
            .find_map(|key| component.get(*key).and_then(scalar_string))
            .ok_or_else(|| missing("native_nominal_resolution", "model component"))?;
        if resolution == "none" {
            if let Some(user) = non_empty(self.rule, &["nominal_resolution", "resolution"]) {
                return Ok(user.to_string());
            }
        }
        Ok(resolution)
    }

    fn product(&self) -> Attr {
        self.header_field("product", |header| header.product.clone())
    }

    /// The rule's `model_component` wins: table realms are wrong for some variables.
    fn realm(&self) -> Attr {
        if let Some(component) = self.rule.get("model_component") {
            return Ok(component.to_string());
        }
        let realms = self.variable.realms();
        if realms.len() > 1 {
            return self.header_field("realm", |header| header.realm.join(" "));
        }
        Ok(self.variable.modeling_realm.clone())
    }

    fn source(&self) -> Attr {
        let realm = self.realm()?;
        let release_year = text_field(self.source_entry()?, "release_year", "source_id entry")?;
        Ok(format!("{realm} ({release_year})"))
    }

    fn source_type(&self) -> Attr {
        Ok(self
            .experiment_entry()?
            .get("required_model_components")
            .map(string_list)
            .unwrap_or_default()
            .join(" "))
    }

    fn sub_experiment_id(&self) -> Attr {
        Ok(self
            .experiment_entry()?
            .get("sub_experiment_id")
            .map(string_list)
            .unwrap_or_default()
            .join(" "))
    }

    fn table_id(&self) -> Attr {
        self.header_field("table_id", |header| header.table_id.clone())
    }
}

const CMIP7_LICENSE_SHORT: &str = "is licensed under a Creative Commons Attribution 4.0 International License (https://creativecommons.org/licenses/by/4.0/).";

const CMIP7_LICENSE_TERMS: &str = " Consult https://pcmdi.llnl.gov/CMIP7/TermsOfUse for terms of use governing CMIP7 output, \
including citation requirements and proper acknowledgment. The data producers and data providers make no warranty, \
either express or implied, including, but not limited to, warranties of merchantability and fitness for a particular purpose. \
All liabilities arising from the supply of the information (including any liability arising in negligence) are excluded \
to the fullest extent permitted by law.";

/// Short realm codes used to synthesise CMIP6-style table ids.
fn realm_code(realm: &str) -> String {
    match realm {
        "atmos" => "A".to_string(),
        "ocean" | "ocn" | "ocnBgchem" => "O".to_string(),
        "seaIce" => "SI".to_string(),
        "land" => "L".to_string(),
        "landIce" => "LI".to_string(),
        other => other
            .chars()
            .next()
            .map(|first| first.to_uppercase().collect::<String>())
            .unwrap_or_default(),
    }
}

/// CMIP7 strategy. Source and institution vocabularies are not published
/// yet, so those facts come from the rule.
pub struct Cmip7GlobalAttributes<'a> {
    variable: Option<&'a DataRequestVariable>,
    cv: &'a ControlledVocabularies,
    rule: &'a Rule,
    data_request_version: Option<&'a str>,
}

impl<'a> Cmip7GlobalAttributes<'a> {
    pub fn new(
        variable: Option<&'a DataRequestVariable>,
        cv: &'a ControlledVocabularies,
        rule: &'a Rule,
    ) -> Self {
        Self {
            variable,
            cv,
            rule,
            data_request_version: None,
        }
    }

    /// Data request content version reported as `data_specs_version`.
    pub fn with_data_request_version(mut self, version: Option<&'a str>) -> Self {
        self.data_request_version = version;
        self
    }

    fn experiment_entry(&self) -> Result<Option<&'a Value>, CmorError> {
        let experiment_id = self.experiment_id()?;
        Ok(self
            .cv
            .get("experiment")
            .and_then(|experiments| experiments.get(&experiment_id)))
    }

    fn first_listed(&self, category: &str) -> Option<String> {
        self.cv
            .get(category)
            .filter(|value| value.is_array())
            .map(string_list)
            .and_then(|values| values.into_iter().next())
    }
}

impl GlobalAttributes for Cmip7GlobalAttributes<'_> {
    fn rule(&self) -> &Rule {
        self.rule
    }

    fn required_attributes(&self) -> Result<Vec<RequiredAttribute>, CmorError> {
        let listed = ["required_global_attributes", "required-global-attributes"]
            .iter()
            .filter_map(|key| self.cv.get(key))
            .map(string_list)
            .find(|names| !names.is_empty());
        match listed {
            Some(names) => parse_required(names),
            None => Ok(RequiredAttribute::ALL.to_vec()),
        }
    }

    fn activity_id(&self) -> Attr {
        let experiment_id = self.experiment_id()?;
        let user = non_empty(self.rule, &["activity_id"]);
        if let Some(entry) = self.experiment_entry()? {
            let activities = entry.get("activity").map(string_list).unwrap_or_default();
            if !activities.is_empty() {
                return choose("activity_id", activities, user);
            }
        }
        user.map(str::to_string)
            .ok_or_else(|| missing("activity_id", format!("experiment {experiment_id}")))
    }

    fn conventions(&self) -> Attr {
        Ok(self
            .rule
            .get("Conventions")
            .unwrap_or("CF-1.10 CMIP-7.0")
            .to_string())
    }

    fn data_specs_version(&self) -> Attr {
        if let Some(version) = self.data_request_version.filter(|v| !v.is_empty()) {
            return Ok(version.to_string());
        }
        Ok(self
            .rule
            .get("data_specs_version")
            .unwrap_or("1.0.0")
            .to_string())
    }

    fn experiment(&self) -> Attr {
        let experiment_id = self.experiment_id()?;
        if let Some(entry) = self.experiment_entry()? {
            return Ok(entry
                .get("description")
                .and_then(scalar_string)
                .unwrap_or(experiment_id));
        }
        Ok(self
            .rule
            .get("experiment")
            .map(str::to_string)
            .unwrap_or(experiment_id))
    }

    fn frequency(&self) -> Attr {
        self.variable
            .map(|variable| variable.frequency.clone())
            .or_else(|| self.rule.get("frequency").map(str::to_string))
            .ok_or_else(|| missing("frequency", "variable metadata or rule"))
    }

    fn grid(&self) -> Attr {
        Ok(non_empty(self.rule, &["grid", "description"])
            .unwrap_or("none")
            .to_string())
    }

    fn institution(&self) -> Attr {
        match non_empty(self.rule, &["institution"]) {
            Some(name) => Ok(name.to_string()),
            None => self.institution_id(),
        }
    }

    fn institution_id(&self) -> Attr {
        self.rule.require("institution_id").map(str::to_string)
    }

    fn license(&self) -> Attr {
        if let Some(user) = non_empty(self.rule, &["license"]) {
            return Ok(user.to_string());
        }
        let institution_id = self.institution_id()?;
        let mut text = format!("CMIP7 model data produced by {institution_id} {CMIP7_LICENSE_SHORT}");
        let listed = self
            .cv
            .get("license")
            .and_then(Value::as_array)
            .is_some_and(|licenses| !licenses.is_empty());
        if listed {
            text.push_str(CMIP7_LICENSE_TERMS);
        }
        Ok(text)
    }

    fn mip_era(&self) -> Attr {
        Ok(self
            .first_listed("mip-era")
            .or_else(|| self.rule.get("mip_era").map(str::to_string))
            .unwrap_or_else(|| SchemaVersion::Cmip7.mip_era().to_string()))
    }

    fn nominal_resolution(&self) -> Attr {
        Ok(non_empty(self.rule, &["nominal_resolution", "resolution"])
            .unwrap_or("none")
            .to_string())
    }

    fn product(&self) -> Attr {
        Ok(self
            .first_listed("product")
            .or_else(|| self.rule.get("product").map(str::to_string))
            .unwrap_or_else(|| "model-output".to_string()))
    }

    fn realm(&self) -> Attr {
        self.variable
            .map(|variable| variable.modeling_realm.as_str())
            .filter(|realm| !realm.is_empty())
            .or_else(|| self.rule.get_any(&["realm", "model_component"]))
            .map(str::to_string)
            .ok_or_else(|| missing("realm", "variable metadata or rule"))
    }

    fn source(&self) -> Attr {
        if let Some(source) = non_empty(self.rule, &["source"]) {
            return Ok(source.to_string());
        }
        let realm = self.realm()?;
        match non_empty(self.rule, &["release_year"]) {
            Some(year) => Ok(format!("{realm} ({year})")),
            None => Ok(format!("{} {realm}", self.source_id()?)),
        }
    }

    fn source_type(&self) -> Attr {
        if let Some(entry) = self.experiment_entry()? {
            let realms: Vec<String> = match entry.get("model-realms") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(_) => item.get("id").and_then(scalar_string),
                        other => scalar_string(other),
                    })
                    .filter(|id| !id.is_empty())
                    .collect(),
                _ => Vec::new(),
            };
            if !realms.is_empty() {
                return Ok(realms.join(" "));
            }
        }
        Ok(non_empty(self.rule, &["source_type"])
            .unwrap_or("AOGCM")
            .to_string())
    }

    fn sub_experiment_id(&self) -> Attr {
        if let Some(entry) = self.experiment_entry()? {
            let listed = entry
                .get("sub-experiment")
                .or_else(|| entry.get("sub_experiment_id"));
            return Ok(match listed {
                Some(value) => string_list(value).join(" "),
                None => "none".to_string(),
            });
        }
        Ok(self
            .rule
            .get("sub_experiment_id")
            .unwrap_or("none")
            .to_string())
    }

    /// `cmip6_table` of the variable, then the rule's `table_id`, then the
    /// table the variable was grouped under, then a realm code plus frequency
    /// taken from the compound name.
    fn table_id(&self) -> Attr {
        let cmip6_table = self
            .variable
            .and_then(|variable| variable.cmip7.as_ref())
            .and_then(|details| details.cmip6_table.clone());
        let grouped = self.variable.and_then(|variable| variable.table_name.clone());
        if let Some(table_id) = cmip6_table
            .or_else(|| self.rule.get("table_id").map(str::to_string))
            .or(grouped)
        {
            return Ok(table_id);
        }
        let compound = self
            .rule
            .get("compound_name")
            .and_then(|name| name.parse::<CompoundName>().ok())
            .or_else(|| self.variable.and_then(|v| v.compound_name().cloned()));
        compound
            .map(|compound| format!("{}{}", realm_code(&compound.realm), compound.frequency))
            .ok_or_else(|| missing("table_id", "variable metadata or rule"))
    }
}
