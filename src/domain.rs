use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CmorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    Cmip6,
    Cmip7,
}

impl SchemaVersion {
    pub fn mip_era(self) -> &'static str {
        match self {
            SchemaVersion::Cmip6 => "CMIP6",
            SchemaVersion::Cmip7 => "CMIP7",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mip_era())
    }
}

impl FromStr for SchemaVersion {
    type Err = CmorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cmip6" => Ok(SchemaVersion::Cmip6),
            "cmip7" => Ok(SchemaVersion::Cmip7),
            _ => Err(CmorError::InvalidChoice {
                field: "cmor_version".to_string(),
                value: value.to_string(),
                allowed: vec!["CMIP6".to_string(), "CMIP7".to_string()],
            }),
        }
    }
}

static VARIANT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^r(\d+)i(\d+)p(\d+)f(\d+)$").expect("valid regex"));

/// Ensemble member identifier `r<N>i<N>p<N>f<N>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantLabel {
    label: String,
    pub realization_index: u32,
    pub initialization_index: u32,
    pub physics_index: u32,
    pub forcing_index: u32,
}

impl VariantLabel {
    pub fn as_str(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for VariantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

impl FromStr for VariantLabel {
    type Err = CmorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let format_error = || CmorError::Format {
            kind: "label".to_string(),
            value: value.to_string(),
            expected: "'r<int>i<int>p<int>f<int>'".to_string(),
        };
        let captures = VARIANT_LABEL.captures(value).ok_or_else(format_error)?;
        let index = |i: usize| -> Result<u32, CmorError> {
            captures
                .get(i)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(format_error)
        };
        Ok(Self {
            label: value.to_string(),
            realization_index: index(1)?,
            initialization_index: index(2)?,
            physics_index: index(3)?,
            forcing_index: index(4)?,
        })
    }
}

/// CMIP7 variable identifier `realm.variable.branding.frequency.region`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompoundName {
    pub realm: String,
    pub variable: String,
    pub branding: String,
    pub frequency: String,
    pub region: String,
}

impl CompoundName {
    pub fn new(
        realm: impl Into<String>,
        variable: impl Into<String>,
        branding: impl Into<String>,
        frequency: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            realm: realm.into(),
            variable: variable.into(),
            branding: branding.into(),
            frequency: frequency.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for CompoundName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.realm, self.variable, self.branding, self.frequency, self.region
        )
    }
}

impl FromStr for CompoundName {
    type Err = CmorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value.split('.').collect::<Vec<_>>();
        match parts.as_slice() {
            [realm, variable, branding, frequency, region] => {
                Ok(Self::new(*realm, *variable, *branding, *frequency, *region))
            }
            _ => Err(CmorError::Format {
                kind: "compound_name".to_string(),
                value: value.to_string(),
                expected: "'realm.variable.branding.frequency.region' (5 parts)".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for CompoundName {
    type Error = CmorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CompoundName> for String {
    fn from(value: CompoundName) -> Self {
        value.to_string()
    }
}

pub fn parse_compound_name(value: &str) -> Result<CompoundName, CmorError> {
    value.parse()
}

pub fn build_compound_name(
    realm: &str,
    variable: &str,
    branding: &str,
    frequency: &str,
    region: &str,
) -> String {
    CompoundName::new(realm, variable, branding, frequency, region).to_string()
}

/// Approximate sampling interval in days; `fx` has none.
pub fn approx_interval(frequency: &str) -> Result<Option<f64>, CmorError> {
    let interval = match frequency {
        "1hr" => Some(1.0 / 24.0),
        "3hr" => Some(0.125),
        "6hr" => Some(0.25),
        "day" => Some(1.0),
        "dec" => Some(3650.0),
        "fx" => None,
        "mon" => Some(30.0),
        "subhr" => Some(1.0 / 60.0),
        "yr" => Some(365.0),
        other => return Err(CmorError::UnknownFrequency(other.to_string())),
    };
    Ok(interval)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn variant_label_rejects_trailing_garbage() {
        let err = "r1i1p1f1x".parse::<VariantLabel>().unwrap_err();
        assert_matches!(err, CmorError::Format { .. });
        let err = "xr1i1p1f1".parse::<VariantLabel>().unwrap_err();
        assert_matches!(err, CmorError::Format { .. });
    }

    #[test]
    fn variant_label_multi_digit() {
        let label: VariantLabel = "r10i2p3f40".parse().unwrap();
        assert_eq!(label.realization_index, 10);
        assert_eq!(label.forcing_index, 40);
        assert_eq!(label.as_str(), "r10i2p3f40");
    }

    #[test]
    fn compound_name_needs_five_parts() {
        assert_matches!(
            "Amon.tas".parse::<CompoundName>(),
            Err(CmorError::Format { .. })
        );
        assert_matches!(
            "a.b.c.d.e.f".parse::<CompoundName>(),
            Err(CmorError::Format { .. })
        );
    }

    #[test]
    fn unknown_frequency_is_an_error() {
        assert_eq!(approx_interval("fx").unwrap(), None);
        assert_eq!(approx_interval("mon").unwrap(), Some(30.0));
        assert_matches!(approx_interval("weekly"), Err(CmorError::UnknownFrequency(_)));
    }

    #[test]
    fn schema_version_parses_case_insensitively() {
        assert_eq!("CMIP7".parse::<SchemaVersion>().unwrap(), SchemaVersion::Cmip7);
        assert_matches!(
            "CMIP5".parse::<SchemaVersion>(),
            Err(CmorError::InvalidChoice { .. })
        );
    }
}
