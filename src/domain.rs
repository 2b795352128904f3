use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

pub static ACCESSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[SED]R[RSXP][0-9]+$").expect("valid accession pattern"));

pub static RUN_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid run name pattern"));

/// SRA/ENA/DDBJ identifier such as `SRR000001`, `ERX123` or `DRP42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !ACCESSION_PATTERN.is_match(value) {
            return Err(RegistryError::InvalidAccession(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for Accession {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Accession> for String {
    fn from(value: Accession) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunName(String);

impl RunName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunName {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !RUN_NAME_PATTERN.is_match(value) {
            return Err(RegistryError::InvalidRunName(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for RunName {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunName> for String {
    fn from(value: RunName) -> Self {
        value.0
    }
}

/// A production release number. Releases start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Release(u32);

impl Release {
    pub fn new(value: u32) -> Result<Self, RegistryError> {
        if value == 0 {
            return Err(RegistryError::InvalidRelease(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Release {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let number = value
            .trim()
            .parse::<u32>()
            .map_err(|_| RegistryError::InvalidRelease(value.to_string()))?;
        Self::new(number)
    }
}

/// `OLD,NEW` organism pair given to `dataset --remap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapPair {
    pub source: String,
    pub destination: String,
}

impl FromStr for RemapPair {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (source, destination) = value
            .split_once(',')
            .ok_or_else(|| RegistryError::InvalidRemap(value.to_string()))?;
        let source = source.trim();
        let destination = destination.trim();
        if source.is_empty() || destination.is_empty() || destination.contains(',') {
            return Err(RegistryError::InvalidRemap(value.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            destination: destination.to_string(),
        })
    }
}

/// What to do when a loaded dataset already has a current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Refuse the entry and count it as not loadable.
    #[default]
    Skip,
    /// Retire the current version and insert the new one.
    Replace,
    /// Leave the registry untouched without reporting an error.
    Ignore,
}

impl fmt::Display for LoadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPolicy::Skip => write!(f, "skip"),
            LoadPolicy::Replace => write!(f, "replace"),
            LoadPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

/// One dataset in the exchange JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetRecord {
    pub component: String,
    pub species: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<u32>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_spliced: Option<bool>,
    pub runs: Vec<RunRecord>,
}

impl DatasetRecord {
    /// Key used to look the organism up: `production_name`, else `species`.
    pub fn organism_key(&self) -> &str {
        self.production_name.as_deref().unwrap_or(&self.species)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunRecord {
    pub name: RunName,
    pub accessions: Vec<Accession>,
    #[serde(
        rename = "isStrandSpecific",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_strand_specific: Option<bool>,
    #[serde(
        rename = "strandDirection",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub strand_direction: Option<String>,
    #[serde(
        rename = "hasPairedEnds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub has_paired_ends: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_reads: Option<bool>,
    #[serde(
        rename = "trim_polyA",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub trim_poly_a: Option<bool>,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_accession_valid() {
        for value in ["SRR000001", "ERX12", "DRP9", "SRS1"] {
            let acc: Accession = value.parse().unwrap();
            assert_eq!(acc.as_str(), value);
        }
    }

    #[test]
    fn parse_accession_invalid() {
        let err = "srr000001".parse::<Accession>().unwrap_err();
        assert_matches!(err, RegistryError::InvalidAccession(_));
        assert!("XRR1".parse::<Accession>().is_err());
        assert!("SRR".parse::<Accession>().is_err());
    }

    #[test]
    fn release_zero_is_rejected() {
        assert_matches!(
            "0".parse::<Release>().unwrap_err(),
            RegistryError::InvalidRelease(_)
        );
        assert_eq!("12".parse::<Release>().unwrap().get(), 12);
    }

    #[test]
    fn run_record_uses_camel_case_keys() {
        let run: RunRecord = serde_json::from_str(
            r#"{"name":"s1","accessions":["SRR1"],"isStrandSpecific":true,"trim_polyA":false}"#,
        )
        .unwrap();
        assert_eq!(run.is_strand_specific, Some(true));
        assert_eq!(run.trim_poly_a, Some(false));
        let json = serde_json::to_value(&run).unwrap();
        assert!(json.get("hasPairedEnds").is_none());
        assert_eq!(json["isStrandSpecific"], serde_json::json!(true));
    }
}
