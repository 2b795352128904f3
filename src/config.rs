use std::fs;

use camino::Utf8Path;
use serde::Serialize;

use crate::domain::Release;
use crate::error::RegistryError;

/// Environment variable the production pipeline uses to pass the release.
pub const RELEASE_ENV: &str = "BUILD_VERSION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganismEntry {
    pub component: String,
    pub production_name: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Release from `--release`, falling back to `BUILD_VERSION`.
    pub fn resolve_release(flag: Option<u32>) -> Result<Option<Release>, RegistryError> {
        Self::resolve_release_from(flag, std::env::var(RELEASE_ENV).ok())
    }

    pub fn resolve_release_from(
        flag: Option<u32>,
        env: Option<String>,
    ) -> Result<Option<Release>, RegistryError> {
        if let Some(value) = flag {
            return Release::new(value).map(Some);
        }
        match env.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => value.parse().map(Some),
        }
    }

    pub fn read_organism_table(path: &Utf8Path) -> Result<Vec<OrganismEntry>, RegistryError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| RegistryError::Filesystem(format!("read {path}: {err}")))?;
        parse_organism_table(&content)
    }
}

/// Parse `component<TAB>production_name` lines. Blank lines and `#` comments are skipped.
pub fn parse_organism_table(content: &str) -> Result<Vec<OrganismEntry>, RegistryError> {
    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields = trimmed.split('\t').map(str::trim).collect::<Vec<_>>();
        match fields.as_slice() {
            [component, organism] if !component.is_empty() && !organism.is_empty() => {
                entries.push(OrganismEntry {
                    component: component.to_string(),
                    production_name: organism.to_string(),
                });
            }
            _ => {
                return Err(RegistryError::InvalidOrganismTable {
                    line: index + 1,
                    message: format!("expected 'component<TAB>organism', got {trimmed:?}"),
                });
            }
        }
    }
    Ok(entries)
}
