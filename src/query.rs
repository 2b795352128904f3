use std::fs;
use std::io::Write;

use camino::Utf8Path;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::domain::{DatasetRecord, RunRecord};
use crate::error::RegistryError;
use crate::store::{self, DATASET_COLUMNS, Dataset, Sample, dataset_from_row};

/// Selection criteria for listing and dumping. The default selects latest versions only.
#[derive(Debug, Clone, Default)]
pub struct DatasetFilter {
    pub component: Option<String>,
    pub organism: Option<String>,
    pub dataset: Option<String>,
    pub release: Option<u32>,
    pub include_retired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetEntry {
    #[serde(flatten)]
    pub dataset: Dataset,
    pub organism: String,
    pub species: String,
    pub component: String,
    pub runs: Vec<Sample>,
}

pub fn list_datasets(
    conn: &Connection,
    filter: &DatasetFilter,
) -> Result<Vec<DatasetEntry>, RegistryError> {
    let sql = format!(
        "SELECT {DATASET_COLUMNS}, o.production_name, o.species, c.name
         FROM dataset d
         JOIN organism o ON o.organism_id = d.organism_id
         JOIN component c ON c.component_id = o.component_id
         WHERE (?1 IS NULL OR c.name = ?1)
           AND (?2 IS NULL OR o.production_name = ?2)
           AND (?3 IS NULL OR d.name = ?3)
           AND (?4 IS NULL OR d.release_number = ?4)
           AND (?5 = 1 OR d.latest = 1)
         ORDER BY c.name, o.production_name, d.name, d.release_number"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![
                filter.component,
                filter.organism,
                filter.dataset,
                filter.release,
                filter.include_retired,
            ],
            |row| {
                Ok((
                    dataset_from_row(row)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                ))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(dataset, organism, species, component)| {
            let runs = store::samples_for_dataset(conn, dataset.id)?;
            Ok(DatasetEntry {
                dataset,
                organism,
                species,
                component,
                runs,
            })
        })
        .collect()
}

/// One dataset of an organism: the latest version, or the given release.
pub fn get_dataset(
    conn: &Connection,
    organism: &str,
    dataset: &str,
    release: Option<u32>,
) -> Result<DatasetEntry, RegistryError> {
    store::get_organism(conn, organism)?;
    let filter = DatasetFilter {
        organism: Some(organism.to_string()),
        dataset: Some(dataset.to_string()),
        release,
        include_retired: release.is_some(),
        ..DatasetFilter::default()
    };
    list_datasets(conn, &filter)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            let version = release.map(|r| format!(" release {r}")).unwrap_or_default();
            RegistryError::NotFound(format!("dataset {dataset}{version} for organism {organism}"))
        })
}

/// Convert a stored dataset into the exchange format.
pub fn to_record(entry: &DatasetEntry) -> Result<DatasetRecord, RegistryError> {
    let runs = entry
        .runs
        .iter()
        .map(|sample| -> Result<RunRecord, RegistryError> {
            Ok(RunRecord {
                name: sample.name.parse()?,
                accessions: sample
                    .accessions
                    .iter()
                    .map(|acc| acc.parse())
                    .collect::<Result<Vec<_>, RegistryError>>()?,
                is_strand_specific: sample.is_strand_specific,
                strand_direction: sample.strand_direction.clone(),
                has_paired_ends: sample.has_paired_ends,
                trim_reads: sample.trim_reads,
                trim_poly_a: sample.trim_poly_a,
            })
        })
        .collect::<Result<Vec<_>, RegistryError>>()?;

    Ok(DatasetRecord {
        component: entry.component.clone(),
        species: entry.species.clone(),
        production_name: Some(entry.organism.clone()),
        release: Some(entry.dataset.release),
        name: entry.dataset.name.clone(),
        no_spliced: Some(entry.dataset.no_spliced),
        runs,
    })
}

/// Write records as pretty JSON, replacing `path` atomically.
pub fn write_dump(path: &Utf8Path, records: &[DatasetRecord]) -> Result<(), RegistryError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
    let content = serde_json::to_vec_pretty(records)?;
    let mut temp = tempfile::Builder::new()
        .prefix("rnaseq-registry-dump")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
    temp.write_all(&content)
        .and_then(|_| temp.write_all(b"\n"))
        .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
    Ok(())
}
