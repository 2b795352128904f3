use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::Serialize;
use tracing::debug;

use crate::domain::{Release, RunRecord};
use crate::error::RegistryError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS component (
    component_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS organism (
    organism_id INTEGER PRIMARY KEY,
    production_name TEXT NOT NULL UNIQUE,
    species TEXT NOT NULL,
    component_id INTEGER NOT NULL REFERENCES component(component_id) ON DELETE RESTRICT
);

CREATE TABLE IF NOT EXISTS dataset (
    dataset_id INTEGER PRIMARY KEY,
    organism_id INTEGER NOT NULL REFERENCES organism(organism_id) ON DELETE RESTRICT,
    name TEXT NOT NULL,
    release_number INTEGER NOT NULL,
    latest INTEGER NOT NULL DEFAULT 1,
    retired INTEGER,
    no_spliced INTEGER NOT NULL DEFAULT 0,
    loaded_at TEXT NOT NULL,
    UNIQUE (organism_id, name, release_number)
);

CREATE UNIQUE INDEX IF NOT EXISTS dataset_single_latest
    ON dataset (organism_id, name) WHERE latest = 1;

CREATE TABLE IF NOT EXISTS sample (
    sample_id INTEGER PRIMARY KEY,
    dataset_id INTEGER NOT NULL REFERENCES dataset(dataset_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    is_strand_specific INTEGER,
    strand_direction TEXT,
    has_paired_ends INTEGER,
    trim_reads INTEGER,
    trim_polya INTEGER,
    UNIQUE (dataset_id, name)
);

CREATE TABLE IF NOT EXISTS accession (
    accession_id INTEGER PRIMARY KEY,
    sample_id INTEGER NOT NULL REFERENCES sample(sample_id) ON DELETE CASCADE,
    accession TEXT NOT NULL,
    UNIQUE (sample_id, accession)
);
";

pub const TABLES: [&str; 5] = ["component", "organism", "dataset", "sample", "accession"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Organism {
    pub id: i64,
    pub production_name: String,
    pub species: String,
    pub component: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    pub id: i64,
    pub organism_id: i64,
    pub name: String,
    pub release: u32,
    pub latest: bool,
    pub retired: Option<u32>,
    pub no_spliced: bool,
    pub loaded_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub id: i64,
    pub dataset_id: i64,
    pub name: String,
    pub is_strand_specific: Option<bool>,
    pub strand_direction: Option<String>,
    pub has_paired_ends: Option<bool>,
    pub trim_reads: Option<bool>,
    pub trim_poly_a: Option<bool>,
    pub accessions: Vec<String>,
}

/// Values for a dataset row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewDataset<'a> {
    pub organism_id: i64,
    pub name: &'a str,
    pub release: Release,
    pub latest: bool,
    pub retired: Option<u32>,
    pub no_spliced: bool,
}

/// SQLite-backed registry file.
pub struct Store {
    conn: Connection,
    path: Option<Utf8PathBuf>,
}

impl Store {
    /// Open an existing registry.
    pub fn open(path: &Utf8Path) -> Result<Self, RegistryError> {
        if !path.as_std_path().is_file() {
            return Err(RegistryError::NotFound(format!("registry database {path}")));
        }
        let conn = Connection::open(path.as_std_path())?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.configure()?;
        store.create_schema()?;
        Ok(store)
    }

    /// Create a new registry file. An existing file is only replaced with `force`.
    pub fn create(path: &Utf8Path, force: bool) -> Result<Self, RegistryError> {
        if path.as_std_path().exists() {
            if !force {
                return Err(RegistryError::DatabaseExists(path.to_path_buf()));
            }
            fs::remove_file(path.as_std_path())
                .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        }
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path.as_std_path())?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.configure()?;
        store.create_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, RegistryError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.configure()?;
        store.create_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>, RegistryError> {
        Ok(self.conn.transaction()?)
    }

    pub fn create_schema(&self) -> Result<(), RegistryError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn has_table(&self, name: &str) -> Result<bool, RegistryError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn configure(&self) -> Result<(), RegistryError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }
}

pub fn add_component(conn: &Connection, name: &str) -> Result<Component, RegistryError> {
    conn.execute("INSERT INTO component (name) VALUES (?1)", [name])?;
    debug!(component = name, "component added");
    Ok(Component {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
    })
}

pub fn find_component(conn: &Connection, name: &str) -> Result<Option<Component>, RegistryError> {
    Ok(conn
        .query_row(
            "SELECT component_id, name FROM component WHERE name = ?1",
            [name],
            |row| {
                Ok(Component {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?)
}

pub fn get_component(conn: &Connection, name: &str) -> Result<Component, RegistryError> {
    find_component(conn, name)?.ok_or_else(|| RegistryError::UnknownComponent(name.to_string()))
}

pub fn get_or_add_component(conn: &Connection, name: &str) -> Result<Component, RegistryError> {
    match find_component(conn, name)? {
        Some(component) => Ok(component),
        None => add_component(conn, name),
    }
}

pub fn remove_component(conn: &Connection, name: &str) -> Result<(), RegistryError> {
    let removed = conn.execute("DELETE FROM component WHERE name = ?1", [name])?;
    if removed == 0 {
        return Err(RegistryError::UnknownComponent(name.to_string()));
    }
    Ok(())
}

pub fn list_components(conn: &Connection) -> Result<Vec<Component>, RegistryError> {
    let mut stmt = conn.prepare("SELECT component_id, name FROM component ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Component {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const ORGANISM_COLUMNS: &str = "o.organism_id, o.production_name, o.species, c.name
    FROM organism o JOIN component c ON c.component_id = o.component_id";

fn organism_from_row(row: &Row<'_>) -> rusqlite::Result<Organism> {
    Ok(Organism {
        id: row.get(0)?,
        production_name: row.get(1)?,
        species: row.get(2)?,
        component: row.get(3)?,
    })
}

pub fn add_organism(
    conn: &Connection,
    production_name: &str,
    species: &str,
    component: &Component,
) -> Result<Organism, RegistryError> {
    conn.execute(
        "INSERT INTO organism (production_name, species, component_id) VALUES (?1, ?2, ?3)",
        params![production_name, species, component.id],
    )?;
    debug!(
        organism = production_name,
        component = component.name.as_str(),
        "organism added"
    );
    Ok(Organism {
        id: conn.last_insert_rowid(),
        production_name: production_name.to_string(),
        species: species.to_string(),
        component: component.name.clone(),
    })
}

pub fn find_organism(conn: &Connection, name: &str) -> Result<Option<Organism>, RegistryError> {
    let sql = format!("SELECT {ORGANISM_COLUMNS} WHERE o.production_name = ?1");
    Ok(conn.query_row(&sql, [name], organism_from_row).optional()?)
}

pub fn get_organism(conn: &Connection, name: &str) -> Result<Organism, RegistryError> {
    find_organism(conn, name)?.ok_or_else(|| RegistryError::UnknownOrganism(name.to_string()))
}

pub fn remove_organism(conn: &Connection, name: &str) -> Result<(), RegistryError> {
    let removed = conn.execute("DELETE FROM organism WHERE production_name = ?1", [name])?;
    if removed == 0 {
        return Err(RegistryError::UnknownOrganism(name.to_string()));
    }
    Ok(())
}

pub fn list_organisms(
    conn: &Connection,
    component: Option<&str>,
) -> Result<Vec<Organism>, RegistryError> {
    let sql = format!(
        "SELECT {ORGANISM_COLUMNS} WHERE (?1 IS NULL OR c.name = ?1) ORDER BY o.production_name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([component], organism_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) const DATASET_COLUMNS: &str = "d.dataset_id, d.organism_id, d.name, d.release_number, \
    d.latest, d.retired, d.no_spliced, d.loaded_at";

pub(crate) fn dataset_from_row(row: &Row<'_>) -> rusqlite::Result<Dataset> {
    Ok(Dataset {
        id: row.get(0)?,
        organism_id: row.get(1)?,
        name: row.get(2)?,
        release: row.get(3)?,
        latest: row.get(4)?,
        retired: row.get(5)?,
        no_spliced: row.get(6)?,
        loaded_at: row.get(7)?,
    })
}

/// Insert a dataset row together with its samples and accessions.
pub fn insert_dataset(
    conn: &Connection,
    dataset: &NewDataset<'_>,
    runs: &[RunRecord],
) -> Result<i64, RegistryError> {
    conn.execute(
        "INSERT INTO dataset (organism_id, name, release_number, latest, retired, no_spliced, loaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            dataset.organism_id,
            dataset.name,
            dataset.release.get(),
            dataset.latest,
            dataset.retired,
            dataset.no_spliced,
            iso_timestamp(),
        ],
    )?;
    let dataset_id = conn.last_insert_rowid();
    for run in runs {
        insert_sample(conn, dataset_id, run)?;
    }
    debug!(
        dataset = dataset.name,
        release = dataset.release.get(),
        runs = runs.len(),
        "dataset inserted"
    );
    Ok(dataset_id)
}

fn insert_sample(conn: &Connection, dataset_id: i64, run: &RunRecord) -> Result<i64, RegistryError> {
    conn.execute(
        "INSERT INTO sample (dataset_id, name, is_strand_specific, strand_direction,
                             has_paired_ends, trim_reads, trim_polya)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            dataset_id,
            run.name.as_str(),
            run.is_strand_specific,
            run.strand_direction,
            run.has_paired_ends,
            run.trim_reads,
            run.trim_poly_a,
        ],
    )?;
    let sample_id = conn.last_insert_rowid();
    let mut stmt = conn.prepare_cached("INSERT INTO accession (sample_id, accession) VALUES (?1, ?2)")?;
    for accession in &run.accessions {
        stmt.execute(params![sample_id, accession.as_str()])?;
    }
    Ok(sample_id)
}

/// The version of `(organism, name)` currently flagged as latest.
pub fn find_current_dataset(
    conn: &Connection,
    organism_id: i64,
    name: &str,
) -> Result<Option<Dataset>, RegistryError> {
    let sql = format!(
        "SELECT {DATASET_COLUMNS} FROM dataset d
         WHERE d.organism_id = ?1 AND d.name = ?2 AND d.latest = 1"
    );
    Ok(conn
        .query_row(&sql, params![organism_id, name], dataset_from_row)
        .optional()?)
}

pub fn find_dataset(
    conn: &Connection,
    organism_id: i64,
    name: &str,
    release: u32,
) -> Result<Option<Dataset>, RegistryError> {
    let sql = format!(
        "SELECT {DATASET_COLUMNS} FROM dataset d
         WHERE d.organism_id = ?1 AND d.name = ?2 AND d.release_number = ?3"
    );
    Ok(conn
        .query_row(&sql, params![organism_id, name, release], dataset_from_row)
        .optional()?)
}

/// All versions under an organism, optionally restricted to one dataset name.
pub fn datasets_for_organism(
    conn: &Connection,
    organism_id: i64,
    name: Option<&str>,
) -> Result<Vec<Dataset>, RegistryError> {
    let sql = format!(
        "SELECT {DATASET_COLUMNS} FROM dataset d
         WHERE d.organism_id = ?1 AND (?2 IS NULL OR d.name = ?2)
         ORDER BY d.name, d.release_number"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![organism_id, name], dataset_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_latest(conn: &Connection, organism_id: i64, name: &str) -> Result<u32, RegistryError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM dataset WHERE organism_id = ?1 AND name = ?2 AND latest = 1",
        params![organism_id, name],
        |row| row.get(0),
    )?)
}

/// Mark a dataset as superseded at `release`.
pub fn retire_dataset(conn: &Connection, dataset_id: i64, release: Release) -> Result<(), RegistryError> {
    let updated = conn.execute(
        "UPDATE dataset SET latest = 0, retired = ?2 WHERE dataset_id = ?1",
        params![dataset_id, release.get()],
    )?;
    if updated == 0 {
        return Err(RegistryError::NotFound(format!("dataset id {dataset_id}")));
    }
    Ok(())
}

/// Make a dataset the current version again.
pub fn promote_dataset(conn: &Connection, dataset_id: i64) -> Result<(), RegistryError> {
    let updated = conn.execute(
        "UPDATE dataset SET latest = 1, retired = NULL WHERE dataset_id = ?1",
        [dataset_id],
    )?;
    if updated == 0 {
        return Err(RegistryError::NotFound(format!("dataset id {dataset_id}")));
    }
    Ok(())
}

pub fn delete_dataset(conn: &Connection, dataset_id: i64) -> Result<(), RegistryError> {
    conn.execute("DELETE FROM dataset WHERE dataset_id = ?1", [dataset_id])?;
    Ok(())
}

/// Delete every version of `name` under an organism, or only `release`.
pub fn delete_datasets(
    conn: &Connection,
    organism_id: i64,
    name: &str,
    release: Option<u32>,
) -> Result<usize, RegistryError> {
    Ok(conn.execute(
        "DELETE FROM dataset
         WHERE organism_id = ?1 AND name = ?2 AND (?3 IS NULL OR release_number = ?3)",
        params![organism_id, name, release],
    )?)
}

/// Reattach all samples (and so their accessions) of one dataset to another.
pub fn move_samples(conn: &Connection, from_dataset: i64, to_dataset: i64) -> Result<usize, RegistryError> {
    Ok(conn.execute(
        "UPDATE sample SET dataset_id = ?2 WHERE dataset_id = ?1",
        params![from_dataset, to_dataset],
    )?)
}

pub fn samples_for_dataset(conn: &Connection, dataset_id: i64) -> Result<Vec<Sample>, RegistryError> {
    let mut stmt = conn.prepare_cached(
        "SELECT sample_id, dataset_id, name, is_strand_specific, strand_direction,
                has_paired_ends, trim_reads, trim_polya
         FROM sample WHERE dataset_id = ?1 ORDER BY name",
    )?;
    let mut samples = stmt
        .query_map([dataset_id], |row| {
            Ok(Sample {
                id: row.get(0)?,
                dataset_id: row.get(1)?,
                name: row.get(2)?,
                is_strand_specific: row.get(3)?,
                strand_direction: row.get(4)?,
                has_paired_ends: row.get(5)?,
                trim_reads: row.get(6)?,
                trim_poly_a: row.get(7)?,
                accessions: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut acc_stmt =
        conn.prepare_cached("SELECT accession FROM accession WHERE sample_id = ?1 ORDER BY accession")?;
    for sample in &mut samples {
        sample.accessions = acc_stmt
            .query_map([sample.id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
    }
    Ok(samples)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64, RegistryError> {
    if !TABLES.contains(&table) {
        return Err(RegistryError::NotFound(format!("table {table}")));
    }
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
