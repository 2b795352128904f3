//! Versioning and import engine.
//!
//! Every public mutation runs inside one SQLite transaction. Batch loads give
//! each entry its own savepoint so a failing entry is rolled back alone while
//! the rest of the batch is kept.

use std::collections::BTreeSet;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::OrganismEntry;
use crate::domain::{DatasetRecord, LoadPolicy, Release, RemapPair};
use crate::error::RegistryError;
use crate::query::{self, DatasetEntry, DatasetFilter};
use crate::schema::{FileEntry, InvalidEntry};
use crate::store::{self, Component, NewDataset, Organism, Store};

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub policy: LoadPolicy,
    /// Release applied to every entry; entries without it fall back to their own `release`.
    pub release: Option<Release>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum LoadOutcome {
    Inserted { release: u32 },
    Replaced { release: u32, previous_release: u32 },
    Ignored { current_release: u32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub index: usize,
    pub organism: String,
    pub dataset: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub total: usize,
    pub loaded: usize,
    pub replaced: usize,
    pub ignored: usize,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganismLoadReport {
    pub added: usize,
    pub existing: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResult {
    pub organism: String,
    pub dataset: String,
    pub release: Option<u32>,
    pub removed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RemapReport {
    pub source: String,
    pub destination: String,
    pub datasets_moved: usize,
    pub datasets_created: usize,
    pub samples_moved: usize,
}

pub struct Registry {
    store: Store,
}

impl Registry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn add_component(&mut self, name: &str) -> Result<Component, RegistryError> {
        let tx = self.store.transaction()?;
        let component = store::add_component(&tx, name)?;
        tx.commit()?;
        info!(component = name, "component added");
        Ok(component)
    }

    pub fn get_component(&self, name: &str) -> Result<Component, RegistryError> {
        store::get_component(self.store.connection(), name)
    }

    pub fn remove_component(&mut self, name: &str) -> Result<(), RegistryError> {
        let tx = self.store.transaction()?;
        store::remove_component(&tx, name)?;
        tx.commit()?;
        info!(component = name, "component removed");
        Ok(())
    }

    pub fn list_components(&self) -> Result<Vec<Component>, RegistryError> {
        store::list_components(self.store.connection())
    }

    /// Register an organism, creating its component when needed.
    pub fn add_organism(
        &mut self,
        production_name: &str,
        component: &str,
        species: Option<&str>,
    ) -> Result<Organism, RegistryError> {
        let tx = self.store.transaction()?;
        let component = store::get_or_add_component(&tx, component)?;
        let organism = store::add_organism(
            &tx,
            production_name,
            species.unwrap_or(production_name),
            &component,
        )?;
        tx.commit()?;
        info!(
            organism = production_name,
            component = component.name.as_str(),
            "organism added"
        );
        Ok(organism)
    }

    pub fn get_organism(&self, name: &str) -> Result<Organism, RegistryError> {
        store::get_organism(self.store.connection(), name)
    }

    pub fn remove_organism(&mut self, name: &str) -> Result<(), RegistryError> {
        let tx = self.store.transaction()?;
        store::remove_organism(&tx, name)?;
        tx.commit()?;
        info!(organism = name, "organism removed");
        Ok(())
    }

    pub fn list_organisms(&self, component: Option<&str>) -> Result<Vec<Organism>, RegistryError> {
        store::list_organisms(self.store.connection(), component)
    }

    /// Register organisms from a parsed tab file. Already known organisms are
    /// left alone as long as their component agrees.
    pub fn load_organisms(
        &mut self,
        entries: &[OrganismEntry],
    ) -> Result<OrganismLoadReport, RegistryError> {
        let tx = self.store.transaction()?;
        let mut report = OrganismLoadReport::default();
        for entry in entries {
            if let Some(existing) = store::find_organism(&tx, &entry.production_name)? {
                if existing.component != entry.component {
                    return Err(RegistryError::ComponentMismatch {
                        organism: existing.production_name,
                        expected: existing.component,
                        found: entry.component.clone(),
                    });
                }
                report.existing += 1;
                continue;
            }
            let component = store::get_or_add_component(&tx, &entry.component)?;
            store::add_organism(&tx, &entry.production_name, &entry.production_name, &component)?;
            report.added += 1;
        }
        tx.commit()?;
        info!(
            added = report.added,
            existing = report.existing,
            "organisms loaded"
        );
        Ok(report)
    }

    /// Load a batch of datasets. Entries are independent: a failing entry is
    /// rolled back and tallied in the report, the others are committed.
    pub fn load_datasets(
        &mut self,
        records: &[DatasetRecord],
        options: LoadOptions,
    ) -> Result<LoadReport, RegistryError> {
        self.load_entries(records.iter().map(Ok), options)
    }

    /// Load the elements of a parsed dataset file. Elements that failed
    /// validation are reported as failures at their position.
    pub fn load_file_entries(
        &mut self,
        entries: &[FileEntry],
        options: LoadOptions,
    ) -> Result<LoadReport, RegistryError> {
        self.load_entries(entries.iter().map(FileEntry::as_result), options)
    }

    fn load_entries<'a, I>(&mut self, entries: I, options: LoadOptions) -> Result<LoadReport, RegistryError>
    where
        I: ExactSizeIterator<Item = Result<&'a DatasetRecord, &'a InvalidEntry>>,
    {
        let mut report = LoadReport {
            total: entries.len(),
            ..LoadReport::default()
        };
        let mut tx = self.store.transaction()?;

        for (index, entry) in entries.enumerate() {
            let record = match entry {
                Ok(record) => record,
                Err(invalid) => {
                    warn!("{}", invalid.error);
                    report.failures.push(LoadFailure {
                        index,
                        organism: invalid.organism.clone(),
                        dataset: invalid.dataset.clone(),
                        reason: invalid.error.to_string(),
                    });
                    continue;
                }
            };
            let savepoint = tx.savepoint()?;
            match load_dataset(&savepoint, record, options) {
                Ok(outcome) => {
                    savepoint.commit()?;
                    match outcome {
                        LoadOutcome::Inserted { release } => {
                            report.loaded += 1;
                            info!(
                                organism = record.organism_key(),
                                dataset = record.name.as_str(),
                                release,
                                "dataset loaded"
                            );
                        }
                        LoadOutcome::Replaced {
                            release,
                            previous_release,
                        } => {
                            report.loaded += 1;
                            report.replaced += 1;
                            info!(
                                organism = record.organism_key(),
                                dataset = record.name.as_str(),
                                release,
                                previous_release,
                                "dataset replaced"
                            );
                        }
                        LoadOutcome::Ignored { current_release } => {
                            report.ignored += 1;
                            debug!(
                                organism = record.organism_key(),
                                dataset = record.name.as_str(),
                                current_release,
                                "dataset ignored"
                            );
                        }
                    }
                }
                Err(err) => {
                    drop(savepoint);
                    warn!("{err}");
                    report.failures.push(LoadFailure {
                        index,
                        organism: record.organism_key().to_string(),
                        dataset: record.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        tx.commit()?;
        if !report.is_complete() {
            warn!(
                "{}/{} datasets can not be loaded",
                report.failed(),
                report.total
            );
        }
        Ok(report)
    }

    /// Delete every version of a dataset under an organism, or only one release.
    pub fn remove_dataset(
        &mut self,
        organism: &str,
        dataset: &str,
        release: Option<Release>,
    ) -> Result<RemoveResult, RegistryError> {
        let tx = self.store.transaction()?;
        let owner = store::get_organism(&tx, organism)?;
        let release = release.map(Release::get);
        let removed = store::delete_datasets(&tx, owner.id, dataset, release)?;
        if removed == 0 {
            let version = release.map(|r| format!(" release {r}")).unwrap_or_default();
            return Err(RegistryError::NotFound(format!(
                "dataset {dataset}{version} for organism {organism}"
            )));
        }
        tx.commit()?;
        info!(organism, dataset, removed, "dataset removed");
        Ok(RemoveResult {
            organism: organism.to_string(),
            dataset: dataset.to_string(),
            release,
            removed,
        })
    }

    /// Move the runs of `pair.source` (optionally one dataset only) under
    /// `pair.destination`. Both organisms must already be registered.
    pub fn remap(
        &mut self,
        pair: &RemapPair,
        dataset: Option<&str>,
    ) -> Result<RemapReport, RegistryError> {
        let tx = self.store.transaction()?;
        let source = store::get_organism(&tx, &pair.source)?;
        let destination = store::get_organism(&tx, &pair.destination)?;
        if source.id == destination.id {
            return Err(RegistryError::InvalidRemap(format!(
                "{},{}",
                pair.source, pair.destination
            )));
        }

        let datasets = store::datasets_for_organism(&tx, source.id, dataset)?;
        if let (Some(name), true) = (dataset, datasets.is_empty()) {
            return Err(RegistryError::NotFound(format!(
                "dataset {name} for organism {}",
                source.production_name
            )));
        }

        let mut report = RemapReport {
            source: source.production_name.clone(),
            destination: destination.production_name.clone(),
            ..RemapReport::default()
        };
        let mut touched = BTreeSet::new();
        for moved in &datasets {
            let target = match store::find_dataset(&tx, destination.id, &moved.name, moved.release)? {
                Some(existing) => {
                    // A current source version keeps the merged row current.
                    if moved.latest && !existing.latest {
                        ensure_no_current(&tx, &destination, &moved.name)?;
                        store::promote_dataset(&tx, existing.id)?;
                    }
                    existing.id
                }
                None => {
                    if moved.latest {
                        ensure_no_current(&tx, &destination, &moved.name)?;
                    }
                    report.datasets_created += 1;
                    store::insert_dataset(
                        &tx,
                        &NewDataset {
                            organism_id: destination.id,
                            name: &moved.name,
                            release: Release::new(moved.release)?,
                            latest: moved.latest,
                            retired: moved.retired,
                            no_spliced: moved.no_spliced,
                        },
                        &[],
                    )?
                }
            };
            report.samples_moved += store::move_samples(&tx, moved.id, target)?;
            store::delete_dataset(&tx, moved.id)?;
            report.datasets_moved += 1;
            touched.insert(moved.name.clone());
        }

        for name in &touched {
            ensure_single_latest(&tx, &destination, name)?;
        }
        tx.commit()?;
        info!(
            source = report.source.as_str(),
            destination = report.destination.as_str(),
            datasets = report.datasets_moved,
            samples = report.samples_moved,
            "runs remapped"
        );
        Ok(report)
    }

    pub fn list_datasets(&self, filter: &DatasetFilter) -> Result<Vec<DatasetEntry>, RegistryError> {
        query::list_datasets(self.store.connection(), filter)
    }

    pub fn get_dataset(
        &self,
        organism: &str,
        dataset: &str,
        release: Option<u32>,
    ) -> Result<DatasetEntry, RegistryError> {
        query::get_dataset(self.store.connection(), organism, dataset, release)
    }

    pub fn dump_datasets(&self, filter: &DatasetFilter) -> Result<Vec<DatasetRecord>, RegistryError> {
        let entries = self.list_datasets(filter)?;
        entries.iter().map(query::to_record).collect()
    }
}

/// Apply one dataset payload according to the versioning rules.
fn load_dataset(
    conn: &Connection,
    record: &DatasetRecord,
    options: LoadOptions,
) -> Result<LoadOutcome, RegistryError> {
    let organism = store::get_organism(conn, record.organism_key())?;
    if organism.component != record.component {
        return Err(RegistryError::ComponentMismatch {
            organism: organism.production_name,
            expected: organism.component,
            found: record.component.clone(),
        });
    }

    let release = match (options.release, record.release) {
        (Some(release), _) => release,
        (None, Some(value)) => Release::new(value)?,
        (None, None) => return Err(RegistryError::MissingRelease(record.name.clone())),
    };

    let current = store::find_current_dataset(conn, organism.id, &record.name)?;
    let outcome = match (current, options.policy) {
        (None, _) => LoadOutcome::Inserted {
            release: release.get(),
        },
        (Some(current), LoadPolicy::Skip) => {
            return Err(RegistryError::DuplicateDataset {
                organism: organism.production_name,
                dataset: record.name.clone(),
                release: current.release,
            });
        }
        (Some(current), LoadPolicy::Ignore) => {
            return Ok(LoadOutcome::Ignored {
                current_release: current.release,
            });
        }
        (Some(current), LoadPolicy::Replace) => {
            if release.get() <= current.release {
                return Err(RegistryError::StaleRelease {
                    organism: organism.production_name,
                    dataset: record.name.clone(),
                    release: release.get(),
                    current: current.release,
                });
            }
            store::retire_dataset(conn, current.id, release)?;
            LoadOutcome::Replaced {
                release: release.get(),
                previous_release: current.release,
            }
        }
    };

    store::insert_dataset(
        conn,
        &NewDataset {
            organism_id: organism.id,
            name: &record.name,
            release,
            latest: true,
            retired: None,
            no_spliced: record.no_spliced.unwrap_or(false),
        },
        &record.runs,
    )?;
    ensure_single_latest(conn, &organism, &record.name)?;
    Ok(outcome)
}

fn ensure_no_current(
    conn: &Connection,
    organism: &Organism,
    name: &str,
) -> Result<(), RegistryError> {
    match store::find_current_dataset(conn, organism.id, name)? {
        Some(current) => Err(RegistryError::DuplicateDataset {
            organism: organism.production_name.clone(),
            dataset: name.to_string(),
            release: current.release,
        }),
        None => Ok(()),
    }
}

fn ensure_single_latest(
    conn: &Connection,
    organism: &Organism,
    name: &str,
) -> Result<(), RegistryError> {
    let latest = store::count_latest(conn, organism.id, name)?;
    if latest > 1 {
        return Err(RegistryError::ConstraintViolation(format!(
            "{latest} latest versions of {}/{name}",
            organism.production_name
        )));
    }
    Ok(())
}
