use std::io::{self, Write};

use serde::Serialize;

use crate::query::DatasetEntry;
use crate::registry::{LoadReport, OrganismLoadReport, RemapReport, RemoveResult};
use crate::store::{Component, Organism};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct Output {
    mode: OutputMode,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn print_components(&self, components: &[Component]) -> io::Result<()> {
        self.print(components, || {
            components
                .iter()
                .map(|component| format!("{}\n", component.name))
                .collect()
        })
    }

    pub fn print_organisms(&self, organisms: &[Organism]) -> io::Result<()> {
        self.print(organisms, || format_organisms(organisms))
    }

    pub fn print_organism(&self, organism: &Organism) -> io::Result<()> {
        self.print(organism, || format_organisms(std::slice::from_ref(organism)))
    }

    pub fn print_datasets(&self, entries: &[DatasetEntry]) -> io::Result<()> {
        self.print(entries, || format_datasets(entries))
    }

    pub fn print_dataset(&self, entry: &DatasetEntry) -> io::Result<()> {
        self.print(entry, || format_dataset_detail(entry))
    }

    pub fn print_load(&self, report: &LoadReport) -> io::Result<()> {
        self.print(report, || format_load_report(report))
    }

    pub fn print_organism_load(&self, report: &OrganismLoadReport) -> io::Result<()> {
        self.print(report, || {
            format!(
                "Loaded {} organisms ({} already registered)\n",
                report.added, report.existing
            )
        })
    }

    pub fn print_remap(&self, report: &RemapReport) -> io::Result<()> {
        self.print(report, || {
            format!(
                "Remapped {} samples in {} datasets from {} to {} ({} datasets created)\n",
                report.samples_moved,
                report.datasets_moved,
                report.source,
                report.destination,
                report.datasets_created
            )
        })
    }

    pub fn print_remove(&self, result: &RemoveResult) -> io::Result<()> {
        self.print(result, || {
            format!(
                "Removed {} version(s) of {}/{}\n",
                result.removed, result.organism, result.dataset
            )
        })
    }

    pub fn print_message(&self, message: &str) -> io::Result<()> {
        self.print(&serde_json::json!({ "message": message }), || {
            format!("{message}\n")
        })
    }

    fn print<T: Serialize + ?Sized>(
        &self,
        value: &T,
        text: impl FnOnce() -> String,
    ) -> io::Result<()> {
        let mut stdout = io::stdout();
        match self.mode {
            OutputMode::Json => {
                let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
                stdout.write_all(json.as_bytes())?;
                stdout.write_all(b"\n")
            }
            OutputMode::Text => stdout.write_all(text().as_bytes()),
        }
    }
}

pub fn format_organisms(organisms: &[Organism]) -> String {
    organisms
        .iter()
        .map(|organism| {
            format!(
                "{}\t{}\t{}\n",
                organism.component, organism.production_name, organism.species
            )
        })
        .collect()
}

/// One line per dataset version: component, organism, name, release, state, run count.
pub fn format_datasets(entries: &[DatasetEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let state = match (entry.dataset.latest, entry.dataset.retired) {
                (true, _) => "latest".to_string(),
                (false, Some(release)) => format!("retired in {release}"),
                (false, None) => "retired".to_string(),
            };
            format!(
                "{}\t{}\t{}\trelease {}\t{}\t{} runs\n",
                entry.component,
                entry.organism,
                entry.dataset.name,
                entry.dataset.release,
                state,
                entry.runs.len()
            )
        })
        .collect()
}

pub fn format_dataset_detail(entry: &DatasetEntry) -> String {
    let mut out = format_datasets(std::slice::from_ref(entry));
    out.push_str(&format!("  loaded at {}\n", entry.dataset.loaded_at));
    for run in &entry.runs {
        out.push_str(&format!("  {}\t{}\n", run.name, run.accessions.join(",")));
    }
    out
}

pub fn format_load_report(report: &LoadReport) -> String {
    let mut out = format!(
        "Loaded {} datasets ({} replaced, {} ignored)\n",
        report.loaded, report.replaced, report.ignored
    );
    for failure in &report.failures {
        out.push_str(&format!(
            "  #{} {}/{}: {}\n",
            failure.index, failure.organism, failure.dataset, failure.reason
        ));
    }
    if !report.is_complete() {
        out.push_str(&format!(
            "{}/{} datasets can not be loaded\n",
            report.failed(),
            report.total
        ));
    }
    out
}
