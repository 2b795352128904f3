//! Structural validation of dataset descriptions.
//!
//! The schema is a static tree of [`ObjectSchema`] values. Validation walks a
//! `serde_json::Value` against it and collects every violation with its JSON
//! path. [`parse_dataset_file`] checks each array element separately so one
//! bad entry does not hold back the rest of a batch.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{ACCESSION_PATTERN, DatasetRecord, RUN_NAME_PATTERN};
use crate::error::RegistryError;

#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    String,
    Pattern(&'static LazyLock<Regex>),
    /// Integer in `1..=u32::MAX`.
    Release,
    Boolean,
    Object(&'static ObjectSchema),
    ArrayOf(&'static FieldType),
}

#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldType,
    pub required: bool,
}

#[derive(Debug)]
pub struct ObjectSchema {
    pub fields: &'static [FieldSpec],
}

impl ObjectSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }
}

const fn required(name: &'static str, kind: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

static ACCESSION_ITEM: FieldType = FieldType::Pattern(&ACCESSION_PATTERN);

static RUN_FIELDS: [FieldSpec; 7] = [
    required("name", FieldType::Pattern(&RUN_NAME_PATTERN)),
    required("accessions", FieldType::ArrayOf(&ACCESSION_ITEM)),
    optional("isStrandSpecific", FieldType::Boolean),
    optional("strandDirection", FieldType::String),
    optional("hasPairedEnds", FieldType::Boolean),
    optional("trim_reads", FieldType::Boolean),
    optional("trim_polyA", FieldType::Boolean),
];

pub static RUN_SCHEMA: ObjectSchema = ObjectSchema {
    fields: &RUN_FIELDS,
};

static RUN_ITEM: FieldType = FieldType::Object(&RUN_SCHEMA);

static DATASET_FIELDS: [FieldSpec; 7] = [
    required("component", FieldType::String),
    required("species", FieldType::String),
    optional("production_name", FieldType::String),
    optional("release", FieldType::Release),
    required("name", FieldType::String),
    optional("no_spliced", FieldType::Boolean),
    required("runs", FieldType::ArrayOf(&RUN_ITEM)),
];

pub static DATASET_SCHEMA: ObjectSchema = ObjectSchema {
    fields: &DATASET_FIELDS,
};

static DATASET_ITEM: FieldType = FieldType::Object(&DATASET_SCHEMA);

/// Top level of a dataset file: an array of dataset objects.
pub static DATASET_FILE: FieldType = FieldType::ArrayOf(&DATASET_ITEM);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub path: String,
    pub constraint: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.constraint)
    }
}

/// Check `value` against the dataset file schema, reporting all violations.
pub fn validate_datasets(value: &Value) -> Result<(), RegistryError> {
    let violations = collect_violations(value, &DATASET_FILE);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::Validation(violations))
    }
}

pub fn collect_violations(value: &Value, kind: &FieldType) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();
    check_value(value, kind, "$", &mut violations);
    violations
}

/// Parse, validate and deserialize a dataset file.
pub fn parse_datasets(content: &str) -> Result<Vec<DatasetRecord>, RegistryError> {
    let value: Value = serde_json::from_str(content)?;
    validate_datasets(&value)?;
    Ok(serde_json::from_value(value)?)
}

/// One element of a dataset file, checked on its own.
#[derive(Debug)]
pub enum FileEntry {
    Valid(DatasetRecord),
    Invalid(InvalidEntry),
}

impl FileEntry {
    pub fn as_result(&self) -> Result<&DatasetRecord, &InvalidEntry> {
        match self {
            FileEntry::Valid(record) => Ok(record),
            FileEntry::Invalid(invalid) => Err(invalid),
        }
    }
}

/// A dataset file element that could not be turned into a [`DatasetRecord`].
#[derive(Debug)]
pub struct InvalidEntry {
    pub organism: String,
    pub dataset: String,
    pub error: RegistryError,
}

/// Parse a dataset file element by element. Only malformed JSON or a
/// non-array top level fail the whole file.
pub fn parse_dataset_file(content: &str) -> Result<Vec<FileEntry>, RegistryError> {
    let value: Value = serde_json::from_str(content)?;
    let Some(items) = value.as_array() else {
        return Err(RegistryError::Validation(vec![violation("$", "expected an array")]));
    };
    Ok(items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_entry(index, item))
        .collect())
}

fn parse_entry(index: usize, item: &Value) -> FileEntry {
    let mut violations = Vec::new();
    check_value(item, &DATASET_ITEM, &format!("$[{index}]"), &mut violations);
    let error = if violations.is_empty() {
        match serde_json::from_value::<DatasetRecord>(item.clone()) {
            Ok(record) => return FileEntry::Valid(record),
            Err(err) => RegistryError::from(err),
        }
    } else {
        RegistryError::Validation(violations)
    };

    let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);
    FileEntry::Invalid(InvalidEntry {
        organism: text("production_name")
            .or_else(|| text("species"))
            .unwrap_or_default(),
        dataset: text("name").unwrap_or_default(),
        error,
    })
}

fn check_value(value: &Value, kind: &FieldType, path: &str, out: &mut Vec<SchemaViolation>) {
    match kind {
        FieldType::String => {
            if !value.is_string() {
                out.push(violation(path, "expected a string"));
            }
        }
        FieldType::Pattern(pattern) => match value.as_str() {
            Some(text) if pattern.is_match(text) => {}
            Some(_) => out.push(violation(
                path,
                &format!("does not match pattern {}", pattern.as_str()),
            )),
            None => out.push(violation(path, "expected a string")),
        },
        FieldType::Release => {
            let valid = value
                .as_u64()
                .is_some_and(|number| number >= 1 && number <= u64::from(u32::MAX));
            if !valid {
                out.push(violation(path, "expected a positive integer"));
            }
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                out.push(violation(path, "expected a boolean"));
            }
        }
        FieldType::ArrayOf(item) => match value.as_array() {
            Some(items) => {
                for (index, entry) in items.iter().enumerate() {
                    check_value(entry, item, &format!("{path}[{index}]"), out);
                }
            }
            None => out.push(violation(path, "expected an array")),
        },
        FieldType::Object(schema) => check_object(value, schema, path, out),
    }
}

fn check_object(value: &Value, schema: &ObjectSchema, path: &str, out: &mut Vec<SchemaViolation>) {
    let Some(map) = value.as_object() else {
        out.push(violation(path, "expected an object"));
        return;
    };

    for spec in schema.fields {
        if spec.required && !map.contains_key(spec.name) {
            out.push(violation(
                path,
                &format!("missing required property '{}'", spec.name),
            ));
        }
    }

    for (key, field_value) in map {
        let field_path = format!("{path}.{key}");
        match schema.field(key) {
            Some(spec) => check_value(field_value, &spec.kind, &field_path, out),
            None => out.push(violation(&field_path, "additional property not allowed")),
        }
    }
}

fn violation(path: &str, constraint: &str) -> SchemaViolation {
    SchemaViolation {
        path: path.to_string(),
        constraint: constraint.to_string(),
    }
}
