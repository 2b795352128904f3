use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::schema::SchemaViolation;

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("invalid dataset description ({} violation(s)): {}", .0.len(), join_violations(.0))]
    Validation(Vec<SchemaViolation>),

    #[error("organism not registered: {0}")]
    #[diagnostic(help("register it first with `organism <DB> --add NAME --component C`"))]
    UnknownOrganism(String),

    #[error("component not registered: {0}")]
    UnknownComponent(String),

    #[error("organism {organism} belongs to component {expected}, not {found}")]
    ComponentMismatch {
        organism: String,
        expected: String,
        found: String,
    },

    #[error("SKIP {organism}/{dataset}: already in release {release}")]
    #[diagnostic(help("use --replace to retire the current version or --ignore to skip it"))]
    DuplicateDataset {
        organism: String,
        dataset: String,
        release: u32,
    },

    #[error("REPLACE {organism}/{dataset}: release {release} is not newer than current release {current}")]
    StaleRelease {
        organism: String,
        dataset: String,
        release: u32,
        current: u32,
    },

    #[error("{failed}/{total} datasets can not be loaded")]
    PartialLoad { failed: usize, total: usize },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to parse JSON: {0}")]
    Json(String),

    #[error("no release given for dataset {0} (use --release or BUILD_VERSION)")]
    MissingRelease(String),

    #[error("invalid release number: {0}")]
    InvalidRelease(String),

    #[error("invalid SRA accession: {0}")]
    InvalidAccession(String),

    #[error("invalid run name: {0}")]
    InvalidRunName(String),

    #[error("invalid remap pair (expected OLD,NEW): {0}")]
    InvalidRemap(String),

    #[error("invalid organism table line {line}: {message}")]
    InvalidOrganismTable { line: usize, message: String },

    #[error("database already exists: {0}")]
    #[diagnostic(help("pass --force to recreate it from scratch"))]
    DatabaseExists(Utf8PathBuf),
}

impl RegistryError {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            RegistryError::NotFound(_)
            | RegistryError::UnknownOrganism(_)
            | RegistryError::UnknownComponent(_) => 2,
            RegistryError::Validation(_)
            | RegistryError::Json(_)
            | RegistryError::InvalidOrganismTable { .. }
            | RegistryError::InvalidRelease(_)
            | RegistryError::MissingRelease(_)
            | RegistryError::InvalidAccession(_)
            | RegistryError::InvalidRunName(_)
            | RegistryError::InvalidRemap(_) => 3,
            RegistryError::PartialLoad { .. } => 4,
            _ => 1,
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RegistryError::ConstraintViolation(
                    message.unwrap_or_else(|| failure.to_string()),
                )
            }
            other => RegistryError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Json(err.to_string())
    }
}

fn join_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn sqlite_constraint_failures_map_to_constraint_violation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: RegistryError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert_matches!(err, RegistryError::ConstraintViolation(_));
    }

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(RegistryError::NotFound("ds1".to_string()).exit_code(), 2);
        assert_eq!(RegistryError::UnknownOrganism("sp1".to_string()).exit_code(), 2);
        assert_eq!(RegistryError::UnknownComponent("Fungi".to_string()).exit_code(), 2);
        assert_eq!(RegistryError::Validation(Vec::new()).exit_code(), 3);
        assert_eq!(RegistryError::Json("eof".to_string()).exit_code(), 3);
        assert_eq!(RegistryError::MissingRelease("ds1".to_string()).exit_code(), 3);
        assert_eq!(RegistryError::InvalidRemap("sp1".to_string()).exit_code(), 3);
        assert_eq!(
            RegistryError::InvalidOrganismTable {
                line: 2,
                message: "bad".to_string()
            }
            .exit_code(),
            3
        );
        assert_eq!(RegistryError::PartialLoad { failed: 1, total: 1 }.exit_code(), 4);
        assert_eq!(RegistryError::Database("locked".to_string()).exit_code(), 1);
        assert_eq!(
            RegistryError::ConstraintViolation("UNIQUE".to_string()).exit_code(),
            1
        );
    }

    #[test]
    fn duplicate_message_reads_as_skip() {
        let err = RegistryError::DuplicateDataset {
            organism: "sp1".to_string(),
            dataset: "ds1".to_string(),
            release: 3,
        };
        assert_eq!(err.to_string(), "SKIP sp1/ds1: already in release 3");
    }
}
