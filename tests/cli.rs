use std::path::Path;
use std::process::{Command, Output};

const EXAMPLE: &str = r#"[{"component":"Fungi","species":"sp1","name":"ds1","runs":[{"name":"sample1","accessions":["SRR000001"]}]}]"#;

fn registry(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rnaseq-registry"))
        .args(args)
        .env_remove("BUILD_VERSION")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn duplicate_load_exits_with_partial_load_code() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("registry.db");
    let payload = dir.path().join("datasets.json");
    std::fs::write(&payload, EXAMPLE).unwrap();

    assert!(registry(&["create", arg(&db)]).status.success());
    let added = registry(&["organism", arg(&db), "--add", "sp1", "--component", "Fungi"]);
    assert!(added.status.success());

    let first = registry(&["dataset", arg(&db), "--load", arg(&payload), "--release", "1"]);
    assert_eq!(first.status.code(), Some(0));

    let again = registry(&["dataset", arg(&db), "--load", arg(&payload), "--release", "2"]);
    assert_eq!(again.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&again.stdout).contains("1/1 datasets can not be loaded"));

    let ignored = registry(&[
        "dataset",
        arg(&db),
        "--load",
        arg(&payload),
        "--release",
        "2",
        "--ignore",
    ]);
    assert_eq!(ignored.status.code(), Some(0));
}

#[test]
fn missing_records_map_to_not_found_code() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("registry.db");

    let missing_db = registry(&["component", arg(&db), "--list"]);
    assert_eq!(missing_db.status.code(), Some(2));

    assert!(registry(&["create", arg(&db)]).status.success());
    let unknown = registry(&["organism", arg(&db), "--get", "sp9"]);
    assert_eq!(unknown.status.code(), Some(2));

    let exists = registry(&["create", arg(&db)]);
    assert_eq!(exists.status.code(), Some(1));
}
