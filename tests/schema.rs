use assert_matches::assert_matches;
use serde_json::json;

use rnaseq_registry::error::RegistryError;
use rnaseq_registry::schema::{
    DATASET_FILE, FileEntry, collect_violations, parse_dataset_file, parse_datasets,
    validate_datasets,
};

fn violations_of(value: serde_json::Value) -> Vec<(String, String)> {
    collect_violations(&value, &DATASET_FILE)
        .into_iter()
        .map(|violation| (violation.path, violation.constraint))
        .collect()
}

#[test]
fn example_payload_parses() {
    let records = parse_datasets(
        r#"[{"component":"Fungi","species":"sp1","name":"ds1",
             "runs":[{"name":"sample1","accessions":["SRR000001"]}]}]"#,
    )
    .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].organism_key(), "sp1");
    assert_eq!(records[0].runs[0].accessions[0].as_str(), "SRR000001");
    assert_eq!(records[0].release, None);
}

#[test]
fn missing_required_properties_are_reported() {
    let violations = violations_of(json!([{"component": "Fungi", "name": "ds1"}]));

    assert_eq!(violations.len(), 2);
    assert!(violations.contains(&(
        "$[0]".to_string(),
        "missing required property 'species'".to_string()
    )));
    assert!(violations.contains(&(
        "$[0]".to_string(),
        "missing required property 'runs'".to_string()
    )));
}

#[test]
fn nested_additional_property_is_rejected() {
    let violations = violations_of(json!([{
        "component": "Fungi",
        "species": "sp1",
        "name": "ds1",
        "runs": [{"name": "s1", "accessions": ["SRR1"], "reads": 10}]
    }]));

    assert_eq!(
        violations,
        vec![(
            "$[0].runs[0].reads".to_string(),
            "additional property not allowed".to_string()
        )]
    );
}

#[test]
fn accession_pattern_is_enforced() {
    let violations = violations_of(json!([{
        "component": "Fungi",
        "species": "sp1",
        "name": "ds1",
        "runs": [{"name": "s1", "accessions": ["SRR1", "GSM42"]}]
    }]));

    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].0, "$[0].runs[0].accessions[1]");
    assert!(violations[0].1.starts_with("does not match pattern"));
}

#[test]
fn wrong_types_are_reported() {
    let violations = violations_of(json!([{
        "component": "Fungi",
        "species": "sp1",
        "name": "ds1",
        "release": 0,
        "no_spliced": "yes",
        "runs": {"name": "s1"}
    }]));

    let paths = violations.iter().map(|(path, _)| path.as_str()).collect::<Vec<_>>();
    assert_eq!(violations.len(), 3);
    assert!(paths.contains(&"$[0].release"));
    assert!(paths.contains(&"$[0].no_spliced"));
    assert!(paths.contains(&"$[0].runs"));
}

#[test]
fn every_violation_is_collected() {
    let value = json!([
        {"component": "Fungi", "species": "sp1", "name": "ds1", "runs": []},
        {"component": 3, "species": "sp1", "name": "ds2", "runs": [{"name": "bad name!", "accessions": []}]}
    ]);

    let err = validate_datasets(&value).unwrap_err();
    assert_matches!(err, RegistryError::Validation(ref found) if found.len() == 2);
    assert!(err.to_string().contains("2 violation(s)"));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let err = parse_datasets("[{").unwrap_err();
    assert_matches!(err, RegistryError::Json(_));
}

#[test]
fn invalid_payload_is_not_deserialized() {
    let err = parse_datasets(r#"[{"component":"Fungi"}]"#).unwrap_err();
    assert_matches!(err, RegistryError::Validation(_));
}

#[test]
fn dataset_file_entries_are_checked_separately() {
    let entries = parse_dataset_file(
        r#"[
          {"component":"Fungi","species":"sp1","name":"ds1","runs":[]},
          {"component":"Fungi","species":"Species two","production_name":"sp2","name":"ds2","runs":[],"extra":1},
          "not an object"
        ]"#,
    )
    .unwrap();

    assert_eq!(entries.len(), 3);
    assert_matches!(&entries[0], FileEntry::Valid(record) if record.name == "ds1");
    let FileEntry::Invalid(invalid) = &entries[1] else {
        panic!("second entry should be invalid");
    };
    assert_eq!(invalid.organism, "sp2");
    assert_eq!(invalid.dataset, "ds2");
    assert!(invalid.error.to_string().contains("$[1].extra"));
    assert_matches!(&entries[2], FileEntry::Invalid(invalid) if invalid.dataset.is_empty());
}

#[test]
fn dataset_file_top_level_must_be_an_array() {
    assert_matches!(
        parse_dataset_file(r#"{"name":"ds1"}"#).unwrap_err(),
        RegistryError::Validation(_)
    );
    assert_matches!(parse_dataset_file("[").unwrap_err(), RegistryError::Json(_));
}
