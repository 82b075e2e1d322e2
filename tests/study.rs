use std::path::Path;

use assert_matches::assert_matches;
use serde_json::json;

use kira_genomic_study::error::KiraError;
use kira_genomic_study::study::{ParsedStudy, load_study, parse};

const FIXTURE: &str = "tests/fixtures/trio_study.json";

#[test]
fn parse_trio_study() {
    let document = load_study(Path::new(FIXTURE)).unwrap();
    let analyses = parse(&document).unwrap();
    assert_eq!(analyses.len(), 2);

    let first = &analyses[0];
    assert_eq!(first.patient_ref.as_deref(), Some("Patient/denovoChild"));
    assert_eq!(
        first.analysis_id.as_deref(),
        Some("urn:uuid:8d8b1f2a-9a2c-4b26-a7a7-1f1cdd5bbfd5")
    );
    assert_eq!(
        first.analysis_date.as_deref(),
        Some("2021-01-01T01:01:10-06:00")
    );
    assert_eq!(
        first.specimen_refs,
        vec!["Specimen/denovo-1", "Specimen/denovo-2", "Specimen/denovo-3"]
    );
    assert_eq!(first.genomic_build.as_deref(), Some("GRCh38"));
    assert_eq!(
        first.studied_region_refs,
        vec!["DocumentReference/genomicVCFfile_denovo"]
    );
    assert_eq!(
        first.change_type_labels,
        vec![Some("SNV".to_string()), Some("MNV".to_string())]
    );
    // outputs first, the VCF shared with the inputs appears once
    assert_eq!(
        first.file_refs,
        vec![
            "DocumentReference/genomicVCFfile_denovo",
            "DocumentReference/genomicReport_denovo",
            "DocumentReference/genomicBAMfile_child",
        ]
    );

    let second = &analyses[1];
    assert_eq!(second.patient_ref.as_deref(), Some("Patient/denovoChild"));
    assert_eq!(second.analysis_id, None);
    assert_eq!(second.genomic_build.as_deref(), Some("GRCh37"));
    assert_eq!(second.change_type_labels, vec![None::<String>]);
    assert!(second.file_refs.is_empty());
    assert!(second.specimen_refs.is_empty());
}

#[test]
fn parse_is_deterministic() {
    let document = load_study(Path::new(FIXTURE)).unwrap();
    let first = serde_json::to_vec(&parse(&document).unwrap()).unwrap();
    let second = serde_json::to_vec(&parse(&document).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn missing_subject_leaves_patient_absent() {
    let document = json!({
        "resourceType": "GenomicStudy",
        "analysis": [{"identifier": [{"value": "A1"}]}, {"identifier": [{"value": "A2"}]}]
    });
    let analyses = parse(&document).unwrap();
    assert_eq!(analyses.len(), 2);
    assert!(analyses.iter().all(|analysis| analysis.patient_ref.is_none()));
}

#[test]
fn non_string_subject_reference_is_malformed() {
    let document = json!({"subject": {"reference": 42}, "analysis": []});
    let err = parse(&document).unwrap_err();
    assert_matches!(err, KiraError::MalformedInput(_));
}

#[test]
fn non_object_document_is_malformed() {
    assert_matches!(parse(&json!([1, 2])), Err(KiraError::MalformedInput(_)));
    assert_matches!(
        parse(&json!({"analysis": {"identifier": []}})),
        Err(KiraError::MalformedInput(_))
    );
}

#[test]
fn study_without_analyses_yields_empty_list() {
    let analyses = parse(&json!({"subject": {"reference": "Patient/1"}})).unwrap();
    assert!(analyses.is_empty());
}

#[test]
fn empty_references_are_skipped() {
    let document = json!({"analysis": [{
        "specimen": [{"reference": ""}, {"display": "no ref"}, {"reference": "Specimen/s1"}],
        "output": [{"file": {"reference": ""}}, {"file": {}}, {}],
        "input": [{"file": {"reference": "DocumentReference/in"}}]
    }]});
    let analyses = parse(&document).unwrap();
    assert_eq!(analyses[0].specimen_refs, vec!["Specimen/s1"]);
    assert_eq!(analyses[0].file_refs, vec!["DocumentReference/in"]);
}

#[test]
fn load_study_reports_missing_and_invalid_files() {
    let err = load_study(Path::new("tests/fixtures/does_not_exist.json")).unwrap_err();
    assert_matches!(err, KiraError::StudyRead(_));

    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = load_study(&path).unwrap_err();
    assert_matches!(err, KiraError::MalformedInput(_));
}

#[test]
fn api_link_prefixes_relative_file_references() {
    let document = json!({"analysis": [{
        "output": [
            {"file": {"reference": "DocumentReference/D1"}},
            {"file": {"reference": "https://other.org/DocumentReference/D2"}}
        ]
    }]});
    let parsed = ParsedStudy::from_document(&document)
        .unwrap()
        .with_api_link("https://fhir.example.org/r5/");
    assert_eq!(
        parsed.analyses[0].file_refs,
        vec![
            "https://fhir.example.org/r5/DocumentReference/D1",
            "https://other.org/DocumentReference/D2",
        ]
    );
}

#[test]
fn api_link_leaves_contained_references_alone() {
    let document = json!({"analysis": [{
        "output": [
            {"file": {"reference": "#vcf1"}},
            {"file": {"reference": "urn:uuid:1234"}}
        ]
    }]});
    let parsed = ParsedStudy::from_document(&document)
        .unwrap()
        .with_api_link("https://fhir.example.org/r5");
    assert_eq!(
        parsed.analyses[0].file_refs,
        vec!["#vcf1", "https://fhir.example.org/r5/urn:uuid:1234"]
    );
}
