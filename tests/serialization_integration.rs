//! Analysis files: save/load round trips and legacy document conversion

mod common;

use common::builders::AnalysisBuilder;
use mockall::mock;
use mockall::predicate::*;
use serde_json::json;
use tempfile::tempdir;
use vme_analysis::config::{AnalysisFile, VmeConfigLookup};
use vme_analysis::error::AnalysisError;
use vme_analysis::pipeline::nodes::Interval;
use vme_analysis::pipeline::{Analysis, ObjectId};
use vme_analysis::serialize::{MigrationError, SchemaError, CURRENT_VERSION};

mock! {
    pub Vme {}

    impl VmeConfigLookup for Vme {
        fn event_index(&self, event_id: &ObjectId) -> Option<usize>;
        fn module_index(&self, module_id: &ObjectId) -> Option<(usize, usize)>;
        fn event_id(&self, event_index: usize) -> Option<ObjectId>;
        fn module_id(&self, event_index: usize, module_index: usize) -> Option<ObjectId>;
        fn module_name(&self, module_id: &ObjectId) -> Option<String>;
        fn event_count(&self) -> usize;
    }
}

fn legacy_document() -> serde_json::Value {
    json!({
        "sources": [{
            "id": "{6f1c0a4e-2f55-4c1b-9d7e-0b8d0f3f6a10}",
            "name": "amplitude",
            "eventIndex": 0,
            "moduleIndex": 0,
            "class": "Extractor",
            "data": { "subFilters": [{ "template": "AAAADDDD" }], "addRandom": false }
        }],
        "operators": [{
            "id": "{0d3b6e52-8a8b-4c57-a1c2-5d0f1f4b7c21}",
            "name": "amplitude_raw",
            "eventIndex": 0,
            "class": "Histo1DSink",
            "userLevel": 0,
            "data": { "bins": 16 }
        }],
        "connections": [{
            "srcId": "{6f1c0a4e-2f55-4c1b-9d7e-0b8d0f3f6a10}",
            "srcIndex": 0,
            "dstId": "{0d3b6e52-8a8b-4c57-a1c2-5d0f1f4b7c21}",
            "dstIndex": 0
        }]
    })
}

#[test]
fn test_legacy_document_is_converted() {
    let event = ObjectId::new();
    let module = ObjectId::new();

    let mut vme = MockVme::new();
    vme.expect_event_id()
        .with(eq(0))
        .return_const(Some(event));
    vme.expect_module_id()
        .with(eq(0), eq(0))
        .return_const(Some(module));
    vme.expect_module_name()
        .returning(|_| Some("mdpp16".to_string()));

    let (analysis, report) = Analysis::from_json(legacy_document(), Some(&vme)).unwrap();

    assert_eq!(report.original_version, 1);
    assert!(report.was_migrated());
    assert!(report.is_clean(), "{:?}", report.diagnostics);
    assert_eq!(analysis.node_count(), 2);
    assert_eq!(analysis.pipe_count(), 1);

    let source = analysis
        .nodes()
        .find(|(_, n)| n.kind.is_source())
        .map(|(_, n)| n)
        .unwrap();
    assert_eq!(source.meta.event_id, event);
    assert_eq!(source.meta.module_id, Some(module));

    // Raw histograms get grouped by module.
    assert_eq!(analysis.directories().len(), 1);
    assert_eq!(analysis.directories()[0].name, "mdpp16");
    assert_eq!(analysis.directories()[0].members.len(), 1);

    let json = analysis.to_json().unwrap();
    assert_eq!(json["MVMEAnalysisVersion"], json!(CURRENT_VERSION));
    assert_eq!(json["conditionLinks"], json!([]));
}

#[test]
fn test_legacy_document_with_unknown_module_fails() {
    let mut vme = MockVme::new();
    vme.expect_event_id().return_const(Some(ObjectId::new()));
    vme.expect_module_id().return_const(None::<ObjectId>);

    match Analysis::from_json(legacy_document(), Some(&vme)) {
        Err(AnalysisError::Migration(MigrationError::UnresolvedLegacyIndex { failures })) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("amplitude"));
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_newer_document_is_rejected() {
    let mut doc = legacy_document();
    doc["MVMEAnalysisVersion"] = json!(CURRENT_VERSION + 1);
    let result = Analysis::from_json(doc, None);
    assert!(matches!(
        result,
        Err(AnalysisError::Schema(SchemaError::VersionTooNew { .. }))
    ));
}

#[test]
fn test_analysis_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.analysis");

    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    let calib = b.calibration("amplitude_cal", src, 0.0, 100.0);
    let cond = b.interval_condition("window", src, vec![Interval::new(2.0, 9.0); 16]);
    let sink = b.histo1d("amplitude_cal_h1", calib, 64);
    b.analysis.set_condition_link(sink, cond, 4).unwrap();
    let expected = b.analysis.to_json().unwrap();

    AnalysisFile::new(b.analysis).save(&path).unwrap();
    let loaded = AnalysisFile::load(&path, Some(&b.vme)).unwrap();

    assert!(loaded.report.is_clean(), "{:?}", loaded.report.diagnostics);
    assert!(!loaded.report.was_migrated());
    assert_eq!(loaded.analysis.to_json().unwrap(), expected);
    assert_eq!(loaded.analysis.condition_links().count(), 1);
}

#[test]
fn test_bare_document_file_loads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bare.analysis");

    let mut b = AnalysisBuilder::new();
    let src = b.extractor("amplitude", "AAAADDDD");
    b.histo1d("amplitude_raw", src, 16);
    let json = b.analysis.to_json().unwrap();
    std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

    let loaded = AnalysisFile::load(&path, None).unwrap();
    assert_eq!(loaded.analysis.node_count(), 2);
    assert_eq!(loaded.analysis.pipe_count(), 1);
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.analysis");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        AnalysisFile::load(&path, None),
        Err(AnalysisError::Config(_))
    ));
}
