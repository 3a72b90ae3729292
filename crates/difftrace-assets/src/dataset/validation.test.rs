#![cfg(test)]

use serde_json::json;

use super::*;
use crate::dataset::source::LocalFileSet;

fn metadata_document() -> Value {
    json!({
        "schema_version": "1.0",
        "prompt": { "text": "a red fox", "tokens": ["<s>", "a", "red", "fox"], "token_ids": [0, 1, 2, 3] },
        "steps": 2,
        "timesteps": [999.0, 500.0],
        "images": ["images/step_000.png", "images/step_001.png"],
        "layers": [{ "id": "mid", "attention_type": "cross" }],
        "attention_files": [
            { "attention_type": "cross", "layer_id": "mid", "step": 0, "path": "attention/cross/layer_mid_step_0.bin", "shape": [4, 2, 2], "dtype": "float16" },
            { "attention_type": "self", "layer_id": "mid", "step": 0, "path": "attention/self/layer_mid_step_0.bin", "shape": [4, 4] }
        ],
        "generator": { "model": "tiny" },
        "artifacts": {}
    })
}

fn entry_error(doc: &Value) -> (usize, String) {
    match check_metadata_document(doc) {
        Err(LoadError::InvalidAttentionEntry { index, reason }) => (index, reason),
        other => panic!("expected invalid attention entry, got {other:?}"),
    }
}

#[test]
fn well_formed_metadata_passes() {
    check_metadata_document(&metadata_document()).unwrap();
}

#[test]
fn every_required_key_is_enforced() {
    for key in REQUIRED_METADATA_KEYS {
        let mut doc = metadata_document();
        doc.as_object_mut().unwrap().remove(key);
        match check_metadata_document(&doc) {
            Err(LoadError::MissingKey(missing)) => assert_eq!(missing, key),
            other => panic!("removing {key} gave {other:?}"),
        }
    }
}

#[test]
fn steps_must_be_positive_integer() {
    for steps in [json!(0), json!(-3), json!(2.5), json!("24"), Value::Null] {
        let mut doc = metadata_document();
        doc["steps"] = steps.clone();
        assert!(
            matches!(check_metadata_document(&doc), Err(LoadError::InvalidSteps)),
            "steps = {steps} should be rejected"
        );
    }
}

#[test]
fn attention_entries_are_validated() {
    let mut doc = metadata_document();
    doc["attention_files"][1]["attention_type"] = json!("spatial");
    let (index, reason) = entry_error(&doc);
    assert_eq!(index, 1);
    assert!(reason.contains("attention_type"), "{reason}");

    let mut doc = metadata_document();
    doc["attention_files"][0]["shape"] = json!([4, 0, 2]);
    assert_eq!(entry_error(&doc).1, "has non-positive shape dimensions");

    let mut doc = metadata_document();
    doc["attention_files"][0]["path"] = json!("");
    assert_eq!(entry_error(&doc).1, "has invalid path");

    let mut doc = metadata_document();
    doc["attention_files"][0]["shape"] = json!([2, 2]);
    assert!(entry_error(&doc).1.contains("must have 3 dimensions"));
}

#[test]
fn length_drift_is_only_a_warning() {
    let metadata: DatasetMetadata = serde_json::from_value(metadata_document()).unwrap();
    let metrics = Metrics {
        latent_l2_norm: vec![Some(1.0)],
        ..Metrics::default()
    };
    let pca = LatentPca {
        points: vec![vec![Some(0.0), Some(1.0)]; 2],
        explained_variance_ratio: vec![Some(0.7)],
    };

    let warnings = collect_warnings(&metadata, &metrics, &pca, Some(LARGE_DATASET_BYTES + 1));
    assert_eq!(warnings.len(), 3, "{warnings:?}");
    assert!(warnings[0].starts_with("metrics.latent_l2_norm length mismatch"));
    assert!(warnings[1].contains("explained_variance_ratio"));
    assert!(warnings[2].contains(">200MB"));
}

#[test]
fn asset_check_reports_missing_and_short_files() {
    let metadata: DatasetMetadata = serde_json::from_value(metadata_document()).unwrap();
    let files = LocalFileSet::new("picked").with_file("run/attention/cross/layer_mid_step_0.bin", vec![0u8; 30]);

    let issues = check_attention_assets(&files, &metadata.attention_files);
    assert_eq!(issues.len(), 2);
    assert_eq!(
        issues[0].kind,
        AssetIssueKind::SizeMismatch {
            expected: 32,
            actual: 30
        }
    );
    assert_eq!(issues[1].kind, AssetIssueKind::Missing);
    assert_eq!(issues[1].to_string(), "missing attention file: attention/self/layer_mid_step_0.bin");
}
