mod common;

use std::{fs, path::Path, sync::Arc};

use common::{STEPS, encode_f16, latent_pca_json, load_counting, local_files, metadata_json, metrics_text};
use difftrace_assets::{
    AssetError, AssetIssueKind, DatasetLoader, LoadError, LocalFileSet, ParseError, TransportError
};
use serde_json::{Value, json};

fn files_with_metadata(metadata: &Value) -> LocalFileSet {
    local_files().with_file("run_lighthouse/metadata.json", metadata.to_string().into_bytes())
}

fn load_err(files: LocalFileSet) -> AssetError {
    DatasetLoader::default().load(Arc::new(files)).unwrap_err()
}

fn write_dataset(dir: &Path) {
    fs::create_dir_all(dir.join("attention/cross")).unwrap();
    fs::create_dir_all(dir.join("attention/self")).unwrap();
    fs::create_dir_all(dir.join("images")).unwrap();
    fs::write(dir.join("metadata.json"), metadata_json().to_string()).unwrap();
    fs::write(dir.join("metrics.json"), metrics_text()).unwrap();
    fs::write(dir.join("latent_pca.json"), latent_pca_json().to_string()).unwrap();
    fs::write(dir.join("attention/cross/layer_mid_step_5.bin"), encode_f16(&common::cross_values())).unwrap();
    // Truncated: the declared shape needs 128 bytes.
    fs::write(dir.join("attention/self/layer_mid_step_5.bin"), vec![0u8; 100]).unwrap();
}

#[test]
fn non_finite_metrics_become_gaps() {
    let (dataset, _handler) = load_counting(local_files());
    assert!(dataset.warnings().is_empty(), "{:?}", dataset.warnings());

    let metrics = dataset.metrics();
    assert_eq!(metrics.latent_l2_norm.len(), STEPS);
    assert_eq!(metrics.latent_l2_norm[2], Some(1.5));
    assert_eq!(metrics.latent_l2_norm[3], None);
    assert_eq!(metrics.latent_l2_norm[4], None);
    assert_eq!(metrics.attention_kl_divergence, vec![None]);
    assert_eq!(metrics.cross_attention_entropy[0].by_layer.get("mid"), Some(&None));
    assert_eq!(metrics.token_dominance.ranking[0].token_index, 2);
    assert_eq!(dataset.latent_pca().points.len(), STEPS);
    assert_eq!(dataset.metadata().prompt.meaningful_token_count, Some(3));
}

#[test]
fn loads_a_directory_and_reports_asset_issues() {
    let root = tempfile::tempdir().unwrap();
    let run = root.path().join("run_lighthouse");
    write_dataset(&run);

    let dataset = DatasetLoader::default().open(run.to_str().unwrap()).unwrap();
    assert_eq!(dataset.attention_lookup().len(), 2);
    assert!(dataset.source().describe().contains("run_lighthouse"));

    let issues = dataset.validate_attention_assets();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].path, "./attention/self/layer_mid_step_5.bin");
    assert_eq!(
        issues[0].kind,
        AssetIssueKind::SizeMismatch {
            expected: 128,
            actual: 100
        }
    );
}

#[test]
fn length_drift_loads_with_warnings() {
    let mut metadata = metadata_json();
    metadata["images"].as_array_mut().unwrap().truncate(20);
    metadata["attention_files"][0]["dtype"] = json!("float32");

    let dataset = DatasetLoader::default().load(Arc::new(files_with_metadata(&metadata))).unwrap();
    let warnings = dataset.warnings();
    assert_eq!(warnings.len(), 2, "{warnings:?}");
    assert_eq!(warnings[0], "metadata.images length mismatch (expected 24, got 20)");
    assert!(warnings[1].contains("float32"));
}

#[test]
fn structural_problems_are_fatal() {
    let mut metadata = metadata_json();
    metadata.as_object_mut().unwrap().remove("layers");
    assert!(matches!(load_err(files_with_metadata(&metadata)), AssetError::Load(LoadError::MissingKey("layers"))));

    let mut metadata = metadata_json();
    metadata["steps"] = json!(0);
    assert!(matches!(load_err(files_with_metadata(&metadata)), AssetError::Load(LoadError::InvalidSteps)));

    let mut metadata = metadata_json();
    metadata["attention_files"][1]["shape"] = json!([8, 8, 1]);
    assert!(matches!(
        load_err(files_with_metadata(&metadata)),
        AssetError::Load(LoadError::InvalidAttentionEntry { index: 1, .. })
    ));

    let mut metadata = metadata_json();
    let duplicate = metadata["attention_files"][0].clone();
    metadata["attention_files"].as_array_mut().unwrap().push(duplicate);
    match load_err(files_with_metadata(&metadata)) {
        AssetError::Load(LoadError::InvalidAttentionEntry { index, reason }) => {
            assert_eq!(index, 2);
            assert!(reason.contains("cross:mid:5"), "{reason}");
        }
        other => panic!("expected duplicate rejection, got {other:?}"),
    }
}

#[test]
fn unparseable_documents_name_their_label() {
    let files = local_files().with_file("run_lighthouse/latent_pca.json", b"{ \"points\": [[1, 2], ".to_vec());
    match load_err(files) {
        AssetError::Parse(ParseError { label, .. }) => assert_eq!(label, "latent_pca.json"),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn missing_documents_are_transport_errors() {
    let mut files = LocalFileSet::new("partial");
    files.insert("run/metadata.json", metadata_json().to_string().into_bytes());
    assert!(matches!(
        load_err(files),
        AssetError::Transport(TransportError::MissingLocalFile { ref path }) if path == "metrics.json"
    ));
}

#[test]
fn unreachable_remote_dataset_fails_without_panicking() {
    let err = DatasetLoader::default().open("http://127.0.0.1:9/run").unwrap_err();
    assert!(matches!(err, AssetError::Transport(TransportError::Http { .. })), "{err:?}");
}
