#![cfg(test)]

use std::fs;

use super::*;
use crate::error::AssetError;

#[test]
fn normalize_strips_relative_markers_and_backslashes() {
    assert_eq!(normalize_path("./attention/cross/a.bin"), "attention/cross/a.bin");
    assert_eq!(normalize_path("attention\\self\\b.bin"), "attention/self/b.bin");
    assert_eq!(normalize_path("././/images/step_000.png"), "images/step_000.png");
    assert_eq!(normalize_path("metadata.json"), "metadata.json");
}

#[test]
fn exact_match_wins_over_suffix() {
    let files = LocalFileSet::new("picked")
        .with_file("run/metadata.json", b"prefixed".to_vec())
        .with_file("metadata.json", b"exact".to_vec());
    assert_eq!(&*files.resolve("./metadata.json").unwrap(), b"exact");
}

#[test]
fn suffix_match_tolerates_leading_directory() {
    let files = LocalFileSet::new("picked").with_file("run_01/attention/cross/layer_mid_step_5.bin", vec![1u8, 2]);
    let bytes = files.resolve("attention/cross/layer_mid_step_5.bin").unwrap();
    assert_eq!(&*bytes, &[1, 2]);
}

#[test]
fn suffix_match_requires_segment_boundary() {
    let files = LocalFileSet::new("picked").with_file("run/xmetadata.json", vec![0u8]);
    let err = files.resolve("metadata.json").unwrap_err();
    assert!(matches!(err, AssetError::Transport(TransportError::MissingLocalFile { ref path }) if path == "metadata.json"));
}

#[test]
fn suffix_match_prefers_shortest_candidate() {
    let files = LocalFileSet::new("picked")
        .with_file("outer/inner/images/step_000.png", vec![2u8])
        .with_file("inner/images/step_000.png", vec![1u8]);
    assert_eq!(&*files.resolve("images/step_000.png").unwrap(), &[1]);
}

#[test]
fn from_directory_prefixes_directory_name() {
    let root = tempfile::tempdir().unwrap();
    let run = root.path().join("run_42");
    fs::create_dir_all(run.join("attention/self")).unwrap();
    fs::write(run.join("metadata.json"), b"{}").unwrap();
    fs::write(run.join("attention/self/layer_up_step_0.bin"), [0u8; 8]).unwrap();

    let files = LocalFileSet::from_directory(&run).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.find("run_42/metadata.json").is_some());
    assert_eq!(files.resolve("attention/self/layer_up_step_0.bin").unwrap().len(), 8);
    assert_eq!(files.total_bytes(), Some(10));
    assert_eq!(files.mode(), DatasetMode::Local);
}

#[cfg(unix)]
#[test]
fn from_directory_follows_symlinks_and_skips_dangling_ones() {
    use std::os::unix::fs::symlink;

    let root = tempfile::tempdir().unwrap();
    let store = root.path().join("store");
    fs::create_dir_all(store.join("cross")).unwrap();
    fs::write(store.join("metrics.json"), b"{}").unwrap();
    fs::write(store.join("cross/layer_mid_step_3.bin"), [0u8; 6]).unwrap();

    let run = root.path().join("run_7");
    fs::create_dir_all(&run).unwrap();
    fs::create_dir_all(run.join("attention")).unwrap();
    symlink(store.join("metrics.json"), run.join("metrics.json")).unwrap();
    symlink(store.join("cross"), run.join("attention/cross")).unwrap();
    symlink(store.join("gone.json"), run.join("latent_pca.json")).unwrap();

    let files = LocalFileSet::from_directory(&run).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files.resolve("metrics.json").unwrap().len(), 2);
    assert_eq!(files.resolve("attention/cross/layer_mid_step_3.bin").unwrap().len(), 6);
    assert!(files.find("latent_pca.json").is_none());
}

#[test]
fn remote_urls_join_normalised_paths() {
    let source = RemoteSource::new("https://example.org/runs/demo/");
    assert_eq!(source.base_url(), "https://example.org/runs/demo");
    assert_eq!(source.url_for("./images/step_003.png"), "https://example.org/runs/demo/images/step_003.png");
    let handle = source.preview("images/step_003.png").unwrap();
    assert!(!handle.needs_release());
    assert_eq!(handle.location(), "https://example.org/runs/demo/images/step_003.png");
}

#[test]
fn local_preview_file_is_removed_on_drop() {
    let files = LocalFileSet::new("picked").with_file("images/step_000.png", vec![137u8, 80, 78, 71]);
    let handle = files.preview("images/step_000.png").unwrap();
    let path = handle.local_path().unwrap();
    assert_eq!(fs::read(&path).unwrap(), vec![137u8, 80, 78, 71]);
    assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("png"));
    drop(handle);
    assert!(!path.exists());
}
