mod common;

use std::{fs, sync::Arc, thread};

use common::{CROSS_SHAPE, CountingHandler, STEPS, load_counting, local_files};
use difftrace_assets::{
    AssetConfig, AssetError, AttentionKind, CacheMetrics, DatasetLoader, DatasetMode, DecodeError, TransportError, caching::CacheEventKind
};

#[test]
fn end_to_end_cross_attention_lookup() {
    let (dataset, _handler) = load_counting(local_files());
    assert_eq!(dataset.metadata().steps as usize, STEPS);
    assert_eq!(dataset.mode(), DatasetMode::Local);

    let loaded = dataset.load_cross_token_map("mid", 5, 2).unwrap().expect("entry exists");
    assert_eq!(loaded.shape(), [16, 16]);
    assert_eq!(loaded.values().len(), 256);
    assert_eq!((loaded.layer_id.as_str(), loaded.step, loaded.token_index), ("mid", 5, Some(2)));
    assert_eq!(loaded.map.at(0, 0), Some(3.0));
    assert_eq!(loaded.map.at(2, 2), Some(100.0));

    let err = dataset.load_cross_token_map("mid", 5, 9).unwrap_err();
    assert!(matches!(
        err,
        AssetError::Decode(DecodeError::TokenOutOfBounds { index: 9, num_tokens }) if num_tokens == CROSS_SHAPE[0]
    ));

    assert!(dataset.load_cross_token_map("top", 5, 0).unwrap().is_none());
}

#[test]
fn absent_entries_short_circuit_before_cache_and_channel() {
    let (dataset, handler) = load_counting(local_files());

    assert!(dataset.lookup_attention_entry(AttentionKind::Cross, "mid", 6).is_none());
    assert!(dataset.load_cross_token_map("mid", 6, 0).unwrap().is_none());
    assert!(dataset.load_self_map("down", 5).unwrap().is_none());

    let metrics = dataset.cache_metrics();
    assert_eq!(handler.calls(), 0);
    assert_eq!(dataset.channel().provisioned_contexts(), 0);
    assert_eq!((metrics.raw_buffers.hits, metrics.raw_buffers.misses), (0, 0));
    assert_eq!((metrics.decoded_maps.hits, metrics.decoded_maps.misses), (0, 0));
}

#[test]
fn repeated_loads_are_served_from_the_decoded_cache() {
    let (dataset, handler) = load_counting(local_files());

    let first = dataset.load_cross_token_map("mid", 5, 1).unwrap().unwrap();
    let second = dataset.load_cross_token_map("mid", 5, 1).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first.map, &second.map));
    assert_eq!(handler.calls(), 1);

    // A different token reuses the raw buffer but needs a fresh decode.
    dataset.load_cross_token_map("mid", 5, 0).unwrap().unwrap();
    assert_eq!(handler.calls(), 2);

    let CacheMetrics { hits, misses, entries, .. } = dataset.cache_metrics().raw_buffers;
    assert_eq!((hits, misses, entries), (1, 1, 1));
    let decoded = dataset.cache_metrics().decoded_maps;
    assert_eq!((decoded.hits, decoded.misses, decoded.entries), (1, 2, 2));
    assert_eq!(decoded.latest.map(|event| event.kind), Some(CacheEventKind::Miss));
}

#[test]
fn self_maps_resolve_dot_prefixed_paths() {
    let (dataset, handler) = load_counting(local_files());
    let loaded = dataset.load_self_map("mid", 5).unwrap().unwrap();
    assert_eq!(loaded.shape(), [8, 8]);
    assert_eq!(loaded.token_index, None);
    assert_eq!(loaded.map.at(7, 7), Some(63.0 / 64.0));
    dataset.load_self_map("mid", 5).unwrap().unwrap();
    assert_eq!(handler.calls(), 1);
}

#[test]
fn divergence_is_none_when_either_side_is_absent() {
    let (dataset, _handler) = load_counting(local_files());
    let token0 = dataset.load_cross_token_map("mid", 5, 0).unwrap().map(|loaded| loaded.map);
    let token3 = dataset.load_cross_token_map("mid", 5, 3).unwrap().map(|loaded| loaded.map);
    let missing = dataset.load_cross_token_map("mid", 7, 0).unwrap().map(|loaded| loaded.map);

    let jsd = dataset.compute_divergence(token0.as_deref(), token3.as_deref()).unwrap().unwrap();
    assert!(jsd > 0.0 && jsd <= std::f64::consts::LN_2);
    assert_eq!(dataset.compute_divergence(token0.as_deref(), token0.as_deref()).unwrap(), Some(0.0));
    assert_eq!(dataset.compute_divergence(token0.as_deref(), missing.as_deref()).unwrap(), None);
    assert_eq!(dataset.compute_map_entropy(missing.as_deref()).unwrap(), None);
    assert!(dataset.compute_map_entropy(token0.as_deref()).unwrap().unwrap() > 0.0);
}

#[test]
fn raw_cache_capacity_comes_from_config() {
    let handler = Arc::new(CountingHandler::default());
    let config = AssetConfig {
        raw_cache_capacity: 1,
        ..AssetConfig::default()
    };
    let dataset = DatasetLoader::new(config).with_handler(handler).load(Arc::new(local_files())).unwrap();

    dataset.load_cross_token_map("mid", 5, 0).unwrap();
    dataset.load_self_map("mid", 5).unwrap();
    let raw = dataset.cache_metrics().raw_buffers;
    assert_eq!((raw.entries, raw.capacity, raw.evictions), (1, 1, 1));
}

#[test]
fn missing_local_asset_is_a_transport_error() {
    let (dataset, _handler) = load_counting(local_files());
    let err = dataset.get_raw_buffer("attention/cross/layer_mid_step_6.bin").unwrap_err();
    assert!(matches!(
        err,
        AssetError::Transport(TransportError::MissingLocalFile { ref path }) if path == "attention/cross/layer_mid_step_6.bin"
    ));
}

#[test]
fn previews_are_released_on_supersession_and_teardown() {
    let (dataset, _handler) = load_counting(local_files());

    let first = dataset.image_preview("timeline", 0).unwrap().unwrap();
    assert_eq!(fs::read(&first).unwrap(), vec![137u8, 80, 78, 71, 0]);
    let second = dataset.image_preview("timeline", 1).unwrap().unwrap();
    assert!(!fs::exists(&first).unwrap(), "superseded preview still on disk");
    let pinned = dataset.image_preview("compare", 0).unwrap().unwrap();
    assert_eq!(dataset.live_previews(), 2);

    assert!(dataset.image_preview("timeline", STEPS).unwrap().is_none());
    assert!(matches!(
        dataset.image_preview("timeline", 5),
        Err(AssetError::Transport(TransportError::MissingLocalFile { .. }))
    ));

    dataset.release_dataset_resources();
    assert_eq!(dataset.live_previews(), 0);
    assert!(!fs::exists(&second).unwrap());
    assert!(!fs::exists(&pinned).unwrap());
}

#[test]
fn release_clears_caches_and_the_dataset_stays_usable() {
    let (dataset, handler) = load_counting(local_files());
    dataset.load_cross_token_map("mid", 5, 0).unwrap();
    assert_eq!(dataset.channel().provisioned_contexts(), 1);

    dataset.release_dataset_resources();
    let metrics = dataset.cache_metrics();
    assert_eq!((metrics.raw_buffers.entries, metrics.decoded_maps.entries), (0, 0));
    assert_eq!(metrics.decoded_maps.latest.map(|event| event.kind), Some(CacheEventKind::Cleared));

    dataset.load_cross_token_map("mid", 5, 0).unwrap().unwrap();
    assert_eq!(handler.calls(), 2);
    assert_eq!(dataset.channel().provisioned_contexts(), 2);
}

#[test]
fn dataset_is_shared_across_threads() {
    let (dataset, _handler) = load_counting(local_files());

    thread::scope(|scope| {
        for token in 0..CROSS_SHAPE[0] {
            let dataset = &dataset;
            scope.spawn(move || {
                let loaded = dataset.load_cross_token_map("mid", 5, token).unwrap().unwrap();
                assert_eq!(loaded.map.at(token, token), Some(100.0));
                assert_eq!(loaded.map.at(0, CROSS_SHAPE[2] - 1), Some((token + 1) as f32));
            });
        }
    });
    assert_eq!(dataset.cache_metrics().decoded_maps.entries, CROSS_SHAPE[0]);
}
