#![allow(dead_code)]

use std::sync::{
    Arc, atomic::{AtomicUsize, Ordering}
};

use difftrace_assets::{
    AssetConfig, ComputeHandler, ComputeOutput, ComputeRequest, Dataset, DatasetLoader, DecodeError, DecoderHandler, LocalFileSet
};
use half::f16;
use serde_json::{Value, json};

pub const STEPS: usize = 24;
pub const CROSS_SHAPE: [usize; 3] = [4, 16, 16];
pub const SELF_SHAPE: [usize; 2] = [8, 8];

pub fn encode_f16(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|&value| f16::from_f32(value).to_le_bytes()).collect()
}

/// Token `t` holds `t + 1` everywhere except a single hot cell at `(t, t)`.
pub fn cross_values() -> Vec<f32> {
    let [tokens, height, width] = CROSS_SHAPE;
    let mut values = Vec::with_capacity(tokens * height * width);
    for token in 0..tokens {
        for row in 0..height {
            for col in 0..width {
                let hot = row == token && col == token;
                values.push(if hot { 100.0 } else { (token + 1) as f32 });
            }
        }
    }
    values
}

pub fn metadata_json() -> Value {
    let images: Vec<String> = (0..STEPS).map(|step| format!("images/step_{step:03}.png")).collect();
    let timesteps: Vec<f64> = (0..STEPS).map(|step| 1000.0 - (step as f64) * 40.0).collect();
    json!({
        "schema_version": "1.0",
        "generator": { "model": "tiny-unet", "seed": 7 },
        "prompt": {
            "text": "a lighthouse at dusk",
            "tokens": ["<|startoftext|>", "a", "lighthouse", "dusk"],
            "token_ids": [49406, 320, 13645, 7256],
            "meaningful_token_count": 3
        },
        "steps": STEPS,
        "timesteps": timesteps,
        "images": images,
        "layers": [
            { "id": "mid", "attention_type": "cross" },
            { "id": "mid", "attention_type": "self" }
        ],
        "attention_files": [
            {
                "attention_type": "cross",
                "layer_id": "mid",
                "step": 5,
                "path": "attention/cross/layer_mid_step_5.bin",
                "shape": CROSS_SHAPE,
                "dtype": "float16"
            },
            {
                "attention_type": "self",
                "layer_id": "mid",
                "step": 5,
                "path": "./attention/self/layer_mid_step_5.bin",
                "shape": SELF_SHAPE,
                "dtype": "float16"
            }
        ],
        "artifacts": { "metrics": "metrics.json", "latent_pca": "latent_pca.json" }
    })
}

/// Written by hand so the exporter's bare `NaN` and `Infinity` survive.
pub fn metrics_text() -> String {
    let mut norms = vec!["1.5".to_string(); STEPS];
    norms[3] = "NaN".to_string();
    norms[4] = "Infinity".to_string();
    format!(
        r#"{{
  "latent_l2_norm": [{}],
  "predicted_noise_l2_norm": [],
  "cosine_similarity_to_previous": [],
  "attention_kl_divergence": [-Infinity],
  "cross_attention_entropy": [{{ "step": 0, "mean": 2.5, "by_layer": {{ "mid": NaN }} }}],
  "self_attention_entropy": [],
  "mean_token_activation": [[0.1, 0.2, NaN]],
  "token_dominance": {{ "scores": [0.5, 0.25], "ranking": [{{ "token_index": 2, "score": 0.5 }}] }}
}}"#,
        norms.join(", ")
    )
}

pub fn latent_pca_json() -> Value {
    let points: Vec<[f64; 2]> = (0..STEPS).map(|step| [step as f64, -(step as f64)]).collect();
    json!({ "points": points, "explained_variance_ratio": [0.8, 0.15] })
}

/// A folder selection as a picker would deliver it: every path prefixed by the folder name.
pub fn local_files() -> LocalFileSet {
    let self_values: Vec<f32> = (0..SELF_SHAPE[0] * SELF_SHAPE[1]).map(|i| i as f32 / 64.0).collect();
    LocalFileSet::new("fixture")
        .with_file("run_lighthouse/metadata.json", metadata_json().to_string().into_bytes())
        .with_file("run_lighthouse/metrics.json", metrics_text().into_bytes())
        .with_file("run_lighthouse/latent_pca.json", latent_pca_json().to_string().into_bytes())
        .with_file("run_lighthouse/attention/cross/layer_mid_step_5.bin", encode_f16(&cross_values()))
        .with_file("run_lighthouse/attention/self/layer_mid_step_5.bin", encode_f16(&self_values))
        .with_file("run_lighthouse/images/step_000.png", vec![137u8, 80, 78, 71, 0])
        .with_file("run_lighthouse/images/step_001.png", vec![137u8, 80, 78, 71, 1])
}

/// Forwards to the real decoder and counts every request it serves.
#[derive(Default)]
pub struct CountingHandler {
    calls: AtomicUsize,
}

impl CountingHandler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ComputeHandler for CountingHandler {
    fn handle(&self, request: ComputeRequest) -> Result<ComputeOutput, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DecoderHandler.handle(request)
    }
}

pub fn load_counting(files: LocalFileSet) -> (Dataset, Arc<CountingHandler>) {
    let handler = Arc::new(CountingHandler::default());
    let loader = DatasetLoader::new(AssetConfig::default()).with_handler(handler.clone());
    let dataset = loader.load(Arc::new(files)).expect("fixture dataset loads");
    (dataset, handler)
}
