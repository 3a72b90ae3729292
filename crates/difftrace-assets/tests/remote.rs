mod common;

use std::{
    io::{BufRead, BufReader, Write}, net::{TcpListener, TcpStream}, sync::{Arc, Mutex}, thread
};

use common::{cross_values, encode_f16, latent_pca_json, metadata_json, metrics_text};
use difftrace_assets::{AssetError, DatasetLoader, DatasetMode, DatasetSource, RemoteSource, TransportError};
use rustc_hash::FxHashMap;

type Hits = Arc<Mutex<FxHashMap<String, usize>>>;

/// Minimal HTTP/1.1 file server on an ephemeral loopback port. Unknown paths get a 404.
struct FixtureServer {
    base_url: String,
    hits: Hits,
}

impl FixtureServer {
    fn start(prefix: &str, files: FxHashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/{prefix}", listener.local_addr().unwrap());
        let hits = Hits::default();

        let served = Arc::clone(&hits);
        let prefix = format!("/{prefix}/");
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                respond(stream, &prefix, &files, &served);
            }
        });

        Self { base_url, hits }
    }

    fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

fn respond(stream: TcpStream, prefix: &str, files: &FxHashMap<String, Vec<u8>>, hits: &Hits) {
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut header = String::new();
        match reader.read_line(&mut header) {
            Ok(0) | Err(_) => break,
            Ok(_) if header == "\r\n" || header == "\n" => break,
            Ok(_) => {}
        }
    }

    let target = request_line.split_whitespace().nth(1).unwrap_or_default();
    let path = target.strip_prefix(prefix).unwrap_or(target).to_string();
    *hits.lock().unwrap().entry(path.clone()).or_default() += 1;

    let (status, body): (&str, &[u8]) = match files.get(&path) {
        Some(bytes) => ("200 OK", bytes),
        None => ("404 Not Found", b"not found"),
    };
    let head = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
    let mut writer = &stream;
    let _ = writer.write_all(head.as_bytes()).and_then(|()| writer.write_all(body));
}

fn dataset_files() -> FxHashMap<String, Vec<u8>> {
    let mut files = FxHashMap::default();
    files.insert("metadata.json".to_string(), metadata_json().to_string().into_bytes());
    files.insert("metrics.json".to_string(), metrics_text().into_bytes());
    files.insert("latent_pca.json".to_string(), latent_pca_json().to_string().into_bytes());
    files.insert("attention/cross/layer_mid_step_5.bin".to_string(), encode_f16(&cross_values()));
    files
}

#[test]
fn remote_source_reads_bodies_and_reports_http_status() {
    let mut files = FxHashMap::default();
    files.insert("ok.bin".to_string(), vec![0u8, 60, 0, 64]);
    let server = FixtureServer::start("run", files);
    let source = RemoteSource::new(&format!("{}/", server.base_url));

    assert_eq!(source.mode(), DatasetMode::Url);
    assert_eq!(&*source.resolve("./ok.bin").unwrap(), &[0u8, 60, 0, 64]);

    let missing_url = format!("{}/missing.bin", server.base_url);
    let err = source.resolve("missing.bin").unwrap_err();
    assert!(
        matches!(err, AssetError::Transport(TransportError::HttpStatus { status: 404, ref url }) if *url == missing_url),
        "{err:?}"
    );
    assert!(err.to_string().contains(&missing_url), "{err}");
    assert_eq!(server.hits("missing.bin"), 1);
}

#[test]
fn remote_dataset_loads_and_caches_fetched_buffers() {
    let server = FixtureServer::start("run_lighthouse", dataset_files());
    let dataset = DatasetLoader::default().open(&server.base_url).unwrap();
    assert_eq!(dataset.source().mode(), DatasetMode::Url);
    assert_eq!(server.hits("metadata.json"), 1);

    let path = "./attention/cross/layer_mid_step_5.bin";
    let first = dataset.get_raw_buffer(path).unwrap();
    let second = dataset.get_raw_buffer(path).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(&*first, encode_f16(&cross_values()).as_slice());

    let loaded = dataset.load_cross_token_map("mid", 5, 2).unwrap().unwrap();
    assert_eq!(loaded.map.at(2, 2), Some(100.0));
    assert_eq!(server.hits("attention/cross/layer_mid_step_5.bin"), 1);
    let raw = dataset.cache_metrics().raw_buffers;
    assert_eq!((raw.hits, raw.misses), (2, 1));

    // Remote previews point at the URL and fetch nothing.
    let preview = dataset.image_preview("main", 5).unwrap().unwrap();
    assert_eq!(preview, format!("{}/images/step_005.png", server.base_url));
    assert_eq!(server.hits("images/step_005.png"), 0);
}
