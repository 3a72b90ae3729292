//! Error taxonomy for the attention asset pipeline.

use std::time::Duration;

use thiserror::Error;

pub type AssetResult<T> = std::result::Result<T, AssetError>;

/// Shape, bounds and length violations raised while decoding packed tensors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("malformed {kind} attention shape {shape:?}: {reason}")]
    MalformedShape {
        kind: &'static str,
        shape: Vec<usize>,
        reason: &'static str,
    },
    #[error("token index {index} out of bounds for {num_tokens} tokens")]
    TokenOutOfBounds { index: usize, num_tokens: usize },
    #[error("buffer holds {actual} half-precision words but shape {shape:?} requires {expected}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("buffer length {bytes} is not a whole number of 16-bit words")]
    OddByteLength { bytes: usize },
    #[error("slice [{start}, {start}+{len}) exceeds buffer of {words} words")]
    SliceOutOfRange { start: usize, len: usize, words: usize },
    #[error("divergence inputs differ in length: {left} vs {right}")]
    DivergenceLengthMismatch { left: usize, right: usize },
}

/// Failures at the compute channel boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("request {id} timed out after {}ms", after.as_millis())]
    Timeout { id: u64, after: Duration },
    #[error("compute context crashed: {reason}")]
    Crashed { reason: String },
    #[error("compute channel terminated")]
    Terminated,
    #[error("compute handler replied with the wrong payload; expected {expected}")]
    UnexpectedReply { expected: &'static str },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to fetch {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("failed to fetch {url}: {message}")]
    Http { url: String, message: String },
    #[error("no local file matches '{path}'")]
    MissingLocalFile { path: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// JSON that failed to parse both directly and after numeric sanitisation.
#[derive(Debug, Error)]
#[error("failed to parse {label}: {original} (after sanitising: {sanitized})")]
pub struct ParseError {
    pub label: String,
    pub original: String,
    pub sanitized: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("metadata missing required key '{0}'")]
    MissingKey(&'static str),
    #[error("metadata.steps must be a positive integer")]
    InvalidSteps,
    #[error("attention_files[{index}] {reason}")]
    InvalidAttentionEntry { index: usize, reason: String },
    #[error("invalid {label}: {message}")]
    Schema { label: String, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] difftrace_env::EnvError),
    #[error("invalid configuration for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AssetError {
    /// Timeouts and crashes may succeed on a later attempt; everything else will not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssetError::Channel(ChannelError::Timeout { .. } | ChannelError::Crashed { .. }))
    }
}
