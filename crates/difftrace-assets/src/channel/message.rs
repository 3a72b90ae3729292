//! Request and reply envelopes that cross the compute boundary.

use std::{fmt, sync::Arc};

use crate::{
    decoder::{self, AttentionMap}, error::{AssetError, DecodeError}
};

/// Work the isolated context knows how to perform.
///
/// Every payload is owned, so a request can move to another thread without
/// sharing mutable state with the caller.
#[derive(Debug, Clone)]
pub enum ComputeRequest {
    DecodeCross {
        buffer: Arc<[u8]>,
        shape: Vec<usize>,
        token_index: usize,
    },
    DecodeSelf {
        buffer: Arc<[u8]>,
        shape: Vec<usize>,
    },
    JsDivergence {
        left: Arc<[f32]>,
        right: Arc<[f32]>,
    },
    Entropy {
        map: Arc<[f32]>,
    },
}

impl ComputeRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            ComputeRequest::DecodeCross { .. } => RequestKind::DecodeCross,
            ComputeRequest::DecodeSelf { .. } => RequestKind::DecodeSelf,
            ComputeRequest::JsDivergence { .. } => RequestKind::JsDivergence,
            ComputeRequest::Entropy { .. } => RequestKind::Entropy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    DecodeCross,
    DecodeSelf,
    JsDivergence,
    Entropy,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecodeCross => f.write_str("decode-cross"),
            Self::DecodeSelf => f.write_str("decode-self"),
            Self::JsDivergence => f.write_str("js-divergence"),
            Self::Entropy => f.write_str("entropy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComputeOutput {
    Map(AttentionMap),
    Scalar(f64),
}

impl ComputeOutput {
    pub fn into_map(self) -> Option<AttentionMap> {
        match self {
            ComputeOutput::Map(map) => Some(map),
            ComputeOutput::Scalar(_) => None,
        }
    }

    pub fn into_scalar(self) -> Option<f64> {
        match self {
            ComputeOutput::Scalar(value) => Some(value),
            ComputeOutput::Map(_) => None,
        }
    }
}

/// Outcome delivered to a waiting caller.
pub type CallResult = Result<ComputeOutput, AssetError>;

/// Executes requests inside the isolated context.
///
/// A panic inside `handle` is treated as a fatal crash of the context.
pub trait ComputeHandler: Send + Sync + 'static {
    fn handle(&self, request: ComputeRequest) -> Result<ComputeOutput, DecodeError>;
}

/// The production handler: runs the pure decoder routines.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecoderHandler;

impl ComputeHandler for DecoderHandler {
    fn handle(&self, request: ComputeRequest) -> Result<ComputeOutput, DecodeError> {
        match request {
            ComputeRequest::DecodeCross {
                buffer,
                shape,
                token_index,
            } => decoder::decode_cross_slice(&buffer, &shape, token_index).map(ComputeOutput::Map),
            ComputeRequest::DecodeSelf { buffer, shape } => decoder::decode_self_slice(&buffer, &shape).map(ComputeOutput::Map),
            ComputeRequest::JsDivergence { left, right } => decoder::js_divergence(&left, &right).map(ComputeOutput::Scalar),
            ComputeRequest::Entropy { map } => Ok(ComputeOutput::Scalar(decoder::entropy(&map))),
        }
    }
}

/// Request tagged with its correlation id, as queued for the worker.
pub(crate) struct WorkerEnvelope {
    pub id: u64,
    pub request: ComputeRequest,
}

/// Messages consumed by a context's router thread.
pub(crate) enum RouterMessage {
    Reply { id: u64, result: Result<ComputeOutput, DecodeError> },
    Fatal { reason: String },
    /// A new pending entry exists; recompute the nearest deadline.
    Registered,
    Shutdown,
}
