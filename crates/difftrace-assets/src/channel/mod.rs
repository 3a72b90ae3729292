//! Request/response boundary to an isolated compute context.
//!
//! [`ComputeChannel`] owns at most one live context at a time and provisions it
//! lazily. Each request receives a fresh id, a pending entry and a deadline.
//! Replies are correlated by id, so concurrent callers may see completions in any
//! order. A crash rejects everything pending and the next request provisions a
//! new context. [`ComputeChannel::dispose`] tears the context down explicitly.

mod context;
pub mod message;
mod pending;

use std::{
    sync::{Arc, Mutex, MutexGuard}, time::Duration
};

use crossbeam::channel::{Receiver, TryRecvError, bounded};

use self::context::ComputeContext;
pub use self::message::{CallResult, ComputeHandler, ComputeOutput, ComputeRequest, DecoderHandler, RequestKind};
use crate::{
    decoder::AttentionMap, error::{AssetResult, ChannelError}
};

/// Default lifetime bound of a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Lifecycle of the channel's background context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    /// No context exists; the next request provisions one.
    Idle,
    Active,
    /// A request timed out; the next request goes to a fresh context.
    Stalled,
    /// The context died; the next request replaces it.
    Crashed,
}

struct ChannelState {
    next_id: u64,
    provisioned: u64,
    context: Option<ComputeContext>,
    /// Stalled contexts kept alive until the requests they accepted settle.
    draining: Vec<ComputeContext>,
}

pub struct ComputeChannel {
    handler: Arc<dyn ComputeHandler>,
    timeout: Duration,
    state: Mutex<ChannelState>,
}

impl ComputeChannel {
    /// A channel backed by the production decoder.
    pub fn new(timeout: Duration) -> Self {
        Self::with_handler(timeout, Arc::new(DecoderHandler))
    }

    pub fn with_handler(timeout: Duration, handler: Arc<dyn ComputeHandler>) -> Self {
        Self {
            handler,
            timeout,
            state: Mutex::new(ChannelState {
                next_id: 1,
                provisioned: 0,
                context: None,
                draining: Vec::new(),
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit a request and return a handle to its eventual outcome.
    pub fn request(&self, request: ComputeRequest) -> Result<PendingCall, ChannelError> {
        let mut state = self.lock_state();
        let mut request = request;

        // A context can close between the liveness check and registration; one
        // retry on a fresh context covers that window.
        for _ in 0..2 {
            self.ensure_live_context(&mut state)?;
            let id = state.next_id;
            state.next_id += 1;
            let kind = request.kind();
            let (reply_tx, reply_rx) = bounded(1);

            let Some(context) = state.context.as_ref() else {
                return Err(ChannelError::Terminated);
            };
            match context.submit(id, request, reply_tx, self.timeout) {
                Ok(()) => {
                    return Ok(PendingCall {
                        id,
                        kind,
                        reply: reply_rx,
                    });
                }
                Err((returned, _)) => request = returned,
            }
        }

        Err(ChannelError::Crashed {
            reason: "compute context closed during submission".to_string(),
        })
    }

    /// Submit and block until the outcome arrives.
    pub fn call(&self, request: ComputeRequest) -> AssetResult<ComputeOutput> {
        self.request(request)?.wait()
    }

    pub fn decode_cross(&self, buffer: Arc<[u8]>, shape: Vec<usize>, token_index: usize) -> AssetResult<AttentionMap> {
        let output = self.call(ComputeRequest::DecodeCross {
            buffer,
            shape,
            token_index,
        })?;
        expect_map(output)
    }

    pub fn decode_self(&self, buffer: Arc<[u8]>, shape: Vec<usize>) -> AssetResult<AttentionMap> {
        let output = self.call(ComputeRequest::DecodeSelf { buffer, shape })?;
        expect_map(output)
    }

    pub fn js_divergence(&self, left: Arc<[f32]>, right: Arc<[f32]>) -> AssetResult<f64> {
        let output = self.call(ComputeRequest::JsDivergence { left, right })?;
        expect_scalar(output)
    }

    pub fn entropy(&self, map: Arc<[f32]>) -> AssetResult<f64> {
        let output = self.call(ComputeRequest::Entropy { map })?;
        expect_scalar(output)
    }

    /// Terminate the context, reject every pending request with
    /// [`ChannelError::Terminated`] and reset request ids.
    pub fn dispose(&self) {
        let mut state = self.lock_state();
        if let Some(context) = state.context.take() {
            tracing::info!(generation = context.generation(), "disposing compute context");
            context.shutdown(ChannelError::Terminated);
        }
        for stalled in state.draining.drain(..) {
            stalled.shutdown(ChannelError::Terminated);
        }
        state.next_id = 1;
    }

    pub fn state(&self) -> ContextState {
        match &self.lock_state().context {
            None => ContextState::Idle,
            Some(context) if context.is_closed() => ContextState::Crashed,
            Some(context) if context.is_stalled() => ContextState::Stalled,
            Some(_) => ContextState::Active,
        }
    }

    /// Number of contexts provisioned over the channel's lifetime.
    pub fn provisioned_contexts(&self) -> u64 {
        self.lock_state().provisioned
    }

    /// In-flight requests across the live context and any stalled ones.
    pub fn pending_count(&self) -> usize {
        let state = self.lock_state();
        state.context.iter().chain(&state.draining).map(ComputeContext::pending_len).sum()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        let state = self.lock_state();
        state.context.iter().chain(&state.draining).any(|context| context.contains_pending(id))
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace a crashed or stalled context, or provision the first one.
    fn ensure_live_context(&self, state: &mut ChannelState) -> Result<(), ChannelError> {
        let (settled, still_draining): (Vec<_>, Vec<_>) =
            state.draining.drain(..).partition(|stalled| stalled.pending_len() == 0);
        state.draining = still_draining;
        for stalled in settled {
            tracing::debug!(generation = stalled.generation(), "stalled compute context drained");
            stalled.shutdown(ChannelError::Terminated);
        }

        if state.context.as_ref().is_some_and(ComputeContext::accepts_requests) {
            return Ok(());
        }
        if let Some(stale) = state.context.take() {
            if stale.is_stalled() && !stale.is_closed() {
                tracing::info!(generation = stale.generation(), pending = stale.pending_len(), "setting stalled compute context aside");
                state.draining.push(stale);
            } else {
                tracing::info!(generation = stale.generation(), "replacing crashed compute context");
                stale.shutdown(ChannelError::Terminated);
            }
        }
        state.provisioned += 1;
        let context = ComputeContext::spawn(state.provisioned, self.handler.clone()).map_err(|err| ChannelError::Crashed {
            reason: format!("failed to spawn compute context: {err}"),
        })?;
        state.context = Some(context);
        Ok(())
    }
}

impl Drop for ComputeChannel {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ComputeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeChannel")
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .finish()
    }
}

/// Handle to one in-flight request.
///
/// Dropping the handle abandons interest in the result; the request itself still
/// runs to completion, timeout or crash.
#[derive(Debug)]
pub struct PendingCall {
    id: u64,
    kind: RequestKind,
    reply: Receiver<CallResult>,
}

impl PendingCall {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Block until the request settles.
    pub fn wait(self) -> AssetResult<ComputeOutput> {
        self.reply.recv().unwrap_or_else(|_| Err(ChannelError::Terminated.into()))
    }

    /// Non-blocking poll; `None` while the request is still in flight.
    pub fn try_wait(&self) -> Option<AssetResult<ComputeOutput>> {
        match self.reply.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ChannelError::Terminated.into())),
        }
    }
}

fn expect_map(output: ComputeOutput) -> AssetResult<AttentionMap> {
    output
        .into_map()
        .ok_or_else(|| ChannelError::UnexpectedReply { expected: "attention map" }.into())
}

fn expect_scalar(output: ComputeOutput) -> AssetResult<f64> {
    output
        .into_scalar()
        .ok_or_else(|| ChannelError::UnexpectedReply { expected: "scalar" }.into())
}
