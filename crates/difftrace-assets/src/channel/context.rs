//! One live isolated context: a worker thread that runs the handler and a
//! router thread that correlates replies and enforces deadlines.

use std::{
    any::Any, panic::{self, AssertUnwindSafe}, sync::{Arc, Mutex, MutexGuard}, thread::{self, JoinHandle}, time::{Duration, Instant}
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use super::{
    message::{CallResult, ComputeHandler, ComputeRequest, RouterMessage, WorkerEnvelope}, pending::{PendingRequest, PendingTable}
};
use crate::error::ChannelError;

pub(crate) struct ComputeContext {
    generation: u64,
    requests: Sender<WorkerEnvelope>,
    router_inbox: Sender<RouterMessage>,
    pending: Arc<Mutex<PendingTable>>,
    router: Option<JoinHandle<()>>,
}

impl ComputeContext {
    pub fn spawn(generation: u64, handler: Arc<dyn ComputeHandler>) -> std::io::Result<Self> {
        let (requests, worker_rx) = unbounded::<WorkerEnvelope>();
        let (router_inbox, router_rx) = unbounded::<RouterMessage>();
        let pending = Arc::new(Mutex::new(PendingTable::default()));

        let worker_outbox = router_inbox.clone();
        // Detached: a worker mid-decode exits once its queue disconnects.
        thread::Builder::new()
            .name(format!("difftrace-compute-{generation}"))
            .spawn(move || run_worker(handler.as_ref(), &worker_rx, &worker_outbox))?;

        let router_pending = pending.clone();
        let router = thread::Builder::new()
            .name(format!("difftrace-router-{generation}"))
            .spawn(move || run_router(generation, &router_rx, &router_pending))?;

        tracing::info!(generation, "provisioned compute context");
        Ok(Self {
            generation,
            requests,
            router_inbox,
            pending,
            router: Some(router),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed_reason().is_some()
    }

    /// A request timed out, so the worker may be wedged on it.
    pub fn is_stalled(&self) -> bool {
        lock(&self.pending).is_stalled()
    }

    /// Whether new requests may still be registered here.
    pub fn accepts_requests(&self) -> bool {
        let pending = lock(&self.pending);
        pending.closed_reason().is_none() && !pending.is_stalled()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn contains_pending(&self, id: u64) -> bool {
        lock(&self.pending).contains(id)
    }

    /// Register and enqueue a request. Hands the request back when the context
    /// has already closed so the caller can retry on a fresh one.
    pub fn submit(
        &self,
        id: u64,
        request: ComputeRequest,
        reply: Sender<CallResult>,
        timeout: Duration,
    ) -> Result<(), (ComputeRequest, Sender<CallResult>)> {
        let kind = request.kind();
        let entry = PendingRequest {
            reply,
            kind,
            deadline: Instant::now() + timeout,
            timeout,
        };
        if let Err(entry) = lock(&self.pending).register(id, entry) {
            return Err((request, entry.reply));
        }

        if self.requests.send(WorkerEnvelope { id, request }).is_err() {
            // The worker is gone; its fatal report may still be in flight.
            if let Some(entry) = lock(&self.pending).complete(id) {
                entry.settle(Err(ChannelError::Crashed {
                    reason: "worker queue disconnected".to_string(),
                }
                .into()));
            }
            return Ok(());
        }

        tracing::debug!(generation = self.generation, id, %kind, "compute request submitted");
        let _ = self.router_inbox.send(RouterMessage::Registered);
        Ok(())
    }

    /// Reject everything still pending with `reason` and stop both threads.
    pub fn shutdown(mut self, reason: ChannelError) {
        let drained = lock(&self.pending).close(reason.clone());
        if !drained.is_empty() {
            tracing::info!(generation = self.generation, rejected = drained.len(), %reason, "rejecting pending requests");
        }
        for (_, entry) in drained {
            entry.settle(Err(reason.clone().into()));
        }

        let _ = self.router_inbox.send(RouterMessage::Shutdown);
        if let Some(router) = self.router.take() {
            let _ = router.join();
        }
    }
}

fn lock(pending: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_worker(handler: &dyn ComputeHandler, requests: &Receiver<WorkerEnvelope>, outbox: &Sender<RouterMessage>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        for WorkerEnvelope { id, request } in requests.iter() {
            let result = handler.handle(request);
            if outbox.send(RouterMessage::Reply { id, result }).is_err() {
                break;
            }
        }
    }));

    if let Err(payload) = outcome {
        let _ = outbox.send(RouterMessage::Fatal {
            reason: panic_payload_message(payload),
        });
    }
}

fn run_router(generation: u64, inbox: &Receiver<RouterMessage>, pending: &Mutex<PendingTable>) {
    loop {
        let next_deadline = lock(pending).next_deadline();
        let message = match next_deadline {
            Some(deadline) => match inbox.recv_deadline(deadline) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            },
            None => match inbox.recv() {
                Ok(message) => Some(message),
                Err(_) => return,
            },
        };

        match message {
            Some(RouterMessage::Reply { id, result }) => {
                let entry = lock(pending).complete(id);
                match entry {
                    Some(entry) => {
                        tracing::debug!(generation, id, kind = %entry.kind, ok = result.is_ok(), "compute reply routed");
                        entry.settle(result.map_err(Into::into));
                    }
                    None => tracing::debug!(generation, id, "ignoring late reply for settled request"),
                }
            }
            Some(RouterMessage::Fatal { reason }) => {
                let drained = lock(pending).close(ChannelError::Crashed { reason: reason.clone() });
                tracing::warn!(generation, rejected = drained.len(), %reason, "compute context crashed");
                for (_, entry) in drained {
                    entry.settle(Err(ChannelError::Crashed { reason: reason.clone() }.into()));
                }
                return;
            }
            Some(RouterMessage::Shutdown) => return,
            Some(RouterMessage::Registered) | None => {}
        }

        let expired = {
            let mut table = lock(pending);
            let expired = table.expire(Instant::now());
            if !expired.is_empty() && !table.is_stalled() {
                table.stall();
                tracing::warn!(generation, "compute context stalled; later requests go to a fresh context");
            }
            expired
        };
        for (id, entry) in expired {
            tracing::warn!(generation, id, kind = %entry.kind, timeout_ms = entry.timeout.as_millis() as u64, "compute request timed out");
            let after = entry.timeout;
            entry.settle(Err(ChannelError::Timeout { id, after }.into()));
        }
    }
}

pub(crate) fn panic_payload_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else {
        "unknown panic".to_string()
    }
}
