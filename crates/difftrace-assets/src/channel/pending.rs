//! In-flight request bookkeeping for one compute context.

use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use rustc_hash::FxHashMap;

use super::message::{CallResult, RequestKind};
use crate::error::ChannelError;

pub(crate) struct PendingRequest {
    pub reply: Sender<CallResult>,
    pub kind: RequestKind,
    pub deadline: Instant,
    pub timeout: Duration,
}

impl PendingRequest {
    /// Deliver the outcome. The caller may have dropped its handle already.
    pub fn settle(self, result: CallResult) {
        let _ = self.reply.send(result);
    }
}

/// Pending requests keyed by id. Once closed or stalled, no further
/// registrations succeed.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: FxHashMap<u64, PendingRequest>,
    closed: Option<ChannelError>,
    stalled: bool,
}

impl PendingTable {
    /// Register a request, handing it back if the table is already closed.
    pub fn register(&mut self, id: u64, request: PendingRequest) -> Result<(), PendingRequest> {
        if self.closed.is_some() || self.stalled {
            return Err(request);
        }
        debug_assert!(!self.entries.contains_key(&id), "request id {id} reused while pending");
        self.entries.insert(id, request);
        Ok(())
    }

    pub fn complete(&mut self, id: u64) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    /// Remove and return every entry whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<(u64, PendingRequest)> {
        let overdue: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        overdue
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|pending| (id, pending)))
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|pending| pending.deadline).min()
    }

    /// Close the table and drain every entry so the caller can reject them.
    pub fn close(&mut self, reason: ChannelError) -> Vec<(u64, PendingRequest)> {
        self.closed.get_or_insert(reason);
        self.entries.drain().collect()
    }

    /// Refuse new work while letting entries already registered run out.
    pub fn stall(&mut self) {
        self.stalled = true;
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn closed_reason(&self) -> Option<&ChannelError> {
        self.closed.as_ref()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
#[path = "pending.test.rs"]
mod tests;
