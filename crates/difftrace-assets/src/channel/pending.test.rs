#![cfg(test)]

use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, bounded};

use super::*;
use crate::error::AssetError;

fn pending(deadline: Instant) -> (PendingRequest, Receiver<CallResult>) {
    let (reply, rx) = bounded(1);
    let request = PendingRequest {
        reply,
        kind: RequestKind::DecodeSelf,
        deadline,
        timeout: Duration::from_millis(10),
    };
    (request, rx)
}

#[test]
fn expire_only_removes_overdue_entries() {
    let now = Instant::now();
    let mut table = PendingTable::default();
    let (early, _rx_early) = pending(now);
    let (late, _rx_late) = pending(now + Duration::from_secs(60));
    assert!(table.register(1, early).is_ok());
    assert!(table.register(2, late).is_ok());

    let expired = table.expire(now);
    assert_eq!(expired.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1]);
    assert!(!table.contains(1));
    assert!(table.contains(2));
    assert_eq!(table.next_deadline(), Some(now + Duration::from_secs(60)));
}

#[test]
fn closed_table_refuses_registration_and_keeps_first_reason() {
    let mut table = PendingTable::default();
    let (first, rx) = pending(Instant::now());
    assert!(table.register(7, first).is_ok());

    let drained = table.close(ChannelError::Crashed { reason: "boom".into() });
    assert_eq!(drained.len(), 1);
    for (_, request) in drained {
        request.settle(Err(ChannelError::Terminated.into()));
    }
    assert!(matches!(rx.recv(), Ok(Err(AssetError::Channel(ChannelError::Terminated)))));

    table.close(ChannelError::Terminated);
    assert_eq!(table.closed_reason(), Some(&ChannelError::Crashed { reason: "boom".into() }));

    let (second, _rx) = pending(Instant::now());
    assert!(table.register(8, second).is_err());
    assert_eq!(table.len(), 0);
}

#[test]
fn stalled_table_keeps_accepted_entries_but_refuses_new_ones() {
    let now = Instant::now();
    let mut table = PendingTable::default();
    let (accepted, _rx) = pending(now + Duration::from_secs(60));
    assert!(table.register(1, accepted).is_ok());

    table.stall();
    assert!(table.is_stalled());
    assert!(table.closed_reason().is_none());
    let (late, _rx_late) = pending(now);
    assert!(table.register(2, late).is_err());

    assert!(table.contains(1));
    assert!(table.complete(1).is_some());
    assert_eq!(table.len(), 0);
}
