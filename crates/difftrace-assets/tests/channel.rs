mod common;

use std::{
    sync::Arc, thread, time::{Duration, Instant}
};

use common::encode_f16;
use crossbeam::channel::{Receiver, Sender, unbounded};
use difftrace_assets::{
    AssetError, ChannelError, ComputeChannel, ComputeHandler, ComputeOutput, ComputeRequest, ContextState, DecodeError, DecoderHandler
};

/// Entropy requests park on a gate; with `explode` set they panic once released.
struct GatedHandler {
    gate: Receiver<()>,
    explode: bool,
}

impl ComputeHandler for GatedHandler {
    fn handle(&self, request: ComputeRequest) -> Result<ComputeOutput, DecodeError> {
        if let ComputeRequest::Entropy { .. } = request {
            let _ = self.gate.recv_timeout(Duration::from_secs(5));
            if self.explode {
                panic!("decoder exploded");
            }
        }
        DecoderHandler.handle(request)
    }
}

fn gated_channel(timeout: Duration, explode: bool) -> (ComputeChannel, Sender<()>) {
    let (gate_tx, gate_rx) = unbounded();
    let handler = Arc::new(GatedHandler { gate: gate_rx, explode });
    (ComputeChannel::with_handler(timeout, handler), gate_tx)
}

fn small_self_buffer() -> Arc<[u8]> {
    Arc::from(encode_f16(&[0.25, 0.5, 0.75, 1.0]))
}

#[test]
fn lazily_provisions_context_and_decodes() {
    let channel = ComputeChannel::new(Duration::from_secs(5));
    assert_eq!(channel.state(), ContextState::Idle);

    let map = channel.decode_self(small_self_buffer(), vec![2, 2]).unwrap();
    assert_eq!(map.shape, [2, 2]);
    assert_eq!(map.map, vec![0.25, 0.5, 0.75, 1.0]);
    assert_eq!(channel.state(), ContextState::Active);
    assert_eq!(channel.provisioned_contexts(), 1);
}

#[test]
fn validation_errors_cross_the_boundary_typed() {
    let channel = ComputeChannel::new(Duration::from_secs(5));
    let buffer: Arc<[u8]> = Arc::from(encode_f16(&[0.0; 12]));

    let err = channel.decode_cross(buffer.clone(), vec![3, 2, 2], 3).unwrap_err();
    assert!(matches!(
        err,
        AssetError::Decode(DecodeError::TokenOutOfBounds { index: 3, num_tokens: 3 })
    ));
    assert!(!err.is_retryable());

    // A rejected request does not take the context down.
    let map = channel.decode_cross(buffer, vec![3, 2, 2], 2).unwrap();
    assert_eq!(map.shape, [2, 2]);
    assert_eq!(channel.provisioned_contexts(), 1);
}

#[test]
fn unanswered_request_times_out_and_leaves_the_table() {
    let timeout = Duration::from_millis(150);
    let (channel, gate) = gated_channel(timeout, false);

    let started = Instant::now();
    let call = channel.request(ComputeRequest::Entropy { map: Arc::from(vec![1.0f32; 4]) }).unwrap();
    let id = call.id();
    assert!(channel.is_pending(id));

    let err = call.wait().unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(err, AssetError::Channel(ChannelError::Timeout { id: timed_out, after }) if timed_out == id && after == timeout));
    assert!(err.is_retryable());
    assert!(elapsed >= timeout, "rejected early after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "rejected late after {elapsed:?}");
    assert!(!channel.is_pending(id));
    assert_eq!(channel.state(), ContextState::Stalled);
}

#[test]
fn requests_after_a_timeout_bypass_the_wedged_worker() {
    let (channel, gate) = gated_channel(Duration::from_millis(150), false);
    let stuck = channel.request(ComputeRequest::Entropy { map: Arc::from(vec![1.0f32; 4]) }).unwrap();
    assert!(matches!(stuck.wait(), Err(AssetError::Channel(ChannelError::Timeout { .. }))));

    // The first worker is still parked on the gate; this must not queue behind it.
    let started = Instant::now();
    let map = channel.decode_self(small_self_buffer(), vec![2, 2]).unwrap();
    assert_eq!(map.shape, [2, 2]);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(channel.state(), ContextState::Active);
    assert_eq!(channel.provisioned_contexts(), 2);

    // The late reply lands on the stalled context and is ignored.
    gate.send(()).unwrap();
    let map = channel.decode_self(small_self_buffer(), vec![2, 2]).unwrap();
    assert_eq!(map.map.len(), 4);
    assert_eq!(channel.provisioned_contexts(), 2);
    assert_eq!(channel.pending_count(), 0);
}

#[test]
fn crash_rejects_every_pending_request_then_recovers() {
    let (channel, gate) = gated_channel(Duration::from_secs(10), true);
    let entropy = || ComputeRequest::Entropy { map: Arc::from(vec![1.0f32; 4]) };

    let calls: Vec<_> = (0..3).map(|_| channel.request(entropy()).unwrap()).collect();
    assert_eq!(channel.pending_count(), 3);

    gate.send(()).unwrap();
    for call in calls {
        match call.wait() {
            Err(AssetError::Channel(ChannelError::Crashed { reason })) => assert!(reason.contains("decoder exploded")),
            other => panic!("expected crash rejection, got {other:?}"),
        }
    }
    assert_eq!(channel.state(), ContextState::Crashed);

    let map = channel.decode_self(small_self_buffer(), vec![2, 2]).unwrap();
    assert_eq!(map.map.len(), 4);
    assert_eq!(channel.state(), ContextState::Active);
    assert_eq!(channel.provisioned_contexts(), 2);
}

#[test]
fn dispose_terminates_pending_and_resets_ids() {
    let (channel, gate) = gated_channel(Duration::from_secs(10), false);

    let first = channel.request(ComputeRequest::Entropy { map: Arc::from(vec![1.0f32; 4]) }).unwrap();
    let second = channel.request(ComputeRequest::Entropy { map: Arc::from(vec![2.0f32; 4]) }).unwrap();
    assert_eq!((first.id(), second.id()), (1, 2));

    channel.dispose();
    assert_eq!(channel.state(), ContextState::Idle);
    for call in [first, second] {
        assert!(matches!(call.wait(), Err(AssetError::Channel(ChannelError::Terminated))));
    }

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    let again = channel.request(ComputeRequest::DecodeSelf { buffer: small_self_buffer(), shape: vec![2, 2] }).unwrap();
    assert_eq!(again.id(), 1);
    assert!(again.wait().unwrap().into_map().is_some());
    assert_eq!(channel.provisioned_contexts(), 2);
}

#[test]
fn concurrent_callers_receive_their_own_replies() {
    let channel = ComputeChannel::new(Duration::from_secs(10));

    thread::scope(|scope| {
        for caller in 0..8u16 {
            let channel = &channel;
            scope.spawn(move || {
                for round in 0..10u16 {
                    let value = f32::from(caller * 16 + round);
                    let map = channel.decode_self(Arc::from(encode_f16(&[value; 4])), vec![2, 2]).unwrap();
                    assert_eq!(map.map, vec![value; 4], "caller {caller} round {round}");
                }
            });
        }
    });

    assert_eq!(channel.pending_count(), 0);
    assert_eq!(channel.provisioned_contexts(), 1);
}

#[test]
fn divergence_and_entropy_round_trip() {
    let channel = ComputeChannel::new(Duration::from_secs(5));
    let uniform: Arc<[f32]> = Arc::from(vec![1.0f32; 4]);
    let peaked: Arc<[f32]> = Arc::from(vec![1.0f32, 0.0, 0.0, 0.0]);

    assert_eq!(channel.js_divergence(uniform.clone(), uniform.clone()).unwrap(), 0.0);
    let jsd = channel.js_divergence(uniform.clone(), peaked).unwrap();
    assert!(jsd > 0.0 && jsd <= std::f64::consts::LN_2);
    assert!((channel.entropy(uniform).unwrap() - 4f64.ln()).abs() < 1e-9);

    let err = channel.js_divergence(Arc::from(vec![1.0f32; 3]), Arc::from(vec![1.0f32; 4])).unwrap_err();
    assert!(matches!(
        err,
        AssetError::Decode(DecodeError::DivergenceLengthMismatch { left: 3, right: 4 })
    ));
}
