#![cfg(test)]

use half::f16;

use super::*;

fn pack(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| f16::from_f32(*v).to_bits().to_le_bytes()).collect()
}

#[test]
fn special_bit_patterns_decode_to_ieee_values() {
    assert_eq!(f16_to_f32(0x0000), 0.0);
    assert!(f16_to_f32(0x8000).is_sign_negative());
    assert_eq!(f16_to_f32(0x7C00), f32::INFINITY);
    assert_eq!(f16_to_f32(0xFC00), f32::NEG_INFINITY);
    assert!(f16_to_f32(0x7E00).is_nan());
    assert!(f16_to_f32(0xFC01).is_nan());
    assert_eq!(f16_to_f32(0x3C00), 1.0);
    assert_eq!(f16_to_f32(0xC000), -2.0);
    assert_eq!(f16_to_f32(0x7BFF), 65504.0);
    assert_eq!(f16_to_f32(0x0001), 2f32.powi(-24));
    assert_eq!(f16_to_f32(0x03FF), 1023.0 * 2f32.powi(-24));
}

#[test]
fn every_finite_word_reencodes_to_itself() {
    let buffer: Vec<u8> = (0..=u16::MAX).flat_map(u16::to_le_bytes).collect();
    let decoded = decode_half_slice(&buffer, 0, 1 << 16).expect("whole range decodes");

    for (bits, value) in (0..=u16::MAX).zip(decoded) {
        if value.is_nan() {
            assert_eq!(bits & 0x7C00, 0x7C00, "word {bits:#06x} is not a NaN pattern");
            assert_ne!(bits & 0x03FF, 0, "word {bits:#06x} is not a NaN pattern");
            continue;
        }
        assert_eq!(f16::from_f32(value).to_bits(), bits, "word {bits:#06x}");
    }
}

#[test]
fn cross_slice_returns_requested_token_plane() {
    let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let buffer = pack(&values);

    let decoded = decode_cross_slice(&buffer, &[3, 2, 2], 1).expect("token 1 decodes");
    assert_eq!(decoded.shape, [2, 2]);
    assert_eq!(decoded.map, vec![4.0, 5.0, 6.0, 7.0]);
    assert_eq!(decoded.at(1, 0), Some(6.0));
    assert_eq!(decoded.at(2, 0), None);
}

#[test]
fn cross_slice_rejects_out_of_bounds_token() {
    let buffer = pack(&[0.0; 12]);
    let err = decode_cross_slice(&buffer, &[3, 2, 2], 3).expect_err("token 3 is out of bounds");
    assert_eq!(err, DecodeError::TokenOutOfBounds { index: 3, num_tokens: 3 });
}

#[test]
fn cross_slice_rejects_short_buffer() {
    let buffer = pack(&[0.0; 10]);
    let err = decode_cross_slice(&buffer, &[3, 2, 2], 0).expect_err("10 words cannot hold [3,2,2]");
    assert_eq!(
        err,
        DecodeError::LengthMismatch {
            shape: vec![3, 2, 2],
            expected: 12,
            actual: 10,
        }
    );
}

#[test]
fn cross_slice_rejects_malformed_shapes() {
    let buffer = pack(&[0.0; 4]);
    assert!(matches!(
        decode_cross_slice(&buffer, &[2, 2], 0),
        Err(DecodeError::MalformedShape { kind: "cross", .. })
    ));
    assert!(matches!(
        decode_cross_slice(&buffer, &[1, 0, 4], 0),
        Err(DecodeError::MalformedShape { kind: "cross", .. })
    ));
}

#[test]
fn self_slice_decodes_whole_buffer() {
    let buffer = pack(&[0.5, 0.25, 0.125, 1.0, 2.0, 4.0]);
    let decoded = decode_self_slice(&buffer, &[2, 3]).expect("self map decodes");
    assert_eq!(decoded.shape, [2, 3]);
    assert_eq!(decoded.map, vec![0.5, 0.25, 0.125, 1.0, 2.0, 4.0]);

    assert!(matches!(
        decode_self_slice(&buffer, &[3, 3]),
        Err(DecodeError::LengthMismatch { expected: 9, actual: 6, .. })
    ));
    assert!(matches!(decode_self_slice(&buffer, &[6]), Err(DecodeError::MalformedShape { .. })));
}

#[test]
fn odd_byte_buffers_are_rejected() {
    let err = decode_half_slice(&[0u8; 5], 0, 1).expect_err("odd length");
    assert_eq!(err, DecodeError::OddByteLength { bytes: 5 });
}

#[test]
fn half_slice_checks_range() {
    let buffer = pack(&[1.0, 2.0, 3.0]);
    assert_eq!(decode_half_slice(&buffer, 1, 2).expect("in range"), vec![2.0, 3.0]);
    assert_eq!(
        decode_half_slice(&buffer, 2, 2),
        Err(DecodeError::SliceOutOfRange { start: 2, len: 2, words: 3 })
    );
    assert!(decode_half_slice(&buffer, usize::MAX, 2).is_err());
}

#[test]
fn divergence_is_symmetric_and_zero_on_identity() {
    let p = [0.1f32, 0.4, 0.3, 0.2];
    let q = [0.25f32, 0.25, 0.0, 0.5];

    let pq = js_divergence(&p, &q).expect("same length");
    let qp = js_divergence(&q, &p).expect("same length");
    assert!((pq - qp).abs() < 1e-12);
    assert!(pq > 0.0);
    assert!(js_divergence(&p, &p).expect("same length").abs() < 1e-12);
}

#[test]
fn divergence_of_disjoint_extremes_is_bounded() {
    let value = js_divergence(&[1.0, 0.0], &[0.0, 1.0]).expect("same length");
    assert!(value.is_finite());
    assert!(value <= std::f64::consts::LN_2 + 1e-12);
    assert!(value > 0.69);
}

#[test]
fn divergence_tolerates_non_finite_inputs() {
    let value = js_divergence(&[f32::NAN, 1.0], &[0.0, f32::INFINITY]).expect("same length");
    assert!(value.is_finite());
}

#[test]
fn divergence_rejects_mismatched_lengths() {
    assert_eq!(
        js_divergence(&[1.0, 2.0], &[1.0]),
        Err(DecodeError::DivergenceLengthMismatch { left: 2, right: 1 })
    );
}

#[test]
fn entropy_of_uniform_map_is_log_n() {
    let value = entropy(&[3.0; 8]);
    assert!((value - 8f64.ln()).abs() < 1e-12);
    assert!(entropy(&[1.0, 0.0, 0.0, 0.0]) < 1e-5);
}
