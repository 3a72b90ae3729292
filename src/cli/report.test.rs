#![cfg(test)]

use difftrace_assets::AttentionMap;

use super::*;

#[test]
fn test_validation_report_strictness() {
    let mut report = ValidationReport::new("runs/demo");
    assert!(report.passed(true));

    report.warnings.push("metadata.images length mismatch (expected 24, got 20)".to_string());
    assert!(report.passed(false));
    assert!(!report.passed(true));

    report.errors.push("missing attention file: attention/cross/a.bin".to_string());
    assert!(!report.passed(false));
    assert_eq!(
        report.to_string(),
        "dataset: runs/demo\nerrors:\n  - missing attention file: attention/cross/a.bin\nwarnings:\n  - metadata.images length mismatch (expected 24, got 20)\n"
    );
}

#[test]
fn test_map_summary_skips_non_finite_cells() {
    let map = AttentionMap {
        map: vec![1.0, 3.0, f32::NAN, f32::INFINITY],
        shape: [2, 2],
    };
    let summary = MapSummary::from_map("cross:mid:5:2".to_string(), &map, Some(0.5));
    assert_eq!(summary.min, Some(1.0));
    assert_eq!(summary.max, Some(3.0));
    assert_eq!(summary.mean, Some(2.0));
    assert_eq!(summary.non_finite, 2);
    assert!(summary.to_string().contains("shape:   2x2"));
}

#[test]
fn test_divergence_report_marks_missing_maps() {
    let report = DivergenceReport {
        layer: "mid".to_string(),
        token: 1,
        step_a: 5,
        step_b: 9,
        divergence: None,
    };
    assert_eq!(report.to_string(), "js divergence cross:mid token 1 step 5 vs 9: n/a");
}
