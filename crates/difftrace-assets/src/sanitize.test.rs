#![cfg(test)]

use serde_json::{Value, json};

use super::*;

#[test]
fn rewrites_bare_literals_but_not_quoted_ones() {
    let input = r#"{"a": NaN, "b": "NaN", "c": [Infinity, -Infinity]}"#;
    assert_eq!(
        sanitize_numeric_literals(input),
        r#"{"a": null, "b": "NaN", "c": [null, null]}"#
    );
}

#[test]
fn escaped_quotes_do_not_end_the_string() {
    let input = r#"{"label": "say \"NaN\" Infinity", "v":NaN}"#;
    assert_eq!(
        sanitize_numeric_literals(input),
        r#"{"label": "say \"NaN\" Infinity", "v":null}"#
    );
}

#[test]
fn identifiers_containing_literals_are_untouched() {
    let input = "[NaNx, xInfinity, -Infinityy]";
    assert!(matches!(sanitize_numeric_literals(input), Cow::Borrowed(_)));
}

#[test]
fn literals_at_document_edges_are_rewritten() {
    assert_eq!(sanitize_numeric_literals("NaN"), "null");
    assert_eq!(sanitize_numeric_literals("-Infinity"), "null");
    assert_eq!(sanitize_numeric_literals("[\nInfinity\n]"), "[\nnull\n]");
}

#[test]
fn well_formed_input_is_borrowed() {
    let input = r#"{"value": 1.5, "name": "Infinity"}"#;
    assert!(matches!(sanitize_numeric_literals(input), Cow::Borrowed(_)));
}

#[test]
fn sanitising_twice_changes_nothing_more() {
    let once = sanitize_numeric_literals("[NaN, 1, Infinity]").into_owned();
    assert_eq!(sanitize_numeric_literals(&once), once.as_str());
}

#[test]
fn parse_falls_back_to_sanitised_text() {
    let value: Value = parse_with_sanitization(r#"{"norms": [1.0, NaN, -Infinity]}"#, "metrics.json").expect("parses after sanitising");
    assert_eq!(value, json!({"norms": [1.0, null, null]}));
}

#[test]
fn parse_error_names_label_and_original_reason() {
    let err = parse_with_sanitization::<Value>(r#"{"a": NaN,"#, "metrics.json").expect_err("truncated document");
    assert_eq!(err.label, "metrics.json");
    assert!(!err.original.is_empty());
    assert!(err.to_string().contains("metrics.json"));
}

#[test]
fn parse_without_literals_reports_original_failure() {
    let err = parse_with_sanitization::<Value>("{oops}", "latent_pca.json").expect_err("invalid JSON");
    assert!(err.to_string().contains("latent_pca.json"));
    assert!(err.original.contains("key must be a string"));
}
