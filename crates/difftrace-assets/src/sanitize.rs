//! Tolerant JSON ingestion for exported metrics.
//!
//! Exporters occasionally write `NaN`, `Infinity` and `-Infinity` as bare
//! literals. These are rewritten to `null` outside string literals before a
//! second parse attempt.

use std::borrow::Cow;

use serde::de::DeserializeOwned;

use crate::error::ParseError;

// Longest first so `-Infinity` wins over `Infinity`.
const NON_FINITE_LITERALS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

/// Replace token-delimited non-finite literals outside strings with `null`.
///
/// Returns the input unchanged (borrowed) when nothing needed rewriting.
pub fn sanitize_numeric_literals(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let mut rewritten: Option<String> = None;
    let mut copied_to = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if byte == b'"' {
            in_string = true;
            i += 1;
            continue;
        }

        if let Some(literal) = literal_at(bytes, i) {
            let out = rewritten.get_or_insert_with(|| String::with_capacity(text.len()));
            out.push_str(&text[copied_to..i]);
            out.push_str("null");
            i += literal.len();
            copied_to = i;
            continue;
        }
        i += 1;
    }

    match rewritten {
        Some(mut out) => {
            out.push_str(&text[copied_to..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(text),
    }
}

/// Parse `text` directly, falling back to a sanitised re-parse.
///
/// `label` names the document in the error when both attempts fail.
pub fn parse_with_sanitization<T: DeserializeOwned>(text: &str, label: &str) -> Result<T, ParseError> {
    let original = match serde_json::from_str(text) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let sanitized = sanitize_numeric_literals(text);
    if matches!(sanitized, Cow::Borrowed(_)) {
        return Err(ParseError {
            label: label.to_string(),
            original: original.to_string(),
            sanitized: "no non-finite literals to rewrite".to_string(),
        });
    }

    serde_json::from_str(&sanitized).map_err(|err| ParseError {
        label: label.to_string(),
        original: original.to_string(),
        sanitized: err.to_string(),
    })
}

fn literal_at(bytes: &[u8], at: usize) -> Option<&'static str> {
    NON_FINITE_LITERALS.into_iter().find(|literal| {
        bytes[at..].starts_with(literal.as_bytes())
            && is_token_boundary(at.checked_sub(1).map(|prev| bytes[prev]))
            && is_token_boundary(bytes.get(at + literal.len()).copied())
    })
}

fn is_token_boundary(neighbour: Option<u8>) -> bool {
    match neighbour {
        None => true,
        Some(byte) => byte.is_ascii_whitespace() || matches!(byte, b'[' | b']' | b'{' | b'}' | b':' | b','),
    }
}

#[cfg(test)]
#[path = "sanitize.test.rs"]
mod tests;
