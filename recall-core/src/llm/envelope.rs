//! Response envelope handling.
//!
//! The wire contract with every model: free text may surround a single
//! `<output>…</output>` block carrying the payload. Extraction takes the
//! first block by non-greedy match; what the payload means (plain text,
//! JSON array, JSON object) is stage-specific.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::constants::NOTHING_TO_REMEMBER;
use crate::error::{Error, Result};

fn output_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"(?s)<output>(.*?)</output>").expect("envelope regex is valid")
    })
}

/// Extract the first `<output>` block, trimmed.
///
/// Returns `None` when the response carries no block at all.
#[must_use]
pub fn extract_output(text: &str) -> Option<String> {
    output_block_regex()
        .captures(text)
        .map(|captures| captures[1].trim().to_string())
}

/// Extract the payload with the raw-text fallback used by normalization:
/// no `<output>` block falls back to the full text, provided it is non-empty
/// and not the `NOTHING_TO_REMEMBER` sentinel.
#[must_use]
pub fn extract_output_or_raw(text: &str) -> Option<String> {
    if let Some(payload) = extract_output(text) {
        return Some(payload);
    }
    let raw = text.trim();
    if raw.is_empty() || raw == NOTHING_TO_REMEMBER {
        return None;
    }
    Some(raw.to_string())
}

/// Whether the response is the nothing-to-remember sentinel (inside the
/// envelope or bare).
#[must_use]
pub fn is_nothing_to_remember(text: &str) -> bool {
    match extract_output(text) {
        Some(payload) => payload == NOTHING_TO_REMEMBER,
        None => text.trim() == NOTHING_TO_REMEMBER,
    }
}

/// Parse the envelope payload as JSON.
///
/// Used by the stages whose contract is a JSON verdict. A missing block or
/// malformed payload is a [`Error::Parse`]; callers decide the fallback
/// (resolvers keep their input unchanged).
pub fn parse_json_output<T: DeserializeOwned>(text: &str) -> Result<T> {
    let payload =
        extract_output(text).ok_or_else(|| Error::Parse("response has no <output> block".into()))?;
    serde_json::from_str(&payload)
        .map_err(|e| Error::Parse(format!("invalid JSON in <output> block: {e}")))
}
