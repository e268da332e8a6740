//! Whitelist check for user-supplied queries.

use std::sync::LazyLock;

use regex::Regex;

static QUERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9 +]*$").expect("query pattern is a valid regex"));

/// Returns true iff every character of `raw` is an ASCII digit, a space or `+`.
///
/// The empty string is valid. No trimming or normalization is applied: the
/// check only keeps arbitrary text out of the command line, the computation
/// does its own parsing.
pub fn is_valid_query(raw: &str) -> bool {
    QUERY_RE.is_match(raw)
}

/// Applies the grammar and an optional byte cap.
pub fn accept_query(raw: &str, max_bytes: Option<usize>) -> bool {
    if let Some(limit) = max_bytes
        && raw.len() > limit
    {
        return false;
    }
    is_valid_query(raw)
}
