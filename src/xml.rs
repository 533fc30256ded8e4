//! Splitting of concatenated XML results
//!
//! A single `execute` call returns every result item serialized into one
//! string. Older callers cut that string apart wherever a closing `>` meets
//! an opening `<`. The heuristic misreads adjacent text items and is kept
//! only for compatibility; [`crate::Query::iter`] delimits items exactly.

use regex::Regex;
use std::sync::OnceLock;

fn boundary() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    BOUNDARY.get_or_init(|| Regex::new(r">\W?<").expect("boundary pattern is valid"))
}

/// Splits `result` between `>` and `<`, dropping at most one non-word
/// character found between them.
pub fn split_concatenated(result: &str) -> Vec<String> {
    if result.is_empty() {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut start = 0;
    for m in boundary().find_iter(result) {
        items.push(result[start..m.start() + 1].to_string());
        start = m.end() - 1;
    }
    items.push(result[start..].to_string());
    items
}
