//! Helpers for the static regex tables used across the pipeline.

use regex::Regex;

/// Compile `pattern`, logging and skipping it when invalid.
pub(crate) fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "skipping invalid pattern");
            None
        }
    }
}

/// Compile every valid pattern in `patterns`, preserving order.
pub(crate) fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| compile(p)).collect()
}

/// Whether any pattern in `table` matches `text`.
pub(crate) fn any_match(table: &[Regex], text: &str) -> bool {
    table.iter().any(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_patterns_are_skipped() {
        let table = compile_all(&[r"\d+", r"(unclosed", r"[a-z]+"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn any_match_checks_all() {
        let table = compile_all(&[r"^foo", r"bar$"]);
        assert!(any_match(&table, "xbar"));
        assert!(!any_match(&table, "baz"));
    }
}
