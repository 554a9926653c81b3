//! Utility functions and helpers.

use std::sync::OnceLock;

use regex::Regex;

/// Strip every non-digit character and parse what remains.
///
/// Price cells arrive as "1,234,567원", "₩550,000" or plain numbers
/// depending on the site; all of them reduce to the same minor-unit integer.
/// Empty or digit-free input parses as 0.
pub fn extract_digits(text: &str) -> u64 {
    static NON_DIGIT: OnceLock<Regex> = OnceLock::new();
    let re = NON_DIGIT.get_or_init(|| Regex::new(r"[^0-9]").unwrap());
    let cleaned = re.replace_all(text, "");
    cleaned.parse().unwrap_or(0)
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_digits() {
        assert_eq!(extract_digits("1,234,567원"), 1_234_567);
        assert_eq!(extract_digits("₩550,000"), 550_000);
        assert_eq!(extract_digits("42"), 42);
        assert_eq!(extract_digits(""), 0);
        assert_eq!(extract_digits("출고가 미정"), 0);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  갤럭시  S24   Ultra "), "갤럭시 S24 Ultra");
        assert_eq!(normalize_whitespace("iPhone\n15\tPro"), "iPhone 15 Pro");
    }
}
