//! Small text helpers shared by the classifier, sanitizer and assembler.
//!
//! Static patterns are declared with [`lazy_pattern!`]. A pattern that
//! fails to compile becomes `None` and every helper treats it as matching
//! nothing, so a bad literal can never take a request down.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

/// Declare a lazily compiled `static NAME: LazyLock<Option<Regex>>`.
macro_rules! lazy_pattern {
    ($(#[$meta:meta])* $vis:vis $name:ident, $re:expr) => {
        $(#[$meta])*
        $vis static $name: std::sync::LazyLock<Option<regex::Regex>> =
            std::sync::LazyLock::new(|| regex::Regex::new($re).ok());
    };
}

pub(crate) use lazy_pattern;

pub type Pattern = LazyLock<Option<Regex>>;

/// Replace every match of `pattern` with the literal `with`.
pub fn replace_all(pattern: &Pattern, text: &str, with: &str) -> String {
    match pattern.as_ref() {
        Some(re) => re.replace_all(text, NoExpand(with)).into_owned(),
        None => text.to_string(),
    }
}

pub fn is_match(pattern: &Pattern, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// `true` when `haystack` contains any of `needles`. Callers lower-case both.
pub fn contains_any<S: AsRef<str>>(haystack: &str, needles: &[S]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_ref()))
}

/// Cut `text` to at most `max` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}...", &text[..byte]),
        None => text.to_string(),
    }
}

/// Like [`truncate_chars`] but the result, marker included, fits in `max`
/// characters and the cut falls on whitespace when there is any.
pub fn truncate_at_word(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let end = text
        .char_indices()
        .nth(keep)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..end];
    let head = match head.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };
    format!("{}...", head.trim_end())
}

/// Collapse runs of whitespace to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    lazy_pattern!(DIGITS, r"\d+");
    lazy_pattern!(BROKEN, r"(unclosed");

    #[test]
    fn test_replace_all_is_literal() {
        assert_eq!(replace_all(&DIGITS, "a1b22", "$0"), "a$0b$0");
    }

    #[test]
    fn test_broken_pattern_matches_nothing() {
        assert!(BROKEN.is_none());
        assert!(!is_match(&BROKEN, "(unclosed"));
        assert_eq!(replace_all(&BROKEN, "keep", ""), "keep");
    }

    #[test]
    fn test_truncate_chars_marks_cut() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("°°°°", 2), "°°...");
    }

    #[test]
    fn test_truncate_at_word_fits_limit() {
        let out = truncate_at_word("monitor the patient closely overnight", 20);
        assert!(out.chars().count() <= 20);
        assert!(out.ends_with("..."));
        assert_eq!(out, "monitor the...");
        assert_eq!(truncate_at_word("short", 20), "short");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b\n c "), "a b c");
    }
}
