//! Known-value correction rules.
//!
//! Some corpus passages and many model completions quote a neonatal heart
//! rate range that disagrees with the institution's reference text. Instead
//! of dropping those sentences the sanitizer rewrites the range in place.
//!
//! Rules are applied in table order. Each firing is logged with the rule id
//! and the table version so that a changed answer can be traced back to the
//! exact rule that changed it.

use tracing::info;

use crate::text::{is_match, lazy_pattern, replace_all, Pattern};

/// Bumped whenever a rule is added, removed or reworded.
pub const RULESET_VERSION: u32 = 3;

/// One `(bad_pattern, corrected_text, rationale)` row.
pub struct CorrectionRule {
    pub id: &'static str,
    pub pattern: &'static Pattern,
    /// Literal replacement; empty removes the match.
    pub replacement: &'static str,
    pub rationale: &'static str,
}

lazy_pattern!(HR_BETWEEN, r"(?i)between 100 and 160 beats per minute");
lazy_pattern!(HR_BPM, r"(?i)100-160 bpm");
lazy_pattern!(HR_BEATS, r"(?i)100 and 160 beats");
lazy_pattern!(WEIGHT_GAIN, r"(?i)weight gain.*neonates.*1-2 pounds.*month");

pub static CORRECTION_RULES: &[CorrectionRule] = &[
    CorrectionRule {
        id: "neonatal-hr-between",
        pattern: &HR_BETWEEN,
        replacement: "120-180 beats per minute",
        rationale: "neonatal heart rate reference range is 120-180 bpm",
    },
    CorrectionRule {
        id: "neonatal-hr-bpm",
        pattern: &HR_BPM,
        replacement: "120-180 bpm",
        rationale: "neonatal heart rate reference range is 120-180 bpm",
    },
    CorrectionRule {
        id: "neonatal-hr-beats",
        pattern: &HR_BEATS,
        replacement: "120-180 beats",
        rationale: "neonatal heart rate reference range is 120-180 bpm",
    },
    CorrectionRule {
        id: "neonatal-weight-gain",
        pattern: &WEIGHT_GAIN,
        replacement: "",
        rationale: "unsourced neonatal weight gain figure",
    },
];

/// Apply every rule in order. Returns the corrected text and the ids of the
/// rules that fired.
pub fn apply_corrections(text: &str) -> (String, Vec<&'static str>) {
    let mut out = text.to_string();
    let mut fired = Vec::new();

    for rule in CORRECTION_RULES {
        if !is_match(rule.pattern, &out) {
            continue;
        }
        out = replace_all(rule.pattern, &out, rule.replacement);
        info!(
            rule = rule.id,
            version = RULESET_VERSION,
            rationale = rule.rationale,
            "correction rule fired"
        );
        fired.push(rule.id);
    }

    (out, fired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        for rule in CORRECTION_RULES {
            assert!(rule.pattern.is_some(), "rule {} failed to compile", rule.id);
        }
    }

    #[test]
    fn test_incorrect_range_rewritten_not_removed() {
        let (out, fired) =
            apply_corrections("A newborn has a heart rate BETWEEN 100 AND 160 beats per minute.");
        assert_eq!(out, "A newborn has a heart rate 120-180 beats per minute.");
        assert_eq!(fired, vec!["neonatal-hr-between"]);
    }

    #[test]
    fn test_rules_fire_in_order_once_each() {
        let (out, fired) = apply_corrections("range 100-160 bpm; also 100 and 160 beats");
        assert_eq!(out, "range 120-180 bpm; also 120-180 beats");
        assert_eq!(fired, vec!["neonatal-hr-bpm", "neonatal-hr-beats"]);
    }

    #[test]
    fn test_weight_gain_removed() {
        let (out, fired) =
            apply_corrections("Weight gain in neonates is 1-2 pounds per month\nFeed on demand.");
        assert_eq!(out, "\nFeed on demand.");
        assert_eq!(fired, vec!["neonatal-weight-gain"]);
    }

    #[test]
    fn test_corrected_text_is_stable() {
        let (once, _) = apply_corrections("between 100 and 160 beats per minute");
        let (twice, fired) = apply_corrections(&once);
        assert_eq!(once, twice);
        assert!(fired.is_empty());
    }
}
