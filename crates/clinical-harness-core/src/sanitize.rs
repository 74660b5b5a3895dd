//! Response sanitizer and fact extractor.
//!
//! Both model completions and raw corpus text go through the same fact
//! extraction core and come out as a short list of `• `-prefixed bullets.
//!
//! # Stages
//!
//! | # | Stage | Notes |
//! |---|-------|-------|
//! | 1 | noise stripping | code fences, quiz options, "all/none of the above", exercise and chapter headers, lead-in phrases |
//! | 2 | corrections | [`crate::corrections`] table, in order |
//! | 3 | prefixes | boilerplate openers such as "Here are" or "Answer:" |
//! | 4 | line extraction | canonical bullets, clinical lines promoted |
//! | 5 | bounds | at most 4 bullets; sentence fallback; "not available" |
//! | 6 | guard | [`crate::reference::guard`] swaps in a verified answer |
//! | 7 | extraction cap | 300 characters, whole bullets only |
//!
//! Stages 1-3 repeat until the text stops changing, and every emitted
//! bullet already satisfies each filter, so running the sanitizer on its
//! own output returns that output unchanged.

use tracing::debug;

use crate::corrections::apply_corrections;
use crate::reference::guard;
use crate::text::{
    collapse_whitespace, contains_any, is_match, lazy_pattern, replace_all, truncate_at_word,
};

/// Canonical bullet marker.
pub const BULLET: &str = "• ";

/// Maximum bullets produced by extraction.
pub const MAX_BULLETS: usize = 4;

/// Maximum characters of one bullet, marker excluded.
pub const MAX_BULLET_CHARS: usize = 200;

/// Cap on the joined answer in extraction mode.
pub const EXTRACTION_CHAR_CAP: usize = 300;

/// Text of the bullet emitted when nothing usable remains.
pub const NOT_AVAILABLE: &str = "• Not available";

const MAX_SENTENCE_BULLETS: usize = 3;
const MIN_SENTENCE_CHARS: usize = 10;
const MIN_BULLET_CHARS: usize = 3;
const MAX_PASSES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeMode {
    /// Language-model output.
    Completion,
    /// Raw corpus text; adds the joined-length cap.
    Extraction,
}

/// Outcome of one sanitizer run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SanitizedAnswer {
    pub bullets: Vec<String>,
    /// Ids of correction rules that fired.
    pub corrections: Vec<&'static str>,
    /// Id of the reference answer the guard substituted, if any.
    pub guard: Option<&'static str>,
    /// Bullets came from the sentence-splitting fallback.
    pub from_sentences: bool,
    /// Nothing usable; `bullets` holds the single not-available bullet.
    pub not_available: bool,
}

impl SanitizedAnswer {
    pub fn text(&self) -> String {
        self.bullets.join("\n")
    }
}

lazy_pattern!(CODE_FENCE, r"(?s)```.*?```");
lazy_pattern!(QUIZ_LINE, r"(?m)^[ \t]*(?:[•\-*][ \t]*)?[A-Da-d]\)[ \t].*$");
lazy_pattern!(QUIZ_INLINE, r"\s[A-D]\)\s[^•\n]*");
lazy_pattern!(ALL_NONE, r"(?i)\b(?:all|none) of the above\.?");
lazy_pattern!(
    HEADER_LINE,
    r"(?im)^.*(?:\bexercises?\b|\bchapter\s+\d+|#\s*solution|write .*python).*$"
);
lazy_pattern!(
    LEAD_IN,
    r"(?i)\b(?:red flag signs include|examples include|these include|such as|it is important|remember that|note that|consider)\b"
);
lazy_pattern!(LINE_MARKER, r"^(?:[•\-*]+|\d{1,2}[.)])(?:\s+|$)");
lazy_pattern!(DECORATION, r"^[#>]+\s*");
lazy_pattern!(QUIZ_CONTENT, r"^[A-Da-d]\)(?:\s|$)");
lazy_pattern!(
    SKIP_LINE,
    r"(?i)\b(?:chapter|communication|importance|examples?|exercises?|programming|coding|python|script|import)\b|\bdef |print\(|with statement|open and read|file\.txt|all of the above|none of the above"
);
lazy_pattern!(
    CLINICAL_UNIT,
    r"(?i)\d+(?:\.\d+)?\s*(?:mg|mcg|ml|kg|mmhg|bpm|%|°c|breaths|beats)"
);

const PREFIXES: &[&str] = &[
    "here are",
    "the key points are",
    "based on",
    "according to",
    "in summary",
    "to summarize",
    "the main",
    "key points:",
    "answer:",
    "response:",
    "bob's response:",
    "here's what",
    "these are",
];

const CLINICAL_KEYWORDS: &[&str] = &[
    "temperature",
    "°c",
    "mmhg",
    "bpm",
    "mg/kg",
    "rash",
    "consciousness",
    "distress",
    "failure",
    "within 24 hours",
    "hypotension",
    "hypertension",
    "assess",
    "monitor",
    "check",
    "observe",
    "signs",
    "symptoms",
    "treatment",
];

/// Clean language-model output.
pub fn sanitize_completion(raw: &str) -> SanitizedAnswer {
    run(raw, SanitizeMode::Completion)
}

/// Clean raw corpus text, or an assembled context when no completion exists.
pub fn extract_facts(raw: &str) -> SanitizedAnswer {
    run(raw, SanitizeMode::Extraction)
}

pub fn run(raw: &str, mode: SanitizeMode) -> SanitizedAnswer {
    let mut answer = SanitizedAnswer::default();

    // Stages 1-3.
    let mut text = raw.trim().to_string();
    for _ in 0..MAX_PASSES {
        let stripped = strip_noise(&text);
        let (corrected, fired) = apply_corrections(&stripped);
        for id in fired {
            if !answer.corrections.contains(&id) {
                answer.corrections.push(id);
            }
        }
        let next = strip_prefixes(&corrected);
        if next == text {
            break;
        }
        text = next;
    }

    // Stages 4-5.
    let mut bullets = extract_bullets(&text);
    if bullets.is_empty() {
        bullets = sentence_bullets(&text);
        answer.from_sentences = !bullets.is_empty();
    }
    if bullets.is_empty() {
        bullets = vec![NOT_AVAILABLE.to_string()];
        answer.not_available = true;
    }

    // Stage 6.
    if let Some(hit) = guard(&bullets) {
        bullets = hit.answer.to_vec();
        answer.guard = Some(hit.answer.id);
        answer.not_available = false;
    }

    // Stage 7.
    if mode == SanitizeMode::Extraction {
        cap_joined(&mut bullets, EXTRACTION_CHAR_CAP);
    }

    debug!(
        bullets = bullets.len(),
        corrections = answer.corrections.len(),
        guard = answer.guard.unwrap_or("-"),
        "sanitized"
    );
    answer.bullets = bullets;
    answer
}

fn strip_noise(text: &str) -> String {
    let mut t = replace_all(&CODE_FENCE, text, "");
    t = t.replace("```", "");
    t = replace_all(&QUIZ_LINE, &t, "");
    t = replace_all(&QUIZ_INLINE, &t, "");
    t = replace_all(&ALL_NONE, &t, "");
    t = replace_all(&HEADER_LINE, &t, "");
    replace_all(&LEAD_IN, &t, "")
}

fn strip_prefixes(text: &str) -> String {
    let mut t = text.trim_start();
    loop {
        let found = PREFIXES.iter().find(|p| {
            t.get(..p.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(p))
        });
        match found {
            Some(p) => t = t[p.len()..].trim_start(),
            None => break,
        }
    }
    t.trim_end().to_string()
}

/// Strip markers and decoration from one line.
///
/// Returns the cleaned content and whether a bullet marker was present.
fn normalize_line(line: &str) -> (String, bool) {
    let mut content = collapse_whitespace(&line.replace("**", ""));
    let mut marked = false;
    loop {
        let before = content.len();
        if is_match(&LINE_MARKER, &content) {
            content = replace_all(&LINE_MARKER, &content, "");
            marked = true;
        }
        content = replace_all(&DECORATION, &content, "");
        content = content.trim().to_string();
        if content.len() == before {
            break;
        }
    }
    (content, marked)
}

fn keep_content(content: &str) -> bool {
    content.chars().count() >= MIN_BULLET_CHARS
        && !is_match(&SKIP_LINE, content)
        && !is_match(&QUIZ_CONTENT, content)
}

fn is_clinical(content: &str) -> bool {
    contains_any(&content.to_lowercase(), CLINICAL_KEYWORDS) || is_match(&CLINICAL_UNIT, content)
}

fn push_unique(bullets: &mut Vec<String>, content: &str) {
    let content = truncate_at_word(content, MAX_BULLET_CHARS);
    let key = content.to_lowercase();
    if bullets
        .iter()
        .any(|b| b[BULLET.len()..].to_lowercase() == key)
    {
        return;
    }
    bullets.push(format!("{}{}", BULLET, content));
}

fn extract_bullets(text: &str) -> Vec<String> {
    let mut bullets = Vec::new();
    for line in text.lines() {
        let (content, marked) = normalize_line(line);
        if !keep_content(&content) {
            continue;
        }
        if marked || is_clinical(&content) {
            push_unique(&mut bullets, &content);
            if bullets.len() >= MAX_BULLETS {
                break;
            }
        }
    }
    bullets
}

fn sentence_bullets(text: &str) -> Vec<String> {
    let mut bullets = Vec::new();
    for sentence in text.split('.') {
        let (content, _) = normalize_line(sentence);
        if content.chars().count() <= MIN_SENTENCE_CHARS || !keep_content(&content) {
            continue;
        }
        push_unique(&mut bullets, &content);
        if bullets.len() >= MAX_SENTENCE_BULLETS {
            break;
        }
    }
    bullets
}

/// Drop trailing bullets until the joined text fits `cap`. The first bullet
/// always stays.
fn cap_joined(bullets: &mut Vec<String>, cap: usize) {
    while bullets.len() > 1 && bullets.join("\n").chars().count() > cap {
        bullets.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ESCALATION_SIGNS, NEONATAL_VITALS};

    fn assert_invariants(answer: &SanitizedAnswer) {
        let n = answer.bullets.len();
        assert!((1..=MAX_BULLETS).contains(&n), "bullet count {}", n);
        for (i, b) in answer.bullets.iter().enumerate() {
            assert!(b.starts_with(BULLET), "missing marker: {:?}", b);
            assert!(b[BULLET.len()..].chars().count() <= MAX_BULLET_CHARS);
            for other in &answer.bullets[i + 1..] {
                assert_ne!(b, other);
            }
        }
    }

    fn assert_idempotent(raw: &str) {
        let once = sanitize_completion(raw);
        let twice = sanitize_completion(&once.text());
        assert_eq!(once.bullets, twice.bullets, "input: {:?}", raw);
    }

    #[test]
    fn test_canonicalizes_mixed_markers() {
        let a = sanitize_completion(
            "Here are the key points:\n1. Assess airway\n- Check breathing rate\n* Monitor SpO2",
        );
        assert_eq!(
            a.bullets,
            vec!["• Assess airway", "• Check breathing rate", "• Monitor SpO2"]
        );
        assert_invariants(&a);
    }

    #[test]
    fn test_caps_at_four_bullets() {
        let raw = (1..=7)
            .map(|i| format!("- Step number {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let a = sanitize_completion(&raw);
        assert_eq!(a.bullets.len(), 4);
        assert_invariants(&a);
    }

    #[test]
    fn test_strips_quiz_and_exercise_noise() {
        let raw = "• Check capillary refill\nA) 2 seconds\nB) 5 seconds\nAll of the above\n## Exercise 1\nWrite a Python script\n• Monitor urine output";
        let a = sanitize_completion(raw);
        assert_eq!(
            a.bullets,
            vec!["• Check capillary refill", "• Monitor urine output"]
        );
    }

    #[test]
    fn test_promotes_clinical_lines_only() {
        let raw = "Good morning\nObserve for signs of dehydration\nGive 10 mg/kg paracetamol";
        let a = sanitize_completion(raw);
        assert_eq!(
            a.bullets,
            vec![
                "• Observe for signs of dehydration",
                "• Give 10 mg/kg paracetamol"
            ]
        );
    }

    #[test]
    fn test_sentence_fallback() {
        let a = sanitize_completion("Keep the patient warm. Reassure the family members. Ok.");
        assert!(a.from_sentences);
        assert_eq!(
            a.bullets,
            vec!["• Keep the patient warm", "• Reassure the family members"]
        );
    }

    #[test]
    fn test_not_available_never_empty() {
        for raw in ["", "   ", "A) one\nB) two", "```code```"] {
            let a = sanitize_completion(raw);
            assert_eq!(a.bullets, vec![NOT_AVAILABLE.to_string()]);
            assert!(a.not_available);
        }
    }

    #[test]
    fn test_incorrect_neonatal_range_never_survives() {
        let raw = "• A healthy newborn heart rate is between 100 and 160 beats per minute";
        let a = sanitize_completion(raw);
        assert!(!a.text().to_lowercase().contains("between 100 and 160"));
        assert!(a.text().contains("120-180"));
        assert_eq!(a.corrections, vec!["neonatal-hr-between"]);
    }

    #[test]
    fn test_guard_replaces_truncated_call_for() {
        let a = sanitize_completion("• Monitor vital signs\n• Call for _");
        assert_eq!(a.bullets, ESCALATION_SIGNS.to_vec());
        assert_eq!(a.guard, Some("escalation-signs"));
    }

    #[test]
    fn test_guard_replaces_truncated_heart_rate() {
        let a = sanitize_completion("• The normal heart rate of a healthy newborn is");
        assert_eq!(a.bullets, NEONATAL_VITALS.to_vec());
    }

    #[test]
    fn test_long_bullet_truncated_on_word() {
        let long = format!("- Monitor {}", "closely ".repeat(60));
        let a = sanitize_completion(&long);
        assert!(a.bullets[0].ends_with("..."));
        assert_invariants(&a);
    }

    #[test]
    fn test_duplicates_removed_case_insensitively() {
        let a = sanitize_completion("- Check pulse\n- check PULSE\n- Check pulse");
        assert_eq!(a.bullets, vec!["• Check pulse"]);
    }

    #[test]
    fn test_extraction_cap_drops_whole_bullets() {
        let raw = (0..4)
            .map(|i| format!("- Assess item {} {}", i, "detail ".repeat(15)))
            .collect::<Vec<_>>()
            .join("\n");
        let a = extract_facts(&raw);
        assert!(a.text().chars().count() <= EXTRACTION_CHAR_CAP);
        assert!(a.bullets.len() < 4);
        assert!(a.bullets.iter().all(|b| !b.ends_with(" d")));
    }

    #[test]
    fn test_idempotent_over_varied_inputs() {
        let inputs = [
            "Here are the key points:\n1. Assess airway\n2. Check breathing",
            "Answer: Based on the context, monitor temperature 36.5-37.5°C.",
            "• Newborn heart rate 100-160 bpm\n• Monitor",
            "Note that you should consider checking the rash. It is important to observe.",
            "```python\nprint(1)\n```\n- Observe skin colour",
            "plain text with nothing clinical in it at all",
            "- Step A) option text\n- Step two",
            "",
            "• Call for help",
            &format!("- Monitor {}", "considerable ".repeat(40)),
            "Give 5 ml every hour. Document intake. Weigh daily before breakfast.",
        ];
        for raw in inputs {
            assert_idempotent(raw);
        }
    }

    #[test]
    fn test_reference_answers_are_fixed_points() {
        for answer in [NEONATAL_VITALS, ESCALATION_SIGNS] {
            let a = sanitize_completion(&answer.text());
            assert_eq!(a.bullets, answer.to_vec());
        }
    }
}
