//! Follow-up fallback decision table.
//!
//! A follow-up answer that is not about nursing, or that is incomplete, is
//! replaced with a canned answer picked by the *query's* topic.

use tracing::info;

use crate::reference::{ReferenceAnswer, NEONATAL_VITALS};
use crate::text::contains_any;

pub const ABCDE_ASSESSMENT: ReferenceAnswer = ReferenceAnswer {
    id: "abcde-assessment",
    bullets: &[
        "• Airway - Check for obstruction or stridor",
        "• Breathing - Assess respiratory rate, effort, and oxygen saturation",
        "• Circulation - Monitor heart rate, blood pressure, and capillary refill",
        "• Disability - Assess consciousness level using AVPU or GCS",
        "• Exposure - Check for rashes, injuries, or temperature",
    ],
};

pub const AGE_VITALS: ReferenceAnswer = ReferenceAnswer {
    id: "age-vitals",
    bullets: &[
        "• Heart rate varies by age: newborn 120-180, infant 80-140, child 70-120 bpm",
        "• Respiratory rate: newborn 40-60, infant 24-38, child 18-30 breaths/min",
        "• Blood pressure increases with age and size",
        "• Temperature normal range: 36.5-37.5°C (97.7-99.5°F)",
    ],
};

pub const MEDICATION_SAFETY: ReferenceAnswer = ReferenceAnswer {
    id: "medication-safety",
    bullets: &[
        "• Always verify patient identity with two identifiers",
        "• Check medication name, dose, route, and timing",
        "• Calculate pediatric doses based on weight (mg/kg)",
        "• Verify allergies and contraindications before administration",
    ],
};

pub const CALL_FOR_HELP: ReferenceAnswer = ReferenceAnswer {
    id: "call-for-help",
    bullets: &[
        "• Any acute change in consciousness or responsiveness",
        "• Significant vital sign abnormalities for age",
        "• Difficulty breathing or signs of respiratory distress",
        "• Signs of shock: poor perfusion, altered mental state, cool extremities",
        "• Seizures or abnormal movements",
        "• Severe pain or distress that cannot be managed",
        "• Any situation where you feel uncertain about patient safety",
    ],
};

pub const ESCALATION_CRITERIA: ReferenceAnswer = ReferenceAnswer {
    id: "escalation-criteria",
    bullets: &[
        "• Deteriorating vital signs despite interventions",
        "• New or worsening symptoms",
        "• Patient or family expressing serious concerns",
        "• Any change that makes you worried about patient safety",
        "• When clinical indicators suggest need for higher level of care",
    ],
};

pub const GENERIC_NURSING: ReferenceAnswer = ReferenceAnswer {
    id: "generic-nursing",
    bullets: &[
        "• Monitor patient closely for any changes",
        "• Document all observations and interventions",
        "• Communicate concerns to medical team",
        "• Follow hospital protocols and guidelines",
    ],
};

const NURSING_TERMS: &[&str] = &[
    "temperature",
    "vital signs",
    "medication",
    "treatment",
    "assessment",
    "monitor",
    "nursing",
    "patient",
    "clinical",
    "medical",
    "emergency",
];

const INCOMPLETE_MARKERS: &[&str] = &["call for _", "• call for", "not available", "____", "fill in"];
const MIN_ANSWER_CHARS: usize = 20;

const ASSESSMENT_QUERY: &[&str] = &["abcde", "assessment"];
const VITALS_QUERY: &[&str] = &[
    "vital signs",
    "normal ranges",
    "heart rate",
    "neonatal",
    "neonate",
    "newborn",
];
const NEONATAL_QUERY: &[&str] = &["neonate", "neonatal", "newborn"];
const MEDICATION_QUERY: &[&str] = &["medication", "drug", "dose"];
const CALL_QUERY: &[&str] = &["call for help", "immediate help", "when should i call", "when to call"];
const ESCALATE_QUERY: &[&str] = &["escalate"];

/// Why an answer failed the follow-up checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NotNursing,
    Incomplete,
}

/// Check a sanitized answer; `None` means it is usable as is.
pub fn check(answer_text: &str) -> Option<FallbackReason> {
    let lower = answer_text.to_lowercase();
    if answer_text.trim().chars().count() < MIN_ANSWER_CHARS || contains_any(&lower, INCOMPLETE_MARKERS)
    {
        return Some(FallbackReason::Incomplete);
    }
    if !contains_any(&lower, NURSING_TERMS) {
        return Some(FallbackReason::NotNursing);
    }
    None
}

/// Pick the canned answer for `query`.
pub fn select(query: &str) -> ReferenceAnswer {
    let q = query.to_lowercase();
    if contains_any(&q, ASSESSMENT_QUERY) {
        ABCDE_ASSESSMENT
    } else if contains_any(&q, VITALS_QUERY) {
        if contains_any(&q, NEONATAL_QUERY) {
            NEONATAL_VITALS
        } else {
            AGE_VITALS
        }
    } else if contains_any(&q, MEDICATION_QUERY) {
        MEDICATION_SAFETY
    } else if contains_any(&q, CALL_QUERY) {
        CALL_FOR_HELP
    } else if contains_any(&q, ESCALATE_QUERY) {
        ESCALATION_CRITERIA
    } else {
        GENERIC_NURSING
    }
}

/// Apply the decision table to a follow-up answer.
pub fn decide(query: &str, answer_text: &str) -> Option<(FallbackReason, ReferenceAnswer)> {
    let reason = check(answer_text)?;
    let answer = select(query);
    info!(reason = ?reason, answer = answer.id, "follow-up fallback");
    Some((reason, answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_good_answer_passes() {
        assert_eq!(
            check("• Monitor the patient's temperature every 4 hours"),
            None
        );
    }

    #[test]
    fn test_not_nursing() {
        assert_eq!(
            check("• The stock market closed higher today on strong earnings"),
            Some(FallbackReason::NotNursing)
        );
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(check("• Not available"), Some(FallbackReason::Incomplete));
        assert_eq!(check("• ok"), Some(FallbackReason::Incomplete));
        assert_eq!(
            check("• Patient should call for _ immediately"),
            Some(FallbackReason::Incomplete)
        );
    }

    #[test]
    fn test_selection_follows_query_order() {
        assert_eq!(select("How to do an ABCDE assessment"), ABCDE_ASSESSMENT);
        assert_eq!(select("What are normal vital signs in a child"), AGE_VITALS);
        assert_eq!(select("What is the newborn heart rate"), NEONATAL_VITALS);
        assert_eq!(select("How do I give this medication"), MEDICATION_SAFETY);
        assert_eq!(select("When should I call for help"), CALL_FOR_HELP);
        assert_eq!(select("When to escalate"), ESCALATION_CRITERIA);
        assert_eq!(select("How often should I turn the patient"), GENERIC_NURSING);
    }

    #[test]
    fn test_decide_uses_query_not_answer() {
        let (reason, answer) = decide("What medication dose", "• Not available").unwrap();
        assert_eq!(reason, FallbackReason::Incomplete);
        assert_eq!(answer, MEDICATION_SAFETY);
        assert!(decide("anything", "• Assess the patient's airway and breathing").is_none());
    }
}
