//! Follow-up question suggestions.
//!
//! Suggestions are only offered after a nursing answer. Topic categories are
//! matched against the latest user turn among the last four turns.

use crate::models::{ConversationTurn, Role};
use crate::text::contains_any;

const MAX_SUGGESTIONS: usize = 6;
const PER_CATEGORY: usize = 3;
const RECENT_TURNS: usize = 4;

const NURSING_INDICATORS: &[&str] = &[
    "temperature",
    "vital signs",
    "blood pressure",
    "heart rate",
    "respiratory",
    "medication",
    "treatment",
    "symptoms",
    "assessment",
    "monitor",
    "nursing",
    "patient",
    "clinical",
    "medical",
    "emergency",
    "pediatric",
    "paediatric",
    "infection",
    "hygiene",
    "ppe",
    "fluid",
    "dose",
    "mg/kg",
    "oxygen",
    "breathing",
    "consciousness",
    "distress",
    "poisoning",
    "overdose",
];

const NON_NURSING_INDICATORS: &[&str] = &[
    "favorite color",
    "python script",
    "programming",
    "coding",
    "write a",
    "personal preference",
    "opinion",
    "not available",
    "exercise",
    "solution",
];

struct Category {
    keywords: &'static [&'static str],
    prompts: &'static [&'static str],
}

const CATEGORIES: &[Category] = &[
    // critical illness
    Category {
        keywords: &["critical", "emergency", "urgent", "deteriorating", "shock", "unconscious", "collapse"],
        prompts: &[
            "What are the ABCDE assessment steps?",
            "How do I recognize pediatric shock?",
            "When should I call for immediate help?",
            "What are pediatric early warning signs?",
            "How to prepare for emergency response?",
        ],
    },
    // pediatric CPR
    Category {
        keywords: &["cpr", "resuscitation", "cardiac arrest", "not breathing", "no pulse"],
        prompts: &[
            "What's the compression rate for children?",
            "How deep should chest compressions be?",
            "What's the ventilation ratio for pediatric CPR?",
            "When do I use AED on children?",
            "How to check for pulse in infants?",
        ],
    },
    // poisoning
    Category {
        keywords: &["poison", "overdose", "ingestion", "toxic", "paracetamol", "acetaminophen"],
        prompts: &[
            "What's the antidote for paracetamol overdose?",
            "How do I calculate N-acetylcysteine dose?",
            "When is activated charcoal indicated?",
            "What are contraindications for charcoal?",
            "How to assess severity of poisoning?",
        ],
    },
    // vital signs
    Category {
        keywords: &["vital signs", "heart rate", "blood pressure", "temperature", "respiratory rate", "oxygen"],
        prompts: &[
            "What are normal ranges for this age?",
            "How often should I monitor vitals?",
            "What indicates abnormal findings?",
            "When to escalate vital sign concerns?",
            "How to document vital signs properly?",
        ],
    },
    // medication
    Category {
        keywords: &["medication", "drug", "dose", "administration", "calculate", "mg/kg"],
        prompts: &[
            "How do I calculate pediatric doses?",
            "What are the five rights of medication?",
            "How to check for drug allergies?",
            "What's the maximum safe dose?",
            "How to monitor for side effects?",
        ],
    },
    // infection control
    Category {
        keywords: &["infection", "isolation", "ppe", "hand hygiene", "mrsa", "contact precautions"],
        prompts: &[
            "What PPE do I need for this case?",
            "How long should hand hygiene take?",
            "When to use contact precautions?",
            "How to properly don and doff PPE?",
            "What are standard precautions?",
        ],
    },
    // fluid management
    Category {
        keywords: &["fluid", "dehydration", "iv", "maintenance", "replacement", "ml/kg"],
        prompts: &[
            "How to calculate maintenance fluids?",
            "What are signs of dehydration?",
            "When to start IV fluids?",
            "How to monitor fluid balance?",
            "What fluid type should I use?",
        ],
    },
    // respiratory
    Category {
        keywords: &["breathing", "respiratory", "oxygen", "wheeze", "stridor", "asthma"],
        prompts: &[
            "How to assess breathing difficulty?",
            "When to give supplemental oxygen?",
            "What are signs of respiratory distress?",
            "How to position for optimal breathing?",
            "When to prepare for intubation?",
        ],
    },
];

const GENERIC_PROMPTS: &[&str] = &[
    "Can you explain this in more detail?",
    "What are the key nursing considerations?",
    "How do I document this properly?",
];

/// Suggest up to six follow-up questions for the conversation so far.
pub fn suggest_follow_ups(history: &[ConversationTurn]) -> Vec<String> {
    if history.len() < 2 {
        return Vec::new();
    }

    let Some(last_answer) = history
        .iter()
        .rev()
        .find(|t| t.role == Role::Assistant)
        .map(|t| t.content.to_lowercase())
    else {
        return Vec::new();
    };
    if !contains_any(&last_answer, NURSING_INDICATORS)
        || contains_any(&last_answer, NON_NURSING_INDICATORS)
    {
        return Vec::new();
    }

    let recent = &history[history.len().saturating_sub(RECENT_TURNS)..];
    let Some(last_question) = recent
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.content.to_lowercase())
    else {
        return Vec::new();
    };

    let mut prompts: Vec<&str> = CATEGORIES
        .iter()
        .filter(|c| contains_any(&last_question, c.keywords))
        .flat_map(|c| c.prompts.iter().take(PER_CATEGORY).copied())
        .collect();
    if prompts.is_empty() {
        prompts = GENERIC_PROMPTS.to_vec();
    }

    let mut out: Vec<String> = Vec::new();
    for p in prompts {
        if !out.iter().any(|o| o == p) {
            out.push(p.to_string());
        }
        if out.len() >= MAX_SUGGESTIONS {
            break;
        }
    }
    out
}
