//! Bounded context assembly.
//!
//! Every retrieved document is cleaned with [`extract_facts`] before it is
//! considered, the route decides which cleaned documents are used, and the
//! knowledge part is capped at `max_chars`. Recent conversation turns are
//! prepended under their own label, each capped at `turn_chars`.

use serde::Serialize;

use crate::classify::Route;
use crate::models::{ConversationTurn, Role, ScoredDocument};
use crate::sanitize::extract_facts;
use crate::text::{contains_any, truncate_chars};

const PEDIATRIC_MARKERS: &[&str] = &["kkh", "section 01", "baby bear", "pediatric", "child"];

#[derive(Debug, Clone, PartialEq)]
pub struct ContextSettings {
    pub max_chars: usize,
    pub history_turns: usize,
    pub turn_chars: usize,
    /// Label for assistant turns.
    pub persona: String,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_chars: 800,
            history_turns: 3,
            turn_chars: 150,
            persona: "Sarah".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledContext {
    /// Full context handed to the completion request.
    pub text: String,
    /// The cleaned knowledge part alone, without conversation turns.
    pub knowledge: String,
    /// Ids of the documents that made it into the context.
    pub sources: Vec<String>,
    /// The knowledge part hit `max_chars`.
    pub truncated: bool,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.knowledge.trim().is_empty()
    }
}

pub fn assemble(
    results: &[ScoredDocument],
    route: Route,
    history: &[ConversationTurn],
    settings: &ContextSettings,
) -> AssembledContext {
    let cleaned: Vec<(&ScoredDocument, String)> = results
        .iter()
        .filter_map(|d| {
            let facts = extract_facts(&d.document.text);
            (!facts.not_available).then(|| (d, facts.text()))
        })
        .collect();

    let chosen: Vec<&(&ScoredDocument, String)> = match route {
        Route::Pediatric => {
            let marked: Vec<_> = cleaned
                .iter()
                .filter(|(d, text)| {
                    d.document.is_reference()
                        || contains_any(&text.to_lowercase(), PEDIATRIC_MARKERS)
                })
                .take(3)
                .collect();
            if marked.is_empty() {
                cleaned.iter().take(2).collect()
            } else {
                marked
            }
        }
        Route::Emergency => cleaned.iter().take(2).collect(),
        _ => cleaned.iter().take(1).collect(),
    };

    let knowledge = chosen
        .iter()
        .map(|(_, text)| text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let truncated = knowledge.chars().count() > settings.max_chars;
    let knowledge = truncate_chars(&knowledge, settings.max_chars);

    let mut text = knowledge.clone();
    if history.len() > 1 {
        let start = history.len().saturating_sub(settings.history_turns);
        let mut out = String::from("Recent conversation:\n");
        for turn in &history[start..] {
            let role = match turn.role {
                Role::User => "Nurse",
                Role::Assistant => settings.persona.as_str(),
            };
            out.push_str(&format!(
                "{}: {}\n",
                role,
                truncate_chars(&turn.content, settings.turn_chars)
            ));
        }
        out.push_str("\nKnowledge base context:\n");
        out.push_str(&knowledge);
        text = out;
    }

    AssembledContext {
        text,
        knowledge,
        sources: chosen.iter().map(|(d, _)| d.document.id.clone()).collect(),
        truncated,
    }
}
