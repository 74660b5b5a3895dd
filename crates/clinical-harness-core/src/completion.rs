//! Completion service contract and prompt shaping.
//!
//! The core never talks to a model directly. It builds a
//! [`CompletionRequest`] and hands it to whatever [`CompletionService`] the
//! application wired in. Any `Err` from the service is treated as
//! "completion unavailable" and the pipeline falls back to extraction.

use anyhow::Result;
use serde::Serialize;

use crate::classify::Route;
use crate::text::{contains_any, truncate_chars};

/// Language-model endpoint.
///
/// Implementations must bound the call with a timeout and must not retry
/// indefinitely.
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &str;

    /// Return the generated text, or an error for timeouts, connection
    /// failures, non-2xx statuses and malformed bodies.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// A completion service that is switched off; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCompletion;

impl CompletionService for DisabledCompletion {
    fn name(&self) -> &str {
        "disabled"
    }

    fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        anyhow::bail!("completion service is disabled")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub user_message: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
}

/// Sampling and length settings, filled from `[completion]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub scenario_max_tokens: u32,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.7,
            max_tokens: 120,
            scenario_max_tokens: 150,
        }
    }
}

const SCENARIO_MARKERS: &[&str] = &[
    "walk me through",
    "clinical scenario",
    "scenario involving",
    "explain the process",
];

const MAX_QUESTION_CHARS: usize = 500;

pub const BULLET_INSTRUCTION: &str = "Return detailed bullet points. Be comprehensive but concise.

FORMAT: • Detailed point with specific clinical information

RULES:
- Maximum 3-4 bullet points
- Each point can be 15-20 words
- Include specific clinical details
- No introductory text
- Start immediately with •
- Focus on actionable nursing information";

pub const SCENARIO_INSTRUCTION: &str = "You are a nursing educator. Provide a concise clinical scenario response.

RULES:
- Maximum 150 words total
- Use bullet points for key steps
- Focus only on essential nursing actions
- No explanations or background theory
- Direct, actionable guidance only

Format: Brief scenario + 3-5 key nursing actions.";

const PEDIATRIC_HEADER: &str = "PRIORITY CONTEXT - KKH Baby Bear Book Pediatric Guidelines:";
const PEDIATRIC_FOOTER: &str = "This query is about pediatric/neonatal care. Prioritize information from the KKH Baby Bear Book and give age-appropriate clinical values and protocols.";
const EMERGENCY_HEADER: &str = "PRIORITY CONTEXT - KKH Baby Bear Book Section 01 Medical Emergencies:";
const EMERGENCY_FOOTER: &str = "This query is about pediatric emergencies or critical care. Prioritize information from Section 01 while also giving practical nursing guidance.";

pub fn is_scenario(query: &str) -> bool {
    contains_any(&query.to_lowercase(), SCENARIO_MARKERS)
}

/// Build the request for `query` with an already bounded `context`.
pub fn build_request(
    query: &str,
    route: Route,
    context: &str,
    settings: &PromptSettings,
) -> CompletionRequest {
    let scenario = is_scenario(query);
    let framed = match route {
        Route::Pediatric => format!("{}\n\n{}\n\n{}", PEDIATRIC_HEADER, context, PEDIATRIC_FOOTER),
        Route::Emergency => format!("{}\n\n{}\n\n{}", EMERGENCY_HEADER, context, EMERGENCY_FOOTER),
        _ => context.to_string(),
    };

    let question = truncate_chars(query.trim(), MAX_QUESTION_CHARS);
    let user_message = if framed.trim().is_empty() {
        format!("Nurse's Question: {}", question)
    } else {
        format!("Context:\n{}\n\nNurse's Question: {}", framed, question)
    };

    CompletionRequest {
        system_instruction: if scenario {
            SCENARIO_INSTRUCTION
        } else {
            BULLET_INSTRUCTION
        }
        .to_string(),
        user_message,
        temperature: settings.temperature,
        max_output_tokens: if scenario {
            settings.scenario_max_tokens
        } else {
            settings.max_tokens
        },
        top_p: settings.top_p,
    }
}
