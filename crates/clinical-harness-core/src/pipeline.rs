//! The request pipeline.
//!
//! ```text
//! query ─► classify ─► retrieve ─► assemble ─► complete ─► sanitize ─► fallback ─► Answer
//!              │                                   │
//!              └─► fluid calculator                └─(failure)─► extract_facts(context)
//! ```
//!
//! [`Pipeline::answer`] never fails. Every [`PipelineError`] is absorbed at
//! the stage it occurs in and recorded on the returned [`Answer`].

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::classify::{Classification, KeywordTable, Route};
use crate::completion::{build_request, CompletionService, PromptSettings};
use crate::context::{assemble, AssembledContext, ContextSettings};
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::fallback;
use crate::fluids::{handle_fluid_query, FluidRequirement};
use crate::models::{ConversationTurn, Corpus};
use crate::reference::neonatal_override;
use crate::retrieve::{RetrievalOutcome, RetrievalSettings, Retriever};
use crate::sanitize::{extract_facts, sanitize_completion, SanitizedAnswer};
use crate::store::{BuildOptions, KnowledgeBase, KnowledgeSnapshot};

/// Where the final bullets came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Sanitized model output.
    Completion,
    /// Facts extracted from the assembled context after a completion failure.
    Extracted,
    /// A pre-verified reference answer.
    Reference,
    /// A canned follow-up answer.
    Fallback,
    /// The fluid calculator.
    Calculator,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub bullets: Vec<String>,
    pub source: AnswerSource,
    pub classification: Classification,
    /// Ids of correction rules that fired.
    pub corrections: Vec<&'static str>,
    /// Id of the reference or fallback answer used, if any.
    pub reference: Option<&'static str>,
    /// Ids of the documents in the context.
    pub context_sources: Vec<String>,
    pub calculation: Option<FluidRequirement>,
    pub snapshot_version: u64,
    /// Absorbed failures and silent corrections, in the order they occurred.
    #[serde(serialize_with = "serialize_errors")]
    pub degraded: Vec<PipelineError>,
}

impl Answer {
    pub fn text(&self) -> String {
        self.bullets.join("\n")
    }
}

fn serialize_errors<S: serde::Serializer>(
    errors: &[PipelineError],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(errors.len()))?;
    for e in errors {
        seq.serialize_element(&serde_json::json!({
            "code": e.code(),
            "message": e.to_string(),
        }))?;
    }
    seq.end()
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub retrieval: RetrievalSettings,
    pub context: ContextSettings,
    pub prompt: PromptSettings,
    pub build: BuildOptions,
}

/// Shared, thread-safe answer engine.
pub struct Pipeline {
    knowledge: Arc<KnowledgeBase>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionService>,
    keywords: KeywordTable,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn CompletionService>,
        keywords: KeywordTable,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            knowledge,
            embedder,
            completion,
            keywords,
            settings,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn classify(&self, query: &str) -> Classification {
        self.keywords.classify(query)
    }

    /// Rebuild the knowledge snapshot from `corpus` with this pipeline's embedder.
    pub fn rebuild(&self, corpus: &Corpus) -> Result<Arc<KnowledgeSnapshot>> {
        self.knowledge
            .rebuild(corpus, self.embedder.as_ref(), &self.settings.build)
    }

    /// Run the route's retrieval policy against the current snapshot.
    pub fn retrieve(&self, query: &str) -> RetrievalOutcome {
        let snapshot = self.knowledge.snapshot();
        let classification = self.classify(query);
        self.retriever(&snapshot).retrieve(query, &classification)
    }

    fn retriever<'a>(&'a self, snapshot: &'a KnowledgeSnapshot) -> Retriever<'a> {
        Retriever {
            snapshot,
            embedder: self.embedder.as_ref(),
            keywords: &self.keywords,
            settings: &self.settings.retrieval,
        }
    }

    /// Answer a clinical question. Always returns at least one bullet.
    pub fn answer(&self, query: &str, history: &[ConversationTurn]) -> Answer {
        let classification = self.classify(query);
        let snapshot = self.knowledge.snapshot();

        if classification.route == Route::Calculation {
            let calc = handle_fluid_query(query);
            info!(route = "calculation", weight = ?calc.result.map(|r| r.weight_kg), "answered");
            return Answer {
                bullets: calc.bullets,
                source: AnswerSource::Calculator,
                classification,
                corrections: Vec::new(),
                reference: None,
                context_sources: Vec::new(),
                calculation: calc.result,
                snapshot_version: snapshot.version,
                degraded: Vec::new(),
            };
        }

        let mut degraded = Vec::new();

        let retrieval = self.retriever(&snapshot).retrieve(query, &classification);
        if let Some(e) = retrieval.error {
            degraded.push(e);
        }

        let context = assemble(
            &retrieval.documents,
            classification.route,
            history,
            &self.settings.context,
        );

        let (sanitized, mut source) = self.complete(query, &classification, &context, &mut degraded);

        let mut bullets = sanitized.bullets;
        let mut reference = sanitized.guard;
        if !sanitized.corrections.is_empty() {
            degraded.push(PipelineError::StaleOrIncorrectFact(
                sanitized.corrections.join(","),
            ));
        }
        if let Some(id) = sanitized.guard {
            degraded.push(PipelineError::StaleOrIncorrectFact(id.to_string()));
            source = AnswerSource::Reference;
        }
        if sanitized.not_available {
            degraded.push(PipelineError::NoUsableContent);
        }

        if classification.is_follow_up {
            if let Some((_, canned)) = fallback::decide(query, &bullets.join("\n")) {
                bullets = canned.to_vec();
                reference = Some(canned.id);
                source = AnswerSource::Fallback;
            }
        }

        if let Some(answer) = neonatal_override(query, &bullets) {
            bullets = answer.to_vec();
            reference = Some(answer.id);
            source = AnswerSource::Reference;
        }

        info!(
            route = classification.route.as_str(),
            source = ?source,
            bullets = bullets.len(),
            context_docs = context.sources.len(),
            degraded = degraded.len(),
            snapshot = snapshot.version,
            "answered"
        );

        Answer {
            bullets,
            source,
            classification,
            corrections: sanitized.corrections,
            reference,
            context_sources: context.sources,
            calculation: None,
            snapshot_version: snapshot.version,
            degraded,
        }
    }

    /// Call the completion service, or extract from the context when it fails.
    fn complete(
        &self,
        query: &str,
        classification: &Classification,
        context: &AssembledContext,
        degraded: &mut Vec<PipelineError>,
    ) -> (SanitizedAnswer, AnswerSource) {
        let request = build_request(
            query,
            classification.route,
            &context.text,
            &self.settings.prompt,
        );

        let failure = match self.completion.complete(&request) {
            Ok(text) if !text.trim().is_empty() => {
                return (sanitize_completion(&text), AnswerSource::Completion);
            }
            Ok(_) => "empty completion body".to_string(),
            Err(e) => format!("{:#}", e),
        };

        warn!(
            service = self.completion.name(),
            error = %failure,
            "completion unavailable, extracting from context"
        );
        degraded.push(PipelineError::CompletionUnavailable(failure));
        (extract_facts(&context.knowledge), AnswerSource::Extracted)
    }
}
