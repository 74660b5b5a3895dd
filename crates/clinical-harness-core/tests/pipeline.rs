use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use clinical_harness_core::classify::{IntentTag, KeywordTable, Route};
use clinical_harness_core::completion::{CompletionRequest, CompletionService, DisabledCompletion};
use clinical_harness_core::corpus::{build_corpus, REFERENCE_CATEGORY};
use clinical_harness_core::embedding::{Embedder, HashingEmbedder};
use clinical_harness_core::models::{ConversationTurn, SourceGroup};
use clinical_harness_core::reference::NEONATAL_VITALS;
use clinical_harness_core::sanitize::{extract_facts, sanitize_completion, MAX_BULLETS};
use clinical_harness_core::store::{BuildOptions, KnowledgeBase};
use clinical_harness_core::{AnswerSource, Pipeline, PipelineError, PipelineSettings};

const REFERENCE_TEXT: &str = "Section 01 Medical Emergencies

CHAPTER 1
Recognising the Critically Ill Child
- Assess airway, breathing and circulation in every child
- Neonatal heart rate is normally between 100 and 160 beats per minute
- Capillary refill over 2 seconds suggests poor perfusion

CHAPTER 2
Cardiopulmonary Resuscitation
- Give 15 compressions to 2 breaths with two rescuers in children
- Compress at 100-120 per minute

CHAPTER 3
Drug Overdose and Poisoning
- Check paracetamol level 4 hours after ingestion
- N-acetylcysteine is the antidote for paracetamol overdose";

/// Replies with a fixed body, or fails like an HTTP 500 when `reply` is `None`.
struct Scripted {
    reply: Option<&'static str>,
    calls: AtomicUsize,
}

impl Scripted {
    fn ok(reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }
}

impl CompletionService for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Some(r) => Ok(r.to_string()),
            None => bail!("completion endpoint returned status=500"),
        }
    }
}

fn pipeline(completion: Arc<dyn CompletionService>) -> Pipeline {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(384));
    let corpus = build_corpus(Some(REFERENCE_TEXT));
    let kb = KnowledgeBase::build(&corpus, embedder.as_ref(), &BuildOptions::default()).unwrap();
    Pipeline::new(
        Arc::new(kb),
        embedder,
        completion,
        KeywordTable::builtin(),
        PipelineSettings::default(),
    )
}

#[test]
fn test_neonatal_heart_rate_uses_reference_range() {
    let p = pipeline(Scripted::ok(
        "• Normal neonatal heart rate is 100-160 bpm\n• Count for a full minute",
    ));
    let a = p.answer("What is the normal heart rate for a neonate?", &[]);
    assert_eq!(a.classification.route, Route::Pediatric);
    assert_eq!(a.bullets, NEONATAL_VITALS.to_vec());
    assert_eq!(a.source, AnswerSource::Fallback);
    assert_eq!(a.reference, Some(NEONATAL_VITALS.id));
    assert!(!a.text().contains("100-160"));
    assert!(a
        .degraded
        .iter()
        .any(|e| matches!(e, PipelineError::StaleOrIncorrectFact(_))));
}

#[test]
fn test_neonatal_range_question_without_completion() {
    let p = pipeline(Arc::new(DisabledCompletion));
    let a = p.answer("what is the normal heart rate range for a neonate", &[]);
    assert!(a.classification.intent.contains(IntentTag::Pediatric));
    assert_eq!(a.bullets, NEONATAL_VITALS.to_vec());
    assert_eq!(a.source, AnswerSource::Fallback);
    assert!(a.text().contains("120-180"));
    assert!(a
        .degraded
        .iter()
        .any(|e| matches!(e, PipelineError::CompletionUnavailable(_))));
}

#[test]
fn test_neonatal_override_when_range_missing() {
    let p = pipeline(Scripted::ok("• Count the heart rate for a full minute"));
    let a = p.answer("newborn heart rate", &[]);
    assert_eq!(a.source, AnswerSource::Reference);
    assert_eq!(a.reference, Some("neonatal-vitals"));
    assert!(a.bullets[0].contains("120-180"));
}

#[test]
fn test_completion_failure_falls_back_to_context() {
    let scripted = Scripted::failing();
    let p = pipeline(scripted.clone());
    let a = p.answer("hand hygiene before patient contact", &[]);

    assert_eq!(scripted.calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.source, AnswerSource::Extracted);
    assert!(!a.bullets.is_empty());
    assert!(a.bullets.iter().all(|b| b.starts_with("• ")));
    assert!(a.degraded.iter().any(|e| e.code() == "completion_unavailable"));
    assert!(!a.context_sources.is_empty());
}

#[test]
fn test_fluid_calculation_never_calls_completion() {
    let scripted = Scripted::failing();
    let p = pipeline(scripted.clone());
    let a = p.answer("Calculate maintenance fluid for a 25 kg child", &[]);

    assert_eq!(a.source, AnswerSource::Calculator);
    assert_eq!(scripted.calls.load(Ordering::SeqCst), 0);
    let calc = a.calculation.unwrap();
    assert_eq!(calc.daily_ml, 1600.0);
    assert!(a.bullets[0].contains("1600 mL"));
}

#[test]
fn test_emergency_retrieval_puts_priority_documents_first() {
    let p = pipeline(Scripted::failing());
    let outcome = p.retrieve("emergency: patient collapsed after paracetamol overdose");
    assert!(outcome.error.is_none());
    let docs = &outcome.documents;
    assert!(!docs.is_empty());

    // Once a non-priority document appears, no priority document may follow.
    let first_plain = docs
        .iter()
        .position(|d| d.document.source_group == SourceGroup::Protocol)
        .unwrap_or(docs.len());
    assert!(docs[first_plain..]
        .iter()
        .all(|d| d.document.source_group == SourceGroup::Protocol));
    assert_eq!(docs[0].document.category, REFERENCE_CATEGORY);
}

#[test]
fn test_classification_tags_and_routes() {
    let p = pipeline(Scripted::failing());
    let c = p.classify("Emergency: cardiac arrest in the ward");
    assert!(c.intent.contains(IntentTag::Emergency));
    assert_eq!(c.route, Route::Emergency);

    let c = p.classify("When should I escalate?");
    assert!(c.is_follow_up);
    assert_eq!(c.route, Route::FollowUp);
}

#[test]
fn test_answers_always_well_formed() {
    let p = pipeline(Scripted::ok(
        "```python\nprint('x')\n```\nQuiz:\nA) 100\nB) 120\nAll of the above\n\nHere are the key points:\n",
    ));
    let history = vec![
        ConversationTurn::user("Signs of shock in a child"),
        ConversationTurn::assistant("• Monitor perfusion"),
    ];
    for q in [
        "hand hygiene",
        "What is the dose of paracetamol?",
        "When to call for help?",
        "",
    ] {
        let a = p.answer(q, &history);
        assert!(!a.bullets.is_empty(), "query {:?}", q);
        assert!(a.bullets.len() <= 7);
        for b in &a.bullets {
            assert!(b.starts_with("• "), "query {:?}: {:?}", q, b);
            assert!(!b.contains("```"));
            assert!(!b.contains("A) "));
        }
    }
}

#[test]
fn test_sanitizer_is_idempotent_on_pipeline_inputs() {
    for raw in [
        "Here are the key points:\n1. Keep the airway open\n2. Give oxygen at 15 L/min",
        "**Key Points:**\n- neonatal heart rate 100-160 bpm\n- monitor SpO2",
        "Nothing useful here",
        REFERENCE_TEXT,
    ] {
        let once = sanitize_completion(raw);
        let twice = sanitize_completion(&once.text());
        assert_eq!(once.bullets, twice.bullets, "raw {:?}", raw);
        assert!(once.bullets.len() <= MAX_BULLETS);

        let facts = extract_facts(raw);
        assert!(facts.text().chars().count() <= 303);
    }
}

#[test]
fn test_rebuild_swaps_snapshot() {
    let p = pipeline(Scripted::failing());
    let before = p.knowledge().snapshot();
    let after = p.rebuild(&build_corpus(None)).unwrap();
    assert!(after.version > before.version);
    assert!(after.len() < before.len());
    assert_eq!(p.answer("hand hygiene", &[]).snapshot_version, after.version);
}
