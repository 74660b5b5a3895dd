//! Multi-stage, priority-weighted retrieval.
//!
//! # Single search
//!
//! 1. Embed the (possibly rewritten) query.
//! 2. Ask the snapshot for `min(2 × top_k, max_candidates)` candidates.
//! 3. Drop candidates below the similarity floor, duplicates by id and,
//!    for critical-illness queries, off-topic chapters.
//! 4. Partition into reference-group and protocol-group lists, each still
//!    in descending score order.
//! 5. Urgent queries with reference hits take reference results first and
//!    fill from protocols; everything else merges both lists by score.
//!
//! # Per-route policy
//!
//! | Route | Searches |
//! |-------|----------|
//! | pediatric | primed query; an alternate primed query when the top 2 miss the reference text |
//! | emergency | one search, `top_k_emergency` |
//! | follow-up | one search; one retry with generic terms when it returns fewer than 2 |
//! | general | one search, `top_k_general` |

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::classify::{Classification, IntentTag, KeywordTable, Route};
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::models::ScoredDocument;
use crate::store::KnowledgeSnapshot;
use crate::text::contains_any;

/// Signals on the search text that make reference results go first.
const PRIORITY_SIGNALS: &[&str] = &[
    "emergency",
    "critical",
    "resuscitation",
    "cpr",
    "poisoning",
    "overdose",
    "paracetamol",
    "shock",
    "arrest",
    "abcde",
    "vital signs",
    "pediatric",
    "paediatric",
];

/// Off-topic chapter markers dropped for critical-illness queries.
const EXCLUSION_KEYWORDS: &[&str] = &[
    "communication",
    "chapter 8",
    "importance of communication",
    "build trust",
    "working relationships",
];

const REFERENCE_MARKERS: &[&str] = &["kkh", "baby bear"];

/// Retrieval knobs, filled from `[retrieval]` in the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub top_k_general: usize,
    pub top_k_emergency: usize,
    pub top_k_follow_up: usize,
    pub top_k_pediatric: usize,
    pub top_k_pediatric_alternate: usize,
    pub max_candidates: usize,
    pub similarity_floor: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k_general: 3,
            top_k_emergency: 4,
            top_k_follow_up: 5,
            top_k_pediatric: 6,
            top_k_pediatric_alternate: 4,
            max_candidates: 10,
            similarity_floor: 0.0,
        }
    }
}

/// Result of [`Retriever::retrieve`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub documents: Vec<ScoredDocument>,
    /// Search texts actually issued, in order.
    pub queries: Vec<String>,
    pub error: Option<PipelineError>,
}

/// Borrowed view over everything a retrieval needs.
pub struct Retriever<'a> {
    pub snapshot: &'a KnowledgeSnapshot,
    pub embedder: &'a dyn Embedder,
    pub keywords: &'a KeywordTable,
    pub settings: &'a RetrievalSettings,
}

impl<'a> Retriever<'a> {
    /// Run the route's search policy for `query`.
    pub fn retrieve(&self, query: &str, classification: &Classification) -> RetrievalOutcome {
        let mut outcome = RetrievalOutcome::default();
        let s = self.settings;

        let result = match classification.route {
            Route::Pediatric => self.pediatric(query, classification, &mut outcome),
            Route::Emergency => self.logged(query, s.top_k_emergency, classification, &mut outcome),
            Route::FollowUp => self.follow_up(query, classification, &mut outcome),
            Route::General | Route::Calculation => {
                self.logged(query, s.top_k_general, classification, &mut outcome)
            }
        };

        match result {
            Ok(docs) => outcome.documents = docs,
            Err(e) => {
                warn!(error = %e, "retrieval degraded to empty context");
                outcome.error = Some(e);
            }
        }
        outcome
    }

    fn logged(
        &self,
        text: &str,
        top_k: usize,
        classification: &Classification,
        outcome: &mut RetrievalOutcome,
    ) -> Result<Vec<ScoredDocument>, PipelineError> {
        outcome.queries.push(text.to_string());
        self.search(text, top_k, classification)
    }

    fn pediatric(
        &self,
        query: &str,
        classification: &Classification,
        outcome: &mut RetrievalOutcome,
    ) -> Result<Vec<ScoredDocument>, PipelineError> {
        let s = self.settings;
        let primed = format!("KKH Baby Bear Book {} pediatric emergency medical", query);
        let docs = self.logged(&primed, s.top_k_pediatric, classification, outcome)?;

        let has_reference = docs.iter().take(2).any(|d| {
            d.document.is_reference()
                || contains_any(&d.document.text.to_lowercase(), REFERENCE_MARKERS)
        });
        if has_reference {
            return Ok(docs);
        }

        let alternate = format!("Section 01 medical emergency {} critical child", query);
        let mut combined =
            self.logged(&alternate, s.top_k_pediatric_alternate, classification, outcome)?;
        combined.extend(docs);
        dedup_by_id(&mut combined);
        combined.truncate(s.top_k_pediatric);
        Ok(combined)
    }

    fn follow_up(
        &self,
        query: &str,
        classification: &Classification,
        outcome: &mut RetrievalOutcome,
    ) -> Result<Vec<ScoredDocument>, PipelineError> {
        let k = self.settings.top_k_follow_up;
        let docs = self.logged(query, k, classification, outcome)?;
        if docs.len() >= 2 {
            return Ok(docs);
        }
        let widened = format!("{} nursing pediatric clinical", query);
        let retry = self.logged(&widened, k, classification, outcome)?;
        Ok(if retry.len() > docs.len() { retry } else { docs })
    }

    /// One similarity search with partitioning and merge.
    pub fn search(
        &self,
        text: &str,
        top_k: usize,
        classification: &Classification,
    ) -> Result<Vec<ScoredDocument>, PipelineError> {
        if self.snapshot.is_empty() {
            return Err(PipelineError::RetrievalUnavailable(
                "knowledge index is empty".to_string(),
            ));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(text)
            .map_err(|e| PipelineError::RetrievalUnavailable(format!("query embedding: {}", e)))?;

        let search_k = (top_k * 2).min(self.settings.max_candidates.max(1));
        let lower = text.to_lowercase();
        let critical = classification.intent.contains(IntentTag::Critical)
            || self.keywords.matches(IntentTag::Critical, text);
        let priority_first = classification.intent.is_urgent()
            || critical
            || contains_any(&lower, PRIORITY_SIGNALS);

        let mut seen = HashSet::new();
        let mut priority = Vec::new();
        let mut general = Vec::new();
        for (pos, score) in self.snapshot.search(&vector, search_k) {
            let Some(doc) = self.snapshot.document(pos) else {
                continue;
            };
            if score < self.settings.similarity_floor || !seen.insert(doc.id.clone()) {
                continue;
            }
            if critical && contains_any(&doc.text.to_lowercase(), EXCLUSION_KEYWORDS) {
                continue;
            }
            let scored = ScoredDocument {
                document: doc.clone(),
                score,
            };
            if doc.is_reference() {
                priority.push(scored);
            } else {
                general.push(scored);
            }
        }

        let results = merge(priority, general, top_k, priority_first);
        debug!(
            query = text,
            top_k,
            search_k,
            priority_first,
            results = results.len(),
            "search"
        );
        Ok(results)
    }
}

fn merge(
    priority: Vec<ScoredDocument>,
    general: Vec<ScoredDocument>,
    top_k: usize,
    priority_first: bool,
) -> Vec<ScoredDocument> {
    if priority_first && !priority.is_empty() {
        let mut out: Vec<ScoredDocument> = priority.into_iter().take(top_k).collect();
        let room = top_k - out.len();
        out.extend(general.into_iter().take(room));
        return out;
    }

    let mut all: Vec<ScoredDocument> = priority.into_iter().chain(general).collect();
    all.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    all.truncate(top_k);
    all
}

fn dedup_by_id(docs: &mut Vec<ScoredDocument>) {
    let mut seen = HashSet::new();
    docs.retain(|d| seen.insert(d.document.id.clone()));
}
