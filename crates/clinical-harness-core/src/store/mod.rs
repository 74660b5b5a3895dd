//! Knowledge snapshots and the vector index abstraction.
//!
//! A [`KnowledgeSnapshot`] pairs the ordered document list with a
//! [`VectorIndex`] built from it: index position `i` always maps to
//! `documents[i]`. Snapshots are immutable once built.
//!
//! [`KnowledgeBase`] owns the current snapshot behind an [`ArcSwap`]. Readers
//! take an `Arc` and keep using it for the whole request; [`KnowledgeBase::rebuild`]
//! builds a complete new snapshot off to the side and swaps it in, so no
//! reader can observe a half-built store. Rebuilds are serialised.

pub mod memory;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::chunk::{chunk_record, content_hash};
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::models::{Corpus, DocumentRecord, SourceGroup};

pub use memory::FlatIndex;

/// Nearest-neighbour index over embedding vectors.
pub trait VectorIndex: Send + Sync {
    /// Append vectors; their positions continue from the current length.
    fn add(&mut self, vectors: Vec<Vec<f32>>) -> Result<()>;

    /// Up to `k` `(position, score)` pairs in descending score order.
    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;

    fn len(&self) -> usize;

    fn dims(&self) -> Option<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot build settings.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Chunk size for long texts, in approximate tokens.
    pub max_tokens: usize,
    /// Texts per embedding request.
    pub batch_size: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            batch_size: 64,
        }
    }
}

/// An immutable, versioned view of the corpus and its index.
pub struct KnowledgeSnapshot {
    pub version: u64,
    pub build_id: String,
    pub built_at: DateTime<Utc>,
    pub embedder_model: String,
    /// SHA-256 over the ids and chunk hashes of every document, in index order.
    pub content_hash: String,
    documents: Vec<DocumentRecord>,
    index: Box<dyn VectorIndex>,
}

/// Summary of a snapshot, for `chx corpus` and `GET /corpus`.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStats {
    pub version: u64,
    pub build_id: String,
    pub built_at: String,
    pub embedder_model: String,
    pub content_hash: String,
    pub documents: usize,
    pub reference_documents: usize,
    pub protocol_documents: usize,
    pub dims: Option<usize>,
    pub categories: Vec<(String, usize)>,
}

impl KnowledgeSnapshot {
    /// A snapshot with no documents; every search on it returns nothing.
    pub fn empty() -> Self {
        Self {
            version: 0,
            build_id: String::new(),
            built_at: Utc::now(),
            embedder_model: String::new(),
            content_hash: String::new(),
            documents: Vec::new(),
            index: Box::new(FlatIndex::new()),
        }
    }

    /// Build a snapshot from the corpus.
    ///
    /// Records are chunked, records with empty text are skipped, and the
    /// remaining texts are embedded in corpus order. Fails without side
    /// effects if the embedder fails or returns the wrong number of vectors.
    pub fn build(
        corpus: &Corpus,
        embedder: &dyn Embedder,
        options: &BuildOptions,
        version: u64,
    ) -> Result<Self> {
        let chunked: Vec<_> = corpus
            .records()
            .flat_map(|r| chunk_record(r, options.max_tokens))
            .filter(|c| !c.record.text.trim().is_empty())
            .collect();

        let manifest: String = chunked
            .iter()
            .map(|c| format!("{}:{}\n", c.record.id, c.hash))
            .collect();
        let corpus_hash = content_hash(&manifest);
        let documents: Vec<DocumentRecord> = chunked.into_iter().map(|c| c.record).collect();

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let mut index = FlatIndex::new();
        for batch in texts.chunks(options.batch_size.max(1)) {
            let vectors = embedder.embed_batch(batch)?;
            if vectors.len() != batch.len() {
                return Err(PipelineError::Index(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                ))
                .into());
            }
            index.add(vectors)?;
        }

        if index.len() != documents.len() {
            return Err(PipelineError::Index(format!(
                "index has {} vectors for {} documents",
                index.len(),
                documents.len()
            ))
            .into());
        }

        Ok(Self {
            version,
            build_id: uuid::Uuid::new_v4().to_string(),
            built_at: Utc::now(),
            embedder_model: embedder.model_name().to_string(),
            content_hash: corpus_hash,
            documents,
            index: Box::new(index),
        })
    }

    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    pub fn document(&self, position: usize) -> Option<&DocumentRecord> {
        self.documents.get(position)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Raw index lookup: `(position, score)` pairs, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        self.index.search(query, k)
    }

    pub fn stats(&self) -> SnapshotStats {
        let mut categories: Vec<(String, usize)> = Vec::new();
        for d in &self.documents {
            match categories.iter_mut().find(|(name, _)| *name == d.category) {
                Some((_, n)) => *n += 1,
                None => categories.push((d.category.clone(), 1)),
            }
        }
        let reference = self
            .documents
            .iter()
            .filter(|d| d.source_group == SourceGroup::Reference)
            .count();

        SnapshotStats {
            version: self.version,
            build_id: self.build_id.clone(),
            built_at: self.built_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            embedder_model: self.embedder_model.clone(),
            content_hash: self.content_hash.clone(),
            documents: self.documents.len(),
            reference_documents: reference,
            protocol_documents: self.documents.len() - reference,
            dims: self.index.dims(),
            categories,
        }
    }
}

/// Holder of the current snapshot.
pub struct KnowledgeBase {
    current: ArcSwap<KnowledgeSnapshot>,
    rebuild_lock: Mutex<()>,
    next_version: AtomicU64,
}

impl KnowledgeBase {
    /// Start with an empty snapshot (version 0).
    pub fn empty() -> Self {
        Self {
            current: ArcSwap::from_pointee(KnowledgeSnapshot::empty()),
            rebuild_lock: Mutex::new(()),
            next_version: AtomicU64::new(1),
        }
    }

    /// Build the first snapshot immediately.
    pub fn build(corpus: &Corpus, embedder: &dyn Embedder, options: &BuildOptions) -> Result<Self> {
        let kb = Self::empty();
        kb.rebuild(corpus, embedder, options)?;
        Ok(kb)
    }

    /// The snapshot in force right now. Stays valid for as long as it is held.
    pub fn snapshot(&self) -> Arc<KnowledgeSnapshot> {
        self.current.load_full()
    }

    /// Build a new snapshot and swap it in.
    ///
    /// Concurrent rebuilds queue on an internal lock. On error the previous
    /// snapshot keeps serving.
    pub fn rebuild(
        &self,
        corpus: &Corpus,
        embedder: &dyn Embedder,
        options: &BuildOptions,
    ) -> Result<Arc<KnowledgeSnapshot>> {
        let _guard = self
            .rebuild_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("knowledge base rebuild lock poisoned"))?;

        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(KnowledgeSnapshot::build(corpus, embedder, options, version)?);
        let previous = self.current.swap(snapshot.clone());
        let content_changed = previous.content_hash != snapshot.content_hash
            || previous.embedder_model != snapshot.embedder_model;

        info!(
            version = snapshot.version,
            build_id = %snapshot.build_id,
            documents = snapshot.len(),
            model = %snapshot.embedder_model,
            content_hash = %snapshot.content_hash.get(..12).unwrap_or_default(),
            content_changed,
            "knowledge snapshot swapped in"
        );
        Ok(snapshot)
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::empty()
    }
}
