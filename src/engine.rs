//! Wiring: config → corpus, providers and a ready [`Pipeline`].

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use clinical_harness_core::corpus::build_corpus;
use clinical_harness_core::models::Corpus;
use clinical_harness_core::store::KnowledgeBase;
use clinical_harness_core::Pipeline;

use crate::completion::create_completion;
use crate::config::Config;
use crate::embedding::create_embedder;

/// Read the reference text. A missing or unreadable file is logged and
/// treated as absent.
pub fn read_reference_text(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let digest = Sha256::digest(text.as_bytes());
            let fingerprint: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
            info!(
                path = %path.display(),
                chars = text.chars().count(),
                sha256 = %fingerprint,
                "loaded reference text"
            );
            Some(text)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "reference text unavailable");
            None
        }
    }
}

/// Build the corpus described by `[corpus]`.
pub fn load_corpus(config: &Config) -> Corpus {
    let reference = config
        .corpus
        .reference_text
        .as_deref()
        .and_then(read_reference_text);
    build_corpus(reference.as_deref())
}

/// Build the pipeline: providers from config, then an initial snapshot.
///
/// Provider construction errors (missing API key, unknown model) are fatal.
/// A failed initial build is not: the pipeline starts on an empty snapshot
/// and answers degrade until a rebuild succeeds.
pub fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let embedder = create_embedder(&config.embedding)?;
    let completion = create_completion(&config.completion)?;
    let keywords = config.keyword_table()?;
    let settings = config.pipeline_settings();

    let corpus = load_corpus(config);
    let knowledge = match KnowledgeBase::build(&corpus, embedder.as_ref(), &settings.build) {
        Ok(kb) => kb,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "initial knowledge build failed, serving empty snapshot");
            KnowledgeBase::empty()
        }
    };

    info!(
        embedder = embedder.model_name(),
        completion = completion.name(),
        documents = knowledge.snapshot().len(),
        "pipeline ready"
    );

    Ok(Pipeline::new(
        Arc::new(knowledge),
        embedder,
        completion,
        keywords,
        settings,
    ))
}

/// Reload the corpus from disk and swap in a fresh snapshot.
pub fn reload(pipeline: &Pipeline, config: &Config) -> Result<u64> {
    let corpus = load_corpus(config);
    let snapshot = pipeline.rebuild(&corpus)?;
    Ok(snapshot.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinical_harness_core::corpus::REFERENCE_CATEGORY;
    use std::path::PathBuf;

    #[test]
    fn test_missing_reference_file_is_not_fatal() {
        let mut config = Config::minimal();
        config.corpus.reference_text = Some(PathBuf::from("/nonexistent/section01.txt"));
        let corpus = load_corpus(&config);
        assert!(corpus.category(REFERENCE_CATEGORY).is_none());
        assert_eq!(corpus.len(), 6);
    }

    #[test]
    fn test_reference_file_adds_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.txt");
        std::fs::write(&path, "Drug Overdose and Poisoning\nGive activated charcoal early.").unwrap();
        let mut config = Config::minimal();
        config.corpus.reference_text = Some(path);
        let corpus = load_corpus(&config);
        assert_eq!(corpus.category(REFERENCE_CATEGORY).unwrap().items.len(), 2);
    }

    #[test]
    fn test_disabled_embedder_serves_empty_snapshot() {
        let mut config = Config::minimal();
        config.embedding.provider = "disabled".to_string();
        let pipeline = build_pipeline(&config).unwrap();
        assert!(pipeline.knowledge().snapshot().is_empty());
        let answer = pipeline.answer("hand hygiene", &[]);
        assert_eq!(answer.bullets, vec!["• Not available"]);
        assert!(reload(&pipeline, &config).is_err());
    }

    #[test]
    fn test_reload_bumps_version() {
        let config = Config::minimal();
        let pipeline = build_pipeline(&config).unwrap();
        let before = pipeline.knowledge().snapshot().version;
        assert!(reload(&pipeline, &config).unwrap() > before);
    }
}
