//! TOML configuration.
//!
//! Every section is optional. A missing section takes its defaults, and a
//! missing file can be replaced by [`Config::minimal`] for commands that run
//! offline.
//!
//! ```toml
//! [corpus]
//! reference_text = "data/kkh_section01.txt"
//!
//! [embedding]
//! provider = "hash"
//!
//! [completion]
//! mode = "local"
//! endpoint = "http://127.0.0.1:8000/v1/chat/completions"
//! model = "meditron-7b"
//! fallback_models = ["llama3"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clinical_harness_core::classify::{IntentTag, KeywordTable};
use clinical_harness_core::completion::PromptSettings;
use clinical_harness_core::context::ContextSettings;
use clinical_harness_core::retrieve::RetrievalSettings;
use clinical_harness_core::store::BuildOptions;
use clinical_harness_core::PipelineSettings;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    /// Per-tag keyword lists, keyed by tag name (`emergency`, `pediatric`, ...).
    #[serde(default)]
    pub classifier: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub server: ServerConfig,
}

// ============ [corpus] ============

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Long-form reference text split into chapters.
    #[serde(default)]
    pub reference_text: Option<PathBuf>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            reference_text: None,
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    300
}

// ============ [retrieval] ============

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k_general")]
    pub top_k_general: usize,
    #[serde(default = "default_top_k_emergency")]
    pub top_k_emergency: usize,
    #[serde(default = "default_top_k_follow_up")]
    pub top_k_follow_up: usize,
    #[serde(default = "default_top_k_pediatric")]
    pub top_k_pediatric: usize,
    #[serde(default = "default_top_k_pediatric_alternate")]
    pub top_k_pediatric_alternate: usize,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default)]
    pub similarity_floor: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_general: default_top_k_general(),
            top_k_emergency: default_top_k_emergency(),
            top_k_follow_up: default_top_k_follow_up(),
            top_k_pediatric: default_top_k_pediatric(),
            top_k_pediatric_alternate: default_top_k_pediatric_alternate(),
            max_candidates: default_max_candidates(),
            similarity_floor: 0.0,
        }
    }
}

fn default_top_k_general() -> usize {
    3
}
fn default_top_k_emergency() -> usize {
    4
}
fn default_top_k_follow_up() -> usize {
    5
}
fn default_top_k_pediatric() -> usize {
    6
}
fn default_top_k_pediatric_alternate() -> usize {
    4
}
fn default_max_candidates() -> usize {
    10
}

// ============ [embedding] ============

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for `ollama` (default `http://localhost:11434`) or an
    /// OpenAI-compatible embeddings endpoint for `openai`.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

// ============ [completion] ============

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Tried in order when a local endpoint rejects the model with HTTP 422.
    #[serde(default)]
    pub fallback_models: Vec<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_completion_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_scenario_max_tokens")]
    pub scenario_max_tokens: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            endpoint: None,
            model: None,
            fallback_models: Vec::new(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_completion_max_tokens(),
            scenario_max_tokens: default_scenario_max_tokens(),
        }
    }
}

fn default_mode() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_top_p() -> f32 {
    0.7
}
fn default_completion_max_tokens() -> u32 {
    120
}
fn default_scenario_max_tokens() -> u32 {
    150
}

// ============ [assistant] / [server] ============

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_persona() -> String {
    "Sarah".to_string()
}
fn default_history_turns() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Offline defaults: hashing embedder, completion disabled, no reference text.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// The keyword table with any `[classifier]` overrides applied.
    pub fn keyword_table(&self) -> Result<KeywordTable> {
        let mut table = KeywordTable::builtin();
        for (name, keywords) in &self.classifier {
            let tag: IntentTag = name
                .parse()
                .map_err(|_| anyhow::anyhow!("Unknown classifier tag: '{}'", name))?;
            table.set(tag, keywords);
        }
        Ok(table)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let r = &self.retrieval;
        let c = &self.completion;
        PipelineSettings {
            retrieval: RetrievalSettings {
                top_k_general: r.top_k_general,
                top_k_emergency: r.top_k_emergency,
                top_k_follow_up: r.top_k_follow_up,
                top_k_pediatric: r.top_k_pediatric,
                top_k_pediatric_alternate: r.top_k_pediatric_alternate,
                max_candidates: r.max_candidates,
                similarity_floor: r.similarity_floor,
            },
            context: ContextSettings {
                history_turns: self.assistant.history_turns,
                persona: self.assistant.persona.clone(),
                ..ContextSettings::default()
            },
            prompt: PromptSettings {
                temperature: c.temperature,
                top_p: c.top_p,
                max_tokens: c.max_tokens,
                scenario_max_tokens: c.scenario_max_tokens,
            },
            build: BuildOptions {
                max_tokens: self.corpus.max_tokens,
                batch_size: self.embedding.batch_size,
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Relative paths resolve against the config file's directory.
    if let Some(rel) = config.corpus.reference_text.clone().filter(|p| p.is_relative()) {
        if let Some(dir) = path.parent() {
            config.corpus.reference_text = Some(dir.join(rel));
        }
    }

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate corpus
    if config.corpus.max_tokens == 0 {
        bail!("corpus.max_tokens must be > 0");
    }

    // Validate retrieval
    let r = &config.retrieval;
    for (name, value) in [
        ("top_k_general", r.top_k_general),
        ("top_k_emergency", r.top_k_emergency),
        ("top_k_follow_up", r.top_k_follow_up),
        ("top_k_pediatric", r.top_k_pediatric),
        ("top_k_pediatric_alternate", r.top_k_pediatric_alternate),
        ("max_candidates", r.max_candidates),
    ] {
        if value < 1 {
            bail!("retrieval.{} must be >= 1", name);
        }
    }

    // Validate embedding
    let e = &config.embedding;
    if e.timeout_secs < 1 {
        bail!("embedding.timeout_secs must be >= 1");
    }
    if e.batch_size < 1 {
        bail!("embedding.batch_size must be >= 1");
    }
    match e.provider.as_str() {
        "hash" | "local" | "disabled" => {}
        "openai" | "ollama" => {
            if e.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    e.provider
                );
            }
            if e.dims.is_none() || e.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    e.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, local, or disabled.",
            other
        ),
    }
    if e.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    // Validate completion
    let c = &config.completion;
    if c.timeout_secs < 1 {
        bail!("completion.timeout_secs must be >= 1");
    }
    if !(0.0..=2.0).contains(&c.temperature) {
        bail!("completion.temperature must be in [0.0, 2.0]");
    }
    if !(c.top_p > 0.0 && c.top_p <= 1.0) {
        bail!("completion.top_p must be in (0.0, 1.0]");
    }
    match c.mode.as_str() {
        "disabled" => {}
        "openai" => {
            if c.model.is_none() {
                bail!("completion.model must be specified when mode is 'openai'");
            }
        }
        "local" => {
            if c.endpoint.is_none() {
                bail!("completion.endpoint must be specified when mode is 'local'");
            }
        }
        other => bail!(
            "Unknown completion mode: '{}'. Must be openai, local, or disabled.",
            other
        ),
    }

    // Validate classifier overrides
    config.keyword_table()?;

    Ok(())
}
