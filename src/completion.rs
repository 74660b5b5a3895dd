//! Chat-completion clients.
//!
//! Both modes speak the OpenAI chat-completions wire format and implement
//! the core [`CompletionService`] trait. Each call builds a blocking client
//! with the configured timeout.
//!
//! | Mode | Endpoint | Auth | Retries |
//! |------|----------|------|---------|
//! | `openai` | api.openai.com (or `endpoint`) | bearer key from `api_key_env` | none |
//! | `local` | `endpoint` (LM Studio, llama.cpp, vLLM) | none | next `fallback_models` entry on HTTP 422 |
//! | `disabled` | none | none | every call fails |

use anyhow::{bail, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use clinical_harness_core::completion::{CompletionRequest, CompletionService, DisabledCompletion};

use crate::config::CompletionConfig;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of one HTTP round trip.
enum Attempt {
    Text(String),
    /// HTTP 422: the endpoint does not know the model.
    UnknownModel,
}

/// An OpenAI-compatible chat endpoint.
pub struct ChatCompletion {
    name: &'static str,
    endpoint: String,
    api_key: Option<String>,
    /// Tried in order; only HTTP 422 moves on to the next one.
    models: Vec<String>,
    timeout: Duration,
}

impl ChatCompletion {
    pub fn openai(config: &CompletionConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("completion.model required for openai mode"))?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;

        Ok(Self {
            name: "openai",
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            api_key: Some(api_key),
            models: vec![model],
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn local(config: &CompletionConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("completion.endpoint required for local mode"))?;
        // An empty model name asks the server for whatever model it has loaded.
        let mut models = vec![config.model.clone().unwrap_or_default()];
        models.extend(config.fallback_models.iter().cloned());

        Ok(Self {
            name: "local",
            endpoint,
            api_key: None,
            models,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn attempt(
        &self,
        client: &reqwest::blocking::Client,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<Attempt> {
        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": request.system_instruction },
                { "role": "user", "content": request.user_message },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
            "top_p": request.top_p,
            "stream": false,
        });

        let mut builder = client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .map_err(|e| anyhow::anyhow!("{} completion request failed: {}", self.name, e))?;
        let status = response.status();

        if status.as_u16() == 422 {
            return Ok(Attempt::UnknownModel);
        }
        if !status.is_success() {
            let body_text = response.text().unwrap_or_default();
            bail!(
                "{} completion error status={}: {}",
                self.name,
                status.as_u16(),
                body_text
            );
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| anyhow::anyhow!("{} completion body malformed: {}", self.name, e))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("{} completion body has no choices", self.name))?;
        Ok(Attempt::Text(text))
    }
}

impl CompletionService for ChatCompletion {
    fn name(&self) -> &str {
        self.name
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        for model in &self.models {
            match self.attempt(&client, model, request)? {
                Attempt::Text(text) => {
                    debug!(service = self.name, model = model.as_str(), chars = text.len(), "completion");
                    return Ok(text);
                }
                Attempt::UnknownModel => {
                    warn!(service = self.name, model = model.as_str(), "model not found, trying next");
                }
            }
        }

        bail!(
            "{} completion failed: no configured model accepted (status=422)",
            self.name
        )
    }
}

/// Create the [`CompletionService`] named by `completion.mode`.
pub fn create_completion(config: &CompletionConfig) -> Result<Arc<dyn CompletionService>> {
    match config.mode.as_str() {
        "openai" => Ok(Arc::new(ChatCompletion::openai(config)?)),
        "local" => Ok(Arc::new(ChatCompletion::local(config)?)),
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        other => bail!("Unknown completion mode: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_model_order() {
        let config = CompletionConfig {
            mode: "local".to_string(),
            endpoint: Some("http://127.0.0.1:1/v1/chat/completions".to_string()),
            fallback_models: vec!["phi-2".to_string(), "llama3".to_string()],
            ..Default::default()
        };
        let c = ChatCompletion::local(&config).unwrap();
        assert_eq!(c.models, vec!["", "phi-2", "llama3"]);
        assert!(c.api_key.is_none());
    }

    #[test]
    fn test_local_requires_endpoint() {
        let config = CompletionConfig {
            mode: "local".to_string(),
            ..Default::default()
        };
        assert!(create_completion(&config).is_err());
    }

    #[test]
    fn test_disabled_mode() {
        let c = create_completion(&CompletionConfig::default()).unwrap();
        assert_eq!(c.name(), "disabled");
    }

    #[test]
    fn test_connection_refused_is_an_error() {
        let config = CompletionConfig {
            mode: "local".to_string(),
            endpoint: Some("http://127.0.0.1:9/v1/chat/completions".to_string()),
            timeout_secs: 2,
            ..Default::default()
        };
        let c = create_completion(&config).unwrap();
        let request = CompletionRequest {
            system_instruction: "s".to_string(),
            user_message: "u".to_string(),
            temperature: 0.3,
            max_output_tokens: 10,
            top_p: 0.7,
        };
        assert!(c.complete(&request).is_err());
    }

    #[test]
    fn test_parse_chat_response() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"• Check airway"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("• Check airway")
        );
    }
}
