//! Completion backends behind the provider chain.
//!
//! One trait seam so the fallback logic is testable without HTTP. The real
//! backend speaks each provider's wire dialect; the mock replays a script.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::pipeline::providers::ProviderSpec;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("no API key configured")]
    MissingKey,
    #[error("rate limited: {0}")]
    Throttled(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed completion payload")]
    Malformed,
}

impl BackendError {
    /// Throttle-shaped errors put the provider on cooldown.
    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        spec: &ProviderSpec,
        cfg: &PipelineConfig,
        prompt: &str,
    ) -> Result<String, BackendError>;
}

/// Production backend: one HTTP call per provider dialect.
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn gemini(
        &self,
        model: &str,
        key: &str,
        prompt: &str,
    ) -> Result<String, BackendError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent?key={key}"
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2 }
        });
        let response = self.post_json(&url, None, body).await?;
        response
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.pointer("/content/parts"))
            .and_then(|p| p.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or(BackendError::Malformed)
    }

    /// OpenAI-style chat completion, shared by groq and openrouter.
    async fn chat_completion(
        &self,
        url: &str,
        model: &str,
        key: &str,
        prompt: &str,
    ) -> Result<String, BackendError> {
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.2
        });
        let response = self.post_json(url, Some(key), body).await?;
        response
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or(BackendError::Malformed)
    }

    async fn ollama(
        &self,
        cfg: &PipelineConfig,
        model: &str,
        prompt: &str,
    ) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", cfg.ollama_endpoint.trim_end_matches('/'));
        let body = json!({ "model": model, "prompt": prompt, "stream": false });
        let response = self.post_json(&url, None, body).await?;
        response
            .get("response")
            .and_then(|r| r.as_str())
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or(BackendError::Malformed)
    }

    async fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        let mut request = self.client.post(url).json(&body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::Throttled(truncate(&detail, 200)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let lowered = detail.to_lowercase();
            // Some providers report quota exhaustion with a generic status.
            if lowered.contains("quota") || lowered.contains("rate limit") {
                return Err(BackendError::Throttled(truncate(&detail, 200)));
            }
            return Err(BackendError::Status(status.as_u16()));
        }
        response.json().await.map_err(|_| BackendError::Malformed)
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(
        &self,
        spec: &ProviderSpec,
        cfg: &PipelineConfig,
        prompt: &str,
    ) -> Result<String, BackendError> {
        let model = cfg
            .provider_models
            .get(spec.name)
            .map(String::as_str)
            .unwrap_or(spec.default_model);
        let key = cfg.provider_keys.get(spec.name).map(String::as_str);

        match spec.name {
            "gemini" => {
                let key = key.ok_or(BackendError::MissingKey)?;
                self.gemini(model, key, prompt).await
            }
            "groq" => {
                let key = key.ok_or(BackendError::MissingKey)?;
                self.chat_completion(
                    "https://api.groq.com/openai/v1/chat/completions",
                    model,
                    key,
                    prompt,
                )
                .await
            }
            "openrouter" => {
                let key = key.ok_or(BackendError::MissingKey)?;
                self.chat_completion(
                    "https://openrouter.ai/api/v1/chat/completions",
                    model,
                    key,
                    prompt,
                )
                .await
            }
            "ollama" => self.ollama(cfg, model, prompt).await,
            other => Err(BackendError::Request(format!("unknown provider {other}"))),
        }
    }
}

/// Scripted backend for tests: pops one canned result per call and records
/// every prompt it was handed.
#[cfg(test)]
pub struct MockBackend {
    script: std::sync::Mutex<std::collections::VecDeque<Result<String, BackendError>>>,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockBackend {
    pub fn new(script: Vec<Result<String, BackendError>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into_iter().collect()),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(
        &self,
        _spec: &ProviderSpec,
        _cfg: &PipelineConfig,
        prompt: &str,
    ) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Request("script exhausted".into())))
    }
}
