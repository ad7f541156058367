use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use silt_core::{Processor, ProcessorOptions, ProcessorOutcome, SiltError, SiltResult};

use crate::error::ProcessorError;
use crate::LLM_TASKS;

/// Talks to a remote (cloud) chat-completion API. Requires credentials at
/// construction time; `RateLimited`/`Transport` are retryable by the worker
/// pool via `SiltError::is_retryable`, `AuthFailure` and `BadRequest` (mapped
/// onto `InvalidInput`) are not.
pub struct RemoteLlmProcessor {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl RemoteLlmProcessor {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn complete(&self, prompt: &str, opts: &ProcessorOptions) -> Result<String, ProcessorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = opts.model.clone().unwrap_or_else(|| self.model.clone());
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": opts.temperature.unwrap_or(0.7),
                "max_tokens": opts.max_tokens,
            }))
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => {
                let body: Value = resp.json().await?;
                Ok(body["choices"][0]["message"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string())
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(ProcessorError::AuthFailure("remote API rejected credentials".into()))
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(ProcessorError::RateLimited),
            s => Err(ProcessorError::BadRequest(format!("status {s}"))),
        }
    }
}

#[async_trait]
impl Processor for RemoteLlmProcessor {
    async fn process(
        &self,
        content: &str,
        task: &str,
        opts: &ProcessorOptions,
    ) -> SiltResult<ProcessorOutcome> {
        if !LLM_TASKS.contains(&task) {
            return Err(SiltError::UnknownTask(task.to_string()));
        }
        if content.trim().is_empty() {
            return Err(SiltError::InvalidInput("content must not be empty".into()));
        }

        let prompt = format!("{task}: {content}");
        let text = self.complete(&prompt, opts).await?;

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "model".to_string(),
            Value::from(opts.model.clone().unwrap_or_else(|| self.model.clone())),
        );

        Ok(ProcessorOutcome {
            content: text,
            metadata,
        })
    }

    fn supported_tasks(&self) -> &[&str] {
        LLM_TASKS
    }
}
