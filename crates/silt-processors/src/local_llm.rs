use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use silt_core::{Processor, ProcessorOptions, ProcessorOutcome, SiltError, SiltResult};
use silt_templates::PromptTemplateManager;
use std::sync::Arc;

use crate::error::ProcessorError;
use crate::LLM_TASKS;

/// Talks to a local inference daemon (an Ollama-compatible chat endpoint).
///
/// Each supported task renders a template named after the task (falling
/// back to a minimal built-in prompt when no such template is registered)
/// and sends it as a single-turn completion request. Transient connection
/// errors are retried a bounded number of times with exponential backoff;
/// a missing model is treated as fatal.
pub struct LocalLlmProcessor {
    http: reqwest::Client,
    base_url: String,
    model: String,
    templates: Option<Arc<PromptTemplateManager>>,
    max_retries: u32,
}

impl LocalLlmProcessor {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            templates: None,
            max_retries: 2,
        }
    }

    pub fn with_templates(mut self, templates: Arc<PromptTemplateManager>) -> Self {
        self.templates = Some(templates);
        self
    }

    async fn build_prompt(&self, content: &str, task: &str) -> String {
        if let Some(templates) = &self.templates {
            if let Ok(template) = templates.get_by_name(task).await {
                let mut vars = BTreeMap::new();
                vars.insert("content".to_string(), content.to_string());
                if let Ok(rendered) = template.render(&vars) {
                    return rendered;
                }
            }
        }
        format!("{task}: {content}")
    }

    async fn complete(&self, prompt: &str) -> Result<(String, u64), ProcessorError> {
        let mut attempt = 0;
        loop {
            let url = format!("{}/api/generate", self.base_url);
            let resp = self
                .http
                .post(&url)
                .json(&serde_json::json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": false,
                }))
                .send()
                .await;

            match resp {
                Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Err(ProcessorError::ModelNotFound(self.model.clone()));
                }
                Ok(resp) if resp.status().is_success() => {
                    let body: Value = resp.json().await?;
                    let text = body
                        .get("response")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let tokens = body
                        .get("eval_count")
                        .and_then(Value::as_u64)
                        .unwrap_or_else(|| (text.len() / 4) as u64);
                    return Ok((text, tokens));
                }
                Ok(resp) => {
                    return Err(ProcessorError::BadRequest(format!("status {}", resp.status())));
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "local llm transient error, retrying");
                    tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt))).await;
                }
                Err(e) => return Err(ProcessorError::Transport(e)),
            }
        }
    }
}

#[async_trait]
impl Processor for LocalLlmProcessor {
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

        let prompt = self.build_prompt(content, task).await;
        let started = std::time::Instant::now();
        let (text, tokens) = self.complete(&prompt).await?;

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "model".to_string(),
            Value::from(opts.model.clone().unwrap_or_else(|| self.model.clone())),
        );
        metadata.insert("tokens".to_string(), Value::from(tokens));
        metadata.insert(
            "elapsed_secs".to_string(),
            Value::from(started.elapsed().as_secs_f64()),
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
