use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::core::config::Settings;

/// Chat-completions client that always asks for a JSON object back.
#[derive(Debug, Clone)]
pub(crate) struct AiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl AiClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
            temperature: settings.ai().ai_temperature,
        })
    }

    /// One request, no retries; callers wrap this in their `RetryPolicy`.
    pub(crate) async fn complete_json<T: DeserializeOwned>(
        &self,
        purpose: &'static str,
        instruction: &str,
        input: &Value,
    ) -> Result<T> {
        let timer = Instant::now();
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": instruction},
                {"role": "user", "content": input.to_string()}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to call chat completions API")?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            anyhow::bail!("chat completions API error (status {status}): {body}");
        }

        let content = extract_content(&body).context("Missing chat completion content")?;
        let parsed = serde_json::from_str(content)
            .with_context(|| format!("Failed to parse {purpose} JSON"))?;

        let tokens_used = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(|value| value.as_u64());
        tracing::debug!(
            purpose,
            model = %self.model,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used,
            "AI completion finished"
        );

        Ok(parsed)
    }
}

fn extract_content(body: &Value) -> Option<&str> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|value| value.as_str())
}
