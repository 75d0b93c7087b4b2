use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::config::Settings;
use crate::schemas::ocr::TextRegion;
use crate::services::collaborators::OcrProvider;
use crate::services::retry::RetryPolicy;

/// HTTP OCR vendor: posts a base64 image, receives typed text regions.
#[derive(Debug, Clone)]
pub(crate) struct HttpOcrClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct RecognizeReply {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default, alias = "text_regions")]
    regions: Vec<TextRegion>,
}

impl HttpOcrClient {
    pub(crate) fn from_settings(settings: &Settings, retry: RetryPolicy) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ocr().timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(timeout)
            .build()
            .context("Failed to build OCR HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ocr().api_key.clone(),
            base_url: settings.ocr().base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn recognize_once(&self, payload: &Value) -> Result<Vec<TextRegion>> {
        let endpoint = format!("{}/recognize", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .header("X-Api-Key", &self.api_key)
            .json(payload)
            .send()
            .await
            .context("Failed to call OCR API")?;

        let status = response.status();
        let raw_body = response.text().await.context("Failed to read OCR response")?;
        let parsed = serde_json::from_str::<Value>(&raw_body).map_err(|err| {
            anyhow::anyhow!("OCR returned non-JSON body (status {}): {}: {}", status, err, raw_body)
        })?;

        if !status.is_success() {
            let message = extract_error_message(&parsed);
            anyhow::bail!("OCR request failed (status {}): {}", status, message);
        }

        parse_reply(parsed)
    }
}

#[async_trait]
impl OcrProvider for HttpOcrClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn recognize(&self, image: &[u8]) -> Result<Vec<TextRegion>> {
        let payload = json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
            "detect_handwriting": true,
        });
        self.retry.run("ocr_recognize", || self.recognize_once(&payload)).await
    }
}

fn parse_reply(payload: Value) -> Result<Vec<TextRegion>> {
    if payload.get("success").and_then(Value::as_bool).is_some_and(|value| !value) {
        anyhow::bail!("OCR returned success=false: {}", extract_error_message(&payload));
    }

    let container = payload.get("result").cloned().unwrap_or(payload);
    let reply: RecognizeReply =
        serde_json::from_value(container).context("Malformed OCR regions payload")?;
    if reply.success == Some(false) {
        anyhow::bail!("OCR result marked unsuccessful");
    }

    Ok(reply.regions)
}

fn extract_error_message(payload: &Value) -> String {
    if let Some(detail) = payload.get("detail") {
        if let Some(text) = detail.as_str() {
            return text.to_string();
        }
        if let Some(items) = detail.as_array() {
            let joined = items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .and_then(Value::as_str)
                        .or_else(|| item.get("message").and_then(Value::as_str))
                })
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return joined;
            }
        }
    }

    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .unwrap_or("unknown_error")
        .to_string()
}
