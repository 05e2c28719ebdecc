use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cardlink_core::config::ClassifierConfig;
use cardlink_core::traits::Classifier;

use crate::prompt::{user_prompt, SYSTEM_PROMPT};

/// Blocking client for an Anthropic-compatible `/v1/messages` endpoint.
pub struct MessagesClassifier {
    endpoint: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    client: Client,
}

impl MessagesClassifier {
    /// The key comes from `classifier.api_key`, else `ANTHROPIC_API_KEY`.
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| anyhow!("no classifier API key: set classifier.api_key or ANTHROPIC_API_KEY"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("failed to build classifier HTTP client")?;
        Ok(Self {
            endpoint: format!("{}/v1/messages", cfg.base_url.trim_end_matches('/')),
            api_key,
            api_version: cfg.api_version.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            client,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.api_key.trim()).context("invalid classifier API key")?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&self.api_version).context("invalid anthropic-version")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl Classifier for MessagesClassifier {
    fn classify(&self, context: &str, items: &[String]) -> Result<String> {
        let prompt = user_prompt(context, items);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: vec![ContentBlock { kind: "text", text: &prompt }],
            }],
        };
        let start = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .context("failed to call classifier messages API")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("classifier returned {}: {}", status, text);
        }
        let parsed: MessagesResponse = resp.json().context("failed to decode classifier response")?;
        debug!(items = items.len(), elapsed_ms = start.elapsed().as_millis() as u64, "classifier call finished");
        Ok(parsed.text())
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
struct ContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    /// Concatenated text blocks; empty when the model returned none, which
    /// the parser turns into `NoClass`.
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
