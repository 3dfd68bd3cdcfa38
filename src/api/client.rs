use super::logging::{debug_stream_enabled, emit_request_debug};
use crate::config::Config;
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

const SYSTEM_PROMPT: &str = "You are a writing assistant that extends an existing document.\n\
Your reply is appended verbatim to the document, so never repeat or reproduce existing content.\n\
Provide only new material that directly answers the user's query.\n\
Preserve the exact markdown heading levels used in the selected text; never jump levels.\n\
Mirror the source formatting: bullet styles, numbered lists, and bold emphasis as shown.\n\
Respond in clean markdown with no preamble and no closing commentary.";

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, prompt: &str, context: &str) -> Result<ByteStream>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_url: String,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_url: config.api_url.clone(),
            #[cfg(test)]
            mock_stream_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
            model: "mock-model".to_string(),
            api_url: "http://localhost:8080/v1/chat/completions".to_string(),
            mock_stream_producer: Some(mock_producer),
        }
    }

    /// Issues one streaming generation request and returns the raw chunk
    /// stream. Framing and accumulation are the decoder/aggregator's job.
    pub async fn create_stream(&self, prompt: &str, context: &str) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(prompt, context);
            }
        }

        let payload = json!({
            "model": self.model,
            "stream": true,
            "max_tokens": resolve_max_tokens(),
            "temperature": 0.7,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_prompt(prompt, context) },
            ],
        });

        let mut request = self
            .http
            .post(&self.api_url)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.api_key {
            request = request.header("authorization", format!("Bearer {api_key}"));
        }

        if debug_stream_enabled() {
            emit_request_debug(&self.api_url, &payload);
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_request_error(error, &self.api_url))?
            .error_for_status()
            .map_err(|error| map_request_error(error, &self.api_url))?;

        let request_url_for_stream = self.api_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }
}

fn map_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local API endpoint '{}': {}. Start your local server or update INK_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach API endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("API request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "API endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("API request to '{}' failed: {}", request_url, error)
}

fn resolve_max_tokens() -> u32 {
    std::env::var("INK_MAX_TOKENS")
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .map(|v| v.clamp(128, 8192))
        .unwrap_or(1000)
}

/// Builds the user message: the query, the selected-text context, and a
/// reminder of the heading levels the reply must keep using.
pub fn build_user_prompt(query: &str, context: &str) -> String {
    let mut user_prompt = format!("User Query: {query}\n");

    if !context.is_empty() {
        user_prompt.push_str(&format!(
            "\nSelected text to analyze (preserve the heading structure shown below):\n{context}\n"
        ));

        let headings = context_heading_levels(context);
        if !headings.is_empty() {
            let shown = headings
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            user_prompt.push_str(&format!(
                "\nThe selected text uses these heading levels: {shown}. Continue using the same levels in your response.\n"
            ));
        }
    }

    user_prompt.push_str(
        "\nProvide only a direct response to the query about the selected text. \
         Do not repeat the selected text or any existing content; your response \
         will be appended to the document.",
    );

    user_prompt
}

fn context_heading_levels(context: &str) -> Vec<String> {
    context
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}
