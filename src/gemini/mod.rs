//! Generative model client.
//!
//! Every model call in the backend goes through the [`GenerativeModel`]
//! trait so that the analyzer, checkers and generators can be exercised
//! against fakes. [`GeminiClient`] is the production implementation over the
//! Gemini `generateContent` REST endpoint.

mod throttled;
mod types;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use tracing::debug;

use crate::config::Config;
use crate::error::{PublisherError, Result};

pub use throttled::ThrottledModel;
pub use types::{GenerateRequest, Part};
use types::{WireBlob, WireContent, WireErrorEnvelope, WirePart, WireRequest, WireResponse};

const SERVICE: &str = "gemini";

/// A text-producing generative model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier, for logs and reports
    fn model_id(&self) -> &str;

    /// Runs one generation and returns the response text
    async fn generate(&self, request: GenerateRequest) -> Result<String>;
}

/// Gemini REST client
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Creates a client for `model` against `base_url`
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Self::with_client(Client::builder().build()?, api_key, model, base_url)
    }

    /// Creates a client using a preconfigured `reqwest` client
    pub fn with_client(
        client: Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(PublisherError::Config("Gemini API key is empty".into()));
        }
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Builds the client from application config
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.gemini.timeout()).build()?;
        Self::with_client(
            client,
            config.require_key(SERVICE)?,
            config.gemini.model.clone(),
            config.gemini.base_url.clone(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn to_wire(request: GenerateRequest) -> WireRequest {
        let parts = request
            .parts
            .into_iter()
            .map(|part| match part {
                Part::Text(text) => WirePart {
                    text: Some(text),
                    ..WirePart::default()
                },
                Part::InlineData { mime_type, data } => WirePart {
                    inline_data: Some(WireBlob {
                        mime_type,
                        data: BASE64.encode(data),
                    }),
                    ..WirePart::default()
                },
            })
            .collect();

        WireRequest {
            contents: vec![WireContent {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: request.system_instruction.map(|text| WireContent {
                role: None,
                parts: vec![WirePart {
                    text: Some(text),
                    ..WirePart::default()
                }],
            }),
        }
    }
}

/// Maps a failed response to the crate error, detecting quota exhaustion
fn classify_failure(status: u16, body: &str) -> PublisherError {
    let (message, api_status) = match serde_json::from_str::<WireErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.trim().to_string(), String::new()),
    };

    if status == 429 || api_status == "RESOURCE_EXHAUSTED" {
        return PublisherError::RateLimitExceeded(if message.is_empty() {
            format!("{} returned {}", SERVICE, status)
        } else {
            message
        });
    }
    PublisherError::upstream(SERVICE, status, message)
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        debug!(
            model = %self.model,
            parts = request.parts.len(),
            inline = request.inline_count(),
            "Gemini generateContent"
        );

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::to_wire(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body));
        }

        let data: WireResponse = response.json().await?;
        let text: String = data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PublisherError::EmptyResponse(SERVICE.to_string()));
        }
        Ok(text)
    }
}
