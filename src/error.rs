use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::io;
use thiserror::Error;
use tracing::error;

/// Custom result type alias for the application
pub type Result<T> = std::result::Result<T, PublisherError>;

/// Substrings that upstream APIs use when a quota or rate limit was hit
const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "resource_exhausted",
    "quota",
    "rate limit",
    "too many requests",
    "limit exceeded",
];

/// Errors raised while serving add-on requests
#[derive(Debug, Error)]
pub enum PublisherError {
    /// I/O errors
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing/serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Config file parse errors
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// General message errors
    #[error("{0}")]
    Message(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A file, report or job that the caller asked for does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// API rate limit exceeded errors
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// A third-party API answered with a failure status
    #[error("{service} API error ({status}): {message}")]
    Upstream {
        /// Name of the remote service
        service: String,
        /// HTTP status returned by the service
        status: u16,
        /// Error detail extracted from the response
        message: String,
    },

    /// A third-party API answered successfully but without usable content
    #[error("Empty response from {0}")]
    EmptyResponse(String),

    /// Parsing errors
    #[error("Parsing error: {0}")]
    Parse(String),
}

impl PublisherError {
    /// Creates a new error with the specified message
    pub fn new(message: &str) -> Self {
        Self::Message(message.to_string())
    }

    /// Builds an upstream error for `service`
    pub fn upstream(service: &str, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Checks if this error reports an exhausted quota or rate limit
    ///
    /// Only these errors are worth waiting out; everything else fails fast.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimitExceeded(_) => true,
            Self::Upstream { status: 429, .. } => true,
            Self::Upstream { message, .. } | Self::Message(message) => {
                looks_rate_limited(message)
            }
            _ => false,
        }
    }

    /// Checks if this error is transient and retryable
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimitExceeded(_) | Self::IO(_)
        ) || self.is_rate_limited()
    }

    /// Checks if this error is fatal and should terminate processing
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }

    /// HTTP status reported to the add-on for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Returns true when `text` carries one of the known quota/rate-limit markers
pub fn looks_rate_limited(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker))
}

impl IntoResponse for PublisherError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
