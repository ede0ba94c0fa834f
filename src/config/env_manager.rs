use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable holding the Gemini API key
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
/// Environment variable holding the ImgBB API key
pub const IMGBB_API_KEY: &str = "IMGBB_API_KEY";
/// Environment variable holding the SerpAPI key
pub const SERPAPI_KEY: &str = "SERPAPI_KEY";
/// Environment variable holding the Clipdrop API key
pub const CLIPDROP_API_KEY: &str = "CLIPDROP_API_KEY";

/// Stores API keys for the hosted services the backend talks to
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    /// Gemini (generative model) key
    pub gemini: Option<String>,
    /// ImgBB (image host) key
    pub imgbb: Option<String>,
    /// SerpAPI (reverse image search) key
    pub serpapi: Option<String>,
    /// Clipdrop (text-to-image) key
    pub clipdrop: Option<String>,
}

impl ApiKeys {
    /// Overrides any key whose environment variable is set and non-empty
    pub fn apply_env(&mut self) {
        if let Some(key) = get_env_value(GEMINI_API_KEY) {
            self.gemini = Some(key);
        }
        if let Some(key) = get_env_value(IMGBB_API_KEY) {
            self.imgbb = Some(key);
        }
        if let Some(key) = get_env_value(SERPAPI_KEY) {
            self.serpapi = Some(key);
        }
        if let Some(key) = get_env_value(CLIPDROP_API_KEY) {
            self.clipdrop = Some(key);
        }
    }

    /// Looks up the key for a service name together with its env var name
    pub(crate) fn lookup(&self, service: &str) -> (Option<&str>, &'static str) {
        match service {
            "gemini" => (self.gemini.as_deref(), GEMINI_API_KEY),
            "imgbb" => (self.imgbb.as_deref(), IMGBB_API_KEY),
            "serpapi" => (self.serpapi.as_deref(), SERPAPI_KEY),
            "clipdrop" => (self.clipdrop.as_deref(), CLIPDROP_API_KEY),
            _ => (None, "UNKNOWN_SERVICE_KEY"),
        }
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(key: &Option<String>) -> &'static str {
            if key.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("ApiKeys")
            .field("gemini", &redact(&self.gemini))
            .field("imgbb", &redact(&self.imgbb))
            .field("serpapi", &redact(&self.serpapi))
            .field("clipdrop", &redact(&self.clipdrop))
            .finish()
    }
}

/// Reads an environment variable, treating empty values as unset
pub fn get_env_value(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
