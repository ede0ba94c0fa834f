mod env_manager;

use crate::error::{PublisherError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub use env_manager::{get_env_value, ApiKeys};

/// Main configuration struct for the application
///
/// Loaded from a TOML file when one exists, then overlaid with environment
/// variables for secrets and a few deployment knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Where uploads, reports and generated files live
    pub storage: StorageConfig,
    /// Generative model settings
    pub gemini: GeminiSettings,
    /// Defaults for past-post analysis
    pub analysis: AnalysisSettings,
    /// Rate limit settings for the model API
    pub rate_limits: RateLimits,
    /// Backoff settings for rate-limited calls
    pub retry: RetrySettings,
    /// Endpoints of the auxiliary services
    pub services: ServiceEndpoints,
    /// API keys for the hosted services
    pub api_keys: ApiKeys,
    /// Default log level when `RUST_LOG` is not set
    pub log_level: String,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
    /// How long finished analysis jobs stay listed, in seconds
    pub job_retention_seconds: u64,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the uploads folder
    pub uploads_dir: PathBuf,
    /// File the generated add-on sandbox code is written to
    ///
    /// Relative paths are taken from the directory the process starts in.
    pub design_output: PathBuf,
}

impl StorageConfig {
    /// Anchors relative storage paths at `base`
    pub fn resolve_relative_to(&mut self, base: &Path) {
        for path in [&mut self.uploads_dir, &mut self.design_output] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Generative model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    /// Model identifier
    pub model: String,
    /// REST API base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

/// Defaults for past-post analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Share of posts (by likes) treated as high performing
    pub top_percentage: f64,
    /// Minimum share of posts a feature must appear in to be common
    pub feature_threshold: f64,
}

/// Rate limit settings for the model API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    /// Requests allowed in any sliding minute
    pub gemini_requests_per_minute: usize,
    /// Minimum spacing between consecutive requests, in seconds
    pub gemini_min_delay_seconds: f64,
}

/// Backoff settings for rate-limited calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds
    pub base_delay_seconds: f64,
    /// Growth factor applied per attempt
    pub multiplier: f64,
}

/// Endpoints of the auxiliary services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoints {
    /// ImgBB upload endpoint
    pub imgbb_url: String,
    /// SerpAPI search endpoint
    pub serpapi_url: String,
    /// Clipdrop text-to-image endpoint
    pub clipdrop_url: String,
}

impl Config {
    /// Creates a new configuration rooted at the specified uploads directory
    pub fn new(uploads_dir: PathBuf) -> Self {
        Self {
            storage: StorageConfig {
                uploads_dir,
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("content-publisher").join("config.toml"))
    }

    /// Loads configuration from `path`, or from the default location
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    PublisherError::Config(format!(
                        "Failed to read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_toml(&content)?
            }
            _ => Self::default(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Parses configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlays secrets and deployment overrides from the environment
    pub fn apply_env(&mut self) {
        self.api_keys.apply_env();

        if let Some(dir) = get_env_value("PUBLISHER_UPLOADS_DIR") {
            self.storage.uploads_dir = PathBuf::from(dir);
        }
        if let Some(port) = get_env_value("PUBLISHER_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    /// Validates the configuration and prepares the uploads directory
    pub async fn validate(&self) -> Result<()> {
        check_fraction("analysis.top_percentage", self.analysis.top_percentage)?;
        check_fraction("analysis.feature_threshold", self.analysis.feature_threshold)?;

        if self.retry.max_attempts == 0 {
            return Err(PublisherError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(PublisherError::Config(format!(
                "retry.multiplier must be a finite number of at least 1, got {}",
                self.retry.multiplier
            )));
        }
        check_seconds("retry.base_delay_seconds", self.retry.base_delay_seconds)?;
        check_seconds(
            "rate_limits.gemini_min_delay_seconds",
            self.rate_limits.gemini_min_delay_seconds,
        )?;
        if self.rate_limits.gemini_requests_per_minute == 0 {
            return Err(PublisherError::Config(
                "rate_limits.gemini_requests_per_minute must be at least 1".into(),
            ));
        }

        for endpoint in [
            &self.gemini.base_url,
            &self.services.imgbb_url,
            &self.services.serpapi_url,
            &self.services.clipdrop_url,
        ] {
            Url::parse(endpoint)?;
        }

        self.ensure_directories_exist().await
    }

    /// Ensures the uploads directory exists
    pub async fn ensure_directories_exist(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.storage.uploads_dir).await?;
        Ok(())
    }

    /// Returns the API key for `service` or a config error naming the env var
    pub fn require_key(&self, service: &str) -> Result<&str> {
        let (key, env_var) = self.api_keys.lookup(service);
        key.ok_or_else(|| {
            PublisherError::Config(format!(
                "{} API key not configured (set {})",
                service, env_var
            ))
        })
    }

    /// Socket address for the HTTP listener
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| PublisherError::Config(format!("Invalid bind address: {}", e)))
    }
}

impl GeminiSettings {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(PublisherError::Config(format!(
            "{} must be in (0, 1], got {}",
            name, value
        )))
    }
}

fn check_seconds(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PublisherError::Config(format!(
            "{} must be a finite, non-negative number of seconds, got {}",
            name, value
        )))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            gemini: GeminiSettings::default(),
            analysis: AnalysisSettings::default(),
            rate_limits: RateLimits::default(),
            retry: RetrySettings::default(),
            services: ServiceEndpoints::default(),
            api_keys: ApiKeys::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 25 * 1024 * 1024,
            job_retention_seconds: 3600,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            design_output: PathBuf::from("src").join("code.js"),
        }
    }
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-3-flash-preview".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_seconds: 120,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_percentage: 0.3,
            feature_threshold: 0.3,
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            gemini_requests_per_minute: 5,
            gemini_min_delay_seconds: 12.0,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_seconds: 20.0,
            multiplier: 3.0,
        }
    }
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            imgbb_url: "https://api.imgbb.com/1/upload".to_string(),
            serpapi_url: "https://serpapi.com/search.json".to_string(),
            clipdrop_url: "https://clipdrop-api.co/text-to-image/v1".to_string(),
        }
    }
}
