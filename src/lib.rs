#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]

//! ContentPublisher - backend for the content publisher Adobe Express add-on
//!
//! This library relays prompts and canvas exports from the add-on panel to
//! hosted AI services and returns JSON. Its core is a rate-limited, retrying
//! batch pipeline that runs a vision model over past post images, splits the
//! posts by popularity and aggregates per-category feature frequencies.
//!
//! ## Features
//! - Past-post image analysis with background jobs
//! - Add-on sandbox code generation from a design request
//! - Brand compliance checks against uploaded guidelines
//! - Copyright checks through reverse image search
//! - On-brand image generation informed by the analysis
//!
//! ## Usage
//! ```rust,ignore
//! use contentpublisher::{Config, Services, routes};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let services = Services::from_config(config)?;
//!     let app = routes::create_app(routes::AppState::new(services));
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

/// Past-post image analysis pipeline
pub mod analysis;
/// Service layer and background analysis jobs
pub mod api;
/// Brand compliance and copyright checks
pub mod compliance;
/// Configuration module for the application
pub mod config;
/// Add-on code generation
pub mod design;
/// Error handling types and utilities
pub mod error;
/// Generative model client
pub mod gemini;
/// Text-to-image generation
pub mod image_generator;
/// Logging configuration and utilities
pub mod logging;
/// Prompt templates
pub mod prompts;
/// Rate limiting functionality to respect API limits
pub mod rate_limiter;
/// HTTP routes
pub mod routes;
/// Uploads folder management
pub mod storage;
/// Utilities (path helpers, retry helpers)
pub mod utils;

// Re-export common types
pub use analysis::{AnalysisOptions, AnalysisReport, ImageFeatureAnalyzer, PostData};
pub use api::{JobManager, Services};
pub use config::Config;
pub use error::{PublisherError, Result};
pub use gemini::{GeminiClient, GenerateRequest, GenerativeModel, ThrottledModel};
pub use rate_limiter::RateLimiter;
pub use storage::UploadStore;
