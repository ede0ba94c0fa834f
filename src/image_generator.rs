//! Text-to-image generation informed by the past-post analysis.
//!
//! The stored analysis report and the newest brand guidelines are condensed
//! into a [`DesignBrief`]; the model turns the brief and the user's request
//! into a text-to-image prompt, and Clipdrop renders it.

use reqwest::multipart::Form;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::analysis::{top_feature_names, AnalysisReport};
use crate::compliance::{BrandGuidelines, GUIDELINES_EXCERPT_CHARS};
use crate::config::Config;
use crate::error::{PublisherError, Result};
use crate::gemini::{GenerateRequest, GenerativeModel};
use crate::prompts::{self, FEATURE_CATEGORIES};
use crate::storage::UploadStore;
use crate::utils::truncate_chars;

const CLIPDROP_TIMEOUT: Duration = Duration::from_secs(60);

/// Popular-post features and brand context fed to prompt crafting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignBrief {
    /// Feature names per category, most frequent first
    pub features: std::collections::BTreeMap<String, Vec<String>>,
    /// Written analysis insights
    pub insights: String,
    /// Guidelines excerpt, or a pointer to the attachment for PDF guidelines
    pub guidelines: String,
}

impl DesignBrief {
    /// Builds a brief from the popular group of `report`
    pub fn from_report(report: &AnalysisReport, guidelines: &BrandGuidelines) -> Self {
        let common = &report.popular_posts.common_features;
        let features = FEATURE_CATEGORIES
            .iter()
            .map(|category| (category.to_string(), top_feature_names(common, category, usize::MAX)))
            .collect();

        Self {
            features,
            insights: report.insights.clone(),
            guidelines: guidelines.prompt_text(GUIDELINES_EXCERPT_CHARS).to_string(),
        }
    }

    /// Up to `limit` features of `category`
    pub fn top(&self, category: &str, limit: usize) -> Vec<String> {
        self.features
            .get(category)
            .map(|items| items.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    fn joined(&self, category: &str, limit: usize) -> String {
        self.top(category, limit).join(", ")
    }

    /// Prompt used when the model cannot craft one
    pub fn fallback_prompt(&self, request: &str) -> String {
        format!(
            "{}, {}, {}, professional design, NO TEXT",
            request,
            self.joined("visual_style", 3),
            self.joined("color_palette", 3)
        )
    }
}

/// Asks the model for a text-to-image prompt; falls back to a plain one on failure
pub async fn craft_image_prompt(
    model: &dyn GenerativeModel,
    brief: &DesignBrief,
    request: &str,
    guidelines: &BrandGuidelines,
) -> String {
    let styles = brief.joined("visual_style", 5);
    let colors = brief.joined("color_palette", 5);
    let composition = brief.joined("composition", 5);
    let subjects = brief.joined("subject_matter", 5);
    let moods = brief.joined("emotion_mood", 3);
    let graphics = brief.joined("text_graphics", 3);
    let prompt = prompts::fill(
        prompts::IMAGE_PROMPT,
        &[
            request,
            &styles,
            &colors,
            &composition,
            &subjects,
            &moods,
            &graphics,
            truncate_chars(&brief.guidelines, 1500),
            truncate_chars(&brief.insights, 1000),
        ],
    );

    match model.generate(guidelines.attach(GenerateRequest::text(prompt))).await {
        Ok(text) if !text.trim().is_empty() => {
            let crafted = text.trim().to_string();
            info!("Image prompt: {}...", truncate_chars(&crafted, 100));
            crafted
        }
        Ok(_) => brief.fallback_prompt(request),
        Err(e) => {
            warn!("Prompt crafting failed, using fallback: {}", e);
            brief.fallback_prompt(request)
        }
    }
}

/// Clipdrop text-to-image client
#[derive(Debug, Clone)]
pub struct ClipdropClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl ClipdropClient {
    /// Creates a client posting to `endpoint`
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(CLIPDROP_TIMEOUT).build()?,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }

    /// Builds the client from config; fails when `CLIPDROP_API_KEY` is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.require_key("clipdrop")?, config.services.clipdrop_url.clone())
    }

    /// Renders `prompt` and returns the PNG bytes
    pub async fn text_to_image(&self, prompt: &str) -> Result<Vec<u8>> {
        let form = Form::new().text("prompt", prompt.to_string());
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublisherError::upstream("clipdrop", status.as_u16(), body));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(PublisherError::EmptyResponse("clipdrop".into()));
        }
        Ok(bytes.to_vec())
    }
}

/// Short view of the brief returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefSummary {
    /// Top five styles
    pub visual_styles: Vec<String>,
    /// Top five colours
    pub color_palette: Vec<String>,
    /// Top three moods
    pub emotion_mood: Vec<String>,
}

/// Provenance of the analysis behind a generated image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Posts in the analysis
    pub total_posts_analyzed: usize,
    /// Posts in the popular group
    pub popular_posts: usize,
    /// When the analysis ran
    pub timestamp: String,
}

/// A rendered image and how it was produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// Request from the user
    pub user_request: String,
    /// Prompt sent to the renderer
    pub generated_prompt: String,
    /// Stored file name
    pub image_filename: String,
    /// Stored file path
    pub image_path: PathBuf,
    /// Brief summary
    pub design_brief_summary: BriefSummary,
    /// Analysis provenance
    pub analysis_stats: AnalysisStats,
}

/// Runs the whole generation flow against the uploads folder
#[derive(Clone)]
pub struct ImageGenerator {
    model: Arc<dyn GenerativeModel>,
    renderer: ClipdropClient,
    store: UploadStore,
}

impl ImageGenerator {
    /// Creates a generator
    pub fn new(model: Arc<dyn GenerativeModel>, renderer: ClipdropClient, store: UploadStore) -> Self {
        Self { model, renderer, store }
    }

    /// Generates an on-brand image for `request`
    pub async fn generate(&self, request: &str) -> Result<GeneratedImage> {
        let request = request.trim();
        if request.is_empty() {
            return Err(PublisherError::Validation("Request must not be empty".into()));
        }

        let report = self.store.read_analysis().await?;
        let guidelines_path = self.store.latest_brand_guidelines().await?.ok_or_else(|| {
            PublisherError::NotFound(
                "No brand guidelines found. Please upload brand guidelines first.".into(),
            )
        })?;
        let guidelines = BrandGuidelines::load(&guidelines_path).await?;

        let brief = DesignBrief::from_report(&report, &guidelines);
        info!(
            "Design brief: styles {:?}, colors {:?}",
            brief.top("visual_style", 3),
            brief.top("color_palette", 3)
        );
        let prompt = craft_image_prompt(self.model.as_ref(), &brief, request, &guidelines).await;

        let bytes = self.renderer.text_to_image(&prompt).await?;
        let stored = self.store.save_generated_image(&bytes).await?;

        Ok(GeneratedImage {
            user_request: request.to_string(),
            generated_prompt: prompt,
            image_filename: stored.filename,
            image_path: stored.path,
            design_brief_summary: BriefSummary {
                visual_styles: brief.top("visual_style", 5),
                color_palette: brief.top("color_palette", 5),
                emotion_mood: brief.top("emotion_mood", 3),
            },
            analysis_stats: AnalysisStats {
                total_posts_analyzed: report.metadata.total_posts,
                popular_posts: report.popular_posts.count,
                timestamp: report.metadata.timestamp,
            },
        })
    }
}
