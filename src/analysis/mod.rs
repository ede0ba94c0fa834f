//! Past-post image analysis.
//!
//! The pipeline ranks past posts by likes, asks the vision model for the
//! visual features of every image, and reports which features are common
//! among the popular and the less popular posts together with a written
//! comparison.

mod features;
mod posts;

pub use features::{
    find_common_features, parse_feature_response, top_feature_names, CommonFeature,
    CommonFeatures, ImageFeatures,
};
pub use posts::{categorize_posts_by_popularity, load_posts_csv, parse_posts_csv, PostData, PostManifest};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AnalysisSettings;
use crate::error::{PublisherError, Result};
use crate::gemini::{GenerateRequest, GenerativeModel};
use crate::prompts;
use crate::utils::image_mime_for_path;

/// Reply used when the insights report cannot be generated
pub const INSIGHTS_FALLBACK: &str = "Unable to generate insights due to API limitations.";

/// Stage of a complete analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPhase {
    /// Ranking posts by likes
    Categorizing,
    /// Extracting features of the popular posts
    PopularPosts,
    /// Extracting features of the less popular posts
    LessPopularPosts,
    /// Aggregating feature frequencies
    CommonFeatures,
    /// Writing the comparison report
    Insights,
    /// Report assembled
    Completed,
}

impl AnalysisPhase {
    /// Human readable label
    pub fn label(self) -> &'static str {
        match self {
            Self::Categorizing => "Categorizing posts by popularity",
            Self::PopularPosts => "Analyzing popular posts",
            Self::LessPopularPosts => "Analyzing less popular posts",
            Self::CommonFeatures => "Finding common features",
            Self::Insights => "Generating insights report",
            Self::Completed => "Analysis complete",
        }
    }
}

/// Progress notification emitted while analysing
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    /// A new stage started
    Phase(AnalysisPhase),
    /// Posts were split into groups
    Categorized {
        /// Popular group size
        popular: usize,
        /// Less popular group size
        less_popular: usize,
    },
    /// An image is about to be sent to the model
    PostStarted {
        /// 1-based position within the batch
        index: usize,
        /// Batch size
        total: usize,
        /// Image being analysed
        path: PathBuf,
    },
    /// An image was analysed
    PostAnalyzed {
        /// 1-based position within the batch
        index: usize,
        /// Batch size
        total: usize,
    },
    /// An image failed and was left out
    PostSkipped {
        /// 1-based position within the batch
        index: usize,
        /// Batch size
        total: usize,
        /// Image that failed
        path: PathBuf,
        /// Failure reason
        error: String,
    },
}

/// Callback receiving [`AnalysisEvent`]s
pub type ProgressCallback = Arc<dyn Fn(&AnalysisEvent) + Send + Sync>;

/// Knobs of a complete analysis run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Share of posts, by likes, that count as popular
    pub top_percentage: f64,
    /// Minimum share of posts a feature must appear in
    pub feature_threshold: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::from(&AnalysisSettings::default())
    }
}

impl From<&AnalysisSettings> for AnalysisOptions {
    fn from(settings: &AnalysisSettings) -> Self {
        Self {
            top_percentage: settings.top_percentage,
            feature_threshold: settings.feature_threshold,
        }
    }
}

impl AnalysisOptions {
    /// Checks both fractions lie in (0, 1]
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("top_percentage", self.top_percentage),
            ("feature_threshold", self.feature_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(PublisherError::Validation(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Analysis result for one popularity group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Posts in the group
    pub count: usize,
    /// Posts whose image was analysed successfully
    pub analyzed: usize,
    /// The posts themselves
    pub posts: Vec<PostData>,
    /// Features shared across the analysed posts
    pub common_features: CommonFeatures,
}

/// Parameters and provenance of a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Popular share used
    pub top_percentage: f64,
    /// Feature threshold used
    pub feature_threshold: f64,
    /// Number of posts submitted
    pub total_posts: usize,
    /// RFC 3339 creation time
    pub timestamp: String,
    /// Model that produced the features
    #[serde(default)]
    pub model: String,
}

/// Complete past-post analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Top performing posts
    pub popular_posts: GroupSummary,
    /// Remaining posts
    pub less_popular_posts: GroupSummary,
    /// Written comparison of the two groups
    pub insights: String,
    /// Run parameters
    pub metadata: ReportMetadata,
}

/// Runs the vision model over past post images
///
/// Model calls are issued one at a time. Pass a
/// [`ThrottledModel`](crate::gemini::ThrottledModel) to keep them under the
/// configured rate limit.
#[derive(Clone)]
pub struct ImageFeatureAnalyzer {
    model: Arc<dyn GenerativeModel>,
    progress: Option<ProgressCallback>,
}

impl ImageFeatureAnalyzer {
    /// Creates an analyzer over `model`
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            progress: None,
        }
    }

    /// Sets the progress callback
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: AnalysisEvent) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }

    /// Extracts the visual features of one image
    pub async fn analyze_single_image(&self, image_path: &Path) -> Result<ImageFeatures> {
        let bytes = tokio::fs::read(image_path).await?;
        let mime = image_mime_for_path(image_path);

        let request = GenerateRequest::text(prompts::IMAGE_FEATURES.trim_start())
            .with_inline(mime.essence_str(), bytes);
        let reply = self.model.generate(request).await?;
        parse_feature_response(&reply)
    }

    /// Analyses posts in order, leaving out the ones that fail
    pub async fn analyze_posts_batch(&self, posts: &[PostData]) -> Vec<ImageFeatures> {
        let total = posts.len();
        let mut analyzed = Vec::with_capacity(total);

        for (i, post) in posts.iter().enumerate() {
            let index = i + 1;
            info!("Analyzing image {}/{}: {}", index, total, post.image_path.display());
            self.emit(AnalysisEvent::PostStarted {
                index,
                total,
                path: post.image_path.clone(),
            });

            match self.analyze_single_image(&post.image_path).await {
                Ok(features) => {
                    analyzed.push(features);
                    self.emit(AnalysisEvent::PostAnalyzed { index, total });
                }
                Err(e) => {
                    warn!("Skipping {}: {}", post.image_path.display(), e);
                    self.emit(AnalysisEvent::PostSkipped {
                        index,
                        total,
                        path: post.image_path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        analyzed
    }

    /// Asks the model to compare the two groups
    ///
    /// Never fails: a model error yields [`INSIGHTS_FALLBACK`].
    pub async fn generate_insights_report(
        &self,
        popular: &CommonFeatures,
        less_popular: &CommonFeatures,
    ) -> String {
        let rendered = (serde_json::to_string_pretty(popular), serde_json::to_string_pretty(less_popular));
        let (popular, less_popular) = match rendered {
            (Ok(p), Ok(l)) => (p, l),
            _ => return INSIGHTS_FALLBACK.to_string(),
        };

        let prompt = prompts::fill(prompts::INSIGHTS_REPORT, &[&popular, &less_popular]);
        match self.model.generate(GenerateRequest::text(prompt)).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Insights generation failed: {}", e);
                INSIGHTS_FALLBACK.to_string()
            }
        }
    }

    /// Runs the whole pipeline over `posts`
    pub async fn run_complete_analysis(
        &self,
        posts: &[PostData],
        options: AnalysisOptions,
    ) -> Result<AnalysisReport> {
        options.validate()?;
        if posts.is_empty() {
            return Err(PublisherError::Validation("No posts to analyze".into()));
        }

        self.emit(AnalysisEvent::Phase(AnalysisPhase::Categorizing));
        let (popular, less_popular) = categorize_posts_by_popularity(posts, options.top_percentage);
        info!(
            "Categorized {} posts: {} popular, {} less popular",
            posts.len(),
            popular.len(),
            less_popular.len()
        );
        self.emit(AnalysisEvent::Categorized {
            popular: popular.len(),
            less_popular: less_popular.len(),
        });

        self.emit(AnalysisEvent::Phase(AnalysisPhase::PopularPosts));
        let popular_features = self.analyze_posts_batch(&popular).await;

        self.emit(AnalysisEvent::Phase(AnalysisPhase::LessPopularPosts));
        let less_popular_features = self.analyze_posts_batch(&less_popular).await;

        self.emit(AnalysisEvent::Phase(AnalysisPhase::CommonFeatures));
        let popular_common = find_common_features(&popular_features, options.feature_threshold);
        let less_popular_common = find_common_features(&less_popular_features, options.feature_threshold);

        self.emit(AnalysisEvent::Phase(AnalysisPhase::Insights));
        let insights = self
            .generate_insights_report(&popular_common, &less_popular_common)
            .await;

        self.emit(AnalysisEvent::Phase(AnalysisPhase::Completed));
        Ok(AnalysisReport {
            popular_posts: GroupSummary {
                count: popular.len(),
                analyzed: popular_features.len(),
                posts: popular,
                common_features: popular_common,
            },
            less_popular_posts: GroupSummary {
                count: less_popular.len(),
                analyzed: less_popular_features.len(),
                posts: less_popular,
                common_features: less_popular_common,
            },
            insights,
            metadata: ReportMetadata {
                top_percentage: options.top_percentage,
                feature_threshold: options.feature_threshold,
                total_posts: posts.len(),
                timestamp: Utc::now().to_rfc3339(),
                model: self.model.model_id().to_string(),
            },
        })
    }
}
