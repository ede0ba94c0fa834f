use crate::analysis::{
    load_posts_csv, AnalysisEvent, AnalysisOptions, AnalysisPhase, ImageFeatureAnalyzer, PostData,
};
use crate::compliance::{
    BrandComplianceChecker, BrandGuidelines, CopyrightChecker, CopyrightReport, ImgBbClient,
    SerpApiClient,
};
use crate::config::Config;
use crate::design::DesignCodeGenerator;
use crate::error::{PublisherError, Result};
use crate::gemini::{GeminiClient, GenerativeModel, ThrottledModel};
use crate::image_generator::{ClipdropClient, ImageGenerator};
use crate::rate_limiter::RateLimiter;
use crate::storage::{ExportKind, StoredFile, UploadStore};
use crate::utils::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

/// Everything request handlers need, shared across the server
#[derive(Clone)]
pub struct Services {
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Uploads folder
    pub store: UploadStore,
    /// Model with rate limiting and retries applied
    pub model: Arc<dyn GenerativeModel>,
    /// Shared limiter behind [`Services::model`]
    pub limiter: Arc<RateLimiter>,
    /// Retry policy behind [`Services::model`]
    pub retry: RetryPolicy,
    imgbb: Option<ImgBbClient>,
    serpapi: Option<SerpApiClient>,
    clipdrop: Option<ClipdropClient>,
}

impl Services {
    /// Builds all services from configuration; requires the Gemini key
    pub fn from_config(config: Config) -> Result<Self> {
        let gemini = GeminiClient::from_config(&config)?;
        Ok(Self::with_model(config, Arc::new(gemini)))
    }

    /// Builds services around a caller-supplied model
    ///
    /// Optional integrations are enabled when their API key is configured.
    pub fn with_model(config: Config, model: Arc<dyn GenerativeModel>) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limits));
        let retry = RetryPolicy::from(&config.retry);
        let throttled = ThrottledModel::new(model, Arc::clone(&limiter), retry.clone());

        let imgbb = optional("ImgBB", ImgBbClient::from_config(&config));
        let serpapi = optional("SerpAPI", SerpApiClient::from_config(&config));
        let clipdrop = optional("Clipdrop", ClipdropClient::from_config(&config));

        Self {
            store: UploadStore::new(&config.storage.uploads_dir),
            config: Arc::new(config),
            model: Arc::new(throttled),
            limiter,
            retry,
            imgbb,
            serpapi,
            clipdrop,
        }
    }

    /// Replaces the ImgBB and SerpAPI clients
    pub fn with_copyright_clients(mut self, imgbb: ImgBbClient, serpapi: SerpApiClient) -> Self {
        self.imgbb = Some(imgbb);
        self.serpapi = Some(serpapi);
        self
    }

    /// Replaces the Clipdrop client
    pub fn with_clipdrop(mut self, clipdrop: ClipdropClient) -> Self {
        self.clipdrop = Some(clipdrop);
        self
    }

    /// Past-post analyzer over the shared model
    pub fn analyzer(&self) -> ImageFeatureAnalyzer {
        ImageFeatureAnalyzer::new(Arc::clone(&self.model))
    }

    /// Design code generator writing to the configured output
    pub fn design_generator(&self) -> DesignCodeGenerator {
        DesignCodeGenerator::new(Arc::clone(&self.model), self.config.storage.design_output.clone())
    }

    /// Brand compliance checker
    pub fn compliance_checker(&self) -> BrandComplianceChecker {
        BrandComplianceChecker::new(Arc::clone(&self.model))
    }

    /// Copyright checker; needs ImgBB and SerpAPI keys
    pub fn copyright_checker(&self) -> Result<CopyrightChecker> {
        let imgbb = self.imgbb.clone().ok_or_else(|| missing_key("imgbb", "IMGBB_API_KEY"))?;
        let serpapi = self.serpapi.clone().ok_or_else(|| missing_key("serpapi", "SERPAPI_KEY"))?;
        Ok(CopyrightChecker::new(Arc::clone(&self.model), imgbb, serpapi))
    }

    /// Image generator; needs a Clipdrop key
    pub fn image_generator(&self) -> Result<ImageGenerator> {
        let clipdrop = self
            .clipdrop
            .clone()
            .ok_or_else(|| missing_key("clipdrop", "CLIPDROP_API_KEY"))?;
        Ok(ImageGenerator::new(Arc::clone(&self.model), clipdrop, self.store.clone()))
    }

    /// Stores a canvas export and checks it against the newest guidelines
    pub async fn check_compliance(&self, image: &[u8]) -> Result<ComplianceResponse> {
        let stored = self.store.save_export(ExportKind::Compliance, image).await?;

        let Some(guidelines_path) = self.store.latest_brand_guidelines().await? else {
            warn!("No brand guidelines found in {}", self.store.root().display());
            return Ok(ComplianceResponse {
                success: false,
                error: Some("No brand guidelines found".into()),
                message: Some(
                    "Please upload brand guidelines first using the Brand Guidelines button".into(),
                ),
                compliance: None,
            });
        };
        let guidelines = BrandGuidelines::load(&guidelines_path).await?;
        info!("Using brand guidelines: {}", guidelines.file_name());

        let verdict = self
            .compliance_checker()
            .check(image.to_vec(), mime::IMAGE_PNG.essence_str(), &guidelines)
            .await?;

        let (status, message) = if verdict.compliant {
            ("passed", "COMPLIANT - Image meets brand guidelines")
        } else {
            ("failed", "NON-COMPLIANT - Image violates brand guidelines")
        };

        Ok(ComplianceResponse {
            success: true,
            error: None,
            message: None,
            compliance: Some(ComplianceOutcome {
                status: status.to_string(),
                message: message.to_string(),
                compliant: verdict.compliant,
                score: verdict.score,
                ai_analysis: verdict.raw_analysis,
                status_line: verdict.status_line,
                details: ExportDetails::new(stored, Some(guidelines.file_name()), None),
            }),
        })
    }

    /// Stores a canvas export and runs the copyright check on it
    pub async fn check_copyright(&self, image: &[u8]) -> Result<CopyrightResponse> {
        let checker = self.copyright_checker()?;
        let stored = self.store.save_export(ExportKind::Copyright, image).await?;
        let report = checker.check(image).await?;

        let imgbb_url = Some(report.image_url.clone());
        Ok(CopyrightResponse {
            success: true,
            copyright: CopyrightOutcome {
                report,
                details: ExportDetails::new(stored, None, imgbb_url),
            },
        })
    }
}

fn optional<T>(name: &str, client: Result<T>) -> Option<T> {
    match client {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("{} integration disabled: {}", name, e);
            None
        }
    }
}

fn missing_key(service: &str, env_var: &str) -> PublisherError {
    PublisherError::Config(format!("{} API key not configured (set {})", service, env_var))
}

/// Stored export information returned with check results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDetails {
    /// Stored file name
    pub filename: String,
    /// Stored file path
    pub path: PathBuf,
    /// Size in megabytes
    pub size_mb: f64,
    /// Timestamp in the file name
    pub timestamp: String,
    /// Guidelines document the export was checked against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guideline_used: Option<String>,
    /// Public URL used for the reverse image search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imgbb_url: Option<String>,
}

impl ExportDetails {
    fn new(stored: StoredFile, guideline_used: Option<String>, imgbb_url: Option<String>) -> Self {
        Self {
            filename: stored.filename,
            path: stored.path,
            size_mb: stored.size_mb,
            timestamp: stored.timestamp,
            guideline_used,
            imgbb_url,
        }
    }
}

/// Compliance check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceOutcome {
    /// `passed` or `failed`
    pub status: String,
    /// One line description
    pub message: String,
    /// Whether the export is compliant
    pub compliant: bool,
    /// Score out of ten, when reported
    pub score: Option<f32>,
    /// Full model reply
    pub ai_analysis: String,
    /// Status line of the reply
    pub status_line: String,
    /// Stored export
    pub details: ExportDetails,
}

/// Response of the compliance check endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceResponse {
    /// False when the check could not run
    pub success: bool,
    /// Short failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// What the user should do about the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Check result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceOutcome>,
}

/// Copyright check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyrightOutcome {
    /// Decision and evidence
    #[serde(flatten)]
    pub report: CopyrightReport,
    /// Stored export
    pub details: ExportDetails,
}

/// Response of the copyright check endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyrightResponse {
    /// Always true; failures are errors
    pub success: bool,
    /// Check result
    pub copyright: CopyrightOutcome,
}

/// Request payload for a past-post analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Posts CSV name inside the brand images folder; newest CSV when omitted
    #[serde(default)]
    pub csv_file: Option<String>,
    /// Share of posts counted as popular
    #[serde(default)]
    pub top_percentage: Option<f64>,
    /// Minimum share of posts a feature must appear in
    #[serde(default)]
    pub feature_threshold: Option<f64>,
}

/// Response for an accepted analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJobResponse {
    /// Unique job ID for tracking the request
    pub job_id: String,
    /// Status of the job
    pub status: JobStatusType,
    /// Posts whose image was found
    pub total_posts: usize,
    /// Image names listed in the CSV but missing on disk
    pub missing_images: Vec<String>,
    /// Message about the job
    pub message: String,
}

/// Possible job status types
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatusType {
    /// Job is queued and waiting to be processed
    Queued,
    /// Job is currently being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

/// Counts of a finished analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Popular group size
    pub popular_posts: usize,
    /// Less popular group size
    pub less_popular_posts: usize,
    /// Posts whose image was analysed
    pub analyzed_posts: usize,
    /// Where the report was written
    pub report_path: PathBuf,
}

/// Analysis job status information
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobStatus {
    /// Unique job identifier
    pub job_id: String,
    /// Current status of the job
    pub status: JobStatusType,
    /// Posts CSV being analysed
    pub csv_file: PathBuf,
    /// Options the job runs with
    pub options: AnalysisOptions,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job was last updated
    pub updated_at: DateTime<Utc>,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Current operation being performed
    pub current_operation: Option<String>,
    /// Any error message if the job failed
    pub error_message: Option<String>,
    /// Posts submitted
    pub total_posts: usize,
    /// Images analysed so far
    pub analyzed_posts: usize,
    /// Images that failed and were left out
    pub skipped_posts: usize,
    /// Result counts once completed
    pub result: Option<AnalysisSummary>,
}

impl JobStatus {
    fn apply(&mut self, event: &AnalysisEvent) {
        match event {
            AnalysisEvent::Phase(phase) => {
                self.current_operation = Some(phase.label().to_string());
                if *phase == AnalysisPhase::Insights {
                    self.progress = self.progress.max(90);
                }
            }
            AnalysisEvent::Categorized { popular, less_popular } => {
                self.current_operation = Some(format!(
                    "Categorized into {} popular and {} less popular posts",
                    popular, less_popular
                ));
            }
            AnalysisEvent::PostStarted { index, total, path } => {
                self.current_operation = Some(format!(
                    "Analyzing image {}/{}: {}",
                    index,
                    total,
                    path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
                ));
            }
            AnalysisEvent::PostAnalyzed { .. } => {
                self.analyzed_posts += 1;
                self.progress = self.batch_progress();
            }
            AnalysisEvent::PostSkipped { .. } => {
                self.skipped_posts += 1;
                self.progress = self.batch_progress();
            }
        }
        self.updated_at = Utc::now();
    }

    // Images account for 10..90 percent of the run
    fn batch_progress(&self) -> u8 {
        let done = self.analyzed_posts + self.skipped_posts;
        let total = self.total_posts.max(1);
        (10 + done.min(total) * 80 / total) as u8
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current status
    pub status: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Service uptime in seconds
    pub uptime: u64,
    /// Number of active jobs
    pub active_jobs: usize,
    /// Number of completed jobs
    pub completed_jobs: usize,
    /// Model behind the service
    pub model: String,
}

type Jobs = Arc<Mutex<HashMap<String, JobStatus>>>;

/// Job manager for background past-post analyses
pub struct JobManager {
    /// Map of job ID to job status
    jobs: Jobs,
    /// Shared services
    services: Arc<Services>,
    /// How long finished jobs are kept
    retention: chrono::Duration,
    /// Service start time for uptime calculation
    start_time: DateTime<Utc>,
}

impl JobManager {
    /// Create a new job manager
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            retention: chrono::Duration::from_std(std::time::Duration::from_secs(
                services.config.server.job_retention_seconds,
            ))
            .unwrap_or_else(|_| chrono::Duration::max_value()),
            services,
            start_time: Utc::now(),
        }
    }

    /// Shared services
    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Validates the input and starts an analysis in the background
    pub async fn submit_analysis(&self, request: AnalysisRequest) -> Result<AnalysisJobResponse> {
        let options = AnalysisOptions {
            top_percentage: request
                .top_percentage
                .unwrap_or(self.services.config.analysis.top_percentage),
            feature_threshold: request
                .feature_threshold
                .unwrap_or(self.services.config.analysis.feature_threshold),
        };
        options.validate()?;

        let store = &self.services.store;
        let csv_file = self.resolve_csv(request.csv_file.as_deref()).await?;
        let manifest = load_posts_csv(&csv_file, &store.brand_images_dir()).await?;
        if manifest.posts.is_empty() {
            return Err(PublisherError::NotFound(format!(
                "None of the {} images listed in {} were found in {}",
                manifest.total_rows,
                csv_file.display(),
                store.brand_images_dir().display()
            )));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let total_posts = manifest.posts.len();
        let job_status = JobStatus {
            job_id: job_id.clone(),
            status: JobStatusType::Queued,
            csv_file: csv_file.clone(),
            options,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            progress: 0,
            current_operation: Some("Queued".to_string()),
            error_message: None,
            total_posts,
            analyzed_posts: 0,
            skipped_posts: 0,
            result: None,
        };

        // Store the job
        {
            let mut jobs = self.jobs.lock().await;
            self.prune(&mut jobs);
            jobs.insert(job_id.clone(), job_status);
        }

        let jobs = Arc::clone(&self.jobs);
        let services = Arc::clone(&self.services);
        let spawned_id = job_id.clone();
        let posts = manifest.posts;
        tokio::spawn(async move {
            Self::process_job(jobs, services, spawned_id, posts, options).await;
        });

        info!("Analysis job {} queued for {} posts", job_id, total_posts);
        Ok(AnalysisJobResponse {
            job_id,
            status: JobStatusType::Queued,
            total_posts,
            missing_images: manifest.missing,
            message: "Analysis queued".to_string(),
        })
    }

    async fn resolve_csv(&self, requested: Option<&str>) -> Result<PathBuf> {
        let store = &self.services.store;
        match requested {
            Some(name) => {
                let file_name = crate::utils::sanitize_file_name(name).ok_or_else(|| {
                    PublisherError::Validation(format!("Invalid CSV file name: {:?}", name))
                })?;
                let path = store.brand_images_dir().join(file_name);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    Ok(path)
                } else {
                    Err(PublisherError::NotFound(format!("CSV file not found: {}", name)))
                }
            }
            None => store.latest_posts_csv().await?.ok_or_else(|| {
                PublisherError::NotFound(
                    "No posts CSV found. Upload a CSV with 'image' and 'likes' columns first."
                        .into(),
                )
            }),
        }
    }

    /// Get the status of a job
    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatus> {
        let jobs = self.jobs.lock().await;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| PublisherError::NotFound(format!("Job not found: {}", job_id)))
    }

    /// All jobs, newest first
    pub async fn list_jobs(&self) -> Vec<JobStatus> {
        let mut jobs = self.jobs.lock().await;
        self.prune(&mut jobs);
        let mut list: Vec<JobStatus> = jobs.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    fn prune(&self, jobs: &mut HashMap<String, JobStatus>) {
        let cutoff = Utc::now()
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = prune_finished(jobs, cutoff);
        if removed > 0 {
            info!("Dropped {} finished analysis jobs", removed);
        }
    }

    /// Get service health information
    pub async fn get_health(&self) -> HealthResponse {
        let jobs = self.jobs.lock().await;
        let active_jobs = jobs
            .values()
            .filter(|job| matches!(job.status, JobStatusType::Processing | JobStatusType::Queued))
            .count();
        let completed_jobs = jobs
            .values()
            .filter(|job| job.status == JobStatusType::Completed)
            .count();

        HealthResponse {
            service: "ContentPublisher".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            uptime: (Utc::now() - self.start_time).num_seconds().max(0) as u64,
            active_jobs,
            completed_jobs,
            model: self.services.model.model_id().to_string(),
        }
    }

    /// Runs one analysis job to completion
    async fn process_job(
        jobs: Jobs,
        services: Arc<Services>,
        job_id: String,
        posts: Vec<PostData>,
        options: AnalysisOptions,
    ) {
        // Update job status to processing
        update(&jobs, &job_id, |job| {
            job.status = JobStatusType::Processing;
            job.progress = 10;
            job.current_operation = Some("Starting analysis".to_string());
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel::<AnalysisEvent>();
        let progress_jobs = Arc::clone(&jobs);
        let progress_id = job_id.clone();
        let progress = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                update(&progress_jobs, &progress_id, |job| job.apply(&event)).await;
            }
        });

        let result = async {
            let analyzer = services.analyzer().with_progress(Arc::new(move |event: &AnalysisEvent| {
                let _ = tx.send(event.clone());
            }));
            let report = analyzer.run_complete_analysis(&posts, options).await?;
            drop(analyzer);
            let report_path = services.store.write_analysis(&report).await?;

            Ok::<_, PublisherError>(AnalysisSummary {
                popular_posts: report.popular_posts.count,
                less_popular_posts: report.less_popular_posts.count,
                analyzed_posts: report.popular_posts.analyzed + report.less_popular_posts.analyzed,
                report_path,
            })
        }
        .await;

        // All senders are gone once the analyzer is dropped
        if let Err(e) = progress.await {
            warn!("Progress updates for job {} stopped: {}", job_id, e);
        }

        // Update final job status
        update(&jobs, &job_id, |job| match result {
            Ok(summary) => {
                info!("Analysis job {} completed", job.job_id);
                job.status = JobStatusType::Completed;
                job.progress = 100;
                job.current_operation = Some("Completed successfully".to_string());
                job.result = Some(summary);
            }
            Err(e) => {
                error!("Analysis job {} failed: {}", job.job_id, e);
                job.status = JobStatusType::Failed;
                job.error_message = Some(e.to_string());
                job.current_operation = Some("Failed".to_string());
            }
        })
        .await;
    }
}

/// Removes completed or failed jobs last updated before `cutoff`
fn prune_finished(jobs: &mut HashMap<String, JobStatus>, cutoff: DateTime<Utc>) -> usize {
    let before = jobs.len();
    jobs.retain(|_, job| {
        matches!(job.status, JobStatusType::Queued | JobStatusType::Processing)
            || job.updated_at >= cutoff
    });
    before - jobs.len()
}

async fn update(jobs: &Jobs, job_id: &str, change: impl FnOnce(&mut JobStatus)) {
    let mut jobs_guard = jobs.lock().await;
    if let Some(job) = jobs_guard.get_mut(job_id) {
        change(job);
        job.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, status: JobStatusType, updated_at: DateTime<Utc>) -> (String, JobStatus) {
        let status = JobStatus {
            job_id: id.to_string(),
            status,
            csv_file: PathBuf::from("posts.csv"),
            options: AnalysisOptions::default(),
            created_at: updated_at,
            updated_at,
            progress: 0,
            current_operation: None,
            error_message: None,
            total_posts: 1,
            analyzed_posts: 0,
            skipped_posts: 0,
            result: None,
        };
        (id.to_string(), status)
    }

    #[test]
    fn test_prune_finished_keeps_running_and_recent_jobs() {
        let now = Utc::now();
        let old = now - chrono::Duration::hours(2);
        let mut jobs: HashMap<String, JobStatus> = [
            job("old-done", JobStatusType::Completed, old),
            job("old-failed", JobStatusType::Failed, old),
            job("old-running", JobStatusType::Processing, old),
            job("old-queued", JobStatusType::Queued, old),
            job("fresh-done", JobStatusType::Completed, now),
        ]
        .into_iter()
        .collect();

        let removed = prune_finished(&mut jobs, now - chrono::Duration::hours(1));

        assert_eq!(removed, 2);
        let mut left: Vec<_> = jobs.keys().map(String::as_str).collect();
        left.sort();
        assert_eq!(left, vec!["fresh-done", "old-queued", "old-running"]);
    }
}
