//! File-system storage for uploads, exports, reports and generated images.
//!
//! Layout under the uploads root:
//!
//! ```text
//! uploads/
//!   brand_guidelines_<ts>.<ext>     guideline documents
//!   compliance_check_<ts>.png       canvas exports sent for compliance
//!   copyright_check_<ts>.png        canvas exports sent for copyright checks
//!   analysis.json                   latest past-post analysis report
//!   brand_images/                   past post images + posts CSV
//!   generated_images/               text-to-image renders
//! ```

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::AnalysisReport;
use crate::error::{PublisherError, Result};
use crate::utils::{dotted_extension, newest_matching, sanitize_file_name};

const BRAND_IMAGES: &str = "brand_images";
const GENERATED_IMAGES: &str = "generated_images";
const ANALYSIS_FILE: &str = "analysis.json";

const GUIDELINE_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

/// Which check a canvas export was uploaded for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Brand compliance check
    Compliance,
    /// Copyright / reverse image search check
    Copyright,
}

impl ExportKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Compliance => "compliance_check",
            Self::Copyright => "copyright_check",
        }
    }
}

/// Kind of a stored file, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    /// Export sent for a compliance check
    ComplianceExport,
    /// Export sent for a copyright check
    CopyrightCheck,
    /// Guidelines document
    BrandGuidelines,
    /// Stored analysis report
    AnalysisReport,
    /// Anything else
    Unknown,
}

impl UploadKind {
    /// Classifies a stored file by its name
    pub fn from_file_name(name: &str) -> Self {
        if name.contains("compliance_check") {
            Self::ComplianceExport
        } else if name.contains("copyright_check") {
            Self::CopyrightCheck
        } else if name.contains("brand_guidelines") {
            Self::BrandGuidelines
        } else if name == ANALYSIS_FILE {
            Self::AnalysisReport
        } else {
            Self::Unknown
        }
    }
}

/// A file written by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    /// Final file name on disk
    pub filename: String,
    /// Full path on disk
    pub path: PathBuf,
    /// Size in megabytes, rounded to two decimals
    pub size_mb: f64,
    /// Timestamp used in the name (or write time for kept names)
    pub timestamp: String,
}

/// One row of the uploads listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadEntry {
    /// File name
    pub filename: String,
    /// Size in megabytes, rounded to two decimals
    pub size_mb: f64,
    /// Last modification, local time
    pub modified: String,
    /// Kind derived from the name
    #[serde(rename = "type")]
    pub kind: UploadKind,
}

/// Uploads folder manager
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Creates a store rooted at `root`; call [`UploadStore::ensure_layout`] before use
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the uploads folder
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding past post images and posts CSV files
    pub fn brand_images_dir(&self) -> PathBuf {
        self.root.join(BRAND_IMAGES)
    }

    /// Folder holding generated images
    pub fn generated_dir(&self) -> PathBuf {
        self.root.join(GENERATED_IMAGES)
    }

    /// Location of the stored analysis report
    pub fn analysis_path(&self) -> PathBuf {
        self.root.join(ANALYSIS_FILE)
    }

    /// Creates the folder layout
    pub async fn ensure_layout(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.brand_images_dir()).await?;
        tokio::fs::create_dir_all(self.generated_dir()).await?;
        Ok(())
    }

    /// Stores a canvas export as `<kind>_<timestamp>.png`
    pub async fn save_export(&self, kind: ExportKind, bytes: &[u8]) -> Result<StoredFile> {
        let timestamp = file_timestamp();
        let filename = format!("{}_{}.png", kind.prefix(), timestamp);
        let path = self.root.join(&filename);
        self.write(&path, bytes).await?;
        info!("{} export saved: {} ({:.2} MB)", kind.prefix(), filename, size_mb(bytes.len() as u64));
        Ok(stored(filename, path, bytes.len() as u64, timestamp))
    }

    /// Stores a past post image or posts CSV under its original name
    pub async fn save_brand_asset(
        &self,
        original_name: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredFile> {
        let filename = sanitize_file_name(original_name).ok_or_else(|| {
            PublisherError::Validation(format!("Invalid file name: {:?}", original_name))
        })?;
        let extension = dotted_extension(Path::new(&filename));
        let content_type = content_type.unwrap_or("").to_lowercase();

        let is_image = content_type.starts_with("image/");
        let is_csv = extension == ".csv" || content_type.contains("csv");
        if !is_image && !is_csv {
            return Err(PublisherError::Validation(format!(
                "File must be an image or CSV. Got content-type: {}, extension: {}",
                content_type, extension
            )));
        }

        let path = self.brand_images_dir().join(&filename);
        self.write(&path, bytes).await?;
        info!(
            "{} saved: {}/{}",
            if is_csv { "CSV" } else { "Image" },
            BRAND_IMAGES,
            filename
        );
        Ok(stored(filename, path, bytes.len() as u64, file_timestamp()))
    }

    /// Stores a guidelines document as `brand_guidelines_<timestamp><ext>`
    pub async fn save_brand_guidelines(
        &self,
        original_name: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredFile> {
        let content_type = content_type.unwrap_or("");
        if !GUIDELINE_CONTENT_TYPES.contains(&content_type) {
            return Err(PublisherError::Validation(
                "File must be PDF, DOC, DOCX, or TXT".into(),
            ));
        }

        let timestamp = file_timestamp();
        let extension = dotted_extension(Path::new(original_name));
        let filename = format!("brand_guidelines_{}{}", timestamp, extension);
        let path = self.root.join(&filename);
        self.write(&path, bytes).await?;
        info!("Brand guidelines saved: {}", filename);
        Ok(stored(filename, path, bytes.len() as u64, timestamp))
    }

    /// Newest uploaded guidelines document, if any
    pub async fn latest_brand_guidelines(&self) -> Result<Option<PathBuf>> {
        newest_matching(&self.root, "brand_guidelines*").await
    }

    /// Newest posts CSV in the brand images folder, if any
    pub async fn latest_posts_csv(&self) -> Result<Option<PathBuf>> {
        newest_matching(&self.brand_images_dir(), "*.csv").await
    }

    /// Lists visible files at the root, newest first
    pub async fn list(&self) -> Result<Vec<UploadEntry>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().await?;
            if !metadata.is_file() || filename.starts_with('.') {
                continue;
            }
            let modified: DateTime<Local> = metadata
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Local::now());
            files.push((modified, UploadEntry {
                kind: UploadKind::from_file_name(&filename),
                size_mb: size_mb(metadata.len()),
                modified: modified.format("%Y-%m-%d %H:%M:%S").to_string(),
                filename,
            }));
        }

        files.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(files.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Persists the analysis report as pretty JSON
    pub async fn write_analysis(&self, report: &AnalysisReport) -> Result<PathBuf> {
        let path = self.analysis_path();
        let json = serde_json::to_vec_pretty(report)?;
        self.write(&path, &json).await?;
        info!("Analysis report saved to {}", path.display());
        Ok(path)
    }

    /// Reads the stored analysis report
    pub async fn read_analysis(&self) -> Result<AnalysisReport> {
        let path = self.analysis_path();
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PublisherError::NotFound(
                    "No analysis report found. Run the past-post analysis first.".into(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&content)
            .map_err(|e| PublisherError::Parse(format!("Invalid analysis report: {}", e)))
    }

    /// Stores a generated image as `generated_<timestamp>.png`
    pub async fn save_generated_image(&self, bytes: &[u8]) -> Result<StoredFile> {
        let timestamp = file_timestamp();
        let filename = format!("generated_{}.png", timestamp);
        let path = self.generated_dir().join(&filename);
        self.write(&path, bytes).await?;
        info!("Generated image saved: {}", path.display());
        Ok(stored(filename, path, bytes.len() as u64, timestamp))
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

fn stored(filename: String, path: PathBuf, len: u64, timestamp: String) -> StoredFile {
    StoredFile {
        filename,
        path,
        size_mb: size_mb(len),
        timestamp,
    }
}

/// Millisecond-resolution local timestamp used in generated file names
pub fn file_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Bytes to megabytes rounded to two decimals
pub fn size_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, UploadStore) {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path().join("uploads"));
        store.ensure_layout().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_save_export_names_by_kind() -> Result<()> {
        let (_dir, store) = store().await;
        let file = store.save_export(ExportKind::Copyright, b"png").await?;
        assert!(file.filename.starts_with("copyright_check_"));
        assert!(file.filename.ends_with(".png"));
        assert_eq!(tokio::fs::read(&file.path).await?, b"png");
        Ok(())
    }

    #[tokio::test]
    async fn test_brand_asset_validation() -> Result<()> {
        let (_dir, store) = store().await;

        let image = store
            .save_brand_asset("post1.jpg", Some("image/jpeg"), b"jpg")
            .await?;
        assert_eq!(image.path, store.brand_images_dir().join("post1.jpg"));

        let csv = store
            .save_brand_asset("posts.csv", Some("application/octet-stream"), b"image,likes")
            .await?;
        assert_eq!(csv.filename, "posts.csv");

        let rejected = store
            .save_brand_asset("notes.txt", Some("text/plain"), b"hi")
            .await;
        assert!(matches!(rejected, Err(PublisherError::Validation(_))));

        let traversal = store
            .save_brand_asset("../../escape.png", Some("image/png"), b"x")
            .await?;
        assert_eq!(traversal.path, store.brand_images_dir().join("escape.png"));
        Ok(())
    }

    #[tokio::test]
    async fn test_guidelines_and_latest() -> Result<()> {
        let (_dir, store) = store().await;
        assert_eq!(store.latest_brand_guidelines().await?, None);

        let rejected = store
            .save_brand_guidelines("guide.png", Some("image/png"), b"x")
            .await;
        assert!(matches!(rejected, Err(PublisherError::Validation(_))));

        let saved = store
            .save_brand_guidelines("Guide.PDF", Some("application/pdf"), b"%PDF")
            .await?;
        assert!(saved.filename.starts_with("brand_guidelines_"));
        assert!(saved.filename.ends_with(".pdf"));
        assert_eq!(store.latest_brand_guidelines().await?, Some(saved.path));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_classifies_and_skips_hidden() -> Result<()> {
        let (_dir, store) = store().await;
        store.save_export(ExportKind::Compliance, b"a").await?;
        tokio::fs::write(store.root().join(".hidden"), b"x").await?;

        let files = store.list().await?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, UploadKind::ComplianceExport);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_analysis_is_not_found() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.read_analysis().await,
            Err(PublisherError::NotFound(_))
        ));
    }

    #[test]
    fn test_size_mb() {
        assert_eq!(size_mb(0), 0.0);
        assert_eq!(size_mb(1024 * 1024), 1.0);
        assert_eq!(size_mb(1_572_864), 1.5);
    }
}
