//! Brand compliance and copyright checks for canvas exports.

pub mod copyright;

pub use copyright::{
    scan_copyright_sources, AiCopyrightStatus, CopyrightChecker, CopyrightReport, CopyrightScan,
    CopyrightSource, CopyrightStatus, ImgBbClient, SerpApiClient,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::error::{PublisherError, Result};
use crate::gemini::{GenerateRequest, GenerativeModel};
use crate::prompts;
use crate::utils::{dotted_extension, truncate_chars};

/// Guidelines text budget when quoted inside a prompt
pub const GUIDELINES_EXCERPT_CHARS: usize = 3000;

/// Contents of a guidelines document
#[derive(Debug, Clone, PartialEq)]
pub enum GuidelinesContent {
    /// Plain text, quoted in prompts
    Text(String),
    /// Binary document attached to the model request
    Document {
        /// MIME type of the document
        mime_type: String,
        /// Raw bytes
        bytes: Vec<u8>,
    },
}

/// A loaded brand guidelines document
#[derive(Debug, Clone)]
pub struct BrandGuidelines {
    path: PathBuf,
    content: GuidelinesContent,
}

impl BrandGuidelines {
    /// Loads guidelines; `.pdf` files are attached as documents, anything else is read as text
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Err(PublisherError::Validation(format!(
                "Brand guidelines file is empty: {}",
                path.display()
            )));
        }

        let content = if dotted_extension(path) == ".pdf" {
            GuidelinesContent::Document {
                mime_type: mime::APPLICATION_PDF.to_string(),
                bytes,
            }
        } else {
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            if text.is_empty() {
                return Err(PublisherError::Validation(format!(
                    "Brand guidelines file has no text: {}",
                    path.display()
                )));
            }
            GuidelinesContent::Text(text)
        };

        info!("Loaded brand guidelines from {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            content,
        })
    }

    /// Builds guidelines from text
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: GuidelinesContent::Text(text.into()),
        }
    }

    /// File the guidelines were loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without directories
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Loaded content
    pub fn content(&self) -> &GuidelinesContent {
        &self.content
    }

    /// Text to quote in a prompt, truncated to `max_chars`
    ///
    /// Documents are attached rather than quoted and yield a pointer to the attachment.
    pub fn prompt_text(&self, max_chars: usize) -> &str {
        match &self.content {
            GuidelinesContent::Text(text) => truncate_chars(text, max_chars),
            GuidelinesContent::Document { .. } => prompts::GUIDELINES_ATTACHED,
        }
    }

    /// Attaches the document to `request` when the guidelines are not plain text
    pub fn attach(&self, request: GenerateRequest) -> GenerateRequest {
        match &self.content {
            GuidelinesContent::Text(_) => request,
            GuidelinesContent::Document { mime_type, bytes } => {
                request.with_inline(mime_type.clone(), bytes.clone())
            }
        }
    }
}

/// Parsed compliance verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    /// Whether the image passes
    pub compliant: bool,
    /// The upper-cased status line, empty when absent
    pub status_line: String,
    /// Score out of ten, when reported
    pub score: Option<f32>,
    /// Full model reply
    pub raw_analysis: String,
}

/// Reads the status line and score out of a compliance reply
pub fn parse_compliance_response(text: &str) -> ComplianceVerdict {
    let status_line = text
        .lines()
        .map(|line| line.trim().to_uppercase())
        .find(|line| line.contains("COMPLIANCE STATUS:"))
        .unwrap_or_default();
    let compliant = status_line.contains("COMPLIANT") && !status_line.contains("NON-COMPLIANT");

    ComplianceVerdict {
        compliant,
        status_line,
        score: parse_score(text),
        raw_analysis: text.to_string(),
    }
}

fn parse_score(text: &str) -> Option<f32> {
    text.lines().find_map(|line| {
        let upper = line.to_uppercase();
        let rest = &upper[upper.find("OVERALL SCORE:")? + "OVERALL SCORE:".len()..];
        let rest = rest.trim().trim_start_matches(['*', '[']);
        let number = rest.split('/').next()?.trim();
        number.parse::<f32>().ok().filter(|score| (0.0..=10.0).contains(score))
    })
}

/// Checks canvas exports against brand guidelines
#[derive(Clone)]
pub struct BrandComplianceChecker {
    model: Arc<dyn GenerativeModel>,
}

impl BrandComplianceChecker {
    /// Creates a checker over `model`
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Asks the model whether `image` follows `guidelines`
    pub async fn check(
        &self,
        image: Vec<u8>,
        mime_type: &str,
        guidelines: &BrandGuidelines,
    ) -> Result<ComplianceVerdict> {
        let prompt = prompts::fill(
            prompts::BRAND_COMPLIANCE,
            &[guidelines.prompt_text(usize::MAX)],
        );
        let request = guidelines.attach(GenerateRequest::text(prompt)).with_inline(mime_type, image);

        let reply = self.model.generate(request).await?;
        let verdict = parse_compliance_response(&reply);
        info!(
            "Compliance verdict: {} (score {:?})",
            if verdict.compliant { "compliant" } else { "not compliant" },
            verdict.score
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::{MockGenerativeModel, Part};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("COMPLIANCE STATUS: COMPLIANT", true ; "compliant")]
    #[test_case("**Compliance Status:** compliant", true ; "mixed case")]
    #[test_case("COMPLIANCE STATUS: NON-COMPLIANT", false ; "non compliant")]
    #[test_case("COMPLIANCE STATUS: NEEDS REVIEW", false ; "needs review")]
    #[test_case("Looks fine to me", false ; "missing")]
    fn test_compliance_status(line: &str, expected: bool) {
        let verdict = parse_compliance_response(&format!("Intro\n{}\nMore", line));
        assert_eq!(verdict.compliant, expected);
    }

    #[test_case("OVERALL SCORE: 8/10", Some(8.0))]
    #[test_case("Overall Score: [7.5/10]", Some(7.5))]
    #[test_case("OVERALL SCORE: N/10", None)]
    #[test_case("OVERALL SCORE: 42/10", None)]
    fn test_score(line: &str, expected: Option<f32>) {
        assert_eq!(parse_compliance_response(line).score, expected);
    }

    #[tokio::test]
    async fn test_text_guidelines_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brand_guidelines_1.txt");
        std::fs::write(&path, "Use red only.\n").unwrap();
        let guidelines = BrandGuidelines::load(&path).await.unwrap();

        let mut mock = MockGenerativeModel::new();
        mock.expect_generate()
            .withf(|request| request.text_content().contains("Use red only.") && request.inline_count() == 1)
            .returning(|_| Ok("COMPLIANCE STATUS: COMPLIANT\nOVERALL SCORE: 9/10".into()));

        let checker = BrandComplianceChecker::new(Arc::new(mock));
        let verdict = checker.check(vec![1, 2], "image/png", &guidelines).await.unwrap();
        assert!(verdict.compliant);
        assert_eq!(verdict.score, Some(9.0));
    }

    #[tokio::test]
    async fn test_pdf_guidelines_are_attached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brand_guidelines_1.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let guidelines = BrandGuidelines::load(&path).await.unwrap();
        assert_eq!(guidelines.prompt_text(10), prompts::GUIDELINES_ATTACHED);

        let mut mock = MockGenerativeModel::new();
        mock.expect_generate()
            .withf(|request| {
                let mimes: Vec<_> = request
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::InlineData { mime_type, .. } => Some(mime_type.as_str()),
                        Part::Text(_) => None,
                    })
                    .collect();
                mimes == ["application/pdf", "image/png"]
            })
            .returning(|_| Ok("COMPLIANCE STATUS: NON-COMPLIANT".into()));

        let checker = BrandComplianceChecker::new(Arc::new(mock));
        let verdict = checker.check(vec![1], "image/png", &guidelines).await.unwrap();
        assert!(!verdict.compliant);
        assert_eq!(verdict.status_line, "COMPLIANCE STATUS: NON-COMPLIANT");
    }

    #[tokio::test]
    async fn test_empty_guidelines_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brand_guidelines.txt");
        std::fs::write(&path, "  \n").unwrap();
        assert!(matches!(
            BrandGuidelines::load(&path).await,
            Err(PublisherError::Validation(_))
        ));
    }

    #[test]
    fn test_prompt_text_truncates() {
        let guidelines = BrandGuidelines::from_text("g.txt", "abcdef");
        assert_eq!(guidelines.prompt_text(3), "abc");
        assert_eq!(guidelines.file_name(), "g.txt");
    }
}
