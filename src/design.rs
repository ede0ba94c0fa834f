//! Add-on code generation from a natural language design request.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::error::{PublisherError, Result};
use crate::gemini::{GenerateRequest, GenerativeModel};
use crate::prompts;

static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:javascript|js|tsx|jsx|typescript|ts)?[ \t]*\r?\n(.*?)```").expect("valid regex")
});

/// Pulls fenced code blocks out of a model reply
///
/// Blocks tagged as JavaScript/TypeScript and untagged blocks are collected
/// in document order and joined with a blank line.
pub fn extract_code_blocks(text: &str) -> Option<String> {
    let blocks: Vec<&str> = CODE_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|body| !body.is_empty())
        .collect();

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

/// Result of a design request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedDesign {
    /// Extracted sandbox code
    pub code: String,
    /// Request the code was generated for
    pub prompt: String,
    /// Where the code was written
    pub saved_to: PathBuf,
}

/// Generates and saves add-on sandbox code
#[derive(Clone)]
pub struct DesignCodeGenerator {
    model: Arc<dyn GenerativeModel>,
    output_path: PathBuf,
}

impl DesignCodeGenerator {
    /// Creates a generator writing to `output_path`
    pub fn new(model: Arc<dyn GenerativeModel>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            model,
            output_path: output_path.into(),
        }
    }

    /// Output file
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Generates code for `prompt` and writes it to the output file
    pub async fn generate(&self, prompt: &str) -> Result<GeneratedDesign> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(PublisherError::Validation("Prompt must not be empty".into()));
        }

        info!("Generating design code for: {}", prompt);
        let request = GenerateRequest::text(prompts::fill(prompts::DESIGN_CODE_REQUEST, &[prompt]))
            .with_system(prompts::DESIGN_CODE_SYSTEM.trim_start());
        let reply = self.model.generate(request).await?;

        let code = extract_code_blocks(&reply).ok_or_else(|| {
            PublisherError::upstream(self.model.model_id(), 502, "No code block found in AI response")
        })?;

        if let Some(parent) = self.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.output_path, &code).await?;
        info!("Design code written to {}", self.output_path.display());

        Ok(GeneratedDesign {
            code,
            prompt: prompt.to_string(),
            saved_to: self.output_path.clone(),
        })
    }
}
