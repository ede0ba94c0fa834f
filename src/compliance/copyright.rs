use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{PublisherError, Result};
use crate::gemini::{GenerateRequest, GenerativeModel};
use crate::prompts;
use crate::utils::truncate_chars;

/// Stock and licensing sites whose presence marks an image as copyrighted
pub const COPYRIGHT_SITES: &[&str] = &[
    "shutterstock.com",
    "gettyimages.com",
    "istockphoto.com",
    "stock.adobe.com",
    "depositphotos.com",
    "dreamstime.com",
    "alamy.com",
    "123rf.com",
    "stocksy.com",
    "pond5.com",
    "pixabay.com",
    "unsplash.com",
    "pexels.com",
    "freepik.com",
    "vecteezy.com",
    "canva.com",
    "envato.com",
    "creativemarket.com",
];

/// Hits at or above which an image is considered copyrighted outright
pub const COPYRIGHTED_HIT_COUNT: usize = 5;

/// Text used when the model could not judge the scan
pub const AI_UNAVAILABLE: &str = "AI analysis unavailable";

/// ImgBB image host client
#[derive(Debug, Clone)]
pub struct ImgBbClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl ImgBbClient {
    /// Creates a client posting to `endpoint`
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Builds the client from config; fails when `IMGBB_API_KEY` is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.require_key("imgbb")?, config.services.imgbb_url.clone()))
    }

    /// Uploads `bytes` and returns the public URL
    pub async fn upload(&self, bytes: &[u8]) -> Result<String> {
        let encoded = BASE64.encode(bytes);
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("key", self.api_key.as_str()), ("image", encoded.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublisherError::upstream("imgbb", status.as_u16(), body));
        }

        let data: Value = response.json().await?;
        let url = data["data"]["url"]
            .as_str()
            .ok_or_else(|| PublisherError::EmptyResponse("imgbb".into()))?;
        info!("Uploaded to ImgBB: {}", url);
        Ok(url.to_string())
    }
}

/// One reverse image search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page the image was found on
    #[serde(default)]
    pub link: String,
    /// Site name as reported by the search engine
    #[serde(default)]
    pub source: String,
    /// Page title
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    error: Option<String>,
    #[serde(default)]
    image_results: Vec<SearchResult>,
}

/// SerpAPI Google reverse image search client
#[derive(Debug, Clone)]
pub struct SerpApiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl SerpApiClient {
    /// Creates a client querying `endpoint`
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Builds the client from config; fails when `SERPAPI_KEY` is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.require_key("serpapi")?, config.services.serpapi_url.clone()))
    }

    /// Finds pages that show the image at `image_url`
    pub async fn reverse_search(&self, image_url: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google_reverse_image"),
                ("image_url", image_url),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublisherError::upstream("serpapi", status.as_u16(), body));
        }

        let data: SerpApiResponse = response.json().await?;
        if let Some(error) = data.error {
            return Err(PublisherError::upstream("serpapi", status.as_u16(), error));
        }
        info!("Reverse image search returned {} results", data.image_results.len());
        Ok(data.image_results)
    }
}

/// A search hit on a stock or licensing site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyrightSource {
    /// 1-based rank in the search results
    pub position: usize,
    /// Matched entry of [`COPYRIGHT_SITES`]
    pub site: String,
    /// Page the image was found on
    pub link: String,
    /// Site name as reported by the search engine
    pub source: String,
    /// Page title
    pub title: String,
}

/// Result of matching search hits against the copyright site list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyrightScan {
    /// Number of search results
    pub total_results: usize,
    /// Hits on stock or licensing sites
    pub copyright_results: Vec<CopyrightSource>,
    /// First ten results
    pub all_results: Vec<SearchResult>,
}

impl CopyrightScan {
    /// Plain text digest handed to the model
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Reverse image search results: {}\nStock or licensing site matches: {}\n",
            self.total_results,
            self.copyright_results.len()
        );
        if !self.copyright_results.is_empty() {
            summary.push_str("\nMatches:\n");
            for hit in self.copyright_results.iter().take(5) {
                summary.push_str(&format!("- {}: {}\n", hit.site, truncate_chars(&hit.title, 100)));
            }
        }
        summary.push_str("\nTop results:\n");
        for (i, result) in self.all_results.iter().take(5).enumerate() {
            let source = if result.source.is_empty() { "Unknown" } else { &result.source };
            summary.push_str(&format!("{}. {}: {}\n", i + 1, source, truncate_chars(&result.title, 80)));
        }
        summary
    }
}

/// Matches each result's link or source against [`COPYRIGHT_SITES`]
pub fn scan_copyright_sources(results: &[SearchResult]) -> CopyrightScan {
    let copyright_results = results
        .iter()
        .enumerate()
        .filter_map(|(i, result)| {
            let link = result.link.to_lowercase();
            let source = result.source.to_lowercase();
            COPYRIGHT_SITES
                .iter()
                .find(|site| link.contains(*site) || source.contains(*site))
                .map(|site| CopyrightSource {
                    position: i + 1,
                    site: site.to_string(),
                    link: result.link.clone(),
                    source: result.source.clone(),
                    title: result.title.clone(),
                })
        })
        .collect();

    CopyrightScan {
        total_results: results.len(),
        copyright_results,
        all_results: results.iter().take(10).cloned().collect(),
    }
}

/// Status the model reported for a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiCopyrightStatus {
    /// Clearly a stock or licensed image
    Copyrighted,
    /// Possibly licensed
    Risky,
    /// No sign of licensing
    Safe,
    /// No status in the reply
    Unknown,
}

impl AiCopyrightStatus {
    /// Reads `STATUS: COPYRIGHTED|RISKY|SAFE` out of a reply
    pub fn parse(text: &str) -> Self {
        let upper = text.to_uppercase();
        if upper.contains("STATUS: COPYRIGHTED") {
            Self::Copyrighted
        } else if upper.contains("STATUS: RISKY") {
            Self::Risky
        } else if upper.contains("STATUS: SAFE") {
            Self::Safe
        } else {
            Self::Unknown
        }
    }
}

/// Final copyright decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyrightStatus {
    /// Found on stock sites
    Copyrighted,
    /// Some evidence of licensing
    Risky,
    /// Found only on unrelated sites
    Safe,
    /// Nothing found
    Unknown,
}

impl CopyrightStatus {
    /// Combines the site hits with the model's judgement
    pub fn decide(hits: usize, total_results: usize, ai: AiCopyrightStatus) -> Self {
        if hits >= COPYRIGHTED_HIT_COUNT || ai == AiCopyrightStatus::Copyrighted {
            Self::Copyrighted
        } else if hits > 0 || ai == AiCopyrightStatus::Risky {
            Self::Risky
        } else if total_results > 0 {
            Self::Safe
        } else {
            Self::Unknown
        }
    }

    /// One line description shown to the user
    pub fn message(self, hits: usize) -> String {
        match self {
            Self::Copyrighted => format!("COPYRIGHTED - Found {} stock/copyright sources", hits),
            Self::Risky => format!("COPYRIGHT RISK - Found {} stock/copyright sources", hits),
            Self::Safe => "SAFE - No obvious copyright sources detected".to_string(),
            Self::Unknown => "UNKNOWN - No results found".to_string(),
        }
    }
}

impl fmt::Display for CopyrightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Copyrighted => "copyrighted",
            Self::Risky => "risky",
            Self::Safe => "safe",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a copyright check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyrightReport {
    /// Final decision
    pub status: CopyrightStatus,
    /// One line description
    pub message: String,
    /// Status parsed from the model reply
    pub ai_status: AiCopyrightStatus,
    /// Model reply, or [`AI_UNAVAILABLE`]
    pub ai_analysis: String,
    /// Number of stock site hits
    pub copyright_count: usize,
    /// Number of search results
    pub total_results: usize,
    /// Stock site hits
    pub copyright_sources: Vec<CopyrightSource>,
    /// Public URL the image was searched with
    pub image_url: String,
}

/// Uploads an image, searches for it and judges its copyright risk
#[derive(Clone)]
pub struct CopyrightChecker {
    model: Arc<dyn GenerativeModel>,
    host: ImgBbClient,
    search: SerpApiClient,
}

impl CopyrightChecker {
    /// Creates a checker
    pub fn new(model: Arc<dyn GenerativeModel>, host: ImgBbClient, search: SerpApiClient) -> Self {
        Self { model, host, search }
    }

    /// Runs the whole check on a PNG export
    pub async fn check(&self, image: &[u8]) -> Result<CopyrightReport> {
        let image_url = self.host.upload(image).await?;
        let results = self.search.reverse_search(&image_url).await?;
        let scan = scan_copyright_sources(&results);
        info!(
            "Found {} copyright sources in {} results",
            scan.copyright_results.len(),
            scan.total_results
        );

        let ai_analysis = self.judge(&scan).await;
        let ai_status = AiCopyrightStatus::parse(&ai_analysis);
        let copyright_count = scan.copyright_results.len();
        let status = CopyrightStatus::decide(copyright_count, scan.total_results, ai_status);
        info!("Copyright status: {} (AI: {:?})", status, ai_status);

        Ok(CopyrightReport {
            status,
            message: status.message(copyright_count),
            ai_status,
            ai_analysis,
            copyright_count,
            total_results: scan.total_results,
            copyright_sources: scan.copyright_results,
            image_url,
        })
    }

    async fn judge(&self, scan: &CopyrightScan) -> String {
        let prompt = prompts::fill(prompts::COPYRIGHT_VERDICT, &[&scan.summary()]);
        match self.model.generate(GenerateRequest::text(prompt)).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Copyright AI analysis failed: {}", e);
                AI_UNAVAILABLE.to_string()
            }
        }
    }
}
