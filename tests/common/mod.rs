#![allow(dead_code)]

use async_trait::async_trait;
use contentpublisher::{Config, GenerateRequest, GenerativeModel, Result, Services};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const FAKE_MODEL_ID: &str = "fake-vision";

/// Feature reply for a minimal teal post
pub const MINIMAL_FEATURES: &str = r#"```json
{
  "visual_style": ["Minimal", "flat"],
  "color_palette": ["teal", "white"],
  "composition": ["centered"],
  "emotion_mood": ["calm"]
}
```"#;

/// Feature reply for a busy post
pub const BUSY_FEATURES: &str = r#"{
  "visual_style": ["collage"],
  "color_palette": ["red", "teal"],
  "composition": ["cluttered"],
  "emotion_mood": ["energetic"]
}"#;

type Responder = dyn Fn(&GenerateRequest) -> Result<String> + Send + Sync;

/// Model that answers through a closure and records every request
pub struct FakeModel {
    responder: Box<Responder>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl FakeModel {
    pub fn new(responder: impl Fn(&GenerateRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `text`
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeModel for FakeModel {
    fn model_id(&self) -> &str {
        FAKE_MODEL_ID
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(&request)
    }
}

/// Config rooted in `dir` with throttling and backoff disabled
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::new(dir.join("uploads"));
    config.storage.design_output = dir.join("code.js");
    config.rate_limits.gemini_requests_per_minute = 1000;
    config.rate_limits.gemini_min_delay_seconds = 0.0;
    config.retry.max_attempts = 1;
    config.retry.base_delay_seconds = 0.0;
    config
}

/// Services over `model` with the uploads layout created
pub async fn test_services(dir: &Path, model: Arc<FakeModel>) -> Services {
    let services = Services::with_model(test_config(dir), model);
    services.store.ensure_layout().await.unwrap();
    services
}

/// Writes placeholder images and a `posts.csv` listing them into `dir`
pub fn write_posts(dir: &Path, rows: &[(&str, i64)]) {
    std::fs::create_dir_all(dir).unwrap();
    let mut csv = String::from("image,likes\n");
    for (name, likes) in rows {
        std::fs::write(dir.join(name), b"\x89PNG\r\n\x1a\nfake").unwrap();
        csv.push_str(&format!("{},{}\n", name, likes));
    }
    std::fs::write(dir.join("posts.csv"), csv).unwrap();
}
