use serde::{Deserialize, Serialize};

/// One piece of model input
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Plain text
    Text(String),
    /// Binary payload such as an image or PDF
    InlineData {
        /// MIME type of `data`
        mime_type: String,
        /// Raw bytes, base64-encoded on the wire
        data: Vec<u8>,
    },
}

/// A single-turn generation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    /// Optional system instruction
    pub system_instruction: Option<String>,
    /// Ordered user parts
    pub parts: Vec<Part>,
}

impl GenerateRequest {
    /// Request with a single text part
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: None,
            parts: vec![Part::Text(prompt.into())],
        }
    }

    /// Sets the system instruction
    pub fn with_system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Appends a text part
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::Text(text.into()));
        self
    }

    /// Appends a binary part
    pub fn with_inline(mut self, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.parts.push(Part::InlineData {
            mime_type: mime_type.into(),
            data,
        });
        self
    }

    /// Concatenated text parts, mostly useful in tests and logs
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of binary parts
    pub fn inline_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, Part::InlineData { .. }))
            .count()
    }
}

// Wire format of the generateContent REST endpoint.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireRequest {
    pub contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<WireContent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<WireBlob>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireBlob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    #[serde(default)]
    pub candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCandidate {
    pub content: Option<WireContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorEnvelope {
    pub error: WireError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}
