use serde::{Deserialize, Serialize};

/// An inline image shipped with a vision request, already base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    pub media_type: String,
    pub base64_data: String,
}

/// A rendered completion request. The prompt text comes from the prompt
/// registry; extractors may attach one image for vision extraction.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub user_text: String,
    pub image: Option<ImagePayload>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the vendor to constrain output to a single JSON object.
    pub json_output: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            user_text: user_text.into(),
            image: None,
            temperature: 0.0,
            max_tokens: 1024,
            json_output: true,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Token usage as reported by the vendor. Always present on success; budget
/// accounting depends on it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: Usage,
}
