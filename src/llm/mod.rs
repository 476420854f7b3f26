pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One already-normalized image, sent inline with the prompt.
#[derive(Debug, Clone)]
pub struct VisionImage {
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    pub images: Vec<VisionImage>,
    /// JSON schema the service should constrain its output to, when it can.
    pub response_schema: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct VisionResponse {
    pub text: String,
    pub usage: Option<LlmUsage>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LlmUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Multimodal inference service. Implementations are shared across
/// concurrent requests, so they must be safe to call through `&self`.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, request: &VisionRequest) -> Result<VisionResponse, LlmError>;
}
