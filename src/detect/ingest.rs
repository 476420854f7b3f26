use crate::detect::parse::{ParsedOutput, parse_item_output};
use crate::llm::{LlmError, VisionBackend, VisionImage, VisionRequest};
use crate::models::{ITEM_SCHEMA_VERSION, ItemRecord};
use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = r#"
You are a product identification agent. The images that follow all show the same physical item,
possibly from different angles. Identify the item.

Rules:
- If a model number or product code is printed on a visible label, read it exactly and put it in
  `model_code`. Prefer that code over general appearance when naming the item in `best_match`.
- Never use a serial number as `model_code`. If no model code is visible, set `model_code` to null.
- `category` is a short, coarse product category.
- `confidence_score` is your confidence in `best_match`, between 0.0 and 1.0.
- Return only a JSON object with the fields `best_match`, `category`, `confidence_score` and
  `model_code`. No other fields and no prose.
"#;

/// Response schema in the subset of OpenAPI the vision service accepts.
static ITEM_RESPONSE_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "OBJECT",
        "properties": {
            "best_match": {"type": "STRING"},
            "category": {"type": "STRING"},
            "confidence_score": {"type": "NUMBER"},
            "model_code": {"type": "STRING", "nullable": true},
        },
        "required": ["best_match", "category", "confidence_score"],
        "propertyOrdering": ["best_match", "category", "confidence_score", "model_code"],
    })
});

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("vision request failed: {0}")]
    Llm(#[from] LlmError),
    #[error("vision request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("unable to parse item json: {reason}")]
    Parse { reason: String, raw: String },
}

pub fn build_request(images: Vec<VisionImage>) -> VisionRequest {
    VisionRequest {
        prompt: SYSTEM_PROMPT.trim().to_string(),
        images,
        response_schema: Some(ITEM_RESPONSE_SCHEMA.clone()),
    }
}

/// One bounded, unretried call to the vision service, parsed into an
/// [`ItemRecord`].
pub async fn infer_item(
    backend: &dyn VisionBackend,
    images: Vec<VisionImage>,
    timeout: Duration,
) -> Result<ItemRecord, IngestError> {
    let image_count = images.len();
    let request = build_request(images);

    let started = Instant::now();
    let response = tokio::time::timeout(timeout, backend.generate(&request))
        .await
        .map_err(|_| IngestError::Timeout(timeout))??;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let usage = response.usage.unwrap_or_default();
    info!(
        target: "itemlens.vision",
        model = backend.model(),
        images = image_count,
        elapsed_ms,
        input_tokens = ?usage.input_tokens,
        output_tokens = ?usage.output_tokens,
        total_tokens = ?usage.total_tokens,
        "vision_response_received"
    );

    match parse_item_output(&response.text) {
        ParsedOutput::Parsed(record) => {
            debug!(
                target: "itemlens.vision",
                schema = ITEM_SCHEMA_VERSION,
                record = ?record,
                "vision_record_parsed"
            );
            Ok(record)
        }
        ParsedOutput::Unparsable { raw, reason } => {
            warn!(
                target: "itemlens.vision",
                reason = %reason,
                raw_len = raw.len(),
                "vision_output_unparsable"
            );
            Err(IngestError::Parse { reason, raw })
        }
    }
}
