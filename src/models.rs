use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Version tag of the record shape produced by identification.
///
/// `item-record/v1` (free-text price, detected text, description and feature
/// list) is retired; only v2 is requested from the model and emitted.
pub const ITEM_SCHEMA_VERSION: &str = "item-record/v2";

/// Structured description of the identified item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub best_match: String,
    pub category: String,
    /// Reported by the model as-is; nothing clamps it to `[0, 1]`.
    pub confidence_score: f64,
    #[serde(default)]
    pub model_code: Option<String>,
}

impl ItemRecord {
    /// Trims free-text fields and turns a blank `model_code` into `None`.
    pub fn normalized(mut self) -> Self {
        self.best_match = self.best_match.trim().to_string();
        self.category = self.category.trim().to_string();
        self.model_code = self
            .model_code
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty() && !code.eq_ignore_ascii_case("null"));
        self
    }
}

/// Top-ranked shopping listing for a search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub price: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub link: Option<String>,
}

/// Identification plus optional market price. `price_info` always serializes,
/// as `null` when enrichment found nothing, was skipped, or degraded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedResult {
    #[serde(flatten)]
    pub item: ItemRecord,
    pub price_info: Option<PriceRecord>,
}

#[derive(Debug, Deserialize)]
pub struct IdentifyRequest {
    /// Base64-encoded image files, in the order they should be shown to the model.
    pub images: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub stage: Option<String>,
}
