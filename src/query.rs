use crate::models::ItemRecord;

/// Picks the string used to look up a market price.
///
/// A visible model code pins down the exact SKU, so it beats the visual
/// description. Returns `None` when neither is usable; enrichment is then skipped.
pub fn select_query(record: &ItemRecord) -> Option<String> {
    let model_code = record
        .model_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty());
    let best_match = Some(record.best_match.trim()).filter(|name| !name.is_empty());

    model_code.or(best_match).map(str::to_string)
}
