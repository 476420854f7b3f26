use crate::models::ItemRecord;

/// Outcome of reading model output as an [`ItemRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    Parsed(ItemRecord),
    Unparsable { raw: String, reason: String },
}

/// Reads the model's text as an item record.
///
/// Schema-constrained output is valid JSON on its own, so that is tried
/// first. When it is not (free-text mode, or the model wrapped its answer in
/// a markdown fence anyway), the JSON is pulled out of the fence and parsed.
pub fn parse_item_output(text: &str) -> ParsedOutput {
    let direct = serde_json::from_str::<ItemRecord>(text.trim());
    let parsed = match direct {
        Ok(record) => Ok(record),
        Err(_) => serde_json::from_str::<ItemRecord>(extract_json_block(text)),
    };

    match parsed {
        Ok(record) => {
            let record = record.normalized();
            if record.best_match.is_empty() {
                unparsable(text, "best_match is empty")
            } else if record.category.is_empty() {
                unparsable(text, "category is empty")
            } else {
                ParsedOutput::Parsed(record)
            }
        }
        Err(err) => unparsable(text, &err.to_string()),
    }
}

fn unparsable(raw: &str, reason: &str) -> ParsedOutput {
    ParsedOutput::Unparsable {
        raw: raw.to_string(),
        reason: reason.to_string(),
    }
}

/// Returns the body of a ```` ```json ```` fence, else of the first fence of
/// any kind, else the whole (trimmed) text.
pub fn extract_json_block(text: &str) -> &str {
    fenced_body(text, "```json")
        .or_else(|| fenced_body(text, "```"))
        .unwrap_or_else(|| text.trim())
}

fn fenced_body<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let start = text.to_ascii_lowercase().find(opener)?;
    let after_opener = &text[start + opener.len()..];
    // The rest of the opening line is a language tag unless the payload
    // itself starts there.
    let body = match after_opener.find('\n') {
        Some(newline) if !after_opener[..newline].contains(['{', '[']) => {
            &after_opener[newline + 1..]
        }
        _ => after_opener,
    };
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kettle() -> ItemRecord {
        ItemRecord {
            best_match: "Kettle".into(),
            category: "Kitchenware".into(),
            confidence_score: 0.8,
            model_code: None,
        }
    }

    #[test]
    fn json_fence_is_unwrapped() {
        let raw = "```json\n{\"best_match\":\"Kettle\",\"category\":\"Kitchenware\",\"confidence_score\":0.8}\n```";
        assert_eq!(parse_item_output(raw), ParsedOutput::Parsed(kettle()));
    }

    #[test]
    fn bare_json_parses_directly() {
        let raw = r#"{"best_match":"Kettle","category":"Kitchenware","confidence_score":0.8,"model_code":"KT-200"}"#;
        let ParsedOutput::Parsed(record) = parse_item_output(raw) else {
            panic!("expected parsed record");
        };
        assert_eq!(record.model_code.as_deref(), Some("KT-200"));
    }

    #[test]
    fn unlabeled_fence_with_surrounding_prose() {
        let raw = "Here you go:\n```\n{\"best_match\":\"Kettle\",\"category\":\"Kitchenware\",\"confidence_score\":0.8,\"model_code\":null}\n```\nHope that helps.";
        assert_eq!(parse_item_output(raw), ParsedOutput::Parsed(kettle()));
    }

    #[test]
    fn labeled_fence_wins_over_earlier_plain_fence() {
        let raw = "```text\nnot json\n```\n```JSON\n{\"a\":1}\n```";
        assert_eq!(extract_json_block(raw), "{\"a\":1}");
    }

    #[test]
    fn fence_without_closing_marker_takes_the_rest() {
        assert_eq!(extract_json_block("```json\n{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn json_on_the_fence_line_is_kept() {
        let raw = "```{\"best_match\":\"Kettle\",\"category\":\"Kitchenware\",\"confidence_score\":0.8}\n```";
        assert_eq!(parse_item_output(raw), ParsedOutput::Parsed(kettle()));

        let tagged = "```json {\"a\":[1]}\n```";
        assert_eq!(extract_json_block(tagged), "{\"a\":[1]}");
    }

    #[test]
    fn plain_text_is_returned_trimmed() {
        assert_eq!(extract_json_block("  {\"a\":1}\n"), "{\"a\":1}");
    }

    #[test]
    fn prose_is_unparsable_and_keeps_raw_text() {
        let raw = "I think this is a kettle.";
        match parse_item_output(raw) {
            ParsedOutput::Unparsable { raw: kept, reason } => {
                assert_eq!(kept, raw);
                assert!(!reason.is_empty());
            }
            other => panic!("expected unparsable, got {other:?}"),
        }
    }

    #[test]
    fn empty_best_match_is_rejected() {
        let raw = r#"{"best_match":"  ","category":"Kitchenware","confidence_score":0.8}"#;
        assert!(matches!(
            parse_item_output(raw),
            ParsedOutput::Unparsable { ref reason, .. } if reason == "best_match is empty"
        ));
    }
}
