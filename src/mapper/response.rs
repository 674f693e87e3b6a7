use serde_json::Value;
use thiserror::Error;

use crate::types::{FALLBACK_CLASS, NO_EQUIVALENT_PROPERTY};

/// Why a generated answer could not be used.
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("response has no mappings array")]
    MissingMappings,

    #[error("mapping #{0} has no string original_name")]
    InvalidMapping(usize),
}

/// A validated answer, before it is checked against the source table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub schema_class: String,
    pub rationale: String,
    pub mappings: Vec<ParsedMapping>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMapping {
    pub original_name: String,
    pub schema_property: String,
    pub reason: String,
}

/// Parse raw model output into a [`ParsedResponse`].
///
/// Markdown fences and prose around the outermost JSON object are ignored.
/// Missing `schema_class` falls back to `Thing`; a null or blank
/// `schema_property` becomes the no-equivalent sentinel.
pub fn parse_response(text: &str) -> Result<ParsedResponse, ResponseError> {
    let value: Value = serde_json::from_str(strip_fences(text))?;
    let obj = value.as_object().ok_or(ResponseError::NotAnObject)?;
    let mappings = obj
        .get("mappings")
        .and_then(Value::as_array)
        .ok_or(ResponseError::MissingMappings)?;

    let mappings = mappings
        .iter()
        .enumerate()
        .map(|(i, m)| -> Result<ParsedMapping, ResponseError> {
            let original_name = m
                .get("original_name")
                .and_then(Value::as_str)
                .ok_or(ResponseError::InvalidMapping(i))?;
            Ok(ParsedMapping {
                original_name: original_name.to_string(),
                schema_property: non_blank(m.get("schema_property"))
                    .unwrap_or(NO_EQUIVALENT_PROPERTY)
                    .to_string(),
                reason: m
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedResponse {
        schema_class: non_blank(obj.get("schema_class"))
            .unwrap_or(FALLBACK_CLASS)
            .to_string(),
        rationale: obj
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        mappings,
    })
}

fn non_blank(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// The JSON payload inside a possibly fenced or chatty answer.
pub fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let body = fenced_body(text).unwrap_or(text);
    outermost_object(body).unwrap_or(body)
}

/// Content of the first ``` block, without its language tag.
fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let rest = &text[start + 3..];
    let rest = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &rest[nl + 1..],
        _ => rest,
    };
    let body = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    Some(body.trim())
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
