use super::error::LlmResult;
use super::TextGenerator;

const ARTICLE_RESPONSE: &str = r#"{
    "schema_class": "BlogPosting",
    "rationale": "Detected blog-related keywords.",
    "mappings": [
        {"original_name": "title", "schema_property": "headline", "reason": "Keyword rule"},
        {"original_name": "content", "schema_property": "articleBody", "reason": "Keyword rule"}
    ]
}"#;

const PERSON_RESPONSE: &str = r#"{
    "schema_class": "Person",
    "rationale": "Detected user-related fields.",
    "mappings": [
        {"original_name": "username", "schema_property": "alternateName", "reason": "Keyword rule"},
        {"original_name": "email", "schema_property": "email", "reason": "Keyword rule"}
    ]
}"#;

const FALLBACK_RESPONSE: &str = r#"{
    "schema_class": "Thing",
    "rationale": "No specific context detected.",
    "mappings": []
}"#;

/// Deterministic backend answering from keyword rules on the user prompt.
///
/// Rules are checked in order: `blog`/`post`, then `user`/`auth`, else a
/// `Thing` answer with no mappings. Used for demos, tests, and runs without
/// credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

impl TextGenerator for OfflineGenerator {
    fn generate(&self, _system_prompt: &str, user_prompt: &str) -> LlmResult<String> {
        let prompt = user_prompt.to_lowercase();
        let response = if prompt.contains("blog") || prompt.contains("post") {
            ARTICLE_RESPONSE
        } else if prompt.contains("user") || prompt.contains("auth") {
            PERSON_RESPONSE
        } else {
            FALLBACK_RESPONSE
        };
        Ok(response.to_string())
    }

    fn model_name(&self) -> &str {
        "offline"
    }

    /// Property names such as `author` would trip the keyword rules.
    fn wants_property_hints(&self) -> bool {
        false
    }
}
