use serde::{Deserialize, Serialize};

use super::error::{LlmError, LlmResult};
use super::{post_json, TextGenerator};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> LlmResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| LlmError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            timeout_secs: 120,
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }
}

fn request_body<'a>(system_prompt: &'a str, user_prompt: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: [Part {
                text: system_prompt,
            }],
        },
        contents: [Content {
            role: Some("user"),
            parts: [Part { text: user_prompt }],
        }],
        generation_config: GenerationConfig {
            temperature: 0.0,
            response_mime_type: "application/json",
        },
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, system_prompt: &str, user_prompt: &str) -> LlmResult<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(system_prompt, user_prompt));

        let response: GenerateResponse = post_json(request, self.timeout_secs)?;
        extract_text(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Concatenated text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> LlmResult<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(LlmError::InvalidResponse(
            "no text in first candidate".to_string(),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(request_body("sys", "usr")).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "usr");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_extract_text_blocked_candidate() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert!(matches!(extract_text(response), Err(LlmError::InvalidResponse(_))));

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(extract_text(empty).is_err());
    }

    #[test]
    fn test_model_name() {
        let client = GeminiClient::new("key", "gemini-1.5-pro").unwrap();
        assert_eq!(client.model_name(), "gemini-1.5-pro");
    }
}
