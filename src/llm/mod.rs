//! Text generation backends.
//!
//! The mapper talks to one [`TextGenerator`]. [`GenerationClient`] is the
//! closed set of backends the binary can construct from configuration.

pub mod error;
pub mod gemini;
pub mod offline;
pub mod openai;

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::{LlmConfig, LlmProvider};

pub use error::{LlmError, LlmResult};
pub use gemini::GeminiClient;
pub use offline::OfflineGenerator;
pub use openai::OpenAiClient;

/// Maximum length of an HTTP error body kept in [`LlmError::Http`].
const MAX_ERROR_BODY: usize = 512;

/// Synchronous "system + user prompt in, raw text out" capability.
pub trait TextGenerator {
    fn generate(&self, system_prompt: &str, user_prompt: &str) -> LlmResult<String>;

    /// Model identifier, for logs and reports.
    fn model_name(&self) -> &str;

    /// Whether prompts should list known property names per candidate class.
    fn wants_property_hints(&self) -> bool {
        true
    }
}

/// Backend selected at configuration time.
#[derive(Debug, Clone)]
pub enum GenerationClient {
    OpenAi(OpenAiClient),
    Gemini(GeminiClient),
    Offline(OfflineGenerator),
}

impl GenerationClient {
    /// Build the configured backend. A live backend without an API key is a
    /// configuration error.
    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        match config.provider {
            LlmProvider::OpenAi => {
                let key = config
                    .openai_api_key
                    .as_deref()
                    .ok_or_else(|| LlmError::Config("OPENAI_API_KEY is not set".to_string()))?;
                Ok(Self::OpenAi(
                    OpenAiClient::new(key, &config.openai_model)?
                        .with_base_url(&config.openai_base_url)
                        .with_timeout(config.timeout_secs),
                ))
            }
            LlmProvider::Gemini => {
                let key = config.gemini_api_key.as_deref().ok_or_else(|| {
                    LlmError::Config("GOOGLE_API_KEY (or GEMINI_API_KEY) is not set".to_string())
                })?;
                Ok(Self::Gemini(
                    GeminiClient::new(key, &config.gemini_model)?
                        .with_timeout(config.timeout_secs),
                ))
            }
            LlmProvider::Offline => Ok(Self::Offline(OfflineGenerator)),
        }
    }
}

impl TextGenerator for GenerationClient {
    fn generate(&self, system_prompt: &str, user_prompt: &str) -> LlmResult<String> {
        match self {
            Self::OpenAi(c) => c.generate(system_prompt, user_prompt),
            Self::Gemini(c) => c.generate(system_prompt, user_prompt),
            Self::Offline(c) => c.generate(system_prompt, user_prompt),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            Self::OpenAi(c) => c.model_name(),
            Self::Gemini(c) => c.model_name(),
            Self::Offline(c) => c.model_name(),
        }
    }

    fn wants_property_hints(&self) -> bool {
        match self {
            Self::OpenAi(c) => c.wants_property_hints(),
            Self::Gemini(c) => c.wants_property_hints(),
            Self::Offline(c) => c.wants_property_hints(),
        }
    }
}

/// Send a JSON request and decode a JSON answer, mapping HTTP failures onto [`LlmError`].
pub(crate) fn post_json<T: DeserializeOwned>(
    request: reqwest::blocking::RequestBuilder,
    timeout_secs: u64,
) -> LlmResult<T> {
    let response = request
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .map_err(|e| LlmError::from_transport(e, timeout_secs))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        return Err(LlmError::RateLimited(retry_after));
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(LlmError::Http {
            status: status.as_u16(),
            message: truncate(body.trim(), MAX_ERROR_BODY),
        });
    }

    response.json::<T>().map_err(|e| {
        if e.is_timeout() {
            LlmError::Timeout(timeout_secs)
        } else {
            LlmError::InvalidResponse(e.to_string())
        }
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_needs_no_credentials() {
        let client = GenerationClient::from_config(&LlmConfig::default()).unwrap();
        assert!(matches!(client, GenerationClient::Offline(_)));
        assert_eq!(client.model_name(), "offline");
    }

    #[test]
    fn test_missing_keys_are_config_errors() {
        let openai = LlmConfig {
            provider: LlmProvider::OpenAi,
            ..LlmConfig::default()
        };
        assert!(matches!(
            GenerationClient::from_config(&openai),
            Err(LlmError::Config(_))
        ));

        let gemini = LlmConfig {
            provider: LlmProvider::Gemini,
            ..LlmConfig::default()
        };
        assert!(matches!(
            GenerationClient::from_config(&gemini),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn test_live_backends_with_keys() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAi,
            openai_api_key: Some("sk-test".to_string()),
            openai_model: "gpt-4o-mini".to_string(),
            ..LlmConfig::default()
        };
        let client = GenerationClient::from_config(&config).unwrap();
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééé", 2), "éé...");
    }
}
