use std::path::PathBuf;

use anyhow::{Context, Result};

/// Default vocabulary dump: core Schema.org plus all extensions.
pub const DEFAULT_VOCABULARY_URL: &str =
    "https://schema.org/version/latest/schemaorg-all-https.jsonld";

const VOCABULARY_FILE: &str = "schemaorg-all-https.jsonld";
const INDEX_FILE: &str = "index.db";

/// Which text-generation backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Gemini,
    /// Deterministic keyword-rule backend; needs no network or credentials.
    Offline,
}

impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            "mock" | "offline" => Ok(Self::Offline),
            other => Err(anyhow::anyhow!("unknown LLM provider: '{other}'")),
        }
    }
}

/// Which embedding backend the semantic index uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Local ONNX model via fastembed.
    FastEmbed,
    /// Deterministic token-hashing embedder (no model download).
    Hash,
}

impl std::str::FromStr for EmbedderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fastembed" => Ok(Self::FastEmbed),
            "hash" => Ok(Self::Hash),
            other => Err(anyhow::anyhow!("unknown embedder: '{other}'")),
        }
    }
}

/// Settings for the generation client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Offline,
            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-1.5-pro".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Process-level settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub vocabulary_url: String,
    pub embedder: EmbedderKind,
    pub llm: LlmConfig,
}

impl Settings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup (used by tests).
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = LlmConfig::default();

        let provider = match get("LLM_PROVIDER") {
            Some(v) => v.parse::<LlmProvider>().context("Invalid LLM_PROVIDER")?,
            None => defaults.provider,
        };
        let embedder = match get("ONTOMIRROR_EMBEDDER") {
            Some(v) => v.parse::<EmbedderKind>().context("Invalid ONTOMIRROR_EMBEDDER")?,
            None => EmbedderKind::FastEmbed,
        };
        let timeout_secs = match get("LLM_TIMEOUT_SECS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid LLM_TIMEOUT_SECS: '{v}'"))?,
            None => defaults.timeout_secs,
        };

        let llm = LlmConfig {
            provider,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_base_url: get("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            gemini_api_key: get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            timeout_secs,
        };

        Ok(Self {
            data_dir: get("ONTOMIRROR_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            vocabulary_url: get("ONTOMIRROR_VOCABULARY_URL")
                .unwrap_or_else(|| DEFAULT_VOCABULARY_URL.to_string()),
            embedder,
            llm,
        })
    }

    /// Local copy of the vocabulary dump.
    pub fn vocabulary_file(&self) -> PathBuf {
        self.data_dir.join("knowledge_base").join(VOCABULARY_FILE)
    }

    /// Directory holding the persisted vector index.
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("vector_store")
    }

    pub fn index_file(&self) -> PathBuf {
        self.index_dir().join(INDEX_FILE)
    }
}
