use anyhow::{Context, Result};

use super::embeddings::{Embedder, EmbeddingEngine};
use super::model_cache_dir;

/// What `ontomirror setup` prepared.
#[derive(Debug, serde::Serialize)]
pub struct SetupResult {
    pub model: String,
    pub dimension: usize,
    pub model_dir: String,
}

/// Fetch the class-description embedding model into the model cache and
/// check that it embeds a vocabulary document at the expected dimension.
pub fn download_model() -> Result<SetupResult> {
    let mut engine =
        EmbeddingEngine::new_with_progress().context("Failed to download embedding model")?;

    let vector = engine
        .embed("Class: Thing\nDescription: The most generic type of item.")
        .context("Embedding model loaded but failed to embed")?;
    anyhow::ensure!(
        vector.len() == engine.dimension(),
        "Embedding model returned {} dimensions, expected {}",
        vector.len(),
        engine.dimension()
    );

    Ok(SetupResult {
        model: engine.identity(),
        dimension: vector.len(),
        model_dir: model_cache_dir().display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::EMBEDDING_DIM;

    /// Requires the embedding model to be downloadable (skipped if unavailable).
    #[test]
    fn test_download_model_reports_identity() {
        if EmbeddingEngine::new().is_err() {
            return;
        }
        let result = download_model().unwrap();
        assert_eq!(result.dimension, EMBEDDING_DIM);
        assert!(result.model.starts_with("fastembed/"));
    }
}
