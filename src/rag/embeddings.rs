use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use sha2::{Digest, Sha256};

use crate::config::EmbedderKind;

use super::{model_cache_dir, EMBEDDING_DIM};

/// Batch size for fastembed internal sub-batching.
const EMBED_BATCH_SIZE: usize = 64;

/// Text embedding capability used by the semantic index.
pub trait Embedder {
    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Stable name of the model, recorded with the index it builds.
    /// Vectors from different identities are not comparable.
    fn identity(&self) -> String;

    fn embed(&mut self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Construct the embedder selected by configuration.
pub fn embedder_for(kind: EmbedderKind) -> Result<Box<dyn Embedder>> {
    let embedder: Box<dyn Embedder> = match kind {
        EmbedderKind::FastEmbed => Box::new(EmbeddingEngine::new().context(
            "Failed to load embedding model. Run 'ontomirror setup' to download it, \
             or set ONTOMIRROR_EMBEDDER=hash",
        )?),
        EmbedderKind::Hash => Box::new(HashEmbedder::default()),
    };
    Ok(embedder)
}

/// Embedding engine wrapping a fastembed ONNX model (quantized BGE-small-en-v1.5).
pub struct EmbeddingEngine {
    model: TextEmbedding,
}

impl EmbeddingEngine {
    /// Models are cached in the shared directory (see [`super::model_cache_dir`]).
    pub fn new() -> Result<Self> {
        Self::load(false)
    }

    /// Same as [`EmbeddingEngine::new`], showing download progress on stdout.
    pub fn new_with_progress() -> Result<Self> {
        Self::load(true)
    }

    fn load(show_progress: bool) -> Result<Self> {
        let model = TextEmbedding::try_new(
            TextInitOptions::new(EmbeddingModel::BGESmallENV15Q)
                .with_cache_dir(model_cache_dir())
                .with_show_download_progress(show_progress),
        )
        .context("Failed to initialize embedding model")?;

        Ok(Self { model })
    }
}

impl Embedder for EmbeddingEngine {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn identity(&self) -> String {
        "fastembed/bge-small-en-v1.5-q".to_string()
    }

    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        let results = self
            .model
            .embed(vec![text], Some(1))
            .context("Embedding failed")?;

        results
            .into_iter()
            .next()
            .context("No embedding returned")
    }

    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.model
            .embed(texts, Some(EMBED_BATCH_SIZE))
            .context("Batch embedding failed")
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercased word (camelCase and snake_case are split) is hashed into a
/// signed bucket; the result is L2-normalized. Texts sharing words land close
/// together, which is enough for offline runs and tests. No model download.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0_f32; self.dim];
        for word in split_words(text) {
            let digest = Sha256::digest(word.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) % self.dim as u64;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vec[bucket as usize] += sign;
        }

        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vec.iter_mut().for_each(|x| *x /= norm);
        }
        vec
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn identity(&self) -> String {
        format!("hash/{}", self.dim)
    }

    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Lowercased alphanumeric words, split on camelCase boundaries.
fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in text.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_numeric();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Serialize a Vec<f32> to little-endian bytes for sqlite-vec storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}
