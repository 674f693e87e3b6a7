pub mod embeddings;
pub mod index;
pub mod setup;
pub mod store;

pub use embeddings::{Embedder, EmbeddingEngine, HashEmbedder};
pub use index::{IndexReport, SemanticIndex};
pub use store::{ClassCandidate, VectorStore};

/// Vector size of the class-description embeddings (bge-small-en-v1.5).
pub const EMBEDDING_DIM: usize = 384;

/// Where the embedding model lives, kept outside `ONTOMIRROR_DATA_DIR` so
/// every project reuses one download:
/// `FASTEMBED_CACHE_DIR`, else `XDG_CACHE_HOME/ontomirror/models`, else
/// `~/.cache/ontomirror/models`.
pub fn model_cache_dir() -> std::path::PathBuf {
    if let Ok(dir) = std::env::var("FASTEMBED_CACHE_DIR") {
        return std::path::PathBuf::from(dir);
    }

    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        return std::path::PathBuf::from(xdg).join("ontomirror").join("models");
    }

    if let Some(home) = home_dir() {
        return home.join(".cache").join("ontomirror").join("models");
    }

    std::path::PathBuf::from(".fastembed_cache")
}

fn home_dir() -> Option<std::path::PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(std::path::PathBuf::from)
}
