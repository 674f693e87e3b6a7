use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Settings;
use crate::types::VocabularyNode;
use crate::vocabulary::VocabularyCache;

use super::embeddings::{embedder_for, Embedder};
use super::store::{
    ClassCandidate, Document, VectorStore, EMBEDDER_KEY, EMBEDDING_DIM_KEY, VOCABULARY_HASH_KEY,
};

/// Source tag stored with every indexed class.
pub const DOCUMENT_SOURCE: &str = "schema.org";

/// Maximum number of texts sent to the embedder in one call.
const CHUNK_SIZE: usize = 256;

/// Result of an index build.
#[derive(Debug, Default, serde::Serialize)]
pub struct IndexReport {
    pub documents_indexed: u32,
    pub documents_failed: u32,
    pub total_documents: u32,
    /// True when the store was already populated and no rebuild was forced.
    pub skipped: bool,
    /// True when the store was built from a different vocabulary dump.
    pub stale: bool,
    /// True when the store was built by a different embedder; its vectors
    /// cannot be searched until a forced rebuild.
    pub embedder_changed: bool,
}

/// Vector index over the vocabulary's class descriptions.
pub struct SemanticIndex {
    store: VectorStore,
    embedder: Box<dyn Embedder>,
    vocabulary: VocabularyCache,
}

impl SemanticIndex {
    pub fn new(store: VectorStore, embedder: Box<dyn Embedder>, vocabulary: VocabularyCache) -> Self {
        Self {
            store,
            embedder,
            vocabulary,
        }
    }

    /// Open the persisted index and the configured embedder.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = VectorStore::open(settings.index_file())?;
        let embedder = embedder_for(settings.embedder)?;
        Ok(Self::new(store, embedder, VocabularyCache::from_settings(settings)))
    }

    pub fn document_count(&self) -> Result<u32> {
        self.store.document_count()
    }

    pub fn vocabulary(&mut self) -> &mut VocabularyCache {
        &mut self.vocabulary
    }

    /// Embed every vocabulary class into the store.
    ///
    /// Does nothing when the store already holds documents, unless `force`.
    /// All classes are embedded before the store is touched, and the store is
    /// replaced in one transaction, so a failed build keeps the previous index.
    pub fn build_index(&mut self, force: bool) -> Result<IndexReport> {
        let existing = self.store.document_count()?;
        if existing > 0 && !force {
            let stale = self.is_stale()?;
            if stale {
                warn!("Index was built from a different vocabulary; run with --force to rebuild");
            }
            let embedder_changed = self.embedder_changed()?;
            if embedder_changed {
                warn!(
                    embedder = %self.embedder.identity(),
                    "Index was built by a different embedder; run with --force to rebuild"
                );
            }
            info!(documents = existing, "Index already populated, skipping build");
            return Ok(IndexReport {
                total_documents: existing,
                skipped: true,
                stale,
                embedder_changed,
                ..Default::default()
            });
        }

        let classes = self.vocabulary.classes()?;
        let documents: Vec<Document> = classes.iter().map(class_document).collect();
        info!(classes = documents.len(), force, "Building semantic index");

        let mut report = IndexReport::default();
        let mut stored = Vec::with_capacity(documents.len());
        let mut embeddings = Vec::with_capacity(documents.len());
        for chunk in documents.chunks(CHUNK_SIZE) {
            let (docs, vectors) = self.embed_chunk(chunk, &mut report);
            stored.extend(docs);
            embeddings.extend(vectors);
            info!("  {}/{} classes embedded", stored.len(), documents.len());
        }

        let hash = self.vocabulary.content_hash()?;
        let identity = self.embedder.identity();
        self.store.replace_all(
            self.embedder.dimension(),
            &stored,
            &embeddings,
            &[(VOCABULARY_HASH_KEY, hash.as_str()), (EMBEDDER_KEY, identity.as_str())],
        )?;
        report.documents_indexed = stored.len() as u32;
        report.total_documents = self.store.document_count()?;

        info!(
            indexed = report.documents_indexed,
            failed = report.documents_failed,
            "Index build finished"
        );
        Ok(report)
    }

    /// The `k` classes nearest to `query`, most similar first.
    ///
    /// Fails when the stored vectors come from a different embedder.
    pub fn search(&mut self, query: &str, k: usize) -> Result<Vec<ClassCandidate>> {
        anyhow::ensure!(k >= 1, "search limit must be at least 1");
        if self.embedder_changed()? {
            anyhow::bail!(
                "Index was built by embedder '{}' but '{}' is configured. \
                 Run 'ontomirror index --force' to rebuild it.",
                self.store.get_metadata(EMBEDDER_KEY)?.unwrap_or_default(),
                self.embedder.identity()
            );
        }
        let embedding = self.embedder.embed(query).context("Failed to embed query")?;
        self.store.knn(&embedding, k)
    }

    /// Whether the populated store was built by another embedder than the
    /// active one. A store without recorded metadata is taken as compatible.
    pub fn embedder_changed(&self) -> Result<bool> {
        let dim_differs = self
            .store
            .get_metadata(EMBEDDING_DIM_KEY)?
            .and_then(|d| d.parse::<usize>().ok())
            .is_some_and(|d| d != self.embedder.dimension());
        let identity_differs = self
            .store
            .get_metadata(EMBEDDER_KEY)?
            .is_some_and(|id| id != self.embedder.identity());
        Ok(self.store.document_count()? > 0 && (dim_differs || identity_differs))
    }

    /// Embed a chunk in one batch, falling back to one-by-one on batch failure.
    /// Documents that still fail are counted and left out.
    fn embed_chunk(
        &mut self,
        chunk: &[Document],
        report: &mut IndexReport,
    ) -> (Vec<Document>, Vec<Vec<f32>>) {
        let texts: Vec<&str> = chunk.iter().map(|d| d.content.as_str()).collect();
        match self.embedder.embed_batch(&texts) {
            Ok(embeddings) if embeddings.len() == chunk.len() => (chunk.to_vec(), embeddings),
            outcome => {
                if let Err(e) = outcome {
                    warn!(error = %e, "Batch embedding failed, falling back to sequential");
                }
                let mut stored = Vec::with_capacity(chunk.len());
                let mut embeddings = Vec::with_capacity(chunk.len());
                for doc in chunk {
                    match self.embedder.embed(&doc.content) {
                        Ok(embedding) => {
                            stored.push(doc.clone());
                            embeddings.push(embedding);
                        }
                        Err(e) => {
                            warn!(class = %doc.node_id, error = %e, "embedding failed, skipping");
                            report.documents_failed += 1;
                        }
                    }
                }
                (stored, embeddings)
            }
        }
    }

    fn is_stale(&self) -> Result<bool> {
        let recorded = self.store.get_metadata(VOCABULARY_HASH_KEY)?;
        // Without a cached dump there is nothing to compare against.
        let current = match self.vocabulary.content_hash() {
            Ok(hash) => hash,
            Err(_) => return Ok(false),
        };
        Ok(recorded.is_some_and(|h| h != current))
    }
}

/// Indexed text for a class.
pub fn class_document(node: &VocabularyNode) -> Document {
    Document {
        node_id: node.id.clone(),
        label: node.label.clone(),
        source: DOCUMENT_SOURCE.to_string(),
        content: format!("Class: {}\nDescription: {}", node.label, node.description),
    }
}
