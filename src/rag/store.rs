use std::path::Path;
use std::sync::Once;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::embeddings::embedding_to_bytes;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    node_id TEXT NOT NULL,
    label TEXT NOT NULL,
    source TEXT NOT NULL,
    content TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_node ON documents(node_id);
"#;

const SQL_INSERT_DOCUMENT: &str =
    "INSERT INTO documents (node_id, label, source, content) VALUES (?1, ?2, ?3, ?4)";

const SQL_INSERT_VECTOR: &str = "INSERT INTO document_vectors (rowid, embedding) VALUES (?1, ?2)";

const SQL_KNN: &str = "WITH matches AS (
        SELECT rowid, distance FROM document_vectors
        WHERE embedding MATCH ?1 AND k = ?2
     )
     SELECT d.node_id, d.label, d.source, d.content, m.distance
     FROM matches m JOIN documents d ON d.id = m.rowid
     ORDER BY m.distance";

/// Metadata key: dimension of the vectors in `document_vectors`.
pub const EMBEDDING_DIM_KEY: &str = "embedding_dim";

/// Metadata key: identity of the embedder that produced the vectors.
pub const EMBEDDER_KEY: &str = "embedder";

/// Metadata key: hash of the vocabulary the index was built from.
pub const VOCABULARY_HASH_KEY: &str = "vocabulary_hash";

static REGISTER_VEC: Once = Once::new();

/// Make the sqlite-vec functions available on every connection opened after this.
fn register_vec_extension() {
    // SAFETY: `sqlite3_vec_init` is a C extension entry point with the
    // `(db, pzErrMsg, pApi) -> c_int` signature SQLite expects from an auto
    // extension; it is declared without arguments on the Rust side, so the
    // pointer is cast to the `xEntryPoint` type SQLite will call it through.
    // The function is statically linked and lives for the whole process.
    REGISTER_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// One text to index, with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub node_id: String,
    pub label: String,
    pub source: String,
    pub content: String,
}

/// A nearest-neighbour hit. Lower distance means more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassCandidate {
    pub id: String,
    pub label: String,
    pub source: String,
    pub content: String,
    pub distance: f64,
}

/// Persistent vector store: documents plus a `vec0` virtual table keyed by document id.
pub struct VectorStore {
    conn: Connection,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore").finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Open or create the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        register_vec_extension();
        let conn = Connection::open(path).context("Failed to open vector store")?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;",
        )
        .context("Failed to set pragmas")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create schema")?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for tests and benchmarks).
    #[doc(hidden)]
    pub fn open_memory() -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ── Metadata ──

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query metadata")
    }

    /// Store a metadata key-value pair (upserts on conflict).
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // ── Documents ──

    pub fn document_count(&self) -> Result<u32> {
        self.conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .context("Failed to count documents")
    }

    /// Drop every document and recreate the vector table for `dim`-sized vectors.
    pub fn reset(&self, dim: usize) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.recreate_tables(dim)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert documents with their embeddings in a single transaction.
    ///
    /// Requires a prior [`VectorStore::reset`] so the vector table exists.
    pub fn insert_documents(&self, documents: &[Document], embeddings: &[Vec<f32>]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.insert_rows(documents, embeddings)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the whole store contents in one transaction: recreate the
    /// vector table, insert every document and write `metadata`.
    ///
    /// On any error the previous contents are left untouched.
    pub fn replace_all(
        &self,
        dim: usize,
        documents: &[Document],
        embeddings: &[Vec<f32>],
        metadata: &[(&str, &str)],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.recreate_tables(dim)?;
        self.insert_rows(documents, embeddings)?;
        for (key, value) in metadata {
            self.set_metadata(key, value)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn recreate_tables(&self, dim: usize) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM documents;
             DROP TABLE IF EXISTS document_vectors;",
        )?;
        self.conn
            .execute_batch(&format!(
                "CREATE VIRTUAL TABLE document_vectors USING vec0(embedding float[{dim}]);"
            ))
            .context("Failed to create vector table")?;
        self.set_metadata(EMBEDDING_DIM_KEY, &dim.to_string())
    }

    fn insert_rows(&self, documents: &[Document], embeddings: &[Vec<f32>]) -> Result<()> {
        anyhow::ensure!(
            documents.len() == embeddings.len(),
            "{} documents but {} embeddings",
            documents.len(),
            embeddings.len()
        );

        let mut doc_stmt = self.conn.prepare_cached(SQL_INSERT_DOCUMENT)?;
        let mut vec_stmt = self
            .conn
            .prepare_cached(SQL_INSERT_VECTOR)
            .context("Vector table missing; reset the store first")?;
        for (doc, embedding) in documents.iter().zip(embeddings) {
            doc_stmt.execute(params![doc.node_id, doc.label, doc.source, doc.content])?;
            let id = self.conn.last_insert_rowid();
            vec_stmt
                .execute(params![id, embedding_to_bytes(embedding)])
                .with_context(|| format!("Failed to store vector for {}", doc.node_id))?;
        }
        Ok(())
    }

    /// The `k` stored documents closest to `embedding`, nearest first.
    pub fn knn(&self, embedding: &[f32], k: usize) -> Result<Vec<ClassCandidate>> {
        if k == 0 || self.document_count()? == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare_cached(SQL_KNN)?;
        let rows = stmt
            .query_map(params![embedding_to_bytes(embedding), k as i64], |row| {
                Ok(ClassCandidate {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    source: row.get(2)?,
                    content: row.get(3)?,
                    distance: row.get(4)?,
                })
            })
            .context("Vector search failed")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Vector search failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        Document {
            node_id: format!("schema:{id}"),
            label: id.to_string(),
            source: "schema.org".to_string(),
            content: format!("Class: {id}\nDescription: test"),
        }
    }

    #[test]
    fn test_metadata_roundtrip() {
        let store = VectorStore::open_memory().unwrap();
        assert!(store.get_metadata("missing").unwrap().is_none());
        store.set_metadata(VOCABULARY_HASH_KEY, "abc").unwrap();
        store.set_metadata(VOCABULARY_HASH_KEY, "def").unwrap();
        assert_eq!(store.get_metadata(VOCABULARY_HASH_KEY).unwrap().as_deref(), Some("def"));
    }

    #[test]
    fn test_insert_and_knn_ordering() {
        let store = VectorStore::open_memory().unwrap();
        store.reset(3).unwrap();
        store
            .insert_documents(
                &[doc("Person"), doc("Product"), doc("Event")],
                &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
            )
            .unwrap();
        assert_eq!(store.document_count().unwrap(), 3);
        assert_eq!(store.get_metadata(EMBEDDING_DIM_KEY).unwrap().as_deref(), Some("3"));

        let hits = store.knn(&[0.1, 0.9, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].label, "Product");
        assert_eq!(hits[0].id, "schema:Product");
        assert_eq!(hits[0].source, "schema.org");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_knn_k_larger_than_store() {
        let store = VectorStore::open_memory().unwrap();
        store.reset(2).unwrap();
        store
            .insert_documents(&[doc("Person")], &[vec![1.0, 0.0]])
            .unwrap();
        assert_eq!(store.knn(&[1.0, 0.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn test_knn_on_empty_store() {
        let store = VectorStore::open_memory().unwrap();
        assert!(store.knn(&[1.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_reset_clears_documents() {
        let store = VectorStore::open_memory().unwrap();
        store.reset(2).unwrap();
        store
            .insert_documents(&[doc("Person"), doc("Place")], &[vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        store.reset(4).unwrap();
        assert_eq!(store.document_count().unwrap(), 0);
        assert_eq!(store.get_metadata(EMBEDDING_DIM_KEY).unwrap().as_deref(), Some("4"));
    }

    #[test]
    fn test_replace_all_rolls_back_on_bad_vector() {
        let store = VectorStore::open_memory().unwrap();
        store
            .replace_all(2, &[doc("Person")], &[vec![1.0, 0.0]], &[(EMBEDDER_KEY, "a")])
            .unwrap();

        // Second row has the wrong dimension; nothing of the new build may stick.
        let result = store.replace_all(
            3,
            &[doc("Product"), doc("Event")],
            &[vec![1.0, 0.0, 0.0], vec![1.0]],
            &[(EMBEDDER_KEY, "b")],
        );
        assert!(result.is_err());
        assert_eq!(store.document_count().unwrap(), 1);
        assert_eq!(store.get_metadata(EMBEDDING_DIM_KEY).unwrap().as_deref(), Some("2"));
        assert_eq!(store.get_metadata(EMBEDDER_KEY).unwrap().as_deref(), Some("a"));
        assert_eq!(store.knn(&[1.0, 0.0], 1).unwrap()[0].label, "Person");
    }

    #[test]
    fn test_insert_length_mismatch() {
        let store = VectorStore::open_memory().unwrap();
        store.reset(2).unwrap();
        assert!(store.insert_documents(&[doc("Person")], &[]).is_err());
    }

    #[test]
    fn test_store_persists_on_disk() {
        let dir = std::env::temp_dir().join("ontomirror_store_persist");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("vector_store/index.db");
        {
            let store = VectorStore::open(&path).unwrap();
            store.reset(2).unwrap();
            store.insert_documents(&[doc("Person")], &[vec![1.0, 0.0]]).unwrap();
        }
        let store = VectorStore::open(&path).unwrap();
        assert_eq!(store.document_count().unwrap(), 1);
        assert_eq!(store.knn(&[1.0, 0.0], 1).unwrap()[0].label, "Person");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
