use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::Settings;
use crate::types::{NodeKind, VocabularyNode};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Local cache of the target vocabulary (Schema.org JSON-LD).
///
/// The dump is downloaded once into `cache_file` and parsed at most once per
/// cache object; there is no invalidation. Delete the file to pick up a newer
/// vocabulary.
#[derive(Debug)]
pub struct VocabularyCache {
    cache_file: PathBuf,
    source_url: String,
    nodes: Option<Vec<VocabularyNode>>,
}

impl VocabularyCache {
    pub fn new(cache_file: impl Into<PathBuf>, source_url: impl Into<String>) -> Self {
        Self {
            cache_file: cache_file.into(),
            source_url: source_url.into(),
            nodes: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.vocabulary_file(), settings.vocabulary_url.clone())
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    pub fn is_loaded(&self) -> bool {
        self.nodes.is_some()
    }

    /// Download the dump if it is not cached yet, then load it into memory.
    /// Subsequent calls are no-ops.
    ///
    /// Download and parse failures are returned to the caller: nothing can be
    /// mapped without a vocabulary.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.nodes.is_some() {
            return Ok(());
        }
        if !self.cache_file.exists() {
            self.download()?;
        }

        info!(file = %self.cache_file.display(), "Loading vocabulary");
        let text = std::fs::read_to_string(&self.cache_file).with_context(|| {
            format!("Failed to read vocabulary {}", self.cache_file.display())
        })?;
        let nodes = parse_vocabulary(&text)
            .with_context(|| format!("Failed to parse vocabulary {}", self.cache_file.display()))?;
        info!(definitions = nodes.len(), "Vocabulary loaded");

        self.nodes = Some(nodes);
        Ok(())
    }

    /// All class definitions.
    pub fn classes(&mut self) -> Result<Vec<VocabularyNode>> {
        self.of_kind(NodeKind::Class)
    }

    /// All property definitions.
    pub fn properties(&mut self) -> Result<Vec<VocabularyNode>> {
        self.of_kind(NodeKind::Property)
    }

    /// Properties whose domain includes `class_id` (directly, no inheritance).
    pub fn properties_for(&mut self, class_id: &str) -> Result<Vec<VocabularyNode>> {
        Ok(self
            .properties()?
            .into_iter()
            .filter(|p| p.domain_includes.iter().any(|d| d == class_id))
            .collect())
    }

    /// SHA-256 of the cached dump, for detecting a stale index.
    pub fn content_hash(&self) -> Result<String> {
        let bytes = std::fs::read(&self.cache_file).with_context(|| {
            format!("Failed to read vocabulary {}", self.cache_file.display())
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn of_kind(&mut self, kind: NodeKind) -> Result<Vec<VocabularyNode>> {
        self.ensure_loaded()?;
        Ok(self
            .nodes
            .iter()
            .flatten()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect())
    }

    fn download(&self) -> Result<()> {
        if let Some(parent) = self.cache_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let bytes = if let Some(local) = self.source_url.strip_prefix("file://") {
            info!(source = %local, "Copying vocabulary");
            std::fs::read(local).with_context(|| format!("Failed to read vocabulary source {local}"))?
        } else {
            info!(url = %self.source_url, "Downloading vocabulary");
            let client = reqwest::blocking::Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()
                .context("Failed to create HTTP client")?;
            client
                .get(&self.source_url)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes())
                .with_context(|| format!("Failed to download vocabulary from {}", self.source_url))?
                .to_vec()
        };

        // Write-then-rename so an interrupted download never looks cached.
        let partial = self.cache_file.with_extension("part");
        std::fs::write(&partial, &bytes)
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        std::fs::rename(&partial, &self.cache_file)
            .with_context(|| format!("Failed to write {}", self.cache_file.display()))?;

        info!(file = %self.cache_file.display(), bytes = bytes.len(), "Vocabulary saved");
        Ok(())
    }
}

/// Parse a JSON-LD dump into normalized nodes.
///
/// Accepts an object with an `@graph` array or a bare array. Nodes that are
/// neither classes nor properties (enumeration members, ontology headers)
/// are dropped.
pub fn parse_vocabulary(text: &str) -> Result<Vec<VocabularyNode>> {
    let doc: Value = serde_json::from_str(text).context("Vocabulary is not valid JSON")?;
    let graph = match &doc {
        Value::Array(nodes) => nodes,
        Value::Object(map) => map
            .get("@graph")
            .and_then(Value::as_array)
            .context("Vocabulary object has no @graph array")?,
        _ => anyhow::bail!("Vocabulary must be a JSON object or array"),
    };
    Ok(graph.iter().filter_map(normalize_node).collect())
}

fn normalize_node(node: &Value) -> Option<VocabularyNode> {
    let obj = node.as_object()?;
    let kind = node_kind(obj.get("@type")?)?;
    let id = obj.get("@id").and_then(text_value)?;

    let label = first_text(obj, &["rdfs:label", "label"]).unwrap_or_else(|| local_name(&id).to_string());
    let description = first_text(obj, &["rdfs:comment", "comment", "description"]).unwrap_or_default();
    let domain_includes = ["schema:domainIncludes", "domainIncludes"]
        .iter()
        .find_map(|k| obj.get(*k))
        .map(id_list)
        .unwrap_or_default();

    Some(VocabularyNode {
        id,
        label,
        description,
        kind,
        domain_includes,
    })
}

/// Collapse a string-or-list `@type` into a node kind. Class wins when both appear.
fn node_kind(type_value: &Value) -> Option<NodeKind> {
    let tags: Vec<&str> = match type_value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => return None,
    };
    let is_class = |t: &&str| {
        matches!(
            *t,
            "rdfs:Class" | "Class" | "http://www.w3.org/2000/01/rdf-schema#Class"
        )
    };
    let is_property = |t: &&str| {
        matches!(
            *t,
            "rdf:Property" | "Property" | "http://www.w3.org/1999/02/22-rdf-syntax-ns#Property"
        )
    };
    if tags.iter().any(is_class) {
        Some(NodeKind::Class)
    } else if tags.iter().any(is_property) {
        Some(NodeKind::Property)
    } else {
        None
    }
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(text_value))
}

/// Plain string, language literal `{"@value": ...}`, or the first usable list entry.
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("@value").and_then(text_value),
        Value::Array(items) => items.iter().find_map(text_value),
        _ => None,
    }
}

/// Ids from `{"@id": ..}`, a list of those, or plain strings.
fn id_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Object(map) => map
            .get("@id")
            .and_then(Value::as_str)
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        Value::Array(items) => items.iter().flat_map(id_list).collect(),
        _ => Vec::new(),
    }
}

/// `schema:Person` -> `Person`, `https://schema.org/Person` -> `Person`.
fn local_name(id: &str) -> &str {
    id.rsplit(|c: char| matches!(c, ':' | '/' | '#'))
        .next()
        .unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "@context": {"schema": "https://schema.org/"},
        "@graph": [
            {"@id": "schema:Person", "@type": "rdfs:Class",
             "rdfs:label": "Person", "rdfs:comment": "A person (alive, dead, undead, or fictional)."},
            {"@id": "schema:Product", "@type": ["rdfs:Class", "schema:Intangible"],
             "rdfs:label": {"@language": "en", "@value": "Product"},
             "rdfs:comment": "Any offered product or service."},
            {"@id": "schema:email", "@type": "rdf:Property", "rdfs:label": "email",
             "rdfs:comment": "Email address.",
             "schema:domainIncludes": [{"@id": "schema:Person"}, {"@id": "schema:Organization"}]},
            {"@id": "schema:sku", "@type": "rdf:Property", "rdfs:label": "sku",
             "schema:domainIncludes": {"@id": "schema:Product"}},
            {"@id": "schema:Monday", "@type": "schema:DayOfWeek", "rdfs:label": "Monday"},
            {"@id": "schema:NoLabel", "@type": "rdfs:Class"}
        ]
    }"##;

    fn scratch_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ontomirror_vocab_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("vocabulary.jsonld")
    }

    #[test]
    fn test_parse_normalizes_nodes() {
        let nodes = parse_vocabulary(SAMPLE).unwrap();
        assert_eq!(nodes.len(), 5, "DayOfWeek member should be dropped");

        let product = nodes.iter().find(|n| n.id == "schema:Product").unwrap();
        assert_eq!(product.kind, NodeKind::Class);
        assert_eq!(product.label, "Product");
        assert_eq!(product.description, "Any offered product or service.");

        let email = nodes.iter().find(|n| n.id == "schema:email").unwrap();
        assert_eq!(email.kind, NodeKind::Property);
        assert_eq!(email.domain_includes, vec!["schema:Person", "schema:Organization"]);

        let sku = nodes.iter().find(|n| n.id == "schema:sku").unwrap();
        assert_eq!(sku.domain_includes, vec!["schema:Product"]);
        assert_eq!(sku.description, "");

        let unlabeled = nodes.iter().find(|n| n.id == "schema:NoLabel").unwrap();
        assert_eq!(unlabeled.label, "NoLabel");
    }

    #[test]
    fn test_parse_bare_array() {
        let nodes = parse_vocabulary(
            r#"[{"@id": "https://schema.org/Event", "@type": "Class", "label": "Event"}]"#,
        )
        .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind, NodeKind::Class);
    }

    #[test]
    fn test_parse_rejects_bad_documents() {
        assert!(parse_vocabulary("not json").is_err());
        assert!(parse_vocabulary(r#"{"nodes": []}"#).is_err());
        assert!(parse_vocabulary("42").is_err());
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("schema:Person"), "Person");
        assert_eq!(local_name("https://schema.org/Person"), "Person");
        assert_eq!(local_name("Person"), "Person");
    }

    #[test]
    fn test_cached_file_is_used_and_loaded_once() {
        let file = scratch_file("cached");
        std::fs::write(&file, SAMPLE).unwrap();

        // Unreachable URL: the cached file must make the network unnecessary.
        let mut cache = VocabularyCache::new(&file, "http://127.0.0.1:9/unused.jsonld");
        assert!(!cache.is_loaded());
        assert_eq!(cache.classes().unwrap().len(), 3);
        assert!(cache.is_loaded());

        // Later file changes are not seen by an already-loaded cache.
        std::fs::write(&file, "[]").unwrap();
        cache.ensure_loaded().unwrap();
        assert_eq!(cache.classes().unwrap().len(), 3);
        assert_eq!(cache.properties().unwrap().len(), 2);

        let _ = std::fs::remove_dir_all(file.parent().unwrap());
    }

    #[test]
    fn test_properties_for_class() {
        let file = scratch_file("domain");
        std::fs::write(&file, SAMPLE).unwrap();
        let mut cache = VocabularyCache::new(&file, "http://127.0.0.1:9/unused.jsonld");

        let props: Vec<String> = cache
            .properties_for("schema:Person")
            .unwrap()
            .into_iter()
            .map(|p| p.label)
            .collect();
        assert_eq!(props, vec!["email"]);
        assert!(cache.properties_for("schema:Event").unwrap().is_empty());

        let _ = std::fs::remove_dir_all(file.parent().unwrap());
    }

    #[test]
    fn test_download_failure_is_fatal() {
        let file = scratch_file("offline");
        let mut cache = VocabularyCache::new(&file, "http://127.0.0.1:9/schema.jsonld");
        assert!(cache.ensure_loaded().is_err());
        assert!(!cache.is_loaded());
        assert!(!file.exists());

        let _ = std::fs::remove_dir_all(file.parent().unwrap());
    }

    #[test]
    fn test_file_source_is_copied_into_cache() {
        let source = scratch_file("source");
        std::fs::write(&source, SAMPLE).unwrap();
        let target = scratch_file("target").parent().unwrap().join("kb/schema.jsonld");

        let mut cache = VocabularyCache::new(&target, format!("file://{}", source.display()));
        assert_eq!(cache.classes().unwrap().len(), 3);
        assert!(target.exists());
        assert_eq!(cache.content_hash().unwrap().len(), 64);

        let _ = std::fs::remove_dir_all(source.parent().unwrap());
        let _ = std::fs::remove_dir_all(target.parent().unwrap().parent().unwrap());
    }
}
