//! End-to-end pipeline over the fixture schema and vocabulary.
//!
//! Uses the hashing embedder and the offline generator, so it needs neither
//! the embedding model nor network access.
//!
//! Run with: `cargo test --test pipeline`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ontomirror::config::Settings;
use ontomirror::extract::{extract_directory, extract_with, SqlExtractor};
use ontomirror::llm::GenerationClient;
use ontomirror::mapper::{SemanticMapper, PLACEHOLDER_CONFIDENCE};
use ontomirror::rag::SemanticIndex;
use ontomirror::types::RawTable;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// Settings pointing at a fresh data dir, with the fixture vocabulary as source.
fn settings(name: &str) -> (Settings, PathBuf) {
    let data_dir = std::env::temp_dir().join(format!("ontomirror_pipeline_{name}"));
    let _ = std::fs::remove_dir_all(&data_dir);

    let vars: HashMap<&str, String> = HashMap::from([
        ("ONTOMIRROR_DATA_DIR", data_dir.display().to_string()),
        ("ONTOMIRROR_EMBEDDER", "hash".to_string()),
        (
            "ONTOMIRROR_VOCABULARY_URL",
            format!("file://{}", fixtures().join("vocabulary.jsonld").display()),
        ),
        ("LLM_PROVIDER", "offline".to_string()),
    ]);
    let settings = Settings::from_lookup(|key| vars.get(key).cloned()).unwrap();
    (settings, data_dir)
}

fn table<'a>(tables: &'a [RawTable], name: &str) -> &'a RawTable {
    tables
        .iter()
        .find(|t| t.name == name)
        .unwrap_or_else(|| panic!("table {name} not extracted"))
}

#[test]
fn test_extract_fixture_schema() {
    let tables = extract_directory(&fixtures().join("schema")).unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["auth_user", "auth_group", "blog_post", "inventory_item"]
    );

    let user = table(&tables, "auth_user");
    assert_eq!(user.column_names(), vec!["id", "username", "email", "is_active"]);
    assert!(user.columns[0].is_primary_key);
    assert!(!user.columns[1].is_primary_key);
    assert_eq!(user.columns[1].original_type, "VARCHAR(150)");
    assert_eq!(user.source_file, "accounts.sql");

    let group = table(&tables, "auth_group");
    assert_eq!(group.column_names(), vec!["id", "name"]);
    assert!(group.columns[0].is_primary_key);

    let post = table(&tables, "blog_post");
    assert_eq!(
        post.column_names(),
        vec!["id", "title", "content", "author_id", "published_at"]
    );
    assert!(!post.columns[1].is_nullable);

    let item = table(&tables, "inventory_item");
    assert_eq!(item.column_names(), vec!["sku", "price", "quantity", "status"]);
    assert!(item.columns[0].is_primary_key);
    assert_eq!(item.columns[0].description.as_deref(), Some("stock keeping unit"));
    assert!(item.columns[1].original_type.starts_with("DECIMAL(10,2)"));
    assert!(Path::new(&item.source_file).ends_with("legacy/inventory.sql"));
}

#[test]
fn test_extract_with_dialect_reports_counts() {
    let mut extractor = SqlExtractor::new("mysql").unwrap();
    let report = extract_with(&mut extractor, &fixtures().join("schema")).unwrap();
    assert_eq!(report.files_scanned, 3);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.tables.len(), 4);
}

#[test]
fn test_index_build_is_idempotent_and_persistent() {
    let (settings, data_dir) = settings("index");

    {
        let mut index = SemanticIndex::from_settings(&settings).unwrap();
        let first = index.build_index(false).unwrap();
        assert_eq!(first.documents_indexed, 8);
        assert!(settings.vocabulary_file().exists());

        let second = index.build_index(false).unwrap();
        assert!(second.skipped);
        assert_eq!(index.document_count().unwrap(), 8);
    }

    // A fresh process sees the persisted index.
    let mut index = SemanticIndex::from_settings(&settings).unwrap();
    assert_eq!(index.document_count().unwrap(), 8);

    let hits = index
        .search("Table inventory_item with columns: sku, price", 3)
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(hits.iter().all(|h| h.source == "schema.org"));

    let _ = std::fs::remove_dir_all(&data_dir);
}

#[test]
fn test_map_fixture_schema_offline() {
    let (settings, data_dir) = settings("map");
    let tables = extract_directory(&fixtures().join("schema")).unwrap();

    let index = SemanticIndex::from_settings(&settings).unwrap();
    let generator = GenerationClient::from_config(&settings.llm).unwrap();
    let mut mapper = SemanticMapper::new(index, generator).unwrap();
    let mapped = mapper.map_tables(&tables);
    assert_eq!(mapped.len(), tables.len());

    // No mapping ever names a column the table does not declare.
    for (raw, m) in tables.iter().zip(&mapped) {
        assert_eq!(m.original_table, raw.name);
        for col in &m.columns {
            assert!(raw.has_column(&col.original_name), "{} in {}", col.original_name, raw.name);
            assert_eq!(col.confidence, PLACEHOLDER_CONFIDENCE);
        }
    }

    let by_name: HashMap<&str, _> = mapped.iter().map(|m| (m.original_table.as_str(), m)).collect();

    let user = by_name["auth_user"];
    assert_eq!(user.schema_class, "Person");
    let props: Vec<(&str, &str)> = user
        .columns
        .iter()
        .map(|c| (c.original_name.as_str(), c.schema_property.as_str()))
        .collect();
    assert_eq!(props, vec![("username", "alternateName"), ("email", "email")]);

    // Same rule, but none of its columns exist on this table.
    let group = by_name["auth_group"];
    assert_eq!(group.schema_class, "Person");
    assert!(group.columns.is_empty());

    let post = by_name["blog_post"];
    assert_eq!(post.schema_class, "BlogPosting");
    assert_eq!(post.columns[0].schema_property, "headline");
    assert_eq!(post.columns[1].schema_property, "articleBody");

    let item = by_name["inventory_item"];
    assert_eq!(item.schema_class, "Thing");
    assert!(item.columns.is_empty());

    let json = serde_json::to_value(&mapped).unwrap();
    assert_eq!(json[2]["columns"][0]["original_name"], "title");

    let _ = std::fs::remove_dir_all(&data_dir);
}

#[test]
fn test_missing_vocabulary_source_is_fatal() {
    let (mut settings, data_dir) = settings("no_vocab");
    settings.vocabulary_url = "http://127.0.0.1:9/schemaorg.jsonld".to_string();

    let mut index = SemanticIndex::from_settings(&settings).unwrap();
    assert!(index.build_index(false).is_err());
    assert_eq!(index.document_count().unwrap(), 0);

    let _ = std::fs::remove_dir_all(&data_dir);
}
