use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use ontomirror::config::Settings;
use ontomirror::extract::{extract_with, SqlExtractor};
use ontomirror::llm::{GenerationClient, TextGenerator};
use ontomirror::mapper::SemanticMapper;
use ontomirror::rag::{setup, SemanticIndex};
use ontomirror::types::{RawTable, NO_EQUIVALENT_PROPERTY};

fn load_settings() -> Result<Settings> {
    Settings::from_env().context("Invalid configuration")
}

fn open_index(settings: &Settings) -> Result<SemanticIndex> {
    SemanticIndex::from_settings(settings).context("Failed to open semantic index")
}

/// Print `data` as pretty JSON if `json` is true, otherwise call `human_fmt`.
fn output<T: Serialize>(data: &T, json: bool, human_fmt: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        human_fmt(data);
    }
    Ok(())
}

fn extract_tables(path: &str, dialect: &str) -> Result<Vec<RawTable>> {
    let mut extractor = SqlExtractor::new(dialect)?;
    Ok(extract_with(&mut extractor, Path::new(path))?.tables)
}

/// List the tables found under a path.
pub fn cmd_extract(path: &str, dialect: &str, json: bool) -> Result<()> {
    let mut extractor = SqlExtractor::new(dialect)?;
    let report = extract_with(&mut extractor, Path::new(path))?;

    output(&report, json, |r| {
        println!(
            "Found {} tables in {} files ({} failed)",
            r.tables.len(),
            r.files_scanned,
            r.files_failed
        );
        for table in &r.tables {
            println!("{}  ({})", table.name, table.source_file);
            for col in &table.columns {
                let pk = if col.is_primary_key { "  [pk]" } else { "" };
                let null = if col.is_nullable { "" } else { "  not null" };
                println!("  {} {}{pk}{null}", col.name, col.original_type);
            }
        }
    })
}

/// Build the vocabulary index.
pub fn cmd_index(force: bool, json: bool) -> Result<()> {
    let settings = load_settings()?;
    let mut index = open_index(&settings)?;
    let report = index.build_index(force)?;

    output(&report, json, |r| {
        if r.skipped {
            println!(
                "Index already holds {} classes (use --force to rebuild)",
                r.total_documents
            );
            if r.stale {
                println!("  warning: the vocabulary changed since the last build");
            }
            if r.embedder_changed {
                println!("  warning: built by a different embedder; searches will fail until rebuilt");
            }
        } else {
            println!(
                "Indexed {} classes ({} failed)",
                r.documents_indexed, r.documents_failed
            );
        }
    })
}

/// Query the index for matching classes.
pub fn cmd_search(query: &str, limit: usize, json: bool) -> Result<()> {
    anyhow::ensure!(limit >= 1, "--limit must be at least 1");

    let settings = load_settings()?;
    let mut index = open_index(&settings)?;
    if index.document_count()? == 0 {
        anyhow::bail!("Index is empty. Run 'ontomirror index' first.");
    }
    let results = index.search(query, limit)?;

    output(&results, json, |results| {
        if results.is_empty() {
            println!("No classes found for '{query}'");
            return;
        }
        for hit in results {
            println!("{:.4}  {}  ({})", hit.distance, hit.label, hit.id);
        }
    })
}

/// Extract tables and map each onto a vocabulary class.
pub fn cmd_map(path: &str, table: Option<&str>, dialect: &str, json: bool) -> Result<()> {
    let settings = load_settings()?;

    let mut tables = extract_tables(path, dialect)?;
    if let Some(name) = table {
        tables.retain(|t| t.name == name);
        anyhow::ensure!(!tables.is_empty(), "No table named '{name}' under {path}");
    }

    let generator = GenerationClient::from_config(&settings.llm)?;
    tracing::info!(model = generator.model_name(), "Using generation backend");
    let mut mapper = SemanticMapper::new(open_index(&settings)?, generator)?;
    let mapped = mapper.map_tables(&tables);

    output(&mapped, json, |mapped| {
        if mapped.is_empty() {
            println!("No tables found under {path}");
            return;
        }
        for m in mapped {
            println!("{} -> {}", m.original_table, m.schema_class);
            if !m.rationale.is_empty() {
                println!("  {}", m.rationale);
            }
            for col in &m.columns {
                if col.schema_property == NO_EQUIVALENT_PROPERTY {
                    println!("  {}  (no equivalent)", col.original_name);
                } else {
                    println!("  {} -> {}", col.original_name, col.schema_property);
                }
            }
        }
    })
}

/// Download the embedding model.
pub fn cmd_setup(json: bool) -> Result<()> {
    let result = setup::download_model()?;

    output(&result, json, |r| {
        println!("Embedding model {} ({} dims) ready in {}", r.model, r.dimension, r.model_dir);
    })
}
