pub mod sql;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::types::RawTable;

pub use sql::SqlExtractor;

/// Trait implemented by schema extractors.
///
/// `extract` takes `&mut self` so implementations may keep parser state
/// between files.
pub trait Extractor: Send {
    fn extract(&mut self, source: &str, file_path: &str) -> Result<Vec<RawTable>>;
}

/// Summary of a directory extraction.
#[derive(Debug, Default, serde::Serialize)]
pub struct ExtractionReport {
    pub tables: Vec<RawTable>,
    pub files_scanned: u32,
    pub files_failed: u32,
}

/// Whether a path looks like a SQL source file.
pub fn is_sql_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("sql"))
}

/// Extract every `CREATE TABLE` found under `root` with the generic SQL dialect.
pub fn extract_directory(root: &Path) -> Result<Vec<RawTable>> {
    let mut extractor = SqlExtractor::default();
    Ok(extract_with(&mut extractor, root)?.tables)
}

/// Walk `root` (a directory or a single file) and run `extractor` on each SQL file.
///
/// Unreadable or unparseable files are logged and skipped; the rest of the
/// tree is still processed. Files are visited in name order.
pub fn extract_with(extractor: &mut dyn Extractor, root: &Path) -> Result<ExtractionReport> {
    let mut report = ExtractionReport::default();

    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to resolve source path {}", root.display()))?;

    for entry in WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "directory walk error");
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_sql_file(entry.path()) {
            continue;
        }

        let path = entry.path();
        let rel_path = source_label(&root, path);
        report.files_scanned += 1;

        // Legacy dumps are often Latin-1; decode lossily.
        let source = match std::fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(file = %rel_path, error = %e, "cannot read file");
                report.files_failed += 1;
                continue;
            }
        };

        match extractor.extract(&source, &rel_path) {
            Ok(tables) => report.tables.extend(tables),
            Err(err) => {
                warn!(file = %rel_path, error = %err, "extraction failed");
                report.files_failed += 1;
            }
        }
    }

    info!(
        files = report.files_scanned,
        failed = report.files_failed,
        tables = report.tables.len(),
        "extraction finished"
    );

    Ok(report)
}

/// Path of `path` relative to `root`, or its file name when `root` is the file itself.
fn source_label(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().to_string(),
        _ => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string()),
    }
}

fn is_ignored(entry: &walkdir::DirEntry) -> bool {
    // depth 0 is the root the caller asked for, even if it is hidden
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    matches!(
        name.as_ref(),
        "node_modules" | "__pycache__" | "target" | "venv" | "dist"
    ) || name.starts_with('.')
}
