use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ontomirror")]
#[command(about = "Map legacy SQL schemas onto Schema.org. Retrieve candidates, let the model decide.")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the tables found in CREATE TABLE statements
    Extract {
        /// Directory (or single .sql file) to scan
        #[arg(default_value = ".")]
        path: String,

        /// SQL dialect used for tokenizing (generic, mysql, postgresql, sqlite, mssql, ...)
        #[arg(long, default_value = "generic")]
        dialect: String,
    },

    /// Build the vocabulary index (downloads the vocabulary on first run)
    Index {
        /// Rebuild even if the index already holds documents
        #[arg(long)]
        force: bool,
    },

    /// Query the vocabulary index for classes matching a description
    Search {
        /// Free-text description, e.g. "Table orders with columns: id, total"
        query: String,

        /// Maximum results to return
        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Map every extracted table onto a Schema.org class
    Map {
        /// Directory (or single .sql file) to scan
        #[arg(default_value = ".")]
        path: String,

        /// Only map the table with this name
        #[arg(long)]
        table: Option<String>,

        /// SQL dialect used for tokenizing
        #[arg(long, default_value = "generic")]
        dialect: String,
    },

    /// Download the embedding model
    Setup,
}
