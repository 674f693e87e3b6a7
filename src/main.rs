mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};

fn main() -> Result<()> {
    // A missing .env file is fine; the real environment still applies.
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Long-running commands report progress at info level; the rest only warn.
    // Stdout stays clean for command output.
    let is_long_running = matches!(cli.command, Command::Index { .. } | Command::Map { .. });
    let default_level = if is_long_running { "info" } else { "warn" };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Command::Extract { path, dialect } => commands::cmd_extract(&path, &dialect, cli.json),
        Command::Index { force } => commands::cmd_index(force, cli.json),
        Command::Search { query, limit } => commands::cmd_search(&query, limit, cli.json),
        Command::Map {
            path,
            table,
            dialect,
        } => commands::cmd_map(&path, table.as_deref(), &dialect, cli.json),
        Command::Setup => commands::cmd_setup(cli.json),
    }
}
