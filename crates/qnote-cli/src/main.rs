//! qnote CLI
//!
//! Command-line interface for qnote - notes, books, tags and archives.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use qnote_core::{Config, Store};

mod commands;
mod editor;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "qnote")]
#[command(about = "qnote - Notes organised in books, with portable archives")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the whole collection to an archive (.zst compresses)
    Export {
        /// Archive file to create
        path: PathBuf,
    },
    /// Read an archive into the collection
    Import {
        /// Archive file to read
        path: PathBuf,
        /// Keep notes read before any damage in the archive
        #[arg(long)]
        keep_partial: bool,
    },
    /// Check an archive without importing it
    Inspect {
        /// Archive file to read
        path: PathBuf,
    },
    /// Manage notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// List all books
    Books,
    /// List all tags
    Tags,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Create a new note
    #[command(alias = "create")]
    Add {
        /// Note title
        title: String,
        /// Book to file the note in (defaults to default_book)
        #[arg(short, long)]
        book: Option<String>,
        /// Note type
        #[arg(long = "type", default_value = "basic")]
        note_type: String,
        /// Note body (opens editor if not provided)
        #[arg(short = 'm', long)]
        body: Option<String>,
        /// Tags to add
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// List notes
    #[command(alias = "ls")]
    List {
        /// Filter by book
        #[arg(short, long)]
        book: Option<String>,
        /// Filter by tag
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Show a note
    Show {
        /// Note ID
        id: i64,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, default_book, compression_level, log_level)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let config = Config::load().context("Failed to load configuration")?;
    init_logging(cli.verbose, config.log_level.as_deref());
    debug!(data_dir = ?config.data_dir, "Configuration loaded");

    // Commands that don't need the store
    match cli.command {
        Commands::Config { command } => return handle_config_command(command, config, &output),
        Commands::Inspect { path } => return commands::archive::inspect(&path, &output),
        _ => {}
    }

    let mut store = Store::open_with_config(config)?;

    match cli.command {
        Commands::Export { path } => commands::archive::export(&store, &path, &output),
        Commands::Import { path, keep_partial } => {
            commands::archive::import(&mut store, &path, keep_partial, &output)
        }
        Commands::Note { command } => handle_note_command(command, &mut store, &output),
        Commands::Books => commands::book::list(&store, &output),
        Commands::Tags => commands::tag::list(&store, &output),
        Commands::Config { .. } | Commands::Inspect { .. } => Ok(()), // Handled above
    }
}

fn handle_note_command(command: NoteCommands, store: &mut Store, output: &Output) -> Result<()> {
    match command {
        NoteCommands::Add {
            title,
            book,
            note_type,
            body,
            tag,
        } => commands::note::create(store, title, book, note_type, body, tag, output),
        NoteCommands::List { book, tag } => commands::note::list(store, book, tag, output),
        NoteCommands::Show { id } => commands::note::show(store, id, output),
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config: Config,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(&config, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(config, key, value, output)
        }
    }
}

/// Initialize stderr logging
///
/// `-v` flags win over RUST_LOG, which wins over the configured level.
fn init_logging(verbose: u8, configured: Option<&str>) {
    let env_filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| level_filter(configured.unwrap_or("warn"))),
        1 => level_filter("info"),
        _ => level_filter("debug"),
    };

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("qnote_core={},qnote_cli={}", level, level))
}
