//! # Docket CLI (`dk`)
//!
//! The `dk` binary is the primary interface for Docket. It provides commands
//! for document intake, listing, detail views, keyword search, corpus
//! statistics, classifier training, and persistent highlighting.
//!
//! ## Usage
//!
//! ```bash
//! dk --config ./config/docket.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dk ingest <files>...` | Store, extract, classify, and journal documents |
//! | `dk list` | Show the journal-tracked corpus |
//! | `dk show <file>` | Full detail for one document |
//! | `dk search "<kw>"` | Keyword search with highlighted snippets |
//! | `dk stats` | Corpus summary statistics |
//! | `dk update <file>` | Re-extract, re-classify, refresh metadata |
//! | `dk delete <file>` | Remove from storage and journal |
//! | `dk train` | Reload training data and refit the classifier |
//! | `dk annotate <file> <kw>` | Embed persistent highlights in a PDF/DOCX |
//! | `dk fetch <file>` | Write the stored bytes to a local path |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docket::{annotate, classify, config, get, ingest, search, stats, storage};

/// Docket — document intake, classification, and retrieval for office files.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docket.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dk",
    about = "Docket — document intake, classification, and retrieval for office files",
    version,
    long_about = "Docket ingests PDF, DOCX, and plain-text documents, extracts their text, \
    assigns a hierarchical category label via a trained statistical classifier, tracks the \
    corpus in a JSON-lines journal, and offers keyword search with highlighted snippets and \
    corpus statistics."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docket.toml`. Storage, journal, and classifier
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/docket.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest local files into the corpus.
    ///
    /// Stores each file, extracts its text, classifies the snippet, and
    /// appends one journal entry per document. Per-file failures are logged
    /// and skipped; a batch never aborts part-way.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List the journal-tracked corpus.
    List,

    /// Show full detail for one document.
    ///
    /// Retrieves the stored bytes, re-extracts the text, and classifies the
    /// full content on demand.
    Show {
        /// Filename (the corpus primary key).
        filename: String,
    },

    /// Search documents for a keyword.
    ///
    /// Case-insensitive substring search; the first occurrence per document
    /// is reported with a highlighted, padded excerpt. A statistics block
    /// over the result set follows the matches.
    Search {
        /// The keyword to search for.
        keyword: String,

        /// Corpus source: `log` (the journal) or `storage` (live listing,
        /// extracted on the fly and timed).
        #[arg(long, default_value = "log")]
        source: String,

        /// Sort results: `name`, `size`, or `modified`.
        #[arg(long)]
        sort: Option<String>,
    },

    /// Corpus summary statistics from the journal.
    Stats,

    /// Re-extract, re-classify, and refresh metadata for one document.
    ///
    /// The document keeps its original created timestamp.
    Update {
        /// Filename (the corpus primary key).
        filename: String,
    },

    /// Remove a document from storage and journal.
    Delete {
        /// Filename (the corpus primary key).
        filename: String,
    },

    /// Reload training data and refit the classifier, reporting counts.
    Train,

    /// Embed persistent keyword highlights into a stored PDF or DOCX.
    ///
    /// Rewrites the stored file in place; every occurrence of the keyword is
    /// marked. Plain-text documents cannot be annotated.
    Annotate {
        /// Filename (the corpus primary key).
        filename: String,
        /// The keyword to highlight.
        keyword: String,
    },

    /// Write a stored document's raw bytes to a local path.
    Fetch {
        /// Filename (the corpus primary key).
        filename: String,
        /// Output path; defaults to the filename in the current directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let storage = storage::make_storage(&cfg)?;

    match cli.command {
        Commands::Ingest { files } => {
            ingest::run_ingest(&cfg, storage.as_ref(), &files).await?;
        }
        Commands::List => {
            ingest::run_list(&cfg)?;
        }
        Commands::Show { filename } => {
            get::run_show(&cfg, storage.as_ref(), &filename).await?;
        }
        Commands::Search {
            keyword,
            source,
            sort,
        } => {
            search::run_search(&cfg, storage.as_ref(), &keyword, &source, sort).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Update { filename } => {
            ingest::run_update(&cfg, storage.as_ref(), &filename).await?;
        }
        Commands::Delete { filename } => {
            ingest::run_delete(&cfg, storage.as_ref(), &filename).await?;
        }
        Commands::Train => {
            classify::run_train(&cfg)?;
        }
        Commands::Annotate { filename, keyword } => {
            annotate::run_annotate(storage.as_ref(), &filename, &keyword).await?;
        }
        Commands::Fetch { filename, output } => {
            get::run_fetch(storage.as_ref(), &filename, output).await?;
        }
    }

    Ok(())
}
