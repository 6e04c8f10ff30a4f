//! # Search Signals CLI (`signals`)
//!
//! The `signals` binary builds the ranking-signal dataset, manages the
//! hosted index, and runs search recipes against it.
//!
//! ## Usage
//!
//! ```bash
//! signals --config ./config/signals.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `signals historical` | Aggregate the search log into per-(query, item) stats |
//! | `signals merge` | Left-join stats onto the product catalog |
//! | `signals modifiers` | Build per-product score-modifier documents |
//! | `signals pipeline` | Run all three stages in order |
//! | `signals stats` | Summarize the derived dataset |
//! | `signals index <action>` | Create, delete, upload to, or inspect the hosted index |
//! | `signals search "<query>"` | Query the index with a ranking recipe |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use search_signals::progress::ProgressMode;
use search_signals::recipes::SearchRecipe;
use search_signals::{config, index_cmd, pipeline, recipes, stats};

/// Search Signals: ranking-signal pipeline and query recipes for a hosted
/// multimodal product search index.
#[derive(Parser)]
#[command(
    name = "signals",
    about = "Search Signals — ranking-signal pipeline and query recipes for a hosted multimodal product index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Relative data paths inside it resolve against the file's directory.
    #[arg(long, global = true, default_value = "./config/signals.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate the search log into the historical stats table.
    ///
    /// Groups events by (query, item), counts clicks, cart adds, and
    /// purchases, and computes 1/3/5-day revenue from product cost.
    Historical,

    /// Left-join the historical stats onto the product catalog.
    Merge,

    /// Build per-product score-modifier documents.
    ///
    /// Writes the complete product JSON with exact-match boosters and
    /// 1/3/5-day revenue modifiers keyed by normalized query.
    Modifiers,

    /// Run historical, merge, and modifiers in order.
    Pipeline,

    /// Summarize the derived dataset.
    Stats {
        /// Also fetch document counts from the hosted index.
        #[arg(long)]
        remote: bool,
    },

    /// Manage the hosted index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Search the hosted index with a ranking recipe.
    Search {
        /// The search query string.
        query: String,

        /// Ranking recipe: `basic`, `hybrid`, `exact-boost`, or `revenue-boost`.
        #[arg(long, default_value = "revenue-boost")]
        recipe: SearchRecipe,

        /// Maximum number of unique items to show.
        #[arg(long)]
        limit: Option<usize>,

        /// Print hits as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create the index with the configured model and settings.
    Create,

    /// Delete the index and everything in it.
    Delete {
        /// Confirm deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Print index statistics.
    Stats,

    /// Upload the complete documents file in batches.
    Upload {
        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Upload only the first N documents.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Fetch one document by id.
    Get {
        /// Document id.
        id: String,
    },

    /// Delete documents by id.
    DeleteDocs {
        /// Document ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete every document, keeping the index.
    Empty {
        /// Confirm deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Historical => pipeline::run_historical(&cfg)?,
        Commands::Merge => pipeline::run_merge(&cfg)?,
        Commands::Modifiers => pipeline::run_modifiers(&cfg)?,
        Commands::Pipeline => pipeline::run_all(&cfg)?,
        Commands::Stats { remote } => stats::run_stats(&cfg, remote).await?,
        Commands::Index { action } => match action {
            IndexAction::Create => index_cmd::run_create(&cfg).await?,
            IndexAction::Delete { yes } => index_cmd::run_delete(&cfg, yes).await?,
            IndexAction::Stats => index_cmd::run_stats(&cfg).await?,
            IndexAction::Upload {
                batch_size,
                limit,
                progress,
            } => {
                let mode = ProgressMode::resolve(progress);
                index_cmd::run_upload(&cfg, batch_size, limit, mode).await?;
            }
            IndexAction::Get { id } => index_cmd::run_get(&cfg, &id).await?,
            IndexAction::DeleteDocs { ids } => index_cmd::run_delete_documents(&cfg, &ids).await?,
            IndexAction::Empty { yes } => index_cmd::run_empty(&cfg, yes).await?,
        },
        Commands::Search {
            query,
            recipe,
            limit,
            json,
        } => {
            recipes::run_search(&cfg, &query, recipe, limit, json).await?;
        }
    }

    Ok(())
}
