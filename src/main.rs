//! # Comment Harvester CLI (`chv`)
//!
//! ## Usage
//!
//! ```bash
//! chv --config ./config/chv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chv init` | Create the SQLite store and run schema migrations |
//! | `chv harvest <id> --scope video\|channel` | Harvest threads and replies into the store |
//! | `chv query [--text ...] [--user-name ...] ...` | Search the store, one page at a time |
//! | `chv get <commentId>` | Print one stored comment |
//! | `chv stats` | Document counts and recent harvest runs |
//!
//! ## Examples
//!
//! ```bash
//! # Harvest every comment under a video
//! chv harvest dQw4w9WgXcQ --scope video --api-key $YOUTUBE_API_KEY
//!
//! # Resume a channel harvest that stopped early
//! chv harvest UCuAXFkgsw1L7xaCfnd5JJOw --scope channel --resume
//!
//! # Second page of comments by one author mentioning a phrase
//! chv query --text '"never gonna"' --user-id UCabc --page 2
//!
//! # HTML fragment with pager links
//! chv query --text rick --format html --webpage-url /search
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use comment_harvester::config::{self, Config};
use comment_harvester::harvest::{self, HarvestArgs};
use comment_harvester::models::{Scope, ScopeKind};
use comment_harvester::progress::ProgressMode;
use comment_harvester::query::Query;
use comment_harvester::render::OutputFormat;
use comment_harvester::search::{self, QueryArgs};
use comment_harvester::{get, stats, store};

const DEFAULT_CONFIG: &str = "./config/chv.toml";

/// Comment Harvester CLI: harvest discussion threads into a local store and
/// search them.
#[derive(Parser)]
#[command(
    name = "chv",
    about = "Comment Harvester — harvest comment threads into a searchable local store",
    version,
    long_about = "Comment Harvester pages through the threads and replies of a video or \
    channel, enriches each comment with its video's metadata, and upserts it into a local \
    SQLite store. The query command searches that store field by field and renders one page \
    of results as text, HTML, or JSON."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/chv.toml` when it exists; otherwise built-in
    /// defaults apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store schema.
    ///
    /// Creates the SQLite file and all tables. Running it again is safe.
    Init {
        /// Store location (overrides `[store].path`).
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Harvest all threads and replies under a video or channel.
    ///
    /// Re-harvesting the same scope updates documents in place; it never
    /// duplicates them.
    Harvest {
        /// Video id or channel id.
        id: String,

        /// What `id` names.
        #[arg(long, value_enum, default_value = "video")]
        scope: ScopeKind,

        /// Store location (overrides `[store].path`).
        #[arg(long)]
        store: Option<PathBuf>,

        /// API key (overrides `[api].key` and `YOUTUBE_API_KEY`).
        #[arg(long)]
        api_key: Option<String>,

        /// Maximum pages per pagination loop.
        #[arg(long, value_parser = parse_positive)]
        max_pages: Option<usize>,

        /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Continue from where the last aborted or capped run of this scope stopped.
        #[arg(long, conflicts_with = "from_cursor")]
        resume: bool,

        /// Start the thread loop at this page cursor.
        #[arg(long)]
        from_cursor: Option<String>,
    },

    /// Search the store.
    ///
    /// Every given field is a mandatory clause; with no fields every
    /// comment matches.
    Query {
        /// Store location (overrides `[store].path`).
        #[arg(long)]
        store: Option<PathBuf>,

        /// Comment text expression.
        #[arg(long)]
        text: Option<String>,

        /// Author display name expression.
        #[arg(long)]
        user_name: Option<String>,

        /// Author channel ids, space separated.
        #[arg(long)]
        user_id: Option<String>,

        /// Video title expression.
        #[arg(long)]
        video_title: Option<String>,

        /// Video ids, space separated.
        #[arg(long)]
        video_id: Option<String>,

        /// Channel title expression.
        #[arg(long)]
        channel_title: Option<String>,

        /// Channel ids, space separated.
        #[arg(long)]
        channel_id: Option<String>,

        /// 1-based page number.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        /// Hits per page (overrides `[search].page_size`).
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        page_size: Option<u32>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Base URL for HTML pager links (overrides `[search].webpage_url`).
        #[arg(long)]
        webpage_url: Option<String>,

        /// API key for looking up missing video titles at render time.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Print one stored comment by id.
    Get {
        comment_id: String,

        /// Store location (overrides `[store].path`).
        #[arg(long)]
        store: Option<PathBuf>,

        /// Print the document as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show store statistics and recent harvest runs.
    Stats {
        /// Store location (overrides `[store].path`).
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

/// Parse a strictly positive count for `--max-pages`.
fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid number '{}': {}", s, e)),
    }
}

fn store_path(cfg: &Config, store: Option<PathBuf>) -> PathBuf {
    store.unwrap_or_else(|| cfg.store.path.clone())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("comment_harvester=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_or_default(cli.config.as_deref(), Path::new(DEFAULT_CONFIG))?;

    match cli.command {
        Commands::Init { store } => {
            let path = store_path(&cfg, store);
            store::init_store(&path).await?;
            println!("Initialized store at {}", path.display());
        }
        Commands::Harvest {
            id,
            scope,
            store,
            api_key,
            max_pages,
            progress,
            resume,
            from_cursor,
        } => {
            let scope = match scope {
                ScopeKind::Video => Scope::video(id),
                ScopeKind::Channel => Scope::channel(id),
            };
            harvest::run_harvest(
                &cfg,
                HarvestArgs {
                    scope,
                    store,
                    api_key,
                    max_pages,
                    progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
                    resume,
                    from_cursor,
                },
            )
            .await?;
        }
        Commands::Query {
            store,
            text,
            user_name,
            user_id,
            video_title,
            video_id,
            channel_title,
            channel_id,
            page,
            page_size,
            format,
            webpage_url,
            api_key,
        } => {
            let query = Query {
                comment_text: text,
                user_name,
                user_id,
                video_title,
                video_id,
                channel_title,
                channel_id,
            };
            search::run_query(
                &cfg,
                QueryArgs {
                    store,
                    query,
                    page,
                    page_size,
                    format,
                    webpage_url,
                    api_key,
                },
            )
            .await?;
        }
        Commands::Get {
            comment_id,
            store,
            json,
        } => {
            get::run_get(&store_path(&cfg, store), &comment_id, json).await?;
        }
        Commands::Stats { store } => {
            stats::run_stats(&store_path(&cfg, store)).await?;
        }
    }

    Ok(())
}
