//! # elktail CLI
//!
//! Tail documents from an Elasticsearch index as JSON lines.
//!
//! ## Usage
//!
//! ```bash
//! elktail [OPTIONS] [QUERY]
//! ```
//!
//! ## Examples
//!
//! ```bash
//! # Follow everything in the default logstash indices
//! elktail
//!
//! # Follow errors from one service on a remote cluster
//! elktail 'level:error AND service:api' -u https://elastic:pw@es.internal:9200
//!
//! # Print everything since midnight once and exit
//! elktail --after 2024-05-01 --list
//!
//! # Survive restarts without re-printing
//! elktail --checkpoint ~/.elktail.cursor.json
//! ```
//!
//! Flags marked (*) are remembered in the config file once given.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use elktail::config::{self, FileConfig, Overrides};
use elktail::elasticsearch::ElasticsearchBackend;
use elktail::emit::Emitter;
use elktail::error::TailError;
use elktail::logging;
use elktail::tail::Tail;

/// elktail: follow an Elasticsearch index like a growing log file.
///
/// Flags marked with (*) are persisted between runs in the config file.
#[derive(Parser)]
#[command(
    name = "elktail",
    about = "Tail Logstash-style logs from an Elasticsearch cluster",
    version,
    long_about = "Polls an Elasticsearch index pattern for documents matching a query and prints \
    each new document once, in timestamp order, as a JSON line on stdout. \
    Flags marked with (*) are persisted between runs in the config file."
)]
struct Cli {
    /// Query in Elasticsearch query string syntax. Omit to match everything.
    query: Option<String>,

    /// (*) Index pattern to search [default: logstash-[0-9].*]
    #[arg(short, long, env = "ELKTAIL_INDEX")]
    index: Option<String>,

    /// (*) Elasticsearch URL; credentials in the URL are sent as basic auth
    /// [default: http://127.0.0.1:9200]
    #[arg(short, long, env = "ELKTAIL_URL")]
    url: Option<String>,

    /// Config file [default: $HOME/.elktail.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from this time (RFC 3339 or YYYY-MM-DD) instead of now.
    #[arg(long, value_parser = parse_after, conflicts_with = "from_start")]
    after: Option<DateTime<Utc>>,

    /// Start from the oldest matching document instead of now.
    #[arg(long)]
    from_start: bool,

    /// Print the matching documents once and exit.
    #[arg(short, long)]
    list: bool,

    /// Documents per search request.
    #[arg(long)]
    page_size: Option<usize>,

    /// Milliseconds between polls.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Field documents are ordered by.
    #[arg(long)]
    timestamp_field: Option<String>,

    /// Secondary sort field used to break timestamp ties [default: _id].
    ///
    /// Must be sortable. Elasticsearch 8 refuses `_id` unless
    /// `indices.id_field_data.enabled` is set; use a unique keyword field there.
    #[arg(long)]
    tiebreaker: Option<String>,

    /// Retries per page on transient errors.
    #[arg(long)]
    retries: Option<u32>,

    /// Load the cursor from, and save it to, this file.
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_after(s: &str) -> Result<DateTime<Utc>, String> {
    config::parse_timestamp(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    logging::init_logging(cli.verbose)?;

    let config_path = cli.config.clone().or_else(config::default_config_path);
    let file = match &config_path {
        Some(path) => config::load_file_config(path)?,
        None => FileConfig::default(),
    };

    // Only values typed on the command line are persisted, not env values.
    let from_command_line = |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);
    let persist_index = cli.index.clone().filter(|_| from_command_line("index"));
    let persist_url = cli.url.clone().filter(|_| from_command_line("url"));

    let tail_config = config::resolve(
        &file,
        Overrides {
            index: cli.index,
            url: cli.url,
            query: cli.query,
            page_size: cli.page_size,
            interval_ms: cli.interval_ms,
            timestamp_field: cli.timestamp_field,
            tiebreaker: cli.tiebreaker,
            max_retries: cli.retries,
            after: cli.after,
            from_start: cli.from_start,
            list_only: cli.list,
            checkpoint: cli.checkpoint,
        },
    )?;

    if let Some(path) = &config_path {
        if config::persist_flags(path, persist_index.as_deref(), persist_url.as_deref())? {
            debug!(path = %path.display(), "saved flags to config file");
        }
    }

    let backend = Arc::new(ElasticsearchBackend::new(
        &tail_config.url,
        tail_config.page_timeout,
    )?);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let mut tail = Tail::from_config(tail_config, backend).await?;
    let mut emitter = Emitter::new(tokio::io::stdout());

    match tail.run(&mut emitter, &cancel).await {
        Ok(summary) => {
            info!(
                outcome = ?summary.outcome,
                cycles = summary.cycles,
                emitted = summary.emitted,
                "stopped"
            );
            Ok(())
        }
        // The reader went away (e.g. `elktail | head`).
        Err(TailError::Sink(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Cancel `cancel` on Ctrl-C, or SIGTERM on unix.
async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutting down");
    cancel.cancel();
}
