//! inferstat — drive the metrics pipeline from the command line.
//!
//! Loads a metrics config, builds a `MetricsManager`, and replays a log of
//! completed inference requests through the same notifier path a serving
//! front end uses.
//!
//! # Usage
//!
//! ```text
//! inferstat replay --config metrics.toml --events completed.jsonl
//! inferstat config --config metrics.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use inferstat_core::MetricsConfig;
use inferstat_metrics::MetricsManager;

mod replay;

#[derive(Parser)]
#[command(
    name = "inferstat",
    about = "inferstat — inference request metrics and windowed summaries",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON-lines log of completed requests through the pipeline.
    Replay {
        /// Metrics config (TOML). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// One JSON object per line:
        /// {"model_name": "...", "model_version": 1, "elapsed_ms": 12, "succeeded": true}
        #[arg(short, long)]
        events: PathBuf,

        /// Override the configured sink (logger, syslog).
        #[arg(long)]
        sink: Option<String>,

        /// Force summarization on.
        #[arg(long)]
        summary: bool,

        /// Override the summary window in seconds.
        #[arg(long)]
        window: Option<u32>,
    },
    /// Print the effective config as TOML.
    Config {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    match cli.command {
        Command::Replay {
            config,
            events,
            sink,
            summary,
            window,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(sink) = sink {
                config.sink = sink.parse()?;
            }
            if summary {
                config.enable_summary = true;
            }
            if let Some(window) = window {
                config.window_seconds = window;
            }

            let requests = replay::read_events(&events)?;
            let manager = MetricsManager::from_config(config)?;
            let replayed = replay::replay(manager, &requests).await;
            info!(replayed, path = ?events, "replay finished");
            Ok(())
        }
        Command::Config { config } => {
            let config = load_config(config.as_ref())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| "info,inferstat=debug".parse())?;
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<MetricsConfig> {
    let config = match path {
        Some(path) => MetricsConfig::from_file(path)?,
        None => MetricsConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
