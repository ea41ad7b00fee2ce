mod config;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::mpsc;

use logscope_api::{ApiClient, select_protocol};
use logscope_logs::{
    Direction, EngineEvent, FilterId, FilterState, LogRecord, ModeController, Selector,
    SessionParams, TimeWindow, ViewMode,
};
use logscope_types::{CollectorStatus, min_structured_version};

use crate::config::Config;

/// Logscope - tail and query deployment logs from the terminal
#[derive(Parser, Debug)]
#[command(name = "logscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service to read logs from
    #[arg(value_name = "SERVICE")]
    service: String,

    /// Deployment target the service runs in (defaults to the config file)
    #[arg(long, value_name = "TARGET")]
    target: Option<String>,

    /// Server-side search term
    #[arg(long, default_value = "")]
    search: String,

    /// Restrict to records from one revision
    #[arg(long)]
    revision: Option<String>,

    /// Show only one output stream (stdout, stderr, predeploy)
    #[arg(long)]
    stream: Option<String>,

    /// View a historical window anchored at this RFC3339 timestamp
    #[arg(long)]
    anchor: Option<DateTime<Utc>>,

    /// Explicit window start (RFC3339)
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Explicit window end (RFC3339)
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    /// Extra pages of history to fetch before printing
    #[arg(long, default_value = "0")]
    pages: usize,

    /// Log service base URL (overrides the config file)
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debugging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load()?;

    let api_url = args
        .api_url
        .or(config.api_url)
        .unwrap_or_else(|| "http://localhost:8080/".to_string());
    let token = config
        .token_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok());
    let target = args
        .target
        .or(config.deployment_target_id)
        .context("no deployment target: pass --target or set it in the config file")?;

    let client = ApiClient::new(&api_url, token)?;

    let status = client
        .collector_status(&target)
        .await
        .context("collector discovery failed")?;
    let CollectorStatus::Present(version) = &status else {
        anyhow::bail!("no log collector detected on '{target}'; install one to enable log viewing");
    };
    tracing::debug!(%version, "collector detected");

    let protocol = select_protocol(client, &status);
    if args.revision.is_some() && !protocol.capabilities().revision_filter {
        anyhow::bail!(
            "collector {version} does not support revision filtering (requires {})",
            min_structured_version()
        );
    }

    let mut selector = Selector::new(args.service, target);
    selector.search_term = args.search;
    selector.revision = args.revision.clone();

    let mut overrides = Vec::new();
    if let Some(stream) = args.stream {
        overrides.push((FilterId::OutputStream, stream));
    }
    if let Some(revision) = args.revision {
        overrides.push((FilterId::Revision, revision));
    }
    let filters = FilterState::with_overrides(overrides);

    let window = TimeWindow {
        anchor: args.anchor,
        start: args.start,
        end: args.end,
    };

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let params = SessionParams {
        selector,
        filters,
        window,
    };
    let mut controller = ModeController::start(protocol, params, events_tx).await;

    // Pull extra history below the seeded window
    for _ in 0..args.pages {
        if controller.cursor().history_exhausted() {
            break;
        }
        controller.move_cursor(Direction::Backward).await;
    }

    let mut printed = print_after(&controller.snapshot(), None);

    if controller.mode() == ViewMode::PointInTime {
        if printed.is_none() {
            println!("No logs found in the selected window.");
        }
        controller.shutdown();
        return Ok(());
    }

    // Live tail: print records as they land until interrupted
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            event = events.recv() => {
                match event {
                    Some(EngineEvent::Appended { .. }) => {
                        printed = print_after(&controller.snapshot(), printed);
                    }
                    Some(EngineEvent::Seeded { .. }) => {}
                    Some(EngineEvent::NoLogsReceived) => {
                        eprintln!("No logs received for 60 seconds; subscription closed.");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    controller.shutdown();
    Ok(())
}

/// Print every record with a sequence above `after`; returns the new high
/// sequence. Forward appends never renumber, so this survives trims.
fn print_after(records: &[LogRecord], after: Option<u64>) -> Option<u64> {
    let mut last = after;
    for record in records {
        if last.is_some_and(|seq| record.sequence <= seq) {
            continue;
        }
        print_record(record);
        last = Some(record.sequence);
    }
    last
}

fn print_record(record: &LogRecord) {
    let timestamp = record
        .timestamp
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_default();

    println!(
        "{} [{}] {} | {}",
        timestamp,
        record.stream,
        record.service,
        record.text()
    );
}
