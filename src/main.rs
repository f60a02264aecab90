//! Message Poller CLI
//!
//! `watch` polls a feed and prints the message list whenever it changes;
//! `serve` publishes lines read on stdin as a feed.

#![allow(clippy::map_err_ignore)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use message_poller::config::{AppConfig, Cli, Command};
use message_poller::feed::{self, EventLog};
use message_poller::{HttpSource, MessageList, MessagePoller, OrderedView, schedule};

/// A stdin line that simulates a server restart in `serve`.
const RESET_LINE: &str = ":reset";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let config = AppConfig::from_cli(&cli).context("Configuration error")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    match cli.command {
        Some(Command::Serve(_)) => serve(&config, cancel).await,
        Some(Command::Watch) | None => watch(&config, cancel).await,
    }
}

// Initialize tracing (M-LOG-STRUCTURED)
fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    info!(name: "shutdown.requested", "Shutting down");
    cancel.cancel();
}

async fn watch(config: &AppConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let source = HttpSource::new(&config.feed.url)
        .with_context(|| format!("Invalid feed URL {:?}", config.feed.url))?;
    info!(
        name: "feed.config.loaded",
        endpoint = %source.endpoint(),
        "Feed configuration loaded"
    );

    let poller = MessagePoller::new(source, MessageList::new(), config.view.settings());
    schedule::run(poller, config.feed.interval(), cancel, |result, view| {
        if let Ok(outcome) = result {
            if outcome.changed() {
                print_view(view);
            }
        }
    })
    .await;
    Ok(())
}

fn print_view(view: &MessageList) {
    println!("── {} message(s) ──", view.len());
    for node in view.iter() {
        println!("{}", node.text());
    }
}

async fn serve(config: &AppConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let log = EventLog::new();

    let reader_log = log.clone();
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                () = reader_cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim() == RESET_LINE => {
                    reader_log.reset();
                    info!(name: "feed.reset", "Event log reset");
                }
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let count = reader_log.push(feed::render_line(line.trim_end()));
                    info!(name: "feed.event.added", num_events = count, "Event added");
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    feed::start_server(&config.server, log, cancel).await
}
