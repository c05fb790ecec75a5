//! daybook - a terminal client for the daybook journal service.
//!
//! Keeps a short-lived access token in memory for the life of the process,
//! restoring the session from the server's refresh cookie at startup and
//! refreshing the token before it expires.

mod shell;

use std::io;

use anyhow::{Context, Result};
use daybook_core::{Config, DaybookClient};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shell::{Shell, HELP};

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "daybook.log";

/// Initialize the tracing subscriber for logging.
///
/// Warnings go to stderr; everything the filter allows also goes to a daily
/// rolling file when the cache directory is available.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match Config::log_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn print_usage() {
    println!("Usage: daybook [--api-base URL]\n");
    println!("{}", HELP);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load().context("Failed to load configuration")?;

    // Check for CLI flags
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--help") | Some("-h") => {
            print_usage();
            return Ok(());
        }
        Some("--api-base") => {
            let api_base = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("--api-base requires a URL"))?;
            config.api_base = api_base.clone();
        }
        Some(other) => {
            print_usage();
            anyhow::bail!("Unknown argument: {}", other);
        }
        None => {}
    }

    // Initialize logging
    let _log_guard = init_tracing();
    info!(api_base = %config.api_base, "daybook starting");

    let client = DaybookClient::new(&config).context("Failed to create API client")?;

    // Watch session transitions for the log
    let mut changes = client.session.credential_store().subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let present = changes.borrow_and_update().is_some();
            info!(authenticated = present, "Session credential changed");
        }
    });

    println!("Checking for an existing session...");
    client.session.initialize().await;
    if client.session.is_authenticated() {
        println!("Welcome back.");
    } else {
        println!("Not signed in. Type 'login <username>' or 'help'.");
    }

    Shell::new(client, config).run().await?;

    info!("daybook shutting down");
    Ok(())
}
