//! apiforge command-line client
//!
//! Talks to a running `apiforge-server` over HTTP to search REST operations
//! and schemas, inspect descriptors and trigger syncs.
//!
//! # Environment Variables
//!
//! - `APIFORGE_DAEMON_URL`: Optional. Daemon address (default: http://127.0.0.1:4680)
//! - `RUST_LOG`: Optional. Logging level, written to stderr (default: warn)

use std::process::ExitCode;

use anyhow::{Context, Result};
use apiforge_core::ResourceType;
use clap::{Parser, Subcommand};
use serde::Serialize;
use url::Url;

mod client;
mod output;

use client::{ApiforgeClient, ClientError, SearchParams, DEFAULT_DAEMON_URL};

/// Search the REST operations and schemas indexed by the apiforge daemon.
#[derive(Debug, Parser)]
#[command(name = "apiforge", version, about)]
struct Cli {
    /// Daemon address.
    #[arg(long, global = true, env = "APIFORGE_DAEMON_URL", default_value = DEFAULT_DAEMON_URL)]
    daemon: Url,

    /// Print raw JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search by text, URL path, `useXxx` hook name or `METHOD text`.
    Search {
        /// Query; an empty string lists everything.
        query: String,

        /// Only `rest` or `schema` descriptors.
        #[arg(long = "type")]
        resource_type: Option<ResourceType>,

        /// Only descriptors from this source.
        #[arg(long)]
        source: Option<String>,

        /// Only descriptors under this tag path, e.g. `users` or `petstore/users`.
        #[arg(long)]
        pkg: Option<String>,

        /// 1-based page number.
        #[arg(long)]
        page: Option<usize>,

        /// Results per page.
        #[arg(long)]
        size: Option<usize>,
    },

    /// Show one descriptor in full.
    Show {
        /// Descriptor id.
        id: String,
    },

    /// List recently opened descriptors.
    Recent {
        /// Maximum entries.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Descriptor counts per source.
    Stats {
        /// Include project usage of the generated client.
        #[arg(long)]
        usage: bool,
    },

    /// Reload descriptors for one source, or all sources.
    Sync {
        /// Source id; omit to reload every source.
        source: Option<String>,

        /// Show the sync state instead of starting a run.
        #[arg(long)]
        status: bool,
    },

    /// Mark a descriptor as opened so it ranks higher.
    Touch {
        /// Descriptor id.
        id: String,
    },
}

/// Initialize logging to stderr so it never mixes with command output.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = ApiforgeClient::new(cli.daemon).context("Failed to create HTTP client")?;
    let json = cli.json;

    match cli.command {
        Command::Search {
            query,
            resource_type,
            source,
            pkg,
            page,
            size,
        } => {
            let params = SearchParams {
                query,
                resource_type,
                source,
                package: pkg,
                page,
                size,
            };
            let page = client.search(&params).await.context("Search failed")?;
            emit(json, &page, output::page)
        }
        Command::Show { id } => {
            let descriptor = client.descriptor(&id).await?;
            emit(json, &descriptor, output::descriptor)
        }
        Command::Recent { limit } => {
            let recent = client.recent(limit).await?;
            emit(json, &recent, |list| output::descriptor_list(list))
        }
        Command::Stats { usage } => {
            let stats = client.stats(usage).await?;
            if json {
                return print_json(&stats);
            }
            let health = client.health().await?;
            println!("{}", output::stats(&health, &stats));
            Ok(())
        }
        Command::Sync { source, status } => {
            if status {
                let key = source.as_deref().unwrap_or(apiforge_core::ALL_SOURCES_KEY);
                let state = client.sync_status(key).await?;
                return emit(json, &state, output::sync_status);
            }
            let report = client.sync(source.as_deref()).await?;
            emit(json, &report, output::sync_report)
        }
        Command::Touch { id } => {
            let descriptor = client.touch(&id).await?;
            emit(json, &descriptor, |d| format!("Opened {}", output::descriptor_line(d)))
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, render: impl Fn(&T) -> String) -> Result<()> {
    if json {
        return print_json(value);
    }
    println!("{}", render(value));
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
    println!("{text}");
    Ok(())
}

/// Print a failure the way a user needs to see it.
fn report(error: &anyhow::Error) {
    match error.downcast_ref::<ClientError>() {
        Some(ClientError::Unreachable { url, .. }) => {
            eprintln!("No metadata found: the apiforge daemon is not running at {url}.");
            eprintln!("Start it with `apiforge-server` or point --daemon at it.");
        }
        Some(ClientError::Api {
            status,
            code,
            message,
        }) => {
            tracing::debug!(status, code = %code, "Daemon rejected the request");
            eprintln!("{message}");
        }
        _ => eprintln!("Error: {error:#}"),
    }
}
