// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # certchain Node
//!
//! Entry point for the `certchain-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the ledger, and serves the
//! issuance API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     - serve the issuance API and metrics endpoint
//! - `issue`   - append one certificate to a snapshot and print the block
//! - `verify`  - load a snapshot and check the whole chain
//! - `version` - print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use certchain_protocol::certificate::Certificate;
use certchain_protocol::storage::{load_chain, Ledger, StorageError};

use cli::{CertchainCli, Commands};
use logging::{LogFormat, LogProfile};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CertchainCli::parse();
    let format = LogFormat::from_str_lossy(&cli.log_format);

    match cli.command {
        Commands::Run(args) => run_node(args, format).await,
        Commands::Issue(args) => issue_certificate(args, format).await,
        Commands::Verify(args) => verify_snapshot(args, format),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens the ledger and serves the API and metrics endpoints until a
/// shutdown signal arrives.
async fn run_node(args: cli::RunArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(LogProfile::Serve, format);

    let config = args.snapshot.ledger_config();
    tracing::info!(
        port = args.port,
        metrics_port = args.metrics_port,
        snapshot = %config.snapshot_path.display(),
        "starting certchain-node"
    );

    // A snapshot that fails to load or validate is fatal: serving from a
    // fresh genesis would overwrite the operator's data on the next save.
    let ledger = Arc::new(
        Ledger::open(config.clone())
            .await
            .with_context(|| format!("failed to open ledger at {}", config.snapshot_path.display()))?,
    );

    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.chain_height.set(ledger.height().await as i64);

    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            certchain_protocol::config::PROTOCOL_VERSION,
        ),
        ledger: Arc::clone(&ledger),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    if ledger.is_dirty().await {
        tracing::warn!("unsaved blocks at shutdown, attempting a final save");
        if let Err(e) = ledger.persist().await {
            tracing::error!(error = %e, "final snapshot save failed");
        }
    }

    tracing::info!("certchain-node stopped");
    Ok(())
}

/// Appends one certificate to the snapshot and prints the new block as JSON.
async fn issue_certificate(args: cli::IssueArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(LogProfile::Quiet, format);

    let config = args.snapshot.ledger_config();
    let ledger = Ledger::open(config.clone())
        .await
        .with_context(|| format!("failed to open ledger at {}", config.snapshot_path.display()))?;

    let member_id = args
        .member_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let certificate = Certificate::new(member_id, args.name, args.event);

    let block = match ledger.append_certificate(certificate).await {
        Ok(block) => block,
        Err(StorageError::PersistFailed { block, source }) => {
            tracing::warn!(index = block.index, error = %source, "save failed, retrying once");
            ledger
                .persist()
                .await
                .context("certificate was not saved; the snapshot is unchanged")?;
            *block
        }
        Err(e) => return Err(e).context("failed to issue certificate"),
    };

    println!("{}", serde_json::to_string_pretty(&block)?);
    Ok(())
}

/// Loads a snapshot and reports whether the chain is intact.
fn verify_snapshot(args: cli::VerifyArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(LogProfile::Inspect, format);

    let path = &args.snapshot;
    if !path.exists() {
        bail!("no snapshot at {}", path.display());
    }

    match load_chain(path) {
        Ok(chain) => {
            println!(
                "valid: {} blocks, tip {} ({})",
                chain.len(),
                chain.height(),
                chain.tip().hash
            );
            Ok(())
        }
        Err(StorageError::Integrity(e)) => {
            bail!("invalid: block at position {}: {}", e.position(), e)
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("certchain-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol       {}", certchain_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
