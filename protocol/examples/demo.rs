//! Terminal walkthrough of the certificate chain lifecycle.
//!
//! Issues a handful of certificates through a [`Ledger`] backed by a
//! temporary snapshot file, reopens it, then tampers with the file on disk
//! and shows the load being refused.
//!
//! Run with:
//!   cargo run --example demo --release

use std::time::Instant;

use certchain_protocol::certificate::Certificate;
use certchain_protocol::config::LedgerConfig;
use certchain_protocol::storage::{load_chain, Ledger, StorageError};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

fn step(n: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}[{n}]{RESET} {BOLD}{title}{RESET}");
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(16)]
}

#[tokio::main]
async fn main() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().map_err(|e| StorageError::io(".", e))?;
    let path = dir.path().join("blockchain.json");
    let config = LedgerConfig::with_snapshot_path(&path);

    step(1, "Open a ledger with no snapshot on disk");
    let ledger = Ledger::open(config.clone()).await?;
    let genesis = ledger.tip().await;
    println!("  genesis   {DIM}{}{RESET}", short(&genesis.hash));

    step(2, "Issue certificates");
    let attendees = [
        ("m-001", "Ada Lovelace"),
        ("m-002", "Alan Turing"),
        ("m-003", "Grace Hopper"),
    ];
    for (member, name) in attendees {
        let started = Instant::now();
        let block = ledger
            .append_certificate(Certificate::new(member, name, "Systems Conf 2024"))
            .await?;
        println!(
            "  block {}   {:<14} {DIM}{} <- {}{RESET}  ({:?})",
            block.index,
            name,
            short(&block.hash),
            short(&block.previous_hash),
            started.elapsed(),
        );
    }

    step(3, "Reopen from the snapshot");
    drop(ledger);
    let reopened = Ledger::open(config).await?;
    println!(
        "  {GREEN}loaded {} blocks, chain valid: {}{RESET}",
        reopened.len().await,
        reopened.validate().await.is_ok()
    );

    step(4, "Tamper with the snapshot and load it again");
    let text = std::fs::read_to_string(&path).map_err(|e| StorageError::io(&path, e))?;
    std::fs::write(&path, text.replacen("Alan Turing", "Mallory", 1))
        .map_err(|e| StorageError::io(&path, e))?;
    match load_chain(&path) {
        Ok(_) => println!("  {RED}tampering went unnoticed{RESET}"),
        Err(StorageError::Integrity(e)) => {
            println!("  {GREEN}refused:{RESET} {e}");
        }
        Err(e) => return Err(e),
    }

    println!();
    Ok(())
}
