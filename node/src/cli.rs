//! # CLI Interface
//!
//! Defines the command-line argument structure for `certchain-node` using
//! `clap` derive. Supports four subcommands: `run`, `issue`, `verify`,
//! and `version`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use certchain_protocol::config::{
    LedgerConfig, DEFAULT_SAVE_ATTEMPTS, DEFAULT_SAVE_RETRY_BACKOFF, DEFAULT_SAVE_TIMEOUT,
    DEFAULT_SNAPSHOT_PATH,
};

/// certchain issuance node.
///
/// Keeps a hash-linked chain of issued certificates in a JSON snapshot,
/// serves the issuance API, and verifies snapshots offline.
#[derive(Parser, Debug)]
#[command(
    name = "certchain-node",
    about = "certchain certificate issuance node",
    version,
    propagate_version = true
)]
pub struct CertchainCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "CERTCHAIN_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the issuance API and metrics endpoint.
    Run(RunArgs),
    /// Issue a single certificate offline and print the resulting block.
    Issue(IssueArgs),
    /// Load a snapshot and check its integrity.
    Verify(VerifyArgs),
    /// Print version information and exit.
    Version,
}

/// Snapshot location and save policy, shared by every subcommand that
/// touches the chain.
#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    /// Path to the JSON chain snapshot. Created on first save.
    #[arg(long, short = 's', env = "CERTCHAIN_SNAPSHOT", default_value = DEFAULT_SNAPSHOT_PATH)]
    pub snapshot: PathBuf,

    /// Timeout for a single snapshot save, in milliseconds.
    #[arg(long, env = "CERTCHAIN_SAVE_TIMEOUT_MS", default_value_t = DEFAULT_SAVE_TIMEOUT.as_millis() as u64)]
    pub save_timeout_ms: u64,

    /// Save attempts per persist (first try included).
    #[arg(long, env = "CERTCHAIN_SAVE_ATTEMPTS", default_value_t = DEFAULT_SAVE_ATTEMPTS)]
    pub save_attempts: u32,

    /// Pause between save attempts, in milliseconds.
    #[arg(long, env = "CERTCHAIN_SAVE_BACKOFF_MS", default_value_t = DEFAULT_SAVE_RETRY_BACKOFF.as_millis() as u64)]
    pub save_backoff_ms: u64,
}

impl SnapshotArgs {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            snapshot_path: self.snapshot.clone(),
            save_timeout: Duration::from_millis(self.save_timeout_ms),
            save_attempts: self.save_attempts,
            retry_backoff: Duration::from_millis(self.save_backoff_ms),
        }
    }
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,

    /// Address the API binds to.
    #[arg(long, env = "CERTCHAIN_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the issuance API.
    #[arg(long, env = "CERTCHAIN_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CERTCHAIN_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,
}

/// Arguments for the `issue` subcommand.
#[derive(Parser, Debug)]
pub struct IssueArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,

    /// Holder's full name.
    #[arg(long)]
    pub name: String,

    /// Event attended.
    #[arg(long)]
    pub event: String,

    /// Member identifier. A random UUID is assigned when omitted.
    #[arg(long)]
    pub member_id: Option<String>,
}

/// Arguments for the `verify` subcommand.
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Path to the JSON chain snapshot.
    #[arg(long, short = 's', env = "CERTCHAIN_SNAPSHOT", default_value = DEFAULT_SNAPSHOT_PATH)]
    pub snapshot: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        CertchainCli::command().debug_assert();
    }

    #[test]
    fn issue_args_build_a_ledger_config() {
        let cli = CertchainCli::parse_from([
            "certchain-node",
            "issue",
            "--snapshot",
            "/tmp/chain.json",
            "--save-timeout-ms",
            "250",
            "--name",
            "Ada Lovelace",
            "--event",
            "Systems Conf 2024",
        ]);

        let Commands::Issue(args) = cli.command else {
            panic!("expected issue");
        };
        let cfg = args.snapshot.ledger_config();
        assert_eq!(cfg.snapshot_path, PathBuf::from("/tmp/chain.json"));
        assert_eq!(cfg.save_timeout, Duration::from_millis(250));
        assert_eq!(cfg.save_attempts, DEFAULT_SAVE_ATTEMPTS);
        assert!(args.member_id.is_none());
    }
}
