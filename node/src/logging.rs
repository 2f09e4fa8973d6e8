//! # Structured Logging
//!
//! Sets up the `tracing` subscriber for `certchain-node`. Every event goes
//! to stderr; stdout is reserved for command output such as the block JSON
//! printed by `issue` or the verdict printed by `verify`.
//!
//! What the node logs, by target:
//!
//! - `certchain_protocol`: ledger open (height, tip hash), each issued
//!   certificate (index, hash, member id), snapshot saves, retried saves at
//!   `warn`, and rejected snapshots or candidate blocks at `error`.
//! - `certchain_node`: listener addresses, shutdown, and the final save of
//!   unsaved blocks.
//! - `tower_http`: one span per HTTP request while serving.
//!
//! `RUST_LOG` replaces the profile's directives entirely when set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored output with file and line.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    /// Parse `--log-format`. Accepts "json" or "pretty" (case-insensitive);
    /// anything else falls back to `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Default verbosity, chosen by subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogProfile {
    /// `run`: issuance and save events plus per-request HTTP spans.
    Serve,
    /// `verify`: ledger and snapshot events, no HTTP.
    Inspect,
    /// `issue`: warnings only, so a successful run prints just the block.
    Quiet,
}

impl LogProfile {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub fn directives(self) -> &'static str {
        match self {
            LogProfile::Serve => "certchain_node=info,certchain_protocol=info,tower_http=debug",
            LogProfile::Inspect => "certchain_node=info,certchain_protocol=info",
            LogProfile::Quiet => "certchain_node=warn,certchain_protocol=warn",
        }
    }
}

/// Initialize the global tracing subscriber. Call once, early in `main()`.
pub fn init_logging(profile: LogProfile, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(profile.directives()));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true),
                )
                .init();
        }
    }

    tracing::debug!(?profile, ?format, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing_is_lossy() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("yaml"), LogFormat::Pretty);
    }

    #[test]
    fn profile_directives_parse_as_filters() {
        for profile in [LogProfile::Serve, LogProfile::Inspect, LogProfile::Quiet] {
            assert!(
                EnvFilter::try_new(profile.directives()).is_ok(),
                "{profile:?}"
            );
        }
    }

    #[test]
    fn only_the_server_logs_http_spans() {
        assert!(LogProfile::Serve.directives().contains("tower_http"));
        assert!(!LogProfile::Inspect.directives().contains("tower_http"));
        assert!(!LogProfile::Quiet.directives().contains("info"));
    }
}
