//! CLI argument definitions for signpost-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Signpost log routing daemon.
///
/// Receives syslog records over TCP (optionally TLS), evaluates the
/// configured rule list against each record, and forwards the result
/// to a Kafka topic.
#[derive(Parser, Debug)]
#[command(name = "signpost-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to signpost.yml configuration file.
    #[arg(short, long, default_value = "signpost.yml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration (including rule compilation) and exit
    /// without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Evaluate each line of a log file against the configured rules,
    /// print which rules match, then exit.
    #[arg(long, value_name = "FILE")]
    pub test: Option<PathBuf>,
}
