//! Command-line interface parsing for hydrate-cache
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into the transport, cache and session settings the commands run with.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::cache::{CacheConfig, FileSession};
use crate::transport::TransportConfig;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The base URL is not an http(s) URL
    #[error("Invalid base URL: '{0}'. Expected an http:// or https:// URL")]
    InvalidBaseUrl(String),

    /// The timeout is zero
    #[error("Invalid timeout: must be at least 1 second")]
    InvalidTimeout,

    /// The session key is empty or contains path separators
    #[error("Invalid session key: '{0}'")]
    InvalidSessionKey(String),
}

/// Fetch cache with snapshot hydration
#[derive(Parser, Debug)]
#[command(name = "hydrate-cache")]
#[command(about = "Preload URLs into a fetch cache, inspect snapshots, and read through a hydrated cache")]
#[command(version)]
pub struct Cli {
    /// Default log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn", value_name = "LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch URLs into a fresh cache and print the snapshot
    ///
    /// Examples:
    ///   hydrate-cache preload /api/people --base-url http://localhost:3000
    ///   hydrate-cache preload https://example.com/a.json -o snapshot.json
    Preload {
        /// URLs to preload
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Write the snapshot to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// List the entries stored in a snapshot file
    Inspect {
        /// Snapshot file produced by `preload`
        #[arg(value_name = "FILE")]
        snapshot: PathBuf,

        /// Validate records as people
        #[arg(long)]
        people: bool,
    },

    /// Read one URL through the cache, hydrating it first
    ///
    /// The cache is initialized from --snapshot when given (which also writes
    /// the snapshot to the session store); otherwise a snapshot left in the
    /// session store by an earlier run is used before going to the network.
    Get {
        /// URL to read
        #[arg(value_name = "URL")]
        url: String,

        /// Snapshot file to initialize the cache from
        #[arg(long, value_name = "FILE")]
        snapshot: Option<PathBuf>,

        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        fetch: FetchArgs,
    },
}

/// Options shared by commands that may hit the network
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Base URL relative URLs are resolved against
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub timeout: u64,

    /// Treat records as people (first, last, email, address, created, balance)
    #[arg(long)]
    pub people: bool,
}

/// Options for the session store
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Directory for the session store (defaults to the user cache directory)
    #[arg(long, value_name = "DIR")]
    pub session_dir: Option<PathBuf>,

    /// Key the snapshot is stored under
    #[arg(long, default_value = crate::cache::DEFAULT_SESSION_KEY, value_name = "KEY")]
    pub session_key: String,

    /// Do not read or write the session store
    #[arg(long, conflicts_with = "session_dir")]
    pub no_session: bool,
}

/// Where the session tier lives
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionLocation {
    /// No session tier
    Disabled,
    /// The XDG cache directory
    #[default]
    UserCache,
    /// A specific directory
    Dir(PathBuf),
}

/// Settings derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    pub transport: TransportConfig,
    pub cache: CacheConfig,
    pub session: SessionLocation,
    /// Whether records are decoded as people
    pub people: bool,
}

/// Parses a base URL argument.
///
/// # Returns
/// * `Ok(String)` with any trailing slash removed
/// * `Err(CliError::InvalidBaseUrl)` if it is not an http(s) URL
pub fn parse_base_url_arg(s: &str) -> Result<String, CliError> {
    let trimmed = s.trim();
    let has_scheme = trimmed.starts_with("http://") || trimmed.starts_with("https://");
    let has_host = trimmed
        .split_once("://")
        .map(|(_, rest)| !rest.is_empty() && !rest.starts_with('/'))
        .unwrap_or(false);

    if has_scheme && has_host {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(CliError::InvalidBaseUrl(s.to_string()))
    }
}

/// Parses a timeout argument in seconds.
pub fn parse_timeout_arg(secs: u64) -> Result<Duration, CliError> {
    if secs == 0 {
        return Err(CliError::InvalidTimeout);
    }
    Ok(Duration::from_secs(secs))
}

/// Checks that a session key can be used as a file name.
pub fn parse_session_key_arg(key: &str) -> Result<String, CliError> {
    FileSession::validate_key(key)
        .map(|()| key.to_string())
        .map_err(|_| CliError::InvalidSessionKey(key.to_string()))
}

impl StartupConfig {
    /// Creates a StartupConfig from fetch and (optional) session arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with appropriate settings
    /// * `Err(CliError)` if any argument is invalid
    pub fn from_args(fetch: &FetchArgs, session: Option<&SessionArgs>) -> Result<Self, CliError> {
        let base_url = fetch
            .base_url
            .as_deref()
            .map(parse_base_url_arg)
            .transpose()?;

        let transport = TransportConfig {
            base_url,
            timeout: parse_timeout_arg(fetch.timeout)?,
            ..TransportConfig::default()
        };

        let (cache, session) = match session {
            None => (CacheConfig::default(), SessionLocation::Disabled),
            Some(args) => {
                let cache = CacheConfig {
                    session_key: parse_session_key_arg(&args.session_key)?,
                };
                let location = if args.no_session {
                    SessionLocation::Disabled
                } else {
                    match &args.session_dir {
                        Some(dir) => SessionLocation::Dir(dir.clone()),
                        None => SessionLocation::UserCache,
                    }
                };
                (cache, location)
            }
        };

        Ok(StartupConfig {
            transport,
            cache,
            session,
            people: fetch.people,
        })
    }
}
