use crate::session::config::{DEFAULT_API_BASE_URL, DEFAULT_CALLBACK_URL};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

pub const ARG_API_URL: &str = "api-url";
pub const ARG_CALLBACK_URL: &str = "callback-url";
pub const ARG_STATE_DIR: &str = "state-dir";
pub const ARG_TIMEOUT_SECONDS: &str = "timeout-seconds";

pub const DEFAULT_STATE_DIR: &str = ".dashboard-session";

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Options {
    pub api_url: String,
    pub callback_url: String,
    pub state_dir: PathBuf,
    pub timeout_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required option is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            api_url: matches
                .get_one::<String>(ARG_API_URL)
                .cloned()
                .context("missing required argument: --api-url")?,
            callback_url: matches
                .get_one::<String>(ARG_CALLBACK_URL)
                .cloned()
                .context("missing required argument: --callback-url")?,
            state_dir: matches
                .get_one::<String>(ARG_STATE_DIR)
                .map(PathBuf::from)
                .context("missing required argument: --state-dir")?,
            timeout_seconds: matches
                .get_one::<u64>(ARG_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_URL)
                .long("api-url")
                .help("Dashboard backend base URL")
                .env("DASHBOARD_API_URL")
                .default_value(DEFAULT_API_BASE_URL)
                .global(true),
        )
        .arg(
            Arg::new(ARG_CALLBACK_URL)
                .long("callback-url")
                .help("Redirect URI registered with the OAuth providers")
                .env("DASHBOARD_CALLBACK_URL")
                .default_value(DEFAULT_CALLBACK_URL)
                .global(true),
        )
        .arg(
            Arg::new(ARG_STATE_DIR)
                .long("state-dir")
                .help("Directory holding the stored session and pending OAuth flow")
                .env("DASHBOARD_STATE_DIR")
                .default_value(DEFAULT_STATE_DIR)
                .global(true),
        )
        .arg(
            Arg::new(ARG_TIMEOUT_SECONDS)
                .long("timeout-seconds")
                .help("Request timeout in seconds")
                .env("DASHBOARD_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..))
                .global(true),
        )
}
