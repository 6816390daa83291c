use crate::reporting::OutputFormat;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Every option except the URL is optional here so a value left unset on the
/// command line and in the environment can still come from the config file.
#[derive(Debug, Parser, Clone)]
#[clap(
    name = "loadtest",
    version,
    about = "Fire concurrent HTTP requests and trace the latency of each phase"
)]
pub struct Args {
    /// Target URL (absolute, http or https)
    #[arg(value_name = "URL")]
    pub url: String,

    /// Number of parallel requests [default: 1]
    #[arg(short = 'c', long = "concurrency", env = "LOADTEST_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// HTTP method [default: GET]
    #[arg(short = 'm', long = "method", env = "LOADTEST_METHOD")]
    pub method: Option<String>,

    /// Header to send, as "Name: Value" (repeatable)
    #[arg(short = 'H', long = "headers", env = "LOADTEST_HEADERS")]
    pub headers: Vec<String>,

    /// Request body
    #[arg(long = "data", env = "LOADTEST_DATA")]
    pub data: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long = "timeout", value_name = "SECS", env = "LOADTEST_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Output format [default: text]
    #[arg(long = "format", value_enum, env = "LOADTEST_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Config file (default is $HOME/.load-test-cli.toml)
    #[arg(long = "config", value_name = "FILE", env = "LOADTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sets verbosity level
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}
