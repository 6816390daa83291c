mod cli;
mod config;
mod dispatch;
mod http;
mod reporting;
mod timing;

use crate::cli::Args;
use crate::config::{Config, ConfigError};
use crate::dispatch::Dispatcher;
use crate::reporting::{DispatchSummary, OutputFormat, RequestReport};
use anyhow::Error;
use clap::Parser;
use loadtest_client::{HttpTransport, Transport};
use slog::{info, o, Drain, Level};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn root_logger(level: Level) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let async_drain = slog_async::Async::new(drain).build().fuse();
    let level_filter = slog::LevelFilter(async_drain, level).fuse();
    slog::Logger::root(level_filter, o!())
}

fn verbosity(occurrences: u8) -> Level {
    match occurrences {
        0 => Level::Warning,
        1 => Level::Info,
        2 => Level::Debug,
        3 => Level::Trace,
        _ => {
            eprintln!("WARNING: more than -vvv is ignored");
            Level::Trace
        }
    }
}

async fn run_load_test<T, W>(
    config: Config,
    transport: Arc<T>,
    logger: slog::Logger,
    out: &mut W,
) -> Result<DispatchSummary, Error>
where
    T: Transport + ?Sized + 'static,
    W: Write,
{
    let format = config.format;
    if format == OutputFormat::Text {
        writeln!(out, "{}", config.request.url)?;
    }
    let dispatcher = Dispatcher::new(config.request, transport, logger);
    let mut write_error: Option<io::Error> = None;
    let summary = dispatcher
        .run(config.concurrency, |result| {
            if write_error.is_none() {
                write_error = RequestReport::new(result).write_to(out, format).err();
            }
        })
        .await;
    match write_error {
        Some(e) => Err(e.into()),
        None => Ok(summary),
    }
}

/// Resolves the configuration, then dispatches. Any `ConfigError` is returned
/// before the transport sees a single request.
async fn execute<T, W>(
    args: &Args,
    transport: Arc<T>,
    logger: slog::Logger,
    out: &mut W,
) -> Result<DispatchSummary, Error>
where
    T: Transport + ?Sized + 'static,
    W: Write,
{
    let config = Config::from_args(args)?;
    if let Some(ref path) = config.source {
        info!(logger, "Using config file"; "path" => %path.display());
    }
    run_load_test(config, transport, logger, out).await
}

fn exit_code(logger: slog::Logger, args: &Args) -> i32 {
    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Could not start runtime: {}", e);
            return 1;
        }
    };
    let transport = Arc::new(HttpTransport::new());
    let stdout = io::stdout();
    let result = rt.block_on(async {
        let mut out = stdout.lock();
        execute(args, transport, logger, &mut out).await
    });
    match result {
        Ok(summary) if summary.all_succeeded() => 0,
        Ok(summary) => {
            eprintln!(
                "{} of {} requests failed",
                summary.failed,
                summary.total()
            );
            1
        }
        Err(e) => {
            match e.downcast_ref::<ConfigError>() {
                Some(_) => eprintln!("Could not load config: {}", e),
                None => eprintln!("Error running load test: {}", e),
            }
            1
        }
    }
}

fn main() {
    let args = Args::parse();
    let logger = root_logger(verbosity(args.verbose));
    // the logger is moved in and dropped before exit so the async drain flushes
    let code = exit_code(logger, &args);
    std::process::exit(code);
}
