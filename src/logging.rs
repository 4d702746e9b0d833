//! Tracing setup.
//!
//! The terminal belongs to the presentation layer, so diagnostics go to a
//! daily-rolling file under `{state_dir}/logs`. `VEIL_LOG` takes an
//! `EnvFilter` directive; without it the level is `info`, or `debug` for
//! veil's own targets with `--verbose`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "VEIL_LOG";

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "info,veil=debug" } else { "info" }
}

fn build_filter(verbose: bool, env_directive: Option<String>) -> EnvFilter {
    env_directive
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process so buffered lines are flushed on exit.
pub fn init(log_dir: &Path, verbose: bool, json: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("veil")
        .filename_suffix("log")
        .build(log_dir)
        .context("Failed to open log file")?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = build_filter(verbose, std::env::var(LOG_ENV).ok());
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer.clone())
    });
    let text_layer = (!json).then(|| fmt::layer().with_ansi(false).with_writer(writer));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
