//! Centralized file-based logging
//!
//! Writes logs under the configured directory, separated by target:
//! - `main/` - every event, JSON
//! - `error/` - WARN and above
//! - `feed/` - exchange read loops
//! - `broker/` - aggregation and arbitrage detection
//! - `api/` - broadcast server

use crate::infrastructure::config::LoggingConfig;
use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::{filter_fn, LevelFilter},
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

const TARGETS: [&str; 3] = ["feed", "broker", "api"];

/// Initialize console and rolling file logging
///
/// The returned guards flush the non-blocking writers on drop and must be
/// kept alive for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> io::Result<Vec<WorkerGuard>> {
    let root = config.directory.as_path();
    for dir in ["main", "error"].iter().chain(TARGETS.iter()) {
        fs::create_dir_all(root.join(dir))?;
    }

    let mut guards = Vec::new();

    let (main_writer, guard) = create_appender(root, "main");
    guards.push(guard);
    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(main_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .json();

    let (error_writer, guard) = create_appender(root, "error");
    guards.push(guard);
    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(LevelFilter::WARN);

    let mut target_layers = Vec::new();
    for target in TARGETS {
        let (writer, guard) = create_appender(root, target);
        guards.push(guard);
        target_layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(filter_fn(move |metadata| metadata.target() == target))
                .boxed(),
        );
    }

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer().with_target(true).json().boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(main_layer)
        .with(error_layer)
        .with(target_layers)
        .with(console_layer)
        .init();

    tracing::info!(directory = %root.display(), "Logging initialized");

    Ok(guards)
}

/// Daily rolling, non-blocking appender in `<root>/<name>/`
fn create_appender(root: &Path, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, root.join(name), name);
    tracing_appender::non_blocking(appender)
}
