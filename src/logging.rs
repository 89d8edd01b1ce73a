//! Tracing setup: stdout plus an optional per-run log file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Name of the log file for a run started at `now`.
pub fn log_file_name(now: NaiveDateTime) -> String {
    format!("biosphere_pipeline_{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. When `log_dir` is
/// given, every event is also written, without colors, to a timestamped file
/// in that directory, whose path is returned.
pub fn init_logging(log_dir: Option<&Path>, now: NaiveDateTime) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let path = dir.join(log_file_name(now));
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(path)
}
