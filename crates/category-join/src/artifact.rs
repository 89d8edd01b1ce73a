//! CSV artifacts of joined tables.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::Writer;
use sync_core::TableData;
use tracing::info;

/// Write `data` to `<dir>/<file_name>` with a header row.
///
/// Nulls become empty fields and timestamps use `%Y-%m-%d %H:%M:%S`. The
/// directory is created when missing.
pub fn write_csv_artifact(dir: &Path, file_name: &str, data: &TableData) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create artifact directory {}", dir.display()))?;
    let path = dir.join(file_name);

    let file = File::create(&path)
        .with_context(|| format!("Failed to create artifact {}", path.display()))?;
    let mut writer = Writer::from_writer(BufWriter::new(file));

    writer.write_record(&data.columns)?;
    for row in &data.rows {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", data.len(), path.display());
    Ok(path)
}
