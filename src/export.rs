//! Writing run artifacts to disk.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::aggregate::ResultAggregator;
use crate::error::Result;
use crate::model::BatchResults;

pub const RESULTS_FILE: &str = "results.json";
pub const DETAILED_RESULTS_FILE: &str = "results_detailed.json";

/// Paths written by [`export_results`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub results: PathBuf,
    pub detailed: PathBuf,
}

/// Writes the flat collection and the detailed report into `out_dir`,
/// creating the directory if needed.
pub fn export_results(
    out_dir: &Path,
    aggregator: &ResultAggregator,
    results: &BatchResults,
) -> Result<ExportedFiles> {
    std::fs::create_dir_all(out_dir)?;

    let flat = aggregator.flatten(results);
    let results_path = write_json_atomic(&out_dir.join(RESULTS_FILE), &flat)?;
    let detailed_path = write_json_atomic(
        &out_dir.join(DETAILED_RESULTS_FILE),
        &aggregator.detailed(results),
    )?;

    info!(
        run_id = aggregator.run_id(),
        entries = flat.entry_count(),
        path = %results_path.display(),
        "Exported results"
    );
    Ok(ExportedFiles {
        results: results_path,
        detailed: detailed_path,
    })
}

/// Serializes `value` as pretty JSON next to `path`, then renames it into
/// place so readers never see a partial file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<PathBuf> {
    let temp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    let mut file = std::fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    std::fs::rename(&temp_path, path)?;
    Ok(path.to_path_buf())
}
