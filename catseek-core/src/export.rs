//! File exports driven from an engine snapshot.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::container::write_model_file;
use crate::error::Result;
use crate::model::Engine;
use crate::snapshot::Snapshot;

pub const DEFAULT_CONTAINER_FILE: &str = "catseek-1bit.gguf";
pub const DEFAULT_SNAPSHOT_FILE: &str = "catseek-1bit-config.json";

/// Label reported for container exports.
pub const EXPORT_QUANTIZATION: &str = "1-bit BitNet";

/// What a container export produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub filepath: PathBuf,
    pub size_bytes: u64,
    pub quantization: String,
    pub tensors: usize,
    pub metadata_keys: usize,
}

/// Write the engine's metadata and tensors as a container file.
pub fn export_container(engine: &Engine, path: &Path) -> Result<ExportSummary> {
    let metadata = engine.metadata();
    let stats = write_model_file(path, &metadata, engine.tensors())?;
    info!(
        path = %path.display(),
        bytes = stats.bytes_written,
        tensors = stats.tensor_count,
        "exported container"
    );
    Ok(ExportSummary {
        filepath: path.to_path_buf(),
        size_bytes: stats.bytes_written,
        quantization: EXPORT_QUANTIZATION.to_string(),
        tensors: stats.tensor_count,
        metadata_keys: stats.metadata_count,
    })
}

/// Write a JSON snapshot of the engine and return what was written.
pub fn export_snapshot(engine: &Engine, path: &Path) -> Result<Snapshot> {
    let snapshot = Snapshot::capture(engine);
    snapshot.write_to(path)?;
    info!(path = %path.display(), "exported snapshot");
    Ok(snapshot)
}
