//! Writing partitions and fitted artifacts to disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::features::{FeatureSchema, FeaturedFlight};
use crate::pipeline::FittedArtifacts;
use crate::split::DatasetSplits;

pub const ARTIFACTS_FILE_NAME: &str = "fitted_artifacts.json";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("row has no value for schema column '{0}'")]
    UnknownColumn(String),
    #[error("invalid output path: {0}")]
    InvalidPath(PathBuf),
}

/// Writes rows as CSV in schema column order, header first.
pub fn write_partition_csv<W: Write>(
    writer: W,
    rows: &[FeaturedFlight],
    schema: &FeatureSchema,
) -> Result<(), ExportError> {
    let names = schema.column_names();
    let mut csv_writer = WriterBuilder::new().from_writer(writer);
    csv_writer.write_record(&names)?;
    for row in rows {
        let mut record = Vec::with_capacity(names.len());
        for name in &names {
            let cell = row
                .cell(name)
                .ok_or_else(|| ExportError::UnknownColumn((*name).to_string()))?;
            record.push(cell.unwrap_or_default());
        }
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes `train.csv`, `validation.csv` and `test.csv` into `dir`.
pub fn write_splits(
    dir: &Path,
    splits: &DatasetSplits<FeaturedFlight>,
    schema: &FeatureSchema,
) -> Result<Vec<PathBuf>, ExportError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(3);
    for (name, rows) in [
        ("train", &splits.train),
        ("validation", &splits.validation),
        ("test", &splits.test),
    ] {
        let mut buffer = Vec::new();
        write_partition_csv(&mut buffer, rows, schema)?;
        let path = dir.join(format!("{name}.csv"));
        write_atomic(&path, &buffer)?;
        info!(
            component = "export",
            event = "export.partition.written",
            partition = name,
            path = %path.display(),
            rows = rows.len(),
            sha256 = %sha256_hex(&buffer)
        );
        written.push(path);
    }
    Ok(written)
}

pub fn save_artifacts(path: &Path, artifacts: &FittedArtifacts) -> Result<(), ExportError> {
    let payload = serde_json::to_vec_pretty(artifacts)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_atomic(path, &payload)?;
    info!(
        component = "export",
        event = "export.artifacts.written",
        path = %path.display(),
        schema_fingerprint = %artifacts.schema.fingerprint,
        average_sets = artifacts.averages.len()
    );
    Ok(())
}

pub fn load_artifacts(path: &Path) -> Result<FittedArtifacts, ExportError> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ExportError::InvalidPath(path.to_path_buf()))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
