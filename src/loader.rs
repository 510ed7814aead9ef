//! Loading raw VRA CSV exports from a local directory.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::table::{normalize_columns, RawTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub file_prefix: String,
    pub file_extension: String,
    pub delimiter: u8,
    /// Banner lines before the header row in each file.
    pub skip_lines: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            file_prefix: "VRA_".to_string(),
            file_extension: "csv".to_string(),
            delimiter: b';',
            skip_lines: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("no files matching {prefix}*.{extension} in {dir}")]
    NoInputFiles {
        dir: PathBuf,
        prefix: String,
        extension: String,
    },
}

/// Files in `dir` matching the configured prefix and extension, sorted by name.
pub fn list_input_files(dir: &Path, cfg: &LoadConfig) -> Result<Vec<PathBuf>, LoadError> {
    let suffix = format!(".{}", cfg.file_extension);
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(&cfg.file_prefix) && name.ends_with(&suffix))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Reads every matching file in `dir` and concatenates them in name order.
/// Headers are normalized per file so exports with different header
/// encodings still line up.
pub fn load_raw_dir(dir: &Path, cfg: &LoadConfig) -> Result<RawTable, LoadError> {
    let files = list_input_files(dir, cfg)?;
    if files.is_empty() {
        return Err(LoadError::NoInputFiles {
            dir: dir.to_path_buf(),
            prefix: cfg.file_prefix.clone(),
            extension: cfg.file_extension.clone(),
        });
    }

    info!(
        component = "loader",
        event = "loader.dir.start",
        dir = %dir.display(),
        file_count = files.len()
    );

    let mut table = RawTable::default();
    for path in &files {
        let file = fs::File::open(path)?;
        let part = normalize_columns(read_raw_csv(file, cfg)?);
        debug!(
            component = "loader",
            event = "loader.file.read",
            path = %path.display(),
            row_count = part.len()
        );
        if table.headers.is_empty() && table.rows.is_empty() {
            table = part;
        } else {
            table.append(part);
        }
    }

    info!(
        component = "loader",
        event = "loader.dir.finish",
        dir = %dir.display(),
        row_count = table.len(),
        column_count = table.headers.len()
    );

    Ok(table)
}

/// Parses one latin-1 encoded export. Short rows are padded with empty cells.
pub fn read_raw_csv<R: Read>(mut reader: R, cfg: &LoadConfig) -> Result<RawTable, LoadError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let text = decode_latin1(&bytes);
    let body = skip_lines(&text, cfg.skip_lines);

    let mut csv_reader = ReaderBuilder::new()
        .delimiter(cfg.delimiter)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    while csv_reader.read_record(&mut record)? {
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    Ok(RawTable::new(headers, rows))
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.find('\n') {
            Some(idx) => rest = &rest[idx + 1..],
            None => return "",
        }
    }
    rest
}
