//! Data writers for processed tables.
//!
//! This module provides functions for writing a [`Table`] to disk:
//! - CSV with the index as the first column
//! - JSON in records orientation (one object per row)
//!
//! Both refuse to replace an existing file unless told to.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::{Map, Value};
use thiserror::Error;

use super::table::Table;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Output exists and overwriting was not requested.
    #[error("refusing to overwrite existing file '{}' (pass --overwrite to replace it)", .path.display())]
    FileExists { path: PathBuf },

    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// JSON serialization error.
    #[error("JSON write error for '{path}': {source}")]
    JsonError {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Check that `path` may be written.
///
/// An existing file is an error unless `overwrite` is set, in which case a
/// warning is logged.
pub fn check_writable(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() {
        if !overwrite {
            return Err(WriteError::FileExists {
                path: path.to_path_buf(),
            });
        }
        warn!("Overwriting file {}", path.display());
    }
    Ok(())
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// CSV cell for a value: blank for missing, `inf`/`-inf` for unbounded.
fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        value.to_string()
    }
}

/// Write a table to CSV.
///
/// The header is the index name followed by the column names. Missing
/// values are written as empty cells.
///
/// # Errors
///
/// Returns [`WriteError::FileExists`] if `path` exists and `overwrite` is
/// false, or an I/O error if the file cannot be written.
///
/// # Example
///
/// ```no_run
/// use phd_utils::core::table::Table;
/// use phd_utils::core::writers::write_table_csv;
/// use std::path::Path;
///
/// let table = Table::new("Instant", vec![0.0, 1.0]);
/// write_table_csv(Path::new("processed.csv"), &table, false).unwrap();
/// ```
pub fn write_table_csv(path: &Path, table: &Table, overwrite: bool) -> Result<()> {
    check_writable(path, overwrite)?;
    ensure_parent_dirs(path)?;

    let mut csv_writer = csv::Writer::from_writer(create_buffered_writer(path)?);
    let path_str = path.display().to_string();

    let mut header = Vec::with_capacity(table.columns().len() + 1);
    header.push(table.index_name());
    header.extend(table.column_names());
    csv_writer
        .write_record(&header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for row in 0..table.len() {
        let mut record = Vec::with_capacity(header.len());
        record.push(format_cell(table.index()[row]));
        record.extend(table.columns().iter().map(|c| format_cell(c.values[row])));

        csv_writer
            .write_record(&record)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write a table to JSON as an array of row objects.
///
/// Each object maps the index name and every column name to its value.
/// Missing and unbounded values become `null`.
pub fn write_table_json(path: &Path, table: &Table, overwrite: bool) -> Result<()> {
    check_writable(path, overwrite)?;
    ensure_parent_dirs(path)?;

    let records: Vec<Value> = (0..table.len())
        .map(|row| {
            let mut object = Map::with_capacity(table.columns().len() + 1);
            object.insert(table.index_name().to_string(), json_number(table.index()[row]));
            for column in table.columns() {
                object.insert(column.name.clone(), json_number(column.values[row]));
            }
            Value::Object(object)
        })
        .collect();

    let path_str = path.display().to_string();
    let mut writer = create_buffered_writer(path)?;

    serde_json::to_writer_pretty(&mut writer, &records).map_err(|e| WriteError::JsonError {
        path: path_str.clone(),
        source: e,
    })?;

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// JSON has no NaN or infinity, so those map to `null`.
fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
