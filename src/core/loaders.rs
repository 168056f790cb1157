//! Data loaders for bead-tracking CSV files.
//!
//! This module provides parsers for:
//! - Headerless position exports from the tracking software (one file per role)
//! - Processed tables written by [`crate::core::writers`], read back for plotting

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use log::{debug, info};
use thiserror::Error;

use crate::config::{column_index, LoaderConfig};
use crate::core::table::{Table, TableError};

/// Positional labels are `A`..`Z`; anything further right is ignored.
const MAX_COLUMNS: usize = 26;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Unrecognised format in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// The tracked object a position series belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Fixed marker used as the origin
    Reference,
    /// Marker on the substrate cantilever
    Substrate,
    /// Marker on the pipette
    Pipette,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Reference, Role::Substrate, Role::Pipette];

    /// Column prefix and display name.
    pub fn name(self) -> &'static str {
        match self {
            Role::Reference => "Reference",
            Role::Substrate => "Substrate",
            Role::Pipette => "Pipette",
        }
    }

    /// Lowercase keyword expected in input filenames.
    pub fn keyword(self) -> &'static str {
        match self {
            Role::Reference => "reference",
            Role::Substrate => "substrate",
            Role::Pipette => "pipette",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Positions of one tracked object, one entry per captured frame.
#[derive(Debug, Clone, Default)]
pub struct PositionSeries {
    /// Frame index recorded by the tracker.
    pub frames: Vec<i64>,
    /// X position per frame. `NaN` where the tracker left the cell blank.
    pub x: Vec<f64>,
    /// Y position per frame. `NaN` where the tracker left the cell blank.
    pub y: Vec<f64>,
    /// Source file path.
    pub source_path: Option<PathBuf>,
}

impl PositionSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a series from parallel vectors.
    pub fn from_columns(frames: Vec<i64>, x: Vec<f64>, y: Vec<f64>) -> Self {
        debug_assert_eq!(frames.len(), x.len());
        debug_assert_eq!(frames.len(), y.len());
        Self {
            frames,
            x,
            y,
            source_path: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            source_path: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn push(&mut self, frame: i64, x: f64, y: f64) {
        self.frames.push(frame);
        self.x.push(x);
        self.y.push(y);
    }

    /// Largest frame number, the denominator for time normalisation.
    pub fn max_frame(&self) -> Option<i64> {
        self.frames.iter().copied().max()
    }
}

/// Load one role's positions from a headerless tracker export.
///
/// Cells are labelled positionally (`A`..`Z`). Rows and columns that are
/// entirely blank are dropped first, then the frame, X and Y columns named
/// in `config` are picked out and everything else is discarded. The frame
/// column is coerced to an integer since the tracker sometimes writes it as
/// a float.
///
/// # Errors
///
/// - [`LoaderError::InputNotFound`] if `path` is not a file
/// - [`LoaderError::EmptyFile`] if no populated rows remain
/// - [`LoaderError::Format`] if a selected column is blank or absent, or a
///   cell in it cannot be read as a number
pub fn load_position_csv<P: AsRef<Path>>(
    path: P,
    config: Option<&LoaderConfig>,
) -> Result<PositionSeries> {
    let path = path.as_ref();
    let default_config = LoaderConfig::default();
    let config = config.unwrap_or(&default_config);

    if !path.is_file() {
        return Err(LoaderError::InputNotFound(path.to_path_buf()));
    }

    let format_error = |reason: String| LoaderError::Format {
        path: path.to_path_buf(),
        reason,
    };

    let resolve = |label: &str| {
        column_index(label).ok_or_else(|| format_error(format!("invalid column label '{}'", label)))
    };
    let frame_idx = resolve(&config.frame_column)?;
    let x_idx = resolve(&config.x_column)?;
    let y_idx = resolve(&config.y_column)?;

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(BufReader::new(file));

    // (line number, cells) for every row with at least one populated cell
    let mut rows: Vec<(u64, Vec<Option<String>>)> = Vec::with_capacity(4096);
    let mut populated: HashSet<usize> = HashSet::new();

    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());

        let cells: Vec<Option<String>> = record
            .iter()
            .take(MAX_COLUMNS)
            .map(|field| {
                if field.is_empty() {
                    None
                } else {
                    Some(field.to_string())
                }
            })
            .collect();

        if cells.iter().all(Option::is_none) {
            continue;
        }

        for (i, cell) in cells.iter().enumerate() {
            if cell.is_some() {
                populated.insert(i);
            }
        }
        rows.push((line, cells));
    }

    if rows.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    for (label, idx) in [
        (&config.frame_column, frame_idx),
        (&config.x_column, x_idx),
        (&config.y_column, y_idx),
    ] {
        if !populated.contains(&idx) {
            return Err(format_error(format!(
                "column {} is blank or absent ({} populated columns)",
                label,
                populated.len()
            )));
        }
    }

    let mut series = PositionSeries::with_capacity(rows.len());

    for (line, cells) in &rows {
        let cell = |idx: usize| cells.get(idx).and_then(|c| c.as_deref());

        let frame = match cell(frame_idx) {
            Some(raw) => parse_frame(raw)
                .ok_or_else(|| format_error(format!("line {}: invalid frame '{}'", line, raw)))?,
            None => return Err(format_error(format!("line {}: missing frame", line))),
        };

        let x = parse_position(cell(x_idx))
            .ok_or_else(|| format_error(format!("line {}: invalid X position", line)))?;
        let y = parse_position(cell(y_idx))
            .ok_or_else(|| format_error(format!("line {}: invalid Y position", line)))?;

        series.push(frame, x, y);
    }

    series.source_path = Some(path.to_path_buf());

    info!("Loaded csv from {} ({} rows)", path.display(), series.len());
    debug!(
        "Frames {:?}..{:?} in {}",
        series.frames.first(),
        series.frames.last(),
        path.display()
    );

    Ok(series)
}

/// Frame numbers may arrive as `12` or `12.0`; fractional parts are truncated.
fn parse_frame(raw: &str) -> Option<i64> {
    if let Ok(frame) = raw.parse::<i64>() {
        return Some(frame);
    }
    let value: f64 = raw.parse().ok()?;
    if value.is_finite() {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

/// Blank cells become `NaN`; text that is not a number is rejected.
fn parse_position(raw: Option<&str>) -> Option<f64> {
    match raw {
        None => Some(f64::NAN),
        Some(s) => s.parse().ok(),
    }
}

/// Load a processed table with a header row, using the first column as index.
///
/// Blank cells are read as `NaN`.
pub fn load_table_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(LoaderError::InputNotFound(path.to_path_buf()));
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let index_name = headers
        .get(0)
        .ok_or_else(|| LoaderError::Format {
            path: path.to_path_buf(),
            reason: "missing header row".to_string(),
        })?
        .to_string();
    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut index = Vec::with_capacity(1024);
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(1024); names.len()];

    for result in reader.records() {
        let record = result?;
        let mut values = record.iter().map(|field| {
            if field.is_empty() {
                Ok(f64::NAN)
            } else {
                field
                    .parse::<f64>()
                    .map_err(|_| LoaderError::ParseError(format!("Invalid value: {}", field)))
            }
        });

        index.push(values.next().unwrap_or(Ok(f64::NAN))?);
        for column in columns.iter_mut() {
            column.push(values.next().unwrap_or(Ok(f64::NAN))?);
        }
    }

    if index.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let mut table = Table::new(index_name, index);
    for (name, values) in names.into_iter().zip(columns) {
        table.push_column(name, values)?;
    }

    info!("Loaded table from {} ({} rows)", path.display(), table.len());
    Ok(table)
}
