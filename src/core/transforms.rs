//! Time alignment and resampling of position series.
//!
//! Each tracked object is recorded at its own frame rate, so rows from
//! different files cannot be matched by frame number. Frames are first
//! mapped to elapsed time, the series are outer-joined on that time, and the
//! result is mean-resampled onto a uniform grid. A frame-based inner join is
//! kept as an alternative for recordings that share a clock.

use std::collections::{BTreeSet, HashMap};

use log::{debug, info};
use thiserror::Error;

use super::loaders::{PositionSeries, Role};
use super::table::{Table, TableError};
use crate::config::{AlignmentConfig, AlignmentMode};

pub const INSTANT: &str = "Instant";
pub const FRAME: &str = "Frame";
pub const X_POSITION: &str = "X_Position";
pub const Y_POSITION: &str = "Y_Position";
pub const X_DELTA: &str = "X_Delta";
pub const Y_DELTA: &str = "Y_Delta";

/// Slack when assigning an instant to a bucket, so values that already sit
/// on the grid are not pushed into the previous bucket by rounding.
const BUCKET_EPSILON: f64 = 1e-9;

/// Upper bound on resampled rows; beyond this the bucket width is almost
/// certainly a unit mistake.
const MAX_BUCKETS: i64 = 50_000_000;

/// Errors that can occur while aligning series.
#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Result type for alignment operations.
pub type Result<T> = std::result::Result<T, AlignmentError>;

/// `<Role>_<field>` column name.
pub fn column_name(role: Role, field: &str) -> String {
    format!("{}_{}", role.name(), field)
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AlignmentError::InvalidParameter(format!(
            "{} must be a positive number of seconds, got {}",
            name, value
        )))
    }
}

/// Map each frame to elapsed experiment time.
///
/// `Instant = Frame / max(Frame) * experiment_duration_s`, normalised per
/// series. The frame with the largest number lands exactly on the duration.
pub fn frame_instants(series: &PositionSeries, experiment_duration_s: f64) -> Result<Vec<f64>> {
    require_positive("experiment duration", experiment_duration_s)?;

    let max_frame = series
        .max_frame()
        .ok_or_else(|| AlignmentError::InsufficientData("series has no frames".to_string()))?;

    if max_frame <= 0 {
        return Err(AlignmentError::InsufficientData(format!(
            "largest frame number is {}, cannot normalise to time",
            max_frame
        )));
    }

    let denominator = max_frame as f64;
    Ok(series
        .frames
        .iter()
        .map(|&frame| frame as f64 / denominator * experiment_duration_s)
        .collect())
}

/// Build a time-indexed table for one role, sorted by instant.
///
/// Columns are `<Role>_Frame`, `<Role>_X_Position` and `<Role>_Y_Position`.
pub fn prefixed_table(
    role: Role,
    series: &PositionSeries,
    experiment_duration_s: f64,
) -> Result<Table> {
    if series.is_empty() {
        return Err(AlignmentError::InsufficientData(format!(
            "{} series is empty",
            role
        )));
    }

    let instants = frame_instants(series, experiment_duration_s)?;

    let mut order: Vec<usize> = (0..series.len()).collect();
    order.sort_by(|&a, &b| instants[a].total_cmp(&instants[b]));

    let pick = |values: &[f64]| order.iter().map(|&i| values[i]).collect::<Vec<f64>>();
    let frames: Vec<f64> = order.iter().map(|&i| series.frames[i] as f64).collect();

    let mut table = Table::new(INSTANT, pick(&instants));
    table.push_column(FRAME, frames)?;
    table.push_column(X_POSITION, pick(&series.x))?;
    table.push_column(Y_POSITION, pick(&series.y))?;
    table.add_prefix(&format!("{}_", role.name()));

    Ok(table)
}

/// Outer-join tables on their index.
///
/// The result index is the sorted union of all input indices. Rows from
/// different tables with an identical index value share a row; cells a
/// table does not cover are `NaN`.
pub fn outer_join(tables: &[Table]) -> Result<Table> {
    let mut entries: Vec<(f64, usize, usize)> = tables
        .iter()
        .enumerate()
        .flat_map(|(t, table)| {
            table
                .index()
                .iter()
                .enumerate()
                .map(move |(row, &value)| (value, t, row))
        })
        .collect();
    entries.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut offsets = Vec::with_capacity(tables.len());
    let mut width = 0;
    for table in tables {
        offsets.push(width);
        width += table.columns().len();
    }

    let mut index: Vec<f64> = Vec::with_capacity(entries.len());
    let mut cells: Vec<Vec<f64>> = vec![Vec::with_capacity(entries.len()); width];
    let mut filled = vec![false; tables.len()];

    for (value, t, row) in entries {
        // Same-table duplicates at one instant get their own row
        if index.last() != Some(&value) || filled[t] {
            index.push(value);
            for column in cells.iter_mut() {
                column.push(f64::NAN);
            }
            filled.iter_mut().for_each(|f| *f = false);
        }

        for (j, column) in tables[t].columns().iter().enumerate() {
            if let Some(cell) = cells[offsets[t] + j].last_mut() {
                *cell = column.values[row];
            }
        }
        filled[t] = true;
    }

    let index_name = tables
        .first()
        .map_or(INSTANT, |table| table.index_name())
        .to_string();
    let mut joined = Table::new(index_name, index);
    let names = tables
        .iter()
        .flat_map(|table| table.columns().iter().map(|c| c.name.clone()));
    for (name, values) in names.zip(cells) {
        joined.push_column(name, values)?;
    }

    Ok(joined)
}

/// Resample onto uniform buckets, averaging every value in a bucket.
///
/// Bucket `k` covers `[k*w, (k+1)*w)` and is labelled by its left edge.
/// Every bucket between the first and last occupied one is emitted; a cell
/// with no values in its bucket is `NaN`. Applying this twice with the same
/// width gives the same table.
pub fn resample_mean(table: &Table, width_s: f64) -> Result<Table> {
    require_positive("resample width", width_s)?;

    if table.is_empty() {
        return Err(AlignmentError::InsufficientData(
            "nothing to resample".to_string(),
        ));
    }

    let bucket_of = |t: f64| (t / width_s + BUCKET_EPSILON).floor() as i64;

    let buckets: Vec<i64> = table.index().iter().map(|&t| bucket_of(t)).collect();
    let first = buckets.iter().copied().min().unwrap_or(0);
    let last = buckets.iter().copied().max().unwrap_or(0);

    let count = last - first + 1;
    if count > MAX_BUCKETS {
        return Err(AlignmentError::InvalidParameter(format!(
            "resampling to {}s buckets would produce {} rows",
            width_s, count
        )));
    }
    let count = count as usize;

    let index: Vec<f64> = (0..count)
        .map(|i| (first + i as i64) as f64 * width_s)
        .collect();
    let mut resampled = Table::new(table.index_name(), index);

    for column in table.columns() {
        let mut sums = vec![0.0; count];
        let mut counts = vec![0usize; count];

        for (&bucket, &value) in buckets.iter().zip(&column.values) {
            if value.is_nan() {
                continue;
            }
            let slot = (bucket - first) as usize;
            sums[slot] += value;
            counts[slot] += 1;
        }

        let means = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, n)| if n == 0 { f64::NAN } else { sum / n as f64 })
            .collect();
        resampled.push_column(column.name.clone(), means)?;
    }

    Ok(resampled)
}

/// Align the three series on a common axis and compute zero-based deltas.
///
/// With [`AlignmentMode::Resampled`] the series are placed on elapsed time,
/// outer-joined and mean-resampled at `resample_width_s`; frame columns are
/// dropped. With [`AlignmentMode::FrameInner`] only frames present in all
/// three series are kept and converted to time using the reference series.
///
/// `X_Delta`/`Y_Delta` are substrate minus reference, shifted so the first
/// row where both are defined reads zero. Every row of the joined axis is
/// kept; rows without both reference and substrate have `NaN` deltas.
pub fn merge_and_resample(
    reference: &PositionSeries,
    substrate: &PositionSeries,
    pipette: &PositionSeries,
    config: &AlignmentConfig,
) -> Result<Table> {
    require_positive("experiment duration", config.experiment_duration_s)?;

    let inputs = [
        (Role::Reference, reference),
        (Role::Substrate, substrate),
        (Role::Pipette, pipette),
    ];
    for (role, series) in &inputs {
        if series.is_empty() {
            return Err(AlignmentError::InsufficientData(format!(
                "{} series is empty",
                role
            )));
        }
    }

    let mut table = match config.mode {
        AlignmentMode::Resampled => {
            require_positive("resample width", config.resample_width_s)?;

            let tables = inputs
                .iter()
                .map(|(role, series)| prefixed_table(*role, series, config.experiment_duration_s))
                .collect::<Result<Vec<_>>>()?;
            let joined = outer_join(&tables)?;
            debug!("Outer join produced {} rows", joined.len());

            let mut resampled = resample_mean(&joined, config.resample_width_s)?;
            resampled.drop_columns(|name| name.ends_with(FRAME));
            info!(
                "Resampled to buckets of {}s ({} rows)",
                config.resample_width_s,
                resampled.len()
            );
            resampled
        }
        AlignmentMode::FrameInner => {
            let table = frame_inner_table(&inputs, config.experiment_duration_s)?;
            info!("Inner join on frame kept {} rows", table.len());
            table
        }
    };

    if table.is_empty() {
        return Err(AlignmentError::InsufficientData(
            "alignment produced no rows".to_string(),
        ));
    }

    table = append_zeroed_deltas(table)?;
    Ok(table)
}

/// Inner join on raw frame number of reference and substrate.
///
/// Indexed by `Frame`. Deltas are raw differences with no zero shift.
pub fn frame_displacement(reference: &PositionSeries, substrate: &PositionSeries) -> Result<Table> {
    let shared = shared_frames(&[reference, substrate]);
    if shared.is_empty() {
        return Err(AlignmentError::InsufficientData(
            "reference and substrate share no frames".to_string(),
        ));
    }

    let frames: Vec<f64> = shared.iter().map(|(frame, _)| *frame as f64).collect();
    let mut table = Table::new(FRAME, frames);
    push_joined_positions(&mut table, &[(Role::Reference, reference), (Role::Substrate, substrate)], &shared)?;

    let (x_delta, y_delta) = raw_deltas(&table)?;
    table.push_column(X_DELTA, x_delta)?;
    table.push_column(Y_DELTA, y_delta)?;

    Ok(table)
}

/// Frames present in every series, ascending, with each series' row.
///
/// For a frame repeated within one series the first row wins.
fn shared_frames(series: &[&PositionSeries]) -> Vec<(i64, Vec<usize>)> {
    let lookups: Vec<HashMap<i64, usize>> = series
        .iter()
        .map(|s| {
            let mut rows = HashMap::with_capacity(s.len());
            for (row, &frame) in s.frames.iter().enumerate() {
                rows.entry(frame).or_insert(row);
            }
            rows
        })
        .collect();

    let Some(first) = lookups.first() else {
        return Vec::new();
    };

    let frames: BTreeSet<i64> = first
        .keys()
        .copied()
        .filter(|frame| lookups.iter().all(|rows| rows.contains_key(frame)))
        .collect();

    frames
        .into_iter()
        .map(|frame| (frame, lookups.iter().map(|rows| rows[&frame]).collect()))
        .collect()
}

fn push_joined_positions(
    table: &mut Table,
    inputs: &[(Role, &PositionSeries)],
    shared: &[(i64, Vec<usize>)],
) -> Result<()> {
    for (k, (role, series)) in inputs.iter().enumerate() {
        let x = shared.iter().map(|(_, rows)| series.x[rows[k]]).collect();
        let y = shared.iter().map(|(_, rows)| series.y[rows[k]]).collect();
        table.push_column(column_name(*role, X_POSITION), x)?;
        table.push_column(column_name(*role, Y_POSITION), y)?;
    }
    Ok(())
}

fn frame_inner_table(
    inputs: &[(Role, &PositionSeries); 3],
    experiment_duration_s: f64,
) -> Result<Table> {
    let series: Vec<&PositionSeries> = inputs.iter().map(|(_, s)| *s).collect();
    let shared = shared_frames(&series);
    if shared.is_empty() {
        return Err(AlignmentError::InsufficientData(
            "no frame is shared by all inputs".to_string(),
        ));
    }

    let reference = inputs[0].1;
    let max_frame = reference.max_frame().unwrap_or(0);
    if max_frame <= 0 {
        return Err(AlignmentError::InsufficientData(format!(
            "largest reference frame number is {}, cannot normalise to time",
            max_frame
        )));
    }

    let instants = shared
        .iter()
        .map(|(frame, _)| *frame as f64 / max_frame as f64 * experiment_duration_s)
        .collect();
    let mut table = Table::new(INSTANT, instants);
    push_joined_positions(&mut table, inputs, &shared)?;
    Ok(table)
}

fn required<'a>(table: &'a Table, name: &str) -> Result<&'a [f64]> {
    table
        .column(name)
        .ok_or_else(|| AlignmentError::InsufficientData(format!("missing column {}", name)))
}

fn raw_deltas(table: &Table) -> Result<(Vec<f64>, Vec<f64>)> {
    let difference = |field: &str| -> Result<Vec<f64>> {
        let substrate = required(table, &column_name(Role::Substrate, field))?;
        let reference = required(table, &column_name(Role::Reference, field))?;
        Ok(substrate.iter().zip(reference).map(|(s, r)| s - r).collect())
    };
    Ok((difference(X_POSITION)?, difference(Y_POSITION)?))
}

fn append_zeroed_deltas(mut table: Table) -> Result<Table> {
    let (x_delta, y_delta) = raw_deltas(&table)?;

    // Deltas are measured from the first row where both are defined
    let origin = (0..table.len())
        .find(|&i| x_delta[i].is_finite() && y_delta[i].is_finite())
        .ok_or_else(|| {
            AlignmentError::InsufficientData(
                "reference and substrate never overlap in time".to_string(),
            )
        })?;

    if origin > 0 {
        debug!(
            "{} leading rows precede the first reference/substrate overlap; their deltas are undefined",
            origin
        );
    }

    let x_origin = x_delta[origin];
    let y_origin = y_delta[origin];

    table.push_column(X_DELTA, x_delta.iter().map(|v| v - x_origin).collect())?;
    table.push_column(Y_DELTA, y_delta.iter().map(|v| v - y_origin).collect())?;

    Ok(table)
}
