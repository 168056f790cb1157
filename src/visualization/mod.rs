//! Visualization of processed measurements.
//!
//! Renders the displacement deltas and, when derived, the friction
//! coefficient against the table index as line charts using plotters.

use std::ops::Range;
use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::table::Table;
use crate::core::transforms::{X_DELTA, Y_DELTA};
use crate::processors::physics::FRICTION_COEFFICIENT;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty table")]
    EmptyTable,

    #[error("Table has no column {0}")]
    MissingColumn(String),
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1920;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1080;

const X_DELTA_COLOR: RGBColor = RGBColor(228, 26, 28);
const Y_DELTA_COLOR: RGBColor = RGBColor(55, 126, 184);
const COEFFICIENT_COLOR: RGBColor = RGBColor(77, 175, 74);

fn plotting_error<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

/// Finite (index, value) pairs of a column. Gaps are dropped.
fn finite_points(index: &[f64], values: &[f64]) -> Vec<(f64, f64)> {
    index
        .iter()
        .zip(values)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect()
}

/// Compute padded ranges for x and y over every series.
fn compute_bounds(series: &[&[(f64, f64)]]) -> (Range<f64>, Range<f64>) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for (x, y) in series.iter().flat_map(|s| s.iter()) {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }

    if x_min > x_max {
        return (0.0..1.0, 0.0..1.0);
    }

    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;
    (
        (x_min - x_padding)..(x_max + x_padding),
        (y_min - y_padding)..(y_max + y_padding),
    )
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    series: &[(&[(f64, f64)], RGBColor)],
) -> Result<()> {
    let all: Vec<&[(f64, f64)]> = series.iter().map(|(points, _)| *points).collect();
    let (x_range, y_range) = compute_bounds(&all);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(plotting_error)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .draw()
        .map_err(plotting_error)?;

    for (points, color) in series {
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color))
            .map_err(plotting_error)?;
    }

    Ok(())
}

/// Plot `X_Delta`/`Y_Delta` and, if present, `Friction_Coefficient`
/// against the index, saving a PNG.
///
/// Deltas go in the top panel; the coefficient, when the table has one,
/// in a separate panel below. Non-finite values leave gaps.
pub fn plot_measurements(output_path: &Path, table: &Table) -> Result<()> {
    if table.is_empty() {
        return Err(VisualizationError::EmptyTable);
    }

    let column = |name: &str| {
        table
            .column(name)
            .ok_or_else(|| VisualizationError::MissingColumn(name.to_string()))
    };

    let index = table.index();
    let x_delta = finite_points(index, column(X_DELTA)?);
    let y_delta = finite_points(index, column(Y_DELTA)?);
    let coefficient = table
        .column(FRICTION_COEFFICIENT)
        .map(|values| finite_points(index, values));

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(plotting_error)?;

    let deltas = [
        (x_delta.as_slice(), X_DELTA_COLOR),
        (y_delta.as_slice(), Y_DELTA_COLOR),
    ];

    match &coefficient {
        Some(points) => {
            let panels = root.split_evenly((2, 1));
            draw_panel(&panels[0], &deltas)?;
            draw_panel(&panels[1], &[(points.as_slice(), COEFFICIENT_COLOR)])?;
        }
        None => draw_panel(&root, &deltas)?,
    }

    root.present().map_err(plotting_error)?;

    Ok(())
}
