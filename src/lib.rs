//! Utilities for micro-tribology experiments.
//!
//! This crate provides tools for:
//! - Loading bead-tracking CSVs for the reference, substrate and pipette beads
//! - Aligning the three series on a common time axis and resampling them
//! - Deriving substrate deflection, normal force and friction coefficient
//! - Sorting and stacking the TIFF frames an experiment produces
//!
//! # Example
//!
//! ```no_run
//! use phd_utils::{processors::analysis::analyse_folder, AnalysisConfig};
//!
//! let config = AnalysisConfig::from_yaml("experiment.yaml").unwrap();
//! let outcome = analyse_folder("data/run-3".as_ref(), config).unwrap();
//! println!("{} rows written to {}", outcome.rows, outcome.csv_path.display());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{AlignmentConfig, AnalysisConfig, ImagingConfig, LoaderConfig, PhysicsConfig};
pub use core::loaders::{PositionSeries, Role};
pub use core::table::Table;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
