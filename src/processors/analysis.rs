//! End-to-end displacement analysis of one experiment folder.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use super::discovery::{find_experiment_inputs, DiscoveryError, ExperimentInputs};
use super::physics::{derive_measurements, PhysicsError, PhysicsParams, PhysicsReport};
use crate::config::AnalysisConfig;
use crate::core::loaders::{load_position_csv, LoaderError, PositionSeries};
use crate::core::transforms::{merge_and_resample, AlignmentError};
use crate::core::writers::{check_writable, write_table_csv, write_table_json, WriteError};

/// Errors from any stage of the analysis pipeline.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    Physics(#[from] PhysicsError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Everything needed to analyse one experiment.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Folder holding the reference, substrate and pipette CSVs
    pub folder: PathBuf,
    /// Text the input filenames must also contain
    pub contains: Option<String>,
    /// Explicit CSV output path, replacing the default name
    pub output: Option<PathBuf>,
    /// Also write a JSON copy next to the CSV
    pub json: bool,
    pub overwrite: bool,
    pub config: AnalysisConfig,
}

impl AnalysisRequest {
    pub fn new(folder: impl Into<PathBuf>, config: AnalysisConfig) -> Self {
        Self {
            folder: folder.into(),
            contains: None,
            output: None,
            json: false,
            overwrite: false,
            config,
        }
    }

    /// CSV output path: the override if set, else `processed.csv` or
    /// `processed_<contains>.csv` inside the experiment folder.
    pub fn csv_output(&self) -> PathBuf {
        match (&self.output, &self.contains) {
            (Some(path), _) => path.clone(),
            (None, Some(contains)) => self.folder.join(format!("processed_{}.csv", contains)),
            (None, None) => self.folder.join("processed.csv"),
        }
    }

    /// JSON sibling of the CSV output, if requested.
    pub fn json_output(&self) -> Option<PathBuf> {
        self.json.then(|| self.csv_output().with_extension("json"))
    }
}

/// What an analysis run produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub inputs: ExperimentInputs,
    pub csv_path: PathBuf,
    pub json_path: Option<PathBuf>,
    pub rows: usize,
    pub columns: usize,
    pub report: PhysicsReport,
}

fn load_inputs(
    inputs: &ExperimentInputs,
    config: &AnalysisConfig,
) -> Result<(PositionSeries, PositionSeries, PositionSeries)> {
    let reference = load_position_csv(&inputs.reference, Some(&config.loader))?;
    let substrate = load_position_csv(&inputs.substrate, Some(&config.loader))?;
    let pipette = load_position_csv(&inputs.pipette, Some(&config.loader))?;
    Ok((reference, substrate, pipette))
}

/// Discover, load, align and derive, then write the results.
///
/// Nothing is written unless every stage succeeds and every output path is
/// writable. If the JSON output fails after the CSV was written, the CSV is
/// removed again.
///
/// # Errors
///
/// Returns the first failing stage's error wrapped in [`AnalysisError`].
pub fn analyse_experiment(request: &AnalysisRequest) -> Result<AnalysisOutcome> {
    let config = &request.config;

    // Parameters first so a missing constant fails before any file I/O
    let params = PhysicsParams::from_config(&config.physics)?;

    let inputs = find_experiment_inputs(&request.folder, request.contains.as_deref())?;
    let (reference, substrate, pipette) = load_inputs(&inputs, config)?;
    debug!(
        "Loaded {} reference, {} substrate, {} pipette rows",
        reference.len(),
        substrate.len(),
        pipette.len()
    );

    let aligned = merge_and_resample(&reference, &substrate, &pipette, &config.alignment)?;
    let (derived, report) = derive_measurements(&aligned, &params)?;

    let csv_path = request.csv_output();
    let json_path = request.json_output();

    check_writable(&csv_path, request.overwrite)?;
    if let Some(path) = &json_path {
        check_writable(path, request.overwrite)?;
    }

    write_table_csv(&csv_path, &derived, request.overwrite)?;
    info!("Wrote {} rows to {}", derived.len(), csv_path.display());

    if let Some(path) = &json_path {
        if let Err(e) = write_table_json(path, &derived, request.overwrite) {
            if let Err(remove) = fs::remove_file(&csv_path) {
                warn!("Could not remove {}: {}", csv_path.display(), remove);
            }
            return Err(e.into());
        }
        info!("Wrote JSON to {}", path.display());
    }

    Ok(AnalysisOutcome {
        inputs,
        csv_path,
        json_path,
        rows: derived.len(),
        columns: derived.columns().len() + 1,
        report,
    })
}

/// Shorthand for analysing `folder` with defaults for everything else.
pub fn analyse_folder(folder: &Path, config: AnalysisConfig) -> Result<AnalysisOutcome> {
    analyse_experiment(&AnalysisRequest::new(folder, config))
}
