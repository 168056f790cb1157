//! Configuration types for the lab utilities.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which columns of a headerless tracking CSV hold the values we need.
///
/// Columns are labelled positionally, spreadsheet style (`A`, `B`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Column holding the frame index
    #[serde(default = "default_frame_column")]
    pub frame_column: String,

    /// Column holding the X position
    #[serde(default = "default_x_column")]
    pub x_column: String,

    /// Column holding the Y position
    #[serde(default = "default_y_column")]
    pub y_column: String,
}

fn default_frame_column() -> String {
    "H".to_string()
}

fn default_x_column() -> String {
    "E".to_string()
}

fn default_y_column() -> String {
    "F".to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            frame_column: default_frame_column(),
            x_column: default_x_column(),
            y_column: default_y_column(),
        }
    }
}

/// Convert a column label (`A`..`Z`) to a zero-based index.
pub fn column_index(label: &str) -> Option<usize> {
    let mut chars = label.trim().chars();
    let c = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() || !c.is_ascii_uppercase() {
        return None;
    }
    Some((c as u8 - b'A') as usize)
}

/// How the three position series are put on a common axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Outer join on elapsed time, then mean-resample onto uniform buckets.
    /// Keeps the union of buckets covered by the inputs.
    #[default]
    Resampled,
    /// Inner join on raw frame number. Keeps only frames all roles share.
    FrameInner,
}

/// Configuration for time alignment and resampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Total experiment duration in seconds
    #[serde(default)]
    pub experiment_duration_s: f64,

    /// Width of each resampled bucket in seconds
    #[serde(default = "default_resample_width")]
    pub resample_width_s: f64,

    /// Join strategy
    #[serde(default)]
    pub mode: AlignmentMode,
}

fn default_resample_width() -> f64 {
    1.0
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            experiment_duration_s: 0.0,
            resample_width_s: default_resample_width(),
            mode: AlignmentMode::default(),
        }
    }
}

/// Model used for the substrate tip position in the beam deflection formula.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeflectionModel {
    /// Tip sits at the configured rest position for the whole experiment.
    /// `X_Delta` is used without angle correction.
    #[default]
    StationaryTip,
    /// Tip is stationary for `stationary_s`, then moves at `velocity`
    /// (micrometres per second). `X_Delta` is divided by `cos(angle_beta)`.
    RampedTip {
        velocity: f64,
        #[serde(default = "default_stationary_s")]
        stationary_s: f64,
    },
}

pub fn default_stationary_s() -> f64 {
    5.0
}

/// Baseline the pipette deflection is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipetteRest {
    /// First defined pipette Y position.
    #[default]
    FirstSample,
    /// Rest position measured separately and supplied by the caller.
    Fixed { value: f64 },
    /// Mean pipette Y over the opening `window_s` seconds.
    ///
    /// Heuristic with no statistical grounding. Opt-in only.
    OpeningMeanHeuristic {
        #[serde(default = "default_rest_window")]
        window_s: f64,
    },
}

pub fn default_rest_window() -> f64 {
    3.0
}

/// Physical parameters for the normal/friction force derivation.
///
/// Fields without a sensible default are optional here and must be supplied
/// either in the config file or on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    #[serde(default)]
    pub initial_x_displacement: Option<f64>,

    #[serde(default)]
    pub substrate_tip_position: Option<f64>,

    #[serde(default)]
    pub substrate_length: Option<f64>,

    #[serde(default)]
    pub substrate_stiffness: Option<f64>,

    #[serde(default)]
    pub pipette_stiffness: Option<f64>,

    #[serde(default)]
    pub reverse_sliding_direction: bool,

    /// Radians
    #[serde(default)]
    pub angle_alpha: Option<f64>,

    /// Radians
    #[serde(default)]
    pub angle_beta: Option<f64>,

    #[serde(default)]
    pub flexural_rigidity: Option<f64>,

    #[serde(default)]
    pub deflection_model: DeflectionModel,

    #[serde(default)]
    pub pipette_rest: PipetteRest,

    /// Normal forces with magnitude at or below this are reported as degenerate
    #[serde(default = "default_degenerate_threshold")]
    pub degenerate_threshold: f64,
}

fn default_degenerate_threshold() -> f64 {
    1e-12
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            initial_x_displacement: None,
            substrate_tip_position: None,
            substrate_length: None,
            substrate_stiffness: None,
            pipette_stiffness: None,
            reverse_sliding_direction: false,
            angle_alpha: None,
            angle_beta: None,
            flexural_rigidity: None,
            deflection_model: DeflectionModel::default(),
            pipette_rest: PipetteRest::default(),
            degenerate_threshold: default_degenerate_threshold(),
        }
    }
}

/// Configuration for TIFF sorting and stacking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagingConfig {
    /// Number of TIFFs moved into each numbered subfolder
    #[serde(default = "default_files_per_subfolder")]
    pub files_per_subfolder: usize,

    /// Number of frames concatenated into each stack
    #[serde(default = "default_frames_per_stack")]
    pub frames_per_stack: usize,

    /// External program invoked to build a stack (ImageMagick `convert`)
    #[serde(default = "default_stack_program")]
    pub stack_program: String,

    /// Keep the source frames after stacking
    #[serde(default)]
    pub keep_originals: bool,
}

fn default_files_per_subfolder() -> usize {
    2000
}

fn default_frames_per_stack() -> usize {
    2000
}

fn default_stack_program() -> String {
    "convert".to_string()
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            files_per_subfolder: default_files_per_subfolder(),
            frames_per_stack: default_frames_per_stack(),
            stack_program: default_stack_program(),
            keep_originals: false,
        }
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub alignment: AlignmentConfig,

    #[serde(default)]
    pub physics: PhysicsConfig,

    #[serde(default)]
    pub imaging: ImagingConfig,
}

impl AnalysisConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_loader_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.frame_column, "H");
        assert_eq!(column_index(&config.frame_column), Some(7));
        assert_eq!(column_index(&config.x_column), Some(4));
        assert_eq!(column_index(&config.y_column), Some(5));
    }

    #[test]
    fn test_column_index_rejects_garbage() {
        assert_eq!(column_index("a"), Some(0));
        assert_eq!(column_index("AA"), None);
        assert_eq!(column_index("7"), None);
        assert_eq!(column_index(""), None);
    }

    #[test]
    fn test_default_analysis_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.alignment.mode, AlignmentMode::Resampled);
        assert_eq!(config.physics.deflection_model, DeflectionModel::StationaryTip);
        assert_eq!(config.physics.pipette_rest, PipetteRest::FirstSample);
        assert_eq!(config.physics.degenerate_threshold, 1e-12);
        assert_eq!(config.imaging.frames_per_stack, 2000);
        assert_eq!(config.imaging.stack_program, "convert");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
alignment:
  experiment_duration_s: 30.0
physics:
  substrate_stiffness: 2.5
  deflection_model:
    kind: ramped_tip
    velocity: 10.0
  pipette_rest:
    kind: opening_mean_heuristic
"#;
        let config: AnalysisConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.alignment.experiment_duration_s, 30.0);
        assert_eq!(config.alignment.resample_width_s, 1.0);
        assert_eq!(config.physics.substrate_stiffness, Some(2.5));
        assert_eq!(
            config.physics.deflection_model,
            DeflectionModel::RampedTip { velocity: 10.0, stationary_s: 5.0 }
        );
        assert_eq!(
            config.physics.pipette_rest,
            PipetteRest::OpeningMeanHeuristic { window_s: 3.0 }
        );
        assert_eq!(config.loader.y_column, "F");
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = AnalysisConfig::default();
        config.alignment.mode = AlignmentMode::FrameInner;
        config.physics.pipette_rest = PipetteRest::Fixed { value: 12.5 };
        config.to_yaml(&path).unwrap();

        let loaded = AnalysisConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.alignment.mode, AlignmentMode::FrameInner);
        assert_eq!(loaded.physics.pipette_rest, PipetteRest::Fixed { value: 12.5 });
    }
}
