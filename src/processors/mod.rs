//! Data processing modules.

pub mod analysis;
pub mod discovery;
pub mod physics;
pub mod sorting;
pub mod stacking;

// Re-export key types for convenience
pub use analysis::{analyse_experiment, analyse_folder, AnalysisError, AnalysisOutcome, AnalysisRequest};
pub use discovery::{find_experiment_inputs, find_role_input, DiscoveryError, ExperimentInputs};
pub use physics::{
    derive_measurements, pipette_rest_position, DegenerateResultWarning, PhysicsError,
    PhysicsParams, PhysicsReport,
};
pub use sorting::{
    find_experiment_folders, sort_experiments, sort_images_into_subfolders, ImageMove,
    SortingError,
};
pub use stacking::{collect_tifs, stack_in_folders, StackConfig, StackOutput, StackingError};
