//! Locating the per-role position CSVs for one experiment.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::core::loaders::Role;

/// Errors that can occur while discovering input files.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Expected exactly one {role} CSV in {} matching '{pattern}', found {}: {candidates:?}", .folder.display(), .candidates.len())]
    AmbiguousInput {
        role: Role,
        folder: PathBuf,
        pattern: String,
        candidates: Vec<PathBuf>,
    },

    #[error("Invalid filename pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// The three input files of one experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentInputs {
    pub reference: PathBuf,
    pub substrate: PathBuf,
    pub pipette: PathBuf,
}

impl ExperimentInputs {
    pub fn get(&self, role: Role) -> &Path {
        match role {
            Role::Reference => &self.reference,
            Role::Substrate => &self.substrate,
            Role::Pipette => &self.pipette,
        }
    }
}

/// Filename pattern for a role. Case-insensitive.
///
/// With `contains` the name must be exactly `<role>[_-]<contains>.csv`, so
/// `1` does not also pick up experiment `11`. Without it any
/// `<role>*.csv` matches.
pub fn role_pattern(role: Role, contains: Option<&str>) -> Result<Regex> {
    let pattern = match contains {
        Some(text) => format!(
            r"^{}[_-]?{}\.csv$",
            regex::escape(role.keyword()),
            regex::escape(text)
        ),
        None => format!(r"^{}.*\.csv$", regex::escape(role.keyword())),
    };
    Ok(RegexBuilder::new(&pattern).case_insensitive(true).build()?)
}

/// List files in `folder` whose name matches `pattern`, sorted.
pub fn find_matching_files(folder: &Path, pattern: &Regex) -> Vec<PathBuf> {
    let mut matches: Vec<PathBuf> = fs::read_dir(folder)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|name| pattern.is_match(&name.to_string_lossy()))
                    .unwrap_or(false)
        })
        .collect();

    matches.sort();
    matches
}

/// Find the single CSV for `role` in `folder`.
///
/// # Errors
///
/// - [`DiscoveryError::InputNotFound`] if `folder` is not a directory
/// - [`DiscoveryError::AmbiguousInput`] unless exactly one file matches
pub fn find_role_input(folder: &Path, role: Role, contains: Option<&str>) -> Result<PathBuf> {
    if !folder.is_dir() {
        return Err(DiscoveryError::InputNotFound(folder.to_path_buf()));
    }

    let pattern = role_pattern(role, contains)?;
    let mut candidates = find_matching_files(folder, &pattern);
    debug!("Candidates for {} in {}: {:?}", role, folder.display(), candidates);

    if candidates.len() != 1 {
        return Err(DiscoveryError::AmbiguousInput {
            role,
            folder: folder.to_path_buf(),
            pattern: pattern.as_str().to_string(),
            candidates,
        });
    }

    let path = candidates.remove(0);
    info!("Using {} for {}", path.display(), role);
    Ok(path)
}

/// Find the reference, substrate and pipette CSVs in `folder`.
pub fn find_experiment_inputs(folder: &Path, contains: Option<&str>) -> Result<ExperimentInputs> {
    Ok(ExperimentInputs {
        reference: find_role_input(folder, Role::Reference, contains)?,
        substrate: find_role_input(folder, Role::Substrate, contains)?,
        pipette: find_role_input(folder, Role::Pipette, contains)?,
    })
}
