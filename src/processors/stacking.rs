//! Combining TIFF frames into multi-page stacks with an external tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use log::{debug, info};
use thiserror::Error;

use crate::config::ImagingConfig;
use crate::core::grouping::{grouper, preview};

/// Errors that can occur while stacking.
#[derive(Debug, Error)]
pub enum StackingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' failed building {}: {status}", .destination.display())]
    ToolFailed {
        program: String,
        destination: PathBuf,
        status: ExitStatus,
    },

    #[error("Frames per stack must be at least 1")]
    InvalidStackSize,
}

/// Result type for stacking operations.
pub type Result<T> = std::result::Result<T, StackingError>;

/// Options for a stacking run.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub frames_per_stack: usize,
    pub program: String,
    pub keep_originals: bool,
    pub dry_run: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::from(&ImagingConfig::default())
    }
}

impl From<&ImagingConfig> for StackConfig {
    fn from(config: &ImagingConfig) -> Self {
        Self {
            frames_per_stack: config.frames_per_stack,
            program: config.stack_program.clone(),
            keep_originals: config.keep_originals,
            dry_run: false,
        }
    }
}

/// A stack written (or planned) from a run of frames.
#[derive(Debug, Clone)]
pub struct StackOutput {
    pub destination: PathBuf,
    pub sources: Vec<PathBuf>,
}

fn is_tif(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("tif"))
        .unwrap_or(false)
}

/// Stack number of a file named like our output (`stack{n}.tif`).
fn stack_number(path: &Path) -> Option<usize> {
    let number = path.file_stem()?.to_str()?.strip_prefix("stack")?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

fn is_stack_output(path: &Path) -> bool {
    stack_number(path).is_some()
}

/// Collect every `*.tif` file below `folder`, recursively, sorted.
pub fn collect_tifs(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![folder.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() && is_tif(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Run `program sources... destination` and wait for it.
pub fn stack_tifs(program: &str, sources: &[PathBuf], destination: &Path) -> Result<()> {
    let mut command = Command::new(program);
    command.args(sources).arg(destination);
    debug!("Issuing command {:?}", command);

    let status = command.status().map_err(|e| StackingError::Spawn {
        program: program.to_string(),
        source: e,
    })?;

    if !status.success() {
        return Err(StackingError::ToolFailed {
            program: program.to_string(),
            destination: destination.to_path_buf(),
            status,
        });
    }
    Ok(())
}

/// Build stacks from the TIFFs in each folder.
///
/// Each folder's frames are sorted and grouped `frames_per_stack` at a time
/// into `folder/stack{n}.tif`. Originals are deleted after each stack
/// unless `keep_originals` is set. Folders that do not exist are skipped.
///
/// Existing `stack{n}.tif` files are never used as frames, and new stacks
/// are numbered after the highest existing one, so a second run over the
/// same folder neither folds in nor replaces earlier stacks.
///
/// Stops at the first failure; stacks already written stay in place.
pub fn stack_in_folders(folders: &[PathBuf], config: &StackConfig) -> Result<Vec<StackOutput>> {
    if config.frames_per_stack == 0 {
        return Err(StackingError::InvalidStackSize);
    }

    let folders: Vec<&PathBuf> = folders.iter().filter(|f| f.is_dir()).collect();
    debug!("Creating stacks from contents of each folder in {:?}", folders);

    let mut outputs = Vec::new();

    for folder in folders {
        let (previous, tifs): (Vec<PathBuf>, Vec<PathBuf>) = collect_tifs(folder)?
            .into_iter()
            .partition(|path| is_stack_output(path));
        let first_number = previous
            .iter()
            .filter(|path| path.parent() == Some(folder.as_path()))
            .filter_map(|path| stack_number(path))
            .max()
            .map_or(0, |n| n + 1);
        if !previous.is_empty() {
            info!(
                "Skipping {} existing stacks in {}",
                previous.len(),
                folder.display()
            );
        }
        info!("Found {} TIFs in {}", tifs.len(), folder.display());
        debug!("TIFs: {}", preview(&tifs, 10));

        for (offset, group) in grouper(tifs, config.frames_per_stack).enumerate() {
            let destination = folder.join(format!("stack{}.tif", first_number + offset));
            info!(
                "Stacking {} frames into {}",
                group.len(),
                destination.display()
            );

            if !config.dry_run {
                stack_tifs(&config.program, &group, &destination)?;
                if !config.keep_originals {
                    for source in &group {
                        fs::remove_file(source)?;
                    }
                }
            }

            outputs.push(StackOutput {
                destination,
                sources: group,
            });
        }
    }

    Ok(outputs)
}
