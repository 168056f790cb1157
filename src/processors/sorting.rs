//! Sorting experiment TIFF frames into numbered subfolders.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

/// Errors that can occur during image sorting.
#[derive(Debug, Error)]
pub enum SortingError {
    #[error("Failed to move image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Images per subfolder must be at least 1")]
    InvalidChunkSize,
}

/// Result type for sorting operations.
pub type Result<T> = std::result::Result<T, SortingError>;

/// One planned or completed image move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMove {
    pub source: PathBuf,
    pub destination: PathBuf,
}

fn name_matches(path: &Path, prefix: &str, extension: Option<&str>) -> bool {
    let stem_ok = path
        .file_name()
        .map(|name| name.to_string_lossy().starts_with(prefix))
        .unwrap_or(false);

    let ext_ok = match extension {
        Some(wanted) => path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(wanted))
            .unwrap_or(false),
        None => true,
    };

    stem_ok && ext_ok
}

/// List the `Experiment-*` subdirectories of `source_dir`, sorted.
pub fn find_experiment_folders(source_dir: &Path) -> Result<Vec<PathBuf>> {
    if !source_dir.is_dir() {
        return Err(SortingError::DirectoryNotFound(source_dir.to_path_buf()));
    }

    let mut folders: Vec<PathBuf> = fs::read_dir(source_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && name_matches(path, "Experiment-", None))
        .collect();

    folders.sort();
    debug!("Discovered experiment folders: {:?}", folders);
    Ok(folders)
}

/// List the `Experiment-*.tif` files directly inside `folder`, sorted.
pub fn find_experiment_images(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && name_matches(path, "Experiment-", Some("tif")))
        .collect();

    images.sort();
    Ok(images)
}

/// Move a folder's images into subfolders of `per_subfolder` files each.
///
/// Subfolders are named after the number of images moved before them
/// (`0`, `N`, `2N`, ...) and are only created once an image goes into
/// them.
///
/// # Arguments
///
/// * `folder` - Experiment folder holding `Experiment-*.tif` frames
/// * `per_subfolder` - Images per subfolder
/// * `dry_run` - If true, only report what would be moved without actually moving
///
/// # Returns
///
/// The moves performed (or planned, for a dry run), in order.
pub fn sort_images_into_subfolders(
    folder: &Path,
    per_subfolder: usize,
    dry_run: bool,
) -> Result<Vec<ImageMove>> {
    if per_subfolder == 0 {
        return Err(SortingError::InvalidChunkSize);
    }
    if !folder.is_dir() {
        return Err(SortingError::DirectoryNotFound(folder.to_path_buf()));
    }

    let images = find_experiment_images(folder)?;
    info!("Sorting {} images in {}", images.len(), folder.display());

    let mut moves = Vec::with_capacity(images.len());

    for (processed, image) in images.into_iter().enumerate() {
        let file_name = match image.file_name() {
            Some(name) => name.to_owned(),
            None => continue,
        };

        let subfolder = folder.join((processed - processed % per_subfolder).to_string());
        let destination = subfolder.join(&file_name);

        if dry_run {
            info!("Would move {} -> {}", image.display(), destination.display());
        } else {
            if processed % per_subfolder == 0 {
                debug!("Processed {} images, creating {}", processed, subfolder.display());
                fs::create_dir_all(&subfolder)?;
            }
            debug!("Moving {} to {}", image.display(), destination.display());
            fs::rename(&image, &destination)?;
        }

        moves.push(ImageMove {
            source: image,
            destination,
        });
    }

    Ok(moves)
}

/// Sort the images of every `Experiment-*` folder under `source_dir`.
///
/// Stops at the first folder that fails.
pub fn sort_experiments(
    source_dir: &Path,
    per_subfolder: usize,
    dry_run: bool,
) -> Result<Vec<(PathBuf, Vec<ImageMove>)>> {
    find_experiment_folders(source_dir)?
        .into_iter()
        .map(|folder| {
            info!("Processing experiment folder {}", folder.display());
            let moves = sort_images_into_subfolders(&folder, per_subfolder, dry_run)?;
            Ok((folder, moves))
        })
        .collect()
}
