//! Directory scanning and grouping by image dimensions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codec::{self, Dimensions, ImageInfo};
use crate::error::{Error, Result};

/// Check that `dir` exists and is a directory.
///
/// # Errors
///
/// Returns [`Error::NotFound`] or [`Error::NotADirectory`].
pub fn ensure_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Err(Error::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }
    Ok(())
}

/// List every file with a supported image extension directly inside `dir`,
/// sorted by path. Nothing is read from the files themselves.
///
/// # Errors
///
/// Returns [`Error::NotFound`] or [`Error::NotADirectory`] for a bad `dir`,
/// and [`Error::Io`] if the directory cannot be listed.
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    ensure_directory(dir)?;

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|path| codec::is_supported_image(path))
        .collect();

    paths.sort();
    Ok(paths)
}

/// List every supported image directly inside `dir`, sorted by path.
///
/// Dimensions are read from file headers. Files whose header cannot be read
/// are left out.
///
/// # Errors
///
/// Returns [`Error::NotFound`] or [`Error::NotADirectory`] for a bad `dir`,
/// and [`Error::Io`] if the directory cannot be listed.
pub fn scan_image_infos(dir: &Path) -> Result<Vec<ImageInfo>> {
    let infos = list_image_files(dir)?
        .into_iter()
        .filter_map(|path| match codec::read_image_info(&path) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("skipping {}: {e}", path.display());
                None
            }
        })
        .collect();

    Ok(infos)
}

/// Like [`scan_image_infos`], but yields an empty list instead of failing.
#[must_use]
pub fn get_image_infos(dir: &Path) -> Vec<ImageInfo> {
    scan_image_infos(dir).unwrap_or_else(|e| {
        debug!("no image infos for {}: {e}", dir.display());
        Vec::new()
    })
}

/// Group image infos by their exact dimensions.
#[must_use]
pub fn group_by_dimensions(infos: &[ImageInfo]) -> BTreeMap<Dimensions, Vec<ImageInfo>> {
    let mut groups: BTreeMap<Dimensions, Vec<ImageInfo>> = BTreeMap::new();
    for info in infos {
        groups
            .entry(info.dimensions())
            .or_default()
            .push(info.clone());
    }
    groups
}
