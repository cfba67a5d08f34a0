//! On-disk cache of estimated backgrounds.
//!
//! Each dimension group of a manga directory gets its own entry at
//! `<manga_dir>/.backgrounds/<width>x<height>/`, holding `black.png`,
//! `white.png` and the analysed rect as `rect.json`. Entries are only ever
//! replaced by another [`put`]; nothing expires on its own.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::background::{BackgroundPair, Rect};
use crate::codec::{self, Dimensions, OutputFormat};
use crate::error::{Error, Result};
use crate::scanner;

/// Directory inside a manga directory that holds all cache entries.
pub const BACKGROUND_DIR: &str = ".backgrounds";
const BLACK_FILE: &str = "black.png";
const WHITE_FILE: &str = "white.png";
const RECT_FILE: &str = "rect.json";
const STAGING_SUFFIX: &str = ".partial";

/// Location of a group's entry relative to its manga directory.
#[must_use]
pub fn relative_path(width: u32, height: u32) -> PathBuf {
    Path::new(BACKGROUND_DIR).join(Dimensions::new(width, height).to_string())
}

/// Absolute location of a group's entry. The entry need not exist.
///
/// # Errors
///
/// Returns [`Error::NotFound`] or [`Error::NotADirectory`] for a bad
/// `manga_dir`.
pub fn absolute_path(manga_dir: &Path, width: u32, height: u32) -> Result<PathBuf> {
    scanner::ensure_directory(manga_dir)?;
    Ok(manga_dir.canonicalize()?.join(relative_path(width, height)))
}

/// Locations of a group's black and white composites.
#[must_use]
pub fn composite_paths(manga_dir: &Path, width: u32, height: u32) -> (PathBuf, PathBuf) {
    let dir = manga_dir.join(relative_path(width, height));
    (dir.join(BLACK_FILE), dir.join(WHITE_FILE))
}

/// Whether both composites of a group are cached. Nothing is decoded.
#[must_use]
pub fn has(manga_dir: &Path, width: u32, height: u32) -> bool {
    let (black, white) = composite_paths(manga_dir, width, height);
    black.is_file() && white.is_file()
}

/// Store `pair` as the entry for its dimensions, replacing any previous one.
///
/// The entry is written to a staging directory next to its final location and
/// swapped in once complete. An entry never mixes files from two puts, and a
/// put that fails while staging leaves the previous entry untouched.
///
/// # Errors
///
/// Returns [`Error::NotFound`] or [`Error::NotADirectory`] for a bad
/// `manga_dir`, and [`Error::Write`] / [`Error::Encode`] if the entry cannot
/// be written.
pub fn put(manga_dir: &Path, pair: &BackgroundPair) -> Result<()> {
    scanner::ensure_directory(manga_dir)?;

    let Dimensions { width, height } = pair.dimensions();
    let dir = manga_dir.join(relative_path(width, height));
    let staging = manga_dir
        .join(BACKGROUND_DIR)
        .join(format!(".{}{STAGING_SUFFIX}", pair.dimensions()));
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(write_error(&staging))?;
    }
    std::fs::create_dir_all(&staging).map_err(write_error(&staging))?;

    codec::save_image(pair.black(), &staging.join(BLACK_FILE), OutputFormat::Png, false)?;
    codec::save_image(pair.white(), &staging.join(WHITE_FILE), OutputFormat::Png, false)?;

    let rect_path = staging.join(RECT_FILE);
    let rect_json = serde_json::to_string_pretty(&pair.rect()).map_err(|source| Error::Config {
        path: rect_path.clone(),
        source,
    })?;
    std::fs::write(&rect_path, rect_json).map_err(write_error(&rect_path))?;

    if dir.exists() {
        std::fs::remove_dir_all(&dir).map_err(write_error(&dir))?;
    }
    std::fs::rename(&staging, &dir).map_err(write_error(&dir))?;

    info!("cached background for {} in {}", pair.dimensions(), dir.display());
    Ok(())
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::Write { path, source }
}

/// Load a group's cached pair, if there is one.
///
/// A missing `rect.json` means the composites cover the whole page.
///
/// # Errors
///
/// Returns [`Error::Decode`] if a composite cannot be decoded,
/// [`Error::Config`] if the stored rect is malformed, and
/// [`Error::InvalidRect`] / [`Error::InvalidConfig`] if the stored pieces do
/// not fit together.
pub fn get(manga_dir: &Path, width: u32, height: u32) -> Result<Option<BackgroundPair>> {
    if !has(manga_dir, width, height) {
        debug!("no cached background for {width}x{height} in {}", manga_dir.display());
        return Ok(None);
    }

    let dimensions = Dimensions::new(width, height);
    let (black_path, white_path) = composite_paths(manga_dir, width, height);
    let black = codec::decode_image(&black_path)?.pixels;
    let white = codec::decode_image(&white_path)?.pixels;

    let rect_path = manga_dir.join(relative_path(width, height)).join(RECT_FILE);
    let rect = if rect_path.is_file() {
        let text = std::fs::read_to_string(&rect_path)?;
        serde_json::from_str::<Rect>(&text).map_err(|source| Error::Config {
            path: rect_path,
            source,
        })?
    } else {
        Rect::full(dimensions)
    };

    BackgroundPair::new(dimensions, rect, black, white).map(Some)
}
