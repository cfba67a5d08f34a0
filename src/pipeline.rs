//! The command surface: background generation, batch removal and the
//! directory queries a front end needs around them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::background::{self, BackgroundPair, EstimatorOptions, Rect};
use crate::cache;
use crate::codec::{self, Dimensions, EncodedImage, ImageInfo, OutputFormat};
use crate::engine::{self, BackgroundSet, RemovalJob, RunSummary};
use crate::error::{Error, Result};
use crate::events::{CancellationToken, EventSink};
use crate::scanner;

/// Summary of one dimension group of a manga directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaDirData {
    /// Width of every page in the group.
    pub width: u32,
    /// Height of every page in the group.
    pub height: u32,
    /// Number of pages in the group.
    pub count: u32,
    /// Cached black background, if generated.
    pub black_background: Option<EncodedImage>,
    /// Cached white background, if generated.
    pub white_background: Option<EncodedImage>,
}

/// Runs scanner, estimator, cache and remover on behalf of a front end.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    /// Options for background estimation.
    pub estimator: EstimatorOptions,
    /// Worker threads for removal runs; `None` uses the available parallelism.
    pub workers: Option<usize>,
}

#[allow(clippy::unused_self)]
impl Pipeline {
    /// A pipeline with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum group size needed to estimate a background.
    #[must_use]
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.estimator.min_samples = min_samples;
        self
    }

    /// Set the number of worker threads used by removal runs.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Estimate and cache the backgrounds of one dimension group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] / [`Error::NotADirectory`] for a bad
    /// `manga_dir`, any estimation error (nothing is cached in that case), or
    /// a cache write error.
    pub fn generate_background(
        &self,
        manga_dir: &Path,
        rect: Option<Rect>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let dimensions = Dimensions::new(width, height);
        let paths: Vec<PathBuf> = scanner::scan_image_infos(manga_dir)?
            .into_iter()
            .filter(|info| info.dimensions() == dimensions)
            .map(|info| info.path)
            .collect();

        let pair = background::estimate_background(&paths, dimensions, rect, &self.estimator)?;
        cache::put(manga_dir, &pair)
    }

    /// Remove watermarks from every page of `manga_dir` into `output_dir`.
    ///
    /// `backgrounds` supplies one pair per dimension group; pages without a
    /// matching pair are reported as errors through `sink`. The returned
    /// result only reflects batch-level problems.
    ///
    /// # Errors
    ///
    /// See [`engine::process_directory`].
    #[allow(clippy::too_many_arguments)]
    pub fn remove_watermark(
        &self,
        manga_dir: &Path,
        output_dir: &Path,
        format: OutputFormat,
        optimize: bool,
        backgrounds: Vec<BackgroundPair>,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let job = RemovalJob {
            manga_dir: manga_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            format,
            optimize,
            workers: self.workers,
        };
        let backgrounds: BackgroundSet = backgrounds.into_iter().collect();
        engine::process_directory(&job, &backgrounds, sink, cancel)
    }

    /// Load every cached pair of `manga_dir`'s current dimension groups.
    ///
    /// # Errors
    ///
    /// Returns scanning errors, or an error from a cache entry that exists
    /// but cannot be loaded.
    pub fn load_cached_backgrounds(&self, manga_dir: &Path) -> Result<Vec<BackgroundPair>> {
        let infos = scanner::scan_image_infos(manga_dir)?;
        let mut pairs = Vec::new();
        for dimensions in scanner::group_by_dimensions(&infos).into_keys() {
            if let Some(pair) = cache::get(manga_dir, dimensions.width, dimensions.height)? {
                pairs.push(pair);
            }
        }
        info!(
            "loaded {} cached backgrounds from {}",
            pairs.len(),
            manga_dir.display()
        );
        Ok(pairs)
    }

    /// Describe each dimension group of `manga_dir`, with previews of its
    /// cached composites when there are any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] / [`Error::NotADirectory`] for a bad
    /// `manga_dir`, and [`Error::Io`] / [`Error::Decode`] if a cached composite
    /// cannot be read.
    pub fn get_manga_dir_data(&self, manga_dir: &Path) -> Result<Vec<MangaDirData>> {
        let infos = scanner::scan_image_infos(manga_dir)?;
        scanner::group_by_dimensions(&infos)
            .into_iter()
            .map(|(Dimensions { width, height }, members)| -> Result<MangaDirData> {
                let (black, white) = if cache::has(manga_dir, width, height) {
                    let (black, white) = cache::composite_paths(manga_dir, width, height);
                    (
                        Some(codec::open_image(&black)?),
                        Some(codec::open_image(&white)?),
                    )
                } else {
                    (None, None)
                };
                Ok(MangaDirData {
                    width,
                    height,
                    count: u32::try_from(members.len()).unwrap_or(u32::MAX),
                    black_background: black,
                    white_background: white,
                })
            })
            .collect()
    }

    /// List the pages of `manga_dir`; empty if it cannot be scanned.
    #[must_use]
    pub fn get_image_infos(&self, manga_dir: &Path) -> Vec<ImageInfo> {
        scanner::get_image_infos(manga_dir)
    }

    /// Load a page for previewing.
    ///
    /// # Errors
    ///
    /// See [`codec::open_image`].
    pub fn open_image(&self, path: &Path) -> Result<EncodedImage> {
        codec::open_image(path)
    }

    /// Reveal `path` in the platform's file manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `path` does not exist.
    pub fn show_path_in_file_manager(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        showfile::show_path_in_file_manager(path);
        Ok(())
    }

    /// Cache location of a group, relative to `manga_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] / [`Error::NotADirectory`] for a bad
    /// `manga_dir`.
    pub fn get_background_dir_relative_path(
        &self,
        manga_dir: &Path,
        width: u32,
        height: u32,
    ) -> Result<PathBuf> {
        scanner::ensure_directory(manga_dir)?;
        Ok(cache::relative_path(width, height))
    }

    /// Absolute cache location of a group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] / [`Error::NotADirectory`] for a bad
    /// `manga_dir`.
    pub fn get_background_dir_abs_path(
        &self,
        manga_dir: &Path,
        width: u32,
        height: u32,
    ) -> Result<PathBuf> {
        cache::absolute_path(manga_dir, width, height)
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use image::{Rgb, RgbImage};

    use super::*;

    #[test]
    fn manga_dir_data_reports_cache_state() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3u8 {
            RgbImage::from_pixel(4, 6, Rgb([i * 40, 0, 255 - i * 40]))
                .save(dir.path().join(format!("{i}.png")))
                .unwrap();
        }
        RgbImage::new(6, 4).save(dir.path().join("wide.png")).unwrap();

        let pipeline = Pipeline::new().with_min_samples(3);
        let before = pipeline.get_manga_dir_data(dir.path()).unwrap();
        assert_eq!(before.len(), 2);
        assert!(before.iter().all(|d| d.black_background.is_none()));

        pipeline.generate_background(dir.path(), None, 4, 6).unwrap();
        let after = pipeline.get_manga_dir_data(dir.path()).unwrap();
        let tall = after.iter().find(|d| d.width == 4).unwrap();
        assert_eq!(tall.count, 3);
        let (black_path, white_path) = cache::composite_paths(dir.path(), 4, 6);
        let black = tall.black_background.as_ref().unwrap();
        assert_eq!(black.info.path, black_path);
        assert_eq!((black.info.width, black.info.height), (4, 6));
        assert_eq!(
            STANDARD.decode(&black.base64).unwrap(),
            std::fs::read(&black_path).unwrap()
        );
        let white = tall.white_background.as_ref().unwrap();
        assert_eq!(white.info.path, white_path);
        assert!(!white.base64.is_empty());
        let wide = after.iter().find(|d| d.width == 6).unwrap();
        assert_eq!(wide.count, 1);
        assert!(wide.white_background.is_none());
    }

    #[test]
    fn generate_background_for_unknown_group_is_insufficient() {
        let dir = tempfile::tempdir().unwrap();
        let result = Pipeline::new().generate_background(dir.path(), None, 10, 10);
        assert!(matches!(
            result,
            Err(Error::InsufficientSamples { found: 0, .. })
        ));
    }

    #[test]
    fn show_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = Pipeline::new().show_path_in_file_manager(&dir.path().join("missing"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn background_paths_need_an_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new();
        assert_eq!(
            pipeline
                .get_background_dir_relative_path(dir.path(), 800, 1200)
                .unwrap(),
            cache::relative_path(800, 1200)
        );
        assert!(pipeline
            .get_background_dir_abs_path(&dir.path().join("missing"), 800, 1200)
            .is_err());
    }
}
