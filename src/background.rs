//! Background estimation from a group of same-sized pages.
//!
//! A static watermark is blended onto every page of a group as
//! `observed = page * (1 - alpha) + overlay * alpha`, with `alpha` and
//! `overlay` fixed per pixel. Across enough pages the darkest observed value
//! at a position approaches the `page = 0` case and the brightest approaches
//! `page = 255`. Those two extremal composites (the "black" and the "white"
//! background) are all the remover needs to undo the blend.

use std::fmt;
use std::path::{Path, PathBuf};

use image::{imageops, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::{self, Dimensions};
use crate::error::{Error, Result};

/// Default minimum number of pages needed to estimate a background.
pub const DEFAULT_MIN_SAMPLES: usize = 8;

/// A rectangle in pixel space, `left..right` by `top..bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    /// First column inside the rectangle.
    pub left: u32,
    /// First row inside the rectangle.
    pub top: u32,
    /// First column past the rectangle.
    pub right: u32,
    /// First row past the rectangle.
    pub bottom: u32,
}

impl Rect {
    /// Create a rectangle from its edges.
    #[must_use]
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// The rectangle covering a whole image.
    #[must_use]
    pub const fn full(dimensions: Dimensions) -> Self {
        Self::new(0, 0, dimensions.width, dimensions.height)
    }

    /// Width of the rectangle.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height of the rectangle.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Size of the rectangle.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    /// Whether this rectangle covers the whole of `dimensions`.
    #[must_use]
    pub fn is_full(&self, dimensions: Dimensions) -> bool {
        *self == Self::full(dimensions)
    }

    /// Check that the rectangle is non-empty and lies inside `dimensions`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRect`] otherwise.
    pub fn validate(&self, dimensions: Dimensions) -> Result<()> {
        let valid = self.left < self.right
            && self.top < self.bottom
            && self.right <= dimensions.width
            && self.bottom <= dimensions.height;
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidRect {
                rect: *self,
                dimensions,
            })
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {})-({}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// The black and white composites of one dimension group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundPair {
    dimensions: Dimensions,
    rect: Rect,
    black: RgbImage,
    white: RgbImage,
}

impl BackgroundPair {
    /// Assemble a pair for pages of size `dimensions` whose composites cover `rect`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRect`] if `rect` does not fit inside
    /// `dimensions`, and [`Error::InvalidConfig`] if either composite is not
    /// exactly the size of `rect`.
    pub fn new(dimensions: Dimensions, rect: Rect, black: RgbImage, white: RgbImage) -> Result<Self> {
        rect.validate(dimensions)?;
        let expected = rect.dimensions();
        for (name, composite) in [("black", &black), ("white", &white)] {
            let actual = Dimensions::of(composite);
            if actual != expected {
                return Err(Error::InvalidConfig(format!(
                    "{name} background is {actual}, expected {expected}"
                )));
            }
        }
        Ok(Self {
            dimensions,
            rect,
            black,
            white,
        })
    }

    /// Size of the pages this pair applies to.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Region of the page the composites cover.
    #[must_use]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Per-position minimum across the group.
    #[must_use]
    pub fn black(&self) -> &RgbImage {
        &self.black
    }

    /// Per-position maximum across the group.
    #[must_use]
    pub fn white(&self) -> &RgbImage {
        &self.white
    }
}

/// Options controlling background estimation.
#[derive(Debug, Clone)]
pub struct EstimatorOptions {
    /// Minimum number of pages a group needs.
    pub min_samples: usize,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

/// Running per-position minimum and maximum.
struct Extremes {
    black: RgbImage,
    white: RgbImage,
}

impl Extremes {
    fn from_region(region: RgbImage) -> Self {
        Self {
            black: region.clone(),
            white: region,
        }
    }

    fn absorb(&mut self, region: &RgbImage) {
        for ((b, w), &v) in self
            .black
            .iter_mut()
            .zip(self.white.iter_mut())
            .zip(region.iter())
        {
            *b = (*b).min(v);
            *w = (*w).max(v);
        }
    }

    fn merge(&mut self, other: &Self) {
        for (b, &o) in self.black.iter_mut().zip(other.black.iter()) {
            *b = (*b).min(o);
        }
        for (w, &o) in self.white.iter_mut().zip(other.white.iter()) {
            *w = (*w).max(o);
        }
    }
}

/// Decode one page and cut out the analysed region.
fn load_region(path: &Path, dimensions: Dimensions, rect: Rect) -> Result<RgbImage> {
    let pixels = codec::decode_image(path)?.pixels;
    let actual = Dimensions::of(&pixels);
    if actual != dimensions {
        return Err(Error::DimensionMismatch {
            path: path.to_path_buf(),
            expected: dimensions,
            actual,
        });
    }
    debug!("sampled {}", path.display());

    if rect.is_full(dimensions) {
        Ok(pixels)
    } else {
        Ok(imageops::crop_imm(&pixels, rect.left, rect.top, rect.width(), rect.height()).to_image())
    }
}

/// Estimate the black and white backgrounds of a dimension group.
///
/// Every page in `paths` is decoded (in parallel) and must be exactly
/// `dimensions` in size. When `rect` is given only that region is analysed and
/// the composites have the rectangle's size.
///
/// # Errors
///
/// - [`Error::InvalidRect`] if `rect` is empty or does not fit `dimensions`.
/// - [`Error::InsufficientSamples`] if fewer than `options.min_samples` paths
///   are given.
/// - [`Error::Decode`] or [`Error::DimensionMismatch`] naming the first bad
///   page found; no composites are produced in that case.
pub fn estimate_background(
    paths: &[PathBuf],
    dimensions: Dimensions,
    rect: Option<Rect>,
    options: &EstimatorOptions,
) -> Result<BackgroundPair> {
    let rect = rect.unwrap_or_else(|| Rect::full(dimensions));
    rect.validate(dimensions)?;

    let required = options.min_samples.max(1);
    if paths.len() < required {
        return Err(Error::InsufficientSamples {
            dimensions,
            found: paths.len(),
            required,
        });
    }

    info!(
        "estimating background for {dimensions} from {} pages, rect {rect}",
        paths.len()
    );

    let extremes = paths
        .par_iter()
        .map(|path| load_region(path, dimensions, rect))
        .try_fold(
            || None,
            |acc: Option<Extremes>, region| {
                let region = region?;
                Ok::<_, Error>(Some(match acc {
                    Some(mut extremes) => {
                        extremes.absorb(&region);
                        extremes
                    }
                    None => Extremes::from_region(region),
                }))
            },
        )
        .try_reduce(
            || None,
            |a, b| {
                Ok(match (a, b) {
                    (Some(mut a), Some(b)) => {
                        a.merge(&b);
                        Some(a)
                    }
                    (a, None) => a,
                    (None, b) => b,
                })
            },
        )?;

    let Some(Extremes { black, white }) = extremes else {
        return Err(Error::InsufficientSamples {
            dimensions,
            found: 0,
            required,
        });
    };

    info!("background for {dimensions} estimated");
    BackgroundPair::new(dimensions, rect, black, white)
}
