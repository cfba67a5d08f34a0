//! Error types for the manga-watermark-removal crate.

use std::path::PathBuf;

use crate::background::Rect;
use crate::codec::Dimensions;

/// Errors that can occur while scanning, estimating backgrounds, or removing watermarks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The given path does not exist.
    #[error("path `{}` does not exist", .0.display())]
    NotFound(PathBuf),

    /// The given path exists but is not a directory.
    #[error("path `{}` is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// An image could not be read or decoded.
    #[error("failed to decode `{}`: {source}", path.display())]
    Decode {
        /// The offending file.
        path: PathBuf,
        /// Underlying decoder error.
        source: image::ImageError,
    },

    /// A decoded image does not have the size it was expected to have.
    #[error("`{}` is {actual}, expected {expected}", path.display())]
    DimensionMismatch {
        /// The offending file.
        path: PathBuf,
        /// Size the image was expected to have.
        expected: Dimensions,
        /// Size the image actually has.
        actual: Dimensions,
    },

    /// Too few images share the group's dimensions to estimate a background.
    #[error("{found} images of size {dimensions} found, at least {required} are required")]
    InsufficientSamples {
        /// The group's dimensions.
        dimensions: Dimensions,
        /// Number of member images found.
        found: usize,
        /// Minimum number of member images required.
        required: usize,
    },

    /// A selection rectangle is empty or does not fit inside the image.
    #[error("rect {rect} is empty or outside of {dimensions}")]
    InvalidRect {
        /// The rejected rectangle.
        rect: Rect,
        /// Size of the image the rectangle was applied to.
        dimensions: Dimensions,
    },

    /// No background pair was supplied for an image's dimensions.
    #[error("no background pair for dimensions {0}")]
    NoBackgroundPair(Dimensions),

    /// Encoding the recovered image failed.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// Writing an output file or directory failed.
    #[error("failed to write `{}`: {source}", path.display())]
    Write {
        /// The destination that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The output settings of a removal run are unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be parsed or serialized.
    #[error("config file `{}`: {source}", path.display())]
    Config {
        /// Location of the configuration file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred during image processing.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
