//! Image decoding and encoding.
//!
//! Everything is normalised to 8-bit RGB on decode. Output is either JPEG or
//! PNG; PNG output can be run through a lossless `oxipng` pass.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// JPEG quality used for recovered pages.
const JPEG_QUALITY: u8 = 95;

/// oxipng preset used when `optimize` is requested.
const OXIPNG_PRESET: u8 = 2;

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new pair of dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an in-memory image.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self::new(image.width(), image.height())
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Size and location of an image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Location of the file.
    pub path: PathBuf,
}

impl ImageInfo {
    /// The image's dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// A decoded RGB image together with its [`ImageInfo`].
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Where the pixels came from.
    pub info: ImageInfo,
    /// Decoded pixels, 3 channels per pixel, row-major.
    pub pixels: RgbImage,
}

/// An image file's original bytes, base64-encoded, for previewing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    /// Size and location of the file.
    pub info: ImageInfo,
    /// The file's bytes in standard base64.
    pub base64: String,
}

/// Raster formats recovered pages can be written as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    /// Baseline JPEG.
    Jpeg,
    /// Lossless PNG.
    #[default]
    Png,
}

impl OutputFormat {
    /// File extension written for this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Read an image's dimensions from its header without decoding the pixels.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the header cannot be parsed, or if it
/// describes an image with a zero width or height.
pub fn read_image_info(path: &Path) -> Result<ImageInfo> {
    let (width, height) = image::image_dimensions(path).map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    if width == 0 || height == 0 {
        return Err(Error::Decode {
            path: path.to_path_buf(),
            source: image::ImageError::Limits(image::error::LimitError::from_kind(
                image::error::LimitErrorKind::DimensionError,
            )),
        });
    }

    Ok(ImageInfo {
        width,
        height,
        path: path.to_path_buf(),
    })
}

/// Fully decode an image file to 8-bit RGB.
///
/// # Errors
///
/// Returns [`Error::Decode`] naming the file if it cannot be opened or decoded.
pub fn decode_image(path: &Path) -> Result<ImageData> {
    let pixels = image::open(path)
        .map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();

    Ok(ImageData {
        info: ImageInfo {
            width: pixels.width(),
            height: pixels.height(),
            path: path.to_path_buf(),
        },
        pixels,
    })
}

/// Encode an RGB image into `format`.
///
/// With `optimize` set, PNG output is recompressed losslessly with oxipng.
/// JPEG output is unaffected by `optimize`.
///
/// # Errors
///
/// Returns [`Error::Encode`] if encoding or optimization fails.
pub fn encode_image(img: &RgbImage, format: OutputFormat, optimize: bool) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            encoder
                .encode_image(img)
                .map_err(|e| Error::Encode(e.to_string()))?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .map_err(|e| Error::Encode(e.to_string()))?;
            if optimize {
                buf = optimize_png(&buf)?;
            }
        }
    }

    Ok(buf)
}

fn optimize_png(png_data: &[u8]) -> Result<Vec<u8>> {
    let mut options = oxipng::Options::from_preset(OXIPNG_PRESET);
    options.strip = oxipng::StripChunks::Safe;

    let optimized = oxipng::optimize_from_memory(png_data, &options)
        .map_err(|e| Error::Encode(format!("failed to optimize PNG: {e}")))?;
    debug!(
        before = png_data.len(),
        after = optimized.len(),
        "optimized PNG"
    );
    Ok(optimized)
}

/// Encode `img` and write it to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`Error::Encode`] if encoding fails and [`Error::Write`] if the
/// file or its parent directory cannot be written.
pub fn save_image(img: &RgbImage, path: &Path, format: OutputFormat, optimize: bool) -> Result<()> {
    let bytes = encode_image(img, format, optimize)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    std::fs::write(path, bytes).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Load an image file for previewing.
///
/// The file is decoded once to make sure it is a valid image; the returned
/// payload carries the original bytes rather than a re-encoding.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if `path` does not exist and [`Error::Decode`]
/// if the file is not a decodable image.
pub fn open_image(path: &Path) -> Result<EncodedImage> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path)?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(EncodedImage {
        info: ImageInfo {
            width: decoded.width(),
            height: decoded.height(),
            path: path.to_path_buf(),
        },
        base64: STANDARD.encode(&bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        #[allow(clippy::cast_possible_truncation)]
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7) as u8, (y * 5) as u8, ((x + y) * 3) as u8])
        });
        img
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("page.jpg")));
        assert!(is_supported_image(Path::new("page.JPEG")));
        assert!(is_supported_image(Path::new("page.png")));
        assert!(is_supported_image(Path::new("page.webp")));
        assert!(is_supported_image(Path::new("page.bmp")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("page.gif")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("page")));
    }

    #[test]
    fn read_image_info_reports_header_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        gradient(30, 40).save(&path).unwrap();

        let info = read_image_info(&path).unwrap();
        assert_eq!(info.dimensions(), Dimensions::new(30, 40));
        assert_eq!(info.path, path);
    }

    #[test]
    fn read_image_info_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        assert!(matches!(read_image_info(&path), Err(Error::Decode { .. })));
    }

    #[test]
    fn png_encoding_is_lossless() {
        let img = gradient(16, 16);
        for optimize in [false, true] {
            let bytes = encode_image(&img, OutputFormat::Png, optimize).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
            assert_eq!(decoded, img);
        }
    }

    #[test]
    fn jpeg_encoding_produces_a_jpeg() {
        let img = gradient(16, 16);
        let bytes = encode_image(&img, OutputFormat::Jpeg, true).unwrap();
        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn save_image_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");
        save_image(&gradient(8, 8), &path, OutputFormat::Png, false).unwrap();
        assert_eq!(read_image_info(&path).unwrap().dimensions(), Dimensions::new(8, 8));
    }

    #[test]
    fn open_image_returns_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        gradient(12, 9).save(&path).unwrap();

        let opened = open_image(&path).unwrap();
        assert_eq!(opened.info.width, 12);
        assert_eq!(opened.info.height, 9);
        assert_eq!(
            STANDARD.decode(opened.base64).unwrap(),
            std::fs::read(&path).unwrap()
        );
    }

    #[test]
    fn open_image_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_image(&dir.path().join("missing.png"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn output_format_serializes_as_variant_name() {
        assert_eq!(serde_json::to_string(&OutputFormat::Jpeg).unwrap(), "\"Jpeg\"");
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
    }
}
