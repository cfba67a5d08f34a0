//! Alpha blending math for watermark removal.
//!
//! Pages are watermarked via forward alpha blending:
//! `watermarked = alpha * overlay + (1 - alpha) * original`
//!
//! With the black background `b` (the `original = 0` case) and the white
//! background `w` (the `original = 255` case) at a position:
//!
//! - `b = alpha * overlay`
//! - `w - b = 255 * (1 - alpha)`
//!
//! so `original = (watermarked - b) / ((w - b) / 255)`.

use image::RgbImage;

use crate::background::BackgroundPair;
use crate::codec::Dimensions;
use crate::error::{Error, Result};

/// Largest channel value.
const MAX_INTENSITY: f32 = 255.0;

/// Minimum transmission `1 - alpha`: clamp to avoid division by near-zero.
const MIN_TRANSMISSION: f32 = 0.01;

/// Recover one channel value from its observed value and the two backgrounds.
///
/// Positions where `white == black` carry no information about the page and
/// are returned unchanged.
#[must_use]
pub fn recover_channel(observed: u8, black: u8, white: u8) -> u8 {
    if white <= black {
        return observed;
    }

    let transmission = (f32::from(white - black) / MAX_INTENSITY).max(MIN_TRANSMISSION);
    let original = (f32::from(observed) - f32::from(black)) / transmission;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        original.round().clamp(0.0, MAX_INTENSITY) as u8
    }
}

/// Remove the watermark described by `pair` from `image` in-place.
///
/// Only pixels inside the pair's rect are touched.
///
/// # Errors
///
/// Returns [`Error::NoBackgroundPair`] if `image` is not the size the pair
/// was estimated for.
pub fn remove_watermark(image: &mut RgbImage, pair: &BackgroundPair) -> Result<()> {
    let dimensions = Dimensions::of(image);
    if dimensions != pair.dimensions() {
        return Err(Error::NoBackgroundPair(dimensions));
    }

    let rect = pair.rect();
    let (black, white) = (pair.black(), pair.white());

    for dy in 0..rect.height() {
        for dx in 0..rect.width() {
            let b = black.get_pixel(dx, dy);
            let w = white.get_pixel(dx, dy);
            let px = image.get_pixel_mut(rect.left + dx, rect.top + dy);
            for ch in 0..3 {
                px[ch] = recover_channel(px[ch], b[ch], w[ch]);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::background::Rect;

    fn forward_blend(original: u8, alpha: f32, overlay: f32) -> u8 {
        let v = alpha * overlay + (1.0 - alpha) * f32::from(original);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            v.round().clamp(0.0, 255.0) as u8
        }
    }

    #[test]
    fn equal_backgrounds_leave_pixel_unchanged() {
        for v in [0u8, 1, 77, 128, 254, 255] {
            assert_eq!(recover_channel(v, 90, 90), v);
            assert_eq!(recover_channel(v, 0, 0), v);
            assert_eq!(recover_channel(v, 255, 255), v);
        }
    }

    #[test]
    fn tiny_span_does_not_explode() {
        assert_eq!(recover_channel(255, 100, 101), 255);
        assert_eq!(recover_channel(0, 100, 101), 0);
        assert_eq!(recover_channel(100, 100, 101), 0);
    }

    #[test]
    fn unwatermarked_positions_are_identity() {
        for v in 0..=255u8 {
            assert_eq!(recover_channel(v, 0, 255), v);
        }
    }

    #[test]
    fn reverse_blend_recovers_original_within_tolerance() {
        for (alpha, overlay) in [(0.3f32, 200.0f32), (0.5, 255.0), (0.2, 0.0), (0.7, 128.0)] {
            let black = forward_blend(0, alpha, overlay);
            let white = forward_blend(255, alpha, overlay);
            for original in (0..=255u8).step_by(5) {
                let watermarked = forward_blend(original, alpha, overlay);
                let restored = recover_channel(watermarked, black, white);
                let diff = (i32::from(restored) - i32::from(original)).abs();
                let tolerance = if alpha > 0.6 { 4 } else { 2 };
                assert!(
                    diff <= tolerance,
                    "alpha {alpha} overlay {overlay}: original {original} restored {restored}"
                );
            }
        }
    }

    #[test]
    fn remove_watermark_only_touches_rect() {
        let dims = Dimensions::new(6, 4);
        let rect = Rect::new(2, 1, 4, 3);
        let pair = BackgroundPair::new(
            dims,
            rect,
            RgbImage::from_pixel(2, 2, Rgb([100, 100, 100])),
            RgbImage::from_pixel(2, 2, Rgb([200, 200, 200])),
        )
        .unwrap();

        let mut img = RgbImage::from_pixel(6, 4, Rgb([160, 160, 160]));
        remove_watermark(&mut img, &pair).unwrap();

        for (x, y, px) in img.enumerate_pixels() {
            let inside = (2..4).contains(&x) && (1..3).contains(&y);
            let expected = if inside { 153 } else { 160 };
            assert_eq!(px, &Rgb([expected; 3]), "pixel ({x},{y})");
        }
    }

    #[test]
    fn remove_watermark_rejects_wrong_size() {
        let dims = Dimensions::new(4, 4);
        let pair = BackgroundPair::new(
            dims,
            Rect::full(dims),
            RgbImage::new(4, 4),
            RgbImage::new(4, 4),
        )
        .unwrap();
        let mut img = RgbImage::new(5, 4);
        assert!(matches!(
            remove_watermark(&mut img, &pair),
            Err(Error::NoBackgroundPair(d)) if d == Dimensions::new(5, 4)
        ));
    }
}
