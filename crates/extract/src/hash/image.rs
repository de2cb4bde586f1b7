//! Perceptual hashing of covers and inline images.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::imageops::FilterType;
use tracing::instrument;

/// Width and height of the thumbnail the gradient is measured on. One extra
/// column gives eight horizontal differences per row.
const THUMBNAIL_WIDTH: u32 = 9;
const THUMBNAIL_HEIGHT: u32 = 8;

/// Computes a 64-bit perceptual hash from raw image bytes.
///
/// Visually similar images must produce hashes with a small Hamming distance.
pub trait PerceptualHasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> Result<u64>;
}

/// Difference hash ("dHash").
///
/// The image is shrunk to a 9x8 greyscale thumbnail and each bit records
/// whether a pixel is brighter than its right-hand neighbour. Robust against
/// re-compression, scaling and small colour shifts.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientHasher;

impl PerceptualHasher for GradientHasher {
    #[instrument(level = "trace", skip_all, fields(size = bytes.len()))]
    fn hash(&self, bytes: &[u8]) -> Result<u64> {
        let decoded = image::load_from_memory(bytes).or_raise(|| ErrorKind::InvalidImage)?;
        let thumbnail = decoded.resize_exact(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, FilterType::Triangle).into_luma8();
        let mut hash = 0u64;
        for y in 0..THUMBNAIL_HEIGHT {
            for x in 0..THUMBNAIL_WIDTH - 1 {
                let left = thumbnail.get_pixel(x, y)[0];
                let right = thumbnail.get_pixel(x + 1, y)[0];
                hash = (hash << 1) | u64::from(left > right);
            }
        }
        Ok(hash)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::hamming_distance;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    /// PNG bytes of a horizontal gradient, optionally mirrored.
    pub(crate) fn gradient_png(width: u32, height: u32, descending: bool) -> Vec<u8> {
        let image = GrayImage::from_fn(width, height, |x, _| {
            let value = (x * 255 / (width - 1)) as u8;
            Luma([if descending { 255 - value } else { value }])
        });
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn ascending_gradient_has_no_bits() {
        assert_eq!(GradientHasher.hash(&gradient_png(90, 80, false)).unwrap(), 0);
    }

    #[test]
    fn mirrored_gradient_is_maximally_distant() {
        let ascending = GradientHasher.hash(&gradient_png(90, 80, false)).unwrap();
        let descending = GradientHasher.hash(&gradient_png(90, 80, true)).unwrap();
        assert_eq!(hamming_distance(ascending, descending), 64);
    }

    #[test]
    fn rescaled_image_is_close() {
        let small = GradientHasher.hash(&gradient_png(90, 80, true)).unwrap();
        let large = GradientHasher.hash(&gradient_png(450, 400, true)).unwrap();
        assert!(hamming_distance(small, large) <= 16);
    }

    #[test]
    fn garbage_is_an_invalid_image() {
        let err = GradientHasher.hash(b"not an image").unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidImage);
    }
}
