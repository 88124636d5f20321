//! Region crop provider for the fallback path.
//!
//! Crops a fragment's box (plus padding) out of the page image and
//! re-encodes it as PNG for the math backend's cropped-region call.

use std::io::Cursor;

use image::ImageFormat;

use super::types::{RegionCropper, Rect};
use super::RecognitionError;

/// Reject absurdly large inputs before decoding.
/// Prevents OOM on corrupt files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Smallest plausible encoded image (a minimal PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Cropper backed by the image crate. Pads the requested rect by a fixed
/// pixel amount and clamps to image bounds.
pub struct PaddedCropper {
    padding_px: u32,
}

impl PaddedCropper {
    pub fn new(padding_px: u32) -> Self {
        Self { padding_px }
    }
}

impl RegionCropper for PaddedCropper {
    fn crop(&self, image_bytes: &[u8], rect: &Rect) -> Result<Vec<u8>, RecognitionError> {
        if image_bytes.len() > MAX_IMAGE_BYTES {
            return Err(RecognitionError::ImageProcessing(format!(
                "image too large: {} bytes",
                image_bytes.len()
            )));
        }
        if image_bytes.len() < MIN_IMAGE_BYTES {
            return Err(RecognitionError::ImageProcessing(
                "image too small to be valid".to_string(),
            ));
        }
        if !rect.is_valid() {
            return Err(RecognitionError::GeometryInvalid(format!(
                "cannot crop invalid rect {rect:?}"
            )));
        }

        let img = image::load_from_memory(image_bytes)
            .map_err(|e| RecognitionError::ImageProcessing(e.to_string()))?;

        let pad = self.padding_px as f64;
        let x = (rect.x - pad).max(0.0) as u32;
        let y = (rect.y - pad).max(0.0) as u32;
        let right = ((rect.x + rect.width + pad) as u32).min(img.width());
        let bottom = ((rect.y + rect.height + pad) as u32).min(img.height());

        if right <= x || bottom <= y {
            return Err(RecognitionError::GeometryInvalid(format!(
                "rect {rect:?} lies outside a {}x{} image",
                img.width(),
                img.height()
            )));
        }

        let cropped = img.crop_imm(x, y, right - x, bottom - y);
        let mut out = Vec::new();
        cropped
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|e| RecognitionError::ImageProcessing(e.to_string()))?;
        Ok(out)
    }
}
