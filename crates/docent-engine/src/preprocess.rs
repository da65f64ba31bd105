//! Image preprocessing before provider upload.
//!
//! Scanned drawings and photographed datasheets extract noticeably
//! better after a contrast boost and a sharpening pass. Preprocessing
//! is best-effort: any decode or encode failure falls back to the
//! original bytes.

use std::io::Cursor;

use tracing::{debug, warn};

/// MIME types routed through the preprocessor before upload.
const IMAGE_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/bmp",
    "image/tiff",
    "image/webp",
];

/// MIME type of successfully preprocessed output.
pub const PROCESSED_MIME: &str = "image/png";

/// True when a MIME type identifies preprocessable raster content.
pub fn is_image_mime(mime_type: &str) -> bool {
    IMAGE_MIME_TYPES.contains(&mime_type)
}

/// Pre-upload image enhancement seam.
pub trait ImagePreprocessor: Send + Sync {
    /// Enhance image bytes for downstream extraction.
    ///
    /// `Some` carries PNG-encoded output ([`PROCESSED_MIME`]); `None`
    /// tells the caller to upload the original bytes unchanged.
    fn process(&self, bytes: &[u8]) -> Option<Vec<u8>>;
}

/// Contrast boost plus unsharp-mask sharpening, re-encoded as PNG.
pub struct ContrastSharpen {
    /// Contrast adjustment in percent (positive increases contrast).
    pub contrast: f32,
    /// Unsharp-mask blur radius.
    pub sharpen_sigma: f32,
    /// Unsharp-mask threshold.
    pub sharpen_threshold: i32,
}

impl Default for ContrastSharpen {
    fn default() -> Self {
        Self {
            contrast: 50.0,
            sharpen_sigma: 1.0,
            sharpen_threshold: 2,
        }
    }
}

impl ContrastSharpen {
    fn try_process(&self, bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        let img = image::DynamicImage::ImageRgb8(img.to_rgb8())
            .adjust_contrast(self.contrast)
            .unsharpen(self.sharpen_sigma, self.sharpen_threshold);

        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;
        Ok(out)
    }
}

impl ImagePreprocessor for ContrastSharpen {
    fn process(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        match self.try_process(bytes) {
            Ok(processed) => {
                debug!(
                    original_bytes = bytes.len(),
                    processed_bytes = processed.len(),
                    "Image enhanced for upload"
                );
                Some(processed)
            }
            Err(e) => {
                warn!(error = %e, "Image preprocessing failed; uploading original bytes");
                None
            }
        }
    }
}

/// No-op preprocessor for tests and hosts that upload raw bytes.
pub struct Passthrough;

impl ImagePreprocessor for Passthrough {
    fn process(&self, _bytes: &[u8]) -> Option<Vec<u8>> {
        None
    }
}
