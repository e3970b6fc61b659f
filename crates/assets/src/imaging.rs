//! Image decoding and downsampling.
//!
//! Images larger than the configured bounds are scaled down, preserving the
//! aspect ratio, before they are persisted. JPEG output uses the configured
//! quality; other formats are re-encoded losslessly.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::error::AssetError;
use crate::metadata::Dimensions;

/// Default maximum width of stored images.
pub const DEFAULT_MAX_IMAGE_WIDTH: u32 = 2560;

/// Default maximum height of stored images.
pub const DEFAULT_MAX_IMAGE_HEIGHT: u32 = 1440;

/// Default JPEG re-encode quality (0-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Result of [`process_image`].
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    /// May differ from the input when the format cannot be re-encoded as-is.
    pub mime_type: String,
    pub dimensions: Dimensions,
    pub resized: bool,
}

/// Largest size that fits within `max_width` x `max_height` while keeping
/// the aspect ratio. Sizes already within bounds are returned unchanged.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    (w, h)
}

/// Decode `bytes`, downsample if needed and return the bytes to persist.
///
/// CPU-bound; callers on the async runtime should run it via
/// `spawn_blocking`.
pub fn process_image(
    bytes: Vec<u8>,
    mime_type: &str,
    max_width: u32,
    max_height: u32,
    jpeg_quality: u8,
) -> Result<ProcessedImage, AssetError> {
    let format = ImageFormat::from_mime_type(mime_type)
        .or_else(|| image::guess_format(&bytes).ok())
        .ok_or_else(|| AssetError::Decode(format!("unrecognised image format {mime_type}")))?;

    let img = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| AssetError::Decode(e.to_string()))?;
    let (width, height) = (img.width(), img.height());
    let (target_w, target_h) = fit_within(width, height, max_width, max_height);

    if (target_w, target_h) == (width, height) {
        return Ok(ProcessedImage {
            bytes,
            mime_type: mime_type.to_string(),
            dimensions: Dimensions { width, height },
            resized: false,
        });
    }

    let resized = img.resize_exact(target_w, target_h, FilterType::Lanczos3);
    let (bytes, mime_type) = encode(&resized, format, jpeg_quality)?;

    tracing::debug!(
        from_width = width,
        from_height = height,
        to_width = target_w,
        to_height = target_h,
        mime_type = %mime_type,
        "Image downsampled",
    );

    Ok(ProcessedImage {
        bytes,
        mime_type,
        dimensions: Dimensions {
            width: target_w,
            height: target_h,
        },
        resized: true,
    })
}

fn encode(
    img: &DynamicImage,
    format: ImageFormat,
    jpeg_quality: u8,
) -> Result<(Vec<u8>, String), AssetError> {
    let mut out = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, jpeg_quality))
                .map(|()| "image/jpeg")
        }
        ImageFormat::WebP => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut out))
                .map(|()| "image/webp")
        }
        // PNG, and formats without a suitable still encoder (GIF), become PNG.
        _ => img
            .write_with_encoder(PngEncoder::new(&mut out))
            .map(|()| "image/png"),
    };
    let mime_type = result.map_err(|e| AssetError::Decode(e.to_string()))?;
    Ok((out, mime_type.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
