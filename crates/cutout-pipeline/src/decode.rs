//! Image decoding and encoding at the edge of the pipeline.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces an RGBA
//! raster; the matte stages never see encoded data. [`encode_png`] is
//! the inverse used by hosts that want bytes back.

use crate::types::{PipelineError, RgbaImage};

/// Decode raw image bytes into an RGBA raster.
///
/// Supports whatever the `image` crate can decode with the enabled
/// features. Images without an alpha channel come back fully opaque.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt. No partial raster is returned.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Encode an RGBA raster as PNG bytes.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if the encoder fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgba8,
    )
    .map_err(PipelineError::ImageEncode)?;
    Ok(buf)
}
