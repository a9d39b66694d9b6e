//! cutout-pipeline: Pure matte refinement pipeline (sans-IO).
//!
//! Turns a raw image into a clean cutout through:
//! decode -> matte (corner keying or category mask) -> optional edge
//! refinement (artifact cleanup -> smoothing -> feathering).
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and rasters. Segmentation models plug in through the
//! [`Segmenter`] trait; file handling lives in `cutout-cli`.

pub mod decode;
pub mod keyer;
pub mod mask;
pub mod refine;
pub mod types;

pub use keyer::KeyerConfig;
pub use mask::{MaskConfig, MaskMode, RegionOfInterest, Segmenter};
pub use refine::RefineConfig;
pub use types::{
    CategoryMask, Color3, CutoutConfig, GrayImage, PipelineError, RasterImage, RgbaImage,
    raster_from_raw,
};

/// Where the alpha matte of a cutout comes from.
#[derive(Debug, Clone, Copy)]
pub enum MatteSource<'a> {
    /// Estimate a flat background from the corners and key it out.
    Keyed,
    /// Composite a category mask supplied by a segmentation model.
    Mask(&'a CategoryMask),
    /// Keep the alpha channel the image already has.
    Existing,
}

/// Run the full matte pipeline on encoded image bytes.
///
/// # Pipeline steps
///
/// 1. Decode image to RGBA
/// 2. Produce the matte from `source` (keying, mask, or existing alpha)
/// 3. Optional three-pass edge refinement (`config.refine_edges`)
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
#[tracing::instrument(skip_all, fields(bytes = image_bytes.len()))]
pub fn process(
    image_bytes: &[u8],
    source: MatteSource<'_>,
    config: &CutoutConfig,
) -> Result<RgbaImage, PipelineError> {
    // 1. Decode.
    let image = decode::decode_rgba(image_bytes)?;
    Ok(process_image(image, source, config))
}

/// [`process`] for an already decoded image.
#[must_use = "returns the cutout"]
pub fn process_image(image: RgbaImage, source: MatteSource<'_>, config: &CutoutConfig) -> RgbaImage {
    // 2. Matte.
    let matted = match source {
        MatteSource::Keyed => keyer::remove_background(image, &config.keyer),
        MatteSource::Mask(mask) => mask::composite_mask(image, mask, &config.mask),
        MatteSource::Existing => image,
    };

    // 3. Optional edge refinement.
    if config.refine_edges {
        refine::refine(matted, &config.refine)
    } else {
        matted
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A red disc-ish square on a flat light-gray backdrop.
    fn product_shot() -> RgbaImage {
        RgbaImage::from_fn(48, 48, |x, y| {
            if (16..32).contains(&x) && (16..32).contains(&y) {
                image::Rgba([210, 30, 30, 255])
            } else {
                image::Rgba([235, 235, 235, 255])
            }
        })
    }

    #[test]
    fn process_empty_input() {
        let result = process(&[], MatteSource::Keyed, &CutoutConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00], MatteSource::Keyed, &CutoutConfig::default());
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn keyed_cutout_keeps_subject() {
        let png = decode::encode_png(&product_shot()).unwrap();
        let out = process(&png, MatteSource::Keyed, &CutoutConfig::default()).unwrap();
        assert_eq!(out.dimensions(), (48, 48));
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
        assert_eq!(out.get_pixel(24, 24).0, [210, 30, 30, 255]);
    }

    #[test]
    fn mask_cutout_without_refinement_is_binary() {
        let mask = CategoryMask::from_fn(12, 12, |x, y| {
            u8::from(!((4..8).contains(&x) && (4..8).contains(&y)))
        })
        .unwrap();
        let config = CutoutConfig {
            refine_edges: false,
            ..CutoutConfig::default()
        };
        let out = process_image(product_shot(), MatteSource::Mask(&mask), &config);
        assert!(out.pixels().all(|p| p.0[3] == 0 || p.0[3] == 255));
        assert_eq!(out.get_pixel(20, 20).0[3], 255);
        assert_eq!(out.get_pixel(2, 2).0[3], 0);
    }

    #[test]
    fn existing_opaque_alpha_survives_refinement() {
        let img = product_shot();
        let out = process_image(img.clone(), MatteSource::Existing, &CutoutConfig::default());
        assert_eq!(out, img);
    }
}
