//! Category-mask compositing: turn a segmentation mask into alpha.
//!
//! A segmentation model hands back a [`CategoryMask`], usually at a lower
//! resolution than the image. This module grows the object region
//! ([`dilate`]), computes a distance-based alpha ramp around it
//! ([`feathered_alpha`]) and writes the result into the alpha channel of
//! the full-resolution image ([`composite_mask`]). RGB is never altered.
//!
//! Dilation and feathering are independent toggles in [`MaskConfig`]:
//! either, both, or neither may be applied.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use serde::{Deserialize, Serialize};

use crate::types::{CategoryMask, PipelineError, RgbaImage};

/// What the selected object becomes in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskMode {
    /// Keep the object and make the background transparent (a cutout).
    #[default]
    KeepObject,
    /// Make the object transparent and keep the background (an eraser).
    EraseObject,
}

/// Parameters for [`composite_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Number of 8-connected dilation passes applied to the object
    /// region before compositing. `0` disables dilation.
    pub dilation: u32,

    /// Feather radius in mask cells. `None` (or `Some(0)`) composites
    /// the binary mask with hard edges.
    pub feather: Option<u32>,

    /// Whether the object is kept or erased.
    pub mode: MaskMode,
}

impl MaskConfig {
    /// Upper bound on dilation passes.
    pub const MAX_DILATION: u32 = 64;

    /// Upper bound on the feather radius.
    pub const MAX_FEATHER_RADIUS: u32 = 64;

    /// Return a copy with out-of-range values clamped.
    ///
    /// `Some(0)` feathering is normalized to `None`.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        if self.dilation > Self::MAX_DILATION {
            tracing::warn!(
                dilation = self.dilation,
                max = Self::MAX_DILATION,
                "clamping mask dilation"
            );
        }
        let feather = match self.feather {
            Some(0) | None => None,
            Some(r) if r > Self::MAX_FEATHER_RADIUS => {
                tracing::warn!(
                    radius = r,
                    max = Self::MAX_FEATHER_RADIUS,
                    "clamping feather radius"
                );
                Some(Self::MAX_FEATHER_RADIUS)
            }
            Some(r) => Some(r),
        };
        Self {
            dilation: self.dilation.min(Self::MAX_DILATION),
            feather,
            mode: self.mode,
        }
    }
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            dilation: 0,
            feather: None,
            mode: MaskMode::KeepObject,
        }
    }
}

/// Grow the object region by `iterations` 8-connected dilation passes.
///
/// Each pass reads a full copy of the previous result, so growth does
/// not depend on scan order. Background cells absorbed by the object
/// take the [`CategoryMask::OBJECT`] label; all other cells keep their
/// original label. Zero iterations return an equal mask.
#[must_use = "returns the dilated mask"]
pub fn dilate(mask: &CategoryMask, iterations: u32) -> CategoryMask {
    if iterations == 0 {
        return mask.clone();
    }

    let mut objects = object_image(mask);
    for _ in 0..iterations {
        objects = imageproc::morphology::dilate(&objects, Norm::LInf, 1);
    }

    let labels = mask
        .labels()
        .iter()
        .zip(objects.as_raw())
        .map(|(&label, &grown)| {
            if grown > 0 {
                CategoryMask::OBJECT
            } else {
                label
            }
        })
        .collect();

    mask.with_labels(labels)
}

/// Object cells as white (255) on black, the polarity `imageproc`'s
/// morphology operators grow.
fn object_image(mask: &CategoryMask) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        image::Luma([if mask.is_object(x, y) { 255 } else { 0 }])
    })
}

/// Alpha for the mask cell at `(x, y)` from its distance to the object.
///
/// Searches the square window of half-width `radius` around the cell for
/// the nearest object cell and returns `floor(255 * min(d, radius) /
/// radius)`: 0 on the object itself, a linear ramp across the window,
/// and 255 when no object cell lies within the window. A zero radius
/// degenerates to the binary mask (0 on the object, 255 elsewhere).
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn feathered_alpha(mask: &CategoryMask, x: u32, y: u32, radius: u32) -> u8 {
    if radius == 0 {
        return if mask.is_object(x, y) { 0 } else { 255 };
    }

    let r = i64::from(radius);
    let (cx, cy) = (i64::from(x), i64::from(y));
    let (w, h) = (i64::from(mask.width()), i64::from(mask.height()));

    let mut nearest_sq: Option<i64> = None;
    for ny in (cy - r).max(0)..=(cy + r).min(h - 1) {
        for nx in (cx - r).max(0)..=(cx + r).min(w - 1) {
            // Both coordinates are inside the grid here.
            if !mask.is_object(nx as u32, ny as u32) {
                continue;
            }
            let d_sq = (nx - cx).pow(2) + (ny - cy).pow(2);
            if nearest_sq.is_none_or(|best| d_sq < best) {
                nearest_sq = Some(d_sq);
            }
        }
    }

    let Some(d_sq) = nearest_sq else {
        return 255;
    };
    let radius = f64::from(radius);
    let distance = (d_sq as f64).sqrt().min(radius);
    (255.0 * distance / radius).floor() as u8
}

/// [`feathered_alpha`] for every cell of the mask, as a grayscale image.
#[must_use = "returns the feather map"]
pub fn feather_map(mask: &CategoryMask, radius: u32) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        image::Luma([feathered_alpha(mask, x, y, radius)])
    })
}

/// Write a category mask into the alpha channel of `image`.
///
/// The mask is dilated first (if configured), then every
/// full-resolution pixel is mapped onto its mask cell by proportional
/// nearest-neighbour lookup and its alpha is set from that cell:
///
/// | mode          | object cell | background cell, hard | background cell, feathered |
/// |---------------|-------------|-----------------------|----------------------------|
/// | `KeepObject`  | 255         | 0                     | `255 - feathered_alpha`    |
/// | `EraseObject` | 0           | 255                   | `feathered_alpha`          |
///
/// Mask and image resolutions may differ freely. RGB is never altered.
#[must_use = "returns the composited image"]
#[tracing::instrument(skip_all, fields(
    width = image.width(),
    height = image.height(),
    mask_width = mask.width(),
    mask_height = mask.height(),
))]
pub fn composite_mask(mut image: RgbaImage, mask: &CategoryMask, config: &MaskConfig) -> RgbaImage {
    let config = config.sanitized();
    let mask = dilate(mask, config.dilation);

    // Alpha per mask cell, computed once and then sampled per pixel.
    let erase_alpha = feather_map(&mask, config.feather.unwrap_or(0));
    let cell_alpha = |mx: u32, my: u32| -> u8 {
        let erase = erase_alpha.get_pixel(mx, my).0[0];
        match config.mode {
            MaskMode::EraseObject => erase,
            MaskMode::KeepObject => 255 - erase,
        }
    };

    let (w, h) = image.dimensions();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (mx, my) = mask.map_coords(x, y, w, h);
        pixel.0[3] = cell_alpha(mx, my);
    }

    tracing::debug!(
        dilation = config.dilation,
        feather = ?config.feather,
        mode = ?config.mode,
        object_cells = mask.object_count(),
        "composited category mask"
    );
    image
}

/// Where the user pointed when asking for a segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionOfInterest {
    /// A single click, in image pixel coordinates.
    Point {
        /// Horizontal position.
        x: u32,
        /// Vertical position.
        y: u32,
    },
    /// A bounding box, in image pixel coordinates.
    Rect {
        /// Left edge.
        x: u32,
        /// Top edge.
        y: u32,
        /// Box width.
        width: u32,
        /// Box height.
        height: u32,
    },
}

/// Capability interface for the segmentation model.
///
/// Implementations may run any model at any resolution; the pipeline
/// only consumes the returned label grid and its dimensions.
pub trait Segmenter {
    /// Produce a category mask selecting the object at `roi`.
    ///
    /// # Errors
    ///
    /// Implementations report model failures as
    /// [`PipelineError::Segmentation`].
    fn segment(
        &self,
        image: &RgbaImage,
        roi: RegionOfInterest,
    ) -> Result<CategoryMask, PipelineError>;
}

/// Segment `image` at `roi` and composite the resulting mask.
///
/// The mask is consumed here and dropped afterwards.
///
/// # Errors
///
/// Propagates any error returned by the segmenter; the image is not
/// returned in that case.
pub fn cutout_with<S: Segmenter + ?Sized>(
    segmenter: &S,
    image: RgbaImage,
    roi: RegionOfInterest,
    config: &MaskConfig,
) -> Result<RgbaImage, PipelineError> {
    let mask = segmenter.segment(&image, roi)?;
    Ok(composite_mask(image, &mask, config))
}
