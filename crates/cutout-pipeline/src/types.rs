//! Shared types for the cutout matte pipeline.

use serde::{Deserialize, Serialize};

use crate::keyer::KeyerConfig;
use crate::mask::MaskConfig;
use crate::refine::RefineConfig;

/// Re-export `GrayImage` so downstream crates can build category masks
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can reference raster
/// data without depending on `image` directly.
pub use image::RgbaImage;

/// An owned RGBA raster: `width * height` pixels, four bytes each,
/// row-major with a top-left origin.
///
/// `image::RgbaImage` already guarantees `len == 4 * width * height`,
/// so the pipeline uses it directly.
pub type RasterImage = RgbaImage;

/// Build a [`RasterImage`] from raw RGBA bytes.
///
/// # Errors
///
/// Returns [`PipelineError::BufferSize`] if `bytes.len()` is not
/// `4 * width * height`.
pub fn raster_from_raw(width: u32, height: u32, bytes: Vec<u8>) -> Result<RasterImage, PipelineError> {
    let actual = bytes.len();
    RgbaImage::from_raw(width, height, bytes).ok_or(PipelineError::BufferSize {
        width,
        height,
        actual,
    })
}

/// An opaque RGB color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color3 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color3 {
    /// Create a new color.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// The RGB part of an RGBA pixel. Alpha is dropped.
    #[must_use]
    pub const fn from_rgba(pixel: &image::Rgba<u8>) -> Self {
        Self::new(pixel.0[0], pixel.0[1], pixel.0[2])
    }

    /// Euclidean distance in RGB space.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        dr.mul_add(dr, dg.mul_add(dg, db * db)).sqrt()
    }

    /// Manhattan (sum of absolute channel differences) distance.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.r.abs_diff(other.r) as u32
            + self.g.abs_diff(other.g) as u32
            + self.b.abs_diff(other.b) as u32
    }
}

/// Running per-channel sum used to average colors.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ColorSum {
    sum: [u64; 3],
    count: u64,
}

impl ColorSum {
    pub(crate) fn add(&mut self, color: Color3) {
        self.sum[0] += u64::from(color.r);
        self.sum[1] += u64::from(color.g);
        self.sum[2] += u64::from(color.b);
        self.count += 1;
    }

    pub(crate) const fn count(&self) -> u64 {
        self.count
    }

    /// Rounded mean, or `None` when nothing was added.
    pub(crate) fn mean(&self) -> Option<Color3> {
        if self.count == 0 {
            return None;
        }
        let channel = |s: u64| u8::try_from((s + self.count / 2) / self.count).unwrap_or(u8::MAX);
        Some(Color3::new(
            channel(self.sum[0]),
            channel(self.sum[1]),
            channel(self.sum[2]),
        ))
    }
}

/// A grid of discrete per-cell labels produced by a segmentation model.
///
/// The mask has its own resolution, usually lower than the image it is
/// applied to. Label [`CategoryMask::OBJECT`] marks the selected object;
/// every other label is background. Masks are resampled into image
/// coordinates by proportional nearest-neighbour lookup
/// ([`CategoryMask::map_coords`]) and never resized in place.
///
/// Deserialization runs the same checks as [`CategoryMask::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCategoryMask")]
pub struct CategoryMask {
    width: u32,
    height: u32,
    labels: Vec<u8>,
}

/// Unvalidated wire form of a [`CategoryMask`].
#[derive(Deserialize)]
struct RawCategoryMask {
    width: u32,
    height: u32,
    labels: Vec<u8>,
}

impl TryFrom<RawCategoryMask> for CategoryMask {
    type Error = PipelineError;

    fn try_from(raw: RawCategoryMask) -> Result<Self, Self::Error> {
        Self::new(raw.width, raw.height, raw.labels)
    }
}

impl CategoryMask {
    /// Label of the selected object.
    pub const OBJECT: u8 = 0;

    /// Conventional background label. Any non-[`OBJECT`](Self::OBJECT)
    /// label is treated as background.
    pub const BACKGROUND: u8 = 1;

    /// Create a mask from a row-major label buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidMask`] if either dimension is zero
    /// or `labels.len() != width * height`.
    pub fn new(width: u32, height: u32, labels: Vec<u8>) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidMask(format!(
                "mask dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize;
        if labels.len() != expected {
            return Err(PipelineError::InvalidMask(format!(
                "expected {expected} labels for {width}x{height}, got {}",
                labels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    /// Same grid as `self` with a replacement label buffer of equal
    /// length.
    pub(crate) fn with_labels(&self, labels: Vec<u8>) -> Self {
        debug_assert_eq!(labels.len(), self.labels.len());
        Self {
            width: self.width,
            height: self.height,
            labels,
        }
    }

    /// Create a mask by evaluating `f(x, y)` for every cell.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidMask`] if either dimension is zero.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> u8,
    ) -> Result<Self, PipelineError> {
        let mut labels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                labels.push(f(x, y));
            }
        }
        Self::new(width, height, labels)
    }

    /// Interpret a grayscale image as a label grid (luma value = label).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidMask`] for an empty image.
    pub fn from_gray(image: &GrayImage) -> Result<Self, PipelineError> {
        Self::new(image.width(), image.height(), image.as_raw().clone())
    }

    /// Render the labels as a grayscale image (label = luma value).
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([self.labels[self.index(x, y)]])
        })
    }

    /// Mask width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major label buffer.
    #[must_use]
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Label at `(x, y)`, or `None` outside the grid.
    #[must_use]
    pub fn label(&self, x: u32, y: u32) -> Option<u8> {
        (x < self.width && y < self.height).then(|| self.labels[self.index(x, y)])
    }

    /// Whether `(x, y)` is inside the grid and labelled as the object.
    #[must_use]
    pub fn is_object(&self, x: u32, y: u32) -> bool {
        self.label(x, y) == Some(Self::OBJECT)
    }

    /// Number of object cells.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == Self::OBJECT).count()
    }

    /// Map a pixel of a `target_width` x `target_height` image onto the
    /// mask cell covering it (proportional nearest-neighbour lookup).
    ///
    /// Works for any pair of resolutions; the result is always a valid
    /// cell coordinate.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn map_coords(&self, x: u32, y: u32, target_width: u32, target_height: u32) -> (u32, u32) {
        let scale = |v: u32, target: u32, cells: u32| -> u32 {
            if target == 0 {
                return 0;
            }
            // v < target implies the quotient is < cells, so it fits in u32.
            let mapped = (u64::from(v) * u64::from(cells) / u64::from(target)) as u32;
            mapped.min(cells - 1)
        };
        (
            scale(x, target_width, self.width),
            scale(y, target_height, self.height),
        )
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Configuration for every stage of the matte pipeline.
///
/// Each stage keeps its own parameters; missing sections fall back to
/// their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutoutConfig {
    /// Corner-sampled background keying.
    pub keyer: KeyerConfig,
    /// Category-mask compositing.
    pub mask: MaskConfig,
    /// Three-pass edge refinement.
    pub refine: RefineConfig,
    /// Whether [`crate::process`] runs edge refinement after the matte
    /// has been produced.
    pub refine_edges: bool,
}

impl Default for CutoutConfig {
    fn default() -> Self {
        Self {
            keyer: KeyerConfig::default(),
            mask: MaskConfig::default(),
            refine: RefineConfig::default(),
            refine_edges: true,
        }
    }
}

/// Errors that can occur during matte processing.
///
/// Mask/image resolution differences are never errors: masks are
/// remapped proportionally. Out-of-range parameters are clamped by the
/// stage configs rather than rejected.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Failed to encode an output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A raw RGBA buffer does not match its stated dimensions.
    #[error("RGBA buffer of {actual} bytes does not match {width}x{height}")]
    BufferSize {
        /// Stated width in pixels.
        width: u32,
        /// Stated height in pixels.
        height: u32,
        /// Actual buffer length in bytes.
        actual: usize,
    },

    /// A category mask is malformed.
    #[error("invalid category mask: {0}")]
    InvalidMask(String),

    /// The segmentation collaborator failed to produce a mask.
    #[error("segmentation failed: {0}")]
    Segmentation(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Color3 tests ---

    #[test]
    fn color_distance_is_euclidean() {
        let a = Color3::new(0, 0, 0);
        let b = Color3::new(3, 4, 0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn color_manhattan_sums_channels() {
        let a = Color3::new(10, 200, 30);
        let b = Color3::new(20, 190, 0);
        assert_eq!(a.manhattan(b), 10 + 10 + 30);
        assert_eq!(b.manhattan(a), 50);
    }

    #[test]
    fn color_sum_rounds_mean() {
        let mut sum = ColorSum::default();
        assert_eq!(sum.mean(), None);
        sum.add(Color3::new(0, 10, 255));
        sum.add(Color3::new(1, 11, 255));
        assert_eq!(sum.count(), 2);
        // (0 + 1) / 2 = 0.5 rounds up, (10 + 11) / 2 = 10.5 rounds up.
        assert_eq!(sum.mean(), Some(Color3::new(1, 11, 255)));
    }

    // --- raster_from_raw tests ---

    #[test]
    fn raster_from_raw_accepts_exact_length() {
        let img = raster_from_raw(2, 3, vec![0; 24]).unwrap();
        assert_eq!(img.dimensions(), (2, 3));
    }

    #[test]
    fn raster_from_raw_rejects_short_buffer() {
        let err = raster_from_raw(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BufferSize {
                width: 2,
                height: 2,
                actual: 15
            }
        ));
    }

    // --- CategoryMask tests ---

    #[test]
    fn mask_rejects_wrong_label_count() {
        let result = CategoryMask::new(3, 3, vec![0; 8]);
        assert!(matches!(result, Err(PipelineError::InvalidMask(_))));
    }

    #[test]
    fn mask_rejects_zero_dimensions() {
        let result = CategoryMask::new(0, 3, Vec::new());
        assert!(matches!(result, Err(PipelineError::InvalidMask(_))));
    }

    #[test]
    fn deserialized_mask_is_validated() {
        let short = serde_json::from_str::<CategoryMask>(r#"{"width":4,"height":4,"labels":[0,1]}"#);
        assert!(short.is_err(), "label count mismatch must not deserialize");
        let err = short.unwrap_err().to_string();
        assert!(err.contains("expected 16 labels"), "got {err}");

        let empty = serde_json::from_str::<CategoryMask>(r#"{"width":0,"height":0,"labels":[]}"#);
        assert!(empty.is_err(), "zero-sized mask must not deserialize");

        let ok: CategoryMask =
            serde_json::from_str(r#"{"width":2,"height":1,"labels":[0,1]}"#).unwrap();
        assert!(ok.is_object(0, 0));
        assert_eq!(serde_json::to_string(&ok).unwrap(), r#"{"width":2,"height":1,"labels":[0,1]}"#);
    }

    #[test]
    fn mask_lookup_and_bounds() {
        let mask = CategoryMask::from_fn(3, 2, |x, y| u8::from(x != 1 || y != 1)).unwrap();
        assert!(mask.is_object(1, 1));
        assert!(!mask.is_object(0, 0));
        assert!(!mask.is_object(5, 5));
        assert_eq!(mask.label(2, 1), Some(CategoryMask::BACKGROUND));
        assert_eq!(mask.label(3, 0), None);
        assert_eq!(mask.object_count(), 1);
    }

    #[test]
    fn mask_gray_conversion_preserves_labels() {
        let mask = CategoryMask::from_fn(4, 3, |x, y| u8::try_from(x + y).unwrap()).unwrap();
        let gray = mask.to_gray();
        assert_eq!(gray.get_pixel(3, 2).0[0], 5);
        assert_eq!(CategoryMask::from_gray(&gray).unwrap(), mask);
    }

    #[test]
    fn map_coords_scales_up_to_larger_image() {
        // 2x2 mask over an 8x8 image: each cell covers a 4x4 block.
        let mask = CategoryMask::new(2, 2, vec![0, 1, 1, 0]).unwrap();
        assert_eq!(mask.map_coords(0, 0, 8, 8), (0, 0));
        assert_eq!(mask.map_coords(3, 3, 8, 8), (0, 0));
        assert_eq!(mask.map_coords(4, 3, 8, 8), (1, 0));
        assert_eq!(mask.map_coords(7, 7, 8, 8), (1, 1));
    }

    #[test]
    fn map_coords_handles_non_integer_ratios() {
        let mask = CategoryMask::new(3, 1, vec![0, 1, 0]).unwrap();
        for x in 0..10 {
            let (mx, my) = mask.map_coords(x, 0, 10, 1);
            assert!(mx < 3, "x={x} mapped outside mask: {mx}");
            assert_eq!(my, 0);
        }
        assert_eq!(mask.map_coords(9, 0, 10, 1), (2, 0));
    }

    #[test]
    fn map_coords_scales_down_to_smaller_image() {
        let mask = CategoryMask::from_fn(10, 10, |_, _| 1).unwrap();
        assert_eq!(mask.map_coords(1, 1, 2, 2), (5, 5));
    }

    // --- Config / error tests ---

    #[test]
    fn cutout_config_fills_missing_sections() {
        let config: CutoutConfig =
            serde_json::from_str(r#"{ "keyer": { "tolerance": 12.5, "sample_size": 4 } }"#)
                .unwrap();
        assert!((config.keyer.tolerance - 12.5).abs() < f64::EPSILON);
        assert_eq!(config.keyer.sample_size, 4);
        assert_eq!(config.mask, MaskConfig::default());
        assert_eq!(config.refine, RefineConfig::default());
        assert!(config.refine_edges);
    }

    #[test]
    fn cutout_config_serde_round_trip() {
        let config = CutoutConfig {
            mask: MaskConfig {
                dilation: 2,
                feather: Some(4),
                ..MaskConfig::default()
            },
            ..CutoutConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: CutoutConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn error_display_messages() {
        assert_eq!(
            PipelineError::EmptyInput.to_string(),
            "input image data is empty"
        );
        assert_eq!(
            PipelineError::InvalidMask("bad".to_string()).to_string(),
            "invalid category mask: bad",
        );
        assert_eq!(
            PipelineError::Segmentation("timeout".to_string()).to_string(),
            "segmentation failed: timeout",
        );
    }
}
