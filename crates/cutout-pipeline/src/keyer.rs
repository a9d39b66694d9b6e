//! Background keying: estimate a uniform background color from the
//! image corners and make every pixel close to it transparent.
//!
//! Works well for product shots and generated images rendered on a flat
//! backdrop. Only the alpha channel is touched; RGB is left as-is so a
//! later refinement pass can still read the original colors.

use serde::{Deserialize, Serialize};

use crate::types::{Color3, ColorSum, PipelineError, RgbaImage};

/// Parameters for [`remove_background`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyerConfig {
    /// Pixels whose Euclidean RGB distance to the estimated background
    /// is strictly below this value become transparent.
    pub tolerance: f64,

    /// Side length of the square sampled at each corner. Clamped to the
    /// image size for small images.
    pub sample_size: u32,
}

impl KeyerConfig {
    /// Default color tolerance.
    pub const DEFAULT_TOLERANCE: f64 = 40.0;

    /// Default corner sample side length in pixels.
    pub const DEFAULT_SAMPLE_SIZE: u32 = 10;

    /// Largest meaningful tolerance: the RGB cube diagonal rounded up.
    /// Anything above keys every pixel just the same.
    pub const MAX_TOLERANCE: f64 = 442.0;

    /// Return a copy with out-of-range values replaced.
    ///
    /// Non-finite or negative tolerances fall back to
    /// [`DEFAULT_TOLERANCE`](Self::DEFAULT_TOLERANCE); larger than
    /// [`MAX_TOLERANCE`](Self::MAX_TOLERANCE) is capped. A zero sample
    /// size falls back to [`DEFAULT_SAMPLE_SIZE`](Self::DEFAULT_SAMPLE_SIZE).
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let tolerance = if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            tracing::warn!(
                tolerance = self.tolerance,
                "invalid keyer tolerance, using default"
            );
            Self::DEFAULT_TOLERANCE
        } else {
            self.tolerance.min(Self::MAX_TOLERANCE)
        };
        let sample_size = if self.sample_size == 0 {
            tracing::warn!("keyer sample size of 0, using default");
            Self::DEFAULT_SAMPLE_SIZE
        } else {
            self.sample_size
        };
        Self {
            tolerance,
            sample_size,
        }
    }
}

impl Default for KeyerConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            sample_size: Self::DEFAULT_SAMPLE_SIZE,
        }
    }
}

/// Estimate the background color by averaging the four corner squares.
///
/// Each corner contributes a `sample_size` x `sample_size` square,
/// clamped to the image bounds, so small images never read out of range
/// (the squares simply overlap). Alpha is ignored.
///
/// Returns `None` for an empty image.
#[must_use]
pub fn estimate_background(image: &RgbaImage, sample_size: u32) -> Option<Color3> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    let sw = sample_size.clamp(1, w);
    let sh = sample_size.clamp(1, h);
    let origins = [(0, 0), (w - sw, 0), (0, h - sh), (w - sw, h - sh)];

    let mut sum = ColorSum::default();
    for (ox, oy) in origins {
        for y in oy..oy + sh {
            for x in ox..ox + sw {
                sum.add(Color3::from_rgba(image.get_pixel(x, y)));
            }
        }
    }
    tracing::trace!(samples = sum.count(), "sampled background corners");
    sum.mean()
}

/// Make every pixel close to the estimated background transparent.
///
/// The output has the same dimensions as the input and differs only in
/// alpha. Pixels that are already fully transparent are skipped without
/// looking at their color, so keying twice never revives a pixel.
#[must_use = "returns the keyed image"]
#[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn remove_background(mut image: RgbaImage, config: &KeyerConfig) -> RgbaImage {
    let config = config.sanitized();
    let Some(background) = estimate_background(&image, config.sample_size) else {
        return image;
    };

    let mut keyed: u64 = 0;
    for pixel in image.pixels_mut() {
        if pixel.0[3] == 0 {
            continue;
        }
        if Color3::from_rgba(pixel).distance(background) < config.tolerance {
            pixel.0[3] = 0;
            keyed += 1;
        }
    }

    tracing::debug!(?background, tolerance = config.tolerance, keyed, "keyed background");
    image
}

/// Decode `bytes` and run [`remove_background`] on the result.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] or
/// [`PipelineError::ImageDecode`] when the bytes cannot be rasterized.
pub fn detect_and_remove_background(
    bytes: &[u8],
    config: &KeyerConfig,
) -> Result<RgbaImage, PipelineError> {
    let image = crate::decode::decode_rgba(bytes)?;
    Ok(remove_background(image, config))
}
