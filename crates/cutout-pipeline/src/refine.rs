//! Edge refinement: clean the fringe of an existing cutout.
//!
//! Segmentation and keying leave a ring of half-transparent pixels whose
//! colors still carry the old background. [`refine`] runs three passes
//! over the alpha matte, strictly in order:
//!
//! 1. [`remove_artifacts`]: recolor fringe pixels from their solid
//!    neighbours and drop near-invisible ones.
//! 2. [`smooth_translucent`]: distance-weighted average of translucent
//!    pixels with their neighbourhood.
//! 3. [`feather_alpha`]: fade alpha with distance from the solid core.
//!
//! Every pass reads a snapshot taken before the pass begins and writes
//! into the live buffer, so the result does not depend on scan order.

use serde::{Deserialize, Serialize};

use crate::types::{Color3, ColorSum, RgbaImage};

/// Alpha above which a non-edge neighbour counts as solid in pass 1.
pub const SOLID_NEIGHBOUR_ALPHA: u8 = 200;

/// Parameters for [`refine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Edge detection threshold. Pixels with alpha in
    /// `(0, 255 - threshold)` are edge pixels, and edge pixels with
    /// alpha below `threshold` are cleared.
    pub threshold: u8,

    /// Neighbourhood half-width for the smoothing pass. `0` makes the
    /// pass a no-op.
    pub smooth_radius: u32,

    /// Color tolerance for artifact removal. An edge pixel is recolored
    /// when its Manhattan distance to the solid-neighbour average
    /// exceeds `3 * color_tolerance`.
    pub color_tolerance: u32,

    /// Feather distance in pixels. `0` skips the feathering pass.
    pub feather_width: u32,
}

impl RefineConfig {
    /// Default edge threshold.
    pub const DEFAULT_THRESHOLD: u8 = 30;
    /// Default smoothing radius.
    pub const DEFAULT_SMOOTH_RADIUS: u32 = 2;
    /// Default color tolerance.
    pub const DEFAULT_COLOR_TOLERANCE: u32 = 20;
    /// Default feather width.
    pub const DEFAULT_FEATHER_WIDTH: u32 = 3;

    /// Upper bound on the smoothing radius.
    pub const MAX_SMOOTH_RADIUS: u32 = 16;
    /// Upper bound on the feather width.
    pub const MAX_FEATHER_WIDTH: u32 = 32;
    /// Upper bound on the color tolerance; `3 * 255` already exceeds
    /// any Manhattan RGB distance.
    pub const MAX_COLOR_TOLERANCE: u32 = 255;

    /// Return a copy with out-of-range values clamped.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let clamp = |name: &'static str, value: u32, max: u32| {
            if value > max {
                tracing::warn!(parameter = name, value, max, "clamping refine parameter");
            }
            value.min(max)
        };
        Self {
            threshold: self.threshold,
            smooth_radius: clamp("smooth_radius", self.smooth_radius, Self::MAX_SMOOTH_RADIUS),
            color_tolerance: clamp(
                "color_tolerance",
                self.color_tolerance,
                Self::MAX_COLOR_TOLERANCE,
            ),
            feather_width: clamp("feather_width", self.feather_width, Self::MAX_FEATHER_WIDTH),
        }
    }
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            smooth_radius: Self::DEFAULT_SMOOTH_RADIUS,
            color_tolerance: Self::DEFAULT_COLOR_TOLERANCE,
            feather_width: Self::DEFAULT_FEATHER_WIDTH,
        }
    }
}

/// Run all three refinement passes in order.
#[must_use = "returns the refined image"]
#[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn refine(mut image: RgbaImage, config: &RefineConfig) -> RgbaImage {
    let config = config.sanitized();
    remove_artifacts(&mut image, &config);
    smooth_translucent(&mut image, config.smooth_radius);
    feather_alpha(&mut image, config.feather_width);
    image
}

/// Pass 1: artifact cleanup.
///
/// For every edge pixel (alpha in `(0, 255 - threshold)`), average the
/// RGB of its 8 neighbours that are not edge pixels and have alpha above
/// [`SOLID_NEIGHBOUR_ALPHA`]. If any exist and the pixel's color is more
/// than `3 * color_tolerance` away (Manhattan) from that average, the
/// pixel takes the average color. Independently, edge pixels with alpha
/// below `threshold` become fully transparent.
///
/// Neighbours are read from a snapshot of the input, so recoloring one
/// pixel never affects another within the same pass.
pub fn remove_artifacts(image: &mut RgbaImage, config: &RefineConfig) {
    let snapshot = image.clone();
    let (w, h) = snapshot.dimensions();
    let threshold = config.threshold;
    let edge_ceiling = 255 - threshold;
    let is_edge = |alpha: u8| alpha > 0 && alpha < edge_ceiling;
    let max_distance = 3 * config.color_tolerance;

    let mut edge_pixels: u64 = 0;
    let mut recolored: u64 = 0;
    let mut cleared: u64 = 0;

    for (x, y, src) in snapshot.enumerate_pixels() {
        let alpha = src.0[3];
        if !is_edge(alpha) {
            continue;
        }
        edge_pixels += 1;

        let mut solid = ColorSum::default();
        for (nx, ny, _) in neighbourhood(x, y, 1, w, h) {
            if (nx, ny) == (x, y) {
                continue;
            }
            let n = snapshot.get_pixel(nx, ny);
            if !is_edge(n.0[3]) && n.0[3] > SOLID_NEIGHBOUR_ALPHA {
                solid.add(Color3::from_rgba(n));
            }
        }

        let out = image.get_pixel_mut(x, y);
        if let Some(average) = solid.mean()
            && Color3::from_rgba(src).manhattan(average) > max_distance
        {
            out.0[0] = average.r;
            out.0[1] = average.g;
            out.0[2] = average.b;
            recolored += 1;
        }
        if alpha < threshold {
            out.0[3] = 0;
            cleared += 1;
        }
    }

    tracing::debug!(edge_pixels, recolored, cleared, "artifact pass");
}

/// Pass 2: smoothing of translucent pixels.
///
/// Every pixel with `0 < alpha < 255` is replaced, per channel (R, G, B
/// and A), by the average of all pixels within the square window of
/// half-width `radius` around it (itself included), each weighted by
/// `1 / (1 + d)` where `d` is the Euclidean pixel distance. The window
/// is the full square, so its corners (up to `radius * sqrt(2)` away)
/// contribute too. Fully opaque and fully transparent pixels are
/// untouched.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn smooth_translucent(image: &mut RgbaImage, radius: u32) {
    if radius == 0 {
        return;
    }
    let snapshot = image.clone();
    let (w, h) = snapshot.dimensions();

    let mut smoothed: u64 = 0;
    for (x, y, src) in snapshot.enumerate_pixels() {
        let alpha = src.0[3];
        if alpha == 0 || alpha == 255 {
            continue;
        }

        let mut sums = [0.0_f64; 4];
        let mut total_weight = 0.0;
        for (nx, ny, distance) in neighbourhood(x, y, radius, w, h) {
            let weight = 1.0 / (1.0 + distance);
            let n = snapshot.get_pixel(nx, ny);
            for (sum, &channel) in sums.iter_mut().zip(&n.0) {
                *sum += f64::from(channel) * weight;
            }
            total_weight += weight;
        }

        let out = image.get_pixel_mut(x, y);
        for (dst, sum) in out.0.iter_mut().zip(sums) {
            *dst = (sum / total_weight).round().clamp(0.0, 255.0) as u8;
        }
        smoothed += 1;
    }

    tracing::debug!(radius, smoothed, "smoothing pass");
}

/// Pass 3: alpha feathering near the solid core.
///
/// For every pixel with alpha below 255, find the nearest fully opaque
/// pixel within Euclidean distance `width`: a disc, not the square
/// window [`smooth_translucent`] averages over. If one exists at distance
/// `d`, the pixel's alpha is scaled by `1 - 0.5 * d / width`. Pixels with
/// no opaque pixel in reach are left alone. `width == 0` skips the pass.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn feather_alpha(image: &mut RgbaImage, width: u32) {
    if width == 0 {
        return;
    }
    let (w, h) = image.dimensions();
    let alpha: Vec<u8> = image.pixels().map(|p| p.0[3]).collect();
    let alpha_at = |x: u32, y: u32| alpha[y as usize * w as usize + x as usize];
    let reach = f64::from(width);

    let mut feathered: u64 = 0;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let current = alpha_at(x, y);
        if current == 255 {
            continue;
        }

        let nearest = neighbourhood(x, y, width, w, h)
            .filter(|&(nx, ny, d)| d <= reach && alpha_at(nx, ny) == 255)
            .map(|(_, _, d)| d)
            .reduce(f64::min);

        if let Some(distance) = nearest {
            let factor = 0.5f64.mul_add(-(distance / reach), 1.0);
            pixel.0[3] = (f64::from(current) * factor).round().clamp(0.0, 255.0) as u8;
            feathered += 1;
        }
    }

    tracing::debug!(width, feathered, "feather pass");
}

/// Every in-bounds pixel of the square window of half-width `radius`
/// around `(x, y)`, including the centre, with its Euclidean distance.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn neighbourhood(
    x: u32,
    y: u32,
    radius: u32,
    width: u32,
    height: u32,
) -> impl Iterator<Item = (u32, u32, f64)> {
    let r = i64::from(radius);
    let (cx, cy) = (i64::from(x), i64::from(y));
    let x_range = (cx - r).max(0)..=(cx + r).min(i64::from(width) - 1);
    let y_range = (cy - r).max(0)..=(cy + r).min(i64::from(height) - 1);

    y_range.flat_map(move |ny| {
        x_range.clone().map(move |nx| {
            let (dx, dy) = (nx - cx, ny - cy);
            #[allow(clippy::cast_precision_loss)]
            let distance = ((dx * dx + dy * dy) as f64).sqrt();
            (nx as u32, ny as u32, distance)
        })
    })
}
