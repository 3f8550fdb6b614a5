//! Occlusion of an already placed target by a distractor window.
//!
//! The occluder is always anchored so that it overlaps the target box.
//! The recorded label is never touched: ground truth stays the unoccluded
//! extent of the target.

use image::RgbaImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::compositor::Compositor;
use crate::geometry::{round_u32, BoundingBox, GeometryError, Rect};

/// Smallest occluder side. With a side of 1 the anchor range would allow
/// an occluder that only touches the target's exclusive edge.
const MIN_OCCLUDER_SIDE: u32 = 2;

/// Occluder height limit, in target heights. Thin tall distractors are
/// shrunk to this and their width re-derived from the aspect.
const MAX_OCCLUDER_HEIGHT_FACTOR: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    pub enabled: bool,
    /// Chance that a positive sample gets occluded.
    pub probability: f64,
    /// Occluder width as a fraction of the target width.
    pub scale_min: f64,
    pub scale_max: f64,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 0.6,
            scale_min: 0.3,
            scale_max: 0.6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Occluder {
    config: OcclusionConfig,
    compositor: Compositor,
}

impl Occluder {
    pub fn new(config: OcclusionConfig, compositor: Compositor) -> Self {
        Self { config, compositor }
    }

    pub fn config(&self) -> &OcclusionConfig {
        &self.config
    }

    /// Roll the per-sample occlusion chance.
    pub fn should_occlude<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.config.enabled && rng.gen_bool(self.config.probability.clamp(0.0, 1.0))
    }

    /// Size and anchor for an occluder over `target`.
    ///
    /// The top-left is drawn from `[tx1 - dw/2, tx2 - dw/2] x [ty1 - dh/2, ty2 - dh/2]`,
    /// i.e. the occluder center lands inside the target box, so the two
    /// rectangles always intersect.
    pub fn sample_rect<R: Rng + ?Sized>(
        &self,
        target: &BoundingBox,
        occluder_width: u32,
        occluder_height: u32,
        rng: &mut R,
    ) -> Result<Rect, GeometryError> {
        if occluder_width == 0 || occluder_height == 0 {
            return Err(GeometryError::DegenerateSource {
                width: occluder_width,
                height: occluder_height,
            });
        }
        let (lo, hi) = if self.config.scale_min <= self.config.scale_max {
            (self.config.scale_min, self.config.scale_max)
        } else {
            (self.config.scale_max, self.config.scale_min)
        };
        let scale = rng.gen_range(lo..=hi);
        let aspect = f64::from(occluder_width) / f64::from(occluder_height);

        let mut width = round_u32(f64::from(target.width()) * scale).max(MIN_OCCLUDER_SIDE);
        let mut height = round_u32(f64::from(width) / aspect).max(MIN_OCCLUDER_SIDE);

        let max_height = target
            .height()
            .saturating_mul(MAX_OCCLUDER_HEIGHT_FACTOR)
            .max(MIN_OCCLUDER_SIDE);
        if height > max_height {
            height = max_height;
            width = round_u32(f64::from(height) * aspect).max(MIN_OCCLUDER_SIDE);
        }

        let half_w = i64::from(width / 2);
        let half_h = i64::from(height / 2);
        let x = rng.gen_range(
            i64::from(target.x_min) - half_w..=i64::from(target.x_max) - half_w,
        );
        let y = rng.gen_range(
            i64::from(target.y_min) - half_h..=i64::from(target.y_max) - half_h,
        );

        Ok(Rect { x, y, width, height })
    }

    /// Paste `distractor` over `image` so that it partially covers `target`.
    ///
    /// Returns the rectangle the occluder was pasted into; it may extend past
    /// the canvas, the overflow is clipped.
    pub fn occlude<R: Rng + ?Sized>(
        &self,
        image: &mut RgbaImage,
        target: &BoundingBox,
        distractor: &RgbaImage,
        rng: &mut R,
    ) -> Result<Rect, GeometryError> {
        let (dw, dh) = distractor.dimensions();
        let rect = self.sample_rect(target, dw, dh, rng)?;
        let resized = self.compositor.resize(distractor, rect.width, rect.height);
        self.compositor.overlay_in_place(image, &resized, rect.x, rect.y);
        log::trace!("Occluder {:?} over target {:?}", rect, target);
        Ok(rect)
    }
}
