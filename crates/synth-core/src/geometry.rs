use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Geometry failures. Recoverable: the sample that produced one is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Degenerate source: {width}x{height}")]
    DegenerateSource { width: u32, height: u32 },

    #[error("Degenerate output size {width}x{height} (scale {scale:.3})")]
    DegenerateOutput { width: u32, height: u32, scale: f64 },

    #[error("Rectangle {width}x{height} at ({x}, {y}) exceeds {bound_w}x{bound_h}")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        bound_w: u32,
        bound_h: u32,
    },

    #[error("Scale range [{min}, {max}] must satisfy 0 < min <= max <= 1")]
    InvalidScaleRange { min: f64, max: f64 },

    #[error("Ratio {0} must lie strictly between 0 and 1")]
    InvalidRatio(f64),
}

/// Absolute pixel box, `x_max`/`y_max` exclusive.
///
/// Constructed only through [`BoundingBox::new`], which enforces
/// `0 <= x_min < x_max <= image_width` and the same for y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl BoundingBox {
    pub fn new(
        x_min: u32,
        y_min: u32,
        x_max: u32,
        y_max: u32,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self, GeometryError> {
        if x_min >= x_max || y_min >= y_max || x_max > image_width || y_max > image_height {
            return Err(GeometryError::OutOfBounds {
                x: x_min,
                y: y_min,
                width: x_max.saturating_sub(x_min),
                height: y_max.saturating_sub(y_min),
                bound_w: image_width,
                bound_h: image_height,
            });
        }
        Ok(Self { x_min, y_min, x_max, y_max })
    }

    /// Box covering a `width`x`height` rectangle with its top-left at (x, y).
    pub fn from_origin(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self, GeometryError> {
        Self::new(
            x,
            y,
            x.saturating_add(width),
            y.saturating_add(height),
            image_width,
            image_height,
        )
    }

    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }

    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        self.x_min < self.x_max
            && self.y_min < self.y_max
            && self.x_max <= image_width
            && self.y_max <= image_height
    }

    pub fn to_rect(&self) -> Rect {
        Rect {
            x: i64::from(self.x_min),
            y: i64::from(self.y_min),
            width: self.width(),
            height: self.height(),
        }
    }
}

/// Paste rectangle that may hang off the canvas (occluders do).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn right(&self) -> i64 {
        self.x + i64::from(self.width)
    }

    pub fn bottom(&self) -> i64 {
        self.y + i64::from(self.height)
    }

    /// Area of the overlap with `other`, 0 when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> u64 {
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if w <= 0 || h <= 0 {
            return 0;
        }
        (w as u64) * (h as u64)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection_area(other) > 0
    }
}

/// Round a non-negative f64 to the nearest u32, saturating.
pub(crate) fn round_u32(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        value.round() as u32
    }
}
