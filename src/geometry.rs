use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle in the frame of the page it was drawn on.
///
/// `x`/`y` are signed because a projected box can start left of or above
/// the page edge; consumers clamp before cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Corners in clockwise order starting top-left.
    pub fn corners(&self) -> [Vector2<f64>; 4] {
        let (left, top) = (self.x as f64, self.y as f64);
        let (right, bottom) = (self.right() as f64, self.bottom() as f64);
        [
            Vector2::new(left, top),
            Vector2::new(right, top),
            Vector2::new(right, bottom),
            Vector2::new(left, bottom),
        ]
    }

    pub fn contains_point(&self, point: &Vector2<f64>) -> bool {
        point.x >= self.x as f64
            && point.y >= self.y as f64
            && point.x < self.right() as f64
            && point.y < self.bottom() as f64
    }

    /// True when the whole box lies on a `width` x `height` page.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty()
            && self.x >= 0
            && self.y >= 0
            && self.right() <= width as i64
            && self.bottom() <= height as i64
    }

    /// Intersection with a `width` x `height` page, `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let left = (self.x as i64).clamp(0, width as i64);
        let top = (self.y as i64).clamp(0, height as i64);
        let right = self.right().clamp(0, width as i64);
        let bottom = self.bottom().clamp(0, height as i64);
        (right > left && bottom > top).then(|| {
            BoundingBox::new(
                left as i32,
                top as i32,
                (right - left) as u32,
                (bottom - top) as u32,
            )
        })
    }

    /// Grows the box by `margin` on every side.
    pub fn expand(&self, margin: u32) -> BoundingBox {
        BoundingBox::new(
            self.x.saturating_sub(margin as i32),
            self.y.saturating_sub(margin as i32),
            self.width.saturating_add(2 * margin),
            self.height.saturating_add(2 * margin),
        )
    }

    /// Smallest integer box enclosing `points`.
    ///
    /// Values within `1e-6` of an integer snap to it so that exact
    /// transforms do not grow the box by a pixel of float noise.
    pub fn enclosing(points: &[Vector2<f64>]) -> Option<BoundingBox> {
        const SNAP: f64 = 1e-6;

        let (first, rest) = points.split_first()?;
        let (mut min, mut max) = (*first, *first);
        for p in rest {
            min = min.inf(p);
            max = max.sup(p);
        }
        let left = (min.x + SNAP).floor();
        let top = (min.y + SNAP).floor();
        let right = (max.x - SNAP).ceil().max(left);
        let bottom = (max.y - SNAP).ceil().max(top);
        Some(BoundingBox::new(
            left as i32,
            top as i32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}
