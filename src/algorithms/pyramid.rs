//! Scale pyramid so that FAST corners are found on pages rasterised at a
//! different resolution than the page a template was learned on.

use image::{
    imageops::{self, FilterType},
    GrayImage,
};
use nalgebra::Vector2;

use crate::geometry::BoundingBox;

/// Levels narrower or shorter than this are too small for meaningful detection.
const MIN_LEVEL_SIZE: u32 = 32;

#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub index: usize,
    pub image: GrayImage,
    /// Page pixels per level pixel along each axis.
    pub scale: Vector2<f64>,
}

impl PyramidLevel {
    /// Level coordinates to page coordinates, pixel centres aligned.
    pub fn to_page(&self, point: Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            (point.x + 0.5) * self.scale.x - 0.5,
            (point.y + 0.5) * self.scale.y - 0.5,
        )
    }

    pub fn to_level(&self, point: Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            (point.x + 0.5) / self.scale.x - 0.5,
            (point.y + 0.5) / self.scale.y - 0.5,
        )
    }

    /// Box in level pixels covering every level pixel whose centre maps into `region`.
    pub fn enclose(&self, region: &BoundingBox) -> BoundingBox {
        let corners = region.corners().map(|c| self.to_level(c));
        BoundingBox::enclosing(&corners)
            .map(|bbox| bbox.expand(1))
            .unwrap_or(*region)
    }
}

/// Builds up to `levels` levels, each `scale_factor` times smaller than the
/// previous one. Level 0 is the image itself; every other level is resampled
/// straight from it.
pub fn build(image: &GrayImage, levels: usize, scale_factor: f32) -> Vec<PyramidLevel> {
    let (width, height) = image.dimensions();
    let mut pyramid = Vec::with_capacity(levels);
    let mut scale = 1.0f64;

    for index in 0..levels.max(1) {
        let level_width = (width as f64 / scale).round() as u32;
        let level_height = (height as f64 / scale).round() as u32;
        if index > 0 && (level_width < MIN_LEVEL_SIZE || level_height < MIN_LEVEL_SIZE) {
            break;
        }

        let image = if index == 0 {
            image.clone()
        } else {
            imageops::resize(image, level_width, level_height, FilterType::Triangle)
        };
        pyramid.push(PyramidLevel {
            index,
            image,
            scale: Vector2::new(
                width as f64 / level_width as f64,
                height as f64 / level_height as f64,
            ),
        });
        scale *= scale_factor as f64;
    }

    pyramid
}

/// Splits `total` features across `levels` so that each level is allotted
/// `1 / scale_factor` of the level above it, the area ratio ORB uses.
pub fn level_budgets(total: usize, levels: usize, scale_factor: f32) -> Vec<usize> {
    if levels <= 1 {
        return vec![total];
    }
    let factor = 1.0 / scale_factor as f64;
    let first = total as f64 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));

    let mut budgets = Vec::with_capacity(levels);
    let mut assigned = 0usize;
    for level in 0..levels - 1 {
        let budget = (first * factor.powi(level as i32)).round() as usize;
        budgets.push(budget);
        assigned = assigned.saturating_add(budget);
    }
    budgets.push(total.saturating_sub(assigned));
    budgets
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn levels_shrink_until_too_small() {
        let image = GrayImage::from_pixel(160, 120, Luma([0]));
        let pyramid = build(&image, 8, 1.2);
        assert_eq!(pyramid.len(), 8);
        assert_eq!(pyramid[0].image.dimensions(), (160, 120));
        assert_eq!(pyramid[1].image.dimensions(), (133, 100));
        assert!(pyramid.iter().all(|l| l.image.height() >= MIN_LEVEL_SIZE));

        let tiny = GrayImage::new(40, 40);
        assert_eq!(build(&tiny, 8, 1.2).len(), 2);
        assert_eq!(build(&image, 1, 1.2).len(), 1);
    }

    #[test]
    fn level_coordinates_round_trip_through_page() {
        let image = GrayImage::new(480, 640);
        let level = &build(&image, 3, 1.2)[2];
        let point = Vector2::new(123.0, 45.5);
        assert!((level.to_page(level.to_level(point)) - point).norm() < 1e-9);
        // level 0 is the page itself
        let base = &build(&image, 1, 1.2)[0];
        assert_eq!(base.to_page(point), point);
    }

    #[test]
    fn enclosed_region_covers_mapped_pixels() {
        let image = GrayImage::new(480, 640);
        let level = &build(&image, 4, 1.2)[3];
        let region = BoundingBox::new(48, 40, 96, 96);
        let enclosed = level.enclose(&region);
        for corner in region.corners() {
            let p = level.to_level(corner);
            assert!(p.x >= enclosed.x as f64 && p.x <= enclosed.right() as f64);
            assert!(p.y >= enclosed.y as f64 && p.y <= enclosed.bottom() as f64);
        }
    }

    #[test]
    fn budgets_favour_finer_levels_and_sum_to_total() {
        let budgets = level_budgets(5000, 8, 1.2);
        assert_eq!(budgets.len(), 8);
        assert_eq!(budgets.iter().sum::<usize>(), 5000);
        assert!(budgets.windows(2).take(6).all(|w| w[0] > w[1]));
        assert_eq!(level_budgets(7, 1, 1.2), [7]);
        // unlimited stays unlimited on every level
        assert!(level_budgets(usize::MAX, 8, 1.2).iter().all(|&b| b > 1 << 50));
    }
}
