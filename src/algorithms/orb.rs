use image::{imageops, GrayImage};
use imageproc::{
    corners::{corners_fast9, Corner},
    suppress::local_maxima,
};
use nalgebra::Vector2;

use crate::{
    algorithms::{
        brief::{self, BinaryDescriptor, DESCRIPTOR_SIZE, PATCH_RADIUS},
        pyramid::{self, PyramidLevel},
    },
    config::FeatureConfig,
    geometry::BoundingBox,
};

pub type OrbDescriptor = BinaryDescriptor<DESCRIPTOR_SIZE>;
pub type OrbFeature = Feature<OrbDescriptor>;

/// Extra context, in level pixels, cropped around an anchor region so that the
/// smoothing kernel and the BRIEF pattern see the same pixels they would on the
/// full page.
pub const ANCHOR_CONTEXT_MARGIN: u32 = 32;

/// Feature object which holds a coordinate on a page
/// and tries to handle a generic descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<Descriptor> {
    pub keypoint: Vector2<f64>,
    pub descriptor: Descriptor,
}

/// Oriented FAST + rotated BRIEF detector over a scale pyramid.
#[derive(Debug, Clone)]
pub struct OrbDetector {
    fast_threshold: u8,
    nms_radius: u32,
    pyramid_levels: usize,
    pyramid_scale_factor: f32,
}

impl OrbDetector {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            fast_threshold: config.fast_threshold,
            nms_radius: config.nms_radius,
            pyramid_levels: config.pyramid_levels,
            pyramid_scale_factor: config.pyramid_scale_factor,
        }
    }

    fn pyramid(&self, image: &GrayImage, max_features: usize) -> (Vec<PyramidLevel>, Vec<usize>) {
        let levels = pyramid::build(image, self.pyramid_levels, self.pyramid_scale_factor);
        let budgets = pyramid::level_budgets(max_features, levels.len(), self.pyramid_scale_factor);
        (levels, budgets)
    }

    /// Detects at most `max_features` features over the whole image. Each
    /// pyramid level contributes its strongest FAST responses first, finest
    /// level first; keypoints are in image coordinates.
    pub fn detect(&self, image: &GrayImage, max_features: usize) -> Vec<OrbFeature> {
        let (levels, budgets) = self.pyramid(image, max_features);
        let mut features: Vec<OrbFeature> = levels
            .iter()
            .zip(budgets)
            .flat_map(|(level, budget)| {
                let mut corners = self.ranked_corners(&level.image);
                corners.truncate(budget);
                Self::describe(&level.image, &corners)
                    .into_iter()
                    .map(move |feature| Feature {
                        keypoint: level.to_page(feature.keypoint),
                        descriptor: feature.descriptor,
                    })
            })
            .collect();
        features.truncate(max_features);
        features
    }

    /// Detects features whose keypoint lies inside `region` of `page`,
    /// reported in page coordinates.
    pub fn detect_in_region(
        &self,
        page: &GrayImage,
        region: &BoundingBox,
        max_features: usize,
    ) -> Vec<OrbFeature> {
        let (levels, budgets) = self.pyramid(page, max_features);
        let mut features: Vec<OrbFeature> = levels
            .iter()
            .zip(budgets)
            .flat_map(|(level, budget)| self.detect_level_region(level, region, budget))
            .collect();
        features.truncate(max_features);
        features
    }

    fn detect_level_region(
        &self,
        level: &PyramidLevel,
        region: &BoundingBox,
        budget: usize,
    ) -> Vec<OrbFeature> {
        let image = &level.image;
        let Some(context) = level
            .enclose(region)
            .expand(ANCHOR_CONTEXT_MARGIN)
            .clamp_to(image.width(), image.height())
        else {
            return Vec::new();
        };
        let crop = imageops::crop_imm(
            image,
            context.x as u32,
            context.y as u32,
            context.width,
            context.height,
        )
        .to_image();
        let offset = Vector2::new(context.x as f64, context.y as f64);

        let mut corners = self.ranked_corners(&crop);
        corners.retain(|c| {
            region.contains_point(&level.to_page(Vector2::new(c.x as f64, c.y as f64) + offset))
        });
        corners.truncate(budget);

        Self::describe(&crop, &corners)
            .into_iter()
            .map(|feature| Feature {
                keypoint: level.to_page(feature.keypoint + offset),
                descriptor: feature.descriptor,
            })
            .collect()
    }

    /// Uses FAST (Features from Accelerated Segment Test) as a keypoint detector,
    /// thinned by non-maximum suppression and ordered by decreasing response.
    fn ranked_corners(&self, image: &GrayImage) -> Vec<Corner> {
        let corners = corners_fast9(image, self.fast_threshold);
        let mut corners = if self.nms_radius > 0 {
            local_maxima(&corners, self.nms_radius)
        } else {
            corners
        };
        // ties broken by position so the order never depends on the detector's scan
        corners.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        corners
    }

    fn describe(image: &GrayImage, corners: &[Corner]) -> Vec<OrbFeature> {
        // using a kernel value of 2 so that descriptors are not overly
        // sensitive to scanner noise and JPEG artefacts
        const GAUSSIAN_KERNEL_SIGMA: f32 = 2.0;
        let smoothed = imageproc::filter::gaussian_blur_f32(image, GAUSSIAN_KERNEL_SIGMA);

        corners
            .iter()
            .map(|&Corner { x, y, .. }| {
                let angle = intensity_centroid_angle(image, x, y);
                Feature {
                    keypoint: Vector2::new(x as f64, y as f64),
                    descriptor: brief::compute_descriptor(x as f64, y as f64, angle, &smoothed),
                }
            })
            .collect()
    }
}

/// Orientation of the intensity centroid of the circular patch around `(x, y)`.
fn intensity_centroid_angle(image: &GrayImage, x: u32, y: u32) -> f32 {
    let (cx, cy) = (x as i64, y as i64);
    let radius = PATCH_RADIUS as i64;
    let (mut m01, mut m10) = (0i64, 0i64);

    for dy in -radius..=radius {
        let py = cy + dy;
        if py < 0 || py >= image.height() as i64 {
            continue;
        }
        for dx in -radius..=radius {
            let px = cx + dx;
            if px < 0 || px >= image.width() as i64 || dx * dx + dy * dy > radius * radius {
                continue;
            }
            let intensity = image.get_pixel(px as u32, py as u32).0[0] as i64;
            m10 += dx * intensity;
            m01 += dy * intensity;
        }
    }

    (m01 as f32).atan2(m10 as f32)
}
