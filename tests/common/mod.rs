#![allow(dead_code)]

use std::collections::VecDeque;

use docanchor::{
    algorithms::{orb::OrbDetector, similarity::SimilarityTransform},
    config::FieldSpec,
    extraction::TextExtractor,
    learning::TemplateAuthor,
    template::{FeatureTemplate, FieldBox},
    BoundingBox, EngineConfig, Template,
};
use image::{
    imageops::{self, FilterType},
    GrayImage, Luma,
};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub const PAGE_WIDTH: u32 = 480;
pub const PAGE_HEIGHT: u32 = 640;
pub const PATCH_SIZE: u32 = 96;
const BLOCK: u32 = 8;

/// Where a vendor's logos sit on an unshifted page.
pub const PRIMARY_ORIGIN: (i32, i32) = (48, 40);
pub const SECONDARY_ORIGIN: (i32, i32) = (320, 480);

pub fn primary_region() -> BoundingBox {
    BoundingBox::new(PRIMARY_ORIGIN.0, PRIMARY_ORIGIN.1, PATCH_SIZE, PATCH_SIZE)
}

pub fn secondary_region() -> BoundingBox {
    BoundingBox::new(SECONDARY_ORIGIN.0, SECONDARY_ORIGIN.1, PATCH_SIZE, PATCH_SIZE)
}

pub fn invoice_fields() -> Vec<FieldBox> {
    vec![
        FieldBox::new("invoice_number", BoundingBox::new(300, 60, 140, 24)),
        FieldBox::new("invoice_date", BoundingBox::new(300, 90, 140, 24)),
        FieldBox::new("total_amount", BoundingBox::new(280, 400, 160, 30)),
    ]
}

pub fn blank_page() -> GrayImage {
    GrayImage::from_pixel(PAGE_WIDTH, PAGE_HEIGHT, Luma([255]))
}

/// Paints a square of random grey blocks, the stand-in for a printed logo.
pub fn stamp_patch(page: &mut GrayImage, origin: (i32, i32), seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let blocks = PATCH_SIZE / BLOCK;
    for by in 0..blocks {
        for bx in 0..blocks {
            let value = Luma([rng.gen_range(0..=230u8)]);
            for dy in 0..BLOCK {
                for dx in 0..BLOCK {
                    let x = origin.0 + (bx * BLOCK + dx) as i32;
                    let y = origin.1 + (by * BLOCK + dy) as i32;
                    if x >= 0 && y >= 0 && (x as u32) < page.width() && (y as u32) < page.height() {
                        page.put_pixel(x as u32, y as u32, value);
                    }
                }
            }
        }
    }
}

/// A page of vendor `seed`, with every mark moved by `offset`.
pub fn vendor_page(seed: u64, offset: (i32, i32)) -> GrayImage {
    vendor_page_with_secondary_offset(seed, offset, (0, 0))
}

/// Like [`vendor_page`], with the secondary logo moved a further `extra`.
pub fn vendor_page_with_secondary_offset(
    seed: u64,
    offset: (i32, i32),
    extra: (i32, i32),
) -> GrayImage {
    let mut page = blank_page();
    stamp_patch(
        &mut page,
        (PRIMARY_ORIGIN.0 + offset.0, PRIMARY_ORIGIN.1 + offset.1),
        seed,
    );
    stamp_patch(
        &mut page,
        (
            SECONDARY_ORIGIN.0 + offset.0 + extra.0,
            SECONDARY_ORIGIN.1 + offset.1 + extra.1,
        ),
        seed.wrapping_mul(31).wrapping_add(7),
    );
    page
}

/// `page` turned by `radians` about its centre, uncovered corners left white.
pub fn rotated_page(page: &GrayImage, radians: f32) -> GrayImage {
    rotate_about_center(page, radians, Interpolation::Bilinear, Luma([255]))
}

/// The transform [`rotated_page`] applies to page coordinates.
pub fn rotation_about_center(page: &GrayImage, radians: f64) -> SimilarityTransform {
    let (cx, cy) = (page.width() as f64 / 2.0, page.height() as f64 / 2.0);
    let (sin, cos) = radians.sin_cos();
    SimilarityTransform::from_scale_rotation_translation(
        1.0,
        radians,
        cx - (cos * cx - sin * cy),
        cy - (sin * cx + cos * cy),
    )
}

/// `page` resampled by `scale`, as if scanned at a different resolution.
pub fn scaled_page(page: &GrayImage, scale: f64) -> GrayImage {
    let width = (page.width() as f64 * scale).round() as u32;
    let height = (page.height() as f64 * scale).round() as u32;
    imageops::resize(page, width, height, FilterType::Triangle)
}

/// The transform [`scaled_page`] applies to page coordinates, pixel centres aligned.
pub fn rescaling(scale: f64) -> SimilarityTransform {
    let shift = 0.5 * (scale - 1.0);
    SimilarityTransform::from_scale_rotation_translation(scale, 0.0, shift, shift)
}

/// Asserts that every edge of `actual` lies within `tolerance` pixels of `expected`.
pub fn assert_box_near(actual: &BoundingBox, expected: &BoundingBox, tolerance: i64) {
    let edges = |b: &BoundingBox| [b.x as i64, b.y as i64, b.right(), b.bottom()];
    let close = edges(actual)
        .iter()
        .zip(edges(expected))
        .all(|(a, e)| (a - e).abs() <= tolerance);
    assert!(close, "{actual:?} is not within {tolerance}px of {expected:?}");
}

pub fn learn_template(vendor: &str, page: &GrayImage, config: &EngineConfig) -> FeatureTemplate {
    FeatureTemplate::learn(
        vendor,
        page,
        primary_region(),
        secondary_region(),
        invoice_fields(),
        &OrbDetector::new(&config.features),
        &config.features,
    )
    .expect("synthetic logos are textured enough")
}

/// Text extraction stand-in that reports the region it was given.
pub struct RegionEcho;

impl TextExtractor for RegionEcho {
    fn extract_text(&self, _page: &GrayImage, region: &BoundingBox) -> String {
        format!("{},{},{}x{}", region.x, region.y, region.width, region.height)
    }
}

pub fn echo(bbox: BoundingBox) -> String {
    RegionEcho.extract_text(&blank_page(), &bbox)
}

/// The region a [`RegionEcho`] text reports.
pub fn echoed(text: &str) -> BoundingBox {
    let parse = |s: &str| s.parse::<i64>().expect("echoed number");
    let mut parts = text.split(',');
    let x = parse(parts.next().expect("x"));
    let y = parse(parts.next().expect("y"));
    let (width, height) = parts.next().and_then(|s| s.split_once('x')).expect("size");
    BoundingBox::new(x as i32, y as i32, parse(width) as u32, parse(height) as u32)
}

/// Authoring stand-in replaying scripted answers, one per seed.
pub struct ScriptedAuthor {
    answers: VecDeque<Option<String>>,
    config: EngineConfig,
    pub seen_existing: Vec<Vec<String>>,
    pub seen_schema: Vec<String>,
}

impl ScriptedAuthor {
    /// `Some(vendor)` learns a template for that vendor on the standard
    /// layout; `None` cancels.
    pub fn new(answers: impl IntoIterator<Item = Option<&'static str>>, config: &EngineConfig) -> Self {
        Self {
            answers: answers.into_iter().map(|a| a.map(str::to_string)).collect(),
            config: config.clone(),
            seen_existing: Vec::new(),
            seen_schema: Vec::new(),
        }
    }
}

impl TemplateAuthor for ScriptedAuthor {
    fn author(
        &mut self,
        seed: &GrayImage,
        schema: &[FieldSpec],
        existing_vendors: &[String],
    ) -> Option<Template> {
        self.seen_existing.push(existing_vendors.to_vec());
        self.seen_schema = schema.iter().map(|f| f.name.clone()).collect();
        let vendor = self.answers.pop_front().flatten()?;
        Some(learn_template(&vendor, seed, &self.config).into())
    }
}

pub fn config_in(dir: &std::path::Path) -> EngineConfig {
    EngineConfig {
        templates_dir: dir.to_path_buf(),
        ..EngineConfig::default()
    }
}
