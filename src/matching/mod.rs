//! Page to vendor identification: the cheap hash path first, then the
//! two-anchor feature path.

pub mod anchor;
pub mod hash_triage;

use image::GrayImage;
use tracing::{debug, info};

use crate::{
    algorithms::orb::OrbDetector,
    config::EngineConfig,
    template::{cache::TemplateCache, Template},
};

pub use anchor::{AnchorFeatureMatcher, GeometricLock, PageIndex, Rejection};
pub use hash_triage::HashTriageMatcher;

/// A confirmed identification. Legacy matches carry no lock.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub vendor_name: String,
    pub template: Template,
    pub lock: Option<GeometricLock>,
}

#[derive(Debug, Clone)]
pub struct VendorIdentifier {
    detector: OrbDetector,
    max_page_features: usize,
    hash: HashTriageMatcher,
    anchor: AnchorFeatureMatcher,
}

impl VendorIdentifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            detector: OrbDetector::new(&config.features),
            max_page_features: config.features.max_page_features,
            hash: HashTriageMatcher::new(&config.matching),
            anchor: AnchorFeatureMatcher::new(&config.matching),
        }
    }

    pub fn detector(&self) -> &OrbDetector {
        &self.detector
    }

    /// Identifies `page` against every cached template. Page features are
    /// detected at most once, and only when the hash path found nothing.
    pub fn identify(&self, cache: &TemplateCache, page: &GrayImage) -> Option<MatchResult> {
        if let Some(template) = self.hash.identify(page, cache.legacy_templates()) {
            info!(vendor = %template.vendor_name, "matched by perceptual hash");
            return Some(MatchResult {
                vendor_name: template.vendor_name.clone(),
                template: Template::LegacyPerceptualHash(template),
                lock: None,
            });
        }

        let templates = cache.feature_templates();
        if templates.is_empty() {
            return None;
        }
        let features = self.detector.detect(page, self.max_page_features);
        debug!(features = features.len(), "page features detected");
        let index = PageIndex::new(&features);

        let (template, lock) = self.anchor.identify(&index, templates)?;
        info!(
            vendor = %template.vendor_name,
            inliers = lock.correspondences.len(),
            secondary = lock.secondary_consistent,
            "matched by anchor features"
        );
        Some(MatchResult {
            vendor_name: template.vendor_name.clone(),
            template: Template::TwoAnchorFeatures(template),
            lock: Some(lock),
        })
    }
}
