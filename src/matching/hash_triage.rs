//! Legacy path: whole-page triage hash, then a precise hash of the
//! template's identifier area.

use std::sync::Arc;

use image::{imageops, GrayImage};
use tracing::debug;

use crate::{
    algorithms::hashing::{self, PerceptualHash},
    config::MatchingConfig,
    template::LegacyTemplate,
};

#[derive(Debug, Clone, Copy)]
pub struct HashTriageMatcher {
    triage_threshold: u32,
    precise_threshold: u32,
}

impl HashTriageMatcher {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            triage_threshold: config.triage_match_threshold,
            precise_threshold: config.hash_match_threshold,
        }
    }

    /// Templates that survive the coarse whole-page comparison, in their
    /// original order. Templates without a triage hash always survive.
    pub fn triage<'t>(
        &self,
        page_hash: &PerceptualHash,
        templates: &'t [Arc<LegacyTemplate>],
    ) -> Vec<&'t Arc<LegacyTemplate>> {
        templates
            .iter()
            .filter(|t| match &t.triage_hash {
                Some(hash) => hash.distance(page_hash) <= self.triage_threshold,
                None => true,
            })
            .collect()
    }

    /// First template, in order, whose identifier area hashes within the
    /// precise threshold. Areas that do not lie on the page are skipped.
    pub fn identify(
        &self,
        page: &GrayImage,
        templates: &[Arc<LegacyTemplate>],
    ) -> Option<Arc<LegacyTemplate>> {
        if templates.is_empty() {
            return None;
        }
        let page_hash = hashing::average_hash(page);
        let candidates = self.triage(&page_hash, templates);
        debug!(
            candidates = candidates.len(),
            total = templates.len(),
            "hash triage"
        );

        candidates
            .into_iter()
            .find(|template| self.precise_match(page, template))
            .cloned()
    }

    fn precise_match(&self, page: &GrayImage, template: &LegacyTemplate) -> bool {
        let area = template.identifier_area;
        if area.is_empty() || !area.fits_within(page.width(), page.height()) {
            debug!(vendor = %template.vendor_name, ?area, "identifier area off page, skipped");
            return false;
        }
        let crop = imageops::crop_imm(page, area.x as u32, area.y as u32, area.width, area.height)
            .to_image();
        let distance = hashing::phash(&crop).distance(&template.precise_hash);
        debug!(vendor = %template.vendor_name, distance, "precise hash");
        distance <= self.precise_threshold
    }
}
