use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    config::EngineConfig,
    error::DocAnchorResult,
    template::{
        record::TemplateRecord, store::TemplateStore, FeatureTemplate, LegacyTemplate, Template,
    },
};

/// Decoded templates partitioned by the matcher that consumes them, each
/// list in load order.
#[derive(Debug, Clone, Default)]
pub struct TemplateCache {
    feature: Vec<Arc<FeatureTemplate>>,
    legacy: Vec<Arc<LegacyTemplate>>,
}

/// Outcome of a cache rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub loaded: usize,
    pub skipped: usize,
}

impl TemplateCache {
    /// Decodes every record in `store`. A record that fails to parse or
    /// decode is skipped with a warning.
    pub fn load(store: &TemplateStore, config: &EngineConfig) -> (Self, CacheStats) {
        let mut cache = Self::default();
        let mut stats = CacheStats::default();
        for (path, record) in store.load_all() {
            match record.and_then(|r| r.decode(config)) {
                Ok(template) => {
                    cache.push(template);
                    stats.loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping template");
                    stats.skipped += 1;
                }
            }
        }
        info!(
            feature = cache.feature.len(),
            legacy = cache.legacy.len(),
            skipped = stats.skipped,
            "template cache loaded"
        );
        (cache, stats)
    }

    /// Replaces the whole cache with a fresh load of `store`.
    pub fn rebuild(&mut self, store: &TemplateStore, config: &EngineConfig) -> CacheStats {
        let (fresh, stats) = Self::load(store, config);
        *self = fresh;
        stats
    }

    /// Adds one freshly saved record, decoded exactly as `rebuild` would.
    pub fn append(&mut self, record: &TemplateRecord, config: &EngineConfig) -> DocAnchorResult<()> {
        let template = record.decode(config)?;
        info!(vendor = template.vendor_name(), "template appended to cache");
        self.push(template);
        Ok(())
    }

    fn push(&mut self, template: Template) {
        match template {
            Template::TwoAnchorFeatures(t) => self.feature.push(t),
            Template::LegacyPerceptualHash(t) => self.legacy.push(t),
        }
    }

    pub fn feature_templates(&self) -> &[Arc<FeatureTemplate>] {
        &self.feature
    }

    pub fn legacy_templates(&self) -> &[Arc<LegacyTemplate>] {
        &self.legacy
    }

    /// Every cached template, legacy ones first (the order they are tried in).
    pub fn templates(&self) -> impl Iterator<Item = Template> + '_ {
        self.legacy
            .iter()
            .cloned()
            .map(Template::LegacyPerceptualHash)
            .chain(self.feature.iter().cloned().map(Template::TwoAnchorFeatures))
    }

    pub fn vendor_names(&self) -> Vec<String> {
        self.templates().map(|t| t.vendor_name().to_string()).collect()
    }

    pub fn contains(&self, vendor: &str) -> bool {
        self.legacy.iter().any(|t| t.vendor_name == vendor)
            || self.feature.iter().any(|t| t.vendor_name == vendor)
    }

    pub fn len(&self) -> usize {
        self.feature.len() + self.legacy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature.is_empty() && self.legacy.is_empty()
    }
}
