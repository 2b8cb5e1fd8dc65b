//! Tunable constants consumed by the engine, loadable from TOML.
//!
//! Every threshold here is a fixed knob, never derived at runtime. Missing
//! keys fall back to the defaults below, so an empty file is a valid
//! configuration.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{DocAnchorError, DocAnchorResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one JSON record per vendor.
    pub templates_dir: PathBuf,
    /// Ordered field schema handed to the authoring collaborator.
    pub fields: Vec<FieldSpec>,
    pub matching: MatchingConfig,
    pub features: FeatureConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("config/templates"),
            fields: vec![
                FieldSpec::new("invoice_number", true),
                FieldSpec::new("invoice_date", false),
                FieldSpec::new("total_amount", false),
            ],
            matching: MatchingConfig::default(),
            features: FeatureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub mandatory: bool,
}

impl FieldSpec {
    pub fn new(name: &str, mandatory: bool) -> Self {
        Self {
            name: name.to_string(),
            mandatory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Max Hamming distance between region hashes for a legacy match.
    pub hash_match_threshold: u32,
    /// Max Hamming distance between whole-page hashes to survive triage.
    pub triage_match_threshold: u32,
    pub lowe_ratio: f32,
    pub min_primary_inliers: usize,
    pub min_secondary_inliers_consistent: usize,
    pub secondary_verification_threshold_px: f64,
    /// Reprojection tolerance used by the consensus estimator.
    pub ransac_inlier_threshold_px: f64,
    pub ransac_seed: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            hash_match_threshold: 2,
            triage_match_threshold: 5,
            lowe_ratio: 0.75,
            min_primary_inliers: 12,
            min_secondary_inliers_consistent: 10,
            secondary_verification_threshold_px: 7.5,
            ransac_inlier_threshold_px: 3.0,
            ransac_seed: 0x5EED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    pub max_page_features: usize,
    pub max_anchor_features: usize,
    pub min_features_for_valid_anchor: usize,
    /// Radius of the non-maximum suppression applied to FAST corners.
    pub nms_radius: u32,
    /// Number of pyramid levels FAST runs on, 1 for a single scale.
    pub pyramid_levels: usize,
    pub pyramid_scale_factor: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            max_page_features: 5000,
            max_anchor_features: 1000,
            min_features_for_valid_anchor: 20,
            nms_radius: 3,
            pyramid_levels: 8,
            pyramid_scale_factor: 1.2,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> DocAnchorResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| DocAnchorError::io(path, e))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| DocAnchorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DocAnchorResult<()> {
        let matching = &self.matching;
        if !(matching.lowe_ratio > 0.0 && matching.lowe_ratio <= 1.0) {
            return Err(DocAnchorError::Config(format!(
                "lowe_ratio must be in (0, 1], got {}",
                matching.lowe_ratio
            )));
        }
        if matching.min_primary_inliers < 2 {
            return Err(DocAnchorError::Config(
                "min_primary_inliers must be at least 2".into(),
            ));
        }
        if matching.min_secondary_inliers_consistent == 0 {
            return Err(DocAnchorError::Config(
                "min_secondary_inliers_consistent must be positive".into(),
            ));
        }
        if matching.secondary_verification_threshold_px <= 0.0
            || matching.ransac_inlier_threshold_px <= 0.0
        {
            return Err(DocAnchorError::Config(
                "pixel thresholds must be positive".into(),
            ));
        }
        if self.features.fast_threshold == 0 {
            return Err(DocAnchorError::Config("fast_threshold must be positive".into()));
        }
        if self.features.max_page_features == 0 || self.features.max_anchor_features == 0 {
            return Err(DocAnchorError::Config("feature caps must be positive".into()));
        }
        if self.features.pyramid_levels == 0 || self.features.pyramid_scale_factor <= 1.0 {
            return Err(DocAnchorError::Config(format!(
                "pyramid needs at least one level and a scale factor above 1, got {} levels at {}",
                self.features.pyramid_levels, self.features.pyramid_scale_factor
            )));
        }
        if self.fields.iter().any(|f| f.name.trim().is_empty()) {
            return Err(DocAnchorError::Config("field names must not be empty".into()));
        }
        Ok(())
    }

    pub fn mandatory_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.mandatory)
            .map(|f| f.name.as_str())
    }
}
