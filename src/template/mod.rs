//! Vendor templates: the decoded, validated form the matchers consume.
//!
//! A template is either a two-anchor feature template or a legacy
//! perceptual-hash template. The on-disk shape lives in [`record`]; the
//! persistence in [`store`]; the process-local decoded copy in [`cache`].

pub mod cache;
pub mod record;
pub mod store;

use std::sync::Arc;

use image::{imageops, GrayImage};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::{
    algorithms::{
        hashing::{self, PerceptualHash},
        orb::{OrbDescriptor, OrbDetector},
    },
    config::{EngineConfig, FeatureConfig},
    error::{DocAnchorError, DocAnchorResult},
    geometry::BoundingBox,
};

/// Which matcher consumes a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    TwoAnchorFeatures,
    LegacyPerceptualHash,
}

/// A named extraction region in the frame the template was learned in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBox {
    pub field_name: String,
    pub bounding_box: BoundingBox,
}

impl FieldBox {
    pub fn new(field_name: &str, bounding_box: BoundingBox) -> Self {
        Self {
            field_name: field_name.to_string(),
            bounding_box,
        }
    }
}

/// One learned fingerprint region.
///
/// Keypoints are expressed in the page frame of the document the anchor
/// was learned on, index-aligned with the descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    bounding_box: BoundingBox,
    descriptors: Vec<OrbDescriptor>,
    keypoints: Vec<Vector2<f64>>,
}

impl Anchor {
    pub fn new(
        bounding_box: BoundingBox,
        descriptors: Vec<OrbDescriptor>,
        keypoints: Vec<Vector2<f64>>,
        min_features: usize,
    ) -> DocAnchorResult<Self> {
        if descriptors.len() != keypoints.len() {
            return Err(DocAnchorError::DescriptorLength {
                descriptors: descriptors.len(),
                keypoints: keypoints.len(),
            });
        }
        if descriptors.len() < min_features {
            return Err(DocAnchorError::InsufficientFeatures {
                found: descriptors.len(),
                required: min_features,
            });
        }
        Ok(Self {
            bounding_box,
            descriptors,
            keypoints,
        })
    }

    /// Extracts the anchor for `region` of `page`.
    ///
    /// Fails with [`DocAnchorError::InsufficientFeatures`] when the region
    /// is too plain to be recognised later.
    pub fn learn(
        page: &GrayImage,
        region: BoundingBox,
        detector: &OrbDetector,
        config: &FeatureConfig,
    ) -> DocAnchorResult<Self> {
        let (keypoints, descriptors) = detector
            .detect_in_region(page, &region, config.max_anchor_features)
            .into_iter()
            .map(|f| (f.keypoint, f.descriptor))
            .unzip();
        Self::new(region, descriptors, keypoints, config.min_features_for_valid_anchor)
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn descriptors(&self) -> &[OrbDescriptor] {
        &self.descriptors
    }

    pub fn keypoints(&self) -> &[Vector2<f64>] {
        &self.keypoints
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTemplate {
    pub vendor_name: String,
    pub primary_anchor: Anchor,
    pub secondary_anchor: Anchor,
    pub fields: Vec<FieldBox>,
}

impl FeatureTemplate {
    /// Builds a template from the regions chosen on a seed page. This is the
    /// data contract an authoring front end fulfils.
    pub fn learn(
        vendor_name: &str,
        page: &GrayImage,
        primary_region: BoundingBox,
        secondary_region: BoundingBox,
        fields: Vec<FieldBox>,
        detector: &OrbDetector,
        config: &FeatureConfig,
    ) -> DocAnchorResult<Self> {
        Ok(Self {
            vendor_name: vendor_name.trim().to_string(),
            primary_anchor: Anchor::learn(page, primary_region, detector, config)?,
            secondary_anchor: Anchor::learn(page, secondary_region, detector, config)?,
            fields,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTemplate {
    pub vendor_name: String,
    pub identifier_area: BoundingBox,
    pub precise_hash: PerceptualHash,
    /// Templates written before triage hashing existed carry none.
    pub triage_hash: Option<PerceptualHash>,
    pub fields: Vec<FieldBox>,
}

impl LegacyTemplate {
    pub fn learn(
        vendor_name: &str,
        page: &GrayImage,
        identifier_area: BoundingBox,
        fields: Vec<FieldBox>,
    ) -> DocAnchorResult<Self> {
        if !identifier_area.fits_within(page.width(), page.height()) {
            return Err(DocAnchorError::RegionOutsidePage(identifier_area));
        }
        let crop = imageops::crop_imm(
            page,
            identifier_area.x as u32,
            identifier_area.y as u32,
            identifier_area.width,
            identifier_area.height,
        )
        .to_image();
        Ok(Self {
            vendor_name: vendor_name.trim().to_string(),
            identifier_area,
            precise_hash: hashing::phash(&crop),
            triage_hash: Some(hashing::average_hash(page)),
            fields,
        })
    }
}

/// A decoded vendor template. Cloning is cheap.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    TwoAnchorFeatures(Arc<FeatureTemplate>),
    LegacyPerceptualHash(Arc<LegacyTemplate>),
}

impl From<FeatureTemplate> for Template {
    fn from(template: FeatureTemplate) -> Self {
        Self::TwoAnchorFeatures(Arc::new(template))
    }
}

impl From<LegacyTemplate> for Template {
    fn from(template: LegacyTemplate) -> Self {
        Self::LegacyPerceptualHash(Arc::new(template))
    }
}

impl Template {
    pub fn vendor_name(&self) -> &str {
        match self {
            Self::TwoAnchorFeatures(t) => &t.vendor_name,
            Self::LegacyPerceptualHash(t) => &t.vendor_name,
        }
    }

    pub fn fields(&self) -> &[FieldBox] {
        match self {
            Self::TwoAnchorFeatures(t) => &t.fields,
            Self::LegacyPerceptualHash(t) => &t.fields,
        }
    }

    pub fn match_strategy(&self) -> MatchStrategy {
        match self {
            Self::TwoAnchorFeatures(_) => MatchStrategy::TwoAnchorFeatures,
            Self::LegacyPerceptualHash(_) => MatchStrategy::LegacyPerceptualHash,
        }
    }

    /// Checks the invariants a template must hold before it may be stored
    /// or matched against.
    pub fn validate(&self, config: &EngineConfig) -> DocAnchorResult<()> {
        let vendor = self.vendor_name();
        if vendor.trim().is_empty() {
            return Err(DocAnchorError::InvalidVendorName(vendor.to_string()));
        }
        if let Some(missing) = config
            .mandatory_fields()
            .find(|name| !self.fields().iter().any(|f| f.field_name == *name))
        {
            return Err(DocAnchorError::MissingMandatoryField(missing.to_string()));
        }
        if let Self::TwoAnchorFeatures(t) = self {
            let required = config.features.min_features_for_valid_anchor;
            for anchor in [&t.primary_anchor, &t.secondary_anchor] {
                if anchor.len() < required {
                    return Err(DocAnchorError::InsufficientFeatures {
                        found: anchor.len(),
                        required,
                    });
                }
            }
        }
        Ok(())
    }
}
