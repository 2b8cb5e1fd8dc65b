//! On-disk JSON shape of a template and its decoding into [`Template`].
//!
//! Records written before `match_strategy` existed are still accepted; their
//! strategy is inferred from the keys they carry.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::{
    algorithms::{brief::DESCRIPTOR_SIZE, hashing::PerceptualHash, orb::OrbDescriptor},
    config::EngineConfig,
    error::{DocAnchorError, DocAnchorResult},
    geometry::BoundingBox,
    template::{Anchor, FeatureTemplate, FieldBox, LegacyTemplate, MatchStrategy, Template},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub vendor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_strategy: Option<MatchStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_anchor: Option<AnchorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_anchor: Option<AnchorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_area: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triage_hash: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub bounding_box: BoundingBox,
    /// Raw descriptor bytes, 32 per keypoint, base64 encoded.
    pub descriptors_b64: String,
    pub keypoints_pts: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub field_name: String,
    pub coordinates: BoundingBox,
}

impl From<&Anchor> for AnchorRecord {
    fn from(anchor: &Anchor) -> Self {
        Self {
            bounding_box: *anchor.bounding_box(),
            descriptors_b64: BASE64.encode(anchor.descriptors().concat()),
            keypoints_pts: anchor.keypoints().iter().map(|p| [p.x, p.y]).collect(),
        }
    }
}

impl From<&FieldBox> for FieldRecord {
    fn from(field: &FieldBox) -> Self {
        Self {
            field_name: field.field_name.clone(),
            coordinates: field.bounding_box,
        }
    }
}

impl From<&Template> for TemplateRecord {
    fn from(template: &Template) -> Self {
        let fields = template.fields().iter().map(FieldRecord::from).collect();
        match template {
            Template::TwoAnchorFeatures(t) => Self {
                vendor_name: t.vendor_name.clone(),
                match_strategy: Some(MatchStrategy::TwoAnchorFeatures),
                primary_anchor: Some(AnchorRecord::from(&t.primary_anchor)),
                secondary_anchor: Some(AnchorRecord::from(&t.secondary_anchor)),
                identifier_area: None,
                identifier_hash: None,
                triage_hash: None,
                fields,
            },
            Template::LegacyPerceptualHash(t) => Self {
                vendor_name: t.vendor_name.clone(),
                match_strategy: Some(MatchStrategy::LegacyPerceptualHash),
                primary_anchor: None,
                secondary_anchor: None,
                identifier_area: Some(t.identifier_area),
                identifier_hash: Some(t.precise_hash.to_hex()),
                triage_hash: t.triage_hash.map(|h| h.to_hex()),
                fields,
            },
        }
    }
}

impl TemplateRecord {
    /// Strategy declared by the record, or inferred from its keys.
    pub fn strategy(&self) -> Option<MatchStrategy> {
        self.match_strategy.or_else(|| {
            if self.primary_anchor.is_some() && self.secondary_anchor.is_some() {
                Some(MatchStrategy::TwoAnchorFeatures)
            } else if self.identifier_hash.is_some() {
                Some(MatchStrategy::LegacyPerceptualHash)
            } else {
                None
            }
        })
    }

    /// Decodes and validates the record.
    pub fn decode(&self, config: &EngineConfig) -> DocAnchorResult<Template> {
        let vendor = self.vendor_name.as_str();
        let fields = self
            .fields
            .iter()
            .map(|f| FieldBox::new(&f.field_name, f.coordinates))
            .collect();

        let template: Template = match self.strategy() {
            Some(MatchStrategy::TwoAnchorFeatures) => {
                let min = config.features.min_features_for_valid_anchor;
                let primary = self
                    .primary_anchor
                    .as_ref()
                    .ok_or_else(|| DocAnchorError::decode(vendor, "missing primary anchor"))?;
                let secondary = self
                    .secondary_anchor
                    .as_ref()
                    .ok_or_else(|| DocAnchorError::decode(vendor, "missing secondary anchor"))?;
                FeatureTemplate {
                    vendor_name: self.vendor_name.clone(),
                    primary_anchor: primary.decode(vendor, min)?,
                    secondary_anchor: secondary.decode(vendor, min)?,
                    fields,
                }
                .into()
            }
            Some(MatchStrategy::LegacyPerceptualHash) => {
                let identifier_area = self
                    .identifier_area
                    .ok_or_else(|| DocAnchorError::decode(vendor, "missing identifier area"))?;
                let precise_hash = self
                    .identifier_hash
                    .as_deref()
                    .ok_or_else(|| DocAnchorError::decode(vendor, "missing identifier hash"))
                    .and_then(PerceptualHash::from_hex)?;
                let triage_hash = self
                    .triage_hash
                    .as_deref()
                    .map(PerceptualHash::from_hex)
                    .transpose()?;
                LegacyTemplate {
                    vendor_name: self.vendor_name.clone(),
                    identifier_area,
                    precise_hash,
                    triage_hash,
                    fields,
                }
                .into()
            }
            None => {
                return Err(DocAnchorError::decode(
                    vendor,
                    "neither anchors nor an identifier hash present",
                ))
            }
        };

        template.validate(config)?;
        Ok(template)
    }
}

impl AnchorRecord {
    fn decode(&self, vendor: &str, min_features: usize) -> DocAnchorResult<Anchor> {
        let bytes = BASE64
            .decode(self.descriptors_b64.trim())
            .map_err(|e| DocAnchorError::decode(vendor, format!("descriptor base64: {e}")))?;
        if bytes.len() % DESCRIPTOR_SIZE != 0 {
            return Err(DocAnchorError::decode(
                vendor,
                format!(
                    "{} descriptor bytes is not a multiple of {DESCRIPTOR_SIZE}",
                    bytes.len()
                ),
            ));
        }
        let descriptors = bytes
            .chunks_exact(DESCRIPTOR_SIZE)
            .map(|chunk| {
                let mut descriptor: OrbDescriptor = [0; DESCRIPTOR_SIZE];
                descriptor.copy_from_slice(chunk);
                descriptor
            })
            .collect();
        let keypoints = self
            .keypoints_pts
            .iter()
            .map(|&[x, y]| Vector2::new(x, y))
            .collect();
        Anchor::new(self.bounding_box, descriptors, keypoints, min_features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor_record(n: usize) -> AnchorRecord {
        AnchorRecord {
            bounding_box: BoundingBox::new(10, 10, 50, 40),
            descriptors_b64: BASE64.encode(vec![0xA5u8; n * DESCRIPTOR_SIZE]),
            keypoints_pts: (0..n).map(|i| [10.0 + i as f64, 20.0]).collect(),
        }
    }

    fn invoice_field() -> FieldRecord {
        FieldRecord {
            field_name: "invoice_number".into(),
            coordinates: BoundingBox::new(300, 40, 120, 24),
        }
    }

    #[test]
    fn legacy_record_without_strategy_tag_decodes() {
        let json = r#"{
            "vendor_name": "Staples Inc",
            "identifier_area": {"x": 10, "y": 5, "width": 200, "height": 60},
            "identifier_hash": "c3c3c3c3c3c3c3c3",
            "fields": [{"field_name": "invoice_number",
                        "coordinates": {"x": 400, "y": 50, "width": 150, "height": 30}}]
        }"#;
        let record: TemplateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.strategy(), Some(MatchStrategy::LegacyPerceptualHash));

        let Template::LegacyPerceptualHash(template) =
            record.decode(&EngineConfig::default()).unwrap()
        else {
            panic!("expected a legacy template");
        };
        assert_eq!(template.triage_hash, None);
        assert_eq!(template.precise_hash.to_hex(), "c3c3c3c3c3c3c3c3");
    }

    #[test]
    fn feature_record_round_trips_through_json() {
        let record = TemplateRecord {
            vendor_name: "Acme".into(),
            match_strategy: Some(MatchStrategy::TwoAnchorFeatures),
            primary_anchor: Some(anchor_record(24)),
            secondary_anchor: Some(anchor_record(30)),
            identifier_area: None,
            identifier_hash: None,
            triage_hash: None,
            fields: vec![invoice_field()],
        };
        let config = EngineConfig::default();
        let template = record.decode(&config).unwrap();
        let Template::TwoAnchorFeatures(decoded) = &template else {
            panic!("expected a feature template");
        };
        assert_eq!(decoded.primary_anchor.len(), 24);
        assert_eq!(decoded.secondary_anchor.keypoints()[3], Vector2::new(13.0, 20.0));

        let json = serde_json::to_string(&TemplateRecord::from(&template)).unwrap();
        assert!(!json.contains("identifier_hash"));
        let reread: TemplateRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(reread, record);
    }

    #[test]
    fn truncated_descriptor_bytes_fail_to_decode() {
        let mut anchor = anchor_record(24);
        anchor.descriptors_b64 = BASE64.encode(vec![1u8; 24 * DESCRIPTOR_SIZE - 3]);
        let record = TemplateRecord {
            vendor_name: "Acme".into(),
            match_strategy: None,
            primary_anchor: Some(anchor),
            secondary_anchor: Some(anchor_record(24)),
            identifier_area: None,
            identifier_hash: None,
            triage_hash: None,
            fields: vec![invoice_field()],
        };
        assert!(matches!(
            record.decode(&EngineConfig::default()),
            Err(DocAnchorError::Decode { .. })
        ));
    }

    #[test]
    fn tagged_feature_record_missing_secondary_anchor_fails() {
        let record = TemplateRecord {
            vendor_name: "Acme".into(),
            match_strategy: Some(MatchStrategy::TwoAnchorFeatures),
            primary_anchor: Some(anchor_record(24)),
            secondary_anchor: None,
            identifier_area: None,
            identifier_hash: None,
            triage_hash: None,
            fields: vec![invoice_field()],
        };
        let err = record.decode(&EngineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("missing secondary anchor"));
    }
}
