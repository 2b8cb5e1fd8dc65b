//! Two-anchor verification: the primary anchor fixes a similarity transform
//! by consensus, the secondary anchor must land where that transform puts it.

use std::{fmt, sync::Arc};

use arrsac::Arrsac;
use bitarray::BitArray;
use rand::{rngs::StdRng, SeedableRng};
use sample_consensus::Consensus;
use space::{Knn, KnnFromBatch, LinearKnn, Metric};
use tracing::debug;

use crate::{
    algorithms::{
        orb::OrbFeature,
        similarity::{Correspondence, SimilarityEstimator, SimilarityTransform},
    },
    config::MatchingConfig,
    template::{Anchor, FeatureTemplate},
};

/// Transform recovered from the primary anchor, with the evidence for it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricLock {
    /// Maps template coordinates onto the page.
    pub transform: SimilarityTransform,
    /// Primary anchor inliers, template point first.
    pub correspondences: Vec<Correspondence>,
    /// Secondary matches that landed within tolerance of their prediction.
    pub secondary_consistent: usize,
}

/// Why a template was not confirmed for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooFewPrimaryMatches { found: usize },
    NoPrimaryTransform,
    TooFewPrimaryInliers { found: usize },
    InconsistentSecondary { consistent: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewPrimaryMatches { found } => write!(f, "{found} primary matches"),
            Self::NoPrimaryTransform => write!(f, "no primary transform"),
            Self::TooFewPrimaryInliers { found } => write!(f, "{found} primary inliers"),
            Self::InconsistentSecondary { consistent } => {
                write!(f, "{consistent} consistent secondary matches")
            }
        }
    }
}

/// Page features prepared for nearest neighbour search.
pub struct PageIndex<'p> {
    entries: Vec<(&'p OrbFeature, ())>,
}

impl<'p> PageIndex<'p> {
    pub fn new(features: &'p [OrbFeature]) -> Self {
        Self {
            entries: features.iter().map(|f| (f, ())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matches every anchor descriptor against the page and keeps the
    /// unambiguous ones, returned as (template point, page point).
    pub fn ratio_matches(&self, anchor: &Anchor, lowe_ratio: f32) -> Vec<Correspondence> {
        if self.entries.len() < 2 {
            return Vec::new();
        }
        // queries must outlive the search, which borrows page and anchor features alike
        let queries: Vec<OrbFeature> = anchor
            .descriptors()
            .iter()
            .zip(anchor.keypoints())
            .map(|(&descriptor, &keypoint)| OrbFeature {
                keypoint,
                descriptor,
            })
            .collect();
        let search: LinearKnn<DescriptorHamming, _> = KnnFromBatch::from_batch(self.entries.iter());

        queries
            .iter()
            .filter_map(|query| {
                // k = 2 so Lowe's test can discard matches two page features explain equally well
                let nearest = search.knn(&query, 2);
                if nearest.len() < 2 {
                    return None;
                }
                let (best, second) = (nearest[0].0.distance, nearest[1].0.distance);
                if (best as f32) < lowe_ratio * second as f32 {
                    Some((query.keypoint, nearest[0].1.keypoint))
                } else {
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AnchorFeatureMatcher {
    config: MatchingConfig,
}

impl AnchorFeatureMatcher {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// First template, in order, confirmed by both anchors.
    pub fn identify(
        &self,
        page: &PageIndex,
        templates: &[Arc<FeatureTemplate>],
    ) -> Option<(Arc<FeatureTemplate>, GeometricLock)> {
        templates.iter().find_map(|template| match self.verify(page, template) {
            Ok(lock) => Some((template.clone(), lock)),
            Err(rejection) => {
                debug!(vendor = %template.vendor_name, %rejection, "template rejected");
                None
            }
        })
    }

    /// Runs the primary lock and the secondary consistency check for one template.
    pub fn verify(
        &self,
        page: &PageIndex,
        template: &FeatureTemplate,
    ) -> Result<GeometricLock, Rejection> {
        let config = &self.config;
        let primary = page.ratio_matches(&template.primary_anchor, config.lowe_ratio);
        if primary.len() < config.min_primary_inliers {
            return Err(Rejection::TooFewPrimaryMatches {
                found: primary.len(),
            });
        }

        let (transform, correspondences) = self.primary_lock(&primary)?;

        let secondary = page.ratio_matches(&template.secondary_anchor, config.lowe_ratio);
        let consistent = count_consistent(
            &transform,
            &secondary,
            config.secondary_verification_threshold_px,
        );
        if consistent < config.min_secondary_inliers_consistent {
            return Err(Rejection::InconsistentSecondary { consistent });
        }

        Ok(GeometricLock {
            transform,
            correspondences,
            secondary_consistent: consistent,
        })
    }

    /// Consensus estimate over the primary matches, refined by least squares
    /// on the inliers it found.
    fn primary_lock(
        &self,
        matches: &[Correspondence],
    ) -> Result<(SimilarityTransform, Vec<Correspondence>), Rejection> {
        let threshold = self.config.ransac_inlier_threshold_px;
        let rng = StdRng::seed_from_u64(self.config.ransac_seed);
        let (model, inliers) = Arrsac::new(threshold, rng)
            .model_inliers(&SimilarityEstimator, matches.iter())
            .ok_or(Rejection::NoPrimaryTransform)?;

        let refined =
            SimilarityTransform::fit(inliers.iter().map(|&i| &matches[i])).unwrap_or(model);
        let correspondences: Vec<Correspondence> = matches
            .iter()
            .filter(|pair| refined.reprojection_error(pair) <= threshold)
            .copied()
            .collect();
        if correspondences.len() < self.config.min_primary_inliers {
            return Err(Rejection::TooFewPrimaryInliers {
                found: correspondences.len(),
            });
        }
        Ok((refined, correspondences))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DescriptorHamming;

impl<'f> Metric<&'f OrbFeature> for DescriptorHamming {
    type Unit = u32;
    fn distance(&self, a: &&OrbFeature, b: &&OrbFeature) -> Self::Unit {
        BitArray::new(a.descriptor).distance(&BitArray::new(b.descriptor))
    }
}

/// Matches that `transform` maps strictly closer than `threshold_px` to their page point.
fn count_consistent(
    transform: &SimilarityTransform,
    matches: &[Correspondence],
    threshold_px: f64,
) -> usize {
    matches
        .iter()
        .filter(|pair| transform.reprojection_error(pair) < threshold_px)
        .count()
}
