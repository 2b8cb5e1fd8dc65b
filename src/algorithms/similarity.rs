use nalgebra::{Matrix3, Vector2, Vector3};
use sample_consensus::{Estimator, Model};
use serde::{Deserialize, Serialize};

/// Template point and the page point it was matched to.
pub type Correspondence = (Vector2<f64>, Vector2<f64>);

/// 2D similarity (rotation, uniform scale, translation) held as a homogeneous `3x3` matrix:
/// ```plain
/// [a -b tx]
/// [b  a ty]
/// [0  0  1]
/// a = s cos(theta), b = s sin(theta)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform(Matrix3<f64>);

impl SimilarityTransform {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    pub fn from_params(a: f64, b: f64, tx: f64, ty: f64) -> Self {
        Self(Matrix3::new(a, -b, tx, b, a, ty, 0.0, 0.0, 1.0))
    }

    pub fn from_scale_rotation_translation(scale: f64, radians: f64, tx: f64, ty: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self::from_params(scale * cos, scale * sin, tx, ty)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    pub fn scale(&self) -> f64 {
        self.0.m11.hypot(self.0.m21)
    }

    pub fn rotation(&self) -> f64 {
        self.0.m21.atan2(self.0.m11)
    }

    pub fn translation(&self) -> Vector2<f64> {
        Vector2::new(self.0.m13, self.0.m23)
    }

    pub fn apply(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let mapped = self.0 * Vector3::new(point.x, point.y, 1.0);
        Vector2::new(mapped.x, mapped.y)
    }

    /// Euclidean reprojection error of one correspondence.
    pub fn reprojection_error(&self, (src, dst): &Correspondence) -> f64 {
        (self.apply(src) - dst).norm()
    }

    /// Least-squares similarity mapping every `src` onto its `dst`.
    ///
    /// Returns `None` when the source points are (numerically) coincident,
    /// since rotation and scale are then undetermined.
    pub fn fit<'a, I>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Correspondence>,
        I::IntoIter: Clone,
    {
        let pairs = pairs.into_iter();
        let count = pairs.clone().count();
        if count < SimilarityEstimator::MIN_SAMPLES {
            return None;
        }

        let (src_sum, dst_sum) = pairs.clone().fold(
            (Vector2::<f64>::zeros(), Vector2::<f64>::zeros()),
            |(s, d), (src, dst)| (s + src, d + dst),
        );
        let src_centroid: Vector2<f64> = src_sum / count as f64;
        let dst_centroid: Vector2<f64> = dst_sum / count as f64;

        // closed form over centred coordinates:
        // a = sum(p.q) / sum(|p|^2), b = sum(p x q) / sum(|p|^2)
        let (mut dot, mut cross, mut norm) = (0.0, 0.0, 0.0);
        for (src, dst) in pairs {
            let p = src - src_centroid;
            let q = dst - dst_centroid;
            dot += p.dot(&q);
            cross += p.x * q.y - p.y * q.x;
            norm += p.norm_squared();
        }
        if norm < f64::EPSILON {
            return None;
        }

        let (a, b) = (dot / norm, cross / norm);
        let tx = dst_centroid.x - (a * src_centroid.x - b * src_centroid.y);
        let ty = dst_centroid.y - (b * src_centroid.x + a * src_centroid.y);
        Some(Self::from_params(a, b, tx, ty))
    }
}

/// Plain-data form used when a transform is reported outside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub scale: f64,
    pub rotation_deg: f64,
    pub translation: [f64; 2],
}

impl From<&SimilarityTransform> for TransformSummary {
    fn from(transform: &SimilarityTransform) -> Self {
        let t = transform.translation();
        Self {
            scale: transform.scale(),
            rotation_deg: transform.rotation().to_degrees(),
            translation: [t.x, t.y],
        }
    }
}

// Implementations for `sample_consensus`

impl<'a> Model<&'a Correspondence> for SimilarityTransform {
    fn residual(&self, data: &&'a Correspondence) -> f64 {
        self.reprojection_error(data)
    }
}

/// Minimal-sample solver: two correspondences fix the four degrees of freedom.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimilarityEstimator;

impl<'a> Estimator<&'a Correspondence> for SimilarityEstimator {
    const MIN_SAMPLES: usize = 2;
    type Model = SimilarityTransform;
    type ModelIter = Option<SimilarityTransform>;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = &'a Correspondence> + Clone,
    {
        SimilarityTransform::fit(data)
    }
}
