//! Error types for docanchor.

use std::path::PathBuf;

use thiserror::Error;

use crate::geometry::BoundingBox;

/// Result alias for docanchor operations.
pub type DocAnchorResult<T> = std::result::Result<T, DocAnchorError>;

/// Errors raised while learning, persisting or decoding templates.
///
/// Matching itself never fails: a page that cannot be identified is a
/// regular `None` outcome.
#[derive(Debug, Error)]
pub enum DocAnchorError {
    #[error("i/o failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template json: {0}")]
    Json(#[from] serde_json::Error),
    /// A persisted record could not be turned into a usable template.
    #[error("malformed template '{vendor}': {reason}")]
    Decode { vendor: String, reason: String },
    /// An anchor region produced too few keypoints to be distinctive.
    #[error("anchor region yields {found} features, at least {required} required")]
    InsufficientFeatures { found: usize, required: usize },
    #[error("{descriptors} descriptors but {keypoints} keypoint positions")]
    DescriptorLength { descriptors: usize, keypoints: usize },
    #[error("mandatory field '{0}' is missing")]
    MissingMandatoryField(String),
    #[error("vendor name {0:?} does not produce a usable file name")]
    InvalidVendorName(String),
    #[error("region {0:?} does not lie on the page")]
    RegionOutsidePage(BoundingBox),
    #[error("invalid perceptual hash {0:?}")]
    InvalidHash(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DocAnchorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(vendor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            vendor: vendor.into(),
            reason: reason.into(),
        }
    }
}
