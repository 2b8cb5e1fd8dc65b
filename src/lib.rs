//! Vendor identification and geometric anchoring for scanned invoices.
//!
//! A page is identified against a cache of vendor templates, first by
//! perceptual hashes ([`matching::HashTriageMatcher`]) and then by two ORB
//! anchors locked to one similarity transform
//! ([`matching::AnchorFeatureMatcher`]). The learned field boxes of the
//! matched template are projected onto the page ([`projection`]) and read
//! through a [`extraction::TextExtractor`]. Pages nobody recognises feed
//! the [`learning::LearningOrchestrator`].

pub mod algorithms;
pub mod config;
pub mod error;
pub mod extraction;
pub mod geometry;
pub mod learning;
pub mod matching;
pub mod projection;
pub mod template;

pub use config::{EngineConfig, FieldSpec};
pub use error::{DocAnchorError, DocAnchorResult};
pub use geometry::BoundingBox;
pub use matching::{MatchResult, VendorIdentifier};
pub use template::{cache::TemplateCache, store::TemplateStore, MatchStrategy, Template};
