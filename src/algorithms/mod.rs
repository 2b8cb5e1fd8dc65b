//! Collection of general image algorithms the matchers are built from:
//! feature detection and description, perceptual hashing and
//! robust 2D transform estimation

pub mod brief;
pub mod hashing;
pub mod orb;
pub mod pyramid;
pub mod similarity;
