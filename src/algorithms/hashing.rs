//! Perceptual hashes for the legacy identification path.
//!
//! Both hashes are 64 bits laid out row-major, most significant bit first,
//! and render as 16 lowercase hex digits, matching the files written by
//! earlier releases.

use std::{f64::consts::PI, fmt};

use bitarray::BitArray;
use image::{imageops, imageops::FilterType, GrayImage};

use crate::error::{DocAnchorError, DocAnchorResult};

const HASH_SIZE: u32 = 8;
const HASH_BYTES: usize = (HASH_SIZE * HASH_SIZE / u8::BITS) as usize;
/// The DCT hash samples a 4x larger thumbnail than it keeps.
const PHASH_HIGHFREQ_FACTOR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash([u8; HASH_BYTES]);

impl PerceptualHash {
    pub fn from_bytes(bytes: [u8; HASH_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_BYTES] {
        &self.0
    }

    pub fn from_hex(hex: &str) -> DocAnchorResult<Self> {
        let hex = hex.trim();
        if hex.len() != HASH_BYTES * 2 || !hex.is_ascii() {
            return Err(DocAnchorError::InvalidHash(hex.to_string()));
        }
        let mut bytes = [0; HASH_BYTES];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
                .map_err(|_| DocAnchorError::InvalidHash(hex.to_string()))?;
        }
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Number of differing bits.
    pub fn distance(&self, other: &Self) -> u32 {
        BitArray::new(self.0).distance(&BitArray::new(other.0))
    }

    fn from_bits(bits: impl Iterator<Item = bool>) -> Self {
        let mut bytes = [0; HASH_BYTES];
        for (i, bit) in bits.take(HASH_BYTES * 8).enumerate() {
            bytes[i >> 3] |= (bit as u8) << (7 - (i & 7));
        }
        Self(bytes)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Coarse hash: each bit tells whether a cell of an 8x8 thumbnail is
/// brighter than the thumbnail mean. Used for whole-page triage.
pub fn average_hash(image: &GrayImage) -> PerceptualHash {
    let thumbnail = imageops::resize(image, HASH_SIZE, HASH_SIZE, FilterType::Lanczos3);
    let pixels: Vec<f64> = thumbnail.pixels().map(|p| p.0[0] as f64).collect();
    let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
    PerceptualHash::from_bits(pixels.iter().map(|&p| p > mean))
}

/// DCT hash: the lowest 8x8 frequencies of a 32x32 thumbnail compared
/// against their median. Used on identifier regions.
pub fn phash(image: &GrayImage) -> PerceptualHash {
    let side = HASH_SIZE * PHASH_HIGHFREQ_FACTOR;
    let thumbnail = imageops::resize(image, side, side, FilterType::Lanczos3);
    let n = side as usize;
    let pixels: Vec<f64> = thumbnail.pixels().map(|p| p.0[0] as f64).collect();

    // separable 2D DCT-II: columns first, then rows
    let mut columns = vec![0.0; n * n];
    for x in 0..n {
        let column: Vec<f64> = (0..n).map(|y| pixels[y * n + x]).collect();
        for (k, value) in dct_ii(&column).into_iter().enumerate() {
            columns[k * n + x] = value;
        }
    }
    let keep = HASH_SIZE as usize;
    let mut low = Vec::with_capacity(keep * keep);
    for row in columns.chunks(n).take(keep) {
        low.extend(dct_ii(row).into_iter().take(keep));
    }

    let median = median(&low);
    PerceptualHash::from_bits(low.iter().map(|&v| v > median))
}

/// Unnormalised DCT-II. Scale is irrelevant since bits come from comparisons.
fn dct_ii(input: &[f64]) -> Vec<f64> {
    let n = input.len() as f64;
    (0..input.len())
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(i, &x)| x * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .sum::<f64>()
                * 2.0
        })
        .collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
