use image::GrayImage;
use once_cell::sync::Lazy;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

pub type BinaryDescriptor<const N: usize> = [u8; N];

/// 256 sampled intensity comparisons packed into 32 bytes.
pub const DESCRIPTOR_SIZE: usize = 256 / u8::BITS as usize;
const PAIR_COUNT: usize = DESCRIPTOR_SIZE * u8::BITS as usize;

/// Half-width of the square patch the comparison pairs are drawn from.
pub const PATCH_RADIUS: i32 = 15;

/// Compute a steered BRIEF (Binary Robust Independent Elementary Features) descriptor
/// for the keypoint at `(x, y)` whose dominant orientation is `angle` radians.
///
/// The sample pattern is rotated by `angle` before sampling so that the same
/// physical corner yields the same bits on a rotated page. Expects an already
/// smoothed image; samples falling outside the image read as `0`.
pub fn compute_descriptor(
    x: f64,
    y: f64,
    angle: f32,
    image: &GrayImage,
) -> BinaryDescriptor<DESCRIPTOR_SIZE> {
    let (sin, cos) = (angle as f64).sin_cos();
    let sample = |dx: i16, dy: i16| -> u8 {
        let (dx, dy) = (dx as f64, dy as f64);
        let px = (x + cos * dx - sin * dy).round();
        let py = (y + sin * dx + cos * dy).round();
        if px >= 0.0 && py >= 0.0 && px < image.width() as f64 && py < image.height() as f64 {
            image.get_pixel(px as u32, py as u32).0[0]
        } else {
            0
        }
    };

    let mut descriptor = [0; DESCRIPTOR_SIZE];
    for (i, &[p1x, p1y, p2x, p2y]) in BRIEF256_SAMPLES.iter().enumerate() {
        let bit = (sample(p1x, p1y) < sample(p2x, p2y)) as u8;
        descriptor[i >> 3] |= bit << (7 - (i & 7));
    }
    descriptor
}

/// Precomputed comparison pairs for the BRIEF tests.
/// The pattern must stay identical between the page a template was learned on
/// and every page it is later compared against, so the generator is seeded.
static BRIEF256_SAMPLES: Lazy<[[i16; 4]; PAIR_COUNT]> = Lazy::new(|| {
    // isotropic gaussian with sigma^2 = S^2 / 25 as in the BRIEF paper,
    // clipped to the patch so every test stays local to the keypoint
    const SIGMA: f64 = (2 * PATCH_RADIUS + 1) as f64 / 5.0;

    let mut rng = StdRng::seed_from_u64(42);
    let mut offset = || {
        let value: f64 = rng.sample(StandardNormal);
        (value * SIGMA).round().clamp(-PATCH_RADIUS as f64, PATCH_RADIUS as f64) as i16
    };

    let mut samples = [[0; 4]; PAIR_COUNT];
    for pair in samples.iter_mut() {
        *pair = [offset(), offset(), offset(), offset()];
    }
    samples
});

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn sample_pattern_is_stable_and_local() {
        let first = *BRIEF256_SAMPLES;
        assert_eq!(first.len(), 256);
        assert!(first
            .iter()
            .flatten()
            .all(|&v| (-PATCH_RADIUS as i16..=PATCH_RADIUS as i16).contains(&v)));
        // not degenerate: most pairs compare two different pixels
        let distinct = first
            .iter()
            .filter(|[a, b, c, d]| (a, b) != (c, d))
            .count();
        assert!(distinct > 200);
    }

    #[test]
    fn flat_image_produces_empty_descriptor() {
        let image = GrayImage::from_pixel(64, 64, Luma([128]));
        assert_eq!(compute_descriptor(32.0, 32.0, 0.0, &image), [0; DESCRIPTOR_SIZE]);
    }

    #[test]
    fn identical_neighbourhoods_give_identical_descriptors() {
        let image = GrayImage::from_fn(96, 96, |x, y| Luma([((x * 7 + y * 13) % 251) as u8]));
        let mut shifted = GrayImage::from_pixel(96, 96, Luma([0]));
        for (x, y, p) in image.enumerate_pixels() {
            if x + 5 < 96 && y + 3 < 96 {
                shifted.put_pixel(x + 5, y + 3, *p);
            }
        }
        assert_eq!(
            compute_descriptor(40.0, 40.0, 0.3, &image),
            compute_descriptor(45.0, 43.0, 0.3, &shifted)
        );
    }
}
