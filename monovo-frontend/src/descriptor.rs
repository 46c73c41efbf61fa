//! Descriptor extraction capability and the oriented BRIEF variant
//!
//! The BRIEF variant compares 256 pixel pairs inside a smoothed patch around
//! each keypoint. Pair offsets are drawn once from an isotropic Gaussian
//! (seeded, so every extractor produces the same pattern) and rotated by the
//! keypoint orientation before sampling, which is what ORB calls rBRIEF.

use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::detector::KeyPoint;
use crate::error::Result;

/// A 256-bit binary descriptor stored as 4 x u64
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryDescriptor(pub [u64; 4]);

impl BinaryDescriptor {
    pub const BITS: u32 = 256;

    pub fn zeros() -> Self {
        Self([0; 4])
    }

    /// Number of differing bits (0-256)
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    fn set_bit(&mut self, bit: usize) {
        self.0[bit / 64] |= 1 << (bit % 64);
    }
}

/// Description capability
///
/// The returned sequence is index-aligned with `keypoints`. A `None` slot
/// means no descriptor can be computed for that keypoint (its patch leaves
/// the image).
pub trait DescriptorExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn describe(
        &self,
        image: &GrayImage,
        keypoints: &[KeyPoint],
    ) -> Result<Vec<Option<BinaryDescriptor>>>;
}

/// Half-width of the sampling patch; keypoints closer than this to the
/// border are not described
pub const PATCH_RADIUS: f32 = 15.0;

/// Pair offsets stay inside this radius so rotated samples remain in the patch
const MAX_OFFSET: f32 = 10.0;
const PATTERN_SEED: u64 = 0x0b5e_55ed;

/// Oriented BRIEF extractor
#[derive(Debug, Clone)]
pub struct BriefExtractor {
    /// Sampling pairs (x1, y1, x2, y2) in the unrotated frame
    pattern: Vec<[f32; 4]>,
    /// Gaussian smoothing applied before sampling (<= 0 disables it)
    smoothing_sigma: f32,
}

impl Default for BriefExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl BriefExtractor {
    pub fn new() -> Self {
        Self::with_smoothing(2.0)
    }

    pub fn with_smoothing(smoothing_sigma: f32) -> Self {
        Self {
            pattern: sampling_pattern(),
            smoothing_sigma,
        }
    }

    /// Descriptor for a single keypoint of an already smoothed image
    fn compute(&self, image: &GrayImage, keypoint: &KeyPoint) -> Option<BinaryDescriptor> {
        let (width, height) = image.dimensions();
        let (cx, cy) = (keypoint.x, keypoint.y);
        if cx < PATCH_RADIUS
            || cy < PATCH_RADIUS
            || cx >= width as f32 - PATCH_RADIUS
            || cy >= height as f32 - PATCH_RADIUS
        {
            return None;
        }

        let (sin_a, cos_a) = keypoint.angle.sin_cos();
        let sample = |dx: f32, dy: f32| {
            let x = (cx + dx * cos_a - dy * sin_a).round() as u32;
            let y = (cy + dx * sin_a + dy * cos_a).round() as u32;
            image.get_pixel(x, y).0[0]
        };

        let mut descriptor = BinaryDescriptor::zeros();
        for (bit, &[x1, y1, x2, y2]) in self.pattern.iter().enumerate() {
            if sample(x1, y1) > sample(x2, y2) {
                descriptor.set_bit(bit);
            }
        }
        Some(descriptor)
    }
}

impl DescriptorExtractor for BriefExtractor {
    fn name(&self) -> &'static str {
        "brief"
    }

    fn describe(
        &self,
        image: &GrayImage,
        keypoints: &[KeyPoint],
    ) -> Result<Vec<Option<BinaryDescriptor>>> {
        if keypoints.is_empty() {
            return Ok(Vec::new());
        }

        let smoothed;
        let image = if self.smoothing_sigma > 0.0 {
            smoothed = gaussian_blur_f32(image, self.smoothing_sigma);
            &smoothed
        } else {
            image
        };

        Ok(keypoints.iter().map(|kp| self.compute(image, kp)).collect())
    }
}

/// 256 point pairs drawn from N(0, (patch/5)^2), clamped to `MAX_OFFSET`
fn sampling_pattern() -> Vec<[f32; 4]> {
    let sigma = 2.0 * PATCH_RADIUS / 5.0;
    let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
    let mut offset = move || {
        let v: f32 = rng.sample(StandardNormal);
        (v * sigma).round().clamp(-MAX_OFFSET, MAX_OFFSET)
    };

    (0..BinaryDescriptor::BITS)
        .map(|_| [offset(), offset(), offset(), offset()])
        .collect()
}
