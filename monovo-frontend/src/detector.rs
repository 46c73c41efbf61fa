//! Keypoint detection capability and the FAST corner variant
//!
//! FAST-9 segment test: a pixel is a corner when 9 contiguous pixels on the
//! 16-pixel Bresenham circle of radius 3 are all brighter or all darker than
//! the centre by a threshold. Candidates are scored with the Harris response,
//! oriented by intensity centroid and thinned by grid non-maximum suppression.

use std::collections::HashMap;

use image::GrayImage;
use nalgebra::Point2;

use crate::error::Result;

/// A detected keypoint
///
/// Only `x`/`y` cross the tracking boundary; the remaining fields are
/// detector metadata carried for the descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    /// Column in pixels
    pub x: f32,
    /// Row in pixels
    pub y: f32,
    /// Diameter of the meaningful neighbourhood in pixels
    pub size: f32,
    /// Harris corner response (higher = stronger corner)
    pub response: f32,
    /// Orientation in radians
    pub angle: f32,
}

impl KeyPoint {
    /// Keypoint at a location with neutral metadata
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            size: FAST_KEYPOINT_SIZE,
            response: 0.0,
            angle: 0.0,
        }
    }

    pub fn point(&self) -> Point2<f32> {
        Point2::new(self.x, self.y)
    }
}

/// Detection capability: image in, keypoints out
pub trait FeatureDetector: Send + Sync {
    /// Short identifier reported alongside detection results
    fn name(&self) -> &'static str;

    fn detect(&self, image: &GrayImage) -> Result<Vec<KeyPoint>>;
}

const FAST_KEYPOINT_SIZE: f32 = 7.0;

/// Offsets of the radius-3 Bresenham circle, clockwise from the top
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

const ARC_LENGTH: usize = 9;
const ORIENTATION_RADIUS: i32 = 7;

/// FAST corner detector with Harris scoring and grid-based NMS
#[derive(Debug, Clone)]
pub struct FastDetector {
    /// Intensity difference threshold for the segment test
    threshold: u8,
    /// Cell size in pixels for non-maximum suppression (0 disables NMS)
    grid_size: usize,
    /// Maximum number of keypoints returned, strongest first
    max_features: usize,
    /// Harris corner response parameter
    harris_k: f32,
}

impl Default for FastDetector {
    fn default() -> Self {
        Self {
            threshold: 20,
            grid_size: 16,
            max_features: 500,
            harris_k: 0.04,
        }
    }
}

impl FastDetector {
    pub fn new(threshold: u8, grid_size: usize, max_features: usize) -> Self {
        Self {
            threshold,
            grid_size,
            max_features,
            ..Self::default()
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn max_features(&self) -> usize {
        self.max_features
    }

    fn detect_corners(&self, image: &GrayImage) -> Vec<KeyPoint> {
        let (width, height) = image.dimensions();
        // 3-pixel border for the circle
        if width < 7 || height < 7 {
            return Vec::new();
        }

        let mut keypoints = Vec::new();
        for y in 3..height - 3 {
            for x in 3..width - 3 {
                if self.is_corner(image, x as i32, y as i32) {
                    keypoints.push(KeyPoint {
                        x: x as f32,
                        y: y as f32,
                        size: FAST_KEYPOINT_SIZE,
                        response: self.harris_response(image, x as i32, y as i32),
                        angle: intensity_centroid_angle(image, x as i32, y as i32),
                    });
                }
            }
        }

        let mut keypoints = self.suppress_non_maxima(keypoints);
        // Ties fall back to raster order; cells come out of a HashMap unordered
        keypoints.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        });
        keypoints.truncate(self.max_features);
        keypoints
    }

    fn is_corner(&self, image: &GrayImage, x: i32, y: i32) -> bool {
        let center = luma(image, x, y);
        let t = self.threshold as i16;
        let brighter = |v: i16| v > center + t;
        let darker = |v: i16| v < center - t;

        // Cardinal points first: any 9-arc covers at least 2 of them
        let cardinal = [0, 4, 8, 12].map(|i| {
            let (dx, dy) = CIRCLE[i];
            luma(image, x + dx, y + dy)
        });
        let bright_hits = cardinal.iter().filter(|&&v| brighter(v)).count();
        let dark_hits = cardinal.iter().filter(|&&v| darker(v)).count();
        if bright_hits < 2 && dark_hits < 2 {
            return false;
        }

        let ring: [i16; 16] = std::array::from_fn(|i| {
            let (dx, dy) = CIRCLE[i];
            luma(image, x + dx, y + dy)
        });

        longest_arc(&ring, brighter) >= ARC_LENGTH || longest_arc(&ring, darker) >= ARC_LENGTH
    }

    /// det(M) - k * trace(M)^2 over a 7x7 structure tensor
    fn harris_response(&self, image: &GrayImage, x: i32, y: i32) -> f32 {
        let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);
        for dy in -3..=3 {
            for dx in -3..=3 {
                let (ix, iy) = central_gradient(image, x + dx, y + dy);
                sxx += ix * ix;
                syy += iy * iy;
                sxy += ix * iy;
            }
        }
        let det = sxx * syy - sxy * sxy;
        let trace = sxx + syy;
        det - self.harris_k * trace * trace
    }

    /// Keep the strongest keypoint per grid cell
    fn suppress_non_maxima(&self, keypoints: Vec<KeyPoint>) -> Vec<KeyPoint> {
        if self.grid_size == 0 {
            return keypoints;
        }

        let mut cells: HashMap<(usize, usize), KeyPoint> = HashMap::new();
        for kp in keypoints {
            let cell = (
                kp.x as usize / self.grid_size,
                kp.y as usize / self.grid_size,
            );
            match cells.get(&cell) {
                Some(best) if best.response >= kp.response => {}
                _ => {
                    cells.insert(cell, kp);
                }
            }
        }
        cells.into_values().collect()
    }
}

impl FeatureDetector for FastDetector {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn detect(&self, image: &GrayImage) -> Result<Vec<KeyPoint>> {
        Ok(self.detect_corners(image))
    }
}

/// Length of the longest run of ring pixels satisfying `pred`, with wrap-around
fn longest_arc(ring: &[i16; 16], pred: impl Fn(i16) -> bool) -> usize {
    let mut run = 0;
    let mut longest = 0;
    for i in 0..32 {
        if pred(ring[i % 16]) {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest.min(16)
}

/// Intensity at (x, y), clamped to the image border
fn luma(image: &GrayImage, x: i32, y: i32) -> i16 {
    let (width, height) = image.dimensions();
    let x = x.clamp(0, width as i32 - 1) as u32;
    let y = y.clamp(0, height as i32 - 1) as u32;
    image.get_pixel(x, y).0[0] as i16
}

fn central_gradient(image: &GrayImage, x: i32, y: i32) -> (f32, f32) {
    let ix = (luma(image, x + 1, y) - luma(image, x - 1, y)) as f32 / 2.0;
    let iy = (luma(image, x, y + 1) - luma(image, x, y - 1)) as f32 / 2.0;
    (ix, iy)
}

/// Orientation of the patch centroid relative to (x, y), in radians
fn intensity_centroid_angle(image: &GrayImage, x: i32, y: i32) -> f32 {
    let (width, height) = image.dimensions();
    let (mut m10, mut m01) = (0.0f32, 0.0f32);

    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                continue;
            }
            let (px, py) = (x + dx, y + dy);
            if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                continue;
            }
            let intensity = image.get_pixel(px as u32, py as u32).0[0] as f32;
            m10 += dx as f32 * intensity;
            m01 += dy as f32 * intensity;
        }
    }

    m01.atan2(m10)
}
