//! Optical-flow capability and the pyramidal Lucas-Kanade variant
//!
//! Each point is tracked coarse to fine through an image pyramid. At every
//! level the displacement is refined iteratively by solving the 2x2 normal
//! equations of the windowed brightness-constancy residual.

use image::GrayImage;
use nalgebra::{Matrix2, Point2, Vector2};

use crate::error::{FrontendError, Result};

/// Per-point outcome reported by an optical-flow capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Tracked,
    /// The tracker could not follow the point (flat texture, divergence)
    Lost,
    /// The point was followed out of the visible frame
    OffScreen,
}

impl TrackStatus {
    /// Interpret a classic 0/1 status byte
    pub fn from_flag(flag: u8) -> Self {
        if flag == 0 {
            TrackStatus::Lost
        } else {
            TrackStatus::Tracked
        }
    }

    pub fn is_tracked(self) -> bool {
        self == TrackStatus::Tracked
    }
}

/// Iteration stop rule: whichever of the two limits is hit first
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermCriteria {
    pub max_iterations: usize,
    /// Stop once an update moves the estimate less than this (pixels)
    pub epsilon: f32,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            epsilon: 0.02,
        }
    }
}

/// Parameters handed to the flow capability on every call
#[derive(Debug, Clone, PartialEq)]
pub struct FlowParams {
    /// Full side length of the square search window (odd)
    pub window: u32,
    pub criteria: TermCriteria,
    /// Index of the coarsest pyramid level (0 = no pyramid)
    pub max_level: u32,
    /// Minimum eigenvalue of the window's gradient matrix divided by the
    /// window area, in OpenCV units (see [`EIGEN_UNIT_SCALE`]); weaker points
    /// are reported `Lost`
    pub min_eigen_threshold: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            window: 21,
            criteria: TermCriteria::default(),
            max_level: 0,
            min_eigen_threshold: 0.001,
        }
    }
}

/// Converts eigenvalues of central-difference gradients to OpenCV units.
///
/// Scharr derivatives are 32x a central difference and OpenCV scales the
/// gradient products by 2^-20, so thresholds are 1024x tighter than raw.
pub const EIGEN_UNIT_SCALE: f32 = 32.0 * 32.0 / (1u32 << 20) as f32;

/// Raw tracker output, index-aligned with the input points
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowOutput {
    pub points: Vec<Point2<f32>>,
    pub status: Vec<TrackStatus>,
    /// Mean absolute intensity difference over the window
    pub errors: Vec<f32>,
}

impl FlowOutput {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Optical-flow capability
pub trait OpticalFlow: Send + Sync {
    fn name(&self) -> &'static str;

    fn track(
        &self,
        prev_image: &GrayImage,
        next_image: &GrayImage,
        points: &[Point2<f32>],
        params: &FlowParams,
    ) -> Result<FlowOutput>;
}

/// Pyramidal Lucas-Kanade tracker
#[derive(Debug, Clone, Copy, Default)]
pub struct PyramidalLk;

struct PointTrack {
    position: Point2<f32>,
    status: TrackStatus,
    error: f32,
}

impl PyramidalLk {
    pub fn new() -> Self {
        Self
    }

    /// Halve the image until `max_level` is reached or a level would be
    /// smaller than the window
    fn build_pyramid(image: &GrayImage, max_level: u32, window: u32) -> Vec<GrayImage> {
        let mut pyramid = vec![image.clone()];
        for _ in 0..max_level {
            let Some(last) = pyramid.last() else { break };
            let (width, height) = last.dimensions();
            if width / 2 < window || height / 2 < window {
                break;
            }
            let next = downsample(last);
            pyramid.push(next);
        }
        pyramid
    }

    fn track_point(
        prev_pyramid: &[GrayImage],
        next_pyramid: &[GrayImage],
        point: Point2<f32>,
        params: &FlowParams,
    ) -> PointTrack {
        let half = (params.window / 2) as i32;
        let lost = |status| PointTrack {
            position: point,
            status,
            error: f32::MAX,
        };

        let mut flow = Vector2::zeros();
        for level in (0..prev_pyramid.len()).rev() {
            let prev = &prev_pyramid[level];
            let next = &next_pyramid[level];
            let scale = (1u32 << level) as f32;
            let prev_pt = Point2::new(point.x / scale, point.y / scale);

            if !inside(prev, prev_pt) {
                return lost(TrackStatus::Lost);
            }

            let window = WindowGradients::sample(prev, prev_pt, half);
            if window.normalized_min_eigenvalue(half) < params.min_eigen_threshold {
                return lost(TrackStatus::Lost);
            }
            let Some(g_inv) = window.g.try_inverse() else {
                return lost(TrackStatus::Lost);
            };

            let mut cur = prev_pt + flow;
            for _ in 0..params.criteria.max_iterations {
                if !inside(next, cur) {
                    return lost(TrackStatus::OffScreen);
                }
                let b = window.mismatch(next, cur, half);
                let delta = g_inv * b;
                cur += delta;
                if delta.norm_squared() <= params.criteria.epsilon * params.criteria.epsilon {
                    break;
                }
            }

            flow = cur - prev_pt;
            if level > 0 {
                flow *= 2.0;
            }
        }

        let position = point + flow;
        if !inside(&next_pyramid[0], position) {
            return PointTrack {
                position,
                status: TrackStatus::OffScreen,
                error: f32::MAX,
            };
        }

        PointTrack {
            position,
            status: TrackStatus::Tracked,
            error: window_error(&prev_pyramid[0], &next_pyramid[0], point, position, half),
        }
    }
}

impl OpticalFlow for PyramidalLk {
    fn name(&self) -> &'static str {
        "pyramidal-lk"
    }

    fn track(
        &self,
        prev_image: &GrayImage,
        next_image: &GrayImage,
        points: &[Point2<f32>],
        params: &FlowParams,
    ) -> Result<FlowOutput> {
        if params.window < 3 || params.window % 2 == 0 {
            return Err(FrontendError::Tracking(format!(
                "window size must be odd and at least 3, got {}",
                params.window
            )));
        }
        if prev_image.dimensions() != next_image.dimensions() {
            return Err(FrontendError::Tracking(format!(
                "pyramid inputs differ in size: {:?} vs {:?}",
                prev_image.dimensions(),
                next_image.dimensions()
            )));
        }
        if let Some(bad) = points.iter().find(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(FrontendError::Tracking(format!(
                "non-finite input point {bad}"
            )));
        }

        let mut output = FlowOutput {
            points: Vec::with_capacity(points.len()),
            status: Vec::with_capacity(points.len()),
            errors: Vec::with_capacity(points.len()),
        };
        if points.is_empty() {
            return Ok(output);
        }

        let prev_pyramid = Self::build_pyramid(prev_image, params.max_level, params.window);
        let next_pyramid = Self::build_pyramid(next_image, params.max_level, params.window);

        for &point in points {
            let track = Self::track_point(&prev_pyramid, &next_pyramid, point, params);
            output.points.push(track.position);
            output.status.push(track.status);
            output.errors.push(track.error);
        }

        Ok(output)
    }
}

/// Spatial gradients of the previous frame's window and their normal matrix
struct WindowGradients {
    g: Matrix2<f32>,
    grad_x: Vec<f32>,
    grad_y: Vec<f32>,
    intensities: Vec<f32>,
}

impl WindowGradients {
    fn sample(image: &GrayImage, center: Point2<f32>, half: i32) -> Self {
        let side = (2 * half + 1) as usize;
        let mut g = Matrix2::zeros();
        let mut grad_x = Vec::with_capacity(side * side);
        let mut grad_y = Vec::with_capacity(side * side);
        let mut intensities = Vec::with_capacity(side * side);

        for dy in -half..=half {
            for dx in -half..=half {
                let x = center.x + dx as f32;
                let y = center.y + dy as f32;
                let ix =
                    (sample_bilinear(image, x + 1.0, y) - sample_bilinear(image, x - 1.0, y)) / 2.0;
                let iy =
                    (sample_bilinear(image, x, y + 1.0) - sample_bilinear(image, x, y - 1.0)) / 2.0;

                g[(0, 0)] += ix * ix;
                g[(0, 1)] += ix * iy;
                g[(1, 1)] += iy * iy;
                grad_x.push(ix);
                grad_y.push(iy);
                intensities.push(sample_bilinear(image, x, y));
            }
        }
        g[(1, 0)] = g[(0, 1)];

        Self {
            g,
            grad_x,
            grad_y,
            intensities,
        }
    }

    /// Min eigenvalue per window pixel, in OpenCV units
    fn normalized_min_eigenvalue(&self, half: i32) -> f32 {
        let area = ((2 * half + 1) * (2 * half + 1)) as f32;
        self.min_eigenvalue() / area * EIGEN_UNIT_SCALE
    }

    fn min_eigenvalue(&self) -> f32 {
        let (gxx, gxy, gyy) = (self.g[(0, 0)], self.g[(0, 1)], self.g[(1, 1)]);
        let trace = gxx + gyy;
        let det = gxx * gyy - gxy * gxy;
        let discriminant = (trace * trace - 4.0 * det).max(0.0);
        (trace - discriminant.sqrt()) / 2.0
    }

    /// Right-hand side: gradients weighted by the temporal difference at `cur`
    fn mismatch(&self, next: &GrayImage, cur: Point2<f32>, half: i32) -> Vector2<f32> {
        let mut b = Vector2::zeros();
        let mut idx = 0;
        for dy in -half..=half {
            for dx in -half..=half {
                let next_val = sample_bilinear(next, cur.x + dx as f32, cur.y + dy as f32);
                let dt = self.intensities[idx] - next_val;
                b.x += self.grad_x[idx] * dt;
                b.y += self.grad_y[idx] * dt;
                idx += 1;
            }
        }
        b
    }
}

fn inside(image: &GrayImage, p: Point2<f32>) -> bool {
    let (width, height) = image.dimensions();
    p.x >= 0.0 && p.y >= 0.0 && p.x < width as f32 && p.y < height as f32
}

fn window_error(
    prev: &GrayImage,
    next: &GrayImage,
    from: Point2<f32>,
    to: Point2<f32>,
    half: i32,
) -> f32 {
    let mut total = 0.0;
    for dy in -half..=half {
        for dx in -half..=half {
            let (dx, dy) = (dx as f32, dy as f32);
            let a = sample_bilinear(prev, from.x + dx, from.y + dy);
            let b = sample_bilinear(next, to.x + dx, to.y + dy);
            total += (a - b).abs();
        }
    }
    total / ((2 * half + 1) * (2 * half + 1)) as f32
}

/// 2x2 box-filter downsampling
fn downsample(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width / 2, height / 2, |x, y| {
        let (sx, sy) = (x * 2, y * 2);
        let (sx1, sy1) = ((sx + 1).min(width - 1), (sy + 1).min(height - 1));
        let sum = image.get_pixel(sx, sy).0[0] as u32
            + image.get_pixel(sx1, sy).0[0] as u32
            + image.get_pixel(sx, sy1).0[0] as u32
            + image.get_pixel(sx1, sy1).0[0] as u32;
        image::Luma([((sum + 2) / 4) as u8])
    })
}

/// Bilinear interpolation with coordinates clamped to the image
fn sample_bilinear(image: &GrayImage, x: f32, y: f32) -> f32 {
    let (width, height) = image.dimensions();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p = |px, py| image.get_pixel(px, py).0[0] as f32;
    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}
