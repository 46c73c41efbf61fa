//! The two per-frame stages: detection/description and tracking/filtering

use std::borrow::Cow;
use std::time::Instant;

use image::{DynamicImage, GrayImage};
use nalgebra::Point2;
use tracing::debug;

use crate::config::FrontendConfig;
use crate::correspondence::{filter_correspondences, FramePair};
use crate::descriptor::{BinaryDescriptor, DescriptorExtractor};
use crate::detector::{FeatureDetector, KeyPoint};
use crate::error::{FrontendError, Result, Stage};
use crate::lk_tracker::{FlowParams, OpticalFlow, TrackStatus};
use crate::matcher::DescriptorMatcher;

/// Keypoints and their descriptors, index-aligned 1:1
#[derive(Debug, Clone)]
pub struct Features {
    keypoints: Vec<KeyPoint>,
    descriptors: Vec<BinaryDescriptor>,
    detector: &'static str,
    descriptor: &'static str,
}

impl Features {
    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[BinaryDescriptor] {
        &self.descriptors
    }

    /// Name of the detection capability that produced the keypoints
    pub fn detector_name(&self) -> &'static str {
        self.detector
    }

    /// Name of the description capability that produced the descriptors
    pub fn descriptor_name(&self) -> &'static str {
        self.descriptor
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn into_parts(self) -> (Vec<KeyPoint>, Vec<BinaryDescriptor>) {
        (self.keypoints, self.descriptors)
    }
}

/// Turns one frame into keypoints plus descriptors
pub struct FeatureStage {
    detector: Box<dyn FeatureDetector>,
    extractor: Box<dyn DescriptorExtractor>,
    /// Configured for consumers of the descriptor sets; detection never uses it
    matcher: Box<dyn DescriptorMatcher>,
}

impl Default for FeatureStage {
    fn default() -> Self {
        Self::from_config(&FrontendConfig::default())
    }
}

impl FeatureStage {
    pub fn new(
        detector: impl FeatureDetector + 'static,
        extractor: impl DescriptorExtractor + 'static,
        matcher: impl DescriptorMatcher + 'static,
    ) -> Self {
        Self {
            detector: Box::new(detector),
            extractor: Box::new(extractor),
            matcher: Box::new(matcher),
        }
    }

    pub fn from_config(config: &FrontendConfig) -> Self {
        Self {
            detector: config.detector.build(),
            extractor: config.descriptor.build(),
            matcher: config.matcher.build(),
        }
    }

    pub fn detector(&self) -> &dyn FeatureDetector {
        self.detector.as_ref()
    }

    pub fn extractor(&self) -> &dyn DescriptorExtractor {
        self.extractor.as_ref()
    }

    pub fn matcher(&self) -> &dyn DescriptorMatcher {
        self.matcher.as_ref()
    }

    /// Detect and describe on a frame of any pixel format
    pub fn detect_and_describe(&self, image: &DynamicImage) -> Result<Features> {
        let gray = match image.as_luma8() {
            Some(gray) => Cow::Borrowed(gray),
            None => Cow::Owned(image.to_luma8()),
        };
        self.detect_and_describe_gray(&gray)
    }

    pub fn detect_and_describe_gray(&self, image: &GrayImage) -> Result<Features> {
        ensure_non_empty(image, Stage::Detection)?;
        let start = Instant::now();

        let candidates = self.detector.detect(image)?;
        let described = self.extractor.describe(image, &candidates)?;
        if described.len() != candidates.len() {
            return Err(FrontendError::InvariantViolation(format!(
                "{} returned {} descriptors for {} keypoints",
                self.extractor.name(),
                described.len(),
                candidates.len()
            )));
        }

        // Keypoints that cannot be described are dropped together with their slot
        let (keypoints, descriptors): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .zip(described)
            .filter_map(|(kp, desc)| desc.map(|d| (kp, d)))
            .unzip();

        debug!(
            detector = self.detector.name(),
            descriptor = self.extractor.name(),
            keypoints = keypoints.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            "feature detection finished"
        );

        Ok(Features {
            keypoints,
            descriptors,
            detector: self.detector.name(),
            descriptor: self.extractor.name(),
        })
    }
}

/// Filtered correspondences together with the per-index tracker verdicts
#[derive(Debug, Clone)]
pub struct TrackingReport {
    pub pair: FramePair,
    /// Status per input keypoint, after sentinel normalisation
    pub status: Vec<TrackStatus>,
    /// Tracker error estimate per input keypoint (not used for filtering)
    pub errors: Vec<f32>,
}

/// Tracks previous-frame keypoints into the current frame
pub struct TrackingStage {
    flow: Box<dyn OpticalFlow>,
    params: FlowParams,
}

impl Default for TrackingStage {
    fn default() -> Self {
        Self::from_config(&FrontendConfig::default())
    }
}

impl TrackingStage {
    pub fn new(flow: impl OpticalFlow + 'static, params: FlowParams) -> Self {
        Self {
            flow: Box::new(flow),
            params,
        }
    }

    pub fn from_config(config: &FrontendConfig) -> Self {
        Self {
            flow: config.flow.build(),
            params: config.flow_params.clone(),
        }
    }

    pub fn params(&self) -> &FlowParams {
        &self.params
    }

    pub fn track(
        &self,
        previous: &GrayImage,
        current: &GrayImage,
        keypoints: &[KeyPoint],
    ) -> Result<FramePair> {
        self.track_detailed(previous, current, keypoints)
            .map(|report| report.pair)
    }

    pub fn track_detailed(
        &self,
        previous: &GrayImage,
        current: &GrayImage,
        keypoints: &[KeyPoint],
    ) -> Result<TrackingReport> {
        if previous.dimensions() != current.dimensions() {
            return Err(FrontendError::DimensionMismatch {
                previous: previous.dimensions(),
                current: current.dimensions(),
            });
        }
        if keypoints.is_empty() {
            return Ok(TrackingReport {
                pair: FramePair::empty(),
                status: Vec::new(),
                errors: Vec::new(),
            });
        }
        ensure_non_empty(previous, Stage::Tracking)?;

        let start = Instant::now();
        let points: Vec<Point2<f32>> = keypoints.iter().map(KeyPoint::point).collect();
        let mut flow = self.flow.track(previous, current, &points, &self.params)?;
        if flow.len() != points.len() {
            return Err(FrontendError::InvariantViolation(format!(
                "{} returned {} points for {} inputs",
                self.flow.name(),
                flow.len(),
                points.len()
            )));
        }

        let pair = filter_correspondences(&points, &flow.points, &mut flow.status)?;

        debug!(
            flow = self.flow.name(),
            seeds = points.len(),
            kept = pair.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            "feature tracking finished"
        );

        Ok(TrackingReport {
            pair,
            status: flow.status,
            errors: flow.errors,
        })
    }
}

fn ensure_non_empty(image: &GrayImage, stage: Stage) -> Result<()> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(FrontendError::Capture {
            stage,
            reason: format!("image has no pixels ({width}x{height})"),
        });
    }
    Ok(())
}
