//! Frame-to-frame driver around the two stages

use std::borrow::Cow;

use image::{DynamicImage, GrayImage};
use tracing::{debug, warn};

use crate::config::FrontendConfig;
use crate::correspondence::FramePair;
use crate::detector::KeyPoint;
use crate::error::{FrameError, Stage};
use crate::stage::{FeatureStage, TrackingStage};

/// What one call to [`Pipeline::process`] produced
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Correspondences against the reference frame, absent on the first frame
    pub pair: Option<FramePair>,
    pub keypoints_detected: usize,
}

/// Last frame whose detection succeeded
struct Reference {
    frame: u64,
    image: GrayImage,
    keypoints: Vec<KeyPoint>,
}

pub struct Pipeline {
    features: FeatureStage,
    tracking: TrackingStage,
    reference: Option<Reference>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_config(&FrontendConfig::default())
    }
}

impl Pipeline {
    pub fn new(features: FeatureStage, tracking: TrackingStage) -> Self {
        Self {
            features,
            tracking,
            reference: None,
        }
    }

    pub fn from_config(config: &FrontendConfig) -> Self {
        Self::new(
            FeatureStage::from_config(config),
            TrackingStage::from_config(config),
        )
    }

    pub fn features(&self) -> &FeatureStage {
        &self.features
    }

    /// Index of the frame the next call will track from
    pub fn reference_frame(&self) -> Option<u64> {
        self.reference.as_ref().map(|r| r.frame)
    }

    /// Forget the reference frame; the next frame starts a new sequence
    pub fn reset(&mut self) {
        self.reference = None;
    }

    /// Track the reference into `image`, then detect on `image`.
    ///
    /// A frame that fails either stage is reported and skipped. Detection
    /// still runs after a tracking failure so the sequence can recover, and a
    /// failed detection keeps the previous reference.
    pub fn process(
        &mut self,
        frame: u64,
        image: &DynamicImage,
    ) -> Result<FrameOutcome, FrameError> {
        let gray = match image.as_luma8() {
            Some(gray) => Cow::Borrowed(gray),
            None => Cow::Owned(image.to_luma8()),
        };

        let tracked = self.reference.as_ref().map(|reference| {
            self.tracking
                .track(&reference.image, &gray, &reference.keypoints)
                .map_err(|source| FrameError {
                    frame,
                    stage: Stage::Tracking,
                    source,
                })
        });

        let detected = match self.features.detect_and_describe_gray(&gray) {
            Ok(features) => {
                let count = features.len();
                let (keypoints, _) = features.into_parts();
                self.reference = Some(Reference {
                    frame,
                    image: gray.into_owned(),
                    keypoints,
                });
                Ok(count)
            }
            Err(source) => Err(FrameError {
                frame,
                stage: Stage::Detection,
                source,
            }),
        };

        let pair = match tracked.transpose() {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "skipping frame");
                return Err(err);
            }
        };
        let keypoints_detected = match detected {
            Ok(count) => count,
            Err(err) => {
                warn!(%err, "skipping frame");
                return Err(err);
            }
        };

        debug!(
            frame,
            keypoints = keypoints_detected,
            correspondences = pair.as_ref().map_or(0, FramePair::len),
            "frame processed"
        );

        Ok(FrameOutcome {
            pair,
            keypoints_detected,
        })
    }
}
