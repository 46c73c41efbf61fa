//! Monocular VO frontend: feature correspondences between successive frames
//!
//! Each frame goes through FAST corner detection with BRIEF descriptors, and
//! the previous frame's keypoints are tracked into it with Lucas-Kanade optical
//! flow. The tracker output is then filtered down to index-aligned
//! previous/current point pairs ready for pose estimation.

pub mod config;
pub mod correspondence;
pub mod descriptor;
pub mod detector;
pub mod error;
pub mod lk_tracker;
pub mod matcher;
pub mod orientation;
pub mod pipeline;
pub mod stage;

pub use config::{DescriptorKind, DetectorKind, FlowKind, FrontendConfig, MatcherKind};
pub use correspondence::{filter_correspondences, FramePair};
pub use descriptor::{BinaryDescriptor, BriefExtractor, DescriptorExtractor};
pub use detector::{FastDetector, FeatureDetector, KeyPoint};
pub use error::{FrameError, FrontendError, Result, Stage};
pub use lk_tracker::{FlowOutput, FlowParams, OpticalFlow, PyramidalLk, TermCriteria, TrackStatus};
pub use matcher::{BruteForceHamming, DescriptorMatch, DescriptorMatcher};
pub use orientation::{rotation_delta, ViewOrientation};
pub use pipeline::{FrameOutcome, Pipeline};
pub use stage::{FeatureStage, Features, TrackingReport, TrackingStage};
