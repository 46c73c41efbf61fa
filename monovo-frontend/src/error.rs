//! Error taxonomy for the frontend stages

use std::fmt;

pub type Result<T> = std::result::Result<T, FrontendError>;

/// Which stage of the frontend produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detection,
    Tracking,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Detection => f.write_str("detection"),
            Stage::Tracking => f.write_str("tracking"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrontendError {
    /// The input frame is null or has no pixels
    #[error("{stage}: unusable input image: {reason}")]
    Capture { stage: Stage, reason: String },

    #[error("Detection failure: {0}")]
    Detection(String),

    #[error("Tracking failure: {0}")]
    Tracking(String),

    #[error("Frame size mismatch: previous {previous:?}, current {current:?}")]
    DimensionMismatch {
        previous: (u32, u32),
        current: (u32, u32),
    },

    /// Internal bookkeeping broke an index-alignment guarantee
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

/// A [`FrontendError`] tagged with the frame it was raised for
#[derive(Debug, thiserror::Error)]
#[error("frame {frame} ({stage}): {source}")]
pub struct FrameError {
    pub frame: u64,
    pub stage: Stage,
    #[source]
    pub source: FrontendError,
}
