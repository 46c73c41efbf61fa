//! Capability selection
//!
//! Each capability slot is chosen by a named variant. The defaults reproduce
//! the classic monocular VO frontend: FAST corners, oriented BRIEF,
//! brute-force Hamming matching and Lucas-Kanade flow with a 21x21 window.

use crate::descriptor::{BriefExtractor, DescriptorExtractor};
use crate::detector::{FastDetector, FeatureDetector};
use crate::lk_tracker::{FlowParams, OpticalFlow, PyramidalLk, TermCriteria};
use crate::matcher::{BruteForceHamming, DescriptorMatcher};

#[derive(Debug, Clone, PartialEq)]
pub enum DetectorKind {
    Fast {
        threshold: u8,
        grid_size: usize,
        max_features: usize,
    },
}

impl Default for DetectorKind {
    fn default() -> Self {
        DetectorKind::Fast {
            threshold: 20,
            grid_size: 16,
            max_features: 500,
        }
    }
}

impl DetectorKind {
    pub fn build(&self) -> Box<dyn FeatureDetector> {
        match *self {
            DetectorKind::Fast {
                threshold,
                grid_size,
                max_features,
            } => Box::new(FastDetector::new(threshold, grid_size, max_features)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorKind {
    Brief { smoothing_sigma: f32 },
}

impl Default for DescriptorKind {
    fn default() -> Self {
        DescriptorKind::Brief {
            smoothing_sigma: 2.0,
        }
    }
}

impl DescriptorKind {
    pub fn build(&self) -> Box<dyn DescriptorExtractor> {
        match *self {
            DescriptorKind::Brief { smoothing_sigma } => {
                Box::new(BriefExtractor::with_smoothing(smoothing_sigma))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatcherKind {
    BruteForceHamming {
        max_distance: u32,
        ratio_threshold: Option<f32>,
        cross_check: bool,
    },
}

impl Default for MatcherKind {
    fn default() -> Self {
        MatcherKind::BruteForceHamming {
            max_distance: 256,
            ratio_threshold: None,
            cross_check: false,
        }
    }
}

impl MatcherKind {
    pub fn build(&self) -> Box<dyn DescriptorMatcher> {
        match *self {
            MatcherKind::BruteForceHamming {
                max_distance,
                ratio_threshold,
                cross_check,
            } => {
                let mut matcher = BruteForceHamming::new()
                    .with_max_distance(max_distance)
                    .with_cross_check(cross_check);
                if let Some(ratio) = ratio_threshold {
                    matcher = matcher.with_ratio_threshold(ratio);
                }
                Box::new(matcher)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowKind {
    #[default]
    PyramidalLk,
}

impl FlowKind {
    pub fn build(&self) -> Box<dyn OpticalFlow> {
        match self {
            FlowKind::PyramidalLk => Box::new(PyramidalLk::new()),
        }
    }
}

/// Full frontend configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontendConfig {
    pub detector: DetectorKind,
    pub descriptor: DescriptorKind,
    pub matcher: MatcherKind,
    pub flow: FlowKind,
    pub flow_params: FlowParams,
}

impl FrontendConfig {
    pub fn with_detector(mut self, detector: DetectorKind) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_descriptor(mut self, descriptor: DescriptorKind) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn with_matcher(mut self, matcher: MatcherKind) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_flow_params(mut self, flow_params: FlowParams) -> Self {
        self.flow_params = flow_params;
        self
    }

    /// Square search window side length (odd)
    pub fn with_window(mut self, window: u32) -> Self {
        self.flow_params.window = window;
        self
    }

    pub fn with_term_criteria(mut self, max_iterations: usize, epsilon: f32) -> Self {
        self.flow_params.criteria = TermCriteria {
            max_iterations,
            epsilon,
        };
        self
    }

    pub fn with_pyramid_levels(mut self, max_level: u32) -> Self {
        self.flow_params.max_level = max_level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FrontendConfig::default();
        assert_eq!(config.flow_params.window, 21);
        assert_eq!(config.flow_params.criteria.max_iterations, 10);
        assert_eq!(config.flow_params.criteria.epsilon, 0.02);
        assert_eq!(config.flow_params.max_level, 0);

        assert_eq!(config.detector.build().name(), "fast");
        assert_eq!(config.descriptor.build().name(), "brief");
        assert_eq!(config.matcher.build().name(), "bruteforce-hamming");
        assert_eq!(config.flow.build().name(), "pyramidal-lk");
    }

    #[test]
    fn test_builders_override_flow_params() {
        let config = FrontendConfig::default()
            .with_window(15)
            .with_term_criteria(30, 0.01)
            .with_pyramid_levels(3);
        assert_eq!(config.flow_params.window, 15);
        assert_eq!(config.flow_params.criteria.max_iterations, 30);
        assert_eq!(config.flow_params.criteria.epsilon, 0.01);
        assert_eq!(config.flow_params.max_level, 3);
    }
}
