//! Descriptor matching capability
//!
//! The frontend keeps a matcher configured next to its detector and extractor
//! so downstream consumers can associate descriptor sets across frames.

use crate::descriptor::BinaryDescriptor;

/// An association between a query descriptor and a train descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    /// Hamming distance between the two descriptors
    pub distance: u32,
}

pub trait DescriptorMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// At most one match per query descriptor, in query order
    fn match_descriptors(
        &self,
        query: &[BinaryDescriptor],
        train: &[BinaryDescriptor],
    ) -> Vec<DescriptorMatch>;
}

/// Exhaustive nearest-neighbour search under the Hamming metric
#[derive(Debug, Clone)]
pub struct BruteForceHamming {
    /// Reject matches farther than this many bits
    max_distance: u32,
    /// Lowe ratio: best / second best must be below this (None disables)
    ratio_threshold: Option<f32>,
    /// Keep only pairs that are each other's nearest neighbour
    cross_check: bool,
}

impl Default for BruteForceHamming {
    fn default() -> Self {
        Self {
            max_distance: BinaryDescriptor::BITS,
            ratio_threshold: None,
            cross_check: false,
        }
    }
}

impl BruteForceHamming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_distance(mut self, max_distance: u32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_ratio_threshold(mut self, ratio: f32) -> Self {
        self.ratio_threshold = Some(ratio);
        self
    }

    pub fn with_cross_check(mut self, cross_check: bool) -> Self {
        self.cross_check = cross_check;
        self
    }

    /// Index and distance of the best and second-best neighbour of `needle`
    fn nearest(
        needle: &BinaryDescriptor,
        haystack: &[BinaryDescriptor],
    ) -> Option<(usize, u32, u32)> {
        let mut best: Option<(usize, u32)> = None;
        let mut second_best = u32::MAX;

        for (idx, candidate) in haystack.iter().enumerate() {
            let dist = needle.hamming_distance(candidate);
            match best {
                Some((_, best_dist)) if dist >= best_dist => {
                    second_best = second_best.min(dist);
                }
                Some((_, best_dist)) => {
                    second_best = best_dist;
                    best = Some((idx, dist));
                }
                None => best = Some((idx, dist)),
            }
        }

        best.map(|(idx, dist)| (idx, dist, second_best))
    }
}

impl DescriptorMatcher for BruteForceHamming {
    fn name(&self) -> &'static str {
        "bruteforce-hamming"
    }

    fn match_descriptors(
        &self,
        query: &[BinaryDescriptor],
        train: &[BinaryDescriptor],
    ) -> Vec<DescriptorMatch> {
        let mut matches = Vec::new();

        for (query_idx, descriptor) in query.iter().enumerate() {
            let Some((train_idx, distance, second_best)) = Self::nearest(descriptor, train)
            else {
                continue;
            };

            if distance > self.max_distance {
                continue;
            }

            if let Some(ratio) = self.ratio_threshold {
                // second_best of u32::MAX means there was only one candidate
                if second_best != u32::MAX
                    && second_best > 0
                    && distance as f32 / second_best as f32 >= ratio
                {
                    continue;
                }
            }

            if self.cross_check {
                let back = Self::nearest(&train[train_idx], query);
                if !matches!(back, Some((idx, _, _)) if idx == query_idx) {
                    continue;
                }
            }

            matches.push(DescriptorMatch {
                query_idx,
                train_idx,
                distance,
            });
        }

        matches
    }
}
