//! Scroll-depth threshold tracking
//!
//! A [`ThresholdTracker`] lives for exactly one page view. Each sample is
//! converted to a whole percentage and every configured threshold at or below
//! it that has not fired yet is reported, lowest first. Once all thresholds
//! have fired the tracker is inert until the next page view replaces it.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::types::ScrollMetrics;

/// Ordered, distinct scroll-depth percentages.
///
/// Invariant: strictly increasing, every value in `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSet(Vec<u8>);

impl ThresholdSet {
    /// Validate and build a threshold set
    pub fn new(values: Vec<u8>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::InvalidThresholds("at least one threshold is required".to_string()));
        }
        if let Some(v) = values.iter().find(|v| **v > 100) {
            return Err(Error::InvalidThresholds(format!("{} is outside 0..=100", v)));
        }
        if let Some(pair) = values.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidThresholds(format!(
                "thresholds must be strictly increasing ({} then {})",
                pair[0], pair[1]
            )));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self(vec![25, 50, 75, 90, 100])
    }
}

/// Per-page-view threshold state machine.
#[derive(Debug, Clone)]
pub struct ThresholdTracker {
    thresholds: ThresholdSet,
    fired: BTreeSet<u8>,
    samples: u64,
}

impl ThresholdTracker {
    pub fn new(thresholds: ThresholdSet) -> Self {
        Self {
            thresholds,
            fired: BTreeSet::new(),
            samples: 0,
        }
    }

    /// Process one sample, returning the thresholds that fire now, ascending.
    pub fn sample(&mut self, metrics: &ScrollMetrics) -> Vec<u8> {
        self.samples += 1;
        if self.is_exhausted() {
            return Vec::new();
        }

        let percentage = metrics.percentage();
        let crossed: Vec<u8> = self
            .thresholds
            .as_slice()
            .iter()
            .copied()
            .take_while(|t| *t <= percentage)
            .filter(|t| !self.fired.contains(t))
            .collect();

        self.fired.extend(crossed.iter().copied());
        crossed
    }

    /// True once every threshold has fired for this page view
    pub fn is_exhausted(&self) -> bool {
        self.fired.len() == self.thresholds.len()
    }

    /// Thresholds already reported, ascending
    pub fn fired(&self) -> impl Iterator<Item = u8> + '_ {
        self.fired.iter().copied()
    }

    /// Number of samples processed, including ones after exhaustion
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }
}
