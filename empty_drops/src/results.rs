//! Per-barcode test and call results.

use crate::ambient::AmbientProfile;
use crate::params::{Concentration, TestAmbient};
use serde::Serialize;

/// Monte Carlo test of one barcode against the ambient model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarcodeTest {
    /// Total count.
    pub total: u64,
    /// Log-probability under the ambient model.
    pub log_prob: f64,
    /// Monte Carlo p-value, `(n_above + 1) / (niters + 1)`.
    pub p_value: f64,
    /// True if no simulated droplet was as unlikely, in which case the
    /// p-value is bounded by the number of iterations.
    pub limited: bool,
}

/// What a test run was based on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestMetadata {
    /// Total count of every barcode.
    pub totals: Vec<u64>,
    /// Whether each barcode was used to estimate the ambient profile.
    pub ambient: Vec<bool>,
    /// Total count threshold of the ambient set, absent when the ambient
    /// barcodes were listed explicitly.
    pub lower: Option<u64>,
    /// Monte Carlo iterations.
    pub niters: u32,
    /// Concentration of the ambient model.
    pub concentration: Concentration,
    /// Estimated ambient profile.
    pub profile: AmbientProfile,
    /// Which barcodes were tested.
    pub test_ambient: TestAmbient,
}

/// Result of [`crate::test_ambient_significance`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbientTestResult {
    /// Test of every barcode, `None` for barcodes that were not tested.
    pub tests: Vec<Option<BarcodeTest>>,
    /// Inputs the tests were based on.
    pub metadata: TestMetadata,
}

impl AmbientTestResult {
    /// Number of tested barcodes.
    pub fn num_tested(&self) -> usize {
        self.tests.iter().flatten().count()
    }

    /// Number of tested barcodes whose p-value hit the Monte Carlo floor.
    pub fn num_limited(&self) -> usize {
        self.tests.iter().flatten().filter(|t| t.limited).count()
    }
}

/// Test and multiple testing correction of one barcode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NonEmptyCall {
    /// Monte Carlo test.
    pub test: BarcodeTest,
    /// Benjamini-Hochberg FDR. Zero for retained barcodes, `None` for tested
    /// barcodes excluded from the correction.
    pub fdr: Option<f64>,
}

/// Result of [`crate::call_non_empty`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonEmptyResult {
    /// Call of every barcode, `None` for barcodes that were not tested.
    pub calls: Vec<Option<NonEmptyCall>>,
    /// Total count at or above which barcodes were retained.
    pub retain: f64,
    /// Default FDR threshold of [`NonEmptyResult::non_empty`].
    pub fdr_threshold: f64,
    /// Inputs the tests were based on.
    pub metadata: TestMetadata,
}

impl NonEmptyResult {
    /// Barcodes called non-empty at the default FDR threshold.
    pub fn non_empty(&self) -> Vec<usize> {
        self.non_empty_at(self.fdr_threshold)
    }

    /// Barcodes whose FDR is at or below `fdr_threshold`, in index order.
    pub fn non_empty_at(&self, fdr_threshold: f64) -> Vec<usize> {
        self.calls
            .iter()
            .enumerate()
            .filter_map(|(barcode, call)| match call {
                Some(NonEmptyCall { fdr: Some(fdr), .. }) if *fdr <= fdr_threshold => Some(barcode),
                _ => None,
            })
            .collect()
    }

    /// Number of retained barcodes.
    pub fn num_retained(&self) -> usize {
        self.calls
            .iter()
            .flatten()
            .filter(|c| c.test.total as f64 >= self.retain)
            .count()
    }
}
