//! Selection of the ambient barcodes and estimation of the ambient profile.

use crate::errors::{EmptyDropsError, InsufficientAmbientData, InvalidInput};
use crate::matrix::CountMatrix;
use crate::params::AmbientSelection;
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

/// Expected composition of an empty droplet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbientProfile {
    /// Row index in the input matrix of each profiled feature. Features with
    /// no counts anywhere in the matrix are not profiled.
    pub features: Vec<usize>,
    /// Proportion of each profiled feature. Every entry is positive and the
    /// entries sum to one.
    pub proportions: Vec<f64>,
}

/// Barcodes used to estimate the ambient profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AmbientSet {
    /// Ambient barcode indices, increasing.
    pub barcodes: Vec<usize>,
    /// Total count threshold in effect, absent for an explicit list.
    pub lower: Option<u64>,
}

impl AmbientSet {
    /// Membership flag for every barcode of the matrix.
    pub fn membership(&self, num_barcodes: usize) -> Vec<bool> {
        let mut member = vec![false; num_barcodes];
        for &b in &self.barcodes {
            member[b] = true;
        }
        member
    }
}

/// Choose the ambient barcodes from their totals.
pub(crate) fn select_ambient(
    totals: &[u64],
    selection: AmbientSelection<'_>,
) -> Result<AmbientSet, EmptyDropsError> {
    let num_barcodes = totals.len();
    let (barcodes, lower) = match selection {
        AmbientSelection::KnownEmpty(known) => {
            if known.is_empty() {
                return Err(InsufficientAmbientData::NoKnownEmpty.into());
            }
            if let Some(&index) = known.iter().find(|&&i| i >= num_barcodes) {
                return Err(InvalidInput::BarcodeOutOfRange {
                    index,
                    num_barcodes,
                }
                .into());
            }
            (known.iter().copied().sorted().dedup().collect(), None)
        }
        AmbientSelection::ByRank(by_rank) => {
            if by_rank >= num_barcodes {
                return Err(InvalidInput::RankOutOfRange {
                    by_rank,
                    num_barcodes,
                }
                .into());
            }
            // every barcode tied with the one at this rank is ambient
            let lower = totals.iter().copied().sorted_by(|a, b| b.cmp(a)).nth(by_rank);
            let lower = lower.unwrap_or_default();
            info!("Rank {by_rank} has total count {lower}");
            (at_or_below(totals, lower), Some(lower))
        }
        AmbientSelection::Lower(lower) => (at_or_below(totals, lower), Some(lower)),
    };
    if barcodes.is_empty() {
        return Err(InsufficientAmbientData::NoAmbientBarcodes {
            lower: lower.unwrap_or_default(),
        }
        .into());
    }
    debug!("Selected {} of {num_barcodes} barcodes as ambient", barcodes.len());
    Ok(AmbientSet { barcodes, lower })
}

fn at_or_below(totals: &[u64], lower: u64) -> Vec<usize> {
    totals
        .iter()
        .positions(|&total| total <= lower)
        .collect()
}

/// Proportions of each feature of `matrix` in the pooled ambient barcodes.
///
/// Observed features are smoothed with Good-Turing. Any feature still at zero
/// afterwards gets a pseudo-count of one over the pooled ambient total, and
/// the result is renormalized to sum to one.
pub(crate) fn estimate_ambient_profile(
    matrix: &CountMatrix,
    ambient: &[usize],
) -> Result<Vec<f64>, EmptyDropsError> {
    let sums = matrix.feature_sums(ambient.iter().copied());
    let pooled: u64 = sums.iter().sum();
    if pooled == 0 {
        return Err(InsufficientAmbientData::NoAmbientCounts {
            num_barcodes: ambient.len(),
        }
        .into());
    }
    let mut proportions = stats::good_turing_proportions(&sums).map_err(|_| {
        InsufficientAmbientData::NoAmbientCounts {
            num_barcodes: ambient.len(),
        }
    })?;

    let pseudo = 1.0 / pooled as f64;
    let mut num_pseudo = 0;
    for p in proportions.iter_mut().filter(|p| !(**p > 0.0)) {
        *p = pseudo;
        num_pseudo += 1;
    }
    let sum: f64 = proportions.iter().sum();
    proportions.iter_mut().for_each(|p| *p /= sum);
    debug!(
        "Ambient profile over {} features from {pooled} molecules ({num_pseudo} given a pseudo-count)",
        proportions.len()
    );
    Ok(proportions)
}
