//! Calling non-empty droplets: significance testing, retention of large
//! barcodes and multiple testing correction.

use crate::correction::correct;
use crate::errors::EmptyDropsError;
use crate::executor::TaskExecutor;
use crate::matrix::{CountMatrix, NonzeroCounts};
use crate::params::{validate_retain, EmptyDropsParams, TestAmbient};
use crate::results::{NonEmptyCall, NonEmptyResult};
use crate::significance::test_count_matrix;
use log::info;

/// Test every eligible barcode and correct the p-values for multiple testing.
///
/// When `params.retain` is `None`, `knee_point` is called once with the
/// validated matrix and the ambient threshold in effect, and its answer is
/// used as the retention threshold.
pub fn call_non_empty<M, K, E>(
    counts: &M,
    params: &EmptyDropsParams,
    knee_point: K,
    executor: &E,
) -> Result<NonEmptyResult, EmptyDropsError>
where
    M: NonzeroCounts,
    K: FnOnce(&CountMatrix, u64) -> anyhow::Result<f64>,
    E: TaskExecutor,
{
    params.validate()?;
    let matrix = CountMatrix::from_counts(counts, params.round)?;
    let testing = test_count_matrix(&matrix, params, executor)?;

    let retain = match params.retain {
        Some(retain) => retain,
        None => {
            let lower = testing.metadata.lower.unwrap_or(params.lower);
            let retain = knee_point(&matrix, lower).map_err(EmptyDropsError::KneePoint)?;
            validate_retain(retain)?;
            info!("Knee point at total count {retain}");
            retain
        }
    };

    let include_ambient = params.test_ambient == TestAmbient::TestAllAndCorrect;
    let fdr = correct(
        &testing.tests,
        &testing.metadata.ambient,
        retain,
        include_ambient,
    );
    let calls = testing
        .tests
        .iter()
        .zip(fdr)
        .map(|(test, fdr)| test.map(|test| NonEmptyCall { test, fdr }))
        .collect();
    let result = NonEmptyResult {
        calls,
        retain,
        fdr_threshold: params.fdr_threshold,
        metadata: testing.metadata,
    };
    info!(
        "{} barcodes non-empty at FDR {}",
        result.non_empty().len(),
        result.fdr_threshold
    );
    Ok(result)
}
