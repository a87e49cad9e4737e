//! Monte Carlo significance of each barcode's deviation from the ambient
//! profile.

use crate::alpha::estimate_alpha;
use crate::ambient::{estimate_ambient_profile, select_ambient, AmbientProfile};
use crate::errors::EmptyDropsError;
use crate::executor::TaskExecutor;
use crate::log_prob::LogProbModel;
use crate::matrix::{CountMatrix, NonzeroCounts};
use crate::monte_carlo::count_more_extreme;
use crate::params::{AlphaChoice, Concentration, EmptyDropsParams};
use crate::results::{AmbientTestResult, BarcodeTest, TestMetadata};
use itertools::Itertools;
use log::info;
use std::borrow::Cow;

/// Test every eligible barcode of `counts` for a significant deviation from
/// the ambient profile.
///
/// `counts` is validated and converted first, rounding non-integer values
/// when `params.round` is set.
pub fn test_ambient_significance<M, E>(
    counts: &M,
    params: &EmptyDropsParams,
    executor: &E,
) -> Result<AmbientTestResult, EmptyDropsError>
where
    M: NonzeroCounts,
    E: TaskExecutor,
{
    params.validate()?;
    let matrix = CountMatrix::from_counts(counts, params.round)?;
    test_count_matrix(&matrix, params, executor)
}

/// [`test_ambient_significance`] on an already validated matrix.
pub fn test_count_matrix<E: TaskExecutor>(
    matrix: &CountMatrix,
    params: &EmptyDropsParams,
    executor: &E,
) -> Result<AmbientTestResult, EmptyDropsError> {
    params.validate()?;
    let selection = params.ambient_selection()?;
    let num_barcodes = matrix.n_barcodes();
    info!(
        "Testing {num_barcodes} barcodes over {} features with {} iterations",
        matrix.n_features(),
        params.niters
    );

    // features never observed anywhere carry no information
    let features = matrix
        .feature_totals()
        .into_iter()
        .positions(|total| total > 0)
        .collect::<Vec<_>>();
    let matrix: Cow<'_, CountMatrix> = if features.len() == matrix.n_features() {
        Cow::Borrowed(matrix)
    } else {
        info!(
            "Dropping {} features with no counts",
            matrix.n_features() - features.len()
        );
        Cow::Owned(matrix.select_features(&features))
    };

    let ambient = select_ambient(matrix.totals(), selection)?;
    let proportions = estimate_ambient_profile(&matrix, &ambient.barcodes)?;
    let concentration = match params.alpha {
        AlphaChoice::Infinite => Concentration::Infinite,
        AlphaChoice::Fixed(alpha) => Concentration::Finite(alpha),
        AlphaChoice::Estimate => Concentration::Finite(estimate_alpha(
            &matrix,
            &ambient.barcodes,
            &proportions,
            &params.alpha_search,
        )?),
    };
    let is_ambient = ambient.membership(num_barcodes);

    let ignore = params.ignore.unwrap_or(0);
    let tested: Vec<usize> = (0..num_barcodes)
        .filter(|&b| {
            let total = matrix.total(b);
            total > 0 && total > ignore && (params.test_ambient.tests_ambient() || !is_ambient[b])
        })
        .collect();
    info!(
        "{} ambient barcodes, {} barcodes to test",
        ambient.barcodes.len(),
        tested.len()
    );

    let model = LogProbModel::new(&proportions, concentration);
    let totals: Vec<u64> = tested.iter().map(|&b| matrix.total(b)).collect();
    let data_terms: Vec<f64> = tested
        .iter()
        .map(|&b| model.data_term(matrix.column(b)))
        .collect();
    let n_above = count_more_extreme(
        &totals,
        &data_terms,
        &model,
        params.niters,
        params.seed,
        executor,
    )?;

    let denominator = f64::from(params.niters) + 1.0;
    let mut tests = vec![None; num_barcodes];
    for (k, &barcode) in tested.iter().enumerate() {
        tests[barcode] = Some(BarcodeTest {
            total: totals[k],
            log_prob: data_terms[k] + model.total_term(totals[k]),
            p_value: (n_above[k] + 1) as f64 / denominator,
            limited: n_above[k] == 0,
        });
    }
    let result = AmbientTestResult {
        tests,
        metadata: TestMetadata {
            totals: matrix.totals().to_vec(),
            ambient: is_ambient,
            lower: ambient.lower,
            niters: params.niters,
            concentration,
            profile: AmbientProfile {
                features,
                proportions,
            },
            test_ambient: params.test_ambient,
        },
    };
    info!(
        "Tested {} barcodes, {} at the Monte Carlo floor",
        result.num_tested(),
        result.num_limited()
    );
    Ok(result)
}
