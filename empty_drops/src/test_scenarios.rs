//! End to end behaviour of the tests and calls on small simulated datasets.

use crate::*;
use anyhow::anyhow;
use ndarray::{array, Array2};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::cell::Cell;

const AMBIENT: [f64; 8] = [0.4, 0.2, 0.15, 0.1, 0.08, 0.04, 0.02, 0.01];
const CELL: [f64; 8] = [0.01, 0.02, 0.04, 0.08, 0.1, 0.15, 0.2, 0.4];

fn params(lower: u64, niters: u32) -> EmptyDropsParams {
    EmptyDropsParams {
        lower,
        niters,
        seed: 17,
        ..EmptyDropsParams::new().unwrap()
    }
}

fn sample_counts(profile: &[f64], total: usize, rng: &mut ChaCha20Rng) -> Vec<u32> {
    let mut counts = vec![0u32; profile.len()];
    for _ in 0..total {
        let u: f64 = rng.gen();
        let mut acc = 0.0;
        let feature = profile
            .iter()
            .position(|&p| {
                acc += p;
                u < acc
            })
            .unwrap_or(profile.len() - 1);
        counts[feature] += 1;
    }
    counts
}

fn to_matrix(columns: &[Vec<u32>]) -> Array2<u32> {
    Array2::from_shape_fn((columns[0].len(), columns.len()), |(g, b)| columns[b][g])
}

/// `num_empty` barcodes drawn from the ambient profile with totals in
/// 5..=50, then `num_cells` barcodes from a different profile with totals
/// in 200..=400, then one barcode with no counts.
fn droplets(num_empty: usize, num_cells: usize, seed: u64) -> Array2<u32> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut columns = Vec::new();
    for _ in 0..num_empty {
        let total = rng.gen_range(5..=50);
        columns.push(sample_counts(&AMBIENT, total, &mut rng));
    }
    for _ in 0..num_cells {
        let total = rng.gen_range(200..=400);
        columns.push(sample_counts(&CELL, total, &mut rng));
    }
    columns.push(vec![0; AMBIENT.len()]);
    to_matrix(&columns)
}

fn no_knee(_: &CountMatrix, _: u64) -> anyhow::Result<f64> {
    Ok(f64::INFINITY)
}

#[test]
fn test_typical_barcode_is_not_significant() {
    let counts = array![[1, 1, 0, 50, 39, 0], [1, 0, 1, 50, 1, 0]];
    let result = test_ambient_significance(&counts, &params(2, 1000), &SerialExecutor).unwrap();
    assert_eq!(result.metadata.lower, Some(2));
    assert_eq!(
        result.metadata.ambient,
        vec![true, true, true, false, false, true]
    );
    assert_eq!(result.metadata.profile.proportions, vec![0.5, 0.5]);
    assert_eq!(result.num_tested(), 2);

    let typical = result.tests[3].unwrap();
    assert_eq!(typical.total, 100);
    assert!(typical.p_value > 0.9, "{typical:?}");
    assert!(!typical.limited);

    let skewed = result.tests[4].unwrap();
    assert!(skewed.limited);
    assert_eq!(skewed.p_value, 1.0 / 1001.0);
    assert!(skewed.log_prob < typical.log_prob);

    assert!(result.tests[5].is_none());
}

#[test]
fn test_null_p_values_are_roughly_uniform() {
    let mut rng = ChaCha20Rng::seed_from_u64(99);
    let columns: Vec<Vec<u32>> = (0..400)
        .map(|_| {
            let total = rng.gen_range(20..=60);
            sample_counts(&AMBIENT, total, &mut rng)
        })
        .collect();
    let counts = to_matrix(&columns);
    let params = EmptyDropsParams {
        test_ambient: TestAmbient::TestAllPositive,
        ..params(60, 500)
    };
    let result = test_ambient_significance(&counts, &params, &RayonExecutor::new(4)).unwrap();
    let p_values: Vec<f64> = result.tests.iter().flatten().map(|t| t.p_value).collect();
    assert_eq!(p_values.len(), 400);
    let mean = p_values.iter().sum::<f64>() / p_values.len() as f64;
    assert!(mean > 0.4 && mean < 0.65, "mean p-value {mean}");
    let small = p_values.iter().filter(|&&p| p <= 0.05).count() as f64 / 400.0;
    assert!(small < 0.12, "fraction below 0.05: {small}");
}

#[test]
fn test_retain_zero_calls_every_tested_barcode() {
    let counts = droplets(100, 10, 1);
    let params = EmptyDropsParams {
        retain: Some(0.0),
        ..params(50, 200)
    };
    let called = call_non_empty(&counts, &params, no_knee, &SerialExecutor).unwrap();
    let tested = test_ambient_significance(&counts, &params, &SerialExecutor).unwrap();
    assert_eq!(called.calls.len(), 111);
    for (call, test) in called.calls.iter().zip(&tested.tests) {
        match (call, test) {
            (Some(call), Some(test)) => {
                assert_eq!(call.fdr, Some(0.0));
                assert_eq!(call.test, *test);
            }
            (None, None) => {}
            other => panic!("tested set differs: {other:?}"),
        }
    }
    assert_eq!(called.num_retained(), 10);
    assert_eq!(called.non_empty(), (100..110).collect::<Vec<_>>());
}

#[test]
fn test_zero_iterations_is_rejected() {
    let counts = droplets(20, 2, 2);
    let err = test_ambient_significance(&counts, &params(50, 0), &SerialExecutor).unwrap_err();
    assert!(err.is_invalid_input());
    assert!(matches!(
        err,
        EmptyDropsError::InvalidInput(InvalidInput::InvalidIterationCount { niters: 0 })
    ));
    let err = call_non_empty(&counts, &params(50, 0), no_knee, &SerialExecutor).unwrap_err();
    assert!(err.is_invalid_input());
}

#[test]
fn test_cells_are_called() {
    let counts = droplets(300, 30, 3);
    let params = EmptyDropsParams {
        retain: Some(f64::INFINITY),
        ..params(100, 1000)
    };
    let result = call_non_empty(&counts, &params, no_knee, &RayonExecutor::new(2)).unwrap();
    assert_eq!(result.non_empty_at(0.01), (300..330).collect::<Vec<_>>());
    // ambient barcodes are excluded from testing by default
    assert!(result.calls[..300].iter().all(Option::is_none));
    assert!(result.calls[330].is_none());
    assert_eq!(result.num_retained(), 0);
}

#[test]
fn test_results_do_not_depend_on_worker_count() {
    let counts = droplets(150, 15, 4);
    let params = EmptyDropsParams {
        retain: Some(350.0),
        alpha: AlphaChoice::Fixed(50.0),
        ..params(60, 333)
    };
    let serial = call_non_empty(&counts, &params, no_knee, &SerialExecutor).unwrap();
    for threads in [1, 3, 8] {
        let pooled =
            call_non_empty(&counts, &params, no_knee, &RayonExecutor::new(threads)).unwrap();
        assert_eq!(pooled, serial);
    }
}

#[test]
fn test_more_iterations_never_add_limited_barcodes() {
    let counts = droplets(200, 20, 5);
    let short = test_ambient_significance(&counts, &params(60, 100), &SerialExecutor).unwrap();
    let long = test_ambient_significance(&counts, &params(60, 2000), &SerialExecutor).unwrap();
    assert!(long.num_limited() <= short.num_limited());
    for (s, l) in short.tests.iter().zip(&long.tests) {
        let (Some(s), Some(l)) = (s, l) else {
            assert_eq!(s.is_none(), l.is_none());
            continue;
        };
        assert!(s.p_value >= 1.0 / 101.0);
        assert!(l.p_value >= 1.0 / 2001.0);
        // iteration i draws from the same stream at any niters
        assert!(!(l.limited && !s.limited));
    }
}

#[test]
fn test_ambient_diagnostics_do_not_change_calls() {
    let counts = droplets(120, 12, 6);
    let base = EmptyDropsParams {
        retain: Some(f64::INFINITY),
        ..params(60, 300)
    };
    let excluded = call_non_empty(&counts, &base, no_knee, &SerialExecutor).unwrap();
    let diagnosed = call_non_empty(
        &counts,
        &EmptyDropsParams {
            test_ambient: TestAmbient::TestAllPositive,
            ..base.clone()
        },
        no_knee,
        &SerialExecutor,
    )
    .unwrap();
    for (b, (e, d)) in excluded.calls.iter().zip(&diagnosed.calls).enumerate() {
        if excluded.metadata.ambient[b] {
            assert!(e.is_none());
            if let Some(d) = d {
                assert_eq!(d.fdr, None);
            }
        } else {
            assert_eq!(e, d);
        }
    }
    assert!(diagnosed.calls[..120].iter().any(Option::is_some));

    let corrected = call_non_empty(
        &counts,
        &EmptyDropsParams {
            test_ambient: TestAmbient::TestAllAndCorrect,
            ..base
        },
        no_knee,
        &SerialExecutor,
    )
    .unwrap();
    assert!(corrected.calls[..120]
        .iter()
        .flatten()
        .all(|c| c.fdr.is_some()));
}

#[test]
fn test_ignore_skips_small_barcodes() {
    let counts = droplets(100, 10, 7);
    let params = EmptyDropsParams {
        test_ambient: TestAmbient::TestAllPositive,
        ignore: Some(30),
        ..params(60, 100)
    };
    let result = test_ambient_significance(&counts, &params, &SerialExecutor).unwrap();
    for (test, &total) in result.tests.iter().zip(&result.metadata.totals) {
        assert_eq!(test.is_some(), total > 30);
    }
}

#[test]
fn test_knee_point_sets_retention() {
    let counts = droplets(100, 10, 8);
    let seen = Cell::new(None);
    let knee = |matrix: &CountMatrix, lower: u64| -> anyhow::Result<f64> {
        seen.set(Some((matrix.n_barcodes(), lower)));
        Ok(250.0)
    };
    let result = call_non_empty(&counts, &params(60, 100), knee, &SerialExecutor).unwrap();
    assert_eq!(seen.get(), Some((111, 60)));
    assert_eq!(result.retain, 250.0);
    for call in result.calls.iter().flatten() {
        if call.test.total >= 250 {
            assert_eq!(call.fdr, Some(0.0));
        }
    }

    // an explicit threshold means the detector is never asked
    let params = EmptyDropsParams {
        retain: Some(1000.0),
        ..params(60, 100)
    };
    let knee = |_: &CountMatrix, _: u64| -> anyhow::Result<f64> { panic!("knee point requested") };
    assert!(call_non_empty(&counts, &params, knee, &SerialExecutor).is_ok());
}

#[test]
fn test_knee_point_failures() {
    let counts = droplets(50, 5, 9);
    let err = call_non_empty(
        &counts,
        &params(60, 50),
        |_: &CountMatrix, _: u64| Err(anyhow!("no knee")),
        &SerialExecutor,
    )
    .unwrap_err();
    assert!(matches!(err, EmptyDropsError::KneePoint(_)));

    let err = call_non_empty(
        &counts,
        &params(60, 50),
        |_: &CountMatrix, _: u64| Ok(f64::NAN),
        &SerialExecutor,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EmptyDropsError::InvalidInput(InvalidInput::InvalidRetain { .. })
    ));
}

#[test]
fn test_ambient_selection_modes() {
    let counts = droplets(100, 10, 10);
    let by_rank = EmptyDropsParams {
        by_rank: Some(10),
        ..params(0, 100)
    };
    let result = test_ambient_significance(&counts, &by_rank, &SerialExecutor).unwrap();
    // the ten cells sit above rank 10, every empty droplet at or below it
    assert!(result.metadata.lower.unwrap() <= 50);
    assert!(result.metadata.ambient[..100].iter().all(|&a| a));
    assert!(!result.metadata.ambient[100..110].iter().any(|&a| a));

    let known = EmptyDropsParams {
        known_empty: Some((0..50).collect()),
        ..params(0, 100)
    };
    let result = test_ambient_significance(&counts, &known, &SerialExecutor).unwrap();
    assert_eq!(result.metadata.lower, None);
    assert_eq!(result.metadata.ambient.iter().filter(|&&a| a).count(), 50);
    // barcodes outside the list are tested even when they look empty
    assert!(result.tests[60].is_some());
    assert!(result.tests[110].is_none());

    let none_ambient = test_ambient_significance(&counts, &params(2, 100), &SerialExecutor);
    // only the zero-count barcode is at or below 2
    assert!(matches!(
        none_ambient.unwrap_err(),
        EmptyDropsError::InsufficientAmbientData(InsufficientAmbientData::NoAmbientCounts { .. })
    ));
}

#[test]
fn test_unobserved_features_are_dropped() {
    let counts = array![[3, 1, 40], [0, 0, 0], [2, 4, 1], [0, 0, 0]];
    let result = test_ambient_significance(&counts, &params(10, 100), &SerialExecutor).unwrap();
    assert_eq!(result.metadata.profile.features, vec![0, 2]);
    assert_eq!(result.metadata.profile.proportions.len(), 2);
}

#[test]
fn test_estimated_alpha() {
    let counts = droplets(400, 10, 11);
    let params = EmptyDropsParams {
        alpha: AlphaChoice::Estimate,
        ..params(60, 200)
    };
    let result = test_ambient_significance(&counts, &params, &SerialExecutor).unwrap();
    let Concentration::Finite(alpha) = result.metadata.concentration else {
        panic!("expected a finite concentration");
    };
    assert!(alpha > 10.0 && alpha < 5000.0, "alpha = {alpha}");
    assert_eq!(result.num_tested(), 10);
}

#[test]
fn test_non_integer_counts() {
    let counts = array![[1.0, 0.5, 30.2], [1.0, 1.0, 0.4]];
    let strict = EmptyDropsParams {
        round: false,
        ..params(2, 50)
    };
    assert!(matches!(
        test_ambient_significance(&counts, &strict, &SerialExecutor).unwrap_err(),
        EmptyDropsError::InvalidInput(InvalidInput::NonIntegerCount { .. })
    ));
    let result = test_ambient_significance(&counts, &params(2, 50), &SerialExecutor).unwrap();
    assert_eq!(result.metadata.totals, vec![2, 1, 30]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]
    #[test]
    fn prop_profile_and_retention(seed in 0u64..1000, retain in 0u64..500) {
        let counts = droplets(40, 4, seed);
        let params = EmptyDropsParams {
            retain: Some(retain as f64),
            ..params(50, 50)
        };
        let result = call_non_empty(&counts, &params, no_knee, &SerialExecutor).unwrap();
        let profile = &result.metadata.profile.proportions;
        prop_assert!(profile.iter().all(|&p| p > 0.0));
        prop_assert!((profile.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        for (call, &total) in result.calls.iter().zip(&result.metadata.totals) {
            if total == 0 {
                prop_assert!(call.is_none());
            }
            if let Some(call) = call {
                prop_assert!(call.test.p_value >= 1.0 / 51.0 && call.test.p_value <= 1.0);
                if total >= retain {
                    prop_assert_eq!(call.fdr, Some(0.0));
                }
            }
        }
    }
}
