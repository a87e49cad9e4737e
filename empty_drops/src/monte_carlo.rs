//! Monte Carlo estimate of how often an ambient droplet is at least as
//! unlikely as each tested barcode.
//!
//! Each iteration grows one simulated ambient droplet a molecule at a time
//! and, every time its size reaches the total of one or more tested
//! barcodes, compares its log-probability against theirs. Every global
//! iteration draws from its own ChaCha stream, so the counts do not depend
//! on how the iterations are split between workers.

use crate::errors::EmptyDropsError;
use crate::executor::TaskExecutor;
use crate::log_prob::LogProbModel;
use crate::params::Concentration;
use itertools::Itertools;
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::ops::Range;

/// Relative tolerance under which a simulated and an observed
/// log-probability count as tied.
const TIE_TOLERANCE: f64 = 1e-10;

/// Split `niters` iterations into one contiguous range of global iteration
/// indices per task. Every task gets `niters / num_tasks` iterations and the
/// first also takes the remainder.
pub fn split_iterations(niters: u32, num_tasks: usize) -> Vec<Range<u64>> {
    let num_tasks = num_tasks.max(1) as u64;
    let niters = u64::from(niters);
    let base = niters / num_tasks;
    let first = base + niters % num_tasks;
    let mut start = 0;
    (0..num_tasks)
        .map(|task| {
            let len = if task == 0 { first } else { base };
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Tested barcodes sharing one total, as a range of the sorted order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TotalGroup {
    total: u64,
    barcodes: Range<usize>,
}

/// The shared read-only state of the simulation.
struct NullSimulator<'a> {
    model: &'a LogProbModel,
    /// Cumulative ambient proportions, for inverse transform sampling.
    cumulative: Vec<f64>,
    groups: Vec<TotalGroup>,
    /// Observed data terms, sorted by total and then increasing.
    observed: Vec<f64>,
}

impl<'a> NullSimulator<'a> {
    /// Hits per sorted barcode: the number of iterations in which the first
    /// observed value at or above the simulated one was this barcode's.
    fn run(&self, iterations: Range<u64>, seed: u64) -> Vec<u64> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut hits = vec![0u64; self.observed.len()];
        let mut counts = vec![0u32; self.model.n_features()];
        let max_total = self.groups.last().map_or(0, |g| g.total) as usize;
        let mut drawn: Vec<usize> = Vec::with_capacity(max_total);

        for iteration in iterations {
            rng.set_stream(iteration);
            rng.set_word_pos(0);
            let mut data_term = 0.0;
            for group in &self.groups {
                while (drawn.len() as u64) < group.total {
                    let feature = self.draw(&mut rng, &drawn);
                    data_term += self.model.increment(feature, counts[feature]);
                    counts[feature] += 1;
                    drawn.push(feature);
                }
                let observed = &self.observed[group.barcodes.clone()];
                let threshold = data_term - TIE_TOLERANCE * data_term.abs().max(1.0);
                let first = observed.partition_point(|&p| p < threshold);
                if first < observed.len() {
                    hits[group.barcodes.start + first] += 1;
                }
            }
            for &feature in &drawn {
                counts[feature] = 0;
            }
            drawn.clear();
        }
        hits
    }

    /// Next molecule of the simulated droplet. Under the
    /// Dirichlet-multinomial this is a Polya urn: a fresh ambient draw with
    /// probability alpha / (alpha + n), otherwise a copy of a uniformly
    /// chosen earlier molecule.
    fn draw(&self, rng: &mut ChaCha20Rng, drawn: &[usize]) -> usize {
        match self.model.concentration() {
            Concentration::Finite(alpha) if !drawn.is_empty() => {
                let n = drawn.len() as f64;
                if rng.gen::<f64>() * (alpha + n) < alpha {
                    self.sample_ambient(rng)
                } else {
                    drawn[rng.gen_range(0..drawn.len())]
                }
            }
            _ => self.sample_ambient(rng),
        }
    }

    fn sample_ambient(&self, rng: &mut ChaCha20Rng) -> usize {
        let u: f64 = rng.gen();
        self.cumulative
            .partition_point(|&c| c <= u)
            .min(self.cumulative.len() - 1)
    }
}

/// For every tested barcode, count the iterations in which a simulated
/// ambient droplet of the same total had a data term at or below the
/// barcode's.
///
/// `totals` and `data_terms` describe the tested barcodes, which must all
/// have a positive total. The result is in the same order.
pub(crate) fn count_more_extreme<E: TaskExecutor>(
    totals: &[u64],
    data_terms: &[f64],
    model: &LogProbModel,
    niters: u32,
    seed: u64,
    executor: &E,
) -> Result<Vec<u64>, EmptyDropsError> {
    let num_tested = totals.len();
    if num_tested == 0 {
        return Ok(Vec::new());
    }

    let order: Vec<usize> = (0..num_tested)
        .sorted_by(|&a, &b| {
            totals[a]
                .cmp(&totals[b])
                .then(data_terms[a].total_cmp(&data_terms[b]))
        })
        .collect();
    let observed: Vec<f64> = order.iter().map(|&i| data_terms[i]).collect();
    let mut groups: Vec<TotalGroup> = Vec::new();
    for (pos, &i) in order.iter().enumerate() {
        match groups.last_mut() {
            Some(group) if group.total == totals[i] => group.barcodes.end = pos + 1,
            _ => groups.push(TotalGroup {
                total: totals[i],
                barcodes: pos..pos + 1,
            }),
        }
    }
    let cumulative = cumulative_proportions(model.proportions());

    let simulator = NullSimulator {
        model,
        cumulative,
        groups,
        observed,
    };
    let shares = split_iterations(niters, executor.num_workers());
    info!(
        "Simulating {niters} ambient droplets up to {} molecules for {num_tested} barcodes in {} groups on {} tasks",
        simulator.groups.last().map_or(0, |g| g.total),
        simulator.groups.len(),
        shares.len()
    );
    let sim = &simulator;
    let tasks: Vec<_> = shares
        .into_iter()
        .map(|iterations| move || -> anyhow::Result<Vec<u64>> { Ok(sim.run(iterations, seed)) })
        .collect();
    let per_task = executor.execute(tasks)?;

    let mut hits = vec![0u64; num_tested];
    for task_hits in per_task {
        for (sum, h) in hits.iter_mut().zip(task_hits) {
            *sum += h;
        }
    }
    // a hit at one barcode also counts for every barcode above it in its group
    let mut n_above = vec![0u64; num_tested];
    for group in &simulator.groups {
        let mut running = 0;
        for pos in group.barcodes.clone() {
            running += hits[pos];
            n_above[order[pos]] = running;
        }
    }
    debug!(
        "{} of {num_tested} barcodes never matched by a simulated droplet",
        n_above.iter().filter(|&&n| n == 0).count()
    );
    Ok(n_above)
}

/// Running sums of `proportions`, with the last entry pinned to one.
fn cumulative_proportions(proportions: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    let mut cumulative: Vec<f64> = proportions
        .iter()
        .map(|p| {
            acc += p;
            acc
        })
        .collect();
    if let Some(last) = cumulative.last_mut() {
        *last = 1.0;
    }
    cumulative
}
