use anyhow::{bail, Result};
use itertools::Itertools;

/// Gale & Sampson confidence factor for switching from Turing to smoothed estimates.
const CONFIDENCE_FACTOR: f64 = 1.96;

/// Simple Good-Turing frequency estimates for a vector of category counts.
/// See Gale & Sampson (1995), "Good-Turing frequency estimation without tears".
#[derive(Debug, Clone, PartialEq)]
pub struct GoodTuring {
    /// Distinct nonzero counts, ascending.
    pub counts: Vec<u64>,
    /// Number of categories observed with each count.
    pub frequencies: Vec<u64>,
    /// Estimated proportion of a single category with each count.
    pub proportions: Vec<f64>,
    /// Total probability mass assigned to unseen categories.
    pub p0: f64,
}

impl GoodTuring {
    /// Estimated proportion of a single category observed `count` times.
    /// Returns `None` if no category had that count.
    pub fn proportion(&self, count: u64) -> Option<f64> {
        self.counts
            .binary_search(&count)
            .ok()
            .map(|i| self.proportions[i])
    }
}

/// Least-squares slope of log(Z_r) against log(r), where Z_r is the
/// frequency-of-frequencies averaged over the gap to the neighbouring counts.
/// Undefined with fewer than two distinct counts.
fn log_log_slope(counts: &[u64], frequencies: &[u64]) -> Option<f64> {
    let n = counts.len();
    if n < 2 {
        return None;
    }
    let last = n - 1;
    let mut log_r = Vec::with_capacity(n);
    let mut log_z = Vec::with_capacity(n);
    for i in 0..n {
        let prev = if i == 0 { 0 } else { counts[i - 1] };
        let width = if i == last {
            2 * (counts[i] - prev)
        } else {
            counts[i + 1] - prev
        };
        log_r.push((counts[i] as f64).ln());
        log_z.push((2.0 * frequencies[i] as f64 / width as f64).ln());
    }
    let mean_x = log_r.iter().sum::<f64>() / n as f64;
    let mean_y = log_z.iter().sum::<f64>() / n as f64;
    let (sxy, sxx) = log_r
        .iter()
        .zip(&log_z)
        .fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
            (sxy + (x - mean_x) * (y - mean_y), sxx + (x - mean_x).powi(2))
        });
    Some(sxy / sxx)
}

/// Run simple Good-Turing on a vector of category counts. Zero counts are
/// unseen categories and only contribute through `p0`.
pub fn good_turing(counts: &[u64]) -> Result<GoodTuring> {
    let (distinct, frequencies): (Vec<u64>, Vec<u64>) = counts
        .iter()
        .copied()
        .filter(|&c| c > 0)
        .sorted()
        .dedup_with_count()
        .map(|(freq, count)| (count, freq as u64))
        .unzip();
    if distinct.is_empty() {
        bail!("Good-Turing estimation requires at least one nonzero count");
    }

    let big_n: f64 = distinct
        .iter()
        .zip(&frequencies)
        .map(|(&r, &n_r)| (r * n_r) as f64)
        .sum();
    let p0 = if distinct[0] == 1 {
        frequencies[0] as f64 / big_n
    } else {
        0.0
    };

    let slope = log_log_slope(&distinct, &frequencies);
    let last = distinct.len() - 1;
    let mut proportions = vec![0.0; distinct.len()];
    let mut use_smoothed = false;
    let mut big_n_prime = 0.0;
    for i in 0..distinct.len() {
        let r = distinct[i] as f64;
        let next_r = r + 1.0;
        let estimate = match slope {
            Some(slope) => {
                let smoothed = next_r * (slope * (next_r.ln() - r.ln())).exp();
                if i == last || distinct[i + 1] != distinct[i] + 1 {
                    use_smoothed = true;
                }
                if use_smoothed {
                    smoothed
                } else {
                    let n_r = frequencies[i] as f64;
                    let n_next = frequencies[i + 1] as f64;
                    let turing = next_r * n_next / n_r;
                    let spread = CONFIDENCE_FACTOR
                        * (next_r.powi(2) * n_next / n_r.powi(2) * (1.0 + n_next / n_r)).sqrt();
                    if (turing - smoothed).abs() <= spread {
                        use_smoothed = true;
                        smoothed
                    } else {
                        turing
                    }
                }
            }
            // single distinct count: nothing to smooth against
            None => r,
        };
        proportions[i] = estimate;
        big_n_prime += estimate * frequencies[i] as f64;
    }
    let factor = (1.0 - p0) / big_n_prime;
    for p in &mut proportions {
        *p *= factor;
    }

    Ok(GoodTuring {
        counts: distinct,
        frequencies,
        proportions,
        p0,
    })
}

/// Per-category Good-Turing proportions. Unseen categories share `p0` equally.
pub fn good_turing_proportions(counts: &[u64]) -> Result<Vec<f64>> {
    let gt = good_turing(counts)?;
    let num_zero = counts.iter().filter(|&&c| c == 0).count();
    let unseen = if num_zero > 0 {
        gt.p0 / num_zero as f64
    } else {
        0.0
    };
    Ok(counts
        .iter()
        .map(|&c| {
            if c == 0 {
                unseen
            } else {
                gt.proportion(c).unwrap_or(0.0)
            }
        })
        .collect())
}
