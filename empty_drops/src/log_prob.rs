//! Log-probability of a barcode's counts under the ambient model.
//!
//! The log-probability splits into a data term, which depends on the
//! individual counts, and a total term, which depends only on the barcode
//! total. Barcodes with equal totals are ranked on the data term alone.

use crate::params::Concentration;
use statrs::function::factorial::ln_factorial;
use statrs::function::gamma::ln_gamma;

/// Multinomial or Dirichlet-multinomial model of an empty droplet.
#[derive(Debug, Clone)]
pub struct LogProbModel {
    concentration: Concentration,
    proportions: Vec<f64>,
    /// ln(p_g) for the multinomial, alpha * p_g for the Dirichlet-multinomial.
    feature_terms: Vec<f64>,
    /// ln_gamma(alpha * p_g), unused for the multinomial.
    ln_gamma_scaled: Vec<f64>,
}

impl LogProbModel {
    /// Model over `proportions`, which must all be positive.
    pub fn new(proportions: &[f64], concentration: Concentration) -> Self {
        let (feature_terms, ln_gamma_scaled) = match concentration {
            Concentration::Infinite => (proportions.iter().map(|p| p.ln()).collect(), Vec::new()),
            Concentration::Finite(alpha) => {
                let scaled: Vec<f64> = proportions.iter().map(|p| alpha * p).collect();
                let lg = scaled.iter().map(|&s| ln_gamma(s)).collect();
                (scaled, lg)
            }
        };
        LogProbModel {
            concentration,
            proportions: proportions.to_vec(),
            feature_terms,
            ln_gamma_scaled,
        }
    }

    /// Concentration of the model.
    pub fn concentration(&self) -> Concentration {
        self.concentration
    }

    /// Number of features.
    pub fn n_features(&self) -> usize {
        self.proportions.len()
    }

    /// Ambient proportion of every feature.
    pub fn proportions(&self) -> &[f64] {
        &self.proportions
    }

    /// Part of the log-probability that depends on the individual counts,
    /// from the nonzero `(feature, count)` pairs of one barcode.
    pub fn data_term(&self, column: impl IntoIterator<Item = (usize, u32)>) -> f64 {
        match self.concentration {
            Concentration::Infinite => column
                .into_iter()
                .map(|(g, x)| f64::from(x) * self.feature_terms[g] - ln_factorial(u64::from(x)))
                .sum(),
            Concentration::Finite(_) => column
                .into_iter()
                .map(|(g, x)| {
                    ln_gamma(f64::from(x) + self.feature_terms[g])
                        - ln_factorial(u64::from(x))
                        - self.ln_gamma_scaled[g]
                })
                .sum(),
        }
    }

    /// Part of the log-probability that depends only on the barcode total.
    pub fn total_term(&self, total: u64) -> f64 {
        match self.concentration {
            Concentration::Infinite => ln_factorial(total),
            Concentration::Finite(alpha) => {
                ln_factorial(total) + ln_gamma(alpha) - ln_gamma(total as f64 + alpha)
            }
        }
    }

    /// Log-probability of one barcode.
    pub fn log_prob(&self, column: impl IntoIterator<Item = (usize, u32)>, total: u64) -> f64 {
        self.data_term(column) + self.total_term(total)
    }

    /// Change in the data term when the count of `feature` goes from
    /// `current` to `current + 1`.
    #[inline]
    pub(crate) fn increment(&self, feature: usize, current: u32) -> f64 {
        let next = f64::from(current) + 1.0;
        match self.concentration {
            Concentration::Infinite => self.feature_terms[feature] - next.ln(),
            Concentration::Finite(_) => {
                (self.feature_terms[feature] + f64::from(current)).ln() - next.ln()
            }
        }
    }
}
