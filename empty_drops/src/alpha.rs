//! Maximum likelihood estimate of the Dirichlet-multinomial concentration
//! from the ambient barcodes.

use crate::errors::EmptyDropsError;
use crate::matrix::CountMatrix;
use crate::params::AlphaSearch;
use log::info;
use statrs::function::gamma::ln_gamma;

/// Ambient data in the form the likelihood needs: the total of every ambient
/// barcode, and for every nonzero entry its count and the ambient
/// proportion of its feature.
struct AmbientData {
    totals: Vec<f64>,
    entries: Vec<(f64, f64)>,
}

impl AmbientData {
    fn new(matrix: &CountMatrix, ambient: &[usize], proportions: &[f64]) -> Self {
        let totals = ambient.iter().map(|&b| matrix.total(b) as f64).collect();
        let entries = ambient
            .iter()
            .flat_map(|&b| matrix.column(b))
            .map(|(feature, count)| (f64::from(count), proportions[feature]))
            .collect();
        AmbientData { totals, entries }
    }

    /// Log-likelihood up to terms that do not depend on `alpha`.
    fn loglik(&self, alpha: f64) -> f64 {
        let per_barcode: f64 = self
            .totals
            .iter()
            .map(|&total| ln_gamma(alpha) - ln_gamma(total + alpha))
            .sum();
        let per_entry: f64 = self
            .entries
            .iter()
            .map(|&(count, p)| {
                let scaled = alpha * p;
                ln_gamma(count + scaled) - ln_gamma(scaled)
            })
            .sum();
        per_barcode + per_entry
    }
}

/// Dirichlet-multinomial log-likelihood of the ambient barcodes at
/// concentration `alpha`, omitting the multinomial coefficients which do not
/// depend on `alpha`.
pub fn dirichlet_multinomial_loglik(
    alpha: f64,
    matrix: &CountMatrix,
    ambient: &[usize],
    proportions: &[f64],
) -> f64 {
    AmbientData::new(matrix, ambient, proportions).loglik(alpha)
}

/// Maximize the Dirichlet-multinomial likelihood of the ambient barcodes
/// over `search`. A maximum that lands on either end of the interval is
/// reported as a failure instead of being returned.
pub(crate) fn estimate_alpha(
    matrix: &CountMatrix,
    ambient: &[usize],
    proportions: &[f64],
    search: &AlphaSearch,
) -> Result<f64, EmptyDropsError> {
    let AlphaSearch {
        lower,
        upper,
        tolerance,
    } = *search;
    let failure = |estimate, reason: String| EmptyDropsError::OptimizationFailure {
        lower,
        upper,
        estimate,
        reason,
    };

    let data = AmbientData::new(matrix, ambient, proportions);
    let min = stats::brent_minimize(|alpha| -data.loglik(alpha), lower, upper, tolerance)
        .map_err(|e| failure(None, e.to_string()))?;
    if !min.fx.is_finite() {
        return Err(failure(
            Some(min.x),
            format!("log-likelihood is not finite at alpha = {}", min.x),
        ));
    }
    // Brent never evaluates the endpoints; it stops within a few tolerances of them
    let slack = 5.0 * (f64::EPSILON.sqrt() * min.x.abs() + tolerance);
    if min.x - lower <= slack || upper - min.x <= slack {
        return Err(failure(
            Some(min.x),
            format!("maximum at alpha = {} lies on the search boundary", min.x),
        ));
    }
    info!(
        "Estimated alpha = {:.4} from {} ambient barcodes ({} likelihood evaluations)",
        min.x,
        ambient.len(),
        min.evaluations
    );
    Ok(min.x)
}
