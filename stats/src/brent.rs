use anyhow::{bail, Result};
use log::debug;

const MAX_ITERATIONS: usize = 1000;

/// Location and value of a one-dimensional minimum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrentMinimum {
    /// Argument at which the minimum was found.
    pub x: f64,
    /// Function value at `x`.
    pub fx: f64,
    /// Number of function evaluations.
    pub evaluations: usize,
}

/// Minimize `f` over `[lower, upper]` with Brent's method, a combination of
/// golden section search and successive parabolic interpolation.
///
/// `tolerance` bounds the width of the final interval in the same way as the
/// `tol` argument of R's `optimize`. The endpoints themselves are never
/// evaluated, so a minimum at a boundary is approached to within roughly
/// `tolerance` of it.
pub fn brent_minimize<F>(mut f: F, lower: f64, upper: f64, tolerance: f64) -> Result<BrentMinimum>
where
    F: FnMut(f64) -> f64,
{
    if !(lower.is_finite() && upper.is_finite() && lower < upper) {
        bail!("invalid search interval [{lower}, {upper}]");
    }
    if !(tolerance > 0.0) {
        bail!("tolerance must be positive, got {tolerance}");
    }
    // (3 - sqrt(5)) / 2, the squared inverse of the golden ratio
    let golden = 0.5 * (3.0 - 5f64.sqrt());
    let eps = f64::EPSILON.sqrt();
    let tol3 = tolerance / 3.0;

    let (mut a, mut b) = (lower, upper);
    let mut x = a + golden * (b - a);
    let (mut v, mut w) = (x, x);
    let (mut d, mut e) = (0.0f64, 0.0f64);
    let mut fx = f(x);
    let (mut fv, mut fw) = (fx, fx);
    let mut evaluations = 1;

    loop {
        let xm = 0.5 * (a + b);
        let tol1 = eps * x.abs() + tol3;
        let t2 = 2.0 * tol1;
        if (x - xm).abs() <= t2 - 0.5 * (b - a) {
            break;
        }
        if evaluations > MAX_ITERATIONS {
            bail!("Brent search did not converge after {MAX_ITERATIONS} evaluations");
        }

        let (mut p, mut q, mut r) = (0.0f64, 0.0f64, 0.0f64);
        if e.abs() > tol1 {
            r = (x - w) * (fx - fv);
            q = (x - v) * (fx - fw);
            p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            } else {
                q = -q;
            }
            r = e;
            e = d;
        }

        if p.abs() >= (0.5 * q * r).abs() || p <= q * (a - x) || p >= q * (b - x) {
            // golden section step
            e = if x < xm { b - x } else { a - x };
            d = golden * e;
        } else {
            // parabolic interpolation step
            d = p / q;
            let u = x + d;
            if u - a < t2 || b - u < t2 {
                d = if x < xm { tol1 } else { -tol1 };
            }
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        let fu = f(u);
        evaluations += 1;
        if fu.is_nan() {
            bail!("objective is NaN at {u}");
        }

        if fu <= fx {
            if u < x {
                b = x;
            } else {
                a = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }
    debug!("Brent search converged to {x} after {evaluations} evaluations");
    Ok(BrentMinimum { x, fx, evaluations })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic() {
        let min = brent_minimize(|x| (x - 1.5).powi(2) + 3.0, -10.0, 10.0, 1e-8).unwrap();
        assert!((min.x - 1.5).abs() < 1e-6);
        assert!((min.fx - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_non_smooth() {
        let min = brent_minimize(|x| (x - 0.3).abs(), 0.0, 1.0, 1e-8).unwrap();
        assert!((min.x - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_boundary_minimum_is_approached() {
        let min = brent_minimize(|x| x, 2.0, 5.0, 1e-6).unwrap();
        assert!((min.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_log_scale_objective() {
        // maximum of -(ln x - ln 40)^2 on a wide interval
        let min = brent_minimize(|x| (x.ln() - 40f64.ln()).powi(2), 0.01, 10000.0, 1e-6).unwrap();
        assert!((min.x - 40.0).abs() < 1e-2);
    }

    #[test]
    fn test_bad_interval() {
        assert!(brent_minimize(|x| x, 1.0, 1.0, 1e-6).is_err());
        assert!(brent_minimize(|x| x, 2.0, 1.0, 1e-6).is_err());
        assert!(brent_minimize(|x| x, 0.0, f64::INFINITY, 1e-6).is_err());
        assert!(brent_minimize(|x| x, 0.0, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_nan_objective() {
        assert!(brent_minimize(|_| f64::NAN, 0.0, 1.0, 1e-6).is_err());
    }
}
