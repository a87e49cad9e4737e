use crate::errors::InvalidInput;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Which barcodes receive a Monte Carlo p-value, and whether the ambient
/// barcodes among them take part in multiple testing correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestAmbient {
    /// Only barcodes outside the ambient set are tested.
    #[default]
    ExcludeAmbient,
    /// Every barcode with a positive total is tested. Ambient barcodes get
    /// p-values for diagnostics but no FDR.
    TestAllPositive,
    /// Every barcode with a positive total is tested and corrected,
    /// ambient barcodes included.
    TestAllAndCorrect,
}

impl TestAmbient {
    /// True when ambient barcodes are tested.
    pub fn tests_ambient(self) -> bool {
        !matches!(self, TestAmbient::ExcludeAmbient)
    }
}

/// How the Dirichlet-multinomial concentration is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaChoice {
    /// No overdispersion: the plain multinomial model.
    #[default]
    Infinite,
    /// A caller-supplied positive concentration.
    Fixed(f64),
    /// Maximum likelihood estimate from the ambient barcodes.
    Estimate,
}

/// Concentration of the ambient model in effect for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Concentration {
    /// Multinomial model.
    Infinite,
    /// Dirichlet-multinomial model with this concentration.
    Finite(f64),
}

/// Bounds and tolerance of the concentration search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlphaSearch {
    /// Lower end of the search interval.
    pub lower: f64,
    /// Upper end of the search interval.
    pub upper: f64,
    /// Convergence tolerance.
    pub tolerance: f64,
}

/// Parameters of [`crate::test_ambient_significance`] and [`crate::call_non_empty`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmptyDropsParams {
    /// Barcodes with total count at or below this are ambient, unless
    /// `by_rank` or `known_empty` is given.
    pub lower: u64,
    /// Monte Carlo iterations.
    pub niters: u32,
    /// Which barcodes to test.
    pub test_ambient: TestAmbient,
    /// Barcodes with total count at or below this are never tested.
    pub ignore: Option<u64>,
    /// Concentration of the ambient model.
    pub alpha: AlphaChoice,
    /// Search interval used when `alpha` is [`AlphaChoice::Estimate`].
    pub alpha_search: AlphaSearch,
    /// Derive `lower` from the total of the barcode at this rank
    /// (0-based, decreasing total).
    pub by_rank: Option<usize>,
    /// Explicit ambient barcode indices.
    pub known_empty: Option<Vec<usize>>,
    /// Round non-integer counts instead of rejecting them.
    pub round: bool,
    /// Logical seed of the simulation streams.
    pub seed: u64,
    /// Barcodes with total count at or above this are always called.
    /// `None` asks the knee point detector.
    pub retain: Option<f64>,
    /// FDR at or below which a barcode is called non-empty.
    pub fdr_threshold: f64,
}

/// How the ambient barcodes are chosen for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AmbientSelection<'a> {
    KnownEmpty(&'a [usize]),
    ByRank(usize),
    Lower(u64),
}

impl EmptyDropsParams {
    /// Parameters with the defaults from `parameters.toml`.
    pub fn new() -> Result<Self> {
        Ok(EmptyDropsParams {
            lower: *parameters_toml::empty_drops_lower()?,
            niters: *parameters_toml::empty_drops_niters()?,
            test_ambient: TestAmbient::default(),
            ignore: None,
            alpha: AlphaChoice::default(),
            alpha_search: AlphaSearch {
                lower: *parameters_toml::empty_drops_alpha_min()?,
                upper: *parameters_toml::empty_drops_alpha_max()?,
                tolerance: *parameters_toml::empty_drops_alpha_tolerance()?,
            },
            by_rank: None,
            known_empty: None,
            round: *parameters_toml::empty_drops_round()?,
            seed: *parameters_toml::empty_drops_seed()?,
            retain: None,
            fdr_threshold: *parameters_toml::empty_drops_fdr_threshold()?,
        })
    }

    /// Check everything that can be checked without looking at the data.
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.niters == 0 {
            return Err(InvalidInput::InvalidIterationCount {
                niters: self.niters,
            });
        }
        match self.alpha {
            AlphaChoice::Fixed(alpha) if !(alpha.is_finite() && alpha > 0.0) => {
                return Err(InvalidInput::InvalidAlpha { alpha });
            }
            AlphaChoice::Estimate => {
                let AlphaSearch {
                    lower,
                    upper,
                    tolerance,
                } = self.alpha_search;
                if !(lower > 0.0 && upper.is_finite() && lower < upper && tolerance > 0.0) {
                    return Err(InvalidInput::InvalidSearchInterval {
                        lower,
                        upper,
                        tolerance,
                    });
                }
            }
            _ => {}
        }
        if let Some(retain) = self.retain {
            validate_retain(retain)?;
        }
        self.ambient_selection().map(|_| ())
    }

    pub(crate) fn ambient_selection(&self) -> Result<AmbientSelection<'_>, InvalidInput> {
        match (&self.known_empty, self.by_rank) {
            (Some(known_empty), Some(by_rank)) => Err(InvalidInput::ConflictingAmbientSelection {
                by_rank,
                num_known_empty: known_empty.len(),
            }),
            (Some(known_empty), None) => Ok(AmbientSelection::KnownEmpty(known_empty)),
            (None, Some(by_rank)) => Ok(AmbientSelection::ByRank(by_rank)),
            (None, None) => Ok(AmbientSelection::Lower(self.lower)),
        }
    }
}

pub(crate) fn validate_retain(retain: f64) -> Result<(), InvalidInput> {
    // +inf is allowed and disables retention
    if retain.is_nan() || retain < 0.0 {
        return Err(InvalidInput::InvalidRetain { retain });
    }
    Ok(())
}
