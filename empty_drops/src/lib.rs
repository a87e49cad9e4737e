//! Crate for EmptyDrops.
//!
//! Distinguishes cell-containing droplets from empty droplets by testing each
//! barcode's counts against a profile of the ambient RNA.
#![deny(missing_docs)]

mod alpha;
mod ambient;
mod calling;
mod correction;
mod errors;
mod executor;
mod log_prob;
mod matrix;
mod monte_carlo;
mod params;
mod results;
mod significance;

#[cfg(test)]
mod test_scenarios;

pub use alpha::dirichlet_multinomial_loglik;
pub use ambient::AmbientProfile;
pub use calling::call_non_empty;
pub use errors::{EmptyDropsError, InsufficientAmbientData, InvalidInput};
pub use executor::{RayonExecutor, SerialExecutor, TaskExecutor};
pub use log_prob::LogProbModel;
pub use matrix::{CountMatrix, NonzeroCounts};
pub use monte_carlo::split_iterations;
pub use params::{AlphaChoice, AlphaSearch, Concentration, EmptyDropsParams, TestAmbient};
pub use results::{AmbientTestResult, BarcodeTest, NonEmptyCall, NonEmptyResult, TestMetadata};
pub use significance::{test_ambient_significance, test_count_matrix};
