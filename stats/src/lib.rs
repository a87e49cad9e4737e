//! stats
#![deny(missing_docs)]

mod brent;
mod good_turing;
mod p_adjust;
pub use brent::{brent_minimize, BrentMinimum};
pub use good_turing::{good_turing, good_turing_proportions, GoodTuring};
pub use p_adjust::benjamini_hochberg;
