// Warning groups (as of rust 1.55)
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility,
    rust_2018_idioms,
    unused
)]
// Other warnings (as of rust 1.55)
#![deny(
    asm_sub_register,
    bad_asm_style,
    bindings_with_variant_name,
    clashing_extern_declarations,
    confusable_idents,
    const_item_mutation,
    deprecated,
    deref_nullptr,
    drop_bounds,
    dyn_drop,
    elided_lifetimes_in_paths,
    exported_private_dependencies,
    function_item_references,
    improper_ctypes,
    improper_ctypes_definitions,
    incomplete_features,
    inline_no_sanitize,
    invalid_value,
    irrefutable_let_patterns,
    mixed_script_confusables,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overlapping_range_endpoints,
    renamed_and_removed_lints,
    stable_features,
    trivial_bounds,
    type_alias_bounds,
    uncommon_codepoints,
    unconditional_recursion,
    unknown_lints,
    unnameable_test_items,
    unused_comparisons,
    while_true
)]

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct Parameters {
    /// Barcodes with at most this many UMIs are assumed to be empty droplets.
    empty_drops_lower: u64,
    /// Number of Monte Carlo iterations used to compute p-values.
    empty_drops_niters: u32,
    /// Logical seed from which every simulation stream is derived.
    empty_drops_seed: u64,
    /// Round non-integer counts rather than rejecting them.
    empty_drops_round: bool,
    /// Lower end of the search interval for the Dirichlet-multinomial concentration.
    empty_drops_alpha_min: f64,
    /// Upper end of the search interval for the Dirichlet-multinomial concentration.
    empty_drops_alpha_max: f64,
    /// Convergence tolerance of the concentration search.
    empty_drops_alpha_tolerance: f64,
    /// FDR at or below which a barcode is called non-empty.
    empty_drops_fdr_threshold: f64,
}

const DEFAULT_PARAMETERS: Parameters = Parameters {
    empty_drops_lower: 100,
    empty_drops_niters: 10_000,
    empty_drops_seed: 0x5eed_e4d7,
    empty_drops_round: true,
    empty_drops_alpha_min: 0.01,
    empty_drops_alpha_max: 10_000.0,
    // .Machine$double.eps^0.25
    empty_drops_alpha_tolerance: 1.220_703_125e-4,
    empty_drops_fdr_threshold: 0.001,
};
static PARAMETERS: OnceLock<Result<Parameters>> = OnceLock::new();

fn load_parameters(path: &Path) -> Result<Parameters> {
    if !path.exists() {
        warn!(
            "could not find parameters.toml at {}, falling back to defaults",
            path.display()
        );
        Ok(DEFAULT_PARAMETERS)
    } else {
        let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
        Ok(toml::from_str(&s).with_context(|| path.display().to_string())?)
    }
}

/// Return a reference to the global parameters.
/// The parameters may need to be loaded; if loading fails, return Err.
fn parameters() -> &'static Result<Parameters> {
    // TODO: use get_or_try_init once [#109737](https://github.com/rust-lang/rust/issues/109737) is stabilized
    PARAMETERS.get_or_init(|| {
        let path = std::env::current_exe()
            .context("Unable to locate the running executable")?
            .with_file_name("parameters.toml");
        load_parameters(&path)
    })
}

macro_rules! parameter_getter {
    ($a:ident, $t:ty) => {
        pub fn $a() -> Result<&'static $t> {
            let val = match parameters() {
                Err(e) => return Err(anyhow::anyhow!(e)),
                Ok(p) => &p.$a,
            };
            if DEFAULT_PARAMETERS.$a != *val {
                warn!("using non-default {} = {:?}", stringify!($a), val);
            }
            Ok(val)
        }
    };
}

parameter_getter!(empty_drops_lower, u64);
parameter_getter!(empty_drops_niters, u32);
parameter_getter!(empty_drops_seed, u64);
parameter_getter!(empty_drops_round, bool);
parameter_getter!(empty_drops_alpha_min, f64);
parameter_getter!(empty_drops_alpha_max, f64);
parameter_getter!(empty_drops_alpha_tolerance, f64);
parameter_getter!(empty_drops_fdr_threshold, f64);
