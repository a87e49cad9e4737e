//! Retention and multiple testing correction.

use crate::results::BarcodeTest;
use log::info;

/// FDR of every barcode.
///
/// Tested barcodes with a total at or above `retain` get an FDR of zero and
/// take part in the correction with a p-value of zero, whether or not they
/// are ambient. Other ambient barcodes are left out unless `include_ambient`
/// is set. Untested barcodes stay `None`.
pub(crate) fn correct(
    tests: &[Option<BarcodeTest>],
    ambient: &[bool],
    retain: f64,
    include_ambient: bool,
) -> Vec<Option<f64>> {
    let mut num_retained = 0;
    let p_values: Vec<Option<f64>> = tests
        .iter()
        .zip(ambient)
        .map(|(test, &is_ambient)| {
            let test = test.as_ref()?;
            if test.total as f64 >= retain {
                num_retained += 1;
                Some(0.0)
            } else if is_ambient && !include_ambient {
                None
            } else {
                Some(test.p_value)
            }
        })
        .collect();
    let num_corrected = p_values.iter().flatten().count();
    info!("Correcting {num_corrected} p-values, {num_retained} retained with total >= {retain}");
    stats::benjamini_hochberg(&p_values)
}
