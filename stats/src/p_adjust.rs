use itertools::Itertools;

/// Benjamini-Hochberg adjusted p-values.
///
/// Missing entries are excluded from the correction: they do not count
/// towards the number of tests and stay missing in the output.
pub fn benjamini_hochberg(p_values: &[Option<f64>]) -> Vec<Option<f64>> {
    let present = p_values
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.map(|p| (i, p)))
        .sorted_by(|a, b| b.1.total_cmp(&a.1))
        .collect::<Vec<_>>();
    let n = present.len() as f64;

    let mut adjusted = vec![None; p_values.len()];
    let mut cummin = f64::INFINITY;
    for (k, &(i, p)) in present.iter().enumerate() {
        // rank among the present values, largest first
        let rank = n - k as f64;
        cummin = cummin.min(p * n / rank);
        adjusted[i] = Some(cummin.min(1.0));
    }
    adjusted
}
