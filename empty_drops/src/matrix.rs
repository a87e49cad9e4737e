//! Feature-barcode count matrix.
//!
//! Any storage that can enumerate its stored entries implements
//! [`NonzeroCounts`]. It is converted once, at the boundary, into a validated
//! [`CountMatrix`] which is what the tests operate on.

use crate::errors::{EmptyDropsError, InvalidInput};
use ndarray::{ArrayBase, Data, Ix2};
use num_traits::ToPrimitive;
use sprs::{CsMatBase, CsMatI, SpIndex, TriMatI};
use std::ops::Deref;

/// A features-by-barcodes matrix of counts that can visit its stored entries.
pub trait NonzeroCounts {
    /// (number of features, number of barcodes)
    fn dimensions(&self) -> (usize, usize);

    /// Call `f(feature, barcode, value)` for every stored entry, in any order.
    /// Entries with value zero may be skipped.
    fn for_each_nonzero<F: FnMut(usize, usize, f64)>(&self, f: F);
}

impl<N, I, Iptr, IptrStorage, IndStorage, DataStorage> NonzeroCounts
    for CsMatBase<N, I, IptrStorage, IndStorage, DataStorage, Iptr>
where
    N: ToPrimitive,
    I: SpIndex,
    Iptr: SpIndex,
    IptrStorage: Deref<Target = [Iptr]>,
    IndStorage: Deref<Target = [I]>,
    DataStorage: Deref<Target = [N]>,
{
    fn dimensions(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    fn for_each_nonzero<F: FnMut(usize, usize, f64)>(&self, mut f: F) {
        for (value, (row, col)) in self.iter() {
            f(row.index(), col.index(), value.to_f64().unwrap_or(f64::NAN));
        }
    }
}

impl<A, S> NonzeroCounts for ArrayBase<S, Ix2>
where
    A: ToPrimitive,
    S: Data<Elem = A>,
{
    fn dimensions(&self) -> (usize, usize) {
        self.dim()
    }

    fn for_each_nonzero<F: FnMut(usize, usize, f64)>(&self, mut f: F) {
        for ((row, col), value) in self.indexed_iter() {
            let value = value.to_f64().unwrap_or(f64::NAN);
            if value != 0.0 {
                f(row, col, value);
            }
        }
    }
}

/// Validate one stored value and convert it to an integer count.
/// Non-integers are rounded half to even when `round` is set.
fn to_count(row: usize, col: usize, value: f64, round: bool) -> Result<u32, InvalidInput> {
    if !value.is_finite() {
        return Err(InvalidInput::NonFiniteCount { row, col, value });
    }
    if value < 0.0 {
        return Err(InvalidInput::NegativeCount { row, col, value });
    }
    let rounded = value.round_ties_even();
    if rounded != value && !round {
        return Err(InvalidInput::NonIntegerCount { row, col, value });
    }
    if rounded > f64::from(u32::MAX) {
        return Err(InvalidInput::CountOverflow { row, col, value });
    }
    Ok(rounded as u32)
}

/// Immutable compressed-sparse-column matrix of integer counts,
/// features in rows and barcodes in columns, with cached column totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMatrix {
    matrix: CsMatI<u32, usize>,
    totals: Vec<u64>,
}

impl CountMatrix {
    /// Validate `source` and convert it into a `CountMatrix`.
    ///
    /// Negative and non-finite values are rejected. Non-integer values are
    /// rounded when `round` is set and rejected otherwise. Duplicate entries
    /// for the same cell are summed.
    pub fn from_counts<M: NonzeroCounts>(source: &M, round: bool) -> Result<Self, EmptyDropsError> {
        let (num_features, num_barcodes) = source.dimensions();
        let mut triplets = TriMatI::<u32, usize>::new((num_features, num_barcodes));
        let mut error = None;
        source.for_each_nonzero(|row, col, value| {
            if error.is_some() {
                return;
            }
            match to_count(row, col, value, round) {
                Ok(0) => {}
                Ok(count) => triplets.add_triplet(row, col, count),
                Err(e) => error = Some(e),
            }
        });
        if let Some(e) = error {
            return Err(e.into());
        }
        Ok(CountMatrix::from_csc(triplets.to_csc()))
    }

    fn from_csc(matrix: CsMatI<u32, usize>) -> Self {
        let totals = matrix
            .outer_iterator()
            .map(|column| column.data().iter().map(|&c| u64::from(c)).sum())
            .collect();
        CountMatrix { matrix, totals }
    }

    /// Number of features (rows).
    pub fn n_features(&self) -> usize {
        self.matrix.rows()
    }

    /// Number of barcodes (columns).
    pub fn n_barcodes(&self) -> usize {
        self.totals.len()
    }

    /// Number of stored nonzero counts.
    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    /// Nonzero `(feature, count)` pairs of one barcode, by increasing feature.
    pub fn column(&self, barcode: usize) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.matrix
            .outer_view(barcode)
            .into_iter()
            .flat_map(|column| {
                let (rows, counts) = column.into_raw_storage();
                rows.iter().copied().zip(counts.iter().copied())
            })
    }

    /// Total count of one barcode.
    pub fn total(&self, barcode: usize) -> u64 {
        self.totals[barcode]
    }

    /// Total count of every barcode.
    pub fn totals(&self) -> &[u64] {
        &self.totals
    }

    /// Summed counts of every feature over the given barcodes.
    pub fn feature_sums(&self, barcodes: impl IntoIterator<Item = usize>) -> Vec<u64> {
        let mut sums = vec![0u64; self.n_features()];
        for barcode in barcodes {
            for (row, count) in self.column(barcode) {
                sums[row] += u64::from(count);
            }
        }
        sums
    }

    /// Summed counts of every feature over all barcodes.
    pub fn feature_totals(&self) -> Vec<u64> {
        self.feature_sums(0..self.n_barcodes())
    }

    /// Keep only the listed features, in the given order. Barcode order and
    /// indices are unchanged.
    pub fn select_features(&self, features: &[usize]) -> CountMatrix {
        let mut new_index = vec![None; self.n_features()];
        for (new, &old) in features.iter().enumerate() {
            new_index[old] = Some(new);
        }
        let mut triplets = TriMatI::<u32, usize>::new((features.len(), self.n_barcodes()));
        for (barcode, column) in self.matrix.outer_iterator().enumerate() {
            for (row, &count) in column.iter() {
                if let Some(row) = new_index[row] {
                    triplets.add_triplet(row, barcode, count);
                }
            }
        }
        CountMatrix::from_csc(triplets.to_csc())
    }
}
