//! Failure modes of the empty droplet tests.
//!
//! Every error carries the offending parameter and the value observed, and a
//! failed call never returns partial statistics.

/// Caller-supplied data or parameters that cannot be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidInput {
    /// The number of Monte Carlo iterations must be positive.
    #[error("niters must be a positive number of iterations, got {niters}")]
    InvalidIterationCount {
        /// Requested iterations.
        niters: u32,
    },

    /// Counts must be non-negative.
    #[error("negative count {value} for feature {row}, barcode {col}")]
    NegativeCount {
        /// Feature index.
        row: usize,
        /// Barcode index.
        col: usize,
        /// Offending value.
        value: f64,
    },

    /// Counts must be integers unless rounding is enabled.
    #[error(
        "non-integer count {value} for feature {row}, barcode {col}; \
         enable rounding or supply integer counts"
    )]
    NonIntegerCount {
        /// Feature index.
        row: usize,
        /// Barcode index.
        col: usize,
        /// Offending value.
        value: f64,
    },

    /// NaN or infinite count.
    #[error("non-finite count {value} for feature {row}, barcode {col}")]
    NonFiniteCount {
        /// Feature index.
        row: usize,
        /// Barcode index.
        col: usize,
        /// Offending value.
        value: f64,
    },

    /// A count too large to be stored.
    #[error("count {value} for feature {row}, barcode {col} exceeds {}", u32::MAX)]
    CountOverflow {
        /// Feature index.
        row: usize,
        /// Barcode index.
        col: usize,
        /// Offending value.
        value: f64,
    },

    /// More than one way of choosing the ambient barcodes was requested.
    #[error(
        "the ambient barcodes can be chosen by rank or by an explicit list, not both \
         (by_rank = {by_rank}, {num_known_empty} known empty barcodes)"
    )]
    ConflictingAmbientSelection {
        /// Requested rank.
        by_rank: usize,
        /// Number of explicitly listed empty barcodes.
        num_known_empty: usize,
    },

    /// Rank-based selection needs more barcodes than the rank.
    #[error("by_rank = {by_rank} requires more than {num_barcodes} barcodes")]
    RankOutOfRange {
        /// Requested rank.
        by_rank: usize,
        /// Barcodes in the matrix.
        num_barcodes: usize,
    },

    /// An explicit barcode index outside the matrix.
    #[error("barcode index {index} is out of range for a matrix with {num_barcodes} barcodes")]
    BarcodeOutOfRange {
        /// Offending index.
        index: usize,
        /// Barcodes in the matrix.
        num_barcodes: usize,
    },

    /// The concentration must be a positive finite number.
    #[error("alpha must be positive and finite, got {alpha}")]
    InvalidAlpha {
        /// Offending value.
        alpha: f64,
    },

    /// The retention threshold must be a non-negative number (infinity disables it).
    #[error("retain must be non-negative, got {retain}")]
    InvalidRetain {
        /// Offending value.
        retain: f64,
    },

    /// The concentration search interval is empty or not positive.
    #[error("invalid alpha search interval [{lower}, {upper}] with tolerance {tolerance}")]
    InvalidSearchInterval {
        /// Lower end.
        lower: f64,
        /// Upper end.
        upper: f64,
        /// Convergence tolerance.
        tolerance: f64,
    },
}

/// Why the ambient profile could not be estimated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InsufficientAmbientData {
    /// No barcode falls in the ambient set.
    #[error("no barcodes with total count <= {lower} are available as ambient droplets")]
    NoAmbientBarcodes {
        /// Threshold in effect, if one was used.
        lower: u64,
    },

    /// An explicit list of empty barcodes was supplied but it was empty.
    #[error("the list of known empty barcodes is empty")]
    NoKnownEmpty,

    /// The ambient barcodes contain no counts.
    #[error("the {num_barcodes} ambient barcodes contain no counts")]
    NoAmbientCounts {
        /// Ambient barcodes.
        num_barcodes: usize,
    },
}

/// Error type of the empty droplet tests.
#[derive(Debug, thiserror::Error)]
pub enum EmptyDropsError {
    /// See [`InvalidInput`].
    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),

    /// See [`InsufficientAmbientData`].
    #[error("insufficient ambient data: {0}")]
    InsufficientAmbientData(#[from] InsufficientAmbientData),

    /// The concentration search did not find an interior maximum.
    #[error(
        "could not estimate alpha in [{lower}, {upper}]: {reason}; \
         consider widening the search interval"
    )]
    OptimizationFailure {
        /// Lower end of the interval.
        lower: f64,
        /// Upper end of the interval.
        upper: f64,
        /// Last estimate, when one was reached.
        estimate: Option<f64>,
        /// Description of the failure.
        reason: String,
    },

    /// A simulation task failed; no results are returned.
    #[error("simulation task {task} failed")]
    WorkerFailure {
        /// Index of the failed task.
        task: usize,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },

    /// The worker pool could not be created.
    #[error("could not build the worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The knee point detector failed.
    #[error("knee point detection failed")]
    KneePoint(#[source] anyhow::Error),
}

impl EmptyDropsError {
    /// True for errors caused by the caller's data or parameters.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, EmptyDropsError::InvalidInput(_))
    }
}
