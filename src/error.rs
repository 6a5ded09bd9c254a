use thiserror::Error;

/// Errors raised while validating the arguments of a deposition, before any particle is
/// touched. The kernels themselves never fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DepositError {
    /// A bin edge array does not describe at least one bin.
    #[error("bin edges for axis {axis} need at least 2 values, got {len}")]
    TooFewEdges { axis: usize, len: usize },

    /// The first interval of a bin edge array is not a finite, positive step.
    #[error("bin edges for axis {axis} must start with a finite increasing interval")]
    InvalidEdges { axis: usize },

    /// Two per-particle arrays disagree on the number of particles.
    #[error("{what} has {found} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// The caller supplied grid does not match the shape implied by the bin edges.
    #[error("grid has shape {found:?}, bin edges imply {expected:?}")]
    GridShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    /// An axis index outside of `{0, 1, 2}`.
    #[error("axis index {0} is not one of 0, 1, 2")]
    InvalidAxis(usize),

    /// The plane axes and the normal are not a permutation of the three coordinates.
    #[error("plane axes ({direction0}, {direction1}) and normal {normal} must be distinct")]
    InvalidProjection {
        direction0: usize,
        direction1: usize,
        normal: usize,
    },

    /// The output buffer could not be allocated.
    #[error("failed to allocate an output buffer of {cells} cells")]
    Allocation { cells: usize },
}
