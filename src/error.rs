//! The error type returned by [`crate::run`].
//!
//! Only *configuration* failures (programming errors, per the error taxonomy
//! in the design notes) ever reach a caller as an [`Error`]. Numerical
//! failures and empty-input cases are recovered internally by the stages
//! that can encounter them and never unwind the whole run.

use std::fmt;

/// A configuration error detected before or during a tiling run.
///
/// These correspond to the *Configuration* error class: they are
/// programming errors on the part of the caller (or of a hand-wired
/// partitioner pipeline) and always terminate the run.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// `Parameters::min_subdivision_level` or `max_subdivision_level` exceeds
    /// the cubemap-quadtree depth limit, or the range is inverted.
    SubdivisionDepthOutOfRange {
        min_subdivision_level: u32,
        max_subdivision_level: u32,
    },
    /// `Parameters::thread_count` is zero.
    ZeroThreadCount,
    /// The `PointSet`'s parallel arrays (normals, colors, weights) do not
    /// all share the length of `positions`.
    MismatchedSpanLengths {
        positions_len: usize,
        field: &'static str,
        field_len: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SubdivisionDepthOutOfRange {
                min_subdivision_level,
                max_subdivision_level,
            } => write!(
                f,
                "subdivision depth range [{min_subdivision_level}, {max_subdivision_level}] is invalid: \
                 must satisfy min <= max <= 14",
            ),
            Error::ZeroThreadCount => write!(f, "thread_count must be at least 1"),
            Error::MismatchedSpanLengths {
                positions_len,
                field,
                field_len,
            } => write!(
                f,
                "point set has {positions_len} positions but {field_len} {field}, \
                 every non-empty span must match positions in length",
            ),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
