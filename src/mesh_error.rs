//! MeshUnzipError: unified error type for mesh-unzip public APIs
//!
//! Every fallible operation in the crate (operator construction, mesh views,
//! exchange contexts, unzip/zip) reports through this enum so callers can match
//! on the failure class instead of parsing strings.

use thiserror::Error;

use crate::algs::exchange::context::VectorId;

/// Unified error type for mesh-unzip operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshUnzipError {
    /// A child index outside `[0, 2^dim)` was passed to an interpolation routine.
    #[error("invalid child index {child} for a {dim}D transfer")]
    InvalidChild { child: u8, dim: usize },
    /// A direction index outside the 26 neighbor directions.
    #[error("invalid direction index {0} (expected < 26)")]
    InvalidDirection(u8),
    /// Reference element or transfer requested for an unsupported dimension.
    #[error("unsupported dimension {requested} (reference element supports up to {supported})")]
    InvalidDimension { requested: usize, supported: usize },
    /// Polynomial order must be at least 1.
    #[error("invalid polynomial order {0}")]
    InvalidOrder(usize),
    /// A buffer passed in had the wrong length.
    #[error("size mismatch for {what}: expected {expected}, found {found}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A padding cell source is more than one refinement level away.
    #[error("nonconforming source for element {element}: {reason}")]
    Nonconforming { element: usize, reason: String },
    /// Neighboring leaves differ by more than one level.
    #[error("mesh is not 2:1 balanced at leaf {leaf}: {reason}")]
    UnbalancedMesh { leaf: usize, reason: String },
    /// The leaf list does not tile the domain exactly once.
    #[error("invalid leaf set: {0}")]
    InvalidLeafSet(String),
    /// A point or node required by a block is not present in the local view.
    #[error("no element covers {0}")]
    MissingElement(String),
    /// Vandermonde or mass matrix could not be inverted.
    #[error("singular {0} matrix")]
    SingularOperator(&'static str),
    /// Configuration rejected by `UnzipConfig::validate`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A second exchange context was opened on a vector that already has one.
    #[error("exchange context already open for vector {0:?}")]
    ExchangeAlreadyOpen(VectorId),
    /// Received data was requested before all requests completed.
    #[error("exchange on vector {0:?} still has outstanding requests")]
    ExchangePending(VectorId),
    /// Staging was used before being allocated (or after release).
    #[error("{0} staging buffer not allocated")]
    StagingNotAllocated(&'static str),
    /// A staging range fell outside the allocation.
    #[error("{which} staging range {start}..{end} exceeds allocation of {len}")]
    StagingOutOfBounds {
        which: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },
    /// Communication failure with a peer.
    #[error("communication error with rank {neighbor}: {message}")]
    CommError { neighbor: usize, message: String },
    /// A zip divisor was zero or not finite.
    #[error("degenerate weight {weight} at node {node}")]
    DegenerateWeight { node: usize, weight: f64 },
}
