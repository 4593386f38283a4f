#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-unzip
//!
//! mesh-unzip moves nodal data of distributed, 2:1-balanced octree meshes
//! between two layouts used by high-order finite-difference/finite-element
//! solvers:
//!
//! - the *zipped* layout: one value per continuous (CG) node, partitioned
//!   across ranks with ghost copies of neighbor-owned nodes;
//! - the *unzipped* layout: per block, a regular padded array covering the
//!   block's elements plus a halo of `padding_width` cells on every side.
//!
//! ## Features
//! - Reference element tables (equispaced, Gauss-Lobatto, Gauss) with
//!   separable parent/child interpolation in 1D, 2D and 3D
//! - Hanging-node aware gather of element nodal values
//! - Non-blocking ghost exchange with per-vector exchange contexts,
//!   overlapped with block interior filling
//! - Zip with pluggable node weighting (multiplicity averaging by default)
//! - Pluggable communication backends (serial, threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-unzip = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! Build every rank's view with [`mesh::MeshBuilder`], then drive transfers
//! through [`algs::transfer::BlockTransfer`].

pub mod algs;
pub mod config;
pub mod debug_invariants;
pub mod mesh;
pub mod mesh_error;
pub mod refel;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm};
    pub use crate::algs::exchange::{ExchangeContext, ExchangeRegistry, GhostMode, VectorId};
    pub use crate::algs::transfer::{BlockTransfer, Multiplicity, NodeWeighting, Unweighted};
    pub use crate::config::UnzipConfig;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh::{Block, LocalMesh, MeshBuilder};
    pub use crate::mesh_error::MeshUnzipError;
    pub use crate::refel::{InterpScratch, ReferenceElement};
    pub use crate::topology::{Direction, DirectionFlags, DirectionKind, OctForest, Octant};
}
