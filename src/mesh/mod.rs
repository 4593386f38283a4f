//! Distributed octree mesh views: elements, CG nodes, blocks and halo plans.

pub mod block;
pub mod builder;
pub mod local;

pub use block::{Block, CellSource, LevelRelation, PaddingCell};
pub use builder::MeshBuilder;
pub use local::{ElementRecord, HangingNodes, LocalMesh};
