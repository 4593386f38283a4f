//! Octree cells, neighbor directions and a simple leaf forest.
//!
//! - [`Octant`] addresses a cell by level and level-local coordinates.
//! - [`Direction`] enumerates the 26 face/edge/corner neighbors in fill order.
//! - [`OctForest`] builds and refines leaf sets for meshes and tests.

pub mod direction;
pub mod forest;
pub mod octant;

pub use direction::{Direction, DirectionFlags, DirectionKind, DIRECTION_COUNT};
pub use forest::OctForest;
pub use octant::Octant;
