//! Communication, halo exchange and the zip/unzip algorithms.

pub mod check;
pub mod communicator;
pub mod exchange;
pub mod transfer;
pub mod wire;

pub use check::{find_nan_directions, is_unzip_nan, is_zip_nan, unzip_mismatches};
pub use transfer::{BlockTransfer, Multiplicity, NodeWeighting, Unweighted};
