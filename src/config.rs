//! Mesh-epoch configuration shared by the builder and the transfer routines.

use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshUnzipError;

/// Deepest refinement level supported by the integer coordinate scheme.
pub const MAX_SUPPORTED_DEPTH: u8 = 20;

/// Order, padding and depth of one mesh epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnzipConfig {
    /// Polynomial order `p` of every element (p + 1 nodes per axis).
    pub order: usize,
    /// Number of padding cells added on each side of a block.
    pub padding_width: usize,
    /// Depth of the finest admissible level; the domain is `[0, 2^max_depth]^3`.
    pub max_depth: u8,
}

impl Default for UnzipConfig {
    fn default() -> Self {
        Self {
            order: 4,
            padding_width: 3,
            max_depth: 8,
        }
    }
}

impl UnzipConfig {
    pub fn new(order: usize, padding_width: usize, max_depth: u8) -> Self {
        Self {
            order,
            padding_width,
            max_depth,
        }
    }

    /// Reject configurations the padding plan cannot serve.
    ///
    /// The padding band must stay within one element of the block's level so
    /// that every padded cell lands on a leaf at most one level away.
    pub fn validate(&self) -> Result<(), MeshUnzipError> {
        if self.order == 0 {
            return Err(MeshUnzipError::InvalidOrder(self.order));
        }
        if self.padding_width == 0 || self.padding_width > self.order {
            return Err(MeshUnzipError::InvalidConfig(format!(
                "padding width {} must lie in 1..={}",
                self.padding_width, self.order
            )));
        }
        if self.max_depth == 0 || self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(MeshUnzipError::InvalidConfig(format!(
                "max depth {} must lie in 1..={MAX_SUPPORTED_DEPTH}",
                self.max_depth
            )));
        }
        Ok(())
    }

    /// Nodes per element axis.
    #[inline]
    pub fn nodes_per_axis(&self) -> usize {
        self.order + 1
    }

    /// Nodes per element.
    #[inline]
    pub fn nodes_per_element(&self) -> usize {
        self.nodes_per_axis().pow(3)
    }

    /// Edge length of the domain in finest-level units.
    #[inline]
    pub fn domain_len(&self) -> u32 {
        1u32 << self.max_depth
    }
}
