//! Octree cells addressed by refinement level and level-local coordinates.

use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshUnzipError;

/// A cell of the octree.
///
/// `coords` are integer coordinates at the cell's own level, so the anchor in
/// finest-level units is `coords << (max_depth - level)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Octant {
    /// Refinement level (0 is the root).
    pub level: u8,
    /// Integer coordinates at the given level.
    pub coords: [u32; 3],
}

impl Octant {
    pub const ROOT: Octant = Octant {
        level: 0,
        coords: [0; 3],
    };

    pub fn new(level: u8, coords: [u32; 3]) -> Self {
        Self { level, coords }
    }

    /// Build from an `(x, y, z, level)` key in finest-level units.
    pub fn from_key(x: u32, y: u32, z: u32, level: u8, max_depth: u8) -> Result<Self, MeshUnzipError> {
        if level > max_depth {
            return Err(MeshUnzipError::InvalidLeafSet(format!(
                "level {level} deeper than max depth {max_depth}"
            )));
        }
        let shift = max_depth - level;
        let mask = (1u32 << shift) - 1;
        if (x | y | z) & mask != 0 {
            return Err(MeshUnzipError::InvalidLeafSet(format!(
                "key ({x}, {y}, {z}) is not aligned to level {level}"
            )));
        }
        Ok(Self {
            level,
            coords: [x >> shift, y >> shift, z >> shift],
        })
    }

    /// Returns the parent cell, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.level == 0 {
            None
        } else {
            Some(Self {
                level: self.level - 1,
                coords: self.coords.map(|c| c / 2),
            })
        }
    }

    /// Ancestor at `level` (itself when `level >= self.level`).
    pub fn ancestor(&self, level: u8) -> Self {
        if level >= self.level {
            return *self;
        }
        let shift = self.level - level;
        Self {
            level,
            coords: self.coords.map(|c| c >> shift),
        }
    }

    /// Returns the 8 children; child `idx` takes the upper half on axis `a`
    /// when bit `a` of `idx` is set.
    pub fn children(&self) -> [Self; 8] {
        std::array::from_fn(|idx| {
            let mut coords = [0u32; 3];
            for axis in 0..3 {
                let bit = (idx >> axis) & 1;
                coords[axis] = self.coords[axis] * 2 + bit as u32;
            }
            Self {
                level: self.level + 1,
                coords,
            }
        })
    }

    /// Position of this cell within its parent (same bit code as [`children`](Self::children)).
    pub fn child_index(&self) -> u8 {
        (self.coords[0] & 1) as u8 | ((self.coords[1] & 1) << 1) as u8 | ((self.coords[2] & 1) << 2) as u8
    }

    /// Edge length in finest-level units.
    #[inline]
    pub fn len(&self, max_depth: u8) -> u32 {
        1u32 << (max_depth - self.level)
    }

    /// Lower corner in finest-level units.
    #[inline]
    pub fn anchor(&self, max_depth: u8) -> [u32; 3] {
        let shift = max_depth - self.level;
        self.coords.map(|c| c << shift)
    }

    /// True if `other` lies inside (or equals) this cell.
    pub fn contains(&self, other: &Octant) -> bool {
        other.level >= self.level && other.ancestor(self.level) == *self
    }

    /// Morton (Z-order) code of the anchor.
    pub fn morton(&self, max_depth: u8) -> u64 {
        let [x, y, z] = self.anchor(max_depth);
        spread(x) | (spread(y) << 1) | (spread(z) << 2)
    }

    /// Space-filling-curve sort key; ancestors sort before their descendants.
    pub fn sfc_key(&self, max_depth: u8) -> (u64, u8) {
        (self.morton(max_depth), self.level)
    }
}

fn spread(v: u32) -> u64 {
    let mut out = 0u64;
    for bit in 0..21 {
        out |= u64::from((v >> bit) & 1) << (3 * bit);
    }
    out
}
