//! Leaf-set helper producing the pre-sorted element lists consumed by the mesh builder.

use std::collections::HashSet;

use super::octant::Octant;

/// A set of octree leaves covering the unit cube.
///
/// Only refinement is provided; callers are responsible for keeping the leaf
/// set 2:1 balanced before handing it to [`MeshBuilder`](crate::mesh::builder::MeshBuilder).
#[derive(Debug, Clone)]
pub struct OctForest {
    leaves: HashSet<Octant>,
}

impl Default for OctForest {
    fn default() -> Self {
        Self::new()
    }
}

impl OctForest {
    /// Create a new forest with a single root cell.
    pub fn new() -> Self {
        let mut leaves = HashSet::new();
        leaves.insert(Octant::ROOT);
        Self { leaves }
    }

    /// All cells of one level.
    pub fn uniform(level: u8) -> Self {
        let mut forest = Self::new();
        for _ in 0..level {
            let cells: Vec<_> = forest.leaves.iter().copied().collect();
            forest.refine_cells(&cells);
        }
        forest
    }

    /// Return an iterator over leaf cells.
    pub fn leaves(&self) -> impl Iterator<Item = &Octant> {
        self.leaves.iter()
    }

    /// Return the number of leaf cells.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn contains(&self, cell: &Octant) -> bool {
        self.leaves.contains(cell)
    }

    /// Refine all leaf cells whose indicator exceeds the threshold.
    pub fn refine_by_indicator<F>(&mut self, indicator: F, threshold: f64) -> usize
    where
        F: Fn(&Octant) -> f64,
    {
        let to_refine: Vec<_> = self
            .leaves
            .iter()
            .copied()
            .filter(|cell| indicator(cell) > threshold)
            .collect();
        self.refine_cells(&to_refine)
    }

    /// Replace each listed leaf by its 8 children; returns how many were refined.
    pub fn refine_cells(&mut self, cells: &[Octant]) -> usize {
        let mut refined = 0;
        for cell in cells {
            if self.leaves.remove(cell) {
                for child in cell.children() {
                    self.leaves.insert(child);
                }
                refined += 1;
            }
        }
        refined
    }

    /// Leaves in space-filling-curve order.
    pub fn sorted_leaves(&self, max_depth: u8) -> Vec<Octant> {
        let mut leaves: Vec<_> = self.leaves.iter().copied().collect();
        leaves.sort_by_key(|cell| cell.sfc_key(max_depth));
        leaves
    }

    pub fn max_level(&self) -> u8 {
        self.leaves.iter().map(|cell| cell.level).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_forest_counts() {
        assert_eq!(OctForest::uniform(0).leaf_count(), 1);
        assert_eq!(OctForest::uniform(2).leaf_count(), 64);
    }

    #[test]
    fn refine_replaces_leaf() {
        let mut forest = OctForest::uniform(1);
        let target = Octant::new(1, [0, 0, 0]);
        assert_eq!(forest.refine_cells(&[target]), 1);
        assert_eq!(forest.leaf_count(), 15);
        assert!(!forest.contains(&target));
        assert_eq!(forest.max_level(), 2);
        // already gone
        assert_eq!(forest.refine_cells(&[target]), 0);
    }

    #[test]
    fn sorted_leaves_follow_morton_order() {
        let mut forest = OctForest::uniform(1);
        forest.refine_by_indicator(|c| if c.coords == [1, 1, 1] { 1.0 } else { 0.0 }, 0.5);
        let leaves = forest.sorted_leaves(3);
        assert_eq!(leaves.len(), 15);
        assert_eq!(leaves[0], Octant::new(1, [0, 0, 0]));
        assert_eq!(leaves[7], Octant::new(2, [2, 2, 2]));
    }
}
