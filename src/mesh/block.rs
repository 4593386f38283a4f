//! Blocks: maximal same-level regular sub-grids and their padded layout.
//!
//! A block covering `m^3` elements of order `p` owns a padded array of
//! `(m p + 1 + 2 pw)^3` values, stored x-fastest. Cells whose index lies in
//! `pw..size - pw` on every axis are interior; every other cell belongs to
//! exactly one of the 26 directions.

use std::ops::Range;

use crate::topology::direction::{Direction, DirectionFlags, DIRECTION_COUNT};
use crate::topology::octant::Octant;

/// Level of a padding cell's source leaf relative to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelRelation {
    Same,
    /// one level coarser: the value is interpolated onto the child lattice
    Coarser,
    /// one level finer: the value is injected from a coincident node
    Finer,
}

/// Where a padding cell's value comes from within its source element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellSource {
    /// A node of the element's own lattice.
    Node(usize),
    /// A node of child `child` of the element.
    Child { child: u8, node: usize },
}

/// One padding cell and its source.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddingCell {
    /// Index within the block's padded array.
    pub index: usize,
    /// Local element index (local or ghost).
    pub element: usize,
    pub source: CellSource,
    pub relation: LevelRelation,
    /// Source element is owned by another rank.
    pub remote: bool,
}

/// A regular grid of same-level local elements with a padded array.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) octant: Octant,
    pub(crate) regular_level: u8,
    pub(crate) elements_per_axis: usize,
    pub(crate) elements: Vec<usize>,
    pub(crate) order: usize,
    pub(crate) padding_width: usize,
    pub(crate) size: usize,
    pub(crate) offset: usize,
    pub(crate) origin: [f64; 3],
    pub(crate) spacing: f64,
    pub(crate) flags: DirectionFlags,
    pub(crate) independent: bool,
    pub(crate) padding: Vec<Vec<PaddingCell>>,
}

impl Block {
    /// Region covered by the block.
    pub fn octant(&self) -> Octant {
        self.octant
    }

    /// Level of every element in the block.
    pub fn regular_level(&self) -> u8 {
        self.regular_level
    }

    pub fn elements_per_axis(&self) -> usize {
        self.elements_per_axis
    }

    /// Local element indices, x-fastest.
    pub fn elements(&self) -> &[usize] {
        &self.elements
    }

    pub fn element_at(&self, ex: usize, ey: usize, ez: usize) -> usize {
        let m = self.elements_per_axis;
        self.elements[(ez * m + ey) * m + ex]
    }

    pub fn padding_width(&self) -> usize {
        self.padding_width
    }

    /// Padded length per axis (regular grid + 2 * padding).
    pub fn allocation(&self) -> [usize; 3] {
        [self.size; 3]
    }

    /// Values in the padded array.
    pub fn len(&self) -> usize {
        self.size * self.size * self.size
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Start of the block in the unzipped buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }

    /// Coordinate (finest-level units) of padded index `(0, 0, 0)` shifted by the padding.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Distance between neighboring padded cells.
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Directions whose neighbor is at the same level on another rank.
    pub fn flags(&self) -> DirectionFlags {
        self.flags
    }

    pub fn set_direction_flag(&mut self, dir: Direction, on: bool) {
        self.flags.set(dir, on);
    }

    /// Interior can be filled from owned nodes alone, before ghosts arrive.
    pub fn is_independent(&self) -> bool {
        self.independent
    }

    /// Padding cells of `dir` with an existing source (domain-boundary cells are absent).
    pub fn padding(&self, dir: Direction) -> &[PaddingCell] {
        &self.padding[dir.index()]
    }

    /// Whether unzip writes `cell` of direction `dir`.
    ///
    /// Same-level remote cells are only written when the direction's flag is set.
    pub fn fills(&self, dir: Direction, cell: &PaddingCell) -> bool {
        !cell.remote || cell.relation != LevelRelation::Same || self.flags.contains(dir)
    }

    #[inline]
    pub fn linear_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.size + j) * self.size + i
    }

    pub fn cell_indices(&self, index: usize) -> [usize; 3] {
        let n = self.size;
        [index % n, (index / n) % n, index / (n * n)]
    }

    /// Padded index of node `(i, j, k)` of the element at `(ex, ey, ez)`.
    pub fn element_node_index(&self, e: [usize; 3], node: [usize; 3]) -> usize {
        let p = self.order;
        let pw = self.padding_width;
        self.linear_index(
            pw + e[0] * p + node[0],
            pw + e[1] * p + node[1],
            pw + e[2] * p + node[2],
        )
    }

    /// Coordinate of padded cell `(i, j, k)` in finest-level units.
    pub fn cell_point(&self, idx: [usize; 3]) -> [f64; 3] {
        std::array::from_fn(|a| self.origin[a] + idx[a] as f64 * self.spacing)
    }

    /// Direction a padded cell belongs to, `None` for interior cells.
    pub fn direction_of(&self, idx: [usize; 3]) -> Option<Direction> {
        padded_direction(idx, self.size, self.padding_width)
    }

    pub(crate) fn empty_padding() -> Vec<Vec<PaddingCell>> {
        vec![Vec::new(); DIRECTION_COUNT]
    }
}

/// Direction of padded index `idx` in an array of `size` cells per axis.
pub(crate) fn padded_direction(idx: [usize; 3], size: usize, pw: usize) -> Option<Direction> {
    let offset: [i8; 3] = std::array::from_fn(|a| {
        if idx[a] < pw {
            -1
        } else if idx[a] >= size - pw {
            1
        } else {
            0
        }
    });
    Direction::from_offset(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Block {
        Block {
            octant: Octant::new(1, [0, 0, 0]),
            regular_level: 2,
            elements_per_axis: 2,
            elements: (0..8).collect(),
            order: 2,
            padding_width: 1,
            size: 2 * 2 + 1 + 2,
            offset: 10,
            origin: [-0.5, -0.5, -0.5],
            spacing: 0.5,
            flags: DirectionFlags::default(),
            independent: true,
            padding: Block::empty_padding(),
        }
    }

    #[test]
    fn layout_and_directions() {
        let b = block();
        assert_eq!(b.len(), 343);
        assert_eq!(b.range(), 10..353);
        assert_eq!(b.direction_of([3, 3, 3]), None);
        assert_eq!(b.direction_of([0, 3, 3]).unwrap().name(), "LEFT");
        assert_eq!(b.direction_of([6, 0, 6]).unwrap().name(), "RIGHT_DOWN_FRONT");
        assert_eq!(b.cell_point([1, 1, 1]), [0.0, 0.0, 0.0]);
        let idx = b.linear_index(4, 5, 6);
        assert_eq!(b.cell_indices(idx), [4, 5, 6]);
        assert_eq!(b.element_node_index([1, 0, 0], [0, 0, 0]), b.linear_index(3, 1, 1));
        assert_eq!(b.element_at(1, 1, 1), 7);
    }

    #[test]
    fn same_level_remote_cells_follow_flag() {
        let mut b = block();
        let dir = Direction::new(1).unwrap();
        let cell = PaddingCell {
            index: 0,
            element: 0,
            source: CellSource::Node(0),
            relation: LevelRelation::Same,
            remote: true,
        };
        assert!(!b.fills(dir, &cell));
        b.set_direction_flag(dir, true);
        assert!(b.fills(dir, &cell));
        let coarse = PaddingCell {
            relation: LevelRelation::Coarser,
            ..cell.clone()
        };
        b.set_direction_flag(dir, false);
        assert!(b.fills(dir, &coarse));
    }
}
