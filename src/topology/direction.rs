//! The 26 neighbor directions of a block and the flag word indexed by them.
//!
//! Directions are numbered faces first (6), then edges (12), then corners (8),
//! which is also the order in which padding is filled.

use once_cell::sync::Lazy;
use static_assertions::const_assert;

use crate::mesh_error::MeshUnzipError;

pub const DIRECTION_COUNT: usize = 26;
const_assert!(DIRECTION_COUNT <= u32::BITS as usize);

const FACE_COUNT: usize = 6;
const EDGE_COUNT: usize = 12;

static OFFSETS: Lazy<[[i8; 3]; DIRECTION_COUNT]> = Lazy::new(|| {
    let mut table = [[0i8; 3]; DIRECTION_COUNT];
    let mut next = 0;
    for axis in 0..3 {
        for s in [-1i8, 1] {
            table[next][axis] = s;
            next += 1;
        }
    }
    for (a, b) in [(0, 1), (0, 2), (1, 2)] {
        for sb in [-1i8, 1] {
            for sa in [-1i8, 1] {
                table[next][a] = sa;
                table[next][b] = sb;
                next += 1;
            }
        }
    }
    for sz in [-1i8, 1] {
        for sy in [-1i8, 1] {
            for sx in [-1i8, 1] {
                table[next] = [sx, sy, sz];
                next += 1;
            }
        }
    }
    debug_assert_eq!(next, DIRECTION_COUNT);
    table
});

/// Face, edge or corner neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectionKind {
    Face,
    Edge,
    Corner,
}

/// One of the 26 neighbor directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Direction(u8);

impl Direction {
    pub fn new(index: u8) -> Result<Self, MeshUnzipError> {
        if usize::from(index) < DIRECTION_COUNT {
            Ok(Self(index))
        } else {
            Err(MeshUnzipError::InvalidDirection(index))
        }
    }

    /// All directions in fill order.
    pub fn all() -> impl Iterator<Item = Direction> {
        (0..DIRECTION_COUNT as u8).map(Direction)
    }

    /// The direction pointing along `offset`, each component in `-1..=1`.
    pub fn from_offset(offset: [i8; 3]) -> Option<Self> {
        OFFSETS
            .iter()
            .position(|o| *o == offset)
            .map(|i| Direction(i as u8))
    }

    #[inline]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    #[inline]
    pub fn offset(self) -> [i8; 3] {
        OFFSETS[self.index()]
    }

    #[inline]
    pub fn bit(self) -> u32 {
        1u32 << self.0
    }

    pub fn kind(self) -> DirectionKind {
        match self.index() {
            i if i < FACE_COUNT => DirectionKind::Face,
            i if i < FACE_COUNT + EDGE_COUNT => DirectionKind::Edge,
            _ => DirectionKind::Corner,
        }
    }

    /// Human-readable name such as `LEFT`, `RIGHT_UP` or `LEFT_DOWN_BACK`.
    pub fn name(self) -> String {
        const NAMES: [[&str; 2]; 3] = [["LEFT", "RIGHT"], ["DOWN", "UP"], ["BACK", "FRONT"]];
        self.offset()
            .iter()
            .enumerate()
            .filter(|(_, s)| **s != 0)
            .map(|(axis, s)| NAMES[axis][usize::from(*s > 0)])
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// 26-bit word with one bit per [`Direction`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DirectionFlags(u32);

impl DirectionFlags {
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & ((1u32 << DIRECTION_COUNT) - 1))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn contains(self, dir: Direction) -> bool {
        self.0 & dir.bit() != 0
    }

    pub fn set(&mut self, dir: Direction, on: bool) {
        if on {
            self.0 |= dir.bit();
        } else {
            self.0 &= !dir.bit();
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::all().filter(move |d| self.contains(*d))
    }
}
