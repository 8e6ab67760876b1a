//! The tiler's output: a textured planar quad bound to a subdivision cell.

use crate::geometry::Quad3;

/// One candidate or final tile: the subdivision cell it was resolved from,
/// and the quad covering that cell's rails on the tile's plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub cell: i32,
    pub quad: Quad3,
}

impl Tile {
    pub fn new(cell: i32, quad: Quad3) -> Self {
        Tile { cell, quad }
    }
}
