//! The input to a tiling run: a borrowed, unowning bundle of parallel arrays.

use nalgebra::{Point3, Vector3};

/// A stable identifier for a `PointSet`, used to skip rebuilding
/// acceleration structures (the `Subdivision`, the k-d tree a
/// `GreedyPointAssignment` stage builds) when the same points are reused
/// across calls.
pub type PointSetId = i64;

/// Marks an id as "no cached structure is valid for this".
pub const INVALID_POINT_SET_ID: PointSetId = -1;

/// An unowning structure of parallel arrays describing a point cloud.
///
/// `normals`, `colors` and `weights` are optional: each is either empty or
/// exactly as long as `positions`. `weights`, when present, scale the
/// geometric error contributed by the corresponding point; points with no
/// weights behave as if every weight were `1.0`.
#[derive(Debug, Clone, Copy)]
pub struct PointSet<'a> {
    id: PointSetId,
    positions: &'a [Point3<f64>],
    normals: &'a [Vector3<f64>],
    colors: &'a [[f32; 3]],
    weights: &'a [f64],
}

impl<'a> PointSet<'a> {
    /// Builds a `PointSet`. Panics if `normals`, `colors` or `weights` are
    /// non-empty and do not match `positions` in length; this invariant is
    /// re-checked by [`crate::Parameters::validate`]-driven callers via
    /// [`PointSet::check_spans`] before a run starts, so construction itself
    /// stays a cheap, infallible bundling of slices (mirroring how the
    /// teacher's geometric algorithms trust their inputs).
    pub fn new(
        id: PointSetId,
        positions: &'a [Point3<f64>],
        normals: &'a [Vector3<f64>],
        colors: &'a [[f32; 3]],
        weights: &'a [f64],
    ) -> Self {
        PointSet {
            id,
            positions,
            normals,
            colors,
            weights,
        }
    }

    pub fn id(&self) -> PointSetId {
        self.id
    }

    pub fn positions(&self) -> &'a [Point3<f64>] {
        self.positions
    }

    pub fn normals(&self) -> &'a [Vector3<f64>] {
        self.normals
    }

    pub fn colors(&self) -> &'a [[f32; 3]] {
        self.colors
    }

    pub fn weights(&self) -> &'a [f64] {
        self.weights
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The per-point weight, defaulting to `1.0` when `weights` is empty.
    pub fn weight(&self, point_index: usize) -> f64 {
        if self.weights.is_empty() {
            1.0
        } else {
            self.weights[point_index]
        }
    }

    /// Validates the data-model invariant: every non-empty span matches
    /// `positions` in length.
    pub fn check_spans(&self) -> crate::error::Result<()> {
        let positions_len = self.positions.len();
        for (field, len) in [
            ("normals", self.normals.len()),
            ("colors", self.colors.len()),
            ("weights", self.weights.len()),
        ] {
            if len != 0 && len != positions_len {
                return Err(crate::error::Error::MismatchedSpanLengths {
                    positions_len,
                    field,
                    field_len: len,
                });
            }
        }
        Ok(())
    }
}
