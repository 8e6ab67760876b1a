//! The implicit representation of a candidate tile.

use crate::geometry::Plane3;
use nalgebra::{Point3, Vector3};

/// A `(cell, center, normal)` triple: the plane-fit parameters of one
/// `BuildPartition`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryModel {
    /// Index into the `Subdivision` this model's rail-penalty term is
    /// evaluated against. `-1` for a model not yet bound to a cell.
    pub cell: i32,
    pub center: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl Default for GeometryModel {
    fn default() -> Self {
        GeometryModel {
            cell: -1,
            center: Point3::origin(),
            normal: Vector3::z(),
        }
    }
}

impl GeometryModel {
    pub fn new(cell: i32, center: Point3<f64>, normal: Vector3<f64>) -> Self {
        GeometryModel { cell, center, normal }
    }

    pub fn plane(&self) -> Plane3 {
        Plane3::from_point_and_normal(self.center, self.normal)
    }
}
