//! Resolves a `GeometryModel` and its cell's rails into a `Tile`'s quad.

use crate::geometry::Quad3;
use crate::tiler::geometry_model::GeometryModel;
use nalgebra::{Point3, Vector3};

/// Intersects each of a cell's four rails with a `GeometryModel`'s plane,
/// producing the quad's four corners. Returns `None` if any rail is
/// parallel to the plane or intersects it behind the origin — a
/// numerical-failure case recovered by the caller (e.g. `SelectionTiler`
/// simply excludes the tile), never surfaced as an error.
pub fn resolve(model: &GeometryModel, rails: [Vector3<f64>; 4]) -> Option<Quad3> {
    let plane = model.plane();
    let mut quad = [Point3::origin(); 4];
    for (i, rail) in rails.iter().enumerate() {
        let t = plane.intersect_ray(Point3::origin(), *rail)?;
        let corner = Point3::origin() + rail * t;
        if !corner.coords.iter().all(|c| c.is_finite()) {
            return None;
        }
        quad[i] = corner;
    }
    Some(quad)
}
