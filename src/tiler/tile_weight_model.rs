//! Scores resolved tiles for the downstream `SelectionSolver` (C9).

use crate::geometry::{BilinearInterpolator, Raytracer};
use crate::tiler::tile::Tile;
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

/// Assigns every `Tile` a scalar weight the `SelectionSolver` trades off
/// against that tile's fitting error.
pub trait TileWeightModel {
    fn weight(&self, tile: &Tile) -> f64;
}

/// Every tile costs exactly two triangles (it resolves to one quad).
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleCountTileWeightModel;

impl TileWeightModel for TriangleCountTileWeightModel {
    fn weight(&self, _tile: &Tile) -> f64 {
        2.0
    }
}

/// The solid angle a tile's quad subtends as seen from the origin,
/// approximated by Girard's theorem over the quad's two triangles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectedAreaTileWeightModel;

impl ProjectedAreaTileWeightModel {
    fn spherical_triangle_area(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> f64 {
        let angle_a = (b.cross(&a)).angle(&(c.cross(&a)));
        let angle_b = (a.cross(&b)).angle(&(c.cross(&b)));
        let angle_c = (a.cross(&c)).angle(&(b.cross(&c)));
        (angle_a + angle_b + angle_c - std::f64::consts::PI).max(0.0)
    }
}

impl TileWeightModel for ProjectedAreaTileWeightModel {
    fn weight(&self, tile: &Tile) -> f64 {
        let dirs: Vec<Vector3<f64>> = tile
            .quad
            .iter()
            .map(|p| {
                if p.coords.norm() > 0.0 {
                    p.coords.normalize()
                } else {
                    Vector3::z()
                }
            })
            .collect();
        Self::spherical_triangle_area(dirs[0], dirs[1], dirs[2])
            + Self::spherical_triangle_area(dirs[0], dirs[2], dirs[3])
    }
}

/// A weighted sum of other tile weight models, combining (for instance)
/// triangle count and projected area into a single scalar cost.
pub struct CombinedTileWeightModel {
    terms: Vec<(Box<dyn TileWeightModel + Send + Sync>, f64)>,
}

impl CombinedTileWeightModel {
    pub fn new(terms: Vec<(Box<dyn TileWeightModel + Send + Sync>, f64)>) -> Self {
        CombinedTileWeightModel { terms }
    }
}

impl TileWeightModel for CombinedTileWeightModel {
    fn weight(&self, tile: &Tile) -> f64 {
        self.terms.iter().map(|(model, factor)| factor * model.weight(tile)).sum()
    }
}

/// Estimates how many other tiles a tile's worst-case viewer overdraws,
/// by building a combined `Raytracer` over every tile's triangles and, for
/// a sample of sub-patches per tile, casting a ray from the sample toward
/// the worst-case eye position within the headbox and counting any other
/// tiles it crosses first.
pub struct DirectionalOverdrawTileWeightModel {
    weights: HashMap<i32, f64>,
}

const SUBDIVISIONS_PER_REVOLUTION: usize = 100;

impl DirectionalOverdrawTileWeightModel {
    pub fn build(tiles: &[Tile], samples: usize, field_of_view_radians: f64, headbox_radius: f64) -> Self {
        let samples = samples.max(1);

        let mut vertices = Vec::with_capacity(tiles.len() * 4);
        let mut indices = Vec::with_capacity(tiles.len() * 2);
        let mut triangle_tile = Vec::with_capacity(tiles.len() * 2);
        for tile in tiles {
            let base = vertices.len() as u32;
            vertices.extend_from_slice(&tile.quad);
            indices.push([base, base + 1, base + 2]);
            indices.push([base, base + 2, base + 3]);
            triangle_tile.push(tile.cell);
            triangle_tile.push(tile.cell);
        }
        let raytracer = Raytracer::new(vertices, indices);

        // A patch this many radians wide should receive one sample, so a
        // tile spanning the whole field of view gets `subdivisions` per
        // side.
        let subdivisions_per_side = ((field_of_view_radians / (2.0 * std::f64::consts::PI)
            * SUBDIVISIONS_PER_REVOLUTION as f64)
            .round() as usize)
            .clamp(1, 16);

        let mut weights = HashMap::with_capacity(tiles.len());
        for tile in tiles {
            let interpolator = BilinearInterpolator::new(tile.quad);
            let patches = interpolator.sub_patches(subdivisions_per_side, subdivisions_per_side);
            let normal = {
                let e0 = tile.quad[1] - tile.quad[0];
                let e1 = tile.quad[3] - tile.quad[0];
                let n = e0.cross(&e1);
                if n.norm() > 0.0 {
                    n.normalize()
                } else {
                    Vector3::z()
                }
            };

            let mut overdraw = 0.0;
            let sample_count = samples.min(patches.len()).max(1);
            for i in 0..sample_count {
                let patch = &patches[i * patches.len() / sample_count];
                let center = Point3::from(
                    (patch[0].coords + patch[1].coords + patch[2].coords + patch[3].coords) / 4.0,
                );
                let eye = crate::geometry::sphere::closest_point_in_sphere(center, -normal, headbox_radius);
                let direction = center - eye;
                if direction.norm_squared() == 0.0 {
                    continue;
                }
                let hits = raytracer.find_all_intersections(eye, direction.normalize());
                let others = hits
                    .iter()
                    .filter(|&&(_, tri)| triangle_tile[tri] != tile.cell)
                    .count();
                overdraw += others as f64;
            }
            weights.insert(tile.cell, overdraw / sample_count as f64);
        }

        DirectionalOverdrawTileWeightModel { weights }
    }
}

impl TileWeightModel for DirectionalOverdrawTileWeightModel {
    fn weight(&self, tile: &Tile) -> f64 {
        *self.weights.get(&tile.cell).unwrap_or(&0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tile(cell: i32, z: f64) -> Tile {
        Tile::new(
            cell,
            [
                Point3::new(-0.1, -0.1, z),
                Point3::new(0.1, -0.1, z),
                Point3::new(0.1, 0.1, z),
                Point3::new(-0.1, 0.1, z),
            ],
        )
    }

    #[test]
    fn triangle_count_is_constant() {
        let model = TriangleCountTileWeightModel;
        assert_eq!(model.weight(&sample_tile(0, 1.0)), 2.0);
    }

    #[test]
    fn projected_area_is_positive_and_finite() {
        let model = ProjectedAreaTileWeightModel;
        let w = model.weight(&sample_tile(0, 1.0));
        assert!(w > 0.0 && w.is_finite());
    }

    #[test]
    fn combined_model_sums_weighted_terms() {
        let model = CombinedTileWeightModel::new(vec![
            (Box::new(TriangleCountTileWeightModel), 1.0),
            (Box::new(TriangleCountTileWeightModel), 2.0),
        ]);
        assert_eq!(model.weight(&sample_tile(0, 1.0)), 6.0);
    }

    #[test]
    fn isolated_tile_has_zero_overdraw() {
        let tiles = vec![sample_tile(0, 1.0)];
        let model = DirectionalOverdrawTileWeightModel::build(&tiles, 4, std::f64::consts::PI / 2.0, 0.1);
        assert_eq!(model.weight(&tiles[0]), 0.0);
    }

    #[test]
    fn occluding_tile_raises_overdraw() {
        let tiles = vec![sample_tile(0, 1.0), sample_tile(1, 2.0)];
        let model = DirectionalOverdrawTileWeightModel::build(&tiles, 4, std::f64::consts::PI / 2.0, 0.1);
        assert!(model.weight(&tiles[0]) > 0.0 || model.weight(&tiles[1]) > 0.0);
    }
}
