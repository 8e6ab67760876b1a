//! Resolves a set of `BuildPartition`s into `Tile`s (C8).

use crate::parallel;
use crate::tiler::build_partition::BuildPartition;
use crate::tiler::subdivision::Subdivision;
use crate::tiler::tile::Tile;
use crate::tiler::tile_resolver;

/// The output of a candidate tile generator: every partition that resolved
/// to a well-formed quad, each tile's own partition's total error (parallel
/// to `tiles`, not recomputed from the resolved geometry), and their sum.
#[derive(Debug, Clone, Default)]
pub struct CandidateTiles {
    pub tiles: Vec<Tile>,
    pub errors: Vec<f64>,
    pub total_error: f64,
}

impl CandidateTiles {
    fn push(&mut self, tile: Tile, error: f64) {
        self.tiles.push(tile);
        self.errors.push(error);
        self.total_error += error;
    }
}

fn resolve_one(subdivision: &dyn Subdivision, partition: &BuildPartition) -> Option<(Tile, f64)> {
    if partition.is_empty() {
        return None;
    }
    let cell = partition.model().cell;
    if cell < 0 {
        return None;
    }
    let rails = subdivision.rails(cell);
    let quad = tile_resolver::resolve(partition.model(), rails)?;
    Some((Tile::new(cell, quad), partition.total_error()))
}

/// Resolves every partition sequentially.
pub struct ExhaustiveCandidateTileGenerator;

impl ExhaustiveCandidateTileGenerator {
    pub fn generate(subdivision: &dyn Subdivision, partitions: &[BuildPartition]) -> CandidateTiles {
        let mut result = CandidateTiles::default();
        for partition in partitions {
            if let Some((tile, error)) = resolve_one(subdivision, partition) {
                result.push(tile, error);
            }
        }
        result
    }
}

/// Resolves every partition concurrently over a shared work-stealing
/// cursor, then compacts the per-partition results in their original
/// order.
pub struct ParallelCandidateTileGenerator;

impl ParallelCandidateTileGenerator {
    pub fn generate(
        thread_count: usize,
        subdivision: &dyn Subdivision,
        partitions: &[BuildPartition],
    ) -> CandidateTiles {
        let mut resolved: Vec<Option<(Tile, f64)>> = vec![None; partitions.len()];
        let ptr = parallel::DisjointWritePtr(resolved.as_mut_ptr());
        // SAFETY: each index `i` is visited by exactly one worker and
        // writes only to `resolved[i]`.
        parallel::balanced_parallel_for(thread_count, partitions.len(), |i| unsafe {
            *ptr.add(i) = resolve_one(subdivision, &partitions[i]);
        });

        let mut result = CandidateTiles::default();
        for (tile, error) in resolved.into_iter().flatten() {
            result.push(tile, error);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_set::PointSet;
    use crate::tiler::geometry_model::GeometryModel;
    use crate::tiler::subdivision::CubemapQuadtreeSubdivision;
    use nalgebra::Point3;

    fn sample_subdivision() -> CubemapQuadtreeSubdivision {
        let positions = vec![Point3::new(0.0, 0.0, 1.0); 4];
        let point_set = PointSet::new(1, &positions, &[], &[], &[]);
        let mut sub = CubemapQuadtreeSubdivision::new(1);
        sub.init(&point_set);
        sub
    }

    #[test]
    fn empty_partitions_resolve_to_no_tiles() {
        let sub = sample_subdivision();
        let result = ExhaustiveCandidateTileGenerator::generate(&sub, &[]);
        assert!(result.tiles.is_empty());
        assert_eq!(result.total_error, 0.0);
    }

    #[test]
    fn unbound_partition_is_skipped() {
        let sub = sample_subdivision();
        let mut partition = BuildPartition::new(GeometryModel::default());
        partition.add_point(0, 1.0);
        let result = ExhaustiveCandidateTileGenerator::generate(&sub, &[partition]);
        assert!(result.tiles.is_empty());
    }

    #[test]
    fn errors_are_tracked_per_tile_not_summed_into_every_entry() {
        let positions = vec![Point3::new(0.0, 0.0, 1.0); 4];
        let point_set = PointSet::new(1, &positions, &[], &[], &[]);
        let mut sub = CubemapQuadtreeSubdivision::new(2);
        sub.init(&point_set);

        let cell_a = sub.children(sub.roots()[5])[0];
        let cell_b = sub.children(sub.roots()[5])[1];
        let mut low_error = BuildPartition::new(GeometryModel::new(cell_a, Point3::new(0.0, 0.0, 1.0), nalgebra::Vector3::z()));
        low_error.add_point(0, 1.0);
        let mut high_error = BuildPartition::new(GeometryModel::new(cell_b, Point3::new(0.0, 0.0, 1.0), nalgebra::Vector3::z()));
        high_error.add_point(1, 9.0);

        let result = ExhaustiveCandidateTileGenerator::generate(&sub, &[low_error, high_error]);
        assert_eq!(result.errors, vec![1.0, 9.0]);
        assert_eq!(result.total_error, 10.0);
    }

    #[test]
    fn sequential_and_parallel_generators_agree() {
        let sub = sample_subdivision();
        let cell = sub.roots()[5]; // +Z face root
        let model = GeometryModel::new(cell, Point3::new(0.0, 0.0, 1.0), nalgebra::Vector3::z());
        let mut partition = BuildPartition::new(model);
        partition.add_point(0, 0.5);
        partition.add_point(1, 1.5);

        let sequential = ExhaustiveCandidateTileGenerator::generate(&sub, std::slice::from_ref(&partition));
        let parallel = ParallelCandidateTileGenerator::generate(2, &sub, std::slice::from_ref(&partition));
        assert_eq!(sequential.tiles.len(), parallel.tiles.len());
        assert_eq!(sequential.total_error, parallel.total_error);
    }
}
