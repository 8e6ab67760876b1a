//! Wraps a `GeometrySolver`, capping the number of points an expensive
//! iterative fit sees.

use crate::point_set::PointSet;
use crate::tiler::build_partition::BuildPartition;
use crate::tiler::geometry_model::GeometryModel;
use crate::tiler::solver::GeometrySolver;
use crate::tiler::subdivision::Subdivision;

/// Delegates every `GeometrySolver` operation to `inner`, except that
/// `fit_model` first strides a partition's point indices down to at most
/// `max_points` before delegating, so the iterative solve's cost is
/// bounded independent of partition size.
pub struct SubsetGeometrySolver<S> {
    max_points: usize,
    inner: S,
}

impl<S: GeometrySolver> SubsetGeometrySolver<S> {
    pub fn new(max_points: usize, inner: S) -> Self {
        assert!(max_points > 0, "max_points must be positive");
        SubsetGeometrySolver { max_points, inner }
    }
}

impl<S: GeometrySolver> GeometrySolver for SubsetGeometrySolver<S> {
    fn init(&mut self, points: &PointSet<'_>, subdivision: &dyn Subdivision) {
        self.inner.init(points, subdivision);
    }

    fn initialize_model(&self, points: &PointSet<'_>, partition: &BuildPartition) -> GeometryModel {
        self.inner.initialize_model(points, partition)
    }

    fn fit_model(&self, points: &PointSet<'_>, subdivision: &dyn Subdivision, partition: &mut BuildPartition) {
        let full_len = partition.point_indices().len();
        if full_len <= self.max_points {
            self.inner.fit_model(points, subdivision, partition);
            return;
        }

        let stride = full_len / self.max_points;
        let full_indices = partition.point_indices().to_vec();
        let model = *partition.model();
        let mut subset = BuildPartition::new(model);
        for (k, &i) in full_indices.iter().enumerate() {
            if k % stride == 0 {
                subset.add_point(i, 0.0);
            }
        }
        self.inner.fit_model(points, subdivision, &mut subset);
        partition.set_model(*subset.model());
    }

    fn compute_error(&self, points: &PointSet<'_>, model: &GeometryModel, point_index: usize) -> f64 {
        self.inner.compute_error(points, model, point_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiler::solver::{DepthRange, RailDiskSolver};
    use crate::tiler::subdivision::CubemapQuadtreeSubdivision;
    use nalgebra::{Point3, Vector3};

    fn wide_depth_range() -> DepthRange {
        DepthRange::new(0.0, 1e6)
    }

    #[test]
    fn fit_under_cap_delegates_all_points() {
        let positions = vec![
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(-1.0, 0.0, 2.0),
            Point3::new(0.0, 1.0, 2.0),
        ];
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let subdivision = CubemapQuadtreeSubdivision::new(1);
        let solver = SubsetGeometrySolver::new(250, RailDiskSolver::new(0.0, wide_depth_range()));
        let mut partition =
            BuildPartition::new(GeometryModel::new(-1, Point3::new(0.0, 0.0, 1.5), Vector3::z()));
        for i in 0..positions.len() {
            partition.add_point(i, 0.0);
        }
        solver.fit_model(&points, &subdivision, &mut partition);
        assert!(partition.model().center.z > 0.0);
    }

    #[test]
    fn fit_over_cap_strides_down_to_cap() {
        let positions: Vec<Point3<f64>> = (0..1000)
            .map(|i| Point3::new((i as f64).cos(), (i as f64).sin(), 2.0))
            .collect();
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let subdivision = CubemapQuadtreeSubdivision::new(1);
        let solver = SubsetGeometrySolver::new(100, RailDiskSolver::new(0.0, wide_depth_range()));
        let mut partition =
            BuildPartition::new(GeometryModel::new(-1, Point3::new(0.0, 0.0, 1.5), Vector3::z()));
        for i in 0..positions.len() {
            partition.add_point(i, 0.0);
        }
        // Should not panic and should still produce a plausible plane near z=2.
        solver.fit_model(&points, &subdivision, &mut partition);
        assert!((partition.model().center.z - 2.0).abs() < 0.5);
    }
}
