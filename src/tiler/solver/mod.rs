//! Geometry-model fitting (C6).

mod rail_disk_solver;
mod subset_solver;
mod util;

pub use rail_disk_solver::{DepthRange, RailDiskSolver};
pub use subset_solver::SubsetGeometrySolver;

use crate::point_set::PointSet;
use crate::tiler::build_partition::BuildPartition;
use crate::tiler::geometry_model::GeometryModel;
use crate::tiler::subdivision::Subdivision;

/// Fits a `GeometryModel` to the points of a `BuildPartition`, and scores
/// how well an existing model explains a single point.
pub trait GeometrySolver {
    /// Rebuilds any acceleration structures keyed on `points.id()`.
    fn init(&mut self, points: &PointSet<'_>, subdivision: &dyn Subdivision);

    /// A cheap initial model for `partition`, built without a full
    /// non-linear solve (e.g. the weighted centroid and its best-fit
    /// normal).
    fn initialize_model(&self, points: &PointSet<'_>, partition: &BuildPartition) -> GeometryModel;

    /// Refines `partition`'s model in place via a non-linear least-squares
    /// fit over its points. `subdivision` supplies the owning cell's rails
    /// for the rail-penalty term.
    fn fit_model(&self, points: &PointSet<'_>, subdivision: &dyn Subdivision, partition: &mut BuildPartition);

    /// The per-point error of `point_index` against `model`.
    fn compute_error(&self, points: &PointSet<'_>, model: &GeometryModel, point_index: usize) -> f64;
}
