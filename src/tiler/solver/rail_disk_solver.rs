//! The default `GeometrySolver`: a disk (or, with `tangential_factor = 0`,
//! a plane) fit by damped non-linear least squares.

use super::util::{compute_initial_center_point, compute_initial_normal};
use crate::geometry::Plane3;
use crate::point_set::PointSet;
use crate::tiler::build_partition::BuildPartition;
use crate::tiler::geometry_model::GeometryModel;
use crate::tiler::solver::GeometrySolver;
use crate::tiler::subdivision::Subdivision;
use nalgebra::{DMatrix, DVector, Point3, Vector3};

/// Caps the iterative solve's cost; callers needing fewer samples should
/// wrap this in a [`super::SubsetGeometrySolver`].
const MAX_ITERATIONS: usize = 25;

/// The range of ray depths, measured along a `Subdivision` cell's rails, in
/// which a fitted plane is not penalized. Outside of it, [`RailDiskSolver`]
/// adds a one-sided penalty pulling the fit back into range.
///
/// `kMinDepthFactor = 0.01`, `kMaxDepthFactor = sqrt(3)`, from
/// `tiler.cc`'s `TilerFactory`: the near bound keeps planes from crossing
/// behind the headbox, the far bound keeps them in front of the skybox.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub min_depth: f64,
    pub max_depth: f64,
}

impl DepthRange {
    pub fn new(min_depth: f64, max_depth: f64) -> Self {
        DepthRange { min_depth, max_depth }
    }

    pub fn from_headbox_and_skybox(headbox_radius: f64, skybox_radius: f64) -> Self {
        DepthRange {
            min_depth: 0.01 * headbox_radius,
            max_depth: 3.0_f64.sqrt() * skybox_radius,
        }
    }
}

/// Fits a `GeometryModel` (a center point and a normal direction) to a
/// partition's points by minimizing, over 6 raw parameters (a center and an
/// unnormalized normal), a sum of three residual groups:
///
/// - one plane-projection residual per point: `(center.n / point.n - 1) *
///   sqrt(weight)`, the ratio between the plane's ray-depth at the point's
///   direction and the point's own depth, ported from
///   `plane_projection_cost_function.cc`;
/// - one tangential residual per point, scaled by `tangential_factor`, that
///   pulls the plane's center toward the centroid of the points' planar
///   footprint (a graduated non-convexity term: large early in a
///   `Sequential` pipeline to avoid degenerate disks, `0.0` for the final
///   refinement pass so the last fit is a pure plane);
/// - two rail-penalty residuals per corner of the owning `Subdivision`
///   cell's four rails, penalizing a plane whose ray-depth along that rail
///   falls outside `depth_range`, ported from `rail_penalty_cost_function.cc`.
pub struct RailDiskSolver {
    tangential_factor: f64,
    depth_range: DepthRange,
}

/// `residuals()`'s fixed layout: `2 * point_count` point residuals followed
/// by 2 residuals per rail (4 rails).
const RAIL_RESIDUAL_COUNT: usize = 8;

impl RailDiskSolver {
    pub fn new(tangential_factor: f64, depth_range: DepthRange) -> Self {
        RailDiskSolver { tangential_factor, depth_range }
    }

    /// Evaluates all residuals and, for the two residual groups this crate
    /// has exact closed-form derivatives for (the projection and
    /// rail-penalty groups), their analytic Jacobian columns. The
    /// tangential group's Jacobian entries are left at `0.0`; the caller
    /// fills them in by central difference, since no retrieved source
    /// gives a closed form for that term.
    fn residuals_and_partial_jacobian(
        &self,
        points: &PointSet<'_>,
        point_indices: &[usize],
        rails: [Vector3<f64>; 4],
        params: &DVector<f64>,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let n = point_indices.len();
        let cx = params[0];
        let cy = params[1];
        let cz = params[2];
        let center = Point3::new(cx, cy, cz);
        // The projection residual is scale-invariant in the normal, so it
        // is evaluated (and differentiated) against the raw, unnormalized
        // parameters directly, exactly as `plane_projection_cost_function.cc`
        // does with its own undifferentiated parameter block.
        let raw_normal = Vector3::new(params[3], params[4], params[5]);
        let unit_normal = {
            let norm = raw_normal.norm();
            if norm > 1e-12 {
                raw_normal / norm
            } else {
                Vector3::z()
            }
        };
        let plane = Plane3::from_point_and_normal(center, unit_normal);
        let positions = points.positions();

        let residual_count = n * 2 + RAIL_RESIDUAL_COUNT;
        let mut out = DVector::zeros(residual_count);
        let mut jacobian = DMatrix::zeros(residual_count, 6);

        for (k, &i) in point_indices.iter().enumerate() {
            let p = positions[i];
            let weight = points.weight(i).sqrt();
            let px = p.x;
            let py = p.y;
            let pz = p.z;
            let (nx, ny, nz) = (raw_normal.x, raw_normal.y, raw_normal.z);
            let p_dot_n = px * nx + py * ny + pz * nz;
            let p_dot_n_2 = p_dot_n * p_dot_n;

            out[k] = ((cx * nx + cy * ny + cz * nz) / p_dot_n - 1.0) * weight;

            // d/dn, generated the same way the source's comment credits
            // ("via mathematica"), then d/dc; both scaled by `weight`.
            jacobian[(k, 3)] = weight * (-(cy * ny * px) - cz * nz * px + cx * ny * py + cx * nz * pz) / p_dot_n_2;
            jacobian[(k, 4)] = weight * (-((cx * nx + cz * nz) * py) + cy * (nx * px + nz * pz)) / p_dot_n_2;
            jacobian[(k, 5)] = weight * (cz * (nx * px + ny * py) - (cx * nx + cy * ny) * pz) / p_dot_n_2;
            jacobian[(k, 0)] = weight * nx / p_dot_n;
            jacobian[(k, 1)] = weight * ny / p_dot_n;
            jacobian[(k, 2)] = weight * nz / p_dot_n;

            let signed_distance = plane.signed_distance_to_point(p);
            let projected = p - unit_normal * signed_distance;
            // Folds in the `2.0` `ScaledLoss` factor `rail_disk_solver.cc`
            // applies around the tangential term, both here and in
            // `compute_error`, so the two stay consistent.
            out[n + k] = 2.0_f64.sqrt() * self.tangential_factor * (projected - center).norm();
        }

        let c_dot_n = center.coords.dot(&unit_normal);
        let rail_scale = (n as f64).sqrt();
        for (j, rail) in rails.iter().enumerate() {
            let low_row = n * 2 + j * 2;
            let high_row = low_row + 1;
            let r_dot_n = rail.dot(&unit_normal);
            // An unbound model (cell == -1) reports an all-zero rail set;
            // a near-grazing rail leaves the ray depth undefined. Neither
            // is a point the rail-penalty term can constrain.
            if rail.norm_squared() < 1e-20 || r_dot_n.abs() < 1e-9 {
                continue;
            }
            let depth = c_dot_n / r_dot_n;

            if depth < self.depth_range.min_depth {
                out[low_row] = rail_scale * (self.depth_range.min_depth - depth);
                let d_n = (c_dot_n / (r_dot_n * r_dot_n)) * *rail - center.coords / r_dot_n;
                let d_c = -unit_normal / r_dot_n;
                jacobian[(low_row, 3)] = rail_scale * d_n.x;
                jacobian[(low_row, 4)] = rail_scale * d_n.y;
                jacobian[(low_row, 5)] = rail_scale * d_n.z;
                jacobian[(low_row, 0)] = rail_scale * d_c.x;
                jacobian[(low_row, 1)] = rail_scale * d_c.y;
                jacobian[(low_row, 2)] = rail_scale * d_c.z;
            }

            if depth > self.depth_range.max_depth {
                out[high_row] = rail_scale * (depth - self.depth_range.max_depth);
                let d_n = -(c_dot_n / (r_dot_n * r_dot_n)) * *rail + center.coords / r_dot_n;
                let d_c = unit_normal / r_dot_n;
                jacobian[(high_row, 3)] = rail_scale * d_n.x;
                jacobian[(high_row, 4)] = rail_scale * d_n.y;
                jacobian[(high_row, 5)] = rail_scale * d_n.z;
                jacobian[(high_row, 0)] = rail_scale * d_c.x;
                jacobian[(high_row, 1)] = rail_scale * d_c.y;
                jacobian[(high_row, 2)] = rail_scale * d_c.z;
            }
        }

        (out, jacobian)
    }

    fn residuals(&self, points: &PointSet<'_>, point_indices: &[usize], rails: [Vector3<f64>; 4], params: &DVector<f64>) -> DVector<f64> {
        self.residuals_and_partial_jacobian(points, point_indices, rails, params).0
    }

    /// Fills in the tangential block's Jacobian rows (`[n, 2n)`) by central
    /// difference, since no retrieved source gives this term's closed form.
    fn jacobian(&self, points: &PointSet<'_>, point_indices: &[usize], rails: [Vector3<f64>; 4], params: &DVector<f64>) -> (DVector<f64>, DMatrix<f64>) {
        let (residuals, mut jacobian) = self.residuals_and_partial_jacobian(points, point_indices, rails, params);
        let n = point_indices.len();
        if self.tangential_factor == 0.0 || n == 0 {
            return (residuals, jacobian);
        }

        let h = 1e-6;
        for col in 0..6 {
            let mut perturbed = params.clone();
            perturbed[col] += h;
            let r_plus = self.residuals(points, point_indices, rails, &perturbed);
            perturbed[col] -= 2.0 * h;
            let r_minus = self.residuals(points, point_indices, rails, &perturbed);
            for row in n..(2 * n) {
                jacobian[(row, col)] = (r_plus[row] - r_minus[row]) / (2.0 * h);
            }
        }
        (residuals, jacobian)
    }

    fn solve(&self, points: &PointSet<'_>, point_indices: &[usize], rails: [Vector3<f64>; 4], initial: DVector<f64>) -> DVector<f64> {
        levenberg_marquardt_minimize(initial, |params| self.jacobian(points, point_indices, rails, params))
    }
}

impl GeometrySolver for RailDiskSolver {
    fn init(&mut self, _points: &PointSet<'_>, _subdivision: &dyn Subdivision) {}

    fn initialize_model(&self, points: &PointSet<'_>, partition: &BuildPartition) -> GeometryModel {
        let indices = partition.point_indices();
        let center = compute_initial_center_point(points, indices).unwrap_or(Point3::origin());
        let normal = compute_initial_normal(points, indices, center);
        GeometryModel::new(partition.model().cell, center, normal)
    }

    fn fit_model(&self, points: &PointSet<'_>, subdivision: &dyn Subdivision, partition: &mut BuildPartition) {
        if partition.is_empty() {
            return;
        }
        let model = *partition.model();
        let rails = if model.cell >= 0 { subdivision.rails(model.cell) } else { [Vector3::zeros(); 4] };
        let initial = DVector::from_row_slice(&[
            model.center.x,
            model.center.y,
            model.center.z,
            model.normal.x,
            model.normal.y,
            model.normal.z,
        ]);
        let solved = self.solve(points, partition.point_indices(), rails, initial);
        let center = Point3::new(solved[0], solved[1], solved[2]);
        let raw_normal = Vector3::new(solved[3], solved[4], solved[5]);
        let normal = if raw_normal.norm() > 1e-12 { raw_normal.normalize() } else { model.normal };
        partition.set_model(GeometryModel::new(model.cell, center, normal));
    }

    /// `projection_residual^2 + 2 * tangential_factor^2 * tangential_residual^2`,
    /// ported from `RailDiskSolver::ComputeError` — the rail-penalty term is
    /// deliberately absent, since it is not a function of individual points.
    fn compute_error(&self, points: &PointSet<'_>, model: &GeometryModel, point_index: usize) -> f64 {
        let p = points.positions()[point_index];
        let weight = points.weight(point_index).sqrt();
        let center_dot_n = model.center.coords.dot(&model.normal);
        let point_dot_n = p.coords.dot(&model.normal);
        let projection_residual = (center_dot_n / point_dot_n - 1.0) * weight;
        let mut total = projection_residual * projection_residual;

        if self.tangential_factor != 0.0 {
            let signed_distance = model.plane().signed_distance_to_point(p);
            let projected = p - model.normal * signed_distance;
            let tangential_residual = (projected - model.center).norm();
            total += 2.0 * self.tangential_factor * self.tangential_factor * tangential_residual * tangential_residual;
        }
        total
    }
}

/// A small damped Gauss-Newton (Levenberg-Marquardt) minimizer over a
/// fixed, low-dimensional parameter vector. `jacobian_fn` returns both the
/// residual vector and its Jacobian for a given parameter vector.
fn levenberg_marquardt_minimize(mut params: DVector<f64>, jacobian_fn: impl Fn(&DVector<f64>) -> (DVector<f64>, DMatrix<f64>)) -> DVector<f64> {
    let n = params.len();
    let mut lambda = 1e-3;
    let mut cost = jacobian_fn(&params).0.norm_squared();

    for _ in 0..MAX_ITERATIONS {
        let (residuals, jacobian) = jacobian_fn(&params);

        let jt = jacobian.transpose();
        let jtj = &jt * &jacobian;
        let jtr = &jt * &residuals;

        let mut accepted = false;
        for _ in 0..10 {
            let mut damped = jtj.clone();
            for i in 0..n {
                damped[(i, i)] += lambda * damped[(i, i)].max(1e-12);
            }
            let step = match damped.clone().lu().solve(&(-&jtr)) {
                Some(s) => s,
                None => break,
            };
            let candidate = &params + &step;
            let candidate_cost = jacobian_fn(&candidate).0.norm_squared();
            if candidate_cost < cost {
                params = candidate;
                cost = candidate_cost;
                lambda = (lambda * 0.5).max(1e-12);
                accepted = true;
                break;
            } else {
                lambda *= 2.0;
            }
        }
        if !accepted {
            break;
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiler::geometry_model::GeometryModel;
    use crate::tiler::subdivision::CubemapQuadtreeSubdivision;

    fn wide_depth_range() -> DepthRange {
        DepthRange::new(0.0, 1e6)
    }

    #[test]
    fn fits_exact_plane_through_coplanar_points() {
        let positions = vec![
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(-1.0, 0.0, 2.0),
            Point3::new(0.0, 1.0, 2.0),
            Point3::new(0.0, -1.0, 2.0),
        ];
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let solver = RailDiskSolver::new(0.0, wide_depth_range());
        let subdivision = CubemapQuadtreeSubdivision::new(1);
        let mut partition = BuildPartition::new(GeometryModel::new(
            -1,
            Point3::new(0.1, 0.1, 1.5),
            Vector3::new(0.1, 0.2, 0.9),
        ));
        for i in 0..positions.len() {
            partition.add_point(i, 0.0);
        }
        solver.fit_model(&points, &subdivision, &mut partition);

        for &i in partition.point_indices() {
            let err = solver.compute_error(&points, partition.model(), i);
            assert!(err < 1e-4, "residual error too large: {err}");
        }
    }

    #[test]
    fn empty_partition_fit_is_a_no_op() {
        let positions: Vec<Point3<f64>> = Vec::new();
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let solver = RailDiskSolver::new(0.01, wide_depth_range());
        let subdivision = CubemapQuadtreeSubdivision::new(1);
        let model = GeometryModel::new(0, Point3::new(1.0, 2.0, 3.0), Vector3::z());
        let mut partition = BuildPartition::new(model);
        solver.fit_model(&points, &subdivision, &mut partition);
        assert_eq!(*partition.model(), model);
    }

    #[test]
    fn compute_error_squares_the_projection_residual() {
        let positions = vec![Point3::new(0.0, 0.0, 1.0)];
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let solver = RailDiskSolver::new(0.0, wide_depth_range());
        // center.n / p.n - 1 == 2.0/1.0 - 1 == 1.0, so the squared residual is 1.0.
        let model = GeometryModel::new(-1, Point3::new(0.0, 0.0, 2.0), Vector3::z());
        let err = solver.compute_error(&points, &model, 0);
        assert!((err - 1.0).abs() < 1e-9, "expected 1.0, got {err}");
    }

    #[test]
    fn compute_error_adds_a_tangential_term_when_factor_is_nonzero() {
        let positions = vec![Point3::new(1.0, 0.0, 1.0)];
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let model = GeometryModel::new(-1, Point3::new(0.0, 0.0, 1.0), Vector3::z());

        let plane_only = RailDiskSolver::new(0.0, wide_depth_range());
        let with_tangential = RailDiskSolver::new(0.5, wide_depth_range());
        let err_plane = plane_only.compute_error(&points, &model, 0);
        let err_tangential = with_tangential.compute_error(&points, &model, 0);
        assert!(err_tangential > err_plane);
    }

    #[test]
    fn rail_penalty_pulls_the_fit_toward_the_depth_band() {
        // A single rail straight down +z; a depth band far closer than the
        // point itself should win the tug-of-war and drag the fit inward.
        let positions = vec![Point3::new(0.1, 0.0, 10.0); 6];
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let solver = RailDiskSolver::new(0.0, DepthRange::new(0.5, 1.0));
        let mut subdivision = CubemapQuadtreeSubdivision::new(1);
        subdivision.init(&points);
        let cell = subdivision.find_leaf(Vector3::z());
        let mut partition = BuildPartition::new(GeometryModel::new(cell, Point3::new(0.0, 0.0, 10.0), Vector3::z()));
        for i in 0..positions.len() {
            partition.add_point(i, 0.0);
        }
        solver.fit_model(&points, &subdivision, &mut partition);
        assert!(partition.model().center.z < 10.0);
    }
}
