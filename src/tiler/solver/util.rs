//! Shared helpers for the geometry solvers.

use crate::point_set::PointSet;
use nalgebra::{Point3, Vector3};

/// The weighted mean position of `point_indices`, weighting each point by
/// its `PointSet` weight divided by its distance from the origin. Points
/// closer to the headbox dominate the fit, since a tile's error there is
/// perceptually more significant than the same absolute error far away.
///
/// Returns `None` if `point_indices` is empty or every point sits at the
/// origin (where the inverse-depth weight is undefined).
pub fn compute_initial_center_point(points: &PointSet<'_>, point_indices: &[usize]) -> Option<Point3<f64>> {
    let positions = points.positions();
    let mut weighted_sum = Vector3::zeros();
    let mut weight_sum = 0.0;
    for &i in point_indices {
        let depth = positions[i].coords.norm();
        if depth <= 0.0 {
            continue;
        }
        let w = points.weight(i) / depth;
        weighted_sum += positions[i].coords * w;
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        None
    } else {
        Some(Point3::from(weighted_sum / weight_sum))
    }
}

/// The best-fit plane normal through `point_indices` about `center`, via
/// the smallest-eigenvalue eigenvector of the (3x3) weighted covariance
/// matrix.
pub fn compute_initial_normal(
    points: &PointSet<'_>,
    point_indices: &[usize],
    center: Point3<f64>,
) -> Vector3<f64> {
    let positions = points.positions();
    let mut covariance = nalgebra::Matrix3::zeros();
    let mut weight_sum = 0.0;
    for &i in point_indices {
        let d = positions[i] - center;
        let w = points.weight(i);
        covariance += d * d.transpose() * w;
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        return Vector3::z();
    }
    covariance /= weight_sum;

    let eigen = covariance.symmetric_eigen();
    let mut min_index = 0;
    for i in 1..3 {
        if eigen.eigenvalues[i] < eigen.eigenvalues[min_index] {
            min_index = i;
        }
    }
    let normal = eigen.eigenvectors.column(min_index).into_owned();
    if normal.norm() > 0.0 {
        normal.normalize()
    } else {
        Vector3::z()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_symmetric_points_is_their_mean_direction() {
        let positions = vec![
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(-1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
            Point3::new(0.0, -1.0, 1.0),
        ];
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let center = compute_initial_center_point(&points, &[0, 1, 2, 3]).unwrap();
        assert!((center.x).abs() < 1e-9);
        assert!((center.y).abs() < 1e-9);
        assert!((center.z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normal_of_planar_points_is_perpendicular_to_plane() {
        let positions = vec![
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(-1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
            Point3::new(0.0, -1.0, 1.0),
        ];
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let normal = compute_initial_normal(&points, &[0, 1, 2, 3], Point3::new(0.0, 0.0, 1.0));
        assert!(normal.x.abs() < 1e-9);
        assert!(normal.y.abs() < 1e-9);
        assert!(normal.z.abs() > 0.99);
    }

    #[test]
    fn empty_indices_yield_no_center() {
        let positions: Vec<Point3<f64>> = Vec::new();
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        assert!(compute_initial_center_point(&points, &[]).is_none());
    }
}
