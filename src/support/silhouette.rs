//! A nearest-neighbor classifier over sampled view directions, giving a
//! renderer an implicit silhouette to clip against (C11 support).

use crate::geometry::KdTree;
use nalgebra::Vector3;

/// A sparse sample of directions, each labeled solid (geometry present) or
/// empty, queried by nearest neighbor.
///
/// Ties (more than one sample direction equidistant from the query) break
/// in favor of solid: an empty classification that should have been solid
/// leaves a hole, which is far more visible than a solid classification
/// that should have been empty, which only costs a little overdraw. This
/// bias is intentional and is not "fixed" by picking an arbitrary winner.
pub struct ImplicitSilhouette {
    directions: Vec<[f64; 3]>,
    solid: Vec<bool>,
}

impl ImplicitSilhouette {
    pub fn new(directions: Vec<Vector3<f64>>, solid: Vec<bool>) -> Self {
        assert_eq!(directions.len(), solid.len());
        ImplicitSilhouette {
            directions: directions.iter().map(|d| [d.x, d.y, d.z]).collect(),
            solid,
        }
    }

    /// Whether `direction` classifies as solid: the label of its nearest
    /// sampled direction, or of any sample tied for nearest if at least
    /// one of them is solid.
    pub fn is_solid_at_point(&self, direction: Vector3<f64>) -> bool {
        if self.directions.is_empty() {
            return false;
        }
        let tree = KdTree::<3>::new(&self.directions);
        let query = [direction.x, direction.y, direction.z];
        let nearest = tree.nn_search(&query).expect("non-empty directions");
        let nearest_distance2 = Self::squared_distance(&self.directions[nearest], &query);

        let tied = tree.radius_search(&query, nearest_distance2 + 1e-12, false);
        tied.iter().any(|&i| self.solid[i])
    }

    fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
        (0..3).map(|d| (a[d] - b[d]).powi(2)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unambiguous_nearest_sample_wins() {
        let directions = vec![Vector3::x(), Vector3::y(), -Vector3::x()];
        let solid = vec![true, false, false];
        let silhouette = ImplicitSilhouette::new(directions, solid);
        assert!(silhouette.is_solid_at_point(Vector3::new(0.9, 0.1, 0.0)));
        assert!(!silhouette.is_solid_at_point(Vector3::new(0.1, 0.9, 0.0)));
    }

    #[test]
    fn exact_tie_prefers_solid() {
        let directions = vec![Vector3::x(), -Vector3::x()];
        let solid = vec![false, true];
        let silhouette = ImplicitSilhouette::new(directions, solid);
        // Equidistant from both +x and -x.
        assert!(silhouette.is_solid_at_point(Vector3::y()));
    }

    #[test]
    fn empty_silhouette_classifies_as_empty() {
        let silhouette = ImplicitSilhouette::new(Vec::new(), Vec::new());
        assert!(!silhouette.is_solid_at_point(Vector3::z()));
    }
}
