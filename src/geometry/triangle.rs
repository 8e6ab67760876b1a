//! Triangle operations: barycentric coordinates, bounding box, normal (C1).

use nalgebra::{Point3, Vector3};

/// Three 3D vertices, counter-clockwise when viewed against the outward
/// normal.
#[derive(Debug, Clone, Copy)]
pub struct Triangle3 {
    pub vertices: [Point3<f64>; 3],
}

impl Triangle3 {
    pub fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Triangle3 {
            vertices: [a, b, c],
        }
    }

    /// Unit normal, following the counter-clockwise winding convention:
    /// `(v1 - v0) x (v2 - v0)`, normalized.
    pub fn normal(&self) -> Vector3<f64> {
        let [a, b, c] = self.vertices;
        (b - a).cross(&(c - a)).normalize()
    }

    pub fn bounding_box(&self) -> (Point3<f64>, Point3<f64>) {
        let mut min = self.vertices[0];
        let mut max = self.vertices[0];
        for v in &self.vertices[1..] {
            min = Point3::new(min.x.min(v.x), min.y.min(v.y), min.z.min(v.z));
            max = Point3::new(max.x.max(v.x), max.y.max(v.y), max.z.max(v.z));
        }
        (min, max)
    }

    /// The barycentric coordinates `(u, v, w)` of `point`, such that
    /// `point == u*v0 + v*v1 + w*v2` and `u + v + w == 1`. Degenerate
    /// (zero-area) triangles return `(NAN, NAN, NAN)`.
    pub fn barycentric_from_point(&self, point: Point3<f64>) -> (f64, f64, f64) {
        let [a, b, c] = self.vertices;
        let v0 = b - a;
        let v1 = c - a;
        let v2 = point - a;
        let d00 = v0.dot(&v0);
        let d01 = v0.dot(&v1);
        let d11 = v1.dot(&v1);
        let d20 = v2.dot(&v0);
        let d21 = v2.dot(&v1);
        let denom = d00 * d11 - d01 * d01;
        if denom == 0.0 {
            return (f64::NAN, f64::NAN, f64::NAN);
        }
        let v = (d11 * d20 - d01 * d21) / denom;
        let w = (d00 * d21 - d01 * d20) / denom;
        let u = 1.0 - v - w;
        (u, v, w)
    }

    /// The inverse of [`Triangle3::barycentric_from_point`].
    pub fn point_from_barycentric(&self, (u, v, w): (f64, f64, f64)) -> Point3<f64> {
        let [a, b, c] = self.vertices;
        Point3::from(u * a.coords + v * b.coords + w * c.coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normal_follows_ccw_winding() {
        let tri = Triangle3::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        assert_relative_eq!(tri.normal(), Vector3::z(), epsilon = 1e-9);
    }

    #[test]
    fn barycentric_round_trips() {
        let tri = Triangle3::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        );
        for b in [(1.0, 0.0, 0.0), (0.2, 0.3, 0.5), (0.0, 0.0, 1.0)] {
            let p = tri.point_from_barycentric(b);
            let back = tri.barycentric_from_point(p);
            assert_relative_eq!(back.0, b.0, epsilon = 1e-9);
            assert_relative_eq!(back.1, b.1, epsilon = 1e-9);
            assert_relative_eq!(back.2, b.2, epsilon = 1e-9);
        }
    }

    #[test]
    fn bounding_box_contains_all_vertices() {
        let tri = Triangle3::new(
            Point3::new(-1.0, 2.0, 0.0),
            Point3::new(3.0, -1.0, 5.0),
            Point3::new(0.0, 0.0, -2.0),
        );
        let (min, max) = tri.bounding_box();
        assert_eq!(min, Point3::new(-1.0, -1.0, -2.0));
        assert_eq!(max, Point3::new(3.0, 2.0, 5.0));
    }
}
