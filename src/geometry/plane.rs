//! A plane in `N`-dimensional space, stored as a unit normal and a signed
//! distance from the origin (C1).

use nalgebra::{Point3, Vector3};

/// A plane `{ p : n . p + d == 0 }`, with `n` kept unit-length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane3 {
    normal: Vector3<f64>,
    d: f64,
}

impl Plane3 {
    /// Builds a plane from a normal and offset `d`. `normal` is renormalized
    /// if it is not already unit length; if it is degenerate (zero length)
    /// the plane is left invalid (see [`Plane3::is_valid`]).
    pub fn from_normal_and_offset(normal: Vector3<f64>, d: f64) -> Self {
        let norm = normal.norm();
        if norm > 0.0 {
            Plane3 {
                normal: normal / norm,
                d: d / norm,
            }
        } else {
            Plane3 { normal, d }
        }
    }

    /// Builds a plane through `point` with the given `normal`.
    pub fn from_point_and_normal(point: Point3<f64>, normal: Vector3<f64>) -> Self {
        let norm = normal.norm();
        let unit_normal = if norm > 0.0 { normal / norm } else { normal };
        let d = -unit_normal.dot(&point.coords);
        Plane3 {
            normal: unit_normal,
            d,
        }
    }

    /// Builds a plane directly from coefficients already known to satisfy
    /// `|normal| == 1`. No renormalization is performed; the caller is
    /// trusted.
    pub fn from_normalized_coefficients(normal: Vector3<f64>, d: f64) -> Self {
        Plane3 { normal, d }
    }

    pub fn normal(&self) -> Vector3<f64> {
        self.normal
    }

    pub fn d(&self) -> f64 {
        self.d
    }

    pub fn is_valid(&self) -> bool {
        self.normal != Vector3::zeros()
    }

    pub fn signed_distance_to_point(&self, point: Point3<f64>) -> f64 {
        self.normal.dot(&point.coords) + self.d
    }

    pub fn project_point(&self, point: Point3<f64>) -> Point3<f64> {
        point - self.normal * self.signed_distance_to_point(point)
    }

    /// Intersects the ray `origin + t * direction` with this plane.
    ///
    /// Returns `None` if the ray is parallel to the plane, or if the
    /// intersection lies at `t <= 0` (rays starting on the plane, or
    /// pointing away from it, do not intersect).
    pub fn intersect_ray(&self, origin: Point3<f64>, direction: Vector3<f64>) -> Option<f64> {
        let denom = self.normal.dot(&direction);
        if denom == 0.0 {
            return None;
        }
        let t = -self.signed_distance_to_point(origin) / denom;
        if t > 0.0 {
            Some(t)
        } else {
            None
        }
    }

    pub fn reversed(&self) -> Self {
        Plane3 {
            normal: -self.normal,
            d: -self.d,
        }
    }

    /// A unit vector tangent to the plane: the basis axis with smallest
    /// `|normal[axis]|`, projected onto the plane and renormalized.
    pub fn tangent(&self) -> Vector3<f64> {
        let abs = self.normal.abs();
        let axis = if abs.x <= abs.y && abs.x <= abs.z {
            0
        } else if abs.y <= abs.z {
            1
        } else {
            2
        };
        let mut basis = Vector3::zeros();
        basis[axis] = 1.0;
        // |normal| == 1, so projecting onto it is just a dot product.
        let projected = basis - self.normal * basis.dot(&self.normal);
        let norm = projected.norm();
        if norm > 0.0 {
            projected / norm
        } else {
            projected
        }
    }
}
