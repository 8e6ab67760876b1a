//! Ray-sphere intersection and the "worst-case eye point" search used by the
//! directional-overdraw weight model (C1/C9 support).

use nalgebra::{Point3, Vector3};

/// Intersects the ray `origin + t * direction` (`direction` need not be
/// unit-length) with the origin-centered sphere of the given `radius`.
/// Returns the smallest non-negative `t`, if any.
pub fn compute_ray_sphere_intersection(
    origin: Point3<f64>,
    direction: Vector3<f64>,
    radius: f64,
) -> Option<f64> {
    let a = direction.norm_squared();
    if a == 0.0 {
        return None;
    }
    let b = 2.0 * origin.coords.dot(&direction);
    let c = origin.coords.norm_squared() - radius * radius;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let sqrt_d = discriminant.sqrt();
    let t0 = (-b - sqrt_d) / (2.0 * a);
    let t1 = (-b + sqrt_d) / (2.0 * a);
    let (t_min, t_max) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
    if t_min >= 0.0 {
        Some(t_min)
    } else if t_max >= 0.0 {
        Some(t_max)
    } else {
        None
    }
}

/// Finds the worst-case eye position for viewing a patch from within the
/// origin-centered sphere of `radius`: the point inside (or on) the sphere
/// closest to `ray_start` along `ray_direction`.
///
/// - If `ray_start` is already inside the sphere, it is itself the answer
///   (no clamping needed to stay in the viewing volume).
/// - Otherwise, if the ray from `ray_start` along `ray_direction` hits the
///   sphere, the hit point is the closest reachable point.
/// - Otherwise, the ray misses the sphere entirely; fall back to the point
///   on the ray closest to the origin, pushed out (or in) radially onto the
///   sphere surface.
pub fn closest_point_in_sphere(
    ray_start: Point3<f64>,
    ray_direction: Vector3<f64>,
    radius: f64,
) -> Point3<f64> {
    if ray_start.coords.norm_squared() <= radius * radius {
        return ray_start;
    }
    if let Some(t) = compute_ray_sphere_intersection(ray_start, ray_direction, radius) {
        return ray_start + ray_direction * t;
    }
    let dir = if ray_direction.norm_squared() > 0.0 {
        ray_direction.normalize()
    } else {
        ray_direction
    };
    let t_closest = -ray_start.coords.dot(&dir);
    let closest_on_ray = ray_start + dir * t_closest;
    let norm = closest_on_ray.coords.norm();
    if norm > 0.0 {
        Point3::from(closest_on_ray.coords * (radius / norm))
    } else {
        closest_on_ray
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn intersection_from_outside_hits_near_side() {
        let t = compute_ray_sphere_intersection(Point3::new(0.0, 0.0, 5.0), -Vector3::z(), 1.0).unwrap();
        assert_relative_eq!(t, 4.0);
    }

    #[test]
    fn intersection_missing_sphere_is_none() {
        assert!(compute_ray_sphere_intersection(Point3::new(5.0, 5.0, 5.0), Vector3::x(), 1.0).is_none());
    }

    #[test]
    fn closest_point_inside_sphere_is_identity() {
        let p = Point3::new(0.1, 0.0, 0.0);
        assert_eq!(closest_point_in_sphere(p, Vector3::x(), 1.0), p);
    }

    #[test]
    fn closest_point_outside_with_missing_ray_lands_on_surface() {
        let p = closest_point_in_sphere(Point3::new(5.0, 5.0, 5.0), Vector3::x(), 1.0);
        assert_relative_eq!(p.coords.norm(), 1.0, epsilon = 1e-9);
    }
}
