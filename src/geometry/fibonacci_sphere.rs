//! Direction sampling via the spherical Fibonacci point set, plus its
//! inverse mapping (C1).
//!
//! The inverse mapping follows Keinert et al., "Spherical Fibonacci Mapping"
//! (2015): it locates the local 2x2 lattice cell around the query direction
//! via a closed-form basis inversion, then picks whichever of the four
//! candidate indices it returns actually generates the closest point.

use nalgebra::Vector3;
use std::f64::consts::PI;

const GOLDEN_RATIO: f64 = 1.618_033_988_749_895; // (1 + sqrt(5)) / 2

fn frac(x: f64) -> f64 {
    x - x.floor()
}

/// The `i`-th of `num_points` directions on the unit sphere, offset by a
/// constant `scrambler` angle (radians). `i` must be in `[0, num_points)`.
pub fn generate_fibonacci_sphere_point(num_points: usize, scrambler: f64, i: usize) -> Vector3<f64> {
    debug_assert!(num_points > 0);
    debug_assert!(i < num_points);
    let d_i = i as f64;
    let mut phi = 2.0 * PI * frac(d_i * (GOLDEN_RATIO - 1.0));
    phi += scrambler;
    let cos_theta = 1.0 - (2.0 * d_i + 1.0) * (1.0 / num_points as f64);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    Vector3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

// The 4 candidate indices of the Fibonacci lattice cell nearest
// `normalized_direction`.
fn fibonacci_sphere_cell(num_points: usize, scrambler: f64, normalized_direction: Vector3<f64>) -> [i64; 4] {
    let n = num_points as f64;
    let phi = normalized_direction
        .y
        .atan2(normalized_direction.x)
        .min(PI)
        - scrambler;
    let cos_theta = normalized_direction.z;

    let k = (2.0_f64).max(
        ((n * PI * 5.0_f64.sqrt() * (1.0 - cos_theta * cos_theta)).ln() / (GOLDEN_RATIO * GOLDEN_RATIO).ln())
            .floor(),
    );

    let fk = GOLDEN_RATIO.powf(k) / 5.0_f64.sqrt();
    let f0 = fk.round();
    let f1 = (fk * GOLDEN_RATIO).round();

    // b = [[b00, b01], [b10, b11]]
    let b00 = 2.0 * PI * frac((f0 + 1.0) * (GOLDEN_RATIO - 1.0)) - 2.0 * PI * (GOLDEN_RATIO - 1.0);
    let b01 = 2.0 * PI * frac((f1 + 1.0) * (GOLDEN_RATIO - 1.0)) - 2.0 * PI * (GOLDEN_RATIO - 1.0);
    let b10 = -2.0 * f0 / n;
    let b11 = -2.0 * f1 / n;

    let det = b00 * b11 - b01 * b10;
    // inverse of [[b00,b01],[b10,b11]]
    let inv00 = b11 / det;
    let inv01 = -b01 / det;
    let inv10 = -b10 / det;
    let inv11 = b00 / det;

    let rhs0 = phi;
    let rhs1 = cos_theta - (1.0 - 1.0 / n);

    let mut c0 = (inv00 * rhs0 + inv01 * rhs1).floor();
    let mut c1 = (inv10 * rhs0 + inv11 * rhs1).floor();
    // Silence "unused mut" if the optimizer ever proves these constant; kept
    // mutable to mirror the in-place floor() in the source.
    let _ = (&mut c0, &mut c1);

    let mut cell_indices = [0i64; 4];
    for s in 0..4 {
        let sx = (s % 2) as f64;
        let sy = (s / 2) as f64;
        let cos_theta_unclamped = b10 * (sx + c0) + b11 * (sy + c1) + (1.0 - 1.0 / n);
        let cos_theta = if cos_theta_unclamped > 1.0 {
            2.0 - cos_theta_unclamped
        } else if cos_theta_unclamped < -1.0 {
            -2.0 - cos_theta_unclamped
        } else {
            cos_theta_unclamped
        };
        let i = (n * 0.5 - cos_theta * n * 0.5).floor();
        cell_indices[s] = i as i64;
    }
    cell_indices
}

/// Given a unit `direction`, returns the index of the closest of the
/// `num_points` Fibonacci-sphere directions generated with the same
/// `scrambler`.
pub fn inverse_fibonacci_sphere_mapping(num_points: usize, scrambler: f64, direction: Vector3<f64>) -> usize {
    let cell_indices = fibonacci_sphere_cell(num_points, scrambler, direction);
    let mut best = 0usize;
    let mut best_distance2 = f64::INFINITY;
    for &candidate in &cell_indices {
        // The closed-form cell lookup can suggest indices slightly outside
        // the valid range near the poles; clamp rather than let them index
        // out of bounds.
        let i = candidate.clamp(0, num_points as i64 - 1) as usize;
        let p = generate_fibonacci_sphere_point(num_points, scrambler, i);
        let distance2 = (p - direction).norm_squared();
        if distance2 < best_distance2 {
            best_distance2 = distance2;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_mapping_is_self_consistent() {
        let num_points = 200;
        for scrambler in [0.0, 0.37] {
            for i in 0..num_points {
                let p = generate_fibonacci_sphere_point(num_points, scrambler, i);
                let round_trip = inverse_fibonacci_sphere_mapping(num_points, scrambler, p);
                assert_eq!(round_trip, i, "num_points={num_points} scrambler={scrambler} i={i}");
            }
        }
    }

    #[test]
    fn generated_points_are_unit_length() {
        for i in 0..64 {
            let p = generate_fibonacci_sphere_point(64, 0.1, i);
            assert!((p.norm() - 1.0).abs() < 1e-9);
        }
    }
}
