//! A resolved tile's local (u, v) parameterization, plus its draw order
//! (C11 support).

use crate::geometry::{BilinearInterpolator, Quad3};
use crate::tiler::tile::Tile;
use nalgebra::{Point3, Vector2, Vector3};

/// A `Tile` wrapped with a bilinear parameterization and a draw-order key.
///
/// `draw_order` is the distance from the origin to the quad's centroid: a
/// cheap back-to-front approximation, not an exact visibility ordering. A
/// viewer standing off-center can still see draw-order artifacts at tile
/// boundaries; the source accepts this rather than solving exact
/// per-pixel visibility, and so does this port.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub cell: i32,
    pub quad: Quad3,
    pub draw_order: f64,
}

impl Frame {
    pub fn from_tile(tile: &Tile) -> Self {
        let centroid = Point3::from(
            tile.quad.iter().map(|p| p.coords).sum::<Vector3<f64>>() / 4.0,
        );
        Frame {
            cell: tile.cell,
            quad: tile.quad,
            draw_order: centroid.coords.norm(),
        }
    }

    /// Evaluates the world-space point at parametric coordinates `(u, v)`.
    pub fn frame_to_world(&self, u: f64, v: f64) -> Point3<f64> {
        BilinearInterpolator::new(self.quad).eval(u, v)
    }

    /// Recovers `(u, v)` for a `point` known to lie in the quad's plane, by
    /// solving the bilinear map's inverse with a few Newton iterations
    /// from the quad's center. Returns `None` if the iteration fails to
    /// converge (a degenerate, near-zero-area quad).
    pub fn world_to_frame(&self, point: Point3<f64>) -> Option<(f64, f64)> {
        let interp = BilinearInterpolator::new(self.quad);
        let mut uv = Vector2::new(0.5, 0.5);
        const STEP: f64 = 1e-5;
        for _ in 0..20 {
            let f = interp.eval(uv.x, uv.y) - point;
            if f.norm() < 1e-9 {
                return Some((uv.x, uv.y));
            }

            let du = (interp.eval(uv.x + STEP, uv.y) - interp.eval(uv.x - STEP, uv.y)) / (2.0 * STEP);
            let dv = (interp.eval(uv.x, uv.y + STEP) - interp.eval(uv.x, uv.y - STEP)) / (2.0 * STEP);

            // Least-squares solve of the 3x2 system [du dv] * delta = -f.
            let jtj = nalgebra::Matrix2::new(du.dot(&du), du.dot(&dv), dv.dot(&du), dv.dot(&dv));
            let jtf = Vector2::new(du.dot(&f), dv.dot(&f));
            let Some(delta) = jtj.try_inverse().map(|inv| inv * jtf) else {
                return None;
            };
            uv -= delta;
        }
        let residual = (interp.eval(uv.x, uv.y) - point).norm();
        if residual < 1e-6 {
            Some((uv.x, uv.y))
        } else {
            None
        }
    }
}
