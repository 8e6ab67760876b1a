//! Quads and bilinear interpolation over their surface (used by the tile
//! resolver and the directional-overdraw weight model).

use nalgebra::{Point2, Point3};

/// Four 3D corners, counter-clockwise, as produced by the rail-based
/// `Tile` resolver.
pub type Quad3 = [Point3<f64>; 4];

/// Four 2D corners, counter-clockwise.
pub type Quad2 = [Point2<f64>; 4];

/// Bilinearly interpolates over a quad's four corners, given in the order
/// `(0,0), (1,0), (1,1), (0,1)`.
#[derive(Debug, Clone, Copy)]
pub struct BilinearInterpolator {
    corners: Quad3,
}

impl BilinearInterpolator {
    pub fn new(corners: Quad3) -> Self {
        BilinearInterpolator { corners }
    }

    /// Evaluates the interpolated point at parametric coordinates `(u, v)`,
    /// each expected in `[0, 1]`.
    pub fn eval(&self, u: f64, v: f64) -> Point3<f64> {
        let [p00, p10, p11, p01] = self.corners;
        let bottom = p00.coords * (1.0 - u) + p10.coords * u;
        let top = p01.coords * (1.0 - u) + p11.coords * u;
        Point3::from(bottom * (1.0 - v) + top * v)
    }

    /// Splits the unit parametric square into an `(subdivisions_u x
    /// subdivisions_v)` grid and returns the corners of every sub-patch, in
    /// the same 4-corner CCW convention as the parent quad.
    pub fn sub_patches(&self, subdivisions_u: usize, subdivisions_v: usize) -> Vec<Quad3> {
        let subdivisions_u = subdivisions_u.max(1);
        let subdivisions_v = subdivisions_v.max(1);
        let mut patches = Vec::with_capacity(subdivisions_u * subdivisions_v);
        for j in 0..subdivisions_v {
            for i in 0..subdivisions_u {
                let u0 = i as f64 / subdivisions_u as f64;
                let u1 = (i + 1) as f64 / subdivisions_u as f64;
                let v0 = j as f64 / subdivisions_v as f64;
                let v1 = (j + 1) as f64 / subdivisions_v as f64;
                patches.push([
                    self.eval(u0, v0),
                    self.eval(u1, v0),
                    self.eval(u1, v1),
                    self.eval(u0, v1),
                ]);
            }
        }
        patches
    }
}

/// All four corners of `quad`, finite.
pub fn is_well_formed_quad(quad: &Quad3) -> bool {
    quad.iter()
        .all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_at_corners_matches_input() {
        let quad = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let interp = BilinearInterpolator::new(quad);
        assert_eq!(interp.eval(0.0, 0.0), quad[0]);
        assert_eq!(interp.eval(1.0, 0.0), quad[1]);
        assert_eq!(interp.eval(1.0, 1.0), quad[2]);
        assert_eq!(interp.eval(0.0, 1.0), quad[3]);
    }

    #[test]
    fn sub_patches_cover_grid_count() {
        let quad = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let interp = BilinearInterpolator::new(quad);
        assert_eq!(interp.sub_patches(3, 2).len(), 6);
    }

    #[test]
    fn non_finite_corner_is_ill_formed() {
        let quad = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(f64::NAN, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        assert!(!is_well_formed_quad(&quad));
    }
}
