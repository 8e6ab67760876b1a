//! Geometric primitives and spatial structures (C1, C2, C3): planes,
//! triangles, quads, the 2D convex hull, Fibonacci-sphere sampling, the
//! k-d tree, and the BVH raytracer.

pub mod convex_hull;
pub mod fibonacci_sphere;
pub mod kdtree;
pub mod plane;
pub mod quad;
pub mod raytracer;
pub mod sphere;
pub mod triangle;

pub use convex_hull::compute_convex_hull;
pub use fibonacci_sphere::{generate_fibonacci_sphere_point, inverse_fibonacci_sphere_mapping};
pub use kdtree::KdTree;
pub use plane::Plane3;
pub use quad::{is_well_formed_quad, BilinearInterpolator, Quad2, Quad3};
pub use raytracer::Raytracer;
pub use triangle::Triangle3;
