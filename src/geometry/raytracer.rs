//! Ray-mesh intersection over a triangle mesh with a BVH acceleration
//! structure (C3).
//!
//! Built once from a vertex/index buffer; immutable afterward and safe to
//! query concurrently from any number of threads, same contract as
//! [`super::kdtree::KdTree`].

use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn empty() -> Self {
        Aabb {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    fn grow(&mut self, p: Point3<f64>) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    fn union(mut self, other: Aabb) -> Self {
        self.grow(other.min);
        self.grow(other.max);
        self
    }

    // Slab test; returns the overlap of [0, t_max] with the ray's
    // intersection interval, if any.
    fn intersect_ray(&self, origin: Point3<f64>, inv_direction: Vector3<f64>, t_max: f64) -> bool {
        let mut t_min = 0.0;
        let mut t_far = t_max;
        for axis in 0..3 {
            let mut t0 = (self.min[axis] - origin[axis]) * inv_direction[axis];
            let mut t1 = (self.max[axis] - origin[axis]) * inv_direction[axis];
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_far = t_far.min(t1);
            if t_min > t_far {
                return false;
            }
        }
        true
    }
}

enum BvhNode {
    Leaf {
        bounds: Aabb,
        triangles: Vec<usize>,
    },
    Interior {
        bounds: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn bounds(&self) -> Aabb {
        match self {
            BvhNode::Leaf { bounds, .. } => *bounds,
            BvhNode::Interior { bounds, .. } => *bounds,
        }
    }
}

const MAX_TRIANGLES_PER_LEAF: usize = 4;

fn build_bvh(
    vertices: &[Point3<f64>],
    indices: &[[u32; 3]],
    centroids: &[Point3<f64>],
    triangle_bounds: &[Aabb],
    mut triangle_indices: Vec<usize>,
) -> BvhNode {
    let bounds = triangle_indices
        .iter()
        .map(|&t| triangle_bounds[t])
        .fold(Aabb::empty(), Aabb::union);

    if triangle_indices.len() <= MAX_TRIANGLES_PER_LEAF {
        return BvhNode::Leaf {
            bounds,
            triangles: triangle_indices,
        };
    }

    let extent = bounds.max - bounds.min;
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };

    triangle_indices.sort_by(|&a, &b| {
        centroids[a][axis]
            .partial_cmp(&centroids[b][axis])
            .unwrap()
    });
    let mid = triangle_indices.len() / 2;
    let right_indices = triangle_indices.split_off(mid);

    let left = build_bvh(vertices, indices, centroids, triangle_bounds, triangle_indices);
    let right = build_bvh(vertices, indices, centroids, triangle_bounds, right_indices);

    BvhNode::Interior {
        bounds,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Möller-Trumbore ray-triangle intersection. Returns the hit parameter `t`
/// if the ray hits the triangle within `(0, t_max]`. Rays with origin
/// exactly on the triangle are treated as a miss (the epsilon guard below),
/// which is the "undefined but must not corrupt state" behavior §4.3 asks
/// for.
fn intersect_triangle(
    origin: Point3<f64>,
    direction: Vector3<f64>,
    t_max: f64,
    v0: Point3<f64>,
    v1: Point3<f64>,
    v2: Point3<f64>,
) -> Option<f64> {
    const EPSILON: f64 = 1e-12;
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);
    if a.abs() < EPSILON {
        return None;
    }
    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = f * edge2.dot(&q);
    if t > EPSILON && t <= t_max {
        Some(t)
    } else {
        None
    }
}

/// A triangle mesh with a BVH acceleration structure, queryable for
/// first-hit, all-hits, and counted-hits intersections.
pub struct Raytracer {
    vertices: Vec<Point3<f64>>,
    indices: Vec<[u32; 3]>,
    root: Option<BvhNode>,
}

impl Raytracer {
    pub fn new(vertices: Vec<Point3<f64>>, indices: Vec<[u32; 3]>) -> Self {
        let centroids: Vec<Point3<f64>> = indices
            .iter()
            .map(|tri| {
                let [a, b, c] = tri.map(|i| vertices[i as usize]);
                Point3::from((a.coords + b.coords + c.coords) / 3.0)
            })
            .collect();
        let triangle_bounds: Vec<Aabb> = indices
            .iter()
            .map(|tri| {
                let mut bb = Aabb::empty();
                for &i in tri {
                    bb.grow(vertices[i as usize]);
                }
                bb
            })
            .collect();
        let root = if indices.is_empty() {
            None
        } else {
            Some(build_bvh(
                &vertices,
                &indices,
                &centroids,
                &triangle_bounds,
                (0..indices.len()).collect(),
            ))
        };
        Raytracer {
            vertices,
            indices,
            root,
        }
    }

    fn triangle_points(&self, triangle_index: usize) -> (Point3<f64>, Point3<f64>, Point3<f64>) {
        let tri = self.indices[triangle_index];
        (
            self.vertices[tri[0] as usize],
            self.vertices[tri[1] as usize],
            self.vertices[tri[2] as usize],
        )
    }

    /// The closest intersection, if any, within `(0, t_max]`.
    pub fn find_first_hit(
        &self,
        origin: Point3<f64>,
        direction: Vector3<f64>,
        t_max: f64,
    ) -> Option<(f64, usize)> {
        let inv_direction = Vector3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z);
        let mut best: Option<(f64, usize)> = None;
        self.visit_first_hit(self.root.as_ref(), origin, direction, inv_direction, t_max, &mut best);
        best
    }

    fn visit_first_hit(
        &self,
        node: Option<&BvhNode>,
        origin: Point3<f64>,
        direction: Vector3<f64>,
        inv_direction: Vector3<f64>,
        t_max: f64,
        best: &mut Option<(f64, usize)>,
    ) {
        let Some(node) = node else { return };
        let current_t_max = best.map(|(t, _)| t).unwrap_or(t_max);
        if !node.bounds().intersect_ray(origin, inv_direction, current_t_max) {
            return;
        }
        match node {
            BvhNode::Leaf { triangles, .. } => {
                for &triangle_index in triangles {
                    let (v0, v1, v2) = self.triangle_points(triangle_index);
                    let limit = best.map(|(t, _)| t).unwrap_or(t_max);
                    if let Some(t) = intersect_triangle(origin, direction, limit, v0, v1, v2) {
                        *best = Some((t, triangle_index));
                    }
                }
            }
            BvhNode::Interior { left, right, .. } => {
                self.visit_first_hit(Some(left), origin, direction, inv_direction, t_max, best);
                self.visit_first_hit(Some(right), origin, direction, inv_direction, t_max, best);
            }
        }
    }

    /// Every intersection along the ray, unsorted, with `t_max` treated as
    /// infinite.
    pub fn find_all_intersections(&self, origin: Point3<f64>, direction: Vector3<f64>) -> Vec<(f64, usize)> {
        let mut result = Vec::new();
        self.visit_all(self.root.as_ref(), origin, direction, &mut result);
        result
    }

    fn visit_all(
        &self,
        node: Option<&BvhNode>,
        origin: Point3<f64>,
        direction: Vector3<f64>,
        result: &mut Vec<(f64, usize)>,
    ) {
        let Some(node) = node else { return };
        let inv_direction = Vector3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z);
        if !node.bounds().intersect_ray(origin, inv_direction, f64::INFINITY) {
            return;
        }
        match node {
            BvhNode::Leaf { triangles, .. } => {
                for &triangle_index in triangles {
                    let (v0, v1, v2) = self.triangle_points(triangle_index);
                    if let Some(t) = intersect_triangle(origin, direction, f64::INFINITY, v0, v1, v2) {
                        result.push((t, triangle_index));
                    }
                }
            }
            BvhNode::Interior { left, right, .. } => {
                self.visit_all(Some(left), origin, direction, result);
                self.visit_all(Some(right), origin, direction, result);
            }
        }
    }

    /// Counts intersections up to `max_count`, stopping traversal early
    /// once that many have been found.
    pub fn count_intersections(
        &self,
        origin: Point3<f64>,
        direction: Vector3<f64>,
        t_max: f64,
        max_count: usize,
    ) -> usize {
        let mut count = 0;
        self.visit_count(self.root.as_ref(), origin, direction, t_max, max_count, &mut count);
        count
    }

    fn visit_count(
        &self,
        node: Option<&BvhNode>,
        origin: Point3<f64>,
        direction: Vector3<f64>,
        t_max: f64,
        max_count: usize,
        count: &mut usize,
    ) {
        if *count >= max_count {
            return;
        }
        let Some(node) = node else { return };
        let inv_direction = Vector3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z);
        if !node.bounds().intersect_ray(origin, inv_direction, t_max) {
            return;
        }
        match node {
            BvhNode::Leaf { triangles, .. } => {
                for &triangle_index in triangles {
                    if *count >= max_count {
                        return;
                    }
                    let (v0, v1, v2) = self.triangle_points(triangle_index);
                    if intersect_triangle(origin, direction, t_max, v0, v1, v2).is_some() {
                        *count += 1;
                    }
                }
            }
            BvhNode::Interior { left, right, .. } => {
                self.visit_count(Some(left), origin, direction, t_max, max_count, count);
                self.visit_count(Some(right), origin, direction, t_max, max_count, count);
            }
        }
    }
}
