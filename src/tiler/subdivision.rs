//! Cubemap-quadtree directional partitioning of points (C5).

use crate::point_set::PointSet;
use nalgebra::{Point3, Vector3};

/// A forest whose roots are the six faces of an origin-centered cube and
/// whose children are the four quadrants of a uniform quadtree on each
/// face.
pub trait Subdivision {
    /// The six root cell ids.
    fn roots(&self) -> Vec<i32>;
    /// The (0 or 4) children of `cell`.
    fn children(&self, cell: i32) -> Vec<i32>;
    /// Indices of points in `cell`'s subtree.
    fn points_in_cell(&self, cell: i32) -> &[usize];
    /// The four unit corner-ray vectors of `cell`'s angular footprint,
    /// counter-clockwise around the outward face normal. All-zero if the
    /// cell has no well-defined rails.
    fn rails(&self, cell: i32) -> [Vector3<f64>; 4];
    /// Rebuilds the partitioning if `points.id()` differs from the last
    /// `init` call; a no-op otherwise.
    fn init(&mut self, points: &PointSet<'_>);
    /// The depth of `cell` (roots are depth 0).
    fn depth(&self, cell: i32) -> u32;
    /// The leaf cell whose angular footprint contains `direction`.
    fn find_leaf(&self, direction: Vector3<f64>) -> i32;
}

#[derive(Debug, Clone, Copy)]
struct Range2 {
    min_u: f64,
    min_v: f64,
    max_u: f64,
    max_v: f64,
}

impl Range2 {
    fn center(&self) -> (f64, f64) {
        ((self.min_u + self.max_u) / 2.0, (self.min_v + self.max_v) / 2.0)
    }
}

struct Node {
    range: Range2,
    cube_face: usize,
    depth: u32,
    start: usize,
    end: usize,
    children: Option<[usize; 4]>,
}

/// The projected `(u, v)` coordinates of `p` on cube face `face`, in
/// `[-1, 1]^2`.
fn project_to_face(p: Point3<f64>, face: usize) -> (f64, f64) {
    let major_axis = face % 3;
    let denom = p[major_axis].abs();
    let u = p[(major_axis + 1) % 3] / denom;
    let v = p[(major_axis + 2) % 3] / denom;
    (u, v)
}

/// `face = major_axis + 3 * [p_major_axis >= 0]`.
fn cube_face_from_point(p: Point3<f64>) -> usize {
    let abs = [p.x.abs(), p.y.abs(), p.z.abs()];
    let major_axis = if abs[0] >= abs[1] && abs[0] >= abs[2] {
        0
    } else if abs[1] >= abs[2] {
        1
    } else {
        2
    };
    major_axis + if p[major_axis] >= 0.0 { 3 } else { 0 }
}

fn face_normal(face: usize) -> Vector3<f64> {
    let major_axis = face % 3;
    let sign = if face >= 3 { 1.0 } else { -1.0 };
    let mut n = Vector3::zeros();
    n[major_axis] = sign;
    n
}

fn corner_direction(face: usize, u: f64, v: f64) -> Vector3<f64> {
    let major_axis = face % 3;
    let sign = if face >= 3 { 1.0 } else { -1.0 };
    let mut dir = Vector3::zeros();
    dir[major_axis] = sign;
    dir[(major_axis + 1) % 3] = u;
    dir[(major_axis + 2) % 3] = v;
    dir.normalize()
}

// Reverses the corner order if it runs clockwise around the outward face
// normal, so every caller sees a consistent counter-clockwise convention.
fn ensure_ccw(rails: &mut [Vector3<f64>; 4], normal: Vector3<f64>) {
    let mut signed_area = 0.0;
    for i in 0..4 {
        let a = rails[i];
        let b = rails[(i + 1) % 4];
        signed_area += a.cross(&b).dot(&normal);
    }
    if signed_area < 0.0 {
        rails.reverse();
    }
}

/// Organizes a `PointSet` into a pyramid by projecting points onto the
/// faces of an origin-centered cube-map and subdividing each face into a
/// uniform quadtree of the given `depth` (at most 14).
pub struct CubemapQuadtreeSubdivision {
    depth: u32,
    point_set_id: crate::point_set::PointSetId,
    points: Vec<usize>,
    nodes: Vec<Node>,
}

impl CubemapQuadtreeSubdivision {
    pub fn new(depth: u32) -> Self {
        assert!(depth <= 14, "subdivision depth must be at most 14");
        CubemapQuadtreeSubdivision {
            depth,
            point_set_id: crate::point_set::INVALID_POINT_SET_ID,
            points: Vec::new(),
            nodes: Vec::new(),
        }
    }

    // Partitions `self.points[start..end]` into the 4 quadrants relative to
    // `pivot`, in the fixed order [++, -+, --, +-] (high-x,high-y first,
    // then going counter-clockwise through the remaining three). Returns
    // the 4 sub-ranges as (start, end) pairs, contiguous and covering
    // [start, end).
    fn partition(
        &mut self,
        positions: &[Point3<f64>],
        face: usize,
        pivot: (f64, f64),
        start: usize,
        end: usize,
    ) -> [(usize, usize); 4] {
        let coord = |points: &[usize], i: usize| project_to_face(positions[points[i]], face);

        // First pass: partition by u, high-u first.
        let mut mid = start;
        for i in start..end {
            let (u, _) = coord(&self.points, i);
            if u >= pivot.0 {
                self.points.swap(i, mid);
                mid += 1;
            }
        }
        let high_u = (start, mid);
        let low_u = (mid, end);

        // Second pass: partition each half by v, high-v first.
        let split_by_v = |points: &mut Vec<usize>, (s, e): (usize, usize)| -> (usize, usize, usize) {
            let mut mid = s;
            for i in s..e {
                let (_, v) = project_to_face(positions[points[i]], face);
                if v >= pivot.1 {
                    points.swap(i, mid);
                    mid += 1;
                }
            }
            (s, mid, e)
        };

        let (hu_s, hu_mid, hu_e) = split_by_v(&mut self.points, high_u);
        let (lu_s, lu_mid, lu_e) = split_by_v(&mut self.points, low_u);

        // [++ (high_u, high_v), -+ (low_u, high_v), -- (low_u, low_v), +- (high_u, low_v)]
        [
            (hu_s, hu_mid),
            (lu_s, lu_mid),
            (lu_mid, lu_e),
            (hu_mid, hu_e),
        ]
    }

    fn build_node(
        &mut self,
        positions: &[Point3<f64>],
        face: usize,
        range: Range2,
        depth: u32,
        start: usize,
        end: usize,
    ) -> usize {
        let children = if depth < self.depth && end > start {
            let pivot = range.center();
            let quadrants = self.partition(positions, face, pivot, start, end);
            let child_ranges = [
                Range2 {
                    min_u: pivot.0,
                    min_v: pivot.1,
                    max_u: range.max_u,
                    max_v: range.max_v,
                },
                Range2 {
                    min_u: range.min_u,
                    min_v: pivot.1,
                    max_u: pivot.0,
                    max_v: range.max_v,
                },
                Range2 {
                    min_u: range.min_u,
                    min_v: range.min_v,
                    max_u: pivot.0,
                    max_v: pivot.1,
                },
                Range2 {
                    min_u: pivot.0,
                    min_v: range.min_v,
                    max_u: range.max_u,
                    max_v: pivot.1,
                },
            ];
            let mut child_indices = [0usize; 4];
            for i in 0..4 {
                let (s, e) = quadrants[i];
                child_indices[i] = self.build_node(positions, face, child_ranges[i], depth + 1, s, e);
            }
            Some(child_indices)
        } else {
            None
        };

        self.nodes.push(Node {
            range,
            cube_face: face,
            depth,
            start,
            end,
            children,
        });
        self.nodes.len() - 1
    }
}

impl Subdivision for CubemapQuadtreeSubdivision {
    fn roots(&self) -> Vec<i32> {
        (0..6.min(self.nodes.len() as i32)).collect()
    }

    fn children(&self, cell: i32) -> Vec<i32> {
        match &self.nodes[cell as usize].children {
            Some(c) => c.iter().map(|&i| i as i32).collect(),
            None => Vec::new(),
        }
    }

    fn points_in_cell(&self, cell: i32) -> &[usize] {
        let node = &self.nodes[cell as usize];
        &self.points[node.start..node.end]
    }

    fn rails(&self, cell: i32) -> [Vector3<f64>; 4] {
        let node = &self.nodes[cell as usize];
        let r = node.range;
        let mut rails = [
            corner_direction(node.cube_face, r.min_u, r.min_v),
            corner_direction(node.cube_face, r.max_u, r.min_v),
            corner_direction(node.cube_face, r.max_u, r.max_v),
            corner_direction(node.cube_face, r.min_u, r.max_v),
        ];
        ensure_ccw(&mut rails, face_normal(node.cube_face));
        rails
    }

    fn init(&mut self, points: &PointSet<'_>) {
        if points.id() == self.point_set_id && points.id() != crate::point_set::INVALID_POINT_SET_ID {
            return;
        }
        self.point_set_id = points.id();
        self.nodes.clear();
        let positions = points.positions();

        // Stable bucket by face.
        let mut buckets: [Vec<usize>; 6] = Default::default();
        for (i, &p) in positions.iter().enumerate() {
            buckets[cube_face_from_point(p)].push(i);
        }

        self.points = Vec::with_capacity(positions.len());
        let mut face_ranges = [(0usize, 0usize); 6];
        for face in 0..6 {
            let start = self.points.len();
            self.points.extend_from_slice(&buckets[face]);
            face_ranges[face] = (start, self.points.len());
        }

        // Build each face's quadtree; roots must land at node indices 0..6
        // in face order, so build them last-first and fix up, or simply
        // reserve their slots up front.
        let mut root_indices = [0usize; 6];
        for face in 0..6 {
            let (start, end) = face_ranges[face];
            let range = Range2 {
                min_u: -1.0,
                min_v: -1.0,
                max_u: 1.0,
                max_v: 1.0,
            };
            root_indices[face] = self.build_node(positions, face, range, 0, start, end);
        }
        // Re-order so the 6 roots occupy cell ids 0..6, matching
        // `Subdivision::roots`. Since nodes are appended in post-order,
        // roots are scattered; remap by swapping the root nodes into place
        // and fixing up every child reference accordingly.
        self.remap_roots_to_front(root_indices);
    }

    fn depth(&self, cell: i32) -> u32 {
        self.nodes[cell as usize].depth
    }

    fn find_leaf(&self, direction: Vector3<f64>) -> i32 {
        let point = Point3::from(direction);
        let face = cube_face_from_point(point);
        let (u, v) = project_to_face(point, face);
        let mut node_index = face;
        loop {
            let node = &self.nodes[node_index];
            match &node.children {
                None => return node_index as i32,
                Some(children) => {
                    let (pivot_u, pivot_v) = node.range.center();
                    let quadrant = match (u >= pivot_u, v >= pivot_v) {
                        (true, true) => 0,
                        (false, true) => 1,
                        (false, false) => 2,
                        (true, false) => 3,
                    };
                    node_index = children[quadrant];
                }
            }
        }
    }
}

impl CubemapQuadtreeSubdivision {
    fn remap_roots_to_front(&mut self, root_indices: [usize; 6]) {
        // Build a permutation placing `root_indices[face]` at position
        // `face`, and every other node afterward in its prior relative
        // order.
        let mut new_position = vec![usize::MAX; self.nodes.len()];
        for (face, &old) in root_indices.iter().enumerate() {
            new_position[old] = face;
        }
        let mut next = 6;
        for old in 0..self.nodes.len() {
            if new_position[old] == usize::MAX {
                new_position[old] = next;
                next += 1;
            }
        }

        let mut reordered: Vec<Option<Node>> = self.nodes.drain(..).map(Some).collect();
        let mut new_nodes: Vec<Node> = Vec::with_capacity(reordered.len());
        let mut slot_of = vec![0usize; reordered.len()];
        for (old, &new) in new_position.iter().enumerate() {
            slot_of[old] = new;
        }
        let mut placeholder: Vec<Option<Node>> = (0..reordered.len()).map(|_| None).collect();
        for (old, node) in reordered.iter_mut().enumerate() {
            placeholder[new_position[old]] = node.take();
        }
        for slot in placeholder {
            let mut node = slot.expect("every slot filled by exactly one old node");
            if let Some(children) = &mut node.children {
                for c in children.iter_mut() {
                    *c = slot_of[*c];
                }
            }
            new_nodes.push(node);
        }
        self.nodes = new_nodes;
    }
}

/// Wraps another `Subdivision`, widening each cell's angular footprint by a
/// fixed small angle.
///
/// The dilation uses a small-angle approximation, preserved literally per
/// the source: for each corner, subtract its two neighbor-edge directions
/// (each scaled by `dilation_radians`) and renormalize.
pub struct BoundsDilatingSubdivision<S> {
    dilation_radians: f64,
    delegate: S,
}

impl<S: Subdivision> BoundsDilatingSubdivision<S> {
    pub fn new(dilation_radians: f64, delegate: S) -> Self {
        BoundsDilatingSubdivision {
            dilation_radians,
            delegate,
        }
    }
}

impl<S: Subdivision> Subdivision for BoundsDilatingSubdivision<S> {
    fn roots(&self) -> Vec<i32> {
        self.delegate.roots()
    }

    fn children(&self, cell: i32) -> Vec<i32> {
        self.delegate.children(cell)
    }

    fn points_in_cell(&self, cell: i32) -> &[usize] {
        self.delegate.points_in_cell(cell)
    }

    fn rails(&self, cell: i32) -> [Vector3<f64>; 4] {
        let rails = self.delegate.rails(cell);
        if rails.iter().all(|r| *r == Vector3::zeros()) {
            return rails;
        }
        let mut dilated = [Vector3::zeros(); 4];
        for i in 0..4 {
            let cur = rails[i];
            let prev = rails[(i + 3) % 4];
            let next = rails[(i + 1) % 4];
            let prev_dir = (prev - cur).normalize();
            let next_dir = (next - cur).normalize();
            dilated[i] = (cur - prev_dir * self.dilation_radians - next_dir * self.dilation_radians).normalize();
        }
        dilated
    }

    fn init(&mut self, points: &PointSet<'_>) {
        self.delegate.init(points);
    }

    fn depth(&self, cell: i32) -> u32 {
        self.delegate.depth(cell)
    }

    fn find_leaf(&self, direction: Vector3<f64>) -> i32 {
        self.delegate.find_leaf(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fibonacci_points(n: usize) -> Vec<Point3<f64>> {
        (0..n)
            .map(|i| {
                let v = crate::geometry::generate_fibonacci_sphere_point(n, 0.0, i);
                Point3::new(v.x, v.y, v.z)
            })
            .collect()
    }

    #[test]
    fn every_point_lands_in_exactly_one_leaf() {
        let positions = fibonacci_points(2000);
        let point_set = PointSet::new(1, &positions, &[], &[], &[]);
        let mut sub = CubemapQuadtreeSubdivision::new(4);
        sub.init(&point_set);

        let mut leaves = Vec::new();
        let mut stack = sub.roots();
        while let Some(cell) = stack.pop() {
            let children = sub.children(cell);
            if children.is_empty() {
                leaves.push(cell);
            } else {
                stack.extend(children);
            }
        }

        let mut seen = vec![false; positions.len()];
        for leaf in leaves {
            for &p in sub.points_in_cell(leaf) {
                assert!(!seen[p], "point {p} found in more than one leaf");
                seen[p] = true;
            }
        }
        assert!(seen.into_iter().all(|s| s), "every point must be covered");
    }

    #[test]
    fn init_is_idempotent_for_same_point_set_id() {
        let positions = fibonacci_points(100);
        let point_set = PointSet::new(7, &positions, &[], &[], &[]);
        let mut sub = CubemapQuadtreeSubdivision::new(3);
        sub.init(&point_set);
        let before: Vec<usize> = sub.points.clone();
        sub.init(&point_set);
        assert_eq!(before, sub.points);
    }

    #[test]
    fn rails_are_unit_length() {
        let positions = fibonacci_points(500);
        let point_set = PointSet::new(1, &positions, &[], &[], &[]);
        let mut sub = CubemapQuadtreeSubdivision::new(3);
        sub.init(&point_set);
        for root in sub.roots() {
            for rail in sub.rails(root) {
                assert!((rail.norm() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn find_leaf_agrees_with_points_in_cell() {
        let positions = fibonacci_points(500);
        let point_set = PointSet::new(1, &positions, &[], &[], &[]);
        let mut sub = CubemapQuadtreeSubdivision::new(3);
        sub.init(&point_set);

        let mut leaves = Vec::new();
        let mut stack = sub.roots();
        while let Some(cell) = stack.pop() {
            let children = sub.children(cell);
            if children.is_empty() {
                leaves.push(cell);
            } else {
                stack.extend(children);
            }
        }

        let mut expected_leaf = vec![-1i32; positions.len()];
        for &leaf in &leaves {
            for &p in sub.points_in_cell(leaf) {
                expected_leaf[p] = leaf;
            }
        }

        for (i, &p) in positions.iter().enumerate() {
            assert_eq!(sub.find_leaf(p.coords), expected_leaf[i]);
        }
    }

    #[test]
    fn dilation_widens_rails_outward() {
        let positions = fibonacci_points(500);
        let point_set = PointSet::new(1, &positions, &[], &[], &[]);
        let mut base = CubemapQuadtreeSubdivision::new(3);
        base.init(&point_set);
        let base_rails = base.rails(0);

        let mut dilated_sub = CubemapQuadtreeSubdivision::new(3);
        dilated_sub.init(&point_set);
        let mut dilated = BoundsDilatingSubdivision::new(0.01, dilated_sub);
        let dilated_rails = dilated.rails(0);

        for r in dilated_rails {
            assert!((r.norm() - 1.0).abs() < 1e-6);
        }
        // Dilation should actually move the rails, not leave them fixed.
        assert!(base_rails
            .iter()
            .zip(dilated_rails.iter())
            .any(|(a, b)| (a - b).norm() > 1e-6));
    }
}
