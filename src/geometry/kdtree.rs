//! A static k-d tree for k-NN and radius queries over 2D/3D points (C2).
//!
//! Construction borrows the point span and builds an index permutation once;
//! queries only ever read `points` and the tree's own node array afterward,
//! so a built tree may be queried concurrently from any number of threads
//! (the source hides the same contract behind a nanoflann-backed PIMPL).

struct Node {
    point_index: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// A k-d tree over points of dimension `DIM` (2 or 3), holding a reference
/// to the caller's point array rather than copying it.
pub struct KdTree<'a, const DIM: usize> {
    points: &'a [[f64; DIM]],
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl<'a, const DIM: usize> KdTree<'a, DIM> {
    /// Builds a balanced k-d tree over `points`.
    pub fn new(points: &'a [[f64; DIM]]) -> Self {
        let mut indices: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::with_capacity(points.len());
        let root = Self::build(points, &mut indices, 0, &mut nodes);
        KdTree { points, nodes, root }
    }

    fn build(
        points: &[[f64; DIM]],
        indices: &mut [usize],
        depth: usize,
        nodes: &mut Vec<Node>,
    ) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }
        let axis = depth % DIM;
        indices.sort_by(|&a, &b| points[a][axis].partial_cmp(&points[b][axis]).unwrap());
        let median = indices.len() / 2;
        let point_index = indices[median];

        let left = Self::build(points, &mut indices[..median], depth + 1, nodes);
        let right = Self::build(points, &mut indices[median + 1..], depth + 1, nodes);

        nodes.push(Node {
            point_index,
            axis,
            left,
            right,
        });
        Some(nodes.len() - 1)
    }

    fn squared_distance(a: &[f64; DIM], b: &[f64; DIM]) -> f64 {
        (0..DIM).map(|d| (a[d] - b[d]).powi(2)).sum()
    }

    /// Returns up to `query_size` nearest neighbors of `query_point`,
    /// unordered. An empty tree yields an empty result.
    pub fn knn_search(&self, query_point: &[f64; DIM], query_size: usize) -> Vec<usize> {
        if query_size == 0 || self.points.is_empty() {
            return Vec::new();
        }
        if query_size >= self.points.len() {
            return (0..self.points.len()).collect();
        }
        // A small max-heap of (squared_distance, point_index), capped at
        // query_size entries.
        let mut heap: Vec<(f64, usize)> = Vec::with_capacity(query_size + 1);
        self.knn_visit(self.root, query_point, query_size, &mut heap);
        heap.into_iter().map(|(_, idx)| idx).collect()
    }

    fn knn_visit(
        &self,
        node: Option<usize>,
        query_point: &[f64; DIM],
        query_size: usize,
        heap: &mut Vec<(f64, usize)>,
    ) {
        let Some(node_index) = node else { return };
        let node = &self.nodes[node_index];
        let candidate = self.points[node.point_index];
        let d2 = Self::squared_distance(query_point, &candidate);

        if heap.len() < query_size {
            heap.push((d2, node.point_index));
            heap.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        } else if d2 < heap[0].0 {
            heap[0] = (d2, node.point_index);
            heap.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        }

        let diff = query_point[node.axis] - candidate[node.axis];
        let (near, far) = if diff <= 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.knn_visit(near, query_point, query_size, heap);

        let worst = heap.first().map(|(d, _)| *d).unwrap_or(f64::INFINITY);
        if heap.len() < query_size || diff * diff < worst {
            self.knn_visit(far, query_point, query_size, heap);
        }
    }

    /// The single nearest neighbor to `query_point`. Returns `None` if the
    /// tree is empty.
    pub fn nn_search(&self, query_point: &[f64; DIM]) -> Option<usize> {
        self.knn_search(query_point, 1).into_iter().next()
    }

    /// All points within `search_radius_squared` of `query_point`. If
    /// `sorted`, the result is ordered by increasing distance.
    pub fn radius_search(
        &self,
        query_point: &[f64; DIM],
        search_radius_squared: f64,
        sorted: bool,
    ) -> Vec<usize> {
        let mut result = Vec::new();
        self.radius_visit(self.root, query_point, search_radius_squared, &mut result);
        if sorted {
            result.sort_by(|&a, &b| {
                Self::squared_distance(query_point, &self.points[a])
                    .partial_cmp(&Self::squared_distance(query_point, &self.points[b]))
                    .unwrap()
            });
        }
        result
    }

    fn radius_visit(
        &self,
        node: Option<usize>,
        query_point: &[f64; DIM],
        search_radius_squared: f64,
        result: &mut Vec<usize>,
    ) {
        let Some(node_index) = node else { return };
        let node = &self.nodes[node_index];
        let candidate = self.points[node.point_index];
        if Self::squared_distance(query_point, &candidate) < search_radius_squared {
            result.push(node.point_index);
        }
        let diff = query_point[node.axis] - candidate[node.axis];
        let (near, far) = if diff <= 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.radius_visit(near, query_point, search_radius_squared, result);
        if diff * diff < search_radius_squared {
            self.radius_visit(far, query_point, search_radius_squared, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nn_search_on_empty_tree_returns_none() {
        let points: Vec<[f64; 3]> = Vec::new();
        let tree = KdTree::<3>::new(&points);
        assert_eq!(tree.nn_search(&[0.0, 0.0, 0.0]), None);
    }

    #[test]
    fn knn_search_of_empty_set_is_empty() {
        let points: Vec<[f64; 2]> = Vec::new();
        let tree = KdTree::<2>::new(&points);
        assert!(tree.knn_search(&[0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn nn_search_finds_closest_point() {
        let points = vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0]];
        let tree = KdTree::<3>::new(&points);
        let nearest = tree.nn_search(&[0.5, 0.5, 0.0]).unwrap();
        assert_eq!(nearest, 0);
    }

    #[test]
    fn knn_search_size_exceeding_point_count_returns_all() {
        let points = vec![[0.0, 0.0], [1.0, 1.0]];
        let tree = KdTree::<2>::new(&points);
        let mut result = tree.knn_search(&[0.0, 0.0], 10);
        result.sort();
        assert_eq!(result, vec![0, 1]);
    }

    #[test]
    fn radius_search_respects_radius() {
        let points = vec![[0.0, 0.0], [1.0, 0.0], [5.0, 0.0]];
        let tree = KdTree::<2>::new(&points);
        let mut within = tree.radius_search(&[0.0, 0.0], 2.0, true);
        within.sort();
        assert_eq!(within, vec![0, 1]);
    }
}
