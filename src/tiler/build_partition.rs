//! One cluster of point indices with its associated `GeometryModel` and
//! incrementally-maintained error statistics.

use crate::parallel;
use crate::tiler::geometry_model::GeometryModel;

/// A cluster of point indices, the `GeometryModel` fit to them, and running
/// error statistics (worst-fit, best-fit, total).
///
/// Ties on worst-fit resolve to the larger index, on best-fit to the
/// smaller index, so that results are independent of the order points were
/// added in.
#[derive(Debug, Clone)]
pub struct BuildPartition {
    model: GeometryModel,
    point_indices: Vec<usize>,
    worst_fit_index: i64,
    worst_fit_error: f64,
    best_fit_index: i64,
    best_fit_error: f64,
    total_error: f64,
}

impl BuildPartition {
    pub fn new(model: GeometryModel) -> Self {
        BuildPartition {
            model,
            point_indices: Vec::new(),
            worst_fit_index: -1,
            worst_fit_error: f64::NEG_INFINITY,
            best_fit_index: -1,
            best_fit_error: f64::INFINITY,
            total_error: 0.0,
        }
    }

    /// Drops all points and resets error bookkeeping; the `GeometryModel`
    /// is left unchanged.
    pub fn clear(&mut self) {
        self.point_indices.clear();
        self.worst_fit_index = -1;
        self.worst_fit_error = f64::NEG_INFINITY;
        self.best_fit_index = -1;
        self.best_fit_error = f64::INFINITY;
        self.total_error = 0.0;
    }

    pub fn model(&self) -> &GeometryModel {
        &self.model
    }

    pub fn set_model(&mut self, model: GeometryModel) {
        self.model = model;
    }

    pub fn point_indices(&self) -> &[usize] {
        &self.point_indices
    }

    pub fn is_empty(&self) -> bool {
        self.point_indices.is_empty()
    }

    pub fn total_error(&self) -> f64 {
        self.total_error
    }

    /// The point index with largest per-point error so far, or `None`.
    pub fn worst_fit_point(&self) -> Option<usize> {
        if self.worst_fit_index >= 0 {
            Some(self.worst_fit_index as usize)
        } else {
            None
        }
    }

    /// The point index with smallest per-point error so far, or `None`.
    pub fn best_fit_point(&self) -> Option<usize> {
        if self.best_fit_index >= 0 {
            Some(self.best_fit_index as usize)
        } else {
            None
        }
    }

    /// Records `point_index` with the given per-point `error`, updating the
    /// worst/best-fit bookkeeping and total error.
    pub fn add_point(&mut self, point_index: usize, error: f64) {
        self.point_indices.push(point_index);
        self.total_error += error;

        let idx = point_index as i64;
        if error > self.worst_fit_error || (error == self.worst_fit_error && idx > self.worst_fit_index) {
            self.worst_fit_error = error;
            self.worst_fit_index = idx;
        }
        if error < self.best_fit_error || (error == self.best_fit_error && idx < self.best_fit_index) {
            self.best_fit_error = error;
            self.best_fit_index = idx;
        }
    }

    /// Sorts `point_indices` ascending, giving a canonical form independent
    /// of insertion order.
    pub fn canonicalize(&mut self) {
        self.point_indices.sort_unstable();
    }

    /// Canonical-form equality: sorted indices plus exact `GeometryModel`
    /// equality. Both partitions must already be canonicalized.
    pub fn canonical_eq(&self, other: &BuildPartition) -> bool {
        self.model == other.model && self.point_indices == other.point_indices
    }
}

/// Canonicalizes every partition in parallel, mirroring the "canonicalize
/// after per-thread accumulation" discipline required by every stage that
/// touches multiple partitions concurrently.
pub fn canonicalize_partitions(thread_count: usize, partitions: &mut [BuildPartition]) {
    // `parallel_for` requires `Sync` closures; partitions are split up front
    // so each worker only ever touches disjoint slices.
    let ptr = parallel::DisjointWritePtr(partitions.as_mut_ptr());
    let len = partitions.len();
    // SAFETY: each index `i` in `[0, len)` is visited by exactly one
    // worker, and `BuildPartition::canonicalize` only mutates the partition
    // at that index.
    parallel::parallel_for(thread_count, len, |i| unsafe {
        (*ptr.add(i)).canonicalize();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_fit_tie_prefers_larger_index() {
        let mut bp = BuildPartition::new(GeometryModel::default());
        bp.add_point(3, 5.0);
        bp.add_point(7, 5.0);
        assert_eq!(bp.worst_fit_point(), Some(7));
    }

    #[test]
    fn best_fit_tie_prefers_smaller_index() {
        let mut bp = BuildPartition::new(GeometryModel::default());
        bp.add_point(7, 1.0);
        bp.add_point(3, 1.0);
        assert_eq!(bp.best_fit_point(), Some(3));
    }

    #[test]
    fn clear_resets_bookkeeping() {
        let mut bp = BuildPartition::new(GeometryModel::default());
        bp.add_point(0, 1.0);
        bp.clear();
        assert!(bp.is_empty());
        assert_eq!(bp.total_error(), 0.0);
        assert_eq!(bp.worst_fit_point(), None);
        assert_eq!(bp.best_fit_point(), None);
    }

    #[test]
    fn canonicalize_is_idempotent_and_order_independent() {
        let mut a = BuildPartition::new(GeometryModel::default());
        a.add_point(3, 1.0);
        a.add_point(1, 1.0);
        a.add_point(2, 1.0);
        let mut b = BuildPartition::new(GeometryModel::default());
        b.add_point(1, 1.0);
        b.add_point(2, 1.0);
        b.add_point(3, 1.0);

        a.canonicalize();
        b.canonicalize();
        assert!(a.canonical_eq(&b));

        let before = a.point_indices().to_vec();
        a.canonicalize();
        assert_eq!(a.point_indices(), before.as_slice());
    }

    #[test]
    fn total_error_accumulates() {
        let mut bp = BuildPartition::new(GeometryModel::default());
        bp.add_point(0, 1.0);
        bp.add_point(1, 2.5);
        assert_eq!(bp.total_error(), 3.5);
    }
}
