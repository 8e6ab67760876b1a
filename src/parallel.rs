//! Parallel executor primitives over integer ranges (C4).
//!
//! Both primitives block until every invocation of `f` has completed and may
//! be called reentrantly: rayon's work-stealing scheduler lets a worker pick
//! up other tasks while blocked inside a nested scope, so nesting one of
//! these inside `f` does not deadlock.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Distributes `[0, count)` across `thread_count` workers, each one handling
/// indices strided by `thread_count` (`i, i + thread_count, i + 2*thread_count,
/// ...`). Use this when each invocation costs about the same.
pub fn parallel_for(thread_count: usize, count: usize, f: impl Fn(usize) + Sync) {
    let thread_count = thread_count.max(1);
    rayon::scope(|scope| {
        for thread_index in 0..thread_count {
            let f = &f;
            scope.spawn(move |_| {
                let mut i = thread_index;
                while i < count {
                    f(i);
                    i += thread_count;
                }
            });
        }
    });
}

/// Like [`parallel_for`], but balances work across threads via a shared
/// atomic cursor instead of a fixed stride: each worker repeatedly
/// fetch-adds to obtain the next index until the range is exhausted. Use
/// this when per-iteration cost varies, as it does per subdivision cell in
/// the candidate tile generator.
pub fn balanced_parallel_for(thread_count: usize, count: usize, f: impl Fn(usize) + Sync) {
    let thread_count = thread_count.max(1);
    let next_index = AtomicUsize::new(0);
    rayon::scope(|scope| {
        for _ in 0..thread_count {
            let f = &f;
            let next_index = &next_index;
            scope.spawn(move |_| loop {
                let i = next_index.fetch_add(1, Ordering::Relaxed);
                if i >= count {
                    return;
                }
                f(i);
            });
        }
    });
}

/// Returns a thread count that is always at least 1, mirroring
/// `GetNumberOfHardwareThreads`'s guarantee that the standard library's
/// notion of "not computable" never propagates as zero.
pub fn number_of_hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A raw pointer asserted to be safe to share across threads, for callers
/// that split a slice into disjoint per-index writes (as
/// `canonicalize_partitions` and `GreedyPointAssignment` do) and need to
/// hand that pointer into a `Fn() + Sync` closure.
#[derive(Clone, Copy)]
pub struct DisjointWritePtr<T>(pub *mut T);

unsafe impl<T> Send for DisjointWritePtr<T> {}
unsafe impl<T> Sync for DisjointWritePtr<T> {}

impl<T> DisjointWritePtr<T> {
    /// # Safety
    /// The caller must ensure that every use of the returned pointer across
    /// threads writes to disjoint elements of the same allocation.
    pub unsafe fn add(self, count: usize) -> *mut T {
        self.0.add(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn parallel_for_visits_every_index_exactly_once() {
        let seen = Mutex::new(vec![false; 97]);
        parallel_for(8, 97, |i| {
            seen.lock().unwrap()[i] = true;
        });
        assert!(seen.into_inner().unwrap().into_iter().all(|v| v));
    }

    #[test]
    fn balanced_parallel_for_visits_every_index_exactly_once() {
        let seen = Mutex::new(vec![false; 97]);
        balanced_parallel_for(8, 97, |i| {
            seen.lock().unwrap()[i] = true;
        });
        assert!(seen.into_inner().unwrap().into_iter().all(|v| v));
    }

    #[test]
    fn empty_range_runs_nothing() {
        parallel_for(4, 0, |_| panic!("should not run"));
        balanced_parallel_for(4, 0, |_| panic!("should not run"));
    }

    #[test]
    fn nested_parallel_for_does_not_deadlock() {
        parallel_for(4, 4, |_| {
            parallel_for(4, 4, |_| {});
        });
    }
}
