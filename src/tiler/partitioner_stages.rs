//! Composable partitioning stages (C7): each stage takes a set of
//! `BuildPartition`s and returns a refined set, so stages compose into
//! pipelines via [`Sequential`], [`Iterative`] and [`Hierarchical`].

use crate::parallel;
use crate::point_set::PointSet;
use crate::tiler::build_partition::{canonicalize_partitions, BuildPartition};
use crate::tiler::geometry_model::GeometryModel;
use crate::tiler::solver::GeometrySolver;
use crate::tiler::subdivision::Subdivision;
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};

/// The shared, read-only context every stage runs against.
pub struct StageContext<'a> {
    pub points: &'a PointSet<'a>,
    pub subdivision: &'a dyn Subdivision,
    pub solver: &'a dyn GeometrySolver,
    pub thread_count: usize,
}

/// One step of a partitioner pipeline: consumes a set of partitions,
/// produces a (possibly differently-sized) refined set.
pub trait PartitionerStage {
    fn apply(&self, ctx: &StageContext, partitions: Vec<BuildPartition>) -> Vec<BuildPartition>;
}

/// Seeds `partition_count` partitions from uniformly-chosen points of the
/// full `PointSet`, deterministic given `rng_seed`.
pub struct RandomizedInitialization {
    pub partition_count: usize,
    pub rng_seed: u64,
}

impl PartitionerStage for RandomizedInitialization {
    fn apply(&self, ctx: &StageContext, _partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        if ctx.points.is_empty() || self.partition_count == 0 {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(self.rng_seed);
        let positions = ctx.points.positions();
        (0..self.partition_count)
            .map(|_| {
                let i = rng.gen_range(0..positions.len());
                let normal = if positions[i].coords.norm() > 0.0 {
                    positions[i].coords.normalize()
                } else {
                    nalgebra::Vector3::z()
                };
                BuildPartition::new(GeometryModel::new(-1, positions[i], normal))
            })
            .collect()
    }
}

/// Refits every partition's `GeometryModel` via `ctx.solver`.
pub struct GeometryModelRefinement;

impl PartitionerStage for GeometryModelRefinement {
    fn apply(&self, ctx: &StageContext, mut partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        for partition in &mut partitions {
            ctx.solver.fit_model(ctx.points, ctx.subdivision, partition);
        }
        partitions
    }
}

/// Assigns every point of the full `PointSet` to whichever of
/// `candidate_count` nearby partitions (by center) best explains it.
///
/// A point with no partition offering a finite error is dropped, not
/// force-assigned to the least-bad option: a handful of points near a
/// numerically degenerate model simply do not appear in any tile. This
/// mirrors the source and is intentional, not a bug to "fix".
pub struct GreedyPointAssignment {
    pub candidate_count: usize,
}

impl PartitionerStage for GreedyPointAssignment {
    fn apply(&self, ctx: &StageContext, mut partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        if partitions.is_empty() {
            return partitions;
        }
        for partition in &mut partitions {
            partition.clear();
        }

        let centers: Vec<[f64; 3]> = partitions
            .iter()
            .map(|p| {
                let c = p.model().center;
                [c.x, c.y, c.z]
            })
            .collect();
        let tree = crate::geometry::KdTree::<3>::new(&centers);
        let candidate_count = self.candidate_count.max(1).min(partitions.len());

        let positions = ctx.points.positions();
        let mut assignment: Vec<Option<(usize, f64)>> = vec![None; positions.len()];
        let ptr = parallel::DisjointWritePtr(assignment.as_mut_ptr());
        // SAFETY: each index `i` is visited by exactly one worker and
        // writes only to `assignment[i]`.
        parallel::balanced_parallel_for(ctx.thread_count, positions.len(), |i| {
            let p = positions[i];
            let candidates = tree.knn_search(&[p.x, p.y, p.z], candidate_count);
            let mut best: Option<(usize, f64)> = None;
            for &c in &candidates {
                let error = ctx.solver.compute_error(ctx.points, partitions[c].model(), i);
                if !error.is_finite() {
                    continue;
                }
                if best.map_or(true, |(_, best_error)| error < best_error) {
                    best = Some((c, error));
                }
            }
            unsafe {
                *ptr.add(i) = best;
            }
        });

        for (i, assignment) in assignment.into_iter().enumerate() {
            if let Some((partition_index, error)) = assignment {
                partitions[partition_index].add_point(i, error);
            }
        }
        canonicalize_partitions(ctx.thread_count, &mut partitions);
        partitions
    }
}

/// Binds every non-empty partition's model to the `Subdivision` leaf cell
/// containing its normal direction.
///
/// Nothing else in the pipeline assigns a real cell: seeding leaves it at
/// `-1`, and splitting or refitting only ever carries the existing value
/// forward. Without this stage every model stays unbound, the rail-penalty
/// residual in [`super::solver::RailDiskSolver`] degrades to a constant
/// term, and [`super::candidate_tile_generator`] skips every partition
/// outright.
pub struct CellBinding;

impl PartitionerStage for CellBinding {
    fn apply(&self, ctx: &StageContext, mut partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        for partition in &mut partitions {
            if partition.is_empty() {
                continue;
            }
            let model = *partition.model();
            let cell = ctx.subdivision.find_leaf(model.normal);
            partition.set_model(GeometryModel::new(cell, model.center, model.normal));
        }
        partitions
    }
}

/// Splits the highest-error partition along the longest axis of its
/// points' bounding box, repeating until `target_partition_count`
/// partitions exist (or no splittable partition remains).
pub struct PartitionSplitting {
    pub target_partition_count: usize,
}

impl PartitionerStage for PartitionSplitting {
    fn apply(&self, ctx: &StageContext, mut partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        while partitions.len() < self.target_partition_count {
            let Some((worst_index, _)) = partitions
                .iter()
                .enumerate()
                .filter(|(_, p)| p.point_indices().len() >= 2)
                .max_by(|a, b| a.1.total_error().partial_cmp(&b.1.total_error()).unwrap())
            else {
                break;
            };

            let worst = partitions.swap_remove(worst_index);
            let positions = ctx.points.positions();
            let indices = worst.point_indices();

            let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
            let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
            for &i in indices {
                let p = positions[i];
                min = Point3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
                max = Point3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
            }
            let extent = max - min;
            let axis = if extent.x >= extent.y && extent.x >= extent.z {
                0
            } else if extent.y >= extent.z {
                1
            } else {
                2
            };
            let pivot = (min[axis] + max[axis]) / 2.0;

            let mut a = BuildPartition::new(*worst.model());
            let mut b = BuildPartition::new(*worst.model());
            for &i in indices {
                if positions[i][axis] <= pivot {
                    a.add_point(i, 0.0);
                } else {
                    b.add_point(i, 0.0);
                }
            }
            for split in [&mut a, &mut b] {
                if !split.is_empty() {
                    split.set_model(ctx.solver.initialize_model(ctx.points, split));
                }
            }
            partitions.push(a);
            partitions.push(b);
        }
        partitions
    }
}

/// Moves each point to a neighboring partition if that partition's model
/// explains it strictly better, then refits and re-canonicalizes.
pub struct PointExchange;

impl PartitionerStage for PointExchange {
    fn apply(&self, ctx: &StageContext, mut partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        if partitions.len() < 2 {
            return partitions;
        }
        let mut moves = Vec::new();
        for (from, partition) in partitions.iter().enumerate() {
            for &i in partition.point_indices() {
                let current_error = ctx.solver.compute_error(ctx.points, partition.model(), i);
                for (to, other) in partitions.iter().enumerate() {
                    if to == from {
                        continue;
                    }
                    let candidate_error = ctx.solver.compute_error(ctx.points, other.model(), i);
                    if candidate_error.is_finite() && candidate_error < current_error {
                        moves.push((i, from, to, candidate_error));
                        break;
                    }
                }
            }
        }

        for (point_index, from, to, error) in moves {
            let from_points: Vec<usize> = partitions[from]
                .point_indices()
                .iter()
                .copied()
                .filter(|&p| p != point_index)
                .collect();
            let model = *partitions[from].model();
            let mut rebuilt = BuildPartition::new(model);
            for p in from_points {
                rebuilt.add_point(p, 0.0);
            }
            partitions[from] = rebuilt;
            partitions[to].add_point(point_index, error);
        }
        canonicalize_partitions(ctx.thread_count, &mut partitions);
        partitions
    }
}

/// Redistributes every point of the full `PointSet` across existing
/// partitions by depth (distance from the origin), special-casing the
/// 1- and 2-partition counts exactly as the source does.
pub struct DepthBasedRedistribution;

impl PartitionerStage for DepthBasedRedistribution {
    fn apply(&self, ctx: &StageContext, mut partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        if partitions.is_empty() {
            return partitions;
        }
        for partition in &mut partitions {
            partition.clear();
        }
        let positions = ctx.points.positions();
        let mut by_depth: Vec<usize> = (0..positions.len()).collect();
        by_depth.sort_by(|&a, &b| positions[a].coords.norm().partial_cmp(&positions[b].coords.norm()).unwrap());

        match partitions.len() {
            1 => {
                for &i in &by_depth {
                    partitions[0].add_point(i, 0.0);
                }
            }
            2 => {
                let mid = by_depth.len() / 2;
                for &i in &by_depth[..mid] {
                    partitions[0].add_point(i, 0.0);
                }
                for &i in &by_depth[mid..] {
                    partitions[1].add_point(i, 0.0);
                }
            }
            n => {
                for (rank, &i) in by_depth.iter().enumerate() {
                    let bucket = (rank * n / by_depth.len().max(1)).min(n - 1);
                    partitions[bucket].add_point(i, 0.0);
                }
            }
        }
        canonicalize_partitions(ctx.thread_count, &mut partitions);
        partitions
    }
}

/// Runs `primary`; if it hands back a different number of partitions than
/// it started with (the signature of a degenerate split or an assignment
/// that dropped an entire partition), logs one gated warning for the whole
/// run and falls back to `fallback`'s result instead.
pub struct RobustReinitializing {
    primary: Box<dyn PartitionerStage + Send + Sync>,
    fallback: Box<dyn PartitionerStage + Send + Sync>,
    warned: AtomicBool,
}

impl RobustReinitializing {
    pub fn new(
        primary: Box<dyn PartitionerStage + Send + Sync>,
        fallback: Box<dyn PartitionerStage + Send + Sync>,
    ) -> Self {
        RobustReinitializing {
            primary,
            fallback,
            warned: AtomicBool::new(false),
        }
    }
}

impl PartitionerStage for RobustReinitializing {
    fn apply(&self, ctx: &StageContext, partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        let starting_count = partitions.len();
        let primary_input = partitions.clone();
        let result = self.primary.apply(ctx, primary_input);
        if result.len() == starting_count {
            return result;
        }
        if self.warned.compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
            tracing::warn!(
                starting_count,
                produced_count = result.len(),
                "partitioner stage changed the partition count; reinitializing"
            );
        }
        self.fallback.apply(ctx, partitions)
    }
}

/// Runs a fixed sequence of stages, threading partitions through in order.
pub struct Sequential {
    stages: Vec<Box<dyn PartitionerStage + Send + Sync>>,
}

impl Sequential {
    pub fn new(stages: Vec<Box<dyn PartitionerStage + Send + Sync>>) -> Self {
        Sequential { stages }
    }
}

impl PartitionerStage for Sequential {
    fn apply(&self, ctx: &StageContext, mut partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        for stage in &self.stages {
            partitions = stage.apply(ctx, partitions);
        }
        partitions
    }
}

/// Runs a single stage a fixed number of times.
pub struct Iterative {
    stage: Box<dyn PartitionerStage + Send + Sync>,
    iterations: usize,
}

impl Iterative {
    pub fn new(stage: Box<dyn PartitionerStage + Send + Sync>, iterations: usize) -> Self {
        Iterative { stage, iterations }
    }
}

impl PartitionerStage for Iterative {
    fn apply(&self, ctx: &StageContext, mut partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        for _ in 0..self.iterations {
            partitions = self.stage.apply(ctx, partitions);
        }
        partitions
    }
}

/// Builds a coarse set of `branching_factor` partitions with `coarse`,
/// then refines each independently with `fine`, concatenating the results.
pub struct Hierarchical {
    branching_factor: usize,
    coarse: Box<dyn PartitionerStage + Send + Sync>,
    fine: Box<dyn PartitionerStage + Send + Sync>,
}

impl Hierarchical {
    pub fn new(
        branching_factor: usize,
        coarse: Box<dyn PartitionerStage + Send + Sync>,
        fine: Box<dyn PartitionerStage + Send + Sync>,
    ) -> Self {
        Hierarchical {
            branching_factor,
            coarse,
            fine,
        }
    }
}

impl PartitionerStage for Hierarchical {
    fn apply(&self, ctx: &StageContext, partitions: Vec<BuildPartition>) -> Vec<BuildPartition> {
        let coarse_partitions = self.coarse.apply(ctx, partitions);
        let mut result = Vec::new();
        for partition in coarse_partitions {
            if partition.is_empty() {
                result.push(partition);
                continue;
            }
            let _ = self.branching_factor;
            let refined = self.fine.apply(ctx, vec![partition]);
            result.extend(refined);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiler::solver::{DepthRange, RailDiskSolver};
    use crate::tiler::subdivision::CubemapQuadtreeSubdivision;
    use nalgebra::Vector3;

    fn wide_depth_range() -> DepthRange {
        DepthRange::new(0.0, 1e6)
    }

    fn sphere_points(n: usize) -> Vec<Point3<f64>> {
        (0..n)
            .map(|i| {
                let v = crate::geometry::generate_fibonacci_sphere_point(n, 0.0, i);
                Point3::new(v.x, v.y, v.z)
            })
            .collect()
    }

    #[test]
    fn greedy_assignment_covers_every_point_with_enough_partitions() {
        let positions = sphere_points(200);
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let mut subdivision = CubemapQuadtreeSubdivision::new(2);
        subdivision.init(&points);
        let solver = RailDiskSolver::new(0.0, wide_depth_range());
        let ctx = StageContext {
            points: &points,
            subdivision: &subdivision,
            solver: &solver,
            thread_count: 2,
        };

        let init = RandomizedInitialization {
            partition_count: 6,
            rng_seed: 42,
        };
        let partitions = init.apply(&ctx, Vec::new());
        let assigned = GreedyPointAssignment { candidate_count: 3 }.apply(&ctx, partitions);

        let total: usize = assigned.iter().map(|p| p.point_indices().len()).sum();
        assert_eq!(total, positions.len());
    }

    #[test]
    fn splitting_grows_toward_target_count() {
        let positions = sphere_points(64);
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let mut subdivision = CubemapQuadtreeSubdivision::new(2);
        subdivision.init(&points);
        let solver = RailDiskSolver::new(0.0, wide_depth_range());
        let ctx = StageContext {
            points: &points,
            subdivision: &subdivision,
            solver: &solver,
            thread_count: 1,
        };

        let mut single = BuildPartition::new(GeometryModel::new(-1, Point3::origin(), Vector3::z()));
        for i in 0..positions.len() {
            single.add_point(i, 0.0);
        }
        let split = PartitionSplitting {
            target_partition_count: 4,
        };
        let result = split.apply(&ctx, vec![single]);
        assert_eq!(result.len(), 4);
        let total: usize = result.iter().map(|p| p.point_indices().len()).sum();
        assert_eq!(total, positions.len());
    }

    #[test]
    fn depth_redistribution_splits_two_partitions_by_depth() {
        let positions = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(11.0, 0.0, 0.0),
        ];
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let mut subdivision = CubemapQuadtreeSubdivision::new(1);
        subdivision.init(&points);
        let solver = RailDiskSolver::new(0.0, wide_depth_range());
        let ctx = StageContext {
            points: &points,
            subdivision: &subdivision,
            solver: &solver,
            thread_count: 1,
        };
        let partitions = vec![
            BuildPartition::new(GeometryModel::default()),
            BuildPartition::new(GeometryModel::default()),
        ];
        let result = DepthBasedRedistribution.apply(&ctx, partitions);
        assert_eq!(result[0].point_indices(), &[0, 1]);
        assert_eq!(result[1].point_indices(), &[2, 3]);
    }

    #[test]
    fn sequential_runs_stages_in_order() {
        let positions = sphere_points(50);
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let mut subdivision = CubemapQuadtreeSubdivision::new(1);
        subdivision.init(&points);
        let solver = RailDiskSolver::new(0.0, wide_depth_range());
        let ctx = StageContext {
            points: &points,
            subdivision: &subdivision,
            solver: &solver,
            thread_count: 1,
        };

        let pipeline = Sequential::new(vec![
            Box::new(RandomizedInitialization {
                partition_count: 4,
                rng_seed: 1,
            }),
            Box::new(GreedyPointAssignment { candidate_count: 2 }),
            Box::new(GeometryModelRefinement),
        ]);
        let result = pipeline.apply(&ctx, Vec::new());
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn cell_binding_assigns_a_real_cell_to_every_non_empty_partition() {
        let positions = sphere_points(200);
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let mut subdivision = CubemapQuadtreeSubdivision::new(2);
        subdivision.init(&points);
        let solver = RailDiskSolver::new(0.0, wide_depth_range());
        let ctx = StageContext {
            points: &points,
            subdivision: &subdivision,
            solver: &solver,
            thread_count: 2,
        };

        let seeded = RandomizedInitialization {
            partition_count: 6,
            rng_seed: 42,
        }
        .apply(&ctx, Vec::new());
        let assigned = GreedyPointAssignment { candidate_count: 3 }.apply(&ctx, seeded);
        let bound = CellBinding.apply(&ctx, assigned);

        for partition in &bound {
            if partition.is_empty() {
                continue;
            }
            assert!(partition.model().cell >= 0, "non-empty partition must be bound to a real cell");
        }
    }

    #[test]
    fn cell_binding_leaves_empty_partitions_unbound() {
        let positions = sphere_points(50);
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let mut subdivision = CubemapQuadtreeSubdivision::new(1);
        subdivision.init(&points);
        let solver = RailDiskSolver::new(0.0, wide_depth_range());
        let ctx = StageContext {
            points: &points,
            subdivision: &subdivision,
            solver: &solver,
            thread_count: 1,
        };

        let empty = vec![BuildPartition::new(GeometryModel::default())];
        let bound = CellBinding.apply(&ctx, empty);
        assert_eq!(bound[0].model().cell, -1);
    }

    #[test]
    fn iterative_runs_the_stage_the_requested_number_of_times() {
        let positions = sphere_points(50);
        let points = PointSet::new(1, &positions, &[], &[], &[]);
        let mut subdivision = CubemapQuadtreeSubdivision::new(1);
        subdivision.init(&points);
        let solver = RailDiskSolver::new(0.0, wide_depth_range());
        let ctx = StageContext {
            points: &points,
            subdivision: &subdivision,
            solver: &solver,
            thread_count: 1,
        };

        let seeded = RandomizedInitialization {
            partition_count: 4,
            rng_seed: 1,
        }
        .apply(&ctx, Vec::new());

        let pipeline = Iterative::new(Box::new(GreedyPointAssignment { candidate_count: 2 }), 3);
        let result = pipeline.apply(&ctx, seeded);
        assert_eq!(result.len(), 4);
    }
}
