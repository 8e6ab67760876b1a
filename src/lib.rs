//! A scene tiler: approximates the visible geometry of a point cloud,
//! sampled from an enclosed viewing volume, with a small set of textured
//! planar quads.
//!
//! # Crate layout
//!
//! - [`point_set`] — the borrowed, unowning input representation.
//! - [`geometry`] — planes, quads, the convex hull, Fibonacci-sphere
//!   sampling, the k-d tree, and the BVH raytracer (C1-C3).
//! - [`parallel`] — the two executor primitives every parallel stage is
//!   built on (C4).
//! - [`tiler`] — the partitioning pipeline: subdivision, geometry model
//!   fitting, partitioner stages, candidate tile generation, tile
//!   weighing, and final selection (C5-C10).
//! - [`support`] — runtime-facing consumption of a finished tile set: a
//!   per-tile [`support::Frame`] and an [`support::ImplicitSilhouette`]
//!   classifier (C11).
//!
//! [`run`] wires the above into the default pipeline and is the crate's
//! main entry point.

pub mod error;
pub mod geometry;
pub mod parallel;
pub mod point_set;
pub mod support;
pub mod tiler;

pub use error::Error;
pub use point_set::PointSet;
pub use tiler::tile::Tile;

use tiler::candidate_tile_generator::{CandidateTiles, ExhaustiveCandidateTileGenerator, ParallelCandidateTileGenerator};
use tiler::partitioner_stages::{
    CellBinding, DepthBasedRedistribution, GeometryModelRefinement, GreedyPointAssignment, Hierarchical,
    PartitionSplitting, PartitionerStage, RandomizedInitialization, RobustReinitializing, Sequential, StageContext,
};
use tiler::selection::{GreedySelectionSolver, SelectionSolver, SelectionTiler};
use tiler::solver::{DepthRange, GeometrySolver, RailDiskSolver, SubsetGeometrySolver};
use tiler::subdivision::{BoundsDilatingSubdivision, CubemapQuadtreeSubdivision, Subdivision};
use tiler::tile_weight_model::{CombinedTileWeightModel, DirectionalOverdrawTileWeightModel, ProjectedAreaTileWeightModel, TileWeightModel, TriangleCountTileWeightModel};

/// `kMaxPointsPerDiskFittingOptimization` from the source: caps the cost
/// of any single non-linear solve regardless of partition size.
const MAX_POINTS_PER_DISK_FITTING_OPTIMIZATION: usize = 250;

/// `kDilationFactor`, applied to the angle subtended by one subdivision
/// cell at the maximum depth to get the dilation angle used when growing
/// every cell's rails slightly, so adjacent tiles overlap rather than
/// leaving seams.
const DILATION_RADIANS: f64 = 1.5 * 2.0 * std::f64::consts::PI / (11.0 * 360.0);

/// The tunable knobs of a tiling run.
///
/// `Default` mirrors the source's own defaults; every field with a
/// non-obvious unit or constraint is commented at its definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// The number of tiles the final selection should keep, if the
    /// weight model used is proportional to tile count.
    pub tile_count: usize,
    /// How much more geometric error the selection solver will tolerate
    /// per unit of weight saved; directly multiplies the weight budget.
    pub overdraw_factor: f64,
    /// Extra budget reserved for [`DirectionalOverdrawTileWeightModel`]'s
    /// worst-case viewing direction, on top of `overdraw_factor`.
    pub peak_overdraw_factor: f64,
    /// The field of view (degrees) `DirectionalOverdrawTileWeightModel`
    /// assumes when sampling worst-case directions.
    pub peak_overdraw_field_of_view_degrees: f64,
    /// How many directions `DirectionalOverdrawTileWeightModel` samples
    /// per tile.
    pub peak_overdraw_samples: usize,
    /// The radius (world units) of the sphere the viewer's head is
    /// assumed to stay within.
    pub headbox_radius: f64,
    /// The radius (world units) of the sphere bounding the whole scene;
    /// also the depth of the far subdivision bound.
    pub skybox_radius: f64,
    /// Thread count for every parallel stage. Must be at least 1.
    pub thread_count: usize,
    /// The shallowest subdivision depth considered during initial
    /// partitioning (coarser faces get merged into deeper ones).
    pub min_subdivision_level: u32,
    /// The deepest subdivision depth; must be at most 14.
    pub max_subdivision_level: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            tile_count: 1024,
            overdraw_factor: 3.0,
            peak_overdraw_factor: 1.5,
            peak_overdraw_field_of_view_degrees: 120.0,
            peak_overdraw_samples: 16,
            headbox_radius: 1.0,
            skybox_radius: 10.0,
            thread_count: parallel::number_of_hardware_threads(),
            min_subdivision_level: 4,
            max_subdivision_level: 10,
        }
    }
}

impl Parameters {
    /// Validates the *Configuration* invariants: the ones that are
    /// programming errors on the caller's part and should never be
    /// recovered from silently.
    pub fn validate(&self) -> error::Result<()> {
        if self.thread_count == 0 {
            return Err(Error::ZeroThreadCount);
        }
        if self.max_subdivision_level > 14 || self.min_subdivision_level > self.max_subdivision_level {
            return Err(Error::SubdivisionDepthOutOfRange {
                min_subdivision_level: self.min_subdivision_level,
                max_subdivision_level: self.max_subdivision_level,
            });
        }
        Ok(())
    }
}

/// Runs the default tiling pipeline over `points`, producing at most
/// `parameters.tile_count`-worth of tiles under the configured weight
/// model.
///
/// This wires together the same stages the source's `TilerFactory` does:
/// an initial depth-based redistribution and refit, a splitting pass that
/// grows toward the target partition count, assignment/refit rounds, a
/// final plane-only refit, and a `RobustReinitializing` wrapper around the
/// whole thing that falls back to a from-scratch hierarchical build if a
/// stage ever leaves a different number of partitions than it started
/// with. A `CellBinding` pass follows every stage that can change a
/// partition's center or normal, so every non-empty partition always has a
/// real subdivision cell by the time candidates are resolved.
pub fn run(points: &PointSet<'_>, parameters: &Parameters) -> error::Result<Vec<Tile>> {
    let span = tracing::debug_span!("run", points = points.len(), tile_count = parameters.tile_count);
    let _entered = span.enter();

    parameters.validate()?;
    points.check_spans()?;

    if points.is_empty() {
        tracing::debug!("point set is empty, returning no tiles");
        return Ok(Vec::new());
    }

    let mut subdivision = BoundsDilatingSubdivision::new(
        DILATION_RADIANS,
        CubemapQuadtreeSubdivision::new(parameters.max_subdivision_level),
    );
    subdivision.init(points);

    let depth_range = DepthRange::from_headbox_and_skybox(parameters.headbox_radius, parameters.skybox_radius);
    let disk_solver = RailDiskSolver::new(0.01, depth_range);
    let plane_solver = RailDiskSolver::new(0.0, depth_range);
    let subset_disk_solver =
        SubsetGeometrySolver::new(MAX_POINTS_PER_DISK_FITTING_OPTIMIZATION, RailDiskSolver::new(0.01, depth_range));

    let ctx = StageContext {
        points,
        subdivision: &subdivision,
        solver: &disk_solver,
        thread_count: parameters.thread_count,
    };
    let initial_ctx = StageContext {
        points,
        subdivision: &subdivision,
        solver: &subset_disk_solver,
        thread_count: parameters.thread_count,
    };

    let regular_stage = || -> Box<dyn PartitionerStage + Send + Sync> {
        Box::new(Sequential::new(vec![
            Box::new(PartitionSplitting {
                target_partition_count: parameters.tile_count,
            }),
            Box::new(CellBinding),
            Box::new(GeometryModelRefinement),
            Box::new(GreedyPointAssignment { candidate_count: 8 }),
            Box::new(CellBinding),
            Box::new(GeometryModelRefinement),
        ]))
    };

    let initial_stage: Box<dyn PartitionerStage + Send + Sync> = Box::new(Sequential::new(vec![
        Box::new(DepthBasedRedistribution),
        Box::new(CellBinding),
        Box::new(GeometryModelRefinement),
    ]));

    let reinitializing_stage: Box<dyn PartitionerStage + Send + Sync> = Box::new(Hierarchical::new(
        2,
        Box::new(Sequential::new(vec![
            Box::new(RandomizedInitialization {
                partition_count: 2,
                rng_seed: 0x5EA747,
            }),
            Box::new(CellBinding),
            Box::new(GreedyPointAssignment { candidate_count: 2 }),
        ])),
        regular_stage(),
    ));

    let pipeline = RobustReinitializing::new(reinitializing_stage, regular_stage());

    let seeded = RandomizedInitialization {
        partition_count: parameters.tile_count.max(1),
        rng_seed: 0x5EA747,
    }
    .apply(&initial_ctx, Vec::new());
    let after_initial = initial_stage.apply(&initial_ctx, seeded);
    let mut partitions = pipeline.apply(&ctx, after_initial);

    // Final refit with tangential_factor = 0.0: the last pass is a pure
    // plane fit, not a graduated-non-convexity disk fit.
    for partition in &mut partitions {
        plane_solver.fit_model(points, &subdivision, partition);
    }
    partitions = CellBinding.apply(&ctx, partitions);

    let candidates: CandidateTiles = if parameters.thread_count > 1 {
        ParallelCandidateTileGenerator::generate(parameters.thread_count, &subdivision, &partitions)
    } else {
        ExhaustiveCandidateTileGenerator::generate(&subdivision, &partitions)
    };
    tracing::debug!(resolved_tiles = candidates.tiles.len(), total_error = candidates.total_error, "candidate tiles resolved");

    let triangle_model = TriangleCountTileWeightModel;
    let area_model = ProjectedAreaTileWeightModel;
    let overdraw_model = DirectionalOverdrawTileWeightModel::build(
        &candidates.tiles,
        parameters.peak_overdraw_samples,
        parameters.peak_overdraw_field_of_view_degrees.to_radians(),
        parameters.headbox_radius,
    );
    let combined = CombinedTileWeightModel::new(vec![
        (Box::new(triangle_model), 1.0),
        (Box::new(area_model), parameters.overdraw_factor),
        (Box::new(overdraw_model), parameters.peak_overdraw_factor),
    ]);

    let selection_solver = GreedySelectionSolver;
    let tiler = SelectionTiler {
        weight_model: &combined as &dyn TileWeightModel,
        selection_solver: &selection_solver as &dyn SelectionSolver,
        triangle_budget: parameters.tile_count as f64 * 2.0,
    };
    let selected = tiler.run(&candidates);
    tracing::debug!(selected_tiles = selected.len(), "tile selection complete");

    Ok(selected)
}
