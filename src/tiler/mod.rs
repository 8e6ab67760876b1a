//! The tiling pipeline: partitioning a `PointSet` into `BuildPartition`s and
//! resolving each into a `Tile` (C4-C10).

pub mod build_partition;
pub mod candidate_tile_generator;
pub mod geometry_model;
pub mod partitioner_stages;
pub mod selection;
pub mod solver;
pub mod subdivision;
pub mod tile;
pub mod tile_resolver;
pub mod tile_weight_model;
