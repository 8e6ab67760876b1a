//! Command-line entry point: reads a point cloud, runs the tiler, and
//! writes the resulting quads.
//!
//! Point cloud format is a plain whitespace-separated text file, one point
//! per line:
//!
//! ```text
//! x y z [nx ny nz [r g b [w]]]
//! ```
//!
//! Every line must have the same number of columns: 3 (positions only), 6
//! (+ normals), 9 (+ colors), or 10 (+ weight). Blank lines and lines
//! starting with `#` are ignored.
//!
//! Output is one resolved tile per line:
//!
//! ```text
//! cell x0 y0 z0 x1 y1 z1 x2 y2 z2 x3 y3 z3
//! ```

use anyhow::{bail, Context as _, Result};
use nalgebra::{Point3, Vector3};
use seurat_tiler::{run, Parameters, PointSet};
use std::env;
use std::fs;
use std::io::Write as _;

const USAGE: &str = "Usage: tile [options]";

struct PointCloud {
    positions: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    colors: Vec<[f32; 3]>,
    weights: Vec<f64>,
}

fn parse_point_cloud(contents: &str) -> Result<PointCloud> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut colors = Vec::new();
    let mut weights = Vec::new();

    for (line_number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<f64> = line
            .split_ascii_whitespace()
            .map(|field| field.parse::<f64>())
            .collect::<Result<_, _>>()
            .with_context(|| format!("line {}: not all fields are numbers", line_number + 1))?;

        match fields.len() {
            3 => {
                positions.push(Point3::new(fields[0], fields[1], fields[2]));
            }
            6 => {
                positions.push(Point3::new(fields[0], fields[1], fields[2]));
                normals.push(Vector3::new(fields[3], fields[4], fields[5]));
            }
            9 => {
                positions.push(Point3::new(fields[0], fields[1], fields[2]));
                normals.push(Vector3::new(fields[3], fields[4], fields[5]));
                colors.push([fields[6] as f32, fields[7] as f32, fields[8] as f32]);
            }
            10 => {
                positions.push(Point3::new(fields[0], fields[1], fields[2]));
                normals.push(Vector3::new(fields[3], fields[4], fields[5]));
                colors.push([fields[6] as f32, fields[7] as f32, fields[8] as f32]);
                weights.push(fields[9]);
            }
            n => bail!("line {}: expected 3, 6, 9 or 10 fields, found {n}", line_number + 1),
        }
    }

    Ok(PointCloud {
        positions,
        normals,
        colors,
        weights,
    })
}

fn write_tiles(tiles: &[seurat_tiler::Tile], output_path: &str) -> Result<()> {
    let mut file = fs::File::create(output_path).with_context(|| format!("could not create '{output_path}'"))?;
    for tile in tiles {
        write!(file, "{}", tile.cell)?;
        for corner in &tile.quad {
            write!(file, " {} {} {}", corner.x, corner.y, corner.z)?;
        }
        writeln!(file)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut options = getopts::Options::new();
    options.optflag("h", "help", "print this help menu");
    options.optflag("", "version", "print version information");
    options.optopt("i", "input", "point cloud to tile (required)", "FILE");
    options.optopt("o", "output", "where to write the resolved tiles (required)", "FILE");
    options.optopt("", "tile-count", "target number of tiles", "COUNT");
    options.optopt("", "threads", "thread count for every parallel stage", "COUNT");
    options.optopt("", "min-level", "shallowest subdivision depth", "LEVEL");
    options.optopt("", "max-level", "deepest subdivision depth", "LEVEL");
    options.optopt("", "overdraw-factor", "geometric error tolerated per unit of weight saved", "FACTOR");

    let matches = options.parse(env::args().skip(1))?;

    if matches.opt_present("h") {
        println!("{}", options.usage(USAGE));
        return Ok(());
    }
    if matches.opt_present("version") {
        println!("tile version {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if !matches.free.is_empty() {
        bail!("too many arguments\n\n{}", options.usage(USAGE));
    }

    let input_path = matches.opt_str("i").context("missing required option 'input'")?;
    let output_path = matches.opt_str("o").context("missing required option 'output'")?;

    let mut parameters = Parameters::default();
    if let Some(tile_count) = matches.opt_get::<usize>("tile-count").context("invalid 'tile-count'")? {
        parameters.tile_count = tile_count;
    }
    if let Some(threads) = matches.opt_get::<usize>("threads").context("invalid 'threads'")? {
        parameters.thread_count = threads;
    }
    if let Some(min_level) = matches.opt_get::<u32>("min-level").context("invalid 'min-level'")? {
        parameters.min_subdivision_level = min_level;
    }
    if let Some(max_level) = matches.opt_get::<u32>("max-level").context("invalid 'max-level'")? {
        parameters.max_subdivision_level = max_level;
    }
    if let Some(overdraw_factor) = matches
        .opt_get::<f64>("overdraw-factor")
        .context("invalid 'overdraw-factor'")?
    {
        parameters.overdraw_factor = overdraw_factor;
    }

    let contents = fs::read_to_string(&input_path).with_context(|| format!("could not read '{input_path}'"))?;
    let cloud = parse_point_cloud(&contents)?;
    let points = PointSet::new(1, &cloud.positions, &cloud.normals, &cloud.colors, &cloud.weights);

    let tiles = run(&points, &parameters).map_err(|error| anyhow::anyhow!(error))?;
    tracing::info!(tile_count = tiles.len(), "tiling complete");

    write_tiles(&tiles, &output_path)?;

    Ok(())
}
