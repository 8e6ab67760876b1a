//! Picks a final tile set under a triangle budget (C10).

use crate::tiler::candidate_tile_generator::CandidateTiles;
use crate::tiler::tile::Tile;
use crate::tiler::tile_weight_model::TileWeightModel;

/// Chooses which of a set of candidate tiles to keep, given each one's
/// weight (e.g. triangle count) and its fitting error (the cost of leaving
/// it out). Implementations may ignore `budget` if they have no natural
/// notion of one.
pub trait SelectionSolver {
    fn select(&self, candidates: &[(Tile, f64, f64)], budget: f64) -> Vec<Tile>;
}

/// Greedily keeps tiles in decreasing order of `error / weight` (the most
/// error removed per unit of budget spent) until the budget is exhausted.
///
/// The original selection solver is an external combinatorial optimizer
/// this crate treats as a black box; this is a reasonable, simple stand-in
/// with the same contract (respects the weight budget, prefers
/// high-error-per-weight tiles).
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySelectionSolver;

impl SelectionSolver for GreedySelectionSolver {
    fn select(&self, candidates: &[(Tile, f64, f64)], budget: f64) -> Vec<Tile> {
        let mut ranked: Vec<&(Tile, f64, f64)> = candidates.iter().collect();
        ranked.sort_by(|a, b| {
            let ratio_a = if a.2 > 0.0 { a.1 / a.2 } else { f64::INFINITY };
            let ratio_b = if b.2 > 0.0 { b.1 / b.2 } else { f64::INFINITY };
            ratio_b.partial_cmp(&ratio_a).unwrap()
        });

        let mut spent = 0.0;
        let mut kept = Vec::new();
        for (tile, _error, weight) in ranked {
            if spent + weight > budget {
                continue;
            }
            spent += weight;
            kept.push(*tile);
        }
        kept
    }
}

/// Resolves candidate tiles, weighs them, and selects a final set under a
/// triangle budget: `CandidateTiles -> (Tile, error, weight) -> selected`.
pub struct SelectionTiler<'a> {
    pub weight_model: &'a dyn TileWeightModel,
    pub selection_solver: &'a dyn SelectionSolver,
    pub triangle_budget: f64,
}

impl<'a> SelectionTiler<'a> {
    pub fn run(&self, candidates: &CandidateTiles) -> Vec<Tile> {
        let scored: Vec<(Tile, f64, f64)> = candidates
            .tiles
            .iter()
            .zip(&candidates.errors)
            .map(|(tile, &error)| {
                let weight = self.weight_model.weight(tile);
                (*tile, error, weight)
            })
            .collect();
        self.selection_solver.select(&scored, self.triangle_budget)
    }
}
