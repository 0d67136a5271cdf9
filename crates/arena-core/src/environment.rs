//! Environment selection: fixed schedule, random draw, or agent vote.
//!
//! One environment is active per set, chosen before its first round. Vote
//! aggregation is fully deterministic apart from the shared RNG: ballots
//! are tallied in a `BTreeMap` and ties go to the lowest catalogue index.

use std::collections::BTreeMap;

use contracts::{EnvironmentMode, EnvironmentSpec};

use crate::rng::SimRng;

/// What a voting agent gets to see of its own situation.
#[derive(Debug, Clone, Copy)]
pub struct VoterView {
    pub kappa: f64,
    pub unresolved: f64,
    /// 1-based rank among the living agents.
    pub rank: u32,
    pub alive_count: u32,
    pub score_gap: f64,
    pub hp: u32,
    pub max_hp: u32,
    /// Sets remaining including the one being voted on.
    pub remaining_sets: u32,
    pub total_sets: u32,
}

/// Pick the catalogue index of the environment for the given set.
///
/// `set_index` is 0-based. `voters` must hold one view per living agent,
/// in creation order.
pub fn select(
    mode: &EnvironmentMode,
    catalogue: &[EnvironmentSpec],
    set_index: usize,
    voters: &[VoterView],
    rng: &mut SimRng,
) -> usize {
    match mode {
        EnvironmentMode::Fixed { schedule } => schedule.get(set_index).copied().unwrap_or(0),
        EnvironmentMode::Random => rng.next_below(catalogue.len() as u64) as usize,
        EnvironmentMode::Vote => tally_votes(catalogue, voters),
    }
}

/// Majority vote over risk-appetite ballots; lowest index wins ties.
fn tally_votes(catalogue: &[EnvironmentSpec], voters: &[VoterView]) -> usize {
    if voters.is_empty() {
        return 0;
    }

    let order = risk_order(catalogue);
    let mut ballots: BTreeMap<usize, u32> = BTreeMap::new();
    for voter in voters {
        let appetite = risk_appetite(voter);
        let ordinal = ((appetite * order.len() as f64) as usize).min(order.len() - 1);
        *ballots.entry(order[ordinal]).or_insert(0) += 1;
    }

    // BTreeMap iteration is index-ascending, so on equal counts the lowest
    // catalogue index is kept.
    let mut best_index = 0;
    let mut best_count = 0;
    for (&index, &count) in &ballots {
        if count > best_count {
            best_index = index;
            best_count = count;
        }
    }
    best_index
}

/// Catalogue indices ordered from tamest to harshest crash delta.
fn risk_order(catalogue: &[EnvironmentSpec]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..catalogue.len()).collect();
    order.sort_by(|&a, &b| {
        catalogue[a]
            .crash_delta
            .partial_cmp(&catalogue[b].crash_delta)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    order
}

/// Risk appetite in [0, 1]: how harsh an environment this agent wants.
///
/// Behind agents with aggressive kappa want volatility; leaders and
/// low-kappa agents want calm. Time pressure drags everyone toward risk as
/// the sets run out.
fn risk_appetite(view: &VoterView) -> f64 {
    let rank_pressure = if view.alive_count <= 1 {
        0.0
    } else {
        (view.rank - 1) as f64 / (view.alive_count - 1) as f64
    };
    let gap_pressure = (view.score_gap / 100.0).min(1.0);
    let reversal_need = rank_pressure * 0.7 + gap_pressure * 0.3;

    let time_pressure = if view.total_sets == 0 {
        0.0
    } else {
        1.0 - view.remaining_sets as f64 / view.total_sets as f64
    };
    let final_set_boost = if view.remaining_sets == 1 { 2.0 } else { 1.0 };

    let hp_headroom = view.hp as f64 / view.max_hp.max(1) as f64;
    let energy = view.unresolved.min(1.0);

    let appetite = reversal_need * view.kappa * 1.2
        + time_pressure * 0.4 * final_set_boost
        + hp_headroom * view.kappa * 0.3
        + energy * 0.2
        - (1.0 - view.kappa) * 0.3;

    // A leader with a commanding gap has nothing to gain from chaos.
    let appetite = if view.rank == 1 && view.score_gap <= 0.0 {
        appetite * 0.3
    } else {
        appetite
    };

    appetite.clamp(0.0, 1.0)
}
