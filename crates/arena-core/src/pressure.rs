//! Pressure calculator: contest state in, four normalized pressures out.
//!
//! Pure functions of a [`StandingsView`] projection; nothing here touches
//! agent or tournament state.

use contracts::PressureWeights;

/// Minimal read-only projection of contest state for one acting agent.
///
/// Built fresh by the tournament engine every round; never persisted.
#[derive(Debug, Clone, Copy)]
pub struct StandingsView {
    /// 1-based rank among the living agents.
    pub rank: u32,
    pub alive_count: u32,
    /// Score of the current leader among the living.
    pub leader_score: f64,
    pub score: f64,
    pub hp: u32,
    pub max_hp: u32,
    /// Completed rounds across the whole tournament (0 on the first round).
    pub rounds_elapsed: u32,
    /// Total rounds scheduled across the whole tournament.
    pub total_rounds: u32,
}

/// The four pressure components plus their convex combination. All fields
/// are in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSnapshot {
    pub rank_pressure: f64,
    pub score_gap_pressure: f64,
    pub time_pressure: f64,
    pub survival_pressure: f64,
    pub overall: f64,
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Rank pressure: 0 when leading, approaching 1 near last place among the
/// living. A sole survivor feels no rank pressure.
fn rank_pressure(rank: u32, alive_count: u32) -> f64 {
    if alive_count <= 1 || rank <= 1 {
        return 0.0;
    }
    clamp_unit((rank - 1) as f64 / (alive_count - 1) as f64)
}

/// Score-gap pressure: deficit to the leader normalized by the leader's
/// score, or by the configured ceiling when the leader has nothing yet.
fn score_gap_pressure(score: f64, leader_score: f64, gap_ceiling: f64) -> f64 {
    let gap = leader_score - score;
    if gap <= 0.0 {
        return 0.0;
    }
    let normalizer = if leader_score > 0.0 {
        leader_score
    } else {
        gap_ceiling
    };
    clamp_unit(gap / normalizer)
}

/// Time pressure: monotone in elapsed rounds, exactly 1 on the final round
/// of the final set. A single-round schedule is all final round.
fn time_pressure(rounds_elapsed: u32, total_rounds: u32) -> f64 {
    if total_rounds <= 1 {
        return 1.0;
    }
    clamp_unit(rounds_elapsed as f64 / (total_rounds - 1) as f64)
}

/// Survival pressure: quadratic in missing HP, exactly 1 at HP 1.
fn survival_pressure(hp: u32, max_hp: u32) -> f64 {
    if max_hp <= 1 {
        return 1.0;
    }
    let missing = (max_hp.saturating_sub(hp)) as f64 / (max_hp - 1) as f64;
    clamp_unit(missing * missing)
}

/// Evaluate all four components and their weighted combination.
pub fn evaluate(weights: &PressureWeights, view: &StandingsView) -> PressureSnapshot {
    let rank = rank_pressure(view.rank, view.alive_count);
    let gap = score_gap_pressure(view.score, view.leader_score, weights.gap_ceiling);
    let time = time_pressure(view.rounds_elapsed, view.total_rounds);
    let survival = survival_pressure(view.hp, view.max_hp);

    let overall = clamp_unit(
        weights.rank * rank
            + weights.score_gap * gap
            + weights.time * time
            + weights.survival * survival,
    );

    PressureSnapshot {
        rank_pressure: rank,
        score_gap_pressure: gap,
        time_pressure: time,
        survival_pressure: survival,
        overall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> PressureWeights {
        PressureWeights::default()
    }

    fn leader_view() -> StandingsView {
        StandingsView {
            rank: 1,
            alive_count: 6,
            leader_score: 40.0,
            score: 40.0,
            hp: 5,
            max_hp: 5,
            rounds_elapsed: 0,
            total_rounds: 15,
        }
    }

    #[test]
    fn leader_full_hp_round_one_is_near_zero() {
        let snapshot = evaluate(&weights(), &leader_view());
        assert_eq!(snapshot.rank_pressure, 0.0);
        assert_eq!(snapshot.score_gap_pressure, 0.0);
        assert_eq!(snapshot.time_pressure, 0.0);
        assert_eq!(snapshot.survival_pressure, 0.0);
        assert_eq!(snapshot.overall, 0.0);
    }

    #[test]
    fn last_place_hp_one_final_round_is_near_one() {
        let view = StandingsView {
            rank: 6,
            alive_count: 6,
            leader_score: 80.0,
            score: 0.0,
            hp: 1,
            max_hp: 5,
            rounds_elapsed: 14,
            total_rounds: 15,
        };
        let snapshot = evaluate(&weights(), &view);
        assert_eq!(snapshot.rank_pressure, 1.0);
        assert_eq!(snapshot.score_gap_pressure, 1.0);
        assert_eq!(snapshot.time_pressure, 1.0);
        assert_eq!(snapshot.survival_pressure, 1.0);
        assert!((snapshot.overall - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sole_survivor_feels_no_rank_pressure() {
        let mut view = leader_view();
        view.alive_count = 1;
        view.rank = 1;
        let snapshot = evaluate(&weights(), &view);
        assert_eq!(snapshot.rank_pressure, 0.0);
    }

    #[test]
    fn zero_leader_score_uses_gap_ceiling() {
        // A behind agent can only exist with a positive leader score under
        // non-negative scoring, but the ceiling path must still behave.
        let p = score_gap_pressure(-10.0, 0.0, 50.0);
        assert!((p - 0.2).abs() < 1e-12);
    }

    #[test]
    fn time_pressure_is_monotone() {
        let mut last = -1.0;
        for elapsed in 0..15 {
            let t = time_pressure(elapsed, 15);
            assert!(t >= last);
            last = t;
        }
        assert_eq!(time_pressure(14, 15), 1.0);
    }

    #[test]
    fn single_round_schedule_is_all_final_round() {
        assert_eq!(time_pressure(0, 1), 1.0);
    }

    #[test]
    fn survival_pressure_is_maximal_at_one_hp() {
        assert_eq!(survival_pressure(1, 5), 1.0);
        assert_eq!(survival_pressure(5, 5), 0.0);
        let mid = survival_pressure(3, 5);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn survival_pressure_handles_hp_cap_of_one() {
        assert_eq!(survival_pressure(1, 1), 1.0);
    }
}
