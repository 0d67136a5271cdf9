//! Tournament engine: the only component with write access to contest-wide
//! state.
//!
//! Drives the state machine set-start → environment-selection → round-loop
//! → set-end (summary, rank bonus, HP purchase) → next-set | tournament-end.
//! Every living agent runs the per-round pipeline (pressure → decision →
//! strategy → crash) in creation order; that order is part of the
//! observable contract because it fixes the shared RNG draw sequence.

use std::time::{SystemTime, UNIX_EPOCH};

use contracts::{
    ConfigError, EnvironmentSpec, FinalStanding, RoundRecord, SetStanding, SetSummary,
    TournamentConfig, TournamentSnapshot, SCHEMA_VERSION_V1,
};
use tracing::{debug, info};

use crate::crash::CrashEngine;
use crate::decision::{self, DecisionInput};
use crate::environment::{self, VoterView};
use crate::player::Player;
use crate::pressure::{self, StandingsView};
use crate::rng::SimRng;
use crate::round2;
use crate::score_cents;
use crate::strategy::{ChoiceContext, RefillContext};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The orchestrator. Owns the players, the shared RNG, and the record log.
#[derive(Debug)]
pub struct Tournament {
    config: TournamentConfig,
    seed: u64,
    players: Vec<Player>,
    rng: SimRng,
    crash: CrashEngine,
    records: Vec<RoundRecord>,
    summaries: Vec<SetSummary>,
    /// 1-based; the set currently being (or about to be) played.
    current_set: u32,
    /// 1-based within the current set; 0 before the first round.
    current_round: u32,
    active_env: usize,
    finished: bool,
}

impl Tournament {
    /// Validate the configuration and stand up the engine. No round has run
    /// yet when this returns; any `Err` is a pre-flight failure.
    pub fn new(config: TournamentConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(entropy_seed);

        let players: Vec<Player> = config
            .agents
            .iter()
            .enumerate()
            .map(|(id, agent)| Player::new(id, agent, &config.decision, config.hp.starting_hp))
            .collect();

        let crash = CrashEngine::new(config.risk_table.clone());

        let mut engine = Self {
            seed,
            players,
            crash,
            rng: SimRng::new(seed),
            records: Vec::new(),
            summaries: Vec::new(),
            current_set: 1,
            current_round: 0,
            active_env: 0,
            finished: false,
            config,
        };

        // The first set's environment is selected before its first round.
        let voters = engine.voter_views(1);
        engine.active_env = environment::select(
            &engine.config.environment_mode,
            &engine.config.environments,
            0,
            &voters,
            &mut engine.rng,
        );

        info!(
            seed = engine.seed,
            agents = engine.players.len(),
            sets = engine.config.sets,
            rounds_per_set = engine.config.rounds_per_set,
            "tournament initialized"
        );
        Ok(engine)
    }

    /// Play everything that remains and return the final ranking.
    pub fn run(&mut self) -> Vec<FinalStanding> {
        while !self.finished && self.current_set <= self.config.sets {
            self.play_set();
        }
        self.finished = true;
        let standings = self.final_standings();
        match standings.iter().find(|s| s.winner) {
            Some(winner) => info!(
                winner = %winner.name,
                score = winner.score,
                "tournament complete"
            ),
            None => info!("tournament complete with no survivors"),
        }
        standings
    }

    // -----------------------------------------------------------------------
    // Set and round loop
    // -----------------------------------------------------------------------

    /// Play one set: round loop, frozen summary, rank bonus, and — when
    /// another set follows — environment selection and the HP purchase
    /// phase for that set.
    pub fn play_set(&mut self) {
        let set = self.current_set;
        info!(
            set,
            environment = %self.environment().label,
            "set start"
        );

        let mut rounds_played = 0;
        for round in 1..=self.config.rounds_per_set {
            self.current_round = round;
            if !self.play_round() {
                break;
            }
            rounds_played += 1;
        }

        if rounds_played > 0 {
            self.award_set_bonuses();
            self.freeze_set_summary();
        }
        for player in &mut self.players {
            player.close_set();
        }

        if !self.finished && set < self.config.sets {
            self.prepare_next_set();
        }
        self.current_set = set + 1;
        self.current_round = 0;
    }

    /// Play one round for every living agent, in creation order.
    ///
    /// Returns false when the round could not run: the tournament is over
    /// or the live roster is degenerate. A degenerate round is a no-op,
    /// not an error.
    pub fn play_round(&mut self) -> bool {
        if self.finished || self.roster_is_degenerate() {
            self.finished = true;
            return false;
        }

        let set = self.current_set;
        let round = self.current_round;
        let alive_count = self.living_count();
        let ranks = self.living_ranks();
        let leader_score = self.leader_score();
        let previous_choices: Vec<Option<u8>> = self
            .players
            .iter()
            .map(|p| if p.contest.alive { p.contest.last_choice } else { None })
            .collect();
        let rounds_elapsed = (set - 1) * self.config.rounds_per_set + (round - 1);
        let environment = self.config.environments[self.active_env].clone();

        for id in 0..self.players.len() {
            if !self.players[id].contest.alive {
                continue;
            }
            let rank = ranks[id];

            // 1. Pressure — pure function of the standings projection.
            let view = StandingsView {
                rank,
                alive_count,
                leader_score,
                score: self.players[id].contest.score,
                hp: self.players[id].contest.hp,
                max_hp: self.config.hp.max_hp,
                rounds_elapsed,
                total_rounds: self.config.total_rounds(),
            };
            let snapshot = pressure::evaluate(&self.config.pressure, &view);

            // 2. Decision core step.
            let winning = rank <= 2;
            let jump = {
                let player = &mut self.players[id];
                decision::step(
                    &player.decision_params,
                    &mut player.decision,
                    DecisionInput {
                        pressure: snapshot.overall,
                        winning,
                    },
                    &mut self.rng,
                )
            };
            if let Some(event) = jump {
                debug!(
                    set,
                    round,
                    agent = %self.players[id].profile.name,
                    direction = ?event.direction,
                    kappa = event.kappa_after,
                    "semantic jump"
                );
            }

            // 3. Strategy selection.
            let rivals: Vec<u8> = previous_choices
                .iter()
                .enumerate()
                .filter(|&(other, _)| other != id)
                .filter_map(|(_, c)| *c)
                .collect();
            let choice = {
                let player = &self.players[id];
                let ctx = ChoiceContext {
                    round,
                    rounds_per_set: self.config.rounds_per_set,
                    is_final_round: round == self.config.rounds_per_set,
                    rank,
                    alive_count,
                    score_gap: round2(leader_score - player.contest.score),
                    hp: player.contest.hp,
                    max_hp: self.config.hp.max_hp,
                    overall_pressure: snapshot.overall,
                    table: self.crash.table(),
                    environment: &environment,
                    rival_choices: &rivals,
                };
                player.selector.choose(&ctx, &player.decision_view(), &mut self.rng)
            };

            // 4. Crash resolution and state mutation.
            let outcome = self.crash.resolve(choice.value, &environment, &mut self.rng);
            let player = &mut self.players[id];
            player.record_choice(choice.value);
            player.contest.last_choice = Some(choice.value);

            let hp_delta = if outcome.crashed {
                let eliminated = player.take_crash();
                if eliminated {
                    info!(
                        set,
                        round,
                        agent = %player.profile.name,
                        choice = choice.value,
                        "eliminated"
                    );
                }
                -1
            } else {
                player.credit(outcome.score_delta);
                0
            };
            debug_assert!(player.contest.score >= 0.0, "negative score: {player:?}");

            self.records.push(RoundRecord {
                set,
                round,
                agent_id: id,
                choice: choice.value,
                crashed: outcome.crashed,
                score_delta: if outcome.crashed { 0.0 } else { outcome.score_delta },
                hp_delta,
                posture: self.players[id].posture(),
                rationale: choice.rationale,
                overall_pressure: snapshot.overall,
            });
        }

        if self.roster_is_degenerate() {
            self.finished = true;
        }
        true
    }

    // -----------------------------------------------------------------------
    // Set end: bonuses, summary, environment hand-off, HP purchase
    // -----------------------------------------------------------------------

    /// Credit the configured set-rank bonus, scaled by the active
    /// environment's reward multiplier.
    fn award_set_bonuses(&mut self) {
        if self.config.set_rank_bonus.is_empty() {
            return;
        }
        let multiplier = self.environment().reward_multiplier;
        for (player_index, set_rank) in self.set_ranks().into_iter().enumerate() {
            let bonus = self
                .config
                .set_rank_bonus
                .get((set_rank - 1) as usize)
                .copied()
                .unwrap_or(0.0);
            if bonus > 0.0 {
                let scaled = round2(bonus * multiplier);
                let player = &mut self.players[player_index];
                player.contest.score = round2(player.contest.score + scaled);
            }
        }
    }

    /// Freeze the read-only summary of the set that just ended.
    fn freeze_set_summary(&mut self) {
        let multiplier = self.environment().reward_multiplier;
        let ranks = self.set_ranks();
        let standings: Vec<SetStanding> = self
            .players
            .iter()
            .enumerate()
            .map(|(id, player)| {
                let set_rank = ranks[id];
                let bonus = self
                    .config
                    .set_rank_bonus
                    .get((set_rank - 1) as usize)
                    .copied()
                    .map(|b| round2(b * multiplier))
                    .unwrap_or(0.0);
                SetStanding {
                    agent_id: id,
                    set_rank,
                    set_score: player.contest.set_score,
                    bonus,
                    alive: player.contest.alive,
                }
            })
            .collect();

        let summary = SetSummary {
            set: self.current_set,
            environment_label: self.environment().label.clone(),
            standings,
            survivors: self.living_count(),
        };
        info!(
            set = summary.set,
            survivors = summary.survivors,
            "set complete"
        );
        self.summaries.push(summary);
    }

    /// Select the next set's environment, then run the HP purchase phase
    /// against it.
    fn prepare_next_set(&mut self) {
        let next_index = {
            let voters = self.voter_views(self.current_set + 1);
            environment::select(
                &self.config.environment_mode,
                &self.config.environments,
                self.current_set as usize, // 0-based index of the next set
                &voters,
                &mut self.rng,
            )
        };
        self.active_env = next_index;
        info!(
            set = self.current_set + 1,
            environment = %self.environment().label,
            "environment selected"
        );
        self.hp_purchase_phase();
    }

    /// Each living agent may convert score into HP at the configured cost,
    /// through the same selector contract used for risk choices.
    fn hp_purchase_phase(&mut self) {
        let alive_count = self.living_count();
        let ranks = self.living_ranks();
        let leader_score = self.leader_score();
        let next_crash_delta = self.environment().crash_delta;
        let cost = self.config.hp.cost_per_hp;
        let max_hp = self.config.hp.max_hp;

        for id in 0..self.players.len() {
            if !self.players[id].contest.alive {
                continue;
            }
            let units = {
                let player = &self.players[id];
                let ctx = RefillContext {
                    rank: ranks[id],
                    alive_count,
                    score_gap: round2(leader_score - player.contest.score),
                    hp: player.contest.hp,
                    max_hp,
                    score: player.contest.score,
                    cost_per_hp: cost,
                    next_crash_delta,
                };
                player.selector.decide_refill(&ctx, &player.decision_view())
            };
            if units == 0 {
                continue;
            }
            let player = &mut self.players[id];
            let spend = round2(units as f64 * cost);
            player.contest.score = round2(player.contest.score - spend);
            player.contest.hp = (player.contest.hp + units).min(max_hp);
            debug_assert!(player.contest.score >= 0.0, "hp purchase overdrew: {player:?}");
            debug!(
                agent = %player.profile.name,
                units,
                spend,
                hp = player.contest.hp,
                "hp purchased"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Output surface
    // -----------------------------------------------------------------------

    /// The ordered, append-only record log.
    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    /// Frozen per-set summaries.
    pub fn set_summaries(&self) -> &[SetSummary] {
        &self.summaries
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Final ranking: living agents first by score, ties broken by lowest
    /// crash count then creation order; the eliminated follow in the same
    /// order. The winner flag marks the unique survivor, if any.
    pub fn final_standings(&self) -> Vec<FinalStanding> {
        let mut order: Vec<usize> = (0..self.players.len()).collect();
        order.sort_by_key(|&id| {
            let p = &self.players[id];
            (
                !p.contest.alive,
                -score_cents(p.contest.score),
                p.contest.crash_count,
                id,
            )
        });

        order
            .iter()
            .enumerate()
            .map(|(position, &id)| {
                let p = &self.players[id];
                FinalStanding {
                    rank: position as u32 + 1,
                    agent_id: id,
                    name: p.profile.name.clone(),
                    score: p.contest.score,
                    alive: p.contest.alive,
                    winner: position == 0 && p.contest.alive,
                    crash_count: p.contest.crash_count,
                    jump_count: p.decision.jump_count,
                }
            })
            .collect()
    }

    /// Full read-only snapshot for display and tooling collaborators.
    pub fn snapshot(&self) -> TournamentSnapshot {
        TournamentSnapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            seed: self.seed,
            current_set: self.current_set,
            current_round: self.current_round,
            environment_label: self.environment().label.clone(),
            finished: self.finished,
            agents: self.players.iter().map(Player::snapshot).collect(),
            record_count: self.records.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn environment(&self) -> &EnvironmentSpec {
        &self.config.environments[self.active_env]
    }

    fn living_count(&self) -> u32 {
        self.players.iter().filter(|p| p.contest.alive).count() as u32
    }

    /// A round cannot run with nobody left, or with a single survivor of a
    /// larger field. A sole *configured* contestant still plays its rounds.
    fn roster_is_degenerate(&self) -> bool {
        let living = self.living_count();
        living == 0 || (living == 1 && self.players.len() > 1)
    }

    /// 1-based rank per player index, among the living, by cumulative
    /// score; creation order breaks ties. Dead players keep rank 0 and are
    /// never read.
    fn living_ranks(&self) -> Vec<u32> {
        let mut living: Vec<usize> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.contest.alive)
            .map(|(id, _)| id)
            .collect();
        living.sort_by_key(|&id| (-score_cents(self.players[id].contest.score), id));

        let mut ranks = vec![0_u32; self.players.len()];
        for (position, &id) in living.iter().enumerate() {
            ranks[id] = position as u32 + 1;
        }
        ranks
    }

    fn leader_score(&self) -> f64 {
        self.players
            .iter()
            .filter(|p| p.contest.alive)
            .map(|p| score_cents(p.contest.score))
            .max()
            .map(|cents| cents as f64 / 100.0)
            .unwrap_or(0.0)
    }

    /// Set ranks for the set that just ended: living agents first by set
    /// score, then the eliminated by set score; creation order breaks ties.
    fn set_ranks(&self) -> Vec<u32> {
        let mut order: Vec<usize> = (0..self.players.len()).collect();
        order.sort_by_key(|&id| {
            let p = &self.players[id];
            (!p.contest.alive, -score_cents(p.contest.set_score), id)
        });
        let mut ranks = vec![0_u32; self.players.len()];
        for (position, &id) in order.iter().enumerate() {
            ranks[id] = position as u32 + 1;
        }
        ranks
    }

    /// Voter views for the vote on `upcoming_set` (1-based).
    fn voter_views(&self, upcoming_set: u32) -> Vec<VoterView> {
        let ranks = self.living_ranks();
        let alive_count = self.living_count();
        let leader_score = self.leader_score();
        let remaining_sets = self.config.sets.saturating_sub(upcoming_set) + 1;
        self.players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.contest.alive)
            .map(|(id, p)| VoterView {
                kappa: p.decision.kappa,
                unresolved: p.decision.unresolved,
                rank: ranks[id],
                alive_count,
                score_gap: round2(leader_score - p.contest.score),
                hp: p.contest.hp,
                max_hp: self.config.hp.max_hp,
                remaining_sets,
                total_sets: self.config.sets,
            })
            .collect()
    }
}

/// Seed for runs that did not pin one: derived from the wall clock, so the
/// run is intentionally not reproducible.
fn entropy_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9e3779b97f4a7c15)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::EnvironmentMode;

    fn seeded_config(seed: u64) -> TournamentConfig {
        TournamentConfig {
            seed: Some(seed),
            ..TournamentConfig::default()
        }
    }

    #[test]
    fn new_validates_before_running() {
        let mut config = TournamentConfig::default();
        config.agents.clear();
        assert!(Tournament::new(config).is_err());
    }

    #[test]
    fn run_terminates_and_produces_standings() {
        let mut tournament = Tournament::new(seeded_config(7)).expect("valid config");
        let standings = tournament.run();
        assert!(tournament.is_finished());
        assert_eq!(standings.len(), 6);
        // Ranks are 1..=n in order.
        for (i, standing) in standings.iter().enumerate() {
            assert_eq!(standing.rank, i as u32 + 1);
        }
        // At most one winner, and only a living one.
        let winners: Vec<_> = standings.iter().filter(|s| s.winner).collect();
        assert!(winners.len() <= 1);
        if let Some(w) = winners.first() {
            assert!(w.alive);
        }
    }

    #[test]
    fn records_are_emitted_in_agent_creation_order_within_a_round() {
        let mut config = seeded_config(11);
        config.environment_mode = EnvironmentMode::Fixed { schedule: vec![1] };
        let mut tournament = Tournament::new(config).expect("valid config");
        tournament.current_round = 1;
        assert!(tournament.play_round());
        let first_round: Vec<usize> = tournament
            .records()
            .iter()
            .map(|r| r.agent_id)
            .collect();
        let mut sorted = first_round.clone();
        sorted.sort_unstable();
        assert_eq!(first_round, sorted);
    }

    #[test]
    fn scores_never_go_negative() {
        let mut tournament = Tournament::new(seeded_config(13)).expect("valid config");
        tournament.run();
        let snapshot = tournament.snapshot();
        for agent in &snapshot.agents {
            assert!(agent.score >= 0.0, "{agent:?}");
        }
    }

    #[test]
    fn eliminated_agents_end_on_a_crash_and_emit_nothing_further() {
        let mut tournament = Tournament::new(seeded_config(17)).expect("valid config");
        tournament.run();
        let snapshot = tournament.snapshot();
        for agent in &snapshot.agents {
            let own: Vec<&RoundRecord> = tournament
                .records()
                .iter()
                .filter(|r| r.agent_id == agent.agent_id)
                .collect();
            let crashes = own.iter().filter(|r| r.crashed).count() as u32;
            assert_eq!(crashes, agent.crash_count);
            if !agent.alive {
                assert_eq!(agent.hp, 0);
                assert!(own.last().expect("dead agents have acted").crashed);
            }
        }
    }

    #[test]
    fn snapshot_reflects_roster() {
        let tournament = Tournament::new(seeded_config(19)).expect("valid config");
        let snapshot = tournament.snapshot();
        assert_eq!(snapshot.agents.len(), 6);
        assert_eq!(snapshot.record_count, 0);
        assert!(!snapshot.finished);
        assert_eq!(snapshot.seed, 19);
    }

    #[test]
    fn set_summaries_freeze_one_entry_per_played_set() {
        let mut tournament = Tournament::new(seeded_config(23)).expect("valid config");
        tournament.run();
        assert!(!tournament.set_summaries().is_empty());
        assert!(tournament.set_summaries().len() <= 3);
        for (i, summary) in tournament.set_summaries().iter().enumerate() {
            assert_eq!(summary.set, i as u32 + 1);
            assert_eq!(summary.standings.len(), 6);
        }
    }
}
