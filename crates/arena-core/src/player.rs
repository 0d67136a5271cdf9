//! One contestant: immutable profile, mutable contest state, and the
//! privately-owned decision state.
//!
//! Contest state and decision state are deliberately two separate records.
//! The decision core only ever sees a [`crate::decision::DecisionInput`]
//! projection, and nothing outside this agent reads its decision state.

use contracts::{AgentConfig, AgentSnapshot, DecisionSettings, Posture};

use crate::decision::{DecisionParams, DecisionState};
use crate::round2;
use crate::strategy::{DecisionView, StrategySelector};

/// Static identity of a contestant. Immutable after creation.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub id: usize,
    pub name: String,
    pub personality: String,
}

/// Mutable per-agent game progress. Owned and mutated only by the
/// tournament engine.
#[derive(Debug, Clone)]
pub struct ContestState {
    pub hp: u32,
    /// Cumulative score across the whole tournament; never negative.
    pub score: f64,
    /// Score earned within the current set; feeds set summaries only.
    pub set_score: f64,
    pub alive: bool,
    pub crash_count: u32,
    pub choice_history: Vec<u8>,
    /// Choice made in the previous completed round, if any.
    pub last_choice: Option<u8>,
}

impl ContestState {
    fn new(starting_hp: u32) -> Self {
        Self {
            hp: starting_hp,
            score: 0.0,
            set_score: 0.0,
            alive: true,
            crash_count: 0,
            choice_history: Vec::new(),
            last_choice: None,
        }
    }
}

/// Profile + contest state + decision state + strategy, bundled per agent.
#[derive(Debug, Clone)]
pub struct Player {
    pub profile: AgentProfile,
    pub contest: ContestState,
    pub decision: DecisionState,
    pub selector: StrategySelector,
    pub decision_params: DecisionParams,
}

impl Player {
    pub fn new(id: usize, config: &AgentConfig, settings: &DecisionSettings, starting_hp: u32) -> Self {
        Self {
            profile: AgentProfile {
                id,
                name: config.name.clone(),
                personality: config.personality.clone(),
            },
            contest: ContestState::new(starting_hp),
            decision: DecisionState::new(config.kappa_init, config.temperature_base, settings),
            selector: StrategySelector::from_config(config.strategy, config.risk_weights),
            decision_params: DecisionParams {
                settings: *settings,
                jump_threshold: config.jump_threshold,
            },
        }
    }

    pub fn posture(&self) -> Posture {
        self.decision.posture(&self.decision_params.settings)
    }

    pub fn decision_view(&self) -> DecisionView {
        DecisionView {
            posture: self.posture(),
            temperature: self.decision.temperature,
            kappa: self.decision.kappa,
        }
    }

    /// Credit a successful round. The delta is expected to be >= 0.
    pub fn credit(&mut self, score_delta: f64) {
        self.contest.score = round2(self.contest.score + score_delta);
        self.contest.set_score = round2(self.contest.set_score + score_delta);
    }

    /// Take one crash: lose a hit point, mark elimination at zero.
    ///
    /// Returns true if this crash eliminated the agent.
    pub fn take_crash(&mut self) -> bool {
        assert!(
            self.contest.hp > 0,
            "agent {} crashed with no hp to lose: {:?}",
            self.profile.id,
            self.contest
        );
        self.contest.crash_count += 1;
        self.contest.hp -= 1;
        if self.contest.hp == 0 {
            self.contest.alive = false;
            true
        } else {
            false
        }
    }

    pub fn record_choice(&mut self, value: u8) {
        self.contest.choice_history.push(value);
    }

    /// Roll the set-scoped score back to zero for the next set.
    pub fn close_set(&mut self) {
        self.contest.set_score = 0.0;
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.profile.id,
            name: self.profile.name.clone(),
            personality: self.profile.personality.clone(),
            hp: self.contest.hp,
            score: self.contest.score,
            alive: self.contest.alive,
            crash_count: self.contest.crash_count,
            jump_count: self.decision.jump_count,
            kappa: self.decision.kappa,
            unresolved_pressure: self.decision.unresolved,
            temperature: self.decision.temperature,
            posture: self.posture(),
            choice_history: self.contest.choice_history.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{RiskWeights, StrategyKind};

    fn config() -> AgentConfig {
        AgentConfig {
            name: "Test".to_string(),
            personality: "balanced".to_string(),
            risk_weights: RiskWeights::default(),
            strategy: StrategyKind::Adaptive,
            kappa_init: 0.5,
            jump_threshold: 2.0,
            temperature_base: 0.8,
        }
    }

    #[test]
    fn new_player_starts_alive_with_configured_hp() {
        let player = Player::new(0, &config(), &DecisionSettings::default(), 3);
        assert!(player.contest.alive);
        assert_eq!(player.contest.hp, 3);
        assert_eq!(player.contest.score, 0.0);
        assert_eq!(player.decision.jump_count, 0);
    }

    #[test]
    fn crash_at_one_hp_eliminates() {
        let mut player = Player::new(0, &config(), &DecisionSettings::default(), 1);
        let eliminated = player.take_crash();
        assert!(eliminated);
        assert!(!player.contest.alive);
        assert_eq!(player.contest.hp, 0);
        assert_eq!(player.contest.crash_count, 1);
    }

    #[test]
    fn crash_above_one_hp_only_wounds() {
        let mut player = Player::new(0, &config(), &DecisionSettings::default(), 3);
        assert!(!player.take_crash());
        assert!(player.contest.alive);
        assert_eq!(player.contest.hp, 2);
    }

    #[test]
    fn credit_accumulates_both_scopes() {
        let mut player = Player::new(0, &config(), &DecisionSettings::default(), 3);
        player.credit(5.5);
        player.credit(2.25);
        assert_eq!(player.contest.score, 7.75);
        assert_eq!(player.contest.set_score, 7.75);
        player.close_set();
        assert_eq!(player.contest.set_score, 0.0);
        assert_eq!(player.contest.score, 7.75);
    }

    #[test]
    fn snapshot_mirrors_state() {
        let mut player = Player::new(3, &config(), &DecisionSettings::default(), 3);
        player.record_choice(4);
        player.credit(1.0);
        let snapshot = player.snapshot();
        assert_eq!(snapshot.agent_id, 3);
        assert_eq!(snapshot.choice_history, vec![4]);
        assert_eq!(snapshot.score, 1.0);
        assert!(snapshot.alive);
    }
}
