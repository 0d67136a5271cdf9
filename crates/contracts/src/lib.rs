//! Cross-boundary contracts for the arena engine, CLI, and reporting tools.
//!
//! Everything the engine accepts (validated configuration) or exposes
//! (round records, set summaries, final standings, snapshots) lives here so
//! that display and tooling crates never reach into engine internals.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Smallest selectable risk value.
pub const RISK_MIN: u8 = 1;
/// Largest selectable risk value.
pub const RISK_MAX: u8 = 10;
/// Number of entries a risk table must carry.
pub const RISK_TABLE_LEN: usize = (RISK_MAX - RISK_MIN + 1) as usize;

/// Tolerance used when checking that pressure weights sum to 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Agent configuration
// ---------------------------------------------------------------------------

/// Numeric risk-band weighting. New personality tiers are introduced purely
/// by supplying different numbers here; nothing in the engine branches on
/// the personality label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskWeights {
    /// Preference for values 1-4.
    pub low: f64,
    /// Preference for values 5-7.
    pub medium: f64,
    /// Preference for values 8-10.
    pub high: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            low: 1.0,
            medium: 1.0,
            high: 1.0,
        }
    }
}

/// Which strategy family drives an agent's risk choices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum StrategyKind {
    /// Decision-core-driven: posture and temperature shape a softmax over
    /// the risk range.
    Adaptive,
    /// Fixed heuristic, independent of the decision core.
    Rule { rule: RuleKind },
}

/// The rule-based heuristics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Always the safest value in the current environment.
    AnchorSafest,
    /// Safe band when HP is low, push band otherwise.
    HpGuard,
    /// Safe early, push when behind late in a set.
    SafeThenPush,
    /// Track the field's previous-round average plus one.
    CopycatPlusOne,
    /// Minimize crash exposure unconditionally.
    AntiCrash,
    /// Safe everywhere except the final round of a set.
    FinalGambler,
}

/// Static identity and tuning of one contestant. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    /// Free-form label carried through to reports; never dispatched on.
    pub personality: String,
    #[serde(default)]
    pub risk_weights: RiskWeights,
    #[serde(default = "default_strategy_kind")]
    pub strategy: StrategyKind,
    /// Initial consistency coefficient, in [0, 1].
    #[serde(default = "default_kappa_init")]
    pub kappa_init: f64,
    /// Unresolved-pressure level that triggers a semantic jump.
    #[serde(default = "default_jump_threshold")]
    pub jump_threshold: f64,
    /// Starting exploration temperature.
    #[serde(default = "default_temperature_base")]
    pub temperature_base: f64,
}

fn default_strategy_kind() -> StrategyKind {
    StrategyKind::Adaptive
}
fn default_kappa_init() -> f64 {
    0.3
}
fn default_jump_threshold() -> f64 {
    2.0
}
fn default_temperature_base() -> f64 {
    0.8
}

// ---------------------------------------------------------------------------
// Risk table
// ---------------------------------------------------------------------------

/// Payout and crash probability for a single risk value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskLevel {
    pub award: f64,
    pub crash_probability: f64,
}

/// The choice-indexed crash/award table. Entry 0 corresponds to risk value 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskTable {
    pub levels: Vec<RiskLevel>,
}

impl RiskTable {
    pub fn level(&self, value: u8) -> &RiskLevel {
        &self.levels[(value - RISK_MIN) as usize]
    }

    pub fn award(&self, value: u8) -> f64 {
        self.level(value).award
    }

    pub fn crash_probability(&self, value: u8) -> f64 {
        self.level(value).crash_probability
    }

    pub fn max_award(&self) -> f64 {
        self.levels.iter().map(|l| l.award).fold(0.0, f64::max)
    }
}

impl Default for RiskTable {
    fn default() -> Self {
        let rows: [(f64, f64); RISK_TABLE_LEN] = [
            (1.0, 0.02),
            (2.0, 0.04),
            (3.0, 0.07),
            (4.0, 0.10),
            (5.5, 0.15),
            (7.0, 0.22),
            (8.5, 0.30),
            (11.0, 0.42),
            (14.0, 0.55),
            (20.0, 0.75),
        ];
        Self {
            levels: rows
                .iter()
                .map(|&(award, crash_probability)| RiskLevel {
                    award,
                    crash_probability,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Environments
// ---------------------------------------------------------------------------

/// One entry in the environment catalogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentSpec {
    pub label: String,
    /// Added to every base crash probability; the effective probability is
    /// clamped to [0, 1].
    pub crash_delta: f64,
    /// Scales every base award.
    pub reward_multiplier: f64,
}

impl EnvironmentSpec {
    pub fn neutral() -> Self {
        Self {
            label: "normal".to_string(),
            crash_delta: 0.0,
            reward_multiplier: 1.0,
        }
    }
}

/// How the active environment is chosen at the start of each set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EnvironmentMode {
    /// Catalogue index per set; sets beyond the schedule use index 0.
    Fixed { schedule: Vec<usize> },
    /// Uniform draw from the catalogue.
    Random,
    /// Weighted vote among the living agents; ties go to the lowest index.
    Vote,
}

pub fn default_environment_catalogue() -> Vec<EnvironmentSpec> {
    vec![
        EnvironmentSpec {
            label: "safe".to_string(),
            crash_delta: -0.05,
            reward_multiplier: 0.75,
        },
        EnvironmentSpec::neutral(),
        EnvironmentSpec {
            label: "mild".to_string(),
            crash_delta: 0.05,
            reward_multiplier: 1.10,
        },
        EnvironmentSpec {
            label: "moderate".to_string(),
            crash_delta: 0.10,
            reward_multiplier: 1.30,
        },
        EnvironmentSpec {
            label: "deadly".to_string(),
            crash_delta: 0.20,
            reward_multiplier: 1.80,
        },
    ]
}

// ---------------------------------------------------------------------------
// HP economy, pressure weights, decision tuning
// ---------------------------------------------------------------------------

/// Hit-point economy: starting stock, cap, and the inter-set purchase cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HpEconomy {
    pub starting_hp: u32,
    pub max_hp: u32,
    pub cost_per_hp: f64,
}

impl Default for HpEconomy {
    fn default() -> Self {
        Self {
            starting_hp: 3,
            max_hp: 5,
            cost_per_hp: 20.0,
        }
    }
}

/// Convex weights for the four pressure components. Must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PressureWeights {
    pub rank: f64,
    pub score_gap: f64,
    pub time: f64,
    pub survival: f64,
    /// Normalizer for the score-gap component when the leader has 0 score.
    #[serde(default = "default_gap_ceiling")]
    pub gap_ceiling: f64,
}

fn default_gap_ceiling() -> f64 {
    50.0
}

impl PressureWeights {
    pub fn sum(&self) -> f64 {
        self.rank + self.score_gap + self.time + self.survival
    }
}

impl Default for PressureWeights {
    fn default() -> Self {
        Self {
            rank: 0.25,
            score_gap: 0.25,
            time: 0.20,
            survival: 0.30,
            gap_ceiling: default_gap_ceiling(),
        }
    }
}

/// Shared tuning for the per-agent decision core. All fields have documented
/// defaults so a config file only needs to override what it cares about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DecisionSettings {
    /// Per-round decay applied to unresolved pressure.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    /// Fraction of the jump threshold that survives as residual pressure.
    #[serde(default = "default_residual_fraction")]
    pub residual_fraction: f64,
    /// Bounded rate at which kappa drifts toward its pressure target.
    #[serde(default = "default_drift_rate")]
    pub drift_rate: f64,
    /// Kappa below this reads as a conservative posture.
    #[serde(default = "default_kappa_low")]
    pub kappa_low: f64,
    /// Kappa above this reads as an aggressive posture.
    #[serde(default = "default_kappa_high")]
    pub kappa_high: f64,
    #[serde(default = "default_temperature_min")]
    pub temperature_min: f64,
    #[serde(default = "default_temperature_max")]
    pub temperature_max: f64,
    /// Per-round temperature cooling while kappa is stable.
    #[serde(default = "default_cooling_rate")]
    pub cooling_rate: f64,
    /// Multiplicative temperature boost after a jump.
    #[serde(default = "default_jump_heat_factor")]
    pub jump_heat_factor: f64,
    /// Fraction of the distance to the chosen extreme covered by a jump.
    #[serde(default = "default_jump_scale")]
    pub jump_scale: f64,
    /// Probability that a losing agent's jump goes toward the aggressive
    /// extreme rather than the conservative one.
    #[serde(default = "default_desperation_bias")]
    pub desperation_bias: f64,
}

fn default_decay_rate() -> f64 {
    0.10
}
fn default_residual_fraction() -> f64 {
    0.10
}
fn default_drift_rate() -> f64 {
    0.25
}
fn default_kappa_low() -> f64 {
    0.35
}
fn default_kappa_high() -> f64 {
    0.65
}
fn default_temperature_min() -> f64 {
    0.30
}
fn default_temperature_max() -> f64 {
    3.0
}
fn default_cooling_rate() -> f64 {
    0.02
}
fn default_jump_heat_factor() -> f64 {
    1.5
}
fn default_jump_scale() -> f64 {
    0.6
}
fn default_desperation_bias() -> f64 {
    0.65
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            residual_fraction: default_residual_fraction(),
            drift_rate: default_drift_rate(),
            kappa_low: default_kappa_low(),
            kappa_high: default_kappa_high(),
            temperature_min: default_temperature_min(),
            temperature_max: default_temperature_max(),
            cooling_rate: default_cooling_rate(),
            jump_heat_factor: default_jump_heat_factor(),
            jump_scale: default_jump_scale(),
            desperation_bias: default_desperation_bias(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tournament configuration
// ---------------------------------------------------------------------------

/// The complete validated configuration handed to the engine at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentConfig {
    pub agents: Vec<AgentConfig>,
    pub sets: u32,
    pub rounds_per_set: u32,
    /// `None` means a non-reproducible run (the front end picks a seed).
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub risk_table: RiskTable,
    #[serde(default = "default_environment_catalogue")]
    pub environments: Vec<EnvironmentSpec>,
    #[serde(default = "default_environment_mode")]
    pub environment_mode: EnvironmentMode,
    #[serde(default)]
    pub hp: HpEconomy,
    #[serde(default)]
    pub pressure: PressureWeights,
    #[serde(default)]
    pub decision: DecisionSettings,
    /// Bonus credited at set end; entry 0 is the bonus for set rank 1.
    #[serde(default = "default_set_rank_bonus")]
    pub set_rank_bonus: Vec<f64>,
}

fn default_environment_mode() -> EnvironmentMode {
    EnvironmentMode::Vote
}

fn default_set_rank_bonus() -> Vec<f64> {
    vec![30.0, 15.0, 5.0]
}

impl TournamentConfig {
    pub fn total_rounds(&self) -> u32 {
        self.sets * self.rounds_per_set
    }

    /// Check every startup invariant. Called by the engine before any round
    /// executes; a failure here is fatal and nothing has run yet.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }
        if self.sets == 0 || self.rounds_per_set == 0 {
            return Err(ConfigError::EmptySchedule {
                sets: self.sets,
                rounds_per_set: self.rounds_per_set,
            });
        }

        if self.risk_table.levels.len() != RISK_TABLE_LEN {
            return Err(ConfigError::WrongRiskTableSize {
                len: self.risk_table.levels.len(),
            });
        }
        let mut previous = 0.0_f64;
        for (i, level) in self.risk_table.levels.iter().enumerate() {
            let value = RISK_MIN + i as u8;
            if !(0.0..=1.0).contains(&level.crash_probability) {
                return Err(ConfigError::ProbabilityOutOfRange {
                    value,
                    probability: level.crash_probability,
                });
            }
            if level.crash_probability < previous {
                return Err(ConfigError::NonMonotoneCrashTable { value });
            }
            previous = level.crash_probability;
            if level.award < 0.0 || !level.award.is_finite() {
                return Err(ConfigError::BadAward {
                    value,
                    award: level.award,
                });
            }
        }

        if self.environments.is_empty() {
            return Err(ConfigError::EmptyEnvironmentCatalogue);
        }
        for env in &self.environments {
            if !env.crash_delta.is_finite() {
                return Err(ConfigError::BadEnvironment {
                    label: env.label.clone(),
                    reason: "crash_delta is not finite",
                });
            }
            if env.reward_multiplier <= 0.0 || !env.reward_multiplier.is_finite() {
                return Err(ConfigError::BadEnvironment {
                    label: env.label.clone(),
                    reason: "reward_multiplier must be positive",
                });
            }
        }
        if let EnvironmentMode::Fixed { schedule } = &self.environment_mode {
            for &index in schedule {
                if index >= self.environments.len() {
                    return Err(ConfigError::EnvironmentIndexOutOfRange {
                        index,
                        catalogue_len: self.environments.len(),
                    });
                }
            }
        }

        let sum = self.pressure.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE || self.pressure.gap_ceiling <= 0.0 {
            return Err(ConfigError::BadPressureWeights { sum });
        }

        if self.hp.starting_hp == 0
            || self.hp.max_hp < self.hp.starting_hp
            || self.hp.cost_per_hp <= 0.0
        {
            return Err(ConfigError::BadHpEconomy {
                starting_hp: self.hp.starting_hp,
                max_hp: self.hp.max_hp,
                cost_per_hp: self.hp.cost_per_hp,
            });
        }

        let d = &self.decision;
        if !(0.0..1.0).contains(&d.decay_rate)
            || !(0.0..1.0).contains(&d.residual_fraction)
            || !(0.0..=1.0).contains(&d.drift_rate)
            || !(0.0..=1.0).contains(&d.jump_scale)
            || !(0.0..=1.0).contains(&d.desperation_bias)
            || d.kappa_low >= d.kappa_high
            || !(0.0..=1.0).contains(&d.kappa_low)
            || !(0.0..=1.0).contains(&d.kappa_high)
            || d.temperature_min <= 0.0
            || d.temperature_max < d.temperature_min
            || d.jump_heat_factor < 1.0
        {
            return Err(ConfigError::BadDecisionSettings);
        }

        for agent in &self.agents {
            let w = &agent.risk_weights;
            if w.low < 0.0 || w.medium < 0.0 || w.high < 0.0 || w.low + w.medium + w.high <= 0.0 {
                return Err(ConfigError::BadRiskWeights {
                    agent: agent.name.clone(),
                });
            }
            if !(0.0..=1.0).contains(&agent.kappa_init) {
                return Err(ConfigError::BadAgentTuning {
                    agent: agent.name.clone(),
                    reason: "kappa_init must be in [0, 1]",
                });
            }
            if agent.jump_threshold <= 0.0 {
                return Err(ConfigError::BadAgentTuning {
                    agent: agent.name.clone(),
                    reason: "jump_threshold must be positive",
                });
            }
            if agent.temperature_base < d.temperature_min
                || agent.temperature_base > d.temperature_max
            {
                return Err(ConfigError::BadAgentTuning {
                    agent: agent.name.clone(),
                    reason: "temperature_base outside the configured bounds",
                });
            }
        }

        for &bonus in &self.set_rank_bonus {
            if bonus < 0.0 || !bonus.is_finite() {
                return Err(ConfigError::BadSetRankBonus { bonus });
            }
        }

        Ok(())
    }
}

impl Default for TournamentConfig {
    fn default() -> Self {
        let roster = [
            ("Asuka", "aggressive", 0.8, 0.6, 0.8, 1.4),
            ("Boris", "cautious", 0.15, 2.0, 1.0, 0.5),
            ("Chike", "balanced", 0.5, 1.0, 1.2, 0.9),
            ("Dana", "strategic", 0.55, 0.9, 1.1, 1.1),
            ("Emil", "risk_taker", 0.85, 0.4, 0.7, 1.9),
            ("Faye", "conservative", 0.2, 1.8, 0.9, 0.4),
        ];
        let agents = roster
            .iter()
            .map(
                |&(name, personality, kappa_init, low, medium, high)| AgentConfig {
                    name: name.to_string(),
                    personality: personality.to_string(),
                    risk_weights: RiskWeights { low, medium, high },
                    strategy: StrategyKind::Adaptive,
                    kappa_init,
                    jump_threshold: default_jump_threshold(),
                    temperature_base: default_temperature_base(),
                },
            )
            .collect();
        Self {
            agents,
            sets: 3,
            rounds_per_set: 5,
            seed: None,
            risk_table: RiskTable::default(),
            environments: default_environment_catalogue(),
            environment_mode: default_environment_mode(),
            hp: HpEconomy::default(),
            pressure: PressureWeights::default(),
            decision: DecisionSettings::default(),
            set_rank_bonus: default_set_rank_bonus(),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Fatal startup errors. None of these are recoverable; the run must not
/// start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("at least one agent is required")]
    NoAgents,
    #[error("schedule is empty: sets={sets} rounds_per_set={rounds_per_set}")]
    EmptySchedule { sets: u32, rounds_per_set: u32 },
    #[error("risk table must have {RISK_TABLE_LEN} entries, got {len}")]
    WrongRiskTableSize { len: usize },
    #[error("crash probability {probability} for risk value {value} is outside [0, 1]")]
    ProbabilityOutOfRange { value: u8, probability: f64 },
    #[error("crash probabilities must be non-decreasing; violated at risk value {value}")]
    NonMonotoneCrashTable { value: u8 },
    #[error("award {award} for risk value {value} must be finite and non-negative")]
    BadAward { value: u8, award: f64 },
    #[error("environment catalogue is empty")]
    EmptyEnvironmentCatalogue,
    #[error("environment '{label}' is invalid: {reason}")]
    BadEnvironment { label: String, reason: &'static str },
    #[error("fixed environment schedule references index {index}, catalogue has {catalogue_len}")]
    EnvironmentIndexOutOfRange { index: usize, catalogue_len: usize },
    #[error("pressure weights must sum to 1 (got {sum}) with a positive gap ceiling")]
    BadPressureWeights { sum: f64 },
    #[error(
        "hp economy is inconsistent: starting_hp={starting_hp} max_hp={max_hp} \
         cost_per_hp={cost_per_hp}"
    )]
    BadHpEconomy {
        starting_hp: u32,
        max_hp: u32,
        cost_per_hp: f64,
    },
    #[error("decision settings are out of range")]
    BadDecisionSettings,
    #[error("agent '{agent}' has invalid risk weights")]
    BadRiskWeights { agent: String },
    #[error("agent '{agent}' is mistuned: {reason}")]
    BadAgentTuning { agent: String, reason: &'static str },
    #[error("set rank bonus {bonus} must be finite and non-negative")]
    BadSetRankBonus { bonus: f64 },
}

// ---------------------------------------------------------------------------
// Engine output surface
// ---------------------------------------------------------------------------

/// Discrete behavioral posture derived from the consistency coefficient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    Conservative,
    Neutral,
    Aggressive,
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Posture::Conservative => "conservative",
            Posture::Neutral => "neutral",
            Posture::Aggressive => "aggressive",
        };
        f.write_str(label)
    }
}

/// Immutable log entry for one agent-round outcome. Never mutated once
/// appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundRecord {
    pub set: u32,
    pub round: u32,
    pub agent_id: usize,
    pub choice: u8,
    pub crashed: bool,
    pub score_delta: f64,
    pub hp_delta: i32,
    pub posture: Posture,
    pub rationale: String,
    pub overall_pressure: f64,
}

/// One agent's line in a frozen set summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetStanding {
    pub agent_id: usize,
    pub set_rank: u32,
    pub set_score: f64,
    pub bonus: f64,
    pub alive: bool,
}

/// Read-only snapshot of one completed set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetSummary {
    pub set: u32,
    pub environment_label: String,
    pub standings: Vec<SetStanding>,
    pub survivors: u32,
}

/// One agent's line in the final ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalStanding {
    pub rank: u32,
    pub agent_id: usize,
    pub name: String,
    pub score: f64,
    pub alive: bool,
    pub winner: bool,
    pub crash_count: u32,
    pub jump_count: u32,
}

/// Per-agent state snapshot for inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSnapshot {
    pub agent_id: usize,
    pub name: String,
    pub personality: String,
    pub hp: u32,
    pub score: f64,
    pub alive: bool,
    pub crash_count: u32,
    pub jump_count: u32,
    pub kappa: f64,
    pub unresolved_pressure: f64,
    pub temperature: f64,
    pub posture: Posture,
    pub choice_history: Vec<u8>,
}

/// Full engine snapshot handed to display and tooling collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentSnapshot {
    pub schema_version: String,
    pub seed: u64,
    pub current_set: u32,
    pub current_round: u32,
    pub environment_label: String,
    pub finished: bool,
    pub agents: Vec<AgentSnapshot>,
    pub record_count: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
