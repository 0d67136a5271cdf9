//! Crash engine: one Bernoulli draw per agent-round.
//!
//! The risk table is validated at startup; by the time a value reaches this
//! module an out-of-range choice is a core bug, not a user error, and is
//! treated as a fatal assertion.

use contracts::{EnvironmentSpec, RiskTable, RISK_MAX, RISK_MIN};

use crate::rng::SimRng;
use crate::round2;

/// Outcome of resolving one risk choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundOutcome {
    pub crashed: bool,
    /// Score gained on success, 0 on a crash. Already environment-scaled
    /// and rounded to the engine's fixed precision.
    pub score_delta: f64,
    pub effective_probability: f64,
}

/// Stateless resolver over a validated risk table.
#[derive(Debug, Clone)]
pub struct CrashEngine {
    table: RiskTable,
}

impl CrashEngine {
    pub fn new(table: RiskTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RiskTable {
        &self.table
    }

    /// Environment-adjusted crash probability for a value, clamped to [0, 1].
    pub fn effective_probability(&self, value: u8, env: &EnvironmentSpec) -> f64 {
        (self.table.crash_probability(value) + env.crash_delta).clamp(0.0, 1.0)
    }

    /// Resolve one choice against the active environment.
    pub fn resolve(&self, value: u8, env: &EnvironmentSpec, rng: &mut SimRng) -> RoundOutcome {
        assert!(
            (RISK_MIN..=RISK_MAX).contains(&value),
            "risk value {value} escaped the selector clamp; environment={env:?}"
        );

        let effective_probability = self.effective_probability(value, env);
        let crashed = rng.bernoulli(effective_probability);
        let score_delta = if crashed {
            0.0
        } else {
            round2(self.table.award(value) * env.reward_multiplier)
        };

        RoundOutcome {
            crashed,
            score_delta,
            effective_probability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CrashEngine {
        CrashEngine::new(RiskTable::default())
    }

    #[test]
    fn zero_probability_never_crashes() {
        let mut table = RiskTable::default();
        table.levels[0].crash_probability = 0.0;
        let engine = CrashEngine::new(table);
        let env = EnvironmentSpec::neutral();
        let mut rng = SimRng::new(1);
        for _ in 0..1000 {
            assert!(!engine.resolve(1, &env, &mut rng).crashed);
        }
    }

    #[test]
    fn certain_probability_always_crashes() {
        let mut table = RiskTable::default();
        for level in &mut table.levels {
            level.crash_probability = 1.0;
        }
        let engine = CrashEngine::new(table);
        let env = EnvironmentSpec::neutral();
        let mut rng = SimRng::new(2);
        for value in RISK_MIN..=RISK_MAX {
            let outcome = engine.resolve(value, &env, &mut rng);
            assert!(outcome.crashed);
            assert_eq!(outcome.score_delta, 0.0);
        }
    }

    #[test]
    fn environment_delta_is_additive_and_clamped() {
        let engine = engine();
        let harsh = EnvironmentSpec {
            label: "harsh".to_string(),
            crash_delta: 0.5,
            reward_multiplier: 1.0,
        };
        // Base 0.75 + 0.5 clamps to 1.0.
        assert_eq!(engine.effective_probability(10, &harsh), 1.0);

        let gentle = EnvironmentSpec {
            label: "gentle".to_string(),
            crash_delta: -0.5,
            reward_multiplier: 1.0,
        };
        // Base 0.02 - 0.5 clamps to 0.0.
        assert_eq!(engine.effective_probability(1, &gentle), 0.0);
    }

    #[test]
    fn award_is_scaled_and_rounded() {
        let engine = engine();
        let env = EnvironmentSpec {
            label: "boosted".to_string(),
            crash_delta: -1.0, // never crash
            reward_multiplier: 1.1,
        };
        let mut rng = SimRng::new(3);
        let outcome = engine.resolve(5, &env, &mut rng);
        assert!(!outcome.crashed);
        // 5.5 * 1.1 = 6.05 exactly at 2-decimal precision.
        assert_eq!(outcome.score_delta, 6.05);
    }

    #[test]
    fn crash_frequency_converges_to_configured_probability() {
        let engine = engine();
        let env = EnvironmentSpec::neutral();
        let mut rng = SimRng::new(12345);
        let trials = 10_000;
        let mut crashes = 0;
        for _ in 0..trials {
            if engine.resolve(5, &env, &mut rng).crashed {
                crashes += 1;
            }
        }
        let frequency = crashes as f64 / trials as f64;
        let expected = engine.table().crash_probability(5);
        assert!(
            (frequency - expected).abs() < 0.015,
            "frequency {frequency} strayed from {expected}"
        );
    }

    #[test]
    #[should_panic(expected = "escaped the selector clamp")]
    fn out_of_range_value_is_a_fatal_assertion() {
        let engine = engine();
        let env = EnvironmentSpec::neutral();
        let mut rng = SimRng::new(4);
        let _ = engine.resolve(11, &env, &mut rng);
    }
}
