//! Strategy selection: posture and personality in, a risk value out.
//!
//! Two families behind one `choose` contract, dispatched by explicit
//! variant: the adaptive family rides the decision core's posture and
//! temperature, the rule family runs fixed heuristics that ignore the
//! decision core entirely. Both are calibrated from the crash table itself,
//! so environment shifts re-tune them automatically.

use contracts::{
    EnvironmentSpec, Posture, RiskTable, RiskWeights, RuleKind, StrategyKind, RISK_MAX, RISK_MIN,
    RISK_TABLE_LEN,
};

use crate::rng::SimRng;

// ---------------------------------------------------------------------------
// Contract types
// ---------------------------------------------------------------------------

/// Everything a selector may look at when choosing a risk value.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceContext<'a> {
    /// 1-based round within the current set.
    pub round: u32,
    pub rounds_per_set: u32,
    pub is_final_round: bool,
    /// 1-based rank among the living agents.
    pub rank: u32,
    pub alive_count: u32,
    /// Deficit to the current leader; 0 when leading.
    pub score_gap: f64,
    pub hp: u32,
    pub max_hp: u32,
    pub overall_pressure: f64,
    pub table: &'a RiskTable,
    pub environment: &'a EnvironmentSpec,
    /// Previous-round choices of the other living agents.
    pub rival_choices: &'a [u8],
}

/// Read-only view of an agent's decision core, the only coupling between
/// the two state records.
#[derive(Debug, Clone, Copy)]
pub struct DecisionView {
    pub posture: Posture,
    pub temperature: f64,
    pub kappa: f64,
}

/// A risk value in [1, 10] plus a human-readable rationale tag.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskChoice {
    pub value: u8,
    pub rationale: String,
}

/// Inputs to the inter-set HP purchase decision.
#[derive(Debug, Clone, Copy)]
pub struct RefillContext {
    pub rank: u32,
    pub alive_count: u32,
    pub score_gap: f64,
    pub hp: u32,
    pub max_hp: u32,
    pub score: f64,
    pub cost_per_hp: f64,
    /// Crash delta of the environment the next set will run under.
    pub next_crash_delta: f64,
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Tagged strategy dispatch. New strategies are added by extending this
/// enum and its `choose` arm, never by branching on type names elsewhere.
#[derive(Debug, Clone)]
pub enum StrategySelector {
    Adaptive(AdaptiveStrategy),
    Rule(RuleStrategy),
}

impl StrategySelector {
    pub fn from_config(kind: StrategyKind, weights: RiskWeights) -> Self {
        match kind {
            StrategyKind::Adaptive => Self::Adaptive(AdaptiveStrategy { weights }),
            StrategyKind::Rule { rule } => Self::Rule(RuleStrategy { kind: rule }),
        }
    }

    /// Choose a risk value. Whatever the family computed, the result is
    /// clamped into [RISK_MIN, RISK_MAX] before it can reach the crash
    /// engine.
    pub fn choose(&self, ctx: &ChoiceContext<'_>, view: &DecisionView, rng: &mut SimRng) -> RiskChoice {
        let mut choice = match self {
            Self::Adaptive(strategy) => strategy.choose(ctx, view, rng),
            Self::Rule(strategy) => strategy.choose(ctx),
        };
        choice.value = choice.value.clamp(RISK_MIN, RISK_MAX);
        choice
    }

    /// Decide how many HP units to buy between sets. Shares the selector
    /// contract so rule agents and adaptive agents go through the same
    /// dispatch.
    pub fn decide_refill(&self, ctx: &RefillContext, view: &DecisionView) -> u32 {
        let affordable = (ctx.score / ctx.cost_per_hp).floor() as u32;
        let needed = ctx.max_hp.saturating_sub(ctx.hp);
        let purchasable = affordable.min(needed);
        if purchasable == 0 {
            return 0;
        }

        let kappa = view.kappa.clamp(0.0, 1.0);
        let conservative = 1.0 - kappa;

        let survival = {
            let missing = (ctx.max_hp - ctx.hp) as f64 / ctx.max_hp as f64;
            missing * missing
        };
        let env = (ctx.next_crash_delta.max(0.0) / 0.2).min(1.0) + 0.15;
        let gap_norm = (ctx.score_gap / 100.0).min(1.0);
        let strategic = if ctx.rank == 1 {
            -0.4
        } else if ctx.rank <= 3 {
            -0.6 * (1.0 - gap_norm)
        } else if ctx.rank * 2 <= ctx.alive_count + 1 {
            -0.2 * (1.0 - gap_norm)
        } else {
            0.5 * gap_norm
        };

        let urgency = survival * (1.0 + 0.5 * conservative)
            + env * (1.0 + 0.3 * conservative)
            + strategic * kappa;

        let mut count = if urgency > kappa * 2.5 {
            purchasable
        } else if urgency > kappa * 1.5 {
            (purchasable + 1) / 2
        } else if urgency > kappa * 0.8 {
            1
        } else {
            0
        };

        // One life against a hostile environment is not a bet to hold.
        if count == 0 && ctx.hp == 1 && ctx.next_crash_delta >= 0.15 {
            count = 1;
        }
        count.min(purchasable)
    }
}

// ---------------------------------------------------------------------------
// Effective table helpers
// ---------------------------------------------------------------------------

fn effective_crash(table: &RiskTable, env: &EnvironmentSpec, value: u8) -> f64 {
    (table.crash_probability(value) + env.crash_delta).clamp(0.0, 1.0)
}

/// Death cost of a value: crash exposure weighted by how much of the set is
/// still at stake and how thin the agent's HP is.
fn risk_score(
    table: &RiskTable,
    env: &EnvironmentSpec,
    value: u8,
    remaining_rounds: u32,
    rounds_per_set: u32,
    hp: u32,
) -> f64 {
    let exposure = remaining_rounds as f64 / rounds_per_set.max(1) as f64;
    let hp_penalty = 1.0 + 1.5 / hp.max(1) as f64;
    effective_crash(table, env, value) * exposure * hp_penalty
}

/// Win-out power of a value: survival odds times what it pays.
fn leverage_score(table: &RiskTable, env: &EnvironmentSpec, value: u8) -> f64 {
    (1.0 - effective_crash(table, env, value))
        * (value as f64 + table.award(value) * env.reward_multiplier)
}

/// Safe and push bands derived from the effective table: the lowest-risk
/// third and the highest-leverage third of the range.
#[derive(Debug, Clone)]
struct RiskBands {
    safe: Vec<u8>,
    push: Vec<u8>,
}

impl RiskBands {
    fn calibrate(table: &RiskTable, env: &EnvironmentSpec, rounds_per_set: u32, hp: u32) -> Self {
        let mid_rounds = (rounds_per_set / 2).max(1);
        let mut by_risk: Vec<u8> = (RISK_MIN..=RISK_MAX).collect();
        by_risk.sort_by(|&a, &b| {
            let ra = risk_score(table, env, a, mid_rounds, rounds_per_set, hp);
            let rb = risk_score(table, env, b, mid_rounds, rounds_per_set, hp);
            ra.partial_cmp(&rb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        let mut by_leverage: Vec<u8> = (RISK_MIN..=RISK_MAX).collect();
        by_leverage.sort_by(|&a, &b| {
            let la = leverage_score(table, env, a);
            let lb = leverage_score(table, env, b);
            lb.partial_cmp(&la)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let k = (RISK_TABLE_LEN / 3).max(1);
        Self {
            safe: by_risk[..k].to_vec(),
            push: by_leverage[..k].to_vec(),
        }
    }

    fn safest(
        &self,
        pool: &[u8],
        table: &RiskTable,
        env: &EnvironmentSpec,
        remaining: u32,
        rounds_per_set: u32,
        hp: u32,
    ) -> u8 {
        pool.iter()
            .copied()
            .min_by(|&a, &b| {
                let ra = risk_score(table, env, a, remaining, rounds_per_set, hp);
                let rb = risk_score(table, env, b, remaining, rounds_per_set, hp);
                ra.partial_cmp(&rb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            })
            .unwrap_or(RISK_MIN)
    }

    fn best_push(&self, table: &RiskTable, env: &EnvironmentSpec) -> u8 {
        self.push
            .iter()
            .copied()
            .max_by(|&a, &b| {
                let la = leverage_score(table, env, a);
                let lb = leverage_score(table, env, b);
                la.partial_cmp(&lb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.cmp(&a))
            })
            .unwrap_or(RISK_MAX)
    }
}

// ---------------------------------------------------------------------------
// Adaptive family
// ---------------------------------------------------------------------------

const LOW_BAND: std::ops::RangeInclusive<u8> = 1..=4;
const MEDIUM_BAND: std::ops::RangeInclusive<u8> = 5..=7;

/// Posture- and temperature-driven softmax over the risk range.
#[derive(Debug, Clone)]
pub struct AdaptiveStrategy {
    pub weights: RiskWeights,
}

impl AdaptiveStrategy {
    fn choose(&self, ctx: &ChoiceContext<'_>, view: &DecisionView, rng: &mut SimRng) -> RiskChoice {
        let mut scores = [0.0_f64; RISK_TABLE_LEN];

        let (low_mult, medium_mult, high_mult) = match view.posture {
            Posture::Conservative => (1.8, 0.9, 0.3),
            Posture::Neutral => (1.0, 1.2, 0.8),
            Posture::Aggressive => (0.4, 1.0, 1.9),
        };

        for (i, score) in scores.iter_mut().enumerate() {
            let value = RISK_MIN + i as u8;
            *score = if LOW_BAND.contains(&value) {
                self.weights.low * low_mult
            } else if MEDIUM_BAND.contains(&value) {
                self.weights.medium * medium_mult
            } else {
                self.weights.high * high_mult
            };
        }

        let desperate = apply_hp_fear(&mut scores, ctx);

        // Softmax with the max score subtracted; fear multipliers can push
        // raw scores far beyond what exp() tolerates.
        let temperature =
            (view.temperature * (1.0 + 0.3 * ctx.overall_pressure)).max(f64::MIN_POSITIVE);
        let peak = scores.iter().fold(f64::MIN, |acc, &s| acc.max(s));
        let weights: Vec<f64> = scores
            .iter()
            .map(|&s| ((s - peak) / temperature).exp())
            .collect();

        let value = RISK_MIN + rng.weighted_index(&weights) as u8;
        let rationale = self.rationale(ctx, view, desperate);
        RiskChoice { value, rationale }
    }

    fn rationale(&self, ctx: &ChoiceContext<'_>, view: &DecisionView, desperate: bool) -> String {
        if ctx.hp == 1 {
            return if desperate {
                "one life left, swinging anyway".to_string()
            } else {
                "one life left, hugging the floor".to_string()
            };
        }
        match view.posture {
            Posture::Conservative => "keeping exposure down".to_string(),
            Posture::Neutral => "reading the table".to_string(),
            Posture::Aggressive => {
                if ctx.rank > 1 {
                    "chasing the leader".to_string()
                } else {
                    "pressing the lead".to_string()
                }
            }
        }
    }
}

/// Low-HP fear reshaping. Returns true when the agent is in the desperate
/// branch (one HP and near-maximal pressure).
fn apply_hp_fear(scores: &mut [f64; RISK_TABLE_LEN], ctx: &ChoiceContext<'_>) -> bool {
    let hp_ratio = ctx.hp as f64 / ctx.max_hp.max(1) as f64;

    if hp_ratio <= 0.2 {
        let desperate = ctx.overall_pressure >= 0.8;
        if desperate {
            // Backs to the wall: mid values, not the extremes.
            scores[0] *= 10.0;
            for s in &mut scores[1..5] {
                *s *= 5.0;
            }
            for s in &mut scores[5..8] {
                *s *= 2.0;
            }
            for s in &mut scores[8..] {
                *s *= 0.5;
            }
        } else {
            scores[0] *= 100.0;
            for s in &mut scores[1..3] {
                *s *= 3.0;
            }
            for s in &mut scores[3..5] {
                *s *= 1.2;
            }
            for s in &mut scores[5..7] {
                *s *= 0.3;
            }
            for s in &mut scores[7..] {
                *s *= 0.01;
            }
        }
        return desperate;
    }

    if hp_ratio <= 0.4 {
        let fear = (1.0 - hp_ratio) * 5.0;
        for s in &mut scores[..5] {
            *s *= 1.0 + fear * 0.8;
        }
        for s in &mut scores[5..7] {
            *s *= 1.0 + fear * 0.3;
        }
        for s in &mut scores[7..] {
            *s *= (1.0 - fear * 0.5).max(0.1);
        }
    } else if hp_ratio <= 0.6 {
        for s in &mut scores[..7] {
            *s *= 1.5;
        }
        for s in &mut scores[7..] {
            *s *= 0.7;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Rule family
// ---------------------------------------------------------------------------

/// Fixed heuristics, independent of the decision core.
#[derive(Debug, Clone)]
pub struct RuleStrategy {
    pub kind: RuleKind,
}

impl RuleStrategy {
    fn choose(&self, ctx: &ChoiceContext<'_>) -> RiskChoice {
        let bands = RiskBands::calibrate(ctx.table, ctx.environment, ctx.rounds_per_set, ctx.hp);
        let remaining = ctx.rounds_per_set.saturating_sub(ctx.round) + 1;
        let safest_safe = |pool: &[u8]| {
            bands.safest(
                pool,
                ctx.table,
                ctx.environment,
                remaining,
                ctx.rounds_per_set,
                ctx.hp,
            )
        };

        let (value, rationale) = match self.kind {
            RuleKind::AnchorSafest => (safest_safe(&bands.safe), "anchored on the safe band"),
            RuleKind::HpGuard => {
                if ctx.hp <= 2 {
                    (safest_safe(&bands.safe), "guarding thin hp")
                } else {
                    let overlap: Vec<u8> = bands
                        .push
                        .iter()
                        .copied()
                        .filter(|v| bands.safe.contains(v))
                        .collect();
                    let pool = if overlap.is_empty() {
                        &bands.push
                    } else {
                        &overlap
                    };
                    (safest_safe(pool), "hp buffer allows a push")
                }
            }
            RuleKind::SafeThenPush => {
                if ctx.is_final_round && ctx.rank > 1 {
                    (
                        bands.best_push(ctx.table, ctx.environment),
                        "behind on the final round",
                    )
                } else if remaining <= 2 && ctx.rank > 1 {
                    (
                        bands.best_push(ctx.table, ctx.environment),
                        "late set, still behind",
                    )
                } else {
                    (safest_safe(&bands.safe), "safe until it matters")
                }
            }
            RuleKind::CopycatPlusOne => {
                let target = if ctx.rival_choices.is_empty() {
                    7
                } else {
                    let sum: u32 = ctx.rival_choices.iter().map(|&c| c as u32).sum();
                    let mean = sum as f64 / ctx.rival_choices.len() as f64;
                    ((mean + 1.0).round() as u8).clamp(RISK_MIN, RISK_MAX)
                };
                let pool: Vec<u8> = {
                    let mut p = bands.safe.clone();
                    for &v in &bands.push {
                        if !p.contains(&v) {
                            p.push(v);
                        }
                    }
                    p
                };
                let value = pool
                    .iter()
                    .copied()
                    .min_by_key(|&v| {
                        let distance = (v as i32 - target as i32).unsigned_abs();
                        let risk_milli = (risk_score(
                            ctx.table,
                            ctx.environment,
                            v,
                            remaining,
                            ctx.rounds_per_set,
                            ctx.hp,
                        ) * 1000.0) as u32;
                        (distance, risk_milli, v)
                    })
                    .unwrap_or(RISK_MIN);
                (value, "shadowing the field")
            }
            RuleKind::AntiCrash => {
                let all: Vec<u8> = (RISK_MIN..=RISK_MAX).collect();
                (safest_safe(&all), "minimum exposure")
            }
            RuleKind::FinalGambler => {
                if ctx.is_final_round && ctx.rank > 1 {
                    (
                        bands.best_push(ctx.table, ctx.environment),
                        "the one round worth a gamble",
                    )
                } else {
                    (safest_safe(&bands.safe), "waiting for the final round")
                }
            }
        };

        RiskChoice {
            value,
            rationale: rationale.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RiskTable {
        RiskTable::default()
    }

    fn neutral_env() -> EnvironmentSpec {
        EnvironmentSpec::neutral()
    }

    fn ctx<'a>(table: &'a RiskTable, env: &'a EnvironmentSpec) -> ChoiceContext<'a> {
        ChoiceContext {
            round: 1,
            rounds_per_set: 5,
            is_final_round: false,
            rank: 3,
            alive_count: 6,
            score_gap: 10.0,
            hp: 3,
            max_hp: 5,
            overall_pressure: 0.4,
            table,
            environment: env,
            rival_choices: &[],
        }
    }

    fn neutral_view() -> DecisionView {
        DecisionView {
            posture: Posture::Neutral,
            temperature: 0.8,
            kappa: 0.5,
        }
    }

    #[test]
    fn bands_put_lowest_values_in_safe() {
        let t = table();
        let env = neutral_env();
        let bands = RiskBands::calibrate(&t, &env, 5, 3);
        assert!(bands.safe.contains(&1));
        assert!(bands.safe.contains(&2));
        assert!(!bands.safe.contains(&10));
        assert!(!bands.push.is_empty());
    }

    #[test]
    fn anchor_safest_picks_value_one_on_default_table() {
        let t = table();
        let env = neutral_env();
        let strategy = RuleStrategy {
            kind: RuleKind::AnchorSafest,
        };
        let choice = strategy.choose(&ctx(&t, &env));
        assert_eq!(choice.value, 1);
    }

    #[test]
    fn final_gambler_pushes_only_when_behind_on_final_round() {
        let t = table();
        let env = neutral_env();
        let strategy = RuleStrategy {
            kind: RuleKind::FinalGambler,
        };

        let mut early = ctx(&t, &env);
        early.is_final_round = false;
        let quiet = strategy.choose(&early);
        assert!(quiet.value <= 3);

        let mut last = ctx(&t, &env);
        last.round = 5;
        last.is_final_round = true;
        last.rank = 4;
        let gamble = strategy.choose(&last);
        assert!(gamble.value > quiet.value);
    }

    #[test]
    fn copycat_tracks_rival_average() {
        let t = table();
        let env = neutral_env();
        let strategy = RuleStrategy {
            kind: RuleKind::CopycatPlusOne,
        };
        let rivals = [4_u8, 4, 4];
        let mut c = ctx(&t, &env);
        c.rival_choices = &rivals;
        let choice = strategy.choose(&c);
        // Target is 5; the chosen value is the pool entry closest to it.
        assert!((choice.value as i32 - 5).abs() <= 2);
    }

    #[test]
    fn selector_clamps_into_risk_range() {
        let t = table();
        let env = neutral_env();
        let selector =
            StrategySelector::from_config(StrategyKind::Adaptive, RiskWeights::default());
        let mut rng = SimRng::new(9);
        for _ in 0..200 {
            let choice = selector.choose(&ctx(&t, &env), &neutral_view(), &mut rng);
            assert!((RISK_MIN..=RISK_MAX).contains(&choice.value));
            assert!(!choice.rationale.is_empty());
        }
    }

    #[test]
    fn one_hp_adaptive_agent_hugs_the_floor() {
        let t = table();
        let env = neutral_env();
        let selector =
            StrategySelector::from_config(StrategyKind::Adaptive, RiskWeights::default());
        let mut c = ctx(&t, &env);
        c.hp = 1;
        c.overall_pressure = 0.3;
        let mut rng = SimRng::new(10);
        let mut low = 0;
        for _ in 0..200 {
            let choice = selector.choose(&c, &neutral_view(), &mut rng);
            if choice.value <= 3 {
                low += 1;
            }
        }
        assert!(low > 150, "expected mostly low picks, got {low}/200");
    }

    #[test]
    fn aggressive_posture_raises_average_choice() {
        let t = table();
        let env = neutral_env();
        let selector =
            StrategySelector::from_config(StrategyKind::Adaptive, RiskWeights::default());
        let c = ctx(&t, &env);

        let mut rng = SimRng::new(11);
        let mut conservative_view = neutral_view();
        conservative_view.posture = Posture::Conservative;
        let conservative_sum: u32 = (0..300)
            .map(|_| selector.choose(&c, &conservative_view, &mut rng).value as u32)
            .sum();

        let mut aggressive_view = neutral_view();
        aggressive_view.posture = Posture::Aggressive;
        let aggressive_sum: u32 = (0..300)
            .map(|_| selector.choose(&c, &aggressive_view, &mut rng).value as u32)
            .sum();

        assert!(aggressive_sum > conservative_sum);
    }

    #[test]
    fn deadly_environment_shifts_safe_band_down() {
        let t = table();
        let deadly = EnvironmentSpec {
            label: "deadly".to_string(),
            crash_delta: 0.20,
            reward_multiplier: 1.8,
        };
        let bands = RiskBands::calibrate(&t, &deadly, 5, 3);
        // The safe band must still be the lowest effective-risk values.
        assert!(bands.safe.iter().all(|&v| v <= 4));
    }

    #[test]
    fn refill_buys_when_desperate_and_skips_when_comfortable() {
        let selector =
            StrategySelector::from_config(StrategyKind::Adaptive, RiskWeights::default());

        let desperate = RefillContext {
            rank: 6,
            alive_count: 6,
            score_gap: 90.0,
            hp: 1,
            max_hp: 5,
            score: 100.0,
            cost_per_hp: 20.0,
            next_crash_delta: 0.2,
        };
        let cautious_view = DecisionView {
            posture: Posture::Conservative,
            temperature: 0.8,
            kappa: 0.2,
        };
        assert!(selector.decide_refill(&desperate, &cautious_view) >= 1);

        let comfortable = RefillContext {
            rank: 1,
            alive_count: 6,
            score_gap: 0.0,
            hp: 5,
            max_hp: 5,
            score: 100.0,
            cost_per_hp: 20.0,
            next_crash_delta: -0.05,
        };
        assert_eq!(selector.decide_refill(&comfortable, &cautious_view), 0);
    }

    #[test]
    fn refill_never_exceeds_affordable_or_needed() {
        let selector =
            StrategySelector::from_config(StrategyKind::Adaptive, RiskWeights::default());
        let ctx = RefillContext {
            rank: 5,
            alive_count: 6,
            score_gap: 80.0,
            hp: 2,
            max_hp: 5,
            score: 25.0,
            cost_per_hp: 20.0,
            next_crash_delta: 0.2,
        };
        let view = DecisionView {
            posture: Posture::Conservative,
            temperature: 0.8,
            kappa: 0.1,
        };
        let bought = selector.decide_refill(&ctx, &view);
        assert!(bought <= 1, "only one unit is affordable, got {bought}");
    }
}
