//! Per-agent decision core: the (kappa, E, T) state machine.
//!
//! Continuous-valued, stepped once per agent round. Overall pressure feeds
//! unresolved pressure E; when E crosses the agent's jump threshold the
//! state takes a discrete "semantic jump" — a large kappa perturbation plus
//! renewed exploration — instead of its usual smooth drift.

use contracts::{DecisionSettings, Posture};

use crate::rng::SimRng;

// ---------------------------------------------------------------------------
// Parameters and state
// ---------------------------------------------------------------------------

/// Fully-resolved tuning for one agent's decision core: the shared
/// [`DecisionSettings`] plus the agent's own jump threshold.
#[derive(Debug, Clone, Copy)]
pub struct DecisionParams {
    pub settings: DecisionSettings,
    pub jump_threshold: f64,
}

/// Mutable psychological state of one agent. Owned by the agent; the
/// tournament engine never writes it directly.
#[derive(Debug, Clone)]
pub struct DecisionState {
    /// Consistency coefficient in [0, 1]; high values read as aggressive.
    pub kappa: f64,
    /// Unresolved pressure, >= 0. Accumulates until a jump resets it.
    pub unresolved: f64,
    /// Exploration temperature, bounded by the configured range.
    pub temperature: f64,
    pub jump_count: u32,
    pub last_posture: Posture,
}

/// The minimal projection of contest state the decision core is allowed to
/// see. Game state itself never crosses this boundary.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput {
    /// Overall pressure from the pressure calculator, in [0, 1].
    pub pressure: f64,
    /// True when the agent currently sits in the winning group.
    pub winning: bool,
}

/// Emitted when unresolved pressure crossed the jump threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpEvent {
    pub direction: JumpDirection,
    pub kappa_before: f64,
    pub kappa_after: f64,
    pub pressure_at_jump: f64,
}

/// Which extreme a jump moved kappa toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpDirection {
    Aggressive,
    Conservative,
}

impl DecisionState {
    pub fn new(kappa_init: f64, temperature_base: f64, settings: &DecisionSettings) -> Self {
        let kappa = kappa_init.clamp(0.0, 1.0);
        Self {
            kappa,
            unresolved: 0.0,
            temperature: temperature_base
                .clamp(settings.temperature_min, settings.temperature_max),
            jump_count: 0,
            last_posture: posture_of(kappa, settings),
        }
    }

    pub fn posture(&self, settings: &DecisionSettings) -> Posture {
        posture_of(self.kappa, settings)
    }
}

fn posture_of(kappa: f64, settings: &DecisionSettings) -> Posture {
    if kappa < settings.kappa_low {
        Posture::Conservative
    } else if kappa > settings.kappa_high {
        Posture::Aggressive
    } else {
        Posture::Neutral
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Advance the state machine by one round.
///
/// The RNG is consulted exactly once, and only for the jump direction of a
/// losing agent; every other path is a pure function of (state, input).
pub fn step(
    params: &DecisionParams,
    state: &mut DecisionState,
    input: DecisionInput,
    rng: &mut SimRng,
) -> Option<JumpEvent> {
    let s = &params.settings;
    let pressure = input.pressure.clamp(0.0, 1.0);

    // Pressure accumulation with decay, floored at zero.
    state.unresolved =
        (state.unresolved + pressure - s.decay_rate * state.unresolved).max(0.0);

    let jump = if state.unresolved > params.jump_threshold {
        Some(fire_jump(params, state, pressure, input.winning, rng))
    } else {
        drift(s, state, pressure);
        None
    };

    state.last_posture = posture_of(state.kappa, s);
    jump
}

/// Discrete transition: reset unresolved pressure to a small residual,
/// perturb kappa toward an extreme, reheat the temperature.
fn fire_jump(
    params: &DecisionParams,
    state: &mut DecisionState,
    pressure: f64,
    winning: bool,
    rng: &mut SimRng,
) -> JumpEvent {
    let s = &params.settings;
    let kappa_before = state.kappa;

    // Winning agents chase the reward; threatened agents may lock up or
    // lash out, with a configured bias toward lashing out.
    let direction = if winning || rng.next_f64() < s.desperation_bias {
        JumpDirection::Aggressive
    } else {
        JumpDirection::Conservative
    };
    let extreme = match direction {
        JumpDirection::Aggressive => 1.0,
        JumpDirection::Conservative => 0.0,
    };

    state.kappa = (state.kappa + s.jump_scale * (extreme - state.kappa)).clamp(0.0, 1.0);
    state.unresolved = s.residual_fraction * params.jump_threshold;
    state.temperature =
        (state.temperature * s.jump_heat_factor).clamp(s.temperature_min, s.temperature_max);
    state.jump_count += 1;

    JumpEvent {
        direction,
        kappa_before,
        kappa_after: state.kappa,
        pressure_at_jump: pressure,
    }
}

/// Smooth transition: kappa drifts toward the pressure target at a bounded
/// rate, and the temperature cools as the drift settles.
fn drift(settings: &DecisionSettings, state: &mut DecisionState, pressure: f64) {
    let target = pressure;
    state.kappa = (state.kappa + settings.drift_rate * (target - state.kappa)).clamp(0.0, 1.0);

    let stability = 1.0 - (target - state.kappa).abs();
    state.temperature = (state.temperature - settings.cooling_rate * stability)
        .clamp(settings.temperature_min, settings.temperature_max);
}
