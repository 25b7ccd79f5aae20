//! Charging decision rule for evsolar
//!
//! Turns the latest surplus and battery reserve into a stable
//! charge/no-charge decision. Starting requires the surplus to reach the
//! start threshold; stopping requires it to fall below the start threshold
//! minus the hysteresis margin, so a surplus wandering inside that band
//! never toggles the charger. Both edges can additionally require the
//! condition to hold for several consecutive cycles.
//!
//! While charging, [`RatePolicy`] picks the charging current from the
//! power the charger may draw without pushing the surplus under the stop
//! threshold. It never influences the on/off decision.

use crate::config::{RateConfig, ThresholdsConfig};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;

/// Charging state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    /// Charger enabled
    Charging,

    /// Charger disabled
    Idle,
}

impl ChargeState {
    pub fn is_charging(self) -> bool {
        matches!(self, Self::Charging)
    }

    pub fn from_enabled(enabled: bool) -> Self {
        if enabled { Self::Charging } else { Self::Idle }
    }
}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charging => f.write_str("CHARGING"),
            Self::Idle => f.write_str("IDLE"),
        }
    }
}

/// The process-wide control state: desired charging state and when it last changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeDecision {
    pub state: ChargeState,
    pub since: DateTime<Utc>,
}

impl ChargeDecision {
    pub fn idle(now: DateTime<Utc>) -> Self {
        Self {
            state: ChargeState::Idle,
            since: now,
        }
    }

    pub fn charging(now: DateTime<Utc>) -> Self {
        Self {
            state: ChargeState::Charging,
            since: now,
        }
    }

    pub fn is_charging(&self) -> bool {
        self.state.is_charging()
    }

    fn transition(self, state: ChargeState, now: DateTime<Utc>) -> Self {
        if self.state == state {
            self
        } else {
            Self { state, since: now }
        }
    }

    /// Align with a state observed on the charger itself
    ///
    /// Used when nothing has been confirmed yet (startup, after a
    /// suspension); the rule then continues from what the charger does.
    pub fn adopt(self, observed: ChargeState, now: DateTime<Utc>) -> Self {
        self.transition(observed, now)
    }
}

/// Decision thresholds, immutable for the process lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub start_surplus_watts: f64,
    pub hysteresis_watts: f64,
    pub min_battery_reserve_percent: f64,
    pub start_confirm_cycles: usize,
    pub stop_confirm_cycles: usize,
}

impl Thresholds {
    /// Single-cycle thresholds
    pub fn new(start_surplus_watts: f64, hysteresis_watts: f64, min_reserve_percent: f64) -> Self {
        Self {
            start_surplus_watts,
            hysteresis_watts,
            min_battery_reserve_percent: min_reserve_percent,
            start_confirm_cycles: 1,
            stop_confirm_cycles: 1,
        }
    }

    pub fn from_config(cfg: &ThresholdsConfig) -> Self {
        Self {
            start_surplus_watts: cfg.start_surplus_watts,
            hysteresis_watts: cfg.hysteresis_watts,
            min_battery_reserve_percent: cfg.min_battery_reserve_percent,
            start_confirm_cycles: cfg.start_confirm_cycles.max(1),
            stop_confirm_cycles: cfg.stop_confirm_cycles.max(1),
        }
    }

    #[must_use]
    pub fn with_confirm_cycles(mut self, start: usize, stop: usize) -> Self {
        self.start_confirm_cycles = start.max(1);
        self.stop_confirm_cycles = stop.max(1);
        self
    }

    /// Surplus below which a running charge stops
    pub fn stop_threshold_watts(&self) -> f64 {
        self.start_surplus_watts - self.hysteresis_watts
    }

    pub fn reserve_ok(&self, reserve_percent: f64) -> bool {
        reserve_percent >= self.min_battery_reserve_percent
    }

    /// Samples the surplus window must keep
    pub fn history_len(&self) -> usize {
        self.start_confirm_cycles.max(self.stop_confirm_cycles).max(1)
    }
}

/// House consumption without the EV, estimated from the site meter
///
/// There is no house-only meter, so this is only as precise as the two
/// vendor meters it is derived from.
pub fn estimate_base_load(site_load_watts: f64, charger_draw_watts: f64) -> f64 {
    (site_load_watts - charger_draw_watts).max(0.0)
}

/// Solar production left after the house and the current EV draw
pub fn surplus_watts(solar_watts: f64, base_load_watts: f64, charger_draw_watts: f64) -> f64 {
    solar_watts - base_load_watts - charger_draw_watts
}

/// Bounded history of recent surplus values
#[derive(Debug, Clone)]
pub struct SurplusWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SurplusWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn for_thresholds(thresholds: &Thresholds) -> Self {
        Self::new(thresholds.history_len())
    }

    pub fn push(&mut self, surplus_watts: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(surplus_watts);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    fn recent(&self, count: usize) -> Option<impl Iterator<Item = f64> + '_> {
        if count == 0 || self.samples.len() < count {
            return None;
        }
        Some(self.samples.iter().skip(self.samples.len() - count).copied())
    }

    /// Lowest of the last `count` samples; `None` until that many exist
    pub fn min_recent(&self, count: usize) -> Option<f64> {
        self.recent(count).map(|it| it.fold(f64::INFINITY, f64::min))
    }

    /// Highest of the last `count` samples; `None` until that many exist
    pub fn max_recent(&self, count: usize) -> Option<f64> {
        self.recent(count).map(|it| it.fold(f64::NEG_INFINITY, f64::max))
    }

    /// Average of the samples held so far
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Current limits for following the available power
#[derive(Debug, Clone, PartialEq)]
pub struct RateTracking {
    pub min_amps: u32,
    pub max_amps: u32,
    pub offset_amps: i32,
    pub smooth_cycles: usize,
    pub line_voltage: f64,
}

impl RateTracking {
    /// Charging current for `available_watts`, clamped to the charger range
    pub fn amps_for(&self, available_watts: f64) -> u32 {
        // Whole amps, truncated toward zero
        let whole = (available_watts / self.line_voltage).trunc();
        let amps = if whole.is_finite() { whole as i64 } else { 0 } + i64::from(self.offset_amps);
        let clamped = amps.clamp(i64::from(self.min_amps), i64::from(self.max_amps));
        u32::try_from(clamped).unwrap_or(self.min_amps)
    }
}

/// How the charging current is chosen
#[derive(Debug, Clone, PartialEq)]
pub enum RatePolicy {
    /// Leave the charger's current alone
    Unmanaged,
    /// Apply one current whenever charging is switched on
    Fixed(u32),
    /// Follow the smoothed power available to the charger
    Tracking(RateTracking),
}

impl RatePolicy {
    pub fn from_config(cfg: &RateConfig, fixed_amps: Option<u32>) -> Self {
        if let Some(amps) = fixed_amps {
            return Self::Fixed(amps);
        }
        if !cfg.tracking {
            return Self::Unmanaged;
        }
        Self::Tracking(RateTracking {
            min_amps: cfg.min_amps,
            max_amps: cfg.max_amps,
            offset_amps: cfg.offset_amps,
            smooth_cycles: cfg.smooth_cycles.max(1),
            line_voltage: cfg.line_voltage,
        })
    }

    /// Samples the available-power history must keep
    pub fn history_len(&self) -> usize {
        match self {
            Self::Tracking(t) => t.smooth_cycles.max(1),
            _ => 1,
        }
    }

    /// Current to request when switching charging on
    pub fn start_amps(&self, available: &SurplusWindow) -> Option<u32> {
        match self {
            Self::Unmanaged => None,
            Self::Fixed(amps) => Some(*amps),
            Self::Tracking(t) => available.mean().map(|w| t.amps_for(w)),
        }
    }

    /// Current to move to while charging, if it differs from `current_amps`
    pub fn adjustment(&self, available: &SurplusWindow, current_amps: u32) -> Option<u32> {
        let Self::Tracking(t) = self else {
            return None;
        };
        available
            .mean()
            .map(|w| t.amps_for(w))
            .filter(|&amps| amps != current_amps)
    }
}

impl fmt::Display for RatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmanaged => write!(f, "unmanaged"),
            Self::Fixed(amps) => write!(f, "{}A fixed", amps),
            Self::Tracking(t) => write!(
                f,
                "tracking {}-{}A over {} cycles",
                t.min_amps, t.max_amps, t.smooth_cycles
            ),
        }
    }
}

/// Inputs to one decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionInputs {
    pub surplus_watts: f64,
    pub battery_reserve_percent: f64,
    /// Whether the charging window (schedule, kill switch) allows charging
    pub window_open: bool,
}

impl DecisionInputs {
    pub fn new(surplus_watts: f64, battery_reserve_percent: f64) -> Self {
        Self {
            surplus_watts,
            battery_reserve_percent,
            window_open: true,
        }
    }

    /// Inputs for a closed window; the readings are not consulted
    pub fn window_closed() -> Self {
        Self {
            surplus_watts: 0.0,
            battery_reserve_percent: 0.0,
            window_open: false,
        }
    }
}

/// Why the rule landed where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Surplus reached the start threshold with enough reserve
    SurplusSustained,
    /// Surplus dropped below the stop threshold
    SurplusBelowStop,
    /// Battery reserve below the configured minimum
    ReserveBelowMinimum,
    /// Outside the charging window
    WindowClosed,
    /// Nothing qualified for a transition
    Holding,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SurplusSustained => "surplus sustained above start threshold",
            Self::SurplusBelowStop => "surplus below stop threshold",
            Self::ReserveBelowMinimum => "battery reserve below minimum",
            Self::WindowClosed => "charging window closed",
            Self::Holding => "holding state",
        };
        f.write_str(s)
    }
}

/// Result of one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub decision: ChargeDecision,
    pub changed: bool,
    pub reason: Reason,
}

/// Apply the hysteresis rule
///
/// `window` must already contain the current cycle's surplus.
pub fn evaluate(
    prev: ChargeDecision,
    inputs: &DecisionInputs,
    thresholds: &Thresholds,
    window: &SurplusWindow,
    now: DateTime<Utc>,
) -> Evaluation {
    let hold = |reason| Evaluation {
        decision: prev,
        changed: false,
        reason,
    };
    let to = |state, reason| {
        let decision = prev.transition(state, now);
        Evaluation {
            decision,
            changed: decision.state != prev.state,
            reason,
        }
    };

    match prev.state {
        ChargeState::Idle => {
            if !inputs.window_open {
                return hold(Reason::WindowClosed);
            }
            if !thresholds.reserve_ok(inputs.battery_reserve_percent) {
                return hold(Reason::ReserveBelowMinimum);
            }
            match window.min_recent(thresholds.start_confirm_cycles) {
                Some(min) if min >= thresholds.start_surplus_watts => {
                    to(ChargeState::Charging, Reason::SurplusSustained)
                }
                _ => hold(Reason::Holding),
            }
        }
        ChargeState::Charging => {
            if !inputs.window_open {
                return to(ChargeState::Idle, Reason::WindowClosed);
            }
            if !thresholds.reserve_ok(inputs.battery_reserve_percent) {
                return to(ChargeState::Idle, Reason::ReserveBelowMinimum);
            }
            match window.max_recent(thresholds.stop_confirm_cycles) {
                Some(max) if max < thresholds.stop_threshold_watts() => {
                    to(ChargeState::Idle, Reason::SurplusBelowStop)
                }
                _ => hold(Reason::Holding),
            }
        }
    }
}

/// Single-cycle form of the rule: only the current surplus is considered
pub fn decide(
    prev: ChargeDecision,
    inputs: &DecisionInputs,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> ChargeDecision {
    let mut window = SurplusWindow::new(1);
    window.push(inputs.surplus_watts);
    let single = thresholds.clone().with_confirm_cycles(1, 1);
    evaluate(prev, inputs, &single, &window, now).decision
}
