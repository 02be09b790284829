//! Trigger conditions — map lever input and the passage of time to chain
//! firing.
//!
//! One trigger owns one condition.  Press counting covers fixed-ratio and
//! progressive-ratio reinforcement, the absence timer covers omission
//! training, and the availability window covers variable-interval schedules
//! (uniform random window inside a fixed interval, not Fleshler-Hoffman).

use crate::devices::LeverSide;
use rand::Rng;
use rand::rngs::SmallRng;

/// The condition a trigger evaluates.  Each variant carries only its own
/// runtime state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCondition {
    /// FR/PR: every `threshold`-th counted press fires.  `pr_step > 0`
    /// grows the threshold arithmetically after each fire and saturates
    /// near the top of the `u8` range (the breakpoint).
    PressCount {
        threshold: u8,
        initial_threshold: u8,
        press_count: u8,
        pr_step: u8,
    },
    /// Omission: fires when no press has arrived for `absence_ms`.
    /// Any press restarts the timer; so does firing, giving back-to-back
    /// omission cycles.
    AbsenceTimer { absence_ms: u32, absence_start: u32 },
    /// VI: a press inside the current availability window fires, at most
    /// once per window.  The window rolls on tick when the interval ends.
    AvailabilityWindow {
        window_start: u32,
        window_end: u32,
        interval_ms: u32,
        fired_in_window: bool,
    },
    /// Fired only via an explicit host test command.
    Manual,
}

/// A configured trigger slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub condition: TriggerCondition,
    /// Which chain fires when the condition is met.
    pub chain_index: u8,
    pub enabled: bool,
    /// `None` accepts presses from any lever.
    pub source_filter: Option<LeverSide>,
    /// Percent chance (0-100) of actually firing once the condition holds.
    pub probability: u8,
}

impl Trigger {
    pub fn disabled() -> Self {
        Self {
            condition: TriggerCondition::Manual,
            chain_index: 0,
            enabled: false,
            source_filter: None,
            probability: 100,
        }
    }

    /// Evaluate an active lever press.  Returns `true` when the chain
    /// should fire.
    pub fn on_press(&mut self, source: LeverSide, timestamp: u32, rng: &mut SmallRng) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(filter) = self.source_filter {
            if filter != source {
                return false;
            }
        }

        match &mut self.condition {
            TriggerCondition::PressCount {
                threshold,
                press_count,
                pr_step,
                ..
            } => {
                *press_count += 1;
                if *press_count >= *threshold {
                    // The accumulator resets whether or not the probability
                    // gate passes: a failed draw consumes the ratio.
                    *press_count = 0;
                    if !gate(self.probability, rng) {
                        return false;
                    }
                    if *pr_step > 0 {
                        // Holds at the current value once another step would
                        // overflow (breakpoint reached).
                        *threshold = threshold.checked_add(*pr_step).unwrap_or(*threshold);
                    }
                    true
                } else {
                    false
                }
            }

            TriggerCondition::AbsenceTimer { absence_start, .. } => {
                *absence_start = timestamp;
                false
            }

            TriggerCondition::AvailabilityWindow {
                window_start,
                window_end,
                fired_in_window,
                ..
            } => {
                if !*fired_in_window && timestamp >= *window_start && timestamp < *window_end {
                    // A failed gate draw leaves the window live.
                    if !gate(self.probability, rng) {
                        return false;
                    }
                    *fired_in_window = true;
                    true
                } else {
                    false
                }
            }

            TriggerCondition::Manual => false,
        }
    }

    /// Time-based evaluation, called once per loop tick.  Returns `true`
    /// when the chain should fire.  The availability window never fires
    /// from here; ticks only roll it over.
    pub fn on_tick(&mut self, now: u32, rng: &mut SmallRng) -> bool {
        if !self.enabled {
            return false;
        }

        match &mut self.condition {
            TriggerCondition::AbsenceTimer {
                absence_ms,
                absence_start,
            } => {
                if *absence_start > 0 && now.wrapping_sub(*absence_start) >= *absence_ms {
                    // Restart before the gate so omission cycles run
                    // back-to-back even when a draw fails.
                    *absence_start = now;
                    gate(self.probability, rng)
                } else {
                    false
                }
            }

            TriggerCondition::AvailabilityWindow {
                window_start,
                window_end,
                interval_ms,
                fired_in_window,
            } => {
                if *window_end > 0 && now >= *window_end {
                    *window_start = now + random_below(*interval_ms, rng);
                    *window_end = now + *interval_ms;
                    *fired_in_window = false;
                }
                false
            }

            _ => false,
        }
    }

    /// Clear all runtime state.  A progressive ratio also returns to its
    /// starting threshold.
    pub fn reset(&mut self) {
        match &mut self.condition {
            TriggerCondition::PressCount {
                threshold,
                initial_threshold,
                press_count,
                pr_step,
            } => {
                *press_count = 0;
                if *pr_step > 0 {
                    *threshold = *initial_threshold;
                }
            }
            TriggerCondition::AbsenceTimer { absence_start, .. } => {
                *absence_start = 0;
            }
            TriggerCondition::AvailabilityWindow {
                window_start,
                window_end,
                fired_in_window,
                ..
            } => {
                *window_start = 0;
                *window_end = 0;
                *fired_in_window = false;
            }
            TriggerCondition::Manual => {}
        }
    }
}

/// Probability gate: always passes at 100, otherwise draws 0-99.
fn gate(probability: u8, rng: &mut SmallRng) -> bool {
    probability >= 100 || rng.gen_range(0..100u8) < probability
}

/// Uniform draw in `[0, bound)`, with `bound == 0` mapping to 0.
fn random_below(bound: u32, rng: &mut SmallRng) -> u32 {
    if bound > 0 { rng.gen_range(0..bound) } else { 0 }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0x5EED)
    }

    fn press_count(threshold: u8, pr_step: u8) -> Trigger {
        Trigger {
            condition: TriggerCondition::PressCount {
                threshold,
                initial_threshold: threshold,
                press_count: 0,
                pr_step,
            },
            chain_index: 0,
            enabled: true,
            source_filter: Some(LeverSide::Rh),
            probability: 100,
        }
    }

    #[test]
    fn fixed_ratio_fires_every_nth_press() {
        let mut rng = rng();
        let mut t = press_count(3, 0);
        for cycle in 0..4 {
            assert!(!t.on_press(LeverSide::Rh, 100, &mut rng), "cycle {cycle}");
            assert!(!t.on_press(LeverSide::Rh, 200, &mut rng), "cycle {cycle}");
            assert!(t.on_press(LeverSide::Rh, 300, &mut rng), "cycle {cycle}");
        }
    }

    #[test]
    fn source_filter_ignores_other_lever() {
        let mut rng = rng();
        let mut t = press_count(1, 0);
        assert!(!t.on_press(LeverSide::Lh, 100, &mut rng));
        assert!(t.on_press(LeverSide::Rh, 100, &mut rng));
    }

    #[test]
    fn progressive_ratio_escalates() {
        let mut rng = rng();
        let mut t = press_count(1, 2);
        // Fires at 1, then the requirement climbs: 3, 5, ...
        assert!(t.on_press(LeverSide::Rh, 0, &mut rng));
        for i in 0..2 {
            assert!(!t.on_press(LeverSide::Rh, i, &mut rng));
        }
        assert!(t.on_press(LeverSide::Rh, 10, &mut rng));
        for i in 0..4 {
            assert!(!t.on_press(LeverSide::Rh, i, &mut rng));
        }
        assert!(t.on_press(LeverSide::Rh, 20, &mut rng));
    }

    #[test]
    fn progressive_ratio_saturates_near_u8_max() {
        let mut rng = rng();
        let mut t = press_count(1, 100);
        // Thresholds after each fire: 101, 201, then held at 201.
        assert!(t.on_press(LeverSide::Rh, 0, &mut rng));
        for _ in 0..101 {
            t.on_press(LeverSide::Rh, 0, &mut rng);
        }
        match t.condition {
            TriggerCondition::PressCount { threshold, .. } => assert_eq!(threshold, 201),
            _ => unreachable!(),
        }
        for _ in 0..201 {
            t.on_press(LeverSide::Rh, 0, &mut rng);
        }
        match t.condition {
            TriggerCondition::PressCount { threshold, .. } => assert_eq!(threshold, 201),
            _ => unreachable!(),
        }
    }

    #[test]
    fn zero_probability_never_fires_but_consumes_ratio() {
        let mut rng = rng();
        let mut t = press_count(2, 0);
        t.probability = 0;
        for _ in 0..20 {
            assert!(!t.on_press(LeverSide::Rh, 0, &mut rng));
        }
        // Accumulator was reset at each threshold crossing.
        match t.condition {
            TriggerCondition::PressCount { press_count, .. } => assert_eq!(press_count, 0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn reset_restores_initial_threshold() {
        let mut rng = rng();
        let mut t = press_count(2, 3);
        t.on_press(LeverSide::Rh, 0, &mut rng);
        assert!(t.on_press(LeverSide::Rh, 0, &mut rng));
        t.reset();
        match t.condition {
            TriggerCondition::PressCount {
                threshold,
                press_count,
                ..
            } => {
                assert_eq!(threshold, 2);
                assert_eq!(press_count, 0);
            }
            _ => unreachable!(),
        }
    }

    fn absence(absence_ms: u32) -> Trigger {
        Trigger {
            condition: TriggerCondition::AbsenceTimer {
                absence_ms,
                absence_start: 0,
            },
            chain_index: 0,
            enabled: true,
            source_filter: None,
            probability: 100,
        }
    }

    #[test]
    fn absence_timer_fires_after_quiet_period() {
        let mut rng = rng();
        let mut t = absence(1000);
        // Unseeded timer never fires.
        assert!(!t.on_tick(5000, &mut rng));

        t.on_press(LeverSide::Rh, 100, &mut rng);
        assert!(!t.on_tick(1099, &mut rng));
        assert!(t.on_tick(1100, &mut rng));
        // Restarted at 1100: next omission completes at 2100.
        assert!(!t.on_tick(2099, &mut rng));
        assert!(t.on_tick(2100, &mut rng));
    }

    #[test]
    fn absence_timer_press_restarts() {
        let mut rng = rng();
        let mut t = absence(1000);
        t.on_press(LeverSide::Rh, 0, &mut rng);
        assert!(!t.on_press(LeverSide::Rh, 900, &mut rng));
        assert!(!t.on_tick(1000, &mut rng));
        assert!(t.on_tick(1900, &mut rng));
    }

    fn window() -> Trigger {
        Trigger {
            condition: TriggerCondition::AvailabilityWindow {
                window_start: 2000,
                window_end: 3000,
                interval_ms: 5000,
                fired_in_window: false,
            },
            chain_index: 0,
            enabled: true,
            source_filter: None,
            probability: 100,
        }
    }

    #[test]
    fn window_fires_once_per_window() {
        let mut rng = rng();
        let mut t = window();
        assert!(!t.on_press(LeverSide::Rh, 1999, &mut rng));
        assert!(t.on_press(LeverSide::Rh, 2000, &mut rng));
        assert!(!t.on_press(LeverSide::Rh, 2500, &mut rng));
    }

    #[test]
    fn window_end_is_exclusive() {
        let mut rng = rng();
        let mut t = window();
        assert!(!t.on_press(LeverSide::Rh, 3000, &mut rng));
    }

    #[test]
    fn window_rolls_on_tick_never_fires_from_tick() {
        let mut rng = rng();
        let mut t = window();
        assert!(t.on_press(LeverSide::Rh, 2100, &mut rng));
        // Tick past the window end rolls a fresh interval.
        assert!(!t.on_tick(3000, &mut rng));
        match t.condition {
            TriggerCondition::AvailabilityWindow {
                window_start,
                window_end,
                fired_in_window,
                ..
            } => {
                assert_eq!(window_end, 8000);
                assert!(window_start >= 3000 && window_start < 8000);
                assert!(!fired_in_window);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn disabled_trigger_is_inert() {
        let mut rng = rng();
        let mut t = press_count(1, 0);
        t.enabled = false;
        assert!(!t.on_press(LeverSide::Rh, 0, &mut rng));
        assert!(!t.on_tick(10_000, &mut rng));
    }
}
