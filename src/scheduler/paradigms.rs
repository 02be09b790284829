//! Canned trigger/chain configurations for the operant paradigms.
//!
//! Each builder programs trigger 0 and chain 0; trigger 1 is disabled.
//! The reward chain shape is shared: cue at offset 0, pump and stim after
//! the cue plus a trace interval, and (for timeout-bearing paradigms) a
//! timeout step at offset 0.

use super::{Action, ActionKind, Scheduler, Trigger, TriggerCondition};
use crate::devices::DeviceId;

/// Durations and targets for the reward side of a contingency.
#[derive(Debug, Clone, Copy)]
pub struct RewardShape {
    pub cue_duration: u32,
    pub pump_duration: u32,
    pub stim_duration: u32,
    /// Delay between cue offset and reward onset.
    pub trace_interval: u32,
    /// Which lever receives the post-reward timeout.
    pub timeout_target: DeviceId,
}

impl Default for RewardShape {
    fn default() -> Self {
        Self {
            cue_duration: 1600,
            pump_duration: 2000,
            stim_duration: 5000,
            trace_interval: 0,
            timeout_target: DeviceId::LeverRh,
        }
    }
}

/// Fixed ratio: every `ratio`-th active press rewards.
pub fn configure_fixed_ratio(sched: &mut Scheduler, ratio: u8, shape: &RewardShape) {
    press_count_trigger(sched, ratio, 0);
    reward_chain(sched, shape, true);
}

/// Progressive ratio: like FR, but the requirement grows by `step` after
/// each reward (arithmetic progression, not Richardson & Roberts
/// exponential).
pub fn configure_progressive_ratio(
    sched: &mut Scheduler,
    initial_ratio: u8,
    step: u8,
    shape: &RewardShape,
) {
    press_count_trigger(sched, initial_ratio, step);
    reward_chain(sched, shape, true);
}

/// Omission: reward fires after `absence_ms` without a press.  All reward
/// devices fire simultaneously and no timeout is applied.
pub fn configure_omission(sched: &mut Scheduler, absence_ms: u32, shape: &RewardShape) {
    set_trigger0(
        sched,
        TriggerCondition::AbsenceTimer {
            absence_ms,
            absence_start: 0,
        },
    );

    let Some(chain) = sched.chain_mut(0) else {
        return;
    };
    chain.steps.clear();
    let _ = chain.steps.push(Action {
        kind: ActionKind::ActivateDevice,
        target: DeviceId::Cue,
        offset_ms: 0,
        param: shape.cue_duration,
    });
    let _ = chain.steps.push(Action {
        kind: ActionKind::ActivateDevice,
        target: DeviceId::Pump,
        offset_ms: 0,
        param: shape.pump_duration,
    });
    let _ = chain.steps.push(Action {
        kind: ActionKind::ActivateDevice,
        target: DeviceId::Stim,
        offset_ms: 0,
        param: shape.stim_duration,
    });
}

/// Variable interval: a uniformly placed availability window inside each
/// fixed-length interval; a press during the window rewards.
pub fn configure_variable_interval(sched: &mut Scheduler, total_interval: u32, shape: &RewardShape) {
    set_trigger0(
        sched,
        TriggerCondition::AvailabilityWindow {
            window_start: 0,
            window_end: 0,
            interval_ms: total_interval,
            fired_in_window: false,
        },
    );
    reward_chain(sched, shape, true);
}

fn press_count_trigger(sched: &mut Scheduler, ratio: u8, pr_step: u8) {
    set_trigger0(
        sched,
        TriggerCondition::PressCount {
            threshold: ratio,
            initial_threshold: ratio,
            press_count: 0,
            pr_step,
        },
    );
}

fn set_trigger0(sched: &mut Scheduler, condition: TriggerCondition) {
    if let Some(t) = sched.trigger_mut(0) {
        *t = Trigger {
            condition,
            chain_index: 0,
            enabled: true,
            source_filter: None,
            probability: 100,
        };
    }
    if let Some(t) = sched.trigger_mut(1) {
        t.enabled = false;
    }
}

fn reward_chain(sched: &mut Scheduler, shape: &RewardShape, with_timeout: bool) {
    let timeout_interval = sched.timeout_interval();
    let Some(chain) = sched.chain_mut(0) else {
        return;
    };
    chain.steps.clear();

    let _ = chain.steps.push(Action {
        kind: ActionKind::ActivateDevice,
        target: DeviceId::Cue,
        offset_ms: 0,
        param: shape.cue_duration,
    });
    let _ = chain.steps.push(Action {
        kind: ActionKind::ActivateDevice,
        target: DeviceId::Pump,
        offset_ms: shape.cue_duration + shape.trace_interval,
        param: shape.pump_duration,
    });
    let _ = chain.steps.push(Action {
        kind: ActionKind::ActivateDevice,
        target: DeviceId::Stim,
        offset_ms: shape.cue_duration + shape.trace_interval,
        param: shape.stim_duration,
    });
    if with_timeout {
        let _ = chain.steps.push(Action {
            kind: ActionKind::SetTimeout,
            target: shape.timeout_target,
            offset_ms: 0,
            param: timeout_interval,
        });
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;

    #[test]
    fn fixed_ratio_chain_shape() {
        let mut s = Scheduler::new(1);
        let shape = RewardShape {
            trace_interval: 500,
            ..RewardShape::default()
        };
        configure_fixed_ratio(&mut s, 5, &shape);

        let chain = s.chain_mut(0).unwrap();
        assert_eq!(chain.steps.len(), 4);
        assert_eq!(chain.steps[0].offset_ms, 0);
        // Reward follows the cue plus the trace interval.
        assert_eq!(chain.steps[1].offset_ms, 2100);
        assert_eq!(chain.steps[2].offset_ms, 2100);
        assert_eq!(chain.steps[3].kind, ActionKind::SetTimeout);
        assert_eq!(chain.steps[3].param, 20_000);

        match &s.trigger_mut(0).unwrap().condition {
            TriggerCondition::PressCount {
                threshold, pr_step, ..
            } => {
                assert_eq!(*threshold, 5);
                assert_eq!(*pr_step, 0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn omission_chain_has_no_timeout_and_no_trace() {
        let mut s = Scheduler::new(1);
        configure_omission(&mut s, 30_000, &RewardShape::default());

        let chain = s.chain_mut(0).unwrap();
        assert_eq!(chain.steps.len(), 3);
        assert!(chain.steps.iter().all(|a| a.offset_ms == 0));
        assert!(chain.steps.iter().all(|a| a.kind != ActionKind::SetTimeout));
    }

    #[test]
    fn builders_disable_second_trigger() {
        let mut s = Scheduler::new(1);
        s.trigger_mut(1).unwrap().enabled = true;
        configure_variable_interval(&mut s, 60_000, &RewardShape::default());
        assert!(!s.trigger_mut(1).unwrap().enabled);
    }
}
