//! Contingency engine — maps lever input to consequence chains.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Input Sources                           │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │ Lever RH  │  │ Lever LH  │  │ Tick       │  │ Host     │   │
//! │  │ (press)   │  │ (press)   │  │ (time)     │  │ (manual) │   │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬────┘   │
//! │        ▼              ▼              ▼              ▼        │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │      Triggers ──fire──▶ Chains ──steps──▶ Devices      │  │
//! │  │                 (deferred steps park in                │  │
//! │  │                  the pending queue)                    │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-tick ordering is fixed: time-based triggers first, then the pending
//! queue, then output device state machines.  Outputs are ticked even while
//! paused so running infusions complete.

pub mod chain;
pub mod paradigms;
pub mod trigger;

pub use chain::{Action, ActionKind, Chain, MAX_CHAIN_STEPS, MAX_PENDING, PendingQueue};
pub use trigger::{Trigger, TriggerCondition};

use crate::devices::{DeviceId, Devices, LeverSide};
use crate::report::{Record, ReportSink};
use heapless::Vec;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub const MAX_TRIGGERS: usize = 2;
pub const MAX_CHAINS: usize = 2;

/// Classification of a lever press at press-down time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressClass {
    /// Reinforced lever, outside any timeout window.
    Active,
    /// Non-reinforced lever.
    Inactive,
    /// Reinforced lever inside a timeout window.
    Timeout,
}

impl PressClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Timeout => "TIMEOUT",
        }
    }
}

pub struct Scheduler {
    triggers: [Trigger; MAX_TRIGGERS],
    chains: [Chain; MAX_CHAINS],
    pending: PendingQueue,
    session_offset: u32,
    timeout_interval: u32,
    session_active: bool,
    session_paused: bool,
    test_mode: bool,
    last_class_rh: PressClass,
    last_class_lh: PressClass,
    rng: SmallRng,
}

impl Scheduler {
    pub fn new(seed: u64) -> Self {
        Self {
            triggers: [Trigger::disabled(), Trigger::disabled()],
            chains: [Chain::new(), Chain::new()],
            pending: PendingQueue::new(),
            session_offset: 0,
            timeout_interval: 20_000,
            session_active: false,
            session_paused: false,
            test_mode: false,
            last_class_rh: PressClass::Inactive,
            last_class_lh: PressClass::Inactive,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    // ── per-tick drive ───────────────────────────────────────────

    /// Advance the engine one tick.
    pub fn update(&mut self, now: u32, devices: &mut Devices, sink: &mut dyn ReportSink) {
        if !self.session_paused {
            let mut fired: Vec<u8, MAX_TRIGGERS> = Vec::new();
            {
                let Self { triggers, rng, .. } = self;
                for t in triggers.iter_mut() {
                    if t.on_tick(now, rng) {
                        let _ = fired.push(t.chain_index);
                    }
                }
            }
            for chain_index in fired {
                self.fire_chain(chain_index, now, devices, sink);
            }

            for action in self.pending.take_due(now) {
                self.execute_action(action, now, devices, sink);
            }
        }

        // Unconditional: a paused session still finishes its infusion.
        devices.service_outputs(now);
    }

    // ── input events ─────────────────────────────────────────────

    /// Handle a debounced press-down edge.
    pub fn on_press(
        &mut self,
        side: LeverSide,
        timestamp: u32,
        devices: &mut Devices,
        sink: &mut dyn ReportSink,
    ) {
        if !self.session_active && !self.test_mode {
            return;
        }
        if self.session_paused {
            return;
        }

        let class = self.classify_press(side, timestamp, devices);
        match side {
            LeverSide::Rh => self.last_class_rh = class,
            LeverSide::Lh => self.last_class_lh = class,
        }

        if class != PressClass::Active {
            return;
        }

        // The timeout window opens only when a chain's SetTimeout step
        // fires; an active press itself never locks the lever out, so a
        // multi-press ratio can complete inside one timeout-free period.
        let mut fired: Vec<u8, MAX_TRIGGERS> = Vec::new();
        {
            let Self { triggers, rng, .. } = self;
            for t in triggers.iter_mut() {
                if t.on_press(side, timestamp, rng) {
                    let _ = fired.push(t.chain_index);
                }
            }
        }
        for chain_index in fired {
            self.fire_chain(chain_index, timestamp, devices, sink);
        }
    }

    /// Handle a debounced release edge: the press is logged now, with the
    /// class recorded at press-down.
    pub fn on_release(&mut self, side: LeverSide, devices: &Devices, sink: &mut dyn ReportSink) {
        if !self.session_active && !self.test_mode {
            return;
        }
        if self.session_paused {
            return;
        }

        let class = match side {
            LeverSide::Rh => self.last_class_rh,
            LeverSide::Lh => self.last_class_lh,
        };
        if let Some(lever) = devices.lever(side) {
            sink.emit(Record::lever_press(
                lever.pin(),
                class.name(),
                lever.start_timestamp().wrapping_sub(self.session_offset),
                lever.end_timestamp().wrapping_sub(self.session_offset),
                lever.orientation(),
            ));
        }
    }

    fn classify_press(&self, side: LeverSide, timestamp: u32, devices: &Devices) -> PressClass {
        let Some(lever) = devices.lever(side) else {
            return PressClass::Inactive;
        };
        if !lever.reinforced {
            return PressClass::Inactive;
        }
        if lever.in_timeout(timestamp) {
            return PressClass::Timeout;
        }
        PressClass::Active
    }

    // ── chain execution ──────────────────────────────────────────

    fn fire_chain(
        &mut self,
        chain_index: u8,
        now: u32,
        devices: &mut Devices,
        sink: &mut dyn ReportSink,
    ) {
        let Some(chain) = self.chains.get(chain_index as usize) else {
            return;
        };
        // Steps are copied out so executing them can mutate the engine.
        let steps: Vec<Action, MAX_CHAIN_STEPS> = chain.steps.clone();

        for action in steps {
            if action.kind == ActionKind::None {
                continue;
            }
            if action.offset_ms == 0 {
                self.execute_action(action, now, devices, sink);
            } else {
                self.pending.schedule(action, now + action.offset_ms);
            }
        }
    }

    fn execute_action(
        &mut self,
        action: Action,
        now: u32,
        devices: &mut Devices,
        sink: &mut dyn ReportSink,
    ) {
        match action.kind {
            ActionKind::ActivateDevice => {
                let activated = match action.target {
                    DeviceId::Cue => devices.cue.as_mut().filter(|c| c.armed).map(|c| {
                        c.activate(now, action.param);
                        c.pin()
                    }),
                    DeviceId::Cue2 => devices.cue2.as_mut().filter(|c| c.armed).map(|c| {
                        c.activate(now, action.param);
                        c.pin()
                    }),
                    DeviceId::Pump => devices.pump.as_mut().filter(|p| p.armed).map(|p| {
                        p.activate(now, action.param);
                        p.pin()
                    }),
                    DeviceId::Pump2 => devices.pump2.as_mut().filter(|p| p.armed).map(|p| {
                        p.activate(now, action.param);
                        p.pin()
                    }),
                    DeviceId::Stim => devices
                        .stim
                        .as_mut()
                        .filter(|s| s.armed && s.is_contingent())
                        .map(|s| {
                            s.activate(now, action.param);
                            s.pin()
                        }),
                    DeviceId::LeverRh | DeviceId::LeverLh => None,
                };
                if let Some(pin) = activated {
                    sink.emit(Record::device_event(
                        action.target.name(),
                        pin,
                        action.target.event_name(),
                        now.wrapping_sub(self.session_offset),
                        (now + action.param).wrapping_sub(self.session_offset),
                    ));
                }
            }

            ActionKind::SetTimeout => {
                if let Some(side) = action.target.lever_side() {
                    if let Some(lever) = devices.lever_mut(side) {
                        lever.timeout_end = now + action.param;
                    }
                }
            }

            // Resets ALL triggers, not just the one that fired this chain.
            // Downstream analysis depends on this breadth, so it stays.
            ActionKind::ResetTriggers => {
                for t in &mut self.triggers {
                    t.reset();
                }
            }

            ActionKind::None => {}
        }
    }

    // ── configuration ────────────────────────────────────────────

    pub fn trigger_mut(&mut self, index: usize) -> Option<&mut Trigger> {
        self.triggers.get_mut(index)
    }

    pub fn chain_mut(&mut self, index: usize) -> Option<&mut Chain> {
        self.chains.get_mut(index)
    }

    pub fn timeout_interval(&self) -> u32 {
        self.timeout_interval
    }

    pub fn session_offset(&self) -> u32 {
        self.session_offset
    }

    /// Change the timeout interval and rewrite every `SetTimeout` step so
    /// already-configured chains pick it up.
    pub fn set_timeout_interval(&mut self, interval: u32) {
        self.timeout_interval = interval;
        for chain in &mut self.chains {
            for step in &mut chain.steps {
                if step.kind == ActionKind::SetTimeout {
                    step.param = interval;
                }
            }
        }
    }

    /// Set the response requirement on the first press-count trigger.
    pub fn set_ratio(&mut self, ratio: u8) {
        for t in &mut self.triggers {
            if let TriggerCondition::PressCount {
                threshold,
                press_count,
                ..
            } = &mut t.condition
            {
                *threshold = ratio;
                *press_count = 0;
                return;
            }
        }
    }

    // ── session lifecycle ────────────────────────────────────────

    pub fn start_session(&mut self, now: u32, devices: &mut Devices) {
        self.test_mode = false;
        self.session_paused = false;
        self.session_offset = now;
        self.session_active = true;

        let Self { triggers, rng, .. } = self;
        for t in triggers.iter_mut() {
            t.reset();
            if !t.enabled {
                continue;
            }
            match &mut t.condition {
                TriggerCondition::AbsenceTimer { absence_start, .. } => {
                    *absence_start = now;
                }
                TriggerCondition::AvailabilityWindow {
                    window_start,
                    window_end,
                    interval_ms,
                    fired_in_window,
                } => {
                    *window_start = now
                        + if *interval_ms > 0 {
                            rng.gen_range(0..*interval_ms)
                        } else {
                            0
                        };
                    *window_end = now + *interval_ms;
                    *fired_in_window = false;
                }
                _ => {}
            }
        }

        self.pending.clear();
        if let Some(lever) = devices.lever_mut(LeverSide::Rh) {
            lever.timeout_end = 0;
        }
        if let Some(lever) = devices.lever_mut(LeverSide::Lh) {
            lever.timeout_end = 0;
        }
        info!("session started at t={now}");
    }

    pub fn end_session(&mut self, devices: &mut Devices) {
        self.session_active = false;
        self.session_paused = false;
        self.pending.clear();
        devices.all_outputs_off();
        info!("session ended");
    }

    /// Pause or resume.  Pausing drops queued consequences and silences
    /// cues; running infusions finish on their own.
    pub fn set_paused(&mut self, paused: bool, devices: &mut Devices) {
        if !self.session_active {
            return;
        }
        self.session_paused = paused;
        if paused {
            self.pending.clear();
            devices.silence_cues();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.session_paused
    }

    pub fn is_active(&self) -> bool {
        self.session_active
    }

    // ── bench testing ────────────────────────────────────────────

    /// Fire chain 0 once outside a session, for bench verification.
    /// Rejected while a session runs.
    pub fn test_chain(&mut self, now: u32, devices: &mut Devices, sink: &mut dyn ReportSink) {
        if self.session_active {
            return;
        }
        self.pending.clear();
        self.session_offset = now;
        self.fire_chain(0, now, devices, sink);
    }

    /// Enter or leave test mode: presses drive triggers without a session.
    /// Rejected while a session runs.
    pub fn set_test_mode(&mut self, enable: bool, now: u32, devices: &mut Devices) {
        if self.session_active {
            return;
        }
        self.test_mode = enable;
        if enable {
            self.session_offset = now;
            self.pending.clear();
            for t in &mut self.triggers {
                t.reset();
            }
            if let Some(lever) = devices.lever_mut(LeverSide::Rh) {
                lever.timeout_end = 0;
            }
            if let Some(lever) = devices.lever_mut(LeverSide::Lh) {
                lever.timeout_end = 0;
            }
        } else {
            self.pending.clear();
            devices.all_outputs_off();
        }
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Cue, Lever, Pump};
    use crate::report::RecordingSink;

    fn rig() -> Devices {
        let mut d = Devices::empty();
        let mut rh = Lever::new(10, LeverSide::Rh, true);
        rh.reinforced = true;
        let lh = Lever::new(12, LeverSide::Lh, true);
        d.lever_rh = Some(rh);
        d.lever_lh = Some(lh);
        d.cue = Some(Cue::new(3, 8000, 2000));
        d.pump = Some(Pump::new(4, 2000));
        d.arm_all(true);
        d
    }

    fn fr(ratio: u8) -> Scheduler {
        let mut s = Scheduler::new(7);
        *s.trigger_mut(0).unwrap() = Trigger {
            condition: TriggerCondition::PressCount {
                threshold: ratio,
                initial_threshold: ratio,
                press_count: 0,
                pr_step: 0,
            },
            chain_index: 0,
            enabled: true,
            source_filter: Some(LeverSide::Rh),
            probability: 100,
        };
        let chain = s.chain_mut(0).unwrap();
        let _ = chain.steps.push(Action {
            kind: ActionKind::ActivateDevice,
            target: DeviceId::Cue,
            offset_ms: 0,
            param: 2000,
        });
        let _ = chain.steps.push(Action {
            kind: ActionKind::ActivateDevice,
            target: DeviceId::Pump,
            offset_ms: 3000,
            param: 2000,
        });
        s
    }

    #[test]
    fn presses_ignored_outside_session() {
        let mut s = fr(1);
        let mut d = rig();
        let mut sink = RecordingSink::new();
        s.on_press(LeverSide::Rh, 100, &mut d, &mut sink);
        s.on_release(LeverSide::Rh, &d, &mut sink);
        assert!(sink.records.is_empty());
        assert_eq!(s.pending_len(), 0);
    }

    #[test]
    fn fr1_fires_cue_now_and_defers_pump() {
        let mut s = fr(1);
        let mut d = rig();
        let mut sink = RecordingSink::new();
        s.start_session(1000, &mut d);

        s.on_press(LeverSide::Rh, 1500, &mut d, &mut sink);
        // Cue activation was logged session-relative.
        assert_eq!(sink.records.len(), 1);
        assert!(sink.lines()[0].contains("\"device\":\"CUE\""));
        assert!(sink.lines()[0].contains("\"start_timestamp\":500"));
        assert_eq!(s.pending_len(), 1);

        // Pump fires once the offset elapses.
        s.update(4500, &mut d, &mut sink);
        assert_eq!(s.pending_len(), 0);
        assert!(sink.lines()[1].contains("\"event\":\"INFUSION\""));
        assert!(d.pump.as_ref().unwrap().infusing(4500));
    }

    #[test]
    fn chain_timeout_step_opens_window() {
        let mut s = fr(1);
        let chain = s.chain_mut(0).unwrap();
        let _ = chain.steps.push(Action {
            kind: ActionKind::SetTimeout,
            target: DeviceId::LeverRh,
            offset_ms: 0,
            param: 20_000,
        });
        let mut d = rig();
        let mut sink = RecordingSink::new();
        s.start_session(0, &mut d);

        // Reward delivery locks the lever out; the press itself does not.
        s.on_press(LeverSide::Rh, 100, &mut d, &mut sink);
        assert_eq!(d.lever(LeverSide::Rh).unwrap().timeout_end, 20_100);

        // Within the window (boundary inclusive) the press is a timeout
        // press and does not drive triggers.
        s.on_press(LeverSide::Rh, 20_100, &mut d, &mut sink);
        assert_eq!(s.last_class_rh, PressClass::Timeout);

        s.on_press(LeverSide::Rh, 20_101, &mut d, &mut sink);
        assert_eq!(s.last_class_rh, PressClass::Active);
    }

    #[test]
    fn non_reinforced_lever_is_inactive() {
        let mut s = fr(1);
        let mut d = rig();
        let mut sink = RecordingSink::new();
        s.start_session(0, &mut d);

        s.on_press(LeverSide::Lh, 100, &mut d, &mut sink);
        assert_eq!(s.last_class_lh, PressClass::Inactive);
        // Inactive presses never reach the triggers.
        assert!(sink.records.is_empty());
    }

    #[test]
    fn release_logs_class_recorded_at_press() {
        let mut s = fr(2);
        let mut d = rig();
        let mut sink = RecordingSink::new();
        s.start_session(1000, &mut d);

        d.lever_rh.as_mut().unwrap().sample(false, 1500);
        d.lever_rh.as_mut().unwrap().sample(false, 1521);
        s.on_press(LeverSide::Rh, 1521, &mut d, &mut sink);
        d.lever_rh.as_mut().unwrap().sample(true, 1700);
        d.lever_rh.as_mut().unwrap().sample(true, 1721);
        s.on_release(LeverSide::Rh, &d, &mut sink);

        let line = &sink.lines()[0];
        assert!(line.contains("\"class\":\"ACTIVE\""));
        assert!(line.contains("\"start_timestamp\":521"));
        assert!(line.contains("\"end_timestamp\":721"));
        assert!(line.contains("\"orientation\":\"RH\""));
    }

    #[test]
    fn set_timeout_interval_rewrites_chain_steps() {
        let mut s = fr(1);
        let chain = s.chain_mut(0).unwrap();
        let _ = chain.steps.push(Action {
            kind: ActionKind::SetTimeout,
            target: DeviceId::LeverRh,
            offset_ms: 0,
            param: 20_000,
        });

        s.set_timeout_interval(5000);
        let chain = s.chain_mut(0).unwrap();
        assert_eq!(chain.steps[2].param, 5000);
        // Non-timeout steps untouched.
        assert_eq!(chain.steps[0].param, 2000);
    }

    #[test]
    fn pause_drops_pending_and_blocks_input() {
        let mut s = fr(1);
        let mut d = rig();
        let mut sink = RecordingSink::new();
        s.start_session(0, &mut d);

        s.on_press(LeverSide::Rh, 100, &mut d, &mut sink);
        assert_eq!(s.pending_len(), 1);

        s.set_paused(true, &mut d);
        assert_eq!(s.pending_len(), 0);

        let before = sink.records.len();
        s.on_press(LeverSide::Rh, 25_000, &mut d, &mut sink);
        s.update(30_000, &mut d, &mut sink);
        assert_eq!(sink.records.len(), before);

        s.set_paused(false, &mut d);
        s.on_press(LeverSide::Rh, 40_000, &mut d, &mut sink);
        assert!(sink.records.len() > before);
    }

    #[test]
    fn end_session_clears_pending_and_outputs() {
        let mut s = fr(1);
        let mut d = rig();
        let mut sink = RecordingSink::new();
        s.start_session(0, &mut d);
        s.on_press(LeverSide::Rh, 100, &mut d, &mut sink);
        assert_eq!(s.pending_len(), 1);

        s.end_session(&mut d);
        assert!(!s.is_active());
        assert_eq!(s.pending_len(), 0);
        assert!(!d.pump.as_ref().unwrap().infusing(100));
    }

    #[test]
    fn test_chain_rejected_mid_session() {
        let mut s = fr(1);
        let mut d = rig();
        let mut sink = RecordingSink::new();
        s.start_session(0, &mut d);
        let before = sink.records.len();
        s.test_chain(500, &mut d, &mut sink);
        assert_eq!(sink.records.len(), before);

        s.end_session(&mut d);
        s.test_chain(500, &mut d, &mut sink);
        assert!(sink.records.len() > before);
    }

    #[test]
    fn reset_triggers_action_resets_every_trigger() {
        let mut s = fr(3);
        let mut d = rig();
        let mut sink = RecordingSink::new();
        // Second trigger accumulates from the same lever onto chain 1.
        *s.trigger_mut(1).unwrap() = Trigger {
            condition: TriggerCondition::PressCount {
                threshold: 10,
                initial_threshold: 10,
                press_count: 0,
                pr_step: 0,
            },
            chain_index: 1,
            enabled: true,
            source_filter: Some(LeverSide::Rh),
            probability: 100,
        };
        // Chain 0 resets triggers when it fires.
        let chain = s.chain_mut(0).unwrap();
        chain.steps.clear();
        let _ = chain.steps.push(Action {
            kind: ActionKind::ResetTriggers,
            target: DeviceId::Cue,
            offset_ms: 0,
            param: 0,
        });

        s.start_session(0, &mut d);
        s.on_press(LeverSide::Rh, 30, &mut d, &mut sink);
        s.on_press(LeverSide::Rh, 60, &mut d, &mut sink);
        s.on_press(LeverSide::Rh, 90, &mut d, &mut sink);

        // Trigger 1 had accumulated 3 presses; the reset wiped it too.
        match &s.trigger_mut(1).unwrap().condition {
            TriggerCondition::PressCount { press_count, .. } => assert_eq!(*press_count, 0),
            _ => unreachable!(),
        }
    }
}
