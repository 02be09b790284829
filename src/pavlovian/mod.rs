//! Pavlovian (classical) conditioning trial engine.
//!
//! A session is a fixed list of cue presentations walked by a four-phase
//! state machine; the animal's behavior never alters the schedule.
//!
//! ```text
//!        iti elapsed        cue_duration        trace_interval
//!   ITI ────────────▶ CUE_ON ──────────▶ TRACE ─────────────▶ REWARD
//!    ▲                                                          │
//!    └────────────── consumption window elapsed ────────────────┘
//!                     (or IDLE after the last trial)
//! ```
//!
//! Reward is decided once, at trial start, from the per-cue-type
//! probability; delivery happens at the end of the trace period.  The
//! CS+/CS− to cue/pump channel mapping can be swapped per animal with the
//! counterbalance flag.

pub mod iti;
pub mod trial_order;

use log::info;
use rand::Rng;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::devices::Devices;
use crate::error::{Error, Result};
use crate::report::{Record, ReportSink};
use trial_order::TrialTable;

// ───────────────────────────── configuration ─────────────────────────────

/// Trial-structure parameters, host-settable before a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PavlovianConfig {
    pub cs_plus_count: u8,
    pub cs_minus_count: u8,
    /// Reward probability per cue type, percent.
    pub cs_plus_prob: u8,
    pub cs_minus_prob: u8,
    pub cs_plus_freq: u32,
    pub cs_minus_freq: u32,
    pub cue_duration_ms: u32,
    pub trace_interval_ms: u32,
    /// Post-delivery consumption window before the next ITI.
    pub consumption_ms: u32,
    pub iti_mean_ms: u32,
    pub iti_min_ms: u32,
    pub iti_max_ms: u32,
    /// Swap which cue/pump channel carries CS+ (per-animal counterbalancing).
    pub counterbalance: bool,
}

impl Default for PavlovianConfig {
    fn default() -> Self {
        Self {
            cs_plus_count: 50,
            cs_minus_count: 50,
            cs_plus_prob: 100,
            cs_minus_prob: 0,
            cs_plus_freq: 8000,
            cs_minus_freq: 2000,
            cue_duration_ms: 2000,
            trace_interval_ms: 1000,
            consumption_ms: 3000,
            iti_mean_ms: 30_000,
            iti_min_ms: 10_000,
            iti_max_ms: 90_000,
            counterbalance: false,
        }
    }
}

// ─────────────────────────────── phase machine ───────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PavPhase {
    Idle,
    Iti,
    CueOn,
    Trace,
    Reward,
}

pub struct PavlovianEngine {
    config: PavlovianConfig,
    order: TrialTable,
    phase: PavPhase,
    phase_start: u32,
    current_iti: u32,
    trial_index: u8,
    reward_this_trial: bool,
    session_offset: u32,
    session_active: bool,
    paused: bool,
    pause_start: u32,
    rng: SmallRng,
}

impl PavlovianEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            config: PavlovianConfig::default(),
            order: TrialTable::empty(),
            phase: PavPhase::Idle,
            phase_start: 0,
            current_iti: 0,
            trial_index: 0,
            reward_this_trial: false,
            session_offset: 0,
            session_active: false,
            paused: false,
            pause_start: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &PavlovianConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.session_active
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn session_offset(&self) -> u32 {
        self.session_offset
    }

    /// True once every trial has run (the session stays open for teardown).
    pub fn is_complete(&self) -> bool {
        self.session_active && self.phase == PavPhase::Idle
    }

    /// Apply a new trial structure and retune both cue channels.  Rejected
    /// while a session is running.
    pub fn configure(&mut self, config: PavlovianConfig, devices: &mut Devices) -> Result<()> {
        if self.session_active {
            return Err(Error::SessionActive);
        }
        if let Some(cue) = &mut devices.cue {
            cue.set_frequency(config.cs_plus_freq);
            cue.set_pulsed(false, 200, 200);
        }
        if let Some(cue2) = &mut devices.cue2 {
            cue2.set_frequency(config.cs_minus_freq);
            // The second channel pulses so the two cues stay discriminable
            // even on rigs with one speaker.
            cue2.set_pulsed(true, 200, 200);
        }
        self.config = config;
        Ok(())
    }

    pub fn start_session(&mut self, now: u32) {
        self.order = TrialTable::generate(
            self.config.cs_plus_count,
            self.config.cs_minus_count,
            &mut self.rng,
        );
        self.trial_index = 0;
        self.session_offset = now;
        self.session_active = true;
        self.paused = false;
        self.current_iti = self.sample_iti();
        self.phase = if self.order.total() == 0 {
            PavPhase::Idle
        } else {
            PavPhase::Iti
        };
        self.phase_start = now;
        info!(
            "pavlovian session started: {} trials, first iti {} ms",
            self.order.total(),
            self.current_iti
        );
    }

    pub fn end_session(&mut self, devices: &mut Devices) {
        self.session_active = false;
        self.paused = false;
        self.phase = PavPhase::Idle;
        devices.all_outputs_off();
        info!("pavlovian session ended at trial {}", self.trial_index);
    }

    /// Pause freezes the phase clock; resuming shifts the phase origin by
    /// the pause duration so no trial time is lost or skipped.
    pub fn set_paused(&mut self, paused: bool, now: u32, devices: &mut Devices) {
        if !self.session_active || paused == self.paused {
            return;
        }
        if paused {
            self.pause_start = now;
            devices.silence_cues();
        } else {
            let held = now.wrapping_sub(self.pause_start);
            self.phase_start = self.phase_start.wrapping_add(held);
        }
        self.paused = paused;
    }

    /// One pass of the phase machine plus the output service tick.
    pub fn update(&mut self, now: u32, devices: &mut Devices, sink: &mut impl ReportSink) {
        if self.session_active && !self.paused {
            self.tick_phase(now, devices, sink);
        }
        // Outputs run even when paused so an in-flight infusion completes.
        devices.service_outputs(now);
    }

    fn tick_phase(&mut self, now: u32, devices: &mut Devices, sink: &mut impl ReportSink) {
        let elapsed = now.wrapping_sub(self.phase_start);
        match self.phase {
            PavPhase::Idle => {}
            PavPhase::Iti => {
                if elapsed >= self.current_iti {
                    self.start_trial(now, devices, sink);
                }
            }
            PavPhase::CueOn => {
                if elapsed >= self.config.cue_duration_ms {
                    self.phase = PavPhase::Trace;
                    self.phase_start = now;
                    sink.emit(Record::trial_event(
                        "TRACE_START",
                        self.trial_index,
                        now.wrapping_sub(self.session_offset),
                    ));
                }
            }
            PavPhase::Trace => {
                if elapsed >= self.config.trace_interval_ms {
                    self.deliver_outcome(now, devices, sink);
                    self.phase = PavPhase::Reward;
                    self.phase_start = now;
                }
            }
            PavPhase::Reward => {
                if elapsed >= self.config.consumption_ms {
                    self.advance_trial(now, sink);
                }
            }
        }
    }

    fn start_trial(&mut self, now: u32, devices: &mut Devices, sink: &mut impl ReportSink) {
        let is_cs_minus = self.order.is_cs_minus(self.trial_index);
        let prob = if is_cs_minus {
            self.config.cs_minus_prob
        } else {
            self.config.cs_plus_prob
        };
        // Single draw per trial; delivery later just reads the flag.
        self.reward_this_trial = prob >= 100 || self.rng.gen_range(0..100_u8) < prob;

        let dur = self.config.cue_duration_ms;
        if let Some(cue) = self.select_cue(is_cs_minus, devices) {
            cue.activate(now, dur);
            let (pin, name) = (cue.pin(), self.cue_name(is_cs_minus));
            sink.emit(Record::device_event(
                name,
                pin,
                "TONE",
                now.wrapping_sub(self.session_offset),
                now.wrapping_add(dur).wrapping_sub(self.session_offset),
            ));
        }
        sink.emit(Record::trial_start(
            self.trial_index,
            is_cs_minus,
            self.reward_this_trial,
            self.current_iti,
            now.wrapping_sub(self.session_offset),
        ));

        self.phase = PavPhase::CueOn;
        self.phase_start = now;
    }

    fn deliver_outcome(&mut self, now: u32, devices: &mut Devices, sink: &mut impl ReportSink) {
        let ts = now.wrapping_sub(self.session_offset);
        if self.reward_this_trial {
            let is_cs_minus = self.order.is_cs_minus(self.trial_index);
            if let Some(pump) = self.select_pump(is_cs_minus, devices) {
                if pump.armed {
                    let dur = pump.duration();
                    pump.activate(now, dur);
                    let (pin, name) = (pump.pin(), self.pump_name(is_cs_minus));
                    sink.emit(Record::device_event(
                        name,
                        pin,
                        "INFUSION",
                        ts,
                        ts.wrapping_add(dur),
                    ));
                }
            }
            sink.emit(Record::trial_event("REWARD_DELIVERED", self.trial_index, ts));
        } else {
            sink.emit(Record::trial_event("REWARD_OMITTED", self.trial_index, ts));
        }
    }

    fn advance_trial(&mut self, now: u32, sink: &mut impl ReportSink) {
        self.trial_index += 1;
        if self.trial_index >= self.order.total() {
            sink.emit(Record::trial_event(
                "ALL_TRIALS_COMPLETE",
                self.trial_index,
                now.wrapping_sub(self.session_offset),
            ));
            self.phase = PavPhase::Idle;
            info!("all {} pavlovian trials complete", self.order.total());
        } else {
            self.current_iti = self.sample_iti();
            self.phase = PavPhase::Iti;
            self.phase_start = now;
        }
    }

    fn sample_iti(&mut self) -> u32 {
        iti::sample_iti(
            self.config.iti_mean_ms,
            self.config.iti_min_ms,
            self.config.iti_max_ms,
            &mut self.rng,
        )
    }

    // Counterbalance flips which physical channel carries CS+.  XOR keeps
    // the selection branch-free: channel 2 iff exactly one of (CS−, flag).
    fn select_cue<'d>(
        &self,
        is_cs_minus: bool,
        devices: &'d mut Devices,
    ) -> Option<&'d mut crate::devices::Cue> {
        if is_cs_minus != self.config.counterbalance {
            devices.cue2.as_mut()
        } else {
            devices.cue.as_mut()
        }
    }

    fn select_pump<'d>(
        &self,
        is_cs_minus: bool,
        devices: &'d mut Devices,
    ) -> Option<&'d mut crate::devices::Pump> {
        if is_cs_minus != self.config.counterbalance {
            devices.pump2.as_mut()
        } else {
            devices.pump.as_mut()
        }
    }

    fn cue_name(&self, is_cs_minus: bool) -> &'static str {
        if is_cs_minus != self.config.counterbalance {
            "CUE_2"
        } else {
            "CUE"
        }
    }

    fn pump_name(&self, is_cs_minus: bool) -> &'static str {
        if is_cs_minus != self.config.counterbalance {
            "PUMP_2"
        } else {
            "PUMP"
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> PavPhase {
        self.phase
    }

    #[cfg(test)]
    pub fn trial_index(&self) -> u8 {
        self.trial_index
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
