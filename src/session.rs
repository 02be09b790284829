//! Session orchestration: one chamber, one serial host.
//!
//! `SessionService` owns the device bay, the operant contingency engine,
//! the Pavlovian trial engine, and the report sink.  The firmware loop
//! feeds it two things: command lines from the host and a millisecond
//! clock; everything else (input edges, trigger evaluation, record
//! emission) happens inside `tick`.
//!
//! Configuration commands are rejected while a session runs: the command
//! becomes a no-op and a level 006 error record tells the host why.

use log::warn;

use crate::commands::{self, Command, PavParam, Peripheral};
use crate::config::{Paradigm, SessionConfig};
use crate::devices::{DeviceId, Devices, LeverEdge, LeverSide, LickEdge};
use crate::error::{Error, Result};
use crate::pavlovian::{PavlovianConfig, PavlovianEngine};
use crate::report::{Record, ReportSink};
use crate::scheduler::paradigms::{
    RewardShape, configure_fixed_ratio, configure_omission, configure_progressive_ratio,
    configure_variable_interval,
};
use crate::scheduler::Scheduler;

pub struct SessionService<S: ReportSink> {
    devices: Devices,
    scheduler: Scheduler,
    pavlovian: PavlovianEngine,
    config: SessionConfig,
    paradigm: Paradigm,
    sink: S,
}

impl<S: ReportSink> SessionService<S> {
    pub fn new(devices: Devices, seed: u64, sink: S) -> Self {
        Self {
            devices,
            scheduler: Scheduler::new(seed),
            pavlovian: PavlovianEngine::new(seed ^ 0x9e37_79b9_7f4a_7c15),
            config: SessionConfig::default(),
            paradigm: Paradigm::FixedRatio,
            sink,
        }
    }

    pub fn devices(&self) -> &Devices {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut Devices {
        &mut self.devices
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn paradigm(&self) -> Paradigm {
        self.paradigm
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn session_running(&self) -> bool {
        self.scheduler.is_active() || self.pavlovian.is_active()
    }

    fn paused(&self) -> bool {
        self.scheduler.is_paused() || self.pavlovian.is_paused()
    }

    fn active_offset(&self) -> u32 {
        if self.pavlovian.is_active() {
            self.pavlovian.session_offset()
        } else {
            self.scheduler.session_offset()
        }
    }

    // ── per-tick drive ───────────────────────────────────────────

    /// One pass of the firmware loop: drain input edges, then advance the
    /// engine that owns the current paradigm.
    pub fn tick(&mut self, now: u32) {
        self.poll_inputs(now);
        match self.paradigm {
            Paradigm::Pavlovian => self.pavlovian.update(now, &mut self.devices, &mut self.sink),
            _ => self.scheduler.update(now, &mut self.devices, &mut self.sink),
        }
    }

    fn poll_inputs(&mut self, now: u32) {
        let rh = self.devices.lever_rh.as_mut().and_then(|l| l.monitor(now));
        if let Some(edge) = rh {
            self.lever_edge(LeverSide::Rh, edge);
        }
        let lh = self.devices.lever_lh.as_mut().and_then(|l| l.monitor(now));
        if let Some(edge) = lh {
            self.lever_edge(LeverSide::Lh, edge);
        }

        let lick = self.devices.lick.as_mut().and_then(|l| l.monitor(now));
        if let Some(LickEdge::End { start, end }) = lick {
            if self.session_running() && !self.paused() {
                let offset = self.active_offset();
                if let Some(lc) = &self.devices.lick {
                    self.sink.emit(Record::lick(
                        lc.pin(),
                        start.wrapping_sub(offset),
                        end.wrapping_sub(offset),
                    ));
                }
            }
        }

        let frame = self
            .devices
            .frame_sync
            .as_mut()
            .and_then(|f| f.poll().map(|ts| (ts, f.timestamp_pin())));
        if let Some((raw, pin)) = frame {
            let offset = self.active_offset();
            self.sink
                .emit(Record::frame_timestamp(pin, raw.wrapping_sub(offset)));
        }
    }

    /// Feed a debounced lever edge to whichever engine owns the paradigm.
    /// Exposed so tests can inject edges without GPIO.
    pub fn lever_edge(&mut self, side: LeverSide, edge: LeverEdge) {
        match self.paradigm {
            Paradigm::Pavlovian => {
                // Presses never alter a Pavlovian schedule; both levers log
                // as active responding.
                if let LeverEdge::Release(_) = edge {
                    if !self.pavlovian.is_active() || self.pavlovian.is_paused() {
                        return;
                    }
                    let offset = self.pavlovian.session_offset();
                    if let Some(lever) = self.devices.lever(side) {
                        self.sink.emit(Record::lever_press(
                            lever.pin(),
                            "ACTIVE",
                            lever.start_timestamp().wrapping_sub(offset),
                            lever.end_timestamp().wrapping_sub(offset),
                            lever.orientation(),
                        ));
                    }
                }
            }
            _ => match edge {
                LeverEdge::Press(ts) => {
                    self.scheduler
                        .on_press(side, ts, &mut self.devices, &mut self.sink)
                }
                LeverEdge::Release(_) => {
                    self.scheduler
                        .on_release(side, &self.devices, &mut self.sink)
                }
            },
        }
    }

    // ── host commands ────────────────────────────────────────────

    /// Parse and apply one command line from the host.
    pub fn handle_line(&mut self, line: &str, now: u32) -> Result<()> {
        match commands::parse(line) {
            Ok(cmd) => self.handle_command(cmd, now),
            Err(e) => self.reject(Error::Command(e)),
        }
    }

    pub fn handle_command(&mut self, cmd: Command, now: u32) -> Result<()> {
        match cmd {
            // ── session lifecycle ──
            Command::SessionStart => self.start_session(now),
            Command::SessionEnd => {
                if self.pavlovian.is_active() {
                    self.pavlovian.end_session(&mut self.devices);
                } else {
                    self.scheduler.end_session(&mut self.devices);
                }
                Ok(())
            }
            Command::Identify => {
                self.emit_config_dump();
                Ok(())
            }
            Command::TestChain => {
                if self.session_running() {
                    return self.reject(Error::SessionActive);
                }
                self.scheduler.test_chain(now, &mut self.devices, &mut self.sink);
                Ok(())
            }
            Command::SetTestMode(enable) => {
                if self.session_running() {
                    return self.reject(Error::SessionActive);
                }
                self.scheduler.set_test_mode(enable, now, &mut self.devices);
                Ok(())
            }
            Command::SetPaused(paused) => {
                self.scheduler.set_paused(paused, &mut self.devices);
                self.pavlovian.set_paused(paused, now, &mut self.devices);
                Ok(())
            }

            // ── operant setup ──
            Command::SetRatio(ratio) => {
                // Live: the host nudges the requirement between rewards.
                self.config.operant.ratio = ratio;
                self.scheduler.set_ratio(ratio);
                Ok(())
            }
            Command::SetParadigm(p) => self.configure(|s| s.paradigm = p),
            Command::SetOmissionInterval(ms) => {
                self.configure(|s| s.config.operant.omission_interval_ms = ms)
            }
            Command::SetViInterval(ms) => {
                self.configure(|s| s.config.operant.vi_interval_ms = ms)
            }
            Command::SetPrStep(step) => self.configure(|s| s.config.operant.pr_step = step),
            Command::SetTraceInterval(ms) => {
                self.configure(|s| s.config.operant.trace_interval_ms = ms)
            }

            // ── pavlovian setup ──
            Command::SetPavParam(param, value) => {
                self.configure(|s| apply_pav_param(&mut s.config.pavlovian, param, value))
            }
            Command::SetPavPulse { on_ms, off_ms } => self.configure(|s| {
                if let Some(cue2) = &mut s.devices.cue2 {
                    cue2.set_pulsed(true, on_ms, off_ms);
                }
            }),
            Command::ConfigurePavlovian(cfg) => {
                if self.session_running() {
                    return self.reject(Error::SessionActive);
                }
                self.config.pavlovian = cfg.clone();
                self.pavlovian.configure(cfg, &mut self.devices)?;
                Ok(())
            }

            // ── device surface ──
            Command::Arm { device, armed } => self.arm(device, armed),
            Command::Test(device) => self.test_device(device, now),
            Command::SetFrequency { device, hz } => {
                match device {
                    Peripheral::Cue => {
                        if let Some(c) = &mut self.devices.cue {
                            c.set_frequency(hz);
                        }
                    }
                    Peripheral::Cue2 => {
                        if let Some(c) = &mut self.devices.cue2 {
                            c.set_frequency(hz);
                        }
                    }
                    Peripheral::Stim => {
                        if let Some(s) = &mut self.devices.stim {
                            s.set_frequency(hz);
                        }
                    }
                    _ => return self.reject(Error::DeviceMissing("frequency target")),
                }
                self.emit_device_config(device);
                Ok(())
            }
            Command::SetDuration { device, ms } => {
                match device {
                    Peripheral::Cue => {
                        if let Some(c) = &mut self.devices.cue {
                            c.set_duration(ms);
                        }
                    }
                    Peripheral::Cue2 => {
                        if let Some(c) = &mut self.devices.cue2 {
                            c.set_duration(ms);
                        }
                    }
                    Peripheral::Pump => {
                        if let Some(p) = &mut self.devices.pump {
                            p.set_duration(ms);
                        }
                    }
                    Peripheral::Pump2 => {
                        if let Some(p) = &mut self.devices.pump2 {
                            p.set_duration(ms);
                        }
                    }
                    Peripheral::Stim => {
                        if let Some(s) = &mut self.devices.stim {
                            s.set_duration(ms);
                        }
                    }
                    _ => return self.reject(Error::DeviceMissing("duration target")),
                }
                self.emit_device_config(device);
                Ok(())
            }
            Command::SetStimMode(mode) => {
                if let Some(s) = &mut self.devices.stim {
                    s.set_mode(mode);
                }
                self.emit_device_config(Peripheral::Stim);
                Ok(())
            }
            Command::SetLeverTimeout { side: _, ms } => {
                // One chamber-wide timeout interval; both lever codes set it.
                self.config.operant.timeout_interval_ms = ms;
                self.scheduler.set_timeout_interval(ms);
                Ok(())
            }
            Command::SetLeverRatio { side: _, ratio } => {
                self.config.operant.ratio = ratio;
                self.scheduler.set_ratio(ratio);
                Ok(())
            }
            Command::SetLeverReinforced { side, reinforced } => {
                if let Some(lever) = self.devices.lever_mut(side) {
                    lever.reinforced = reinforced;
                }
                self.emit_device_config(match side {
                    LeverSide::Rh => Peripheral::LeverRh,
                    LeverSide::Lh => Peripheral::LeverLh,
                });
                Ok(())
            }
        }
    }

    /// Apply a configuration mutation, or reject it if a session runs.
    fn configure(&mut self, apply: impl FnOnce(&mut Self)) -> Result<()> {
        if self.session_running() {
            return self.reject(Error::SessionActive);
        }
        apply(self);
        Ok(())
    }

    fn reject(&mut self, err: Error) -> Result<()> {
        warn!("rejected host command: {err}");
        self.sink.emit(Record::fault(err.to_string()));
        Err(err)
    }

    // ── session start ────────────────────────────────────────────

    fn start_session(&mut self, now: u32) -> Result<()> {
        if self.session_running() {
            return self.reject(Error::SessionActive);
        }
        if self.paradigm == Paradigm::Pavlovian {
            self.pavlovian
                .configure(self.config.pavlovian.clone(), &mut self.devices)?;
            self.pavlovian.start_session(now);
            return Ok(());
        }

        let oc = &self.config.operant;
        let shape = RewardShape {
            cue_duration: oc.cue_duration_ms,
            pump_duration: oc.pump_duration_ms,
            stim_duration: oc.stim_duration_ms,
            trace_interval: oc.trace_interval_ms,
            timeout_target: DeviceId::LeverRh,
        };
        self.scheduler.set_timeout_interval(oc.timeout_interval_ms);
        match self.paradigm {
            Paradigm::FixedRatio => configure_fixed_ratio(&mut self.scheduler, oc.ratio, &shape),
            Paradigm::ProgressiveRatio => {
                configure_progressive_ratio(&mut self.scheduler, oc.ratio, oc.pr_step, &shape)
            }
            Paradigm::Omission => {
                configure_omission(&mut self.scheduler, oc.omission_interval_ms, &shape)
            }
            Paradigm::VariableInterval => {
                configure_variable_interval(&mut self.scheduler, oc.vi_interval_ms, &shape)
            }
            Paradigm::Pavlovian => unreachable!("handled above"),
        }
        let probability = self.config.operant.probability;
        if let Some(t) = self.scheduler.trigger_mut(0) {
            t.probability = probability;
        }
        self.scheduler.start_session(now, &mut self.devices);
        Ok(())
    }

    // ── device helpers ───────────────────────────────────────────

    fn arm(&mut self, device: Peripheral, armed: bool) -> Result<()> {
        let pin = match device {
            Peripheral::Cue => self.devices.cue.as_mut().map(|d| {
                d.armed = armed;
                d.pin()
            }),
            Peripheral::Cue2 => self.devices.cue2.as_mut().map(|d| {
                d.armed = armed;
                d.pin()
            }),
            Peripheral::Pump => self.devices.pump.as_mut().map(|d| {
                d.armed = armed;
                d.pin()
            }),
            Peripheral::Pump2 => self.devices.pump2.as_mut().map(|d| {
                d.armed = armed;
                d.pin()
            }),
            Peripheral::Lick => self.devices.lick.as_mut().map(|d| {
                d.armed = armed;
                d.pin()
            }),
            Peripheral::Stim => self.devices.stim.as_mut().map(|d| {
                d.armed = armed;
                d.pin()
            }),
            Peripheral::FrameSync => self.devices.frame_sync.as_mut().map(|d| {
                d.armed = armed;
                d.timestamp_pin()
            }),
            Peripheral::LeverRh => self.devices.lever_rh.as_mut().map(|d| {
                d.armed = armed;
                d.pin()
            }),
            Peripheral::LeverLh => self.devices.lever_lh.as_mut().map(|d| {
                d.armed = armed;
                d.pin()
            }),
        };
        match pin {
            Some(pin) => {
                self.sink
                    .emit(Record::arm_state(peripheral_name(device), pin, armed));
                Ok(())
            }
            None => self.reject(Error::DeviceMissing(peripheral_name(device))),
        }
    }

    fn test_device(&mut self, device: Peripheral, now: u32) -> Result<()> {
        let found = match device {
            Peripheral::Cue => self.devices.cue.as_mut().map(|d| d.test(now)),
            Peripheral::Cue2 => self.devices.cue2.as_mut().map(|d| d.test(now)),
            Peripheral::Pump => self.devices.pump.as_mut().map(|d| d.test(now)),
            Peripheral::Pump2 => self.devices.pump2.as_mut().map(|d| d.test(now)),
            Peripheral::Stim => self.devices.stim.as_mut().map(|d| d.test(now)),
            Peripheral::FrameSync => self.devices.frame_sync.as_mut().map(|d| d.pulse(now)),
            // Input devices have no bench test.
            _ => return self.reject(Error::DeviceMissing(peripheral_name(device))),
        };
        match found {
            Some(()) => Ok(()),
            None => self.reject(Error::DeviceMissing(peripheral_name(device))),
        }
    }

    /// Level 000 snapshot of one device's parameters.
    fn emit_device_config(&mut self, device: Peripheral) {
        let record = match device {
            Peripheral::Cue => self.devices.cue.as_ref().map(|d| {
                Record::device_config("CUE", d.armed, Some(d.frequency()), Some(d.duration()), None)
            }),
            Peripheral::Cue2 => self.devices.cue2.as_ref().map(|d| {
                Record::device_config(
                    "CUE_2",
                    d.armed,
                    Some(d.frequency()),
                    Some(d.duration()),
                    None,
                )
            }),
            Peripheral::Pump => self
                .devices
                .pump
                .as_ref()
                .map(|d| Record::device_config("PUMP", d.armed, None, Some(d.duration()), None)),
            Peripheral::Pump2 => self
                .devices
                .pump2
                .as_ref()
                .map(|d| Record::device_config("PUMP_2", d.armed, None, Some(d.duration()), None)),
            Peripheral::Lick => self
                .devices
                .lick
                .as_ref()
                .map(|d| Record::device_config("LICK_CIRCUIT", d.armed, None, None, None)),
            Peripheral::Stim => self.devices.stim.as_ref().map(|d| {
                Record::device_config(
                    "LASER",
                    d.armed,
                    Some(d.frequency()),
                    Some(d.duration()),
                    None,
                )
            }),
            Peripheral::FrameSync => self
                .devices
                .frame_sync
                .as_ref()
                .map(|d| Record::device_config("MICROSCOPE", d.armed, None, None, None)),
            Peripheral::LeverRh => self.devices.lever_rh.as_ref().map(|d| {
                Record::device_config("SWITCH_LEVER", d.armed, None, None, Some(d.reinforced))
            }),
            Peripheral::LeverLh => self.devices.lever_lh.as_ref().map(|d| {
                Record::device_config("SWITCH_LEVER", d.armed, None, None, Some(d.reinforced))
            }),
        };
        if let Some(record) = record {
            self.sink.emit(record);
        }
    }

    /// `IDENTIFY` response: a level 000 record per installed device.
    fn emit_config_dump(&mut self) {
        for p in [
            Peripheral::LeverRh,
            Peripheral::LeverLh,
            Peripheral::Lick,
            Peripheral::Cue,
            Peripheral::Cue2,
            Peripheral::Pump,
            Peripheral::Pump2,
            Peripheral::Stim,
            Peripheral::FrameSync,
        ] {
            self.emit_device_config(p);
        }
    }
}

fn peripheral_name(device: Peripheral) -> &'static str {
    match device {
        Peripheral::Cue => "CUE",
        Peripheral::Cue2 => "CUE_2",
        Peripheral::Pump => "PUMP",
        Peripheral::Pump2 => "PUMP_2",
        Peripheral::Lick => "LICK_CIRCUIT",
        Peripheral::Stim => "LASER",
        Peripheral::FrameSync => "MICROSCOPE",
        Peripheral::LeverRh | Peripheral::LeverLh => "SWITCH_LEVER",
    }
}

fn apply_pav_param(cfg: &mut PavlovianConfig, param: PavParam, value: u32) {
    match param {
        PavParam::CsPlusProb => cfg.cs_plus_prob = value.min(100) as u8,
        PavParam::CsMinusProb => cfg.cs_minus_prob = value.min(100) as u8,
        PavParam::CsPlusCount => cfg.cs_plus_count = value.min(255) as u8,
        PavParam::CsMinusCount => cfg.cs_minus_count = value.min(255) as u8,
        PavParam::CsPlusFreq => cfg.cs_plus_freq = value,
        PavParam::CsMinusFreq => cfg.cs_minus_freq = value,
        PavParam::Counterbalance => cfg.counterbalance = value != 0,
        PavParam::CueDuration => cfg.cue_duration_ms = value,
        PavParam::TraceInterval => cfg.trace_interval_ms = value,
        PavParam::Consumption => cfg.consumption_ms = value,
        PavParam::ItiMean => cfg.iti_mean_ms = value,
        PavParam::ItiMin => cfg.iti_min_ms = value,
        PavParam::ItiMax => cfg.iti_max_ms = value,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
