//! Device bay — every peripheral a chamber can carry.
//!
//! A chamber is assembled from optional slots; a rig without, say, an
//! optogenetic stimulator simply leaves that slot `None` and every chain
//! step targeting it becomes a no-op.

pub mod cue;
pub mod frame_sync;
pub mod hw;
pub mod lever;
pub mod lick;
pub mod pump;
pub mod stim;

pub use cue::Cue;
pub use frame_sync::FrameSync;
pub use lever::{Lever, LeverEdge};
pub use lick::{LickCircuit, LickEdge};
pub use pump::Pump;
pub use stim::{Stim, StimMode};

/// Which lever a press came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeverSide {
    Rh,
    Lh,
}

/// Addressable target of a chain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceId {
    Cue,
    Cue2,
    Pump,
    Pump2,
    Stim,
    LeverRh,
    LeverLh,
}

impl DeviceId {
    /// Wire name used in host records.
    pub fn name(self) -> &'static str {
        match self {
            Self::Cue => "CUE",
            Self::Cue2 => "CUE_2",
            Self::Pump => "PUMP",
            Self::Pump2 => "PUMP_2",
            Self::Stim => "LASER",
            Self::LeverRh | Self::LeverLh => "SWITCH_LEVER",
        }
    }

    /// Wire name of the activation event this device produces.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Cue | Self::Cue2 => "TONE",
            Self::Pump | Self::Pump2 => "INFUSION",
            Self::Stim => "STIM",
            Self::LeverRh | Self::LeverLh => "PRESS",
        }
    }

    pub fn lever_side(self) -> Option<LeverSide> {
        match self {
            Self::LeverRh => Some(LeverSide::Rh),
            Self::LeverLh => Some(LeverSide::Lh),
            _ => None,
        }
    }
}

/// All peripherals installed in one chamber.
pub struct Devices {
    pub lever_rh: Option<Lever>,
    pub lever_lh: Option<Lever>,
    pub lick: Option<LickCircuit>,
    pub cue: Option<Cue>,
    pub cue2: Option<Cue>,
    pub pump: Option<Pump>,
    pub pump2: Option<Pump>,
    pub stim: Option<Stim>,
    pub frame_sync: Option<FrameSync>,
}

impl Devices {
    /// An empty bay; slots are filled by the rig assembly in `main` or by
    /// tests.
    pub fn empty() -> Self {
        Self {
            lever_rh: None,
            lever_lh: None,
            lick: None,
            cue: None,
            cue2: None,
            pump: None,
            pump2: None,
            stim: None,
            frame_sync: None,
        }
    }

    pub fn lever(&self, side: LeverSide) -> Option<&Lever> {
        match side {
            LeverSide::Rh => self.lever_rh.as_ref(),
            LeverSide::Lh => self.lever_lh.as_ref(),
        }
    }

    pub fn lever_mut(&mut self, side: LeverSide) -> Option<&mut Lever> {
        match side {
            LeverSide::Rh => self.lever_rh.as_mut(),
            LeverSide::Lh => self.lever_lh.as_mut(),
        }
    }

    /// Tick every output state machine.  Runs unconditionally, paused or
    /// not, so an in-flight infusion always completes.
    pub fn service_outputs(&mut self, now: u32) {
        if let Some(cue) = &mut self.cue {
            cue.service(now);
        }
        if let Some(cue2) = &mut self.cue2 {
            cue2.service(now);
        }
        if let Some(pump) = &mut self.pump {
            pump.service(now);
        }
        if let Some(pump2) = &mut self.pump2 {
            pump2.service(now);
        }
        if let Some(stim) = &mut self.stim {
            stim.service(now);
        }
        if let Some(fs) = &mut self.frame_sync {
            fs.service(now);
        }
    }

    /// Cut both tones immediately (pause entry).
    pub fn silence_cues(&mut self) {
        if let Some(cue) = &mut self.cue {
            cue.silence();
        }
        if let Some(cue2) = &mut self.cue2 {
            cue2.silence();
        }
    }

    /// Force every output to its safe state (session end, test-mode exit).
    pub fn all_outputs_off(&mut self) {
        self.silence_cues();
        if let Some(pump) = &mut self.pump {
            pump.force_off();
        }
        if let Some(pump2) = &mut self.pump2 {
            pump2.force_off();
        }
        if let Some(stim) = &mut self.stim {
            stim.force_off();
        }
    }

    /// Arm or disarm every installed device at once.
    pub fn arm_all(&mut self, armed: bool) {
        if let Some(l) = &mut self.lever_rh {
            l.armed = armed;
        }
        if let Some(l) = &mut self.lever_lh {
            l.armed = armed;
        }
        if let Some(lc) = &mut self.lick {
            lc.armed = armed;
        }
        if let Some(c) = &mut self.cue {
            c.armed = armed;
        }
        if let Some(c) = &mut self.cue2 {
            c.armed = armed;
        }
        if let Some(p) = &mut self.pump {
            p.armed = armed;
        }
        if let Some(p) = &mut self.pump2 {
            p.armed = armed;
        }
        if let Some(s) = &mut self.stim {
            s.armed = armed;
        }
        if let Some(fs) = &mut self.frame_sync {
            fs.armed = armed;
        }
    }
}
