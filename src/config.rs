//! System configuration parameters
//!
//! All tunable parameters for a chamber, grouped per paradigm family.
//! Values arrive over the serial command link; the whole block serializes
//! with serde so a host can snapshot and restore a rig's settings.

use serde::{Deserialize, Serialize};

pub use crate::pavlovian::PavlovianConfig;

/// Which contingency program a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Paradigm {
    #[default]
    FixedRatio,
    ProgressiveRatio,
    Omission,
    VariableInterval,
    Pavlovian,
}

impl Paradigm {
    /// Wire encoding used by the host's paradigm-select command.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::FixedRatio),
            1 => Some(Self::ProgressiveRatio),
            2 => Some(Self::Omission),
            3 => Some(Self::VariableInterval),
            4 => Some(Self::Pavlovian),
            _ => None,
        }
    }
}

/// Operant (instrumental) contingency parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperantConfig {
    // --- Response requirement ---
    /// Presses per reward (FR ratio, or PR starting ratio).
    pub ratio: u8,
    /// PR escalation per reward (0 = fixed ratio).
    pub pr_step: u8,
    /// Reward probability per ratio completion (percent).
    pub probability: u8,

    // --- Interval paradigms ---
    /// Omission: required press-free span (milliseconds).
    pub omission_interval_ms: u32,
    /// VI: total interval containing one availability window (milliseconds).
    pub vi_interval_ms: u32,

    // --- Reward shape ---
    /// Tone length on reward (milliseconds).
    pub cue_duration_ms: u32,
    /// Infusion length (milliseconds).
    pub pump_duration_ms: u32,
    /// Stim train length (milliseconds).
    pub stim_duration_ms: u32,
    /// Gap between cue offset and reward onset (milliseconds).
    pub trace_interval_ms: u32,
    /// Post-reward lockout on the active lever (milliseconds).
    pub timeout_interval_ms: u32,
}

impl Default for OperantConfig {
    fn default() -> Self {
        Self {
            ratio: 1,
            pr_step: 0,
            probability: 100,

            omission_interval_ms: 20_000,
            vi_interval_ms: 15_000,

            cue_duration_ms: 1600,
            pump_duration_ms: 2000,
            stim_duration_ms: 5000,
            trace_interval_ms: 0,
            timeout_interval_ms: 20_000,
        }
    }
}

/// Everything the host can set on one chamber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    pub operant: OperantConfig,
    pub pavlovian: PavlovianConfig,
}
