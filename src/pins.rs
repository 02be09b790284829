//! GPIO pin assignments for the chamber controller board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Right-hand lever switch (active when depressed).
pub const LEVER_RH_GPIO: i32 = 10;
/// Left-hand lever switch.
pub const LEVER_LH_GPIO: i32 = 12;
/// Capacitive lick-circuit contact.
pub const LICK_GPIO: i32 = 5;
/// Miniscope frame-sync pulse — interrupt-driven, one edge per frame.
pub const FRAME_SYNC_GPIO: i32 = 2;

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Speaker for the conditioned-stimulus tone (LEDC PWM capable).
pub const CUE_GPIO: i32 = 3;
/// Syringe-pump relay (active HIGH).
pub const PUMP_GPIO: i32 = 4;
/// Optogenetic stimulator TTL line.
pub const STIM_GPIO: i32 = 6;
/// Miniscope record start/stop trigger pulse.
pub const FRAME_TRIG_GPIO: i32 = 9;

// ---------------------------------------------------------------------------
// Secondary cue/pump pair (Pavlovian counterbalance)
// ---------------------------------------------------------------------------

pub const CUE2_GPIO: i32 = 7;
pub const PUMP2_GPIO: i32 = 8;
