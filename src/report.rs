//! Structured data records for the host link.
//!
//! Every behavioral datum leaves the board as one JSON object per line,
//! tagged with a `level` string the acquisition software switches on:
//!
//!   "000" — configuration / parameter dumps
//!   "001" — arm / disarm state changes
//!   "006" — error messages
//!   "007" — behavioral events (presses, licks, device activations, trials)
//!   "008" — microscope frame timestamps
//!
//! Records go through the [`ReportSink`] port rather than straight to the
//! UART so the session logic stays host-testable.  All timestamps in
//! records are session-relative (offset already subtracted by the caller).

use serde::Serialize;

// ---------------------------------------------------------------------------
// Record payloads
// ---------------------------------------------------------------------------

/// Level 000 — device parameter dump, sent whenever a setting changes.
/// Optional fields are omitted for devices that lack them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceConfig {
    level: &'static str,
    pub device: &'static str,
    pub armed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reinforced: Option<bool>,
}

/// Level 001 — arm-state change acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArmState {
    level: &'static str,
    pub device: &'static str,
    pub pin: i32,
    pub desc: &'static str,
}

/// Level 006 — error surfaced to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    level: &'static str,
    pub error: String,
}

/// Level 007 — a completed lever press (logged on release).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeverPress {
    level: &'static str,
    pub device: &'static str,
    pub pin: i32,
    pub event: &'static str,
    pub class: &'static str,
    pub start_timestamp: u32,
    pub end_timestamp: u32,
    pub orientation: &'static str,
}

/// Level 007 — a completed lick (logged on release).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lick {
    level: &'static str,
    pub device: &'static str,
    pub pin: i32,
    pub event: &'static str,
    pub start_timestamp: u32,
    pub end_timestamp: u32,
}

/// Level 007 — an output device activation window (tone, infusion, stim).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEvent {
    level: &'static str,
    pub device: &'static str,
    pub pin: i32,
    pub event: &'static str,
    pub start_timestamp: u32,
    pub end_timestamp: u32,
}

/// Level 007 — Pavlovian trial start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialStart {
    level: &'static str,
    pub device: &'static str,
    pub event: &'static str,
    pub trial: u8,
    pub trial_type: &'static str,
    pub reward_scheduled: bool,
    pub iti_ms: u32,
    pub timestamp: u32,
}

/// Level 007 — other Pavlovian milestones (phase entries, session complete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialEvent {
    level: &'static str,
    pub device: &'static str,
    pub event: &'static str,
    pub trial: u8,
    pub timestamp: u32,
}

/// Level 008 — one miniscope frame-sync timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameTimestamp {
    level: &'static str,
    pub device: &'static str,
    pub pin: i32,
    pub event: &'static str,
    pub timestamp: u32,
}

// ---------------------------------------------------------------------------
// Record sum type + constructors
// ---------------------------------------------------------------------------

/// One host-link record.  Serializes untagged: the inner `level` field is
/// the discriminant the host switches on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    DeviceConfig(DeviceConfig),
    ArmState(ArmState),
    Fault(Fault),
    LeverPress(LeverPress),
    Lick(Lick),
    DeviceEvent(DeviceEvent),
    TrialStart(TrialStart),
    TrialEvent(TrialEvent),
    FrameTimestamp(FrameTimestamp),
}

impl Record {
    pub fn device_config(
        device: &'static str,
        armed: bool,
        frequency: Option<u32>,
        duration: Option<u32>,
        reinforced: Option<bool>,
    ) -> Self {
        Self::DeviceConfig(DeviceConfig {
            level: "000",
            device,
            armed,
            frequency,
            duration,
            reinforced,
        })
    }

    pub fn arm_state(device: &'static str, pin: i32, armed: bool) -> Self {
        Self::ArmState(ArmState {
            level: "001",
            device,
            pin,
            desc: if armed { "ARMED" } else { "DISARMED" },
        })
    }

    pub fn fault(error: String) -> Self {
        Self::Fault(Fault {
            level: "006",
            error,
        })
    }

    pub fn lever_press(
        pin: i32,
        class: &'static str,
        start_timestamp: u32,
        end_timestamp: u32,
        orientation: &'static str,
    ) -> Self {
        Self::LeverPress(LeverPress {
            level: "007",
            device: "SWITCH_LEVER",
            pin,
            event: "PRESS",
            class,
            start_timestamp,
            end_timestamp,
            orientation,
        })
    }

    pub fn lick(pin: i32, start_timestamp: u32, end_timestamp: u32) -> Self {
        Self::Lick(Lick {
            level: "007",
            device: "LICK_CIRCUIT",
            pin,
            event: "LICK",
            start_timestamp,
            end_timestamp,
        })
    }

    pub fn device_event(
        device: &'static str,
        pin: i32,
        event: &'static str,
        start_timestamp: u32,
        end_timestamp: u32,
    ) -> Self {
        Self::DeviceEvent(DeviceEvent {
            level: "007",
            device,
            pin,
            event,
            start_timestamp,
            end_timestamp,
        })
    }

    pub fn trial_start(
        trial: u8,
        is_cs_minus: bool,
        reward_scheduled: bool,
        iti_ms: u32,
        timestamp: u32,
    ) -> Self {
        Self::TrialStart(TrialStart {
            level: "007",
            device: "PAVLOV",
            event: "TRIAL_START",
            trial,
            trial_type: if is_cs_minus { "CS_MINUS" } else { "CS_PLUS" },
            reward_scheduled,
            iti_ms,
            timestamp,
        })
    }

    pub fn trial_event(event: &'static str, trial: u8, timestamp: u32) -> Self {
        Self::TrialEvent(TrialEvent {
            level: "007",
            device: "PAVLOV",
            event,
            trial,
            timestamp,
        })
    }

    pub fn frame_timestamp(pin: i32, timestamp: u32) -> Self {
        Self::FrameTimestamp(FrameTimestamp {
            level: "008",
            device: "MICROSCOPE",
            pin,
            event: "TIMESTAMP",
            timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// Sink port
// ---------------------------------------------------------------------------

/// Output port for data records.  The firmware binary wires this to the
/// UART; tests substitute a recording double.
pub trait ReportSink {
    fn emit(&mut self, record: Record);
}

/// Production sink: one JSON object per line on stdout (the ESP-IDF console
/// UART).  A record that fails to serialize is dropped; there is nowhere
/// else to report it.
pub struct SerialSink;

impl ReportSink for SerialSink {
    fn emit(&mut self, record: Record) {
        if let Ok(line) = serde_json::to_string(&record) {
            println!("{line}");
        }
    }
}

/// Capturing sink for host tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub records: Vec<Record>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialized form of every captured record, for format assertions.
    pub fn lines(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| serde_json::to_string(r).ok())
            .collect()
    }
}

impl ReportSink for RecordingSink {
    fn emit(&mut self, record: Record) {
        self.records.push(record);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lever_press_record_shape() {
        let rec = Record::lever_press(10, "ACTIVE", 1500, 1720, "RH");
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(
            json,
            "{\"level\":\"007\",\"device\":\"SWITCH_LEVER\",\"pin\":10,\
             \"event\":\"PRESS\",\"class\":\"ACTIVE\",\"start_timestamp\":1500,\
             \"end_timestamp\":1720,\"orientation\":\"RH\"}"
        );
    }

    #[test]
    fn device_config_omits_absent_fields() {
        let rec = Record::device_config("PUMP", true, None, Some(2000), None);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"level\":\"000\""));
        assert!(json.contains("\"duration\":2000"));
        assert!(!json.contains("frequency"));
        assert!(!json.contains("reinforced"));
    }

    #[test]
    fn trial_start_record_shape() {
        let rec = Record::trial_start(3, false, true, 28421, 91000);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"device\":\"PAVLOV\""));
        assert!(json.contains("\"trial\":3"));
        assert!(json.contains("\"trial_type\":\"CS_PLUS\""));
        assert!(json.contains("\"reward_scheduled\":true"));
    }

    #[test]
    fn arm_state_desc_tracks_flag() {
        let armed = serde_json::to_string(&Record::arm_state("CUE", 3, true)).unwrap();
        let disarmed = serde_json::to_string(&Record::arm_state("CUE", 3, false)).unwrap();
        assert!(armed.contains("\"desc\":\"ARMED\""));
        assert!(disarmed.contains("\"desc\":\"DISARMED\""));
    }

    #[test]
    fn recording_sink_captures_in_order() {
        let mut sink = RecordingSink::new();
        sink.emit(Record::fault("config: bad ratio".to_string()));
        sink.emit(Record::frame_timestamp(2, 41));
        assert_eq!(sink.records.len(), 2);
        assert!(sink.lines()[0].contains("\"level\":\"006\""));
        assert!(sink.lines()[1].contains("\"level\":\"008\""));
    }
}
