//! Host command link: numeric codes and line parsing.
//!
//! Commands arrive one per line as `CODE` or `CODE:VALUE`, e.g. `101` to
//! start a session or `1075:5` to set the RH lever ratio.  Codes follow a
//! `[device prefix][action suffix]` scheme:
//!
//!   prefix: 1xx controller, 2xx session setup, 3xx cue, 4xx pump,
//!           5xx lick, 6xx stim, 9xx microscope, 10xx RH lever,
//!           13xx LH lever
//!   suffix: x00 disarm, x01 arm, x03 test, x71 set frequency,
//!           x72 set duration, x74 set timeout, x75 set ratio,
//!           x80/x81 inactive/active
//!
//! A line starting with `{` is the JSON form of the whole Pavlovian
//! parameter block, for hosts that prefer one atomic configure.

use crate::config::Paradigm;
use crate::devices::{LeverSide, StimMode};
use crate::error::CommandError;
use crate::pavlovian::PavlovianConfig;

// ───────────────────────────── command codes ─────────────────────────────

mod code {
    pub const SESSION_END: u16 = 100;
    pub const SESSION_START: u16 = 101;
    pub const IDENTIFY: u16 = 102;
    pub const TEST_CHAIN: u16 = 103;
    pub const TEST_MODE: u16 = 104;
    pub const SESSION_PAUSE: u16 = 105;

    pub const SET_RATIO: u16 = 201;
    pub const SET_PARADIGM: u16 = 202;
    pub const SET_OMISSION_INTERVAL: u16 = 203;
    pub const SET_VI_INTERVAL: u16 = 204;
    pub const SET_PR_STEP: u16 = 205;
    pub const SET_TRACE_INTERVAL: u16 = 220;

    pub const PAV_CS_PLUS_PROB: u16 = 206;
    pub const PAV_CS_MINUS_PROB: u16 = 207;
    pub const PAV_CS_PLUS_COUNT: u16 = 208;
    pub const PAV_CS_MINUS_COUNT: u16 = 209;
    pub const PAV_CS_PLUS_FREQ: u16 = 210;
    pub const PAV_CS_MINUS_FREQ: u16 = 211;
    pub const PAV_COUNTERBALANCE: u16 = 212;
    pub const PAV_CUE_DURATION: u16 = 213;
    pub const PAV_TRACE_INTERVAL: u16 = 214;
    pub const PAV_CONSUMPTION: u16 = 215;
    pub const PAV_ITI_MEAN: u16 = 216;
    pub const PAV_ITI_MIN: u16 = 217;
    pub const PAV_ITI_MAX: u16 = 218;
    pub const PAV_PULSE_CONFIG: u16 = 219;

    pub const CUE_DISARM: u16 = 300;
    pub const CUE_ARM: u16 = 301;
    pub const CUE_TEST: u16 = 303;
    pub const CUE2_DISARM: u16 = 310;
    pub const CUE2_ARM: u16 = 311;
    pub const CUE2_TEST: u16 = 313;
    pub const CUE_SET_FREQUENCY: u16 = 371;
    pub const CUE_SET_DURATION: u16 = 372;
    pub const CUE2_SET_FREQUENCY: u16 = 381;
    pub const CUE2_SET_DURATION: u16 = 382;

    pub const PUMP_DISARM: u16 = 400;
    pub const PUMP_ARM: u16 = 401;
    pub const PUMP_TEST: u16 = 403;
    pub const PUMP2_DISARM: u16 = 410;
    pub const PUMP2_ARM: u16 = 411;
    pub const PUMP2_TEST: u16 = 413;
    pub const PUMP_SET_DURATION: u16 = 472;
    pub const PUMP2_SET_DURATION: u16 = 482;

    pub const LICK_DISARM: u16 = 500;
    pub const LICK_ARM: u16 = 501;

    pub const STIM_DISARM: u16 = 600;
    pub const STIM_ARM: u16 = 601;
    pub const STIM_TEST: u16 = 603;
    pub const STIM_SET_FREQUENCY: u16 = 671;
    pub const STIM_SET_DURATION: u16 = 672;
    pub const STIM_MODE_CONTINGENT: u16 = 681;
    pub const STIM_MODE_INDEPENDENT: u16 = 682;

    pub const MICROSCOPE_DISARM: u16 = 900;
    pub const MICROSCOPE_ARM: u16 = 901;
    pub const MICROSCOPE_TEST: u16 = 903;

    pub const LEVER_RH_DISARM: u16 = 1000;
    pub const LEVER_RH_ARM: u16 = 1001;
    pub const LEVER_RH_SET_TIMEOUT: u16 = 1074;
    pub const LEVER_RH_SET_RATIO: u16 = 1075;
    pub const LEVER_RH_SET_INACTIVE: u16 = 1080;
    pub const LEVER_RH_SET_ACTIVE: u16 = 1081;

    pub const LEVER_LH_DISARM: u16 = 1300;
    pub const LEVER_LH_ARM: u16 = 1301;
    pub const LEVER_LH_SET_TIMEOUT: u16 = 1374;
    pub const LEVER_LH_SET_RATIO: u16 = 1375;
    pub const LEVER_LH_SET_INACTIVE: u16 = 1380;
    pub const LEVER_LH_SET_ACTIVE: u16 = 1381;
}

// ───────────────────────────── typed commands ────────────────────────────

/// Addressable peripheral for arm/test/parameter commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peripheral {
    Cue,
    Cue2,
    Pump,
    Pump2,
    Lick,
    Stim,
    FrameSync,
    LeverRh,
    LeverLh,
}

/// Scalar fields of the Pavlovian parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PavParam {
    CsPlusProb,
    CsMinusProb,
    CsPlusCount,
    CsMinusCount,
    CsPlusFreq,
    CsMinusFreq,
    Counterbalance,
    CueDuration,
    TraceInterval,
    Consumption,
    ItiMean,
    ItiMin,
    ItiMax,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SessionStart,
    SessionEnd,
    Identify,
    TestChain,
    SetTestMode(bool),
    SetPaused(bool),

    SetRatio(u8),
    SetParadigm(Paradigm),
    SetOmissionInterval(u32),
    SetViInterval(u32),
    SetPrStep(u8),
    SetTraceInterval(u32),

    SetPavParam(PavParam, u32),
    SetPavPulse { on_ms: u16, off_ms: u16 },
    /// Whole Pavlovian block as one JSON object.
    ConfigurePavlovian(PavlovianConfig),

    Arm { device: Peripheral, armed: bool },
    Test(Peripheral),
    SetFrequency { device: Peripheral, hz: u32 },
    SetDuration { device: Peripheral, ms: u32 },
    SetStimMode(StimMode),
    SetLeverTimeout { side: LeverSide, ms: u32 },
    SetLeverRatio { side: LeverSide, ratio: u8 },
    SetLeverReinforced { side: LeverSide, reinforced: bool },
}

// ─────────────────────────────── parsing ─────────────────────────────────

/// Parse one command line.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.starts_with('{') {
        let cfg: PavlovianConfig =
            serde_json::from_str(line).map_err(|_| CommandError::BadPayload)?;
        return Ok(Command::ConfigurePavlovian(cfg));
    }

    let (code_str, value) = match line.split_once(':') {
        Some((c, v)) => (c, Some(v.trim())),
        None => (line, None),
    };
    let code: u16 = code_str.trim().parse().map_err(|_| CommandError::BadValue)?;

    use Peripheral::*;
    use code::*;
    let cmd = match code {
        SESSION_END => Command::SessionEnd,
        SESSION_START => Command::SessionStart,
        IDENTIFY => Command::Identify,
        TEST_CHAIN => Command::TestChain,
        TEST_MODE => Command::SetTestMode(parse_bool(value)?),
        SESSION_PAUSE => Command::SetPaused(parse_bool(value)?),

        SET_RATIO => Command::SetRatio(parse_u8(value)?),
        SET_PARADIGM => Command::SetParadigm(
            Paradigm::from_code(parse_u32(value)?).ok_or(CommandError::BadValue)?,
        ),
        SET_OMISSION_INTERVAL => Command::SetOmissionInterval(parse_u32(value)?),
        SET_VI_INTERVAL => Command::SetViInterval(parse_u32(value)?),
        SET_PR_STEP => Command::SetPrStep(parse_u8(value)?),
        SET_TRACE_INTERVAL => Command::SetTraceInterval(parse_u32(value)?),

        PAV_CS_PLUS_PROB => pav(PavParam::CsPlusProb, value)?,
        PAV_CS_MINUS_PROB => pav(PavParam::CsMinusProb, value)?,
        PAV_CS_PLUS_COUNT => pav(PavParam::CsPlusCount, value)?,
        PAV_CS_MINUS_COUNT => pav(PavParam::CsMinusCount, value)?,
        PAV_CS_PLUS_FREQ => pav(PavParam::CsPlusFreq, value)?,
        PAV_CS_MINUS_FREQ => pav(PavParam::CsMinusFreq, value)?,
        PAV_COUNTERBALANCE => pav(PavParam::Counterbalance, value)?,
        PAV_CUE_DURATION => pav(PavParam::CueDuration, value)?,
        PAV_TRACE_INTERVAL => pav(PavParam::TraceInterval, value)?,
        PAV_CONSUMPTION => pav(PavParam::Consumption, value)?,
        PAV_ITI_MEAN => pav(PavParam::ItiMean, value)?,
        PAV_ITI_MIN => pav(PavParam::ItiMin, value)?,
        PAV_ITI_MAX => pav(PavParam::ItiMax, value)?,
        PAV_PULSE_CONFIG => {
            // Value is an `on,off` millisecond pair.
            let v = value.ok_or(CommandError::MissingValue)?;
            let (on, off) = v.split_once(',').ok_or(CommandError::BadValue)?;
            Command::SetPavPulse {
                on_ms: on.trim().parse().map_err(|_| CommandError::BadValue)?,
                off_ms: off.trim().parse().map_err(|_| CommandError::BadValue)?,
            }
        }

        CUE_DISARM => arm(Cue, false),
        CUE_ARM => arm(Cue, true),
        CUE_TEST => Command::Test(Cue),
        CUE2_DISARM => arm(Cue2, false),
        CUE2_ARM => arm(Cue2, true),
        CUE2_TEST => Command::Test(Cue2),
        CUE_SET_FREQUENCY => freq(Cue, value)?,
        CUE_SET_DURATION => dur(Cue, value)?,
        CUE2_SET_FREQUENCY => freq(Cue2, value)?,
        CUE2_SET_DURATION => dur(Cue2, value)?,

        PUMP_DISARM => arm(Pump, false),
        PUMP_ARM => arm(Pump, true),
        PUMP_TEST => Command::Test(Pump),
        PUMP2_DISARM => arm(Pump2, false),
        PUMP2_ARM => arm(Pump2, true),
        PUMP2_TEST => Command::Test(Pump2),
        PUMP_SET_DURATION => dur(Pump, value)?,
        PUMP2_SET_DURATION => dur(Pump2, value)?,

        LICK_DISARM => arm(Lick, false),
        LICK_ARM => arm(Lick, true),

        STIM_DISARM => arm(Stim, false),
        STIM_ARM => arm(Stim, true),
        STIM_TEST => Command::Test(Stim),
        STIM_SET_FREQUENCY => freq(Stim, value)?,
        STIM_SET_DURATION => dur(Stim, value)?,
        STIM_MODE_CONTINGENT => Command::SetStimMode(StimMode::Contingent),
        STIM_MODE_INDEPENDENT => Command::SetStimMode(StimMode::Independent),

        MICROSCOPE_DISARM => arm(FrameSync, false),
        MICROSCOPE_ARM => arm(FrameSync, true),
        MICROSCOPE_TEST => Command::Test(FrameSync),

        LEVER_RH_DISARM => arm(LeverRh, false),
        LEVER_RH_ARM => arm(LeverRh, true),
        LEVER_RH_SET_TIMEOUT => Command::SetLeverTimeout {
            side: LeverSide::Rh,
            ms: parse_u32(value)?,
        },
        LEVER_RH_SET_RATIO => Command::SetLeverRatio {
            side: LeverSide::Rh,
            ratio: parse_u8(value)?,
        },
        LEVER_RH_SET_INACTIVE => reinforced(LeverSide::Rh, false),
        LEVER_RH_SET_ACTIVE => reinforced(LeverSide::Rh, true),

        LEVER_LH_DISARM => arm(LeverLh, false),
        LEVER_LH_ARM => arm(LeverLh, true),
        LEVER_LH_SET_TIMEOUT => Command::SetLeverTimeout {
            side: LeverSide::Lh,
            ms: parse_u32(value)?,
        },
        LEVER_LH_SET_RATIO => Command::SetLeverRatio {
            side: LeverSide::Lh,
            ratio: parse_u8(value)?,
        },
        LEVER_LH_SET_INACTIVE => reinforced(LeverSide::Lh, false),
        LEVER_LH_SET_ACTIVE => reinforced(LeverSide::Lh, true),

        other => return Err(CommandError::UnknownCode(other)),
    };
    Ok(cmd)
}

fn arm(device: Peripheral, armed: bool) -> Command {
    Command::Arm { device, armed }
}

fn reinforced(side: LeverSide, reinforced: bool) -> Command {
    Command::SetLeverReinforced { side, reinforced }
}

fn pav(param: PavParam, value: Option<&str>) -> Result<Command, CommandError> {
    Ok(Command::SetPavParam(param, parse_u32(value)?))
}

fn freq(device: Peripheral, value: Option<&str>) -> Result<Command, CommandError> {
    Ok(Command::SetFrequency {
        device,
        hz: parse_u32(value)?,
    })
}

fn dur(device: Peripheral, value: Option<&str>) -> Result<Command, CommandError> {
    Ok(Command::SetDuration {
        device,
        ms: parse_u32(value)?,
    })
}

fn parse_u32(value: Option<&str>) -> Result<u32, CommandError> {
    value
        .ok_or(CommandError::MissingValue)?
        .parse()
        .map_err(|_| CommandError::BadValue)
}

fn parse_u8(value: Option<&str>) -> Result<u8, CommandError> {
    value
        .ok_or(CommandError::MissingValue)?
        .parse()
        .map_err(|_| CommandError::BadValue)
}

fn parse_bool(value: Option<&str>) -> Result<bool, CommandError> {
    match value.ok_or(CommandError::MissingValue)? {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(CommandError::BadValue),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_codes_parse() {
        assert_eq!(parse("101").unwrap(), Command::SessionStart);
        assert_eq!(parse("100").unwrap(), Command::SessionEnd);
        assert_eq!(parse("103").unwrap(), Command::TestChain);
        assert_eq!(parse("903").unwrap(), Command::Test(Peripheral::FrameSync));
    }

    #[test]
    fn valued_codes_parse() {
        assert_eq!(parse("201:5").unwrap(), Command::SetRatio(5));
        assert_eq!(parse("105:1").unwrap(), Command::SetPaused(true));
        assert_eq!(
            parse("1374:20000").unwrap(),
            Command::SetLeverTimeout {
                side: LeverSide::Lh,
                ms: 20_000
            }
        );
        assert_eq!(
            parse("371:8000").unwrap(),
            Command::SetFrequency {
                device: Peripheral::Cue,
                hz: 8000
            }
        );
        assert_eq!(
            parse("202:2").unwrap(),
            Command::SetParadigm(crate::config::Paradigm::Omission)
        );
    }

    #[test]
    fn pav_pulse_pair() {
        assert_eq!(
            parse("219:200,150").unwrap(),
            Command::SetPavPulse {
                on_ms: 200,
                off_ms: 150
            }
        );
        assert_eq!(parse("219:200").unwrap_err(), CommandError::BadValue);
    }

    #[test]
    fn json_block_configures_pavlovian() {
        let cmd = parse(r#"{"cs_plus_count":10,"counterbalance":true}"#).unwrap();
        match cmd {
            Command::ConfigurePavlovian(cfg) => {
                assert_eq!(cfg.cs_plus_count, 10);
                assert!(cfg.counterbalance);
                assert_eq!(cfg.cs_minus_count, 50);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn errors_are_specific() {
        assert_eq!(parse("999").unwrap_err(), CommandError::UnknownCode(999));
        assert_eq!(parse("201").unwrap_err(), CommandError::MissingValue);
        assert_eq!(parse("201:many").unwrap_err(), CommandError::BadValue);
        assert_eq!(parse("abc").unwrap_err(), CommandError::BadValue);
        assert_eq!(parse("{not json").unwrap_err(), CommandError::BadPayload);
        assert_eq!(parse("202:9").unwrap_err(), CommandError::BadValue);
    }

    #[test]
    fn whitespace_tolerated() {
        assert_eq!(parse("  101 \n").unwrap(), Command::SessionStart);
        assert_eq!(parse("201: 5").unwrap(), Command::SetRatio(5));
    }
}
