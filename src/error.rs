//! Unified error types for the chamber controller firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level loop's error handling uniform.  All variants are `Copy` so they
//! can be cheaply passed back to the host link without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A host command could not be parsed or applied.
    Command(CommandError),
    /// Configuration change rejected because a session is running.
    SessionActive,
    /// The command targets a device that is not installed in this chamber.
    DeviceMissing(&'static str),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(e) => write!(f, "command: {e}"),
            Self::SessionActive => write!(f, "rejected: session in progress"),
            Self::DeviceMissing(name) => write!(f, "device not installed: {name}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Host-command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Numeric code is not in the command table.
    UnknownCode(u16),
    /// The code requires a `CODE:VALUE` form but no value was given.
    MissingValue,
    /// The value after the colon did not parse as an unsigned integer.
    BadValue,
    /// A JSON parameter block failed to deserialize.
    BadPayload,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCode(code) => write!(f, "unknown code {code}"),
            Self::MissingValue => write!(f, "missing value"),
            Self::BadValue => write!(f, "bad value"),
            Self::BadPayload => write!(f, "bad JSON payload"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
