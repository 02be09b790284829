//! Conditioning-chamber controller firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module, so the contingency
//! engine, trial machine, and device drivers all run on the host.

#![deny(unused_must_use)]

pub mod commands;
pub mod config;
pub mod devices;
pub mod error;
pub mod pavlovian;
pub mod pins;
pub mod report;
pub mod scheduler;
pub mod session;
