//! Chamber controller firmware — main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Serial host link                         │
//! │     command lines in ──────────── JSON records out           │
//! └───────────────┬──────────────────────────▲───────────────────┘
//!                 ▼                          │
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SessionService                           │
//! │   Scheduler (operant) · PavlovianEngine · command dispatch   │
//! └───────────────┬──────────────────────────▲───────────────────┘
//!                 ▼                          │
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Device bay: levers · lick · cues · pumps · stim · miniscope │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One thread reads command lines from the console UART; the main loop
//! polls inputs and drives the engines at millisecond granularity.

#![deny(unused_must_use)]

use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};

use chamberctl::devices::{
    Cue, Devices, FrameSync, Lever, LeverSide, LickCircuit, Pump, Stim, hw,
};
use chamberctl::pins;
use chamberctl::report::SerialSink;
use chamberctl::session::SessionService;

fn assemble_rig() -> Devices {
    let mut devices = Devices::empty();
    // Switch levers idle high (internal pullups).
    let mut rh = Lever::new(pins::LEVER_RH_GPIO, LeverSide::Rh, true);
    rh.reinforced = true;
    devices.lever_rh = Some(rh);
    devices.lever_lh = Some(Lever::new(pins::LEVER_LH_GPIO, LeverSide::Lh, true));
    devices.lick = Some(LickCircuit::new(pins::LICK_GPIO, true));
    devices.cue = Some(Cue::new(pins::CUE_GPIO, 8000, 1600));
    devices.cue2 = Some(Cue::new(pins::CUE2_GPIO, 2000, 1600));
    devices.pump = Some(Pump::new(pins::PUMP_GPIO, 2000));
    devices.pump2 = Some(Pump::new(pins::PUMP2_GPIO, 2000));
    devices.stim = Some(Stim::new(pins::STIM_GPIO, 40, 5000));
    devices.frame_sync = Some(FrameSync::new(
        pins::FRAME_TRIG_GPIO,
        pins::FRAME_SYNC_GPIO,
    ));
    devices
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("chamberctl v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = hw::init_peripherals() {
        // Peripheral init failure is critical — log and halt; the
        // watchdog resets the board after timeout.
        error!("hw init failed: {e} — halting");
        loop {
            thread::sleep(Duration::from_secs(1));
        }
    }
    if let Err(e) = hw::install_frame_isr() {
        warn!("frame-sync ISR unavailable: {e} — continuing without frame capture");
    }

    // ── 2. Rig assembly ───────────────────────────────────────
    let devices = assemble_rig();
    if let Some(cue) = &devices.cue {
        cue.jingle();
    }
    let mut service = SessionService::new(devices, hw::entropy_u64(), SerialSink);

    // ── 3. Serial command reader ──────────────────────────────
    // The console UART is stdin under ESP-IDF; a dedicated thread blocks
    // on it so the control loop never does.
    let (tx, rx) = mpsc::channel::<String>();
    thread::Builder::new()
        .name("serial-rx".into())
        .stack_size(4096)
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) if !l.trim().is_empty() => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        })?;

    info!("ready; entering control loop");

    // ── 4. Control loop ───────────────────────────────────────
    loop {
        let now = hw::now_ms();
        while let Ok(line) = rx.try_recv() {
            // A rejected command already produced a level 006 record.
            let _ = service.handle_line(&line, now);
        }
        service.tick(now);
        thread::sleep(Duration::from_millis(1));
    }
}
