//! Optogenetic stimulator driver.
//!
//! Two delivery modes: contingent (stim windows opened only by chain
//! actions) and independent (free-running duty cycle of `duration` ms on,
//! `duration` ms off).  Inside an active window the TTL line oscillates as
//! a square wave at `frequency` Hz; a frequency of 1 means continuous.

use super::hw;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StimMode {
    /// Windows opened only by chain execution.
    Contingent,
    /// Free-running on/off macro cycle, no chain involvement.
    Independent,
}

pub struct Stim {
    pin: i32,
    frequency: u32,
    duration: u32,
    start_timestamp: u32,
    end_timestamp: u32,
    half_cycle_end: u32,
    mode: StimMode,
    /// True while a stim window is live (the macro on-phase in
    /// independent mode).
    state: bool,
    half_state: bool,
    is_testing: bool,
    pub armed: bool,
}

impl Stim {
    pub fn new(pin: i32, frequency: u32, duration: u32) -> Self {
        Self {
            pin,
            frequency: frequency.max(1),
            duration,
            start_timestamp: 0,
            end_timestamp: 0,
            half_cycle_end: 0,
            mode: StimMode::Contingent,
            state: false,
            half_state: false,
            is_testing: false,
            armed: false,
        }
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn mode(&self) -> StimMode {
        self.mode
    }

    pub fn is_contingent(&self) -> bool {
        self.mode == StimMode::Contingent
    }

    pub fn set_frequency(&mut self, frequency: u32) {
        if frequency > 0 {
            self.frequency = frequency;
        }
    }

    pub fn set_duration(&mut self, duration: u32) {
        self.duration = duration;
    }

    pub fn set_mode(&mut self, mode: StimMode) {
        self.mode = mode;
    }

    /// Open a stim window.  Ignored in independent mode, where delivery is
    /// decoupled from the contingency engine.
    pub fn activate(&mut self, start_ts: u32, dur: u32) {
        if self.mode == StimMode::Contingent {
            self.start_timestamp = start_ts;
            self.end_timestamp = start_ts + dur;
            self.state = true;
            self.update_half_cycle(start_ts);
        }
    }

    /// Run one stim window of the default duration, ignoring the armed
    /// state and mode.
    pub fn test(&mut self, now: u32) {
        self.start_timestamp = now;
        self.end_timestamp = now + self.duration;
        self.state = true;
        self.update_half_cycle(now);
        self.is_testing = true;
    }

    /// Drive the TTL line for the current tick.
    pub fn service(&mut self, now: u32) {
        if self.armed || self.is_testing {
            if self.mode == StimMode::Independent && !self.is_testing {
                self.cycle(now);
            }
            self.oscillate(now);
        } else {
            self.start_timestamp = now;
            self.end_timestamp = now;
            self.off();
        }
    }

    /// Force the line low and close the window.
    pub fn force_off(&mut self) {
        self.off();
        self.state = false;
        self.end_timestamp = 0;
        self.is_testing = false;
    }

    /// Independent-mode macro cycle: flip between on and off phases every
    /// `duration` ms.
    fn cycle(&mut self, now: u32) {
        if now >= self.end_timestamp {
            self.start_timestamp = now;
            self.end_timestamp = now + self.duration;
            self.state = !self.state;
        }
    }

    fn oscillate(&mut self, now: u32) {
        if now >= self.start_timestamp && now <= self.end_timestamp && self.state {
            if self.frequency == 1 {
                self.on();
            } else {
                if now >= self.half_cycle_end {
                    self.update_half_cycle(now);
                }
                if self.half_state {
                    self.on();
                } else {
                    self.off();
                }
            }
        } else {
            self.off();
            if self.state && now > self.end_timestamp {
                self.state = false;
            }
            if self.is_testing && now > self.end_timestamp {
                self.is_testing = false;
            }
        }
    }

    fn update_half_cycle(&mut self, now: u32) {
        let half_ms = ((1.0 / self.frequency as f32) / 2.0 * 1000.0) as u32;
        self.half_cycle_end = now + half_ms;
        self.half_state = !self.half_state;
    }

    fn on(&mut self) {
        hw::gpio_write(self.pin, true);
    }

    fn off(&mut self) {
        hw::gpio_write(self.pin, false);
        self.half_state = false;
    }

    #[cfg(test)]
    fn active(&self) -> bool {
        self.state
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
