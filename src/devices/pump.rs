//! Relay-driven syringe pump.
//!
//! Activation opens an absolute window `[start, end]` (bounds inclusive);
//! the tick loop holds the relay closed while inside it.  A running
//! infusion finishes even when the session pauses, so pause handling never
//! touches the pump.

use super::hw;

pub struct Pump {
    pin: i32,
    duration: u32,
    start_timestamp: u32,
    end_timestamp: u32,
    is_testing: bool,
    pub armed: bool,
}

impl Pump {
    pub fn new(pin: i32, duration: u32) -> Self {
        Self {
            pin,
            duration,
            start_timestamp: 0,
            end_timestamp: 0,
            is_testing: false,
            armed: false,
        }
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: u32) {
        self.duration = duration;
    }

    /// Open an infusion window starting at `start_ts` for `dur` ms.
    pub fn activate(&mut self, start_ts: u32, dur: u32) {
        self.start_timestamp = start_ts;
        self.end_timestamp = start_ts + dur;
    }

    /// Run one infusion of the default duration, ignoring the armed state.
    pub fn test(&mut self, now: u32) {
        self.start_timestamp = now;
        self.end_timestamp = now + self.duration;
        self.is_testing = true;
    }

    /// Drive the relay for the current tick.
    pub fn service(&mut self, now: u32) {
        if !(self.armed || self.is_testing) {
            return;
        }
        if now >= self.start_timestamp && now <= self.end_timestamp {
            hw::gpio_write(self.pin, true);
        } else {
            hw::gpio_write(self.pin, false);
            self.is_testing = false;
        }
    }

    /// Force the relay open and close the window.
    pub fn force_off(&mut self) {
        hw::gpio_write(self.pin, false);
        self.end_timestamp = 0;
        self.is_testing = false;
    }

    /// True while the infusion window is open.
    pub fn infusing(&self, now: u32) -> bool {
        now >= self.start_timestamp && now <= self.end_timestamp && self.end_timestamp > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infusion_window_inclusive() {
        let mut p = Pump::new(4, 2000);
        p.armed = true;
        p.activate(1000, 2000);
        assert!(!p.infusing(999));
        assert!(p.infusing(1000));
        assert!(p.infusing(3000));
        assert!(!p.infusing(3001));
    }

    #[test]
    fn test_uses_default_duration() {
        let mut p = Pump::new(4, 1500);
        p.test(100);
        assert!(p.infusing(100));
        assert!(p.infusing(1600));
        assert!(!p.infusing(1601));
    }

    #[test]
    fn force_off_closes_window() {
        let mut p = Pump::new(4, 2000);
        p.armed = true;
        p.activate(0, 5000);
        assert!(p.infusing(100));
        p.force_off();
        assert!(!p.infusing(100));
    }
}
