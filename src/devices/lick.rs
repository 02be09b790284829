//! Debounced lick-circuit driver.
//!
//! Same debounce scheme as the lever: contact chatter restarts a 20 ms
//! window, stable flips away from the idle level are lick onsets.  Licks
//! are purely observational; they are logged but never offered to triggers.

use super::hw;

const DEBOUNCE_MS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LickEdge {
    Start(u32),
    /// Carries the stored onset time so the release can be logged as a
    /// complete lick.
    End { start: u32, end: u32 },
}

pub struct LickCircuit {
    pin: i32,
    idle_level: bool,
    stable_level: bool,
    last_raw: bool,
    debounce_start: u32,
    start_timestamp: u32,
    pub armed: bool,
}

impl LickCircuit {
    pub fn new(pin: i32, idle_level: bool) -> Self {
        Self {
            pin,
            idle_level,
            stable_level: idle_level,
            last_raw: idle_level,
            debounce_start: 0,
            start_timestamp: 0,
            armed: false,
        }
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }

    pub fn sample(&mut self, raw: bool, now: u32) -> Option<LickEdge> {
        if raw != self.last_raw {
            self.debounce_start = now;
            self.last_raw = raw;
        }

        if now.wrapping_sub(self.debounce_start) > DEBOUNCE_MS && raw != self.stable_level {
            self.stable_level = raw;
            return if raw != self.idle_level {
                self.start_timestamp = now;
                Some(LickEdge::Start(now))
            } else {
                Some(LickEdge::End {
                    start: self.start_timestamp,
                    end: now,
                })
            };
        }
        None
    }

    /// Hardware wrapper.  Disarmed circuits are not polled.
    pub fn monitor(&mut self, now: u32) -> Option<LickEdge> {
        if !self.armed {
            return None;
        }
        let raw = hw::gpio_read(self.pin);
        self.sample(raw, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lick_end_carries_onset() {
        let mut lc = LickCircuit::new(5, true);
        assert_eq!(lc.sample(false, 100), None);
        assert_eq!(lc.sample(false, 121), Some(LickEdge::Start(121)));
        assert_eq!(lc.sample(true, 180), None);
        assert_eq!(
            lc.sample(true, 201),
            Some(LickEdge::End {
                start: 121,
                end: 201
            })
        );
    }

    #[test]
    fn chatter_is_filtered() {
        let mut lc = LickCircuit::new(5, true);
        lc.sample(false, 0);
        lc.sample(true, 5);
        lc.sample(false, 10);
        assert_eq!(lc.sample(false, 25), None);
        assert_eq!(lc.sample(false, 31), Some(LickEdge::Start(31)));
    }
}
