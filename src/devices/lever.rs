//! Debounced lever switch driver.
//!
//! The switch idle level is captured at construction; a stable flip away
//! from it is a press, a flip back is a release.  Raw chatter restarts the
//! 20 ms debounce window.  The driver is a pure state machine over sampled
//! levels, so the same code runs against hardware and in host tests.

use super::{LeverSide, hw};

const DEBOUNCE_MS: u32 = 20;

/// Edge produced by one sample, stamped with the sample time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeverEdge {
    Press(u32),
    Release(u32),
}

pub struct Lever {
    pin: i32,
    side: LeverSide,
    /// Idle electrical level; the opposite level means pressed.
    idle_level: bool,
    stable_level: bool,
    last_raw: bool,
    debounce_start: u32,
    pub armed: bool,
    /// Presses on a reinforced lever count toward triggers.
    pub reinforced: bool,
    /// End of the current timeout window (0 = none).  The boundary is
    /// inclusive: a press at exactly `timeout_end` is still a timeout.
    pub timeout_end: u32,
    start_timestamp: u32,
    end_timestamp: u32,
}

impl Lever {
    pub fn new(pin: i32, side: LeverSide, idle_level: bool) -> Self {
        Self {
            pin,
            side,
            idle_level,
            stable_level: idle_level,
            last_raw: idle_level,
            debounce_start: 0,
            armed: false,
            reinforced: false,
            timeout_end: 0,
            start_timestamp: 0,
            end_timestamp: 0,
        }
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }

    pub fn side(&self) -> LeverSide {
        self.side
    }

    pub fn orientation(&self) -> &'static str {
        match self.side {
            LeverSide::Rh => "RH",
            LeverSide::Lh => "LH",
        }
    }

    /// Timestamp of the most recent press-down.
    pub fn start_timestamp(&self) -> u32 {
        self.start_timestamp
    }

    /// Timestamp of the most recent release.
    pub fn end_timestamp(&self) -> u32 {
        self.end_timestamp
    }

    pub fn in_timeout(&self, timestamp: u32) -> bool {
        timestamp <= self.timeout_end
    }

    /// Feed one raw sample.  Returns a debounced edge, if one completed.
    pub fn sample(&mut self, raw: bool, now: u32) -> Option<LeverEdge> {
        if raw != self.last_raw {
            self.debounce_start = now;
            self.last_raw = raw;
        }

        if now.wrapping_sub(self.debounce_start) > DEBOUNCE_MS && raw != self.stable_level {
            self.stable_level = raw;
            return if raw != self.idle_level {
                self.start_timestamp = now;
                Some(LeverEdge::Press(now))
            } else {
                self.end_timestamp = now;
                Some(LeverEdge::Release(now))
            };
        }
        None
    }

    /// Hardware wrapper: sample the GPIO level.  Disarmed levers are not
    /// polled.
    pub fn monitor(&mut self, now: u32) -> Option<LeverEdge> {
        if !self.armed {
            return None;
        }
        let raw = hw::gpio_read(self.pin);
        self.sample(raw, now)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn lever() -> Lever {
        Lever::new(10, LeverSide::Rh, true)
    }

    #[test]
    fn clean_press_and_release() {
        let mut l = lever();
        // Held low (pressed) long enough to debounce.
        assert_eq!(l.sample(false, 100), None);
        assert_eq!(l.sample(false, 120), None);
        assert_eq!(l.sample(false, 121), Some(LeverEdge::Press(121)));
        assert_eq!(l.start_timestamp(), 121);

        // Back to idle.
        assert_eq!(l.sample(true, 500), None);
        assert_eq!(l.sample(true, 521), Some(LeverEdge::Release(521)));
        assert_eq!(l.end_timestamp(), 521);
    }

    #[test]
    fn chatter_restarts_debounce() {
        let mut l = lever();
        assert_eq!(l.sample(false, 100), None);
        // Bounce back up at 110 restarts the window.
        assert_eq!(l.sample(true, 110), None);
        assert_eq!(l.sample(false, 115), None);
        assert_eq!(l.sample(false, 130), None);
        assert_eq!(l.sample(false, 136), Some(LeverEdge::Press(136)));
    }

    #[test]
    fn no_repeat_edges_while_held() {
        let mut l = lever();
        l.sample(false, 0);
        assert_eq!(l.sample(false, 21), Some(LeverEdge::Press(21)));
        assert_eq!(l.sample(false, 100), None);
        assert_eq!(l.sample(false, 1000), None);
    }

    #[test]
    fn timeout_boundary_is_inclusive() {
        let mut l = lever();
        l.timeout_end = 5000;
        assert!(l.in_timeout(5000));
        assert!(!l.in_timeout(5001));
        l.timeout_end = 0;
        assert!(!l.in_timeout(1));
    }
}
