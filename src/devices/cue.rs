//! Conditioned-stimulus tone driver.
//!
//! A cue is activated with an absolute window `[start, end]` (bounds
//! inclusive) and driven level-by-level from the tick loop.  Continuous
//! mode holds the tone for the whole window; pulsed mode chops it with an
//! on/off duty cycle.

use super::hw;

pub struct Cue {
    pin: i32,
    frequency: u32,
    duration: u32,
    start_timestamp: u32,
    end_timestamp: u32,
    /// True while the window is live.  Ensures the tone stop happens once,
    /// on the falling edge, instead of every idle tick.
    playing: bool,
    pulsed: bool,
    pulse_is_on: bool,
    pulse_on_ms: u16,
    pulse_off_ms: u16,
    is_testing: bool,
    pub armed: bool,
}

impl Cue {
    pub fn new(pin: i32, frequency: u32, duration: u32) -> Self {
        Self {
            pin,
            frequency,
            duration,
            start_timestamp: 0,
            end_timestamp: 0,
            playing: false,
            pulsed: false,
            pulse_is_on: false,
            pulse_on_ms: 200,
            pulse_off_ms: 200,
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

    pub fn set_frequency(&mut self, frequency: u32) {
        self.frequency = frequency;
    }

    pub fn set_duration(&mut self, duration: u32) {
        self.duration = duration;
    }

    pub fn set_pulsed(&mut self, pulsed: bool, on_ms: u16, off_ms: u16) {
        self.pulsed = pulsed;
        self.pulse_on_ms = on_ms;
        self.pulse_off_ms = off_ms;
    }

    pub fn is_pulsed(&self) -> bool {
        self.pulsed
    }

    /// Open a tone window starting at `start_ts` for `dur` ms.
    pub fn activate(&mut self, start_ts: u32, dur: u32) {
        self.start_timestamp = start_ts;
        self.end_timestamp = start_ts + dur;
    }

    /// Play the configured tone once, ignoring the armed state.
    pub fn test(&mut self, now: u32) {
        self.start_timestamp = now;
        self.end_timestamp = now + self.duration;
        self.is_testing = true;
    }

    /// Drive the output for the current tick.
    pub fn service(&mut self, now: u32) {
        if !(self.armed || self.is_testing) {
            return;
        }

        if now >= self.start_timestamp && now <= self.end_timestamp {
            if self.pulsed {
                let cycle = u32::from(self.pulse_on_ms) + u32::from(self.pulse_off_ms);
                let cycle = cycle.max(1);
                let elapsed = now.wrapping_sub(self.start_timestamp);
                let should_be_on = elapsed % cycle < u32::from(self.pulse_on_ms);
                // Edge-only transitions: the tone generator is shared, so
                // redundant start/stop calls are avoided.
                if should_be_on && !self.pulse_is_on {
                    hw::tone_start(self.pin, self.frequency);
                    self.pulse_is_on = true;
                } else if !should_be_on && self.pulse_is_on {
                    hw::tone_stop(self.pin);
                    self.pulse_is_on = false;
                }
            } else {
                hw::tone_start(self.pin, self.frequency);
            }
            self.playing = true;
        } else if self.playing {
            hw::tone_stop(self.pin);
            self.playing = false;
            self.pulse_is_on = false;
            self.is_testing = false;
        }
    }

    /// Cut the tone immediately and close the window.
    pub fn silence(&mut self) {
        hw::tone_stop(self.pin);
        self.playing = false;
        self.pulse_is_on = false;
        self.end_timestamp = 0;
    }

    /// Three-note power-on chirp so the operator can hear the board boot.
    pub fn jingle(&self) {
        let mut pitch = 500;
        for _ in 0..3 {
            hw::tone_start(self.pin, pitch);
            std::thread::sleep(std::time::Duration::from_millis(100));
            hw::tone_stop(self.pin);
            pitch += 500;
        }
    }

    #[cfg(test)]
    fn window(&self) -> (u32, u32) {
        (self.start_timestamp, self.end_timestamp)
    }

    #[cfg(test)]
    fn playing(&self) -> bool {
        self.playing
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds_inclusive() {
        let mut cue = Cue::new(3, 8000, 2000);
        cue.armed = true;
        cue.activate(1000, 2000);

        cue.service(999);
        assert!(!cue.playing());
        cue.service(1000);
        assert!(cue.playing());
        cue.service(3000);
        assert!(cue.playing());
        cue.service(3001);
        assert!(!cue.playing());
    }

    #[test]
    fn disarmed_cue_stays_silent() {
        let mut cue = Cue::new(3, 8000, 2000);
        cue.activate(0, 2000);
        cue.service(100);
        assert!(!cue.playing());
    }

    #[test]
    fn test_fires_while_disarmed() {
        let mut cue = Cue::new(3, 8000, 500);
        cue.test(100);
        cue.service(100);
        assert!(cue.playing());
        cue.service(601);
        assert!(!cue.playing());
        // Testing flag cleared at window close; stays quiet after.
        cue.service(700);
        assert!(!cue.playing());
    }

    #[test]
    fn silence_closes_window() {
        let mut cue = Cue::new(3, 8000, 2000);
        cue.armed = true;
        cue.activate(0, 10_000);
        cue.service(50);
        assert!(cue.playing());
        cue.silence();
        assert!(!cue.playing());
        assert_eq!(cue.window().1, 0);
    }

    #[test]
    fn pulsed_mode_duty_cycle() {
        let mut cue = Cue::new(3, 8000, 2000);
        cue.armed = true;
        cue.set_pulsed(true, 200, 200);
        cue.activate(0, 2000);

        cue.service(0);
        assert!(cue.pulse_is_on);
        cue.service(199);
        assert!(cue.pulse_is_on);
        cue.service(200);
        assert!(!cue.pulse_is_on);
        cue.service(400);
        assert!(cue.pulse_is_on);
    }
}
