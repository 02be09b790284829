//! Counterbalanced CS+/CS− trial sequencing.
//!
//! The order for a whole session is generated up front as a bit table
//! (0 = CS+, 1 = CS−), shuffled, and rejected if either cue type repeats
//! more than three times in a row.  Requested counts above the table
//! capacity are scaled down proportionally.

use rand::Rng;
use rand::rngs::SmallRng;

/// Hard cap on trials per session; the order table is sized for this.
pub const MAX_TRIALS: usize = 128;

const TABLE_BYTES: usize = MAX_TRIALS / 8;

/// Longest acceptable run of a single cue type.
const MAX_RUN: u8 = 3;

/// How many shuffles to attempt before accepting the last one anyway.
const SHUFFLE_ATTEMPTS: u8 = 50;

/// Bit-packed trial order.  Bit set = CS− trial.
#[derive(Debug, Clone)]
pub struct TrialTable {
    bits: [u8; TABLE_BYTES],
    total: u8,
}

impl TrialTable {
    pub fn empty() -> Self {
        Self {
            bits: [0; TABLE_BYTES],
            total: 0,
        }
    }

    /// Build a shuffled order for `cs_plus` CS+ and `cs_minus` CS− trials.
    ///
    /// If the request exceeds [`MAX_TRIALS`], both counts are scaled so the
    /// CS+/CS− proportion survives the truncation.  The run-length check is
    /// best effort: after [`SHUFFLE_ATTEMPTS`] failed shuffles the last
    /// order is used as-is (only pathological proportions get there).
    pub fn generate(cs_plus: u8, cs_minus: u8, rng: &mut SmallRng) -> Self {
        let requested = u16::from(cs_plus) + u16::from(cs_minus);
        let (cs_plus, total) = if requested > MAX_TRIALS as u16 {
            let scaled_plus = (u16::from(cs_plus) * MAX_TRIALS as u16 / requested) as u8;
            (scaled_plus, MAX_TRIALS as u8)
        } else {
            (cs_plus, requested as u8)
        };

        let mut table = Self::empty();
        table.total = total;
        if total == 0 {
            return table;
        }

        for attempt in 0..SHUFFLE_ATTEMPTS {
            // CS+ block then CS− block, then Fisher-Yates over the bits.
            for i in 0..total {
                table.set(i, i >= cs_plus);
            }
            for i in (1..u16::from(total)).rev() {
                let j = rng.gen_range(0..=i) as u8;
                let i = i as u8;
                let (a, b) = (table.is_cs_minus(i), table.is_cs_minus(j));
                table.set(i, b);
                table.set(j, a);
            }
            if table.max_run() <= MAX_RUN {
                break;
            }
            if attempt == SHUFFLE_ATTEMPTS - 1 {
                log::warn!("trial order kept a long run after {SHUFFLE_ATTEMPTS} shuffles");
            }
        }
        table
    }

    pub fn total(&self) -> u8 {
        self.total
    }

    pub fn is_cs_minus(&self, index: u8) -> bool {
        let i = index as usize;
        self.bits[i / 8] & (1 << (i % 8)) != 0
    }

    fn set(&mut self, index: u8, cs_minus: bool) {
        let i = index as usize;
        if cs_minus {
            self.bits[i / 8] |= 1 << (i % 8);
        } else {
            self.bits[i / 8] &= !(1 << (i % 8));
        }
    }

    /// Length of the longest same-type run.
    pub fn max_run(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let mut longest = 1_u8;
        let mut run = 1_u8;
        for i in 1..self.total {
            if self.is_cs_minus(i) == self.is_cs_minus(i - 1) {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 1;
            }
        }
        longest
    }

    #[cfg(test)]
    pub fn count_cs_minus(&self) -> u8 {
        (0..self.total).filter(|&i| self.is_cs_minus(i)).count() as u8
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn counts_are_preserved() {
        let mut rng = SmallRng::seed_from_u64(3);
        let t = TrialTable::generate(50, 50, &mut rng);
        assert_eq!(t.total(), 100);
        assert_eq!(t.count_cs_minus(), 50);
    }

    #[test]
    fn oversized_request_scales_proportionally() {
        let mut rng = SmallRng::seed_from_u64(3);
        // 150 + 50 = 200 trials requested; 3:1 proportion kept over 128.
        let t = TrialTable::generate(150, 50, &mut rng);
        assert_eq!(t.total(), 128);
        // cs_plus scales to 150 * 128 / 200 = 96, leaving 32 CS−.
        assert_eq!(t.count_cs_minus(), 32);
    }

    #[test]
    fn runs_stay_short_for_balanced_sessions() {
        for seed in 0..200 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let t = TrialTable::generate(50, 50, &mut rng);
            assert!(t.max_run() <= 3, "seed {seed}: run {}", t.max_run());
        }
    }

    #[test]
    fn degenerate_single_type_session_still_generates() {
        // All CS+ cannot satisfy the run bound; best effort keeps the order.
        let mut rng = SmallRng::seed_from_u64(9);
        let t = TrialTable::generate(10, 0, &mut rng);
        assert_eq!(t.total(), 10);
        assert_eq!(t.count_cs_minus(), 0);
        assert_eq!(t.max_run(), 10);
    }

    #[test]
    fn empty_request_is_empty() {
        let mut rng = SmallRng::seed_from_u64(1);
        let t = TrialTable::generate(0, 0, &mut rng);
        assert_eq!(t.total(), 0);
        assert_eq!(t.max_run(), 0);
    }
}
