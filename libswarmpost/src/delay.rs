//! Pacing between publish attempts
//!
//! Two independent mechanisms: [`next_delay`] paces successful posts from
//! the global range or a per-unit override, with symmetric jitter; and
//! [`RetryBackoff`] spaces out repeated transient failures with a short,
//! exponentially scaled recovery delay.

use rand::Rng;

use crate::config::RunnerConfig;
use crate::types::{ContentUnit, DelayConfig};

/// Compute the wait in minutes before the next publish attempt.
///
/// A per-unit override (both bounds present) wins over the global range
/// when `use_individual_delays` is set; either way a jitter term drawn
/// from `[-jitter, +jitter]` is applied and the result is clamped to at
/// least one minute.
pub fn next_delay(unit: &ContentUnit, config: &DelayConfig) -> u64 {
    let mut rng = rand::thread_rng();

    let (lo, hi) = match (config.use_individual_delays, unit.delay_min, unit.delay_max) {
        (true, Some(min), Some(max)) if min <= max => (min, max),
        _ => (config.min_minutes, config.max_minutes),
    };

    let base = rng.gen_range(lo.min(hi)..=hi.max(lo)) as i64;
    let jitter = config.jitter_minutes as i64;
    let offset = rng.gen_range(-jitter..=jitter);

    (base + offset).max(1) as u64
}

/// Per-account counter of consecutive transient failures
///
/// The recovery delay starts in the configured fixed range and doubles
/// with every consecutive failure, capped at 8x, so a flapping proxy does
/// not hammer the platform at the base cadence.
#[derive(Debug, Default)]
pub struct RetryBackoff {
    attempts: u32,
}

impl RetryBackoff {
    const MAX_MULTIPLIER: u32 = 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record one more transient failure.
    pub fn record_failure(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Clear the counter after a successful publish.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Recovery delay in minutes for the current failure streak.
    pub fn recovery_delay(&self, runner: &RunnerConfig) -> u64 {
        let mut rng = rand::thread_rng();
        let lo = runner.recovery_min_minutes.min(runner.recovery_max_minutes);
        let hi = runner.recovery_max_minutes.max(runner.recovery_min_minutes);
        let base = rng.gen_range(lo..=hi) as u64;

        let multiplier = match self.attempts {
            0 | 1 => 1,
            n => 2u32
                .saturating_pow(n - 1)
                .min(Self::MAX_MULTIPLIER),
        };

        base * multiplier as u64
    }
}
