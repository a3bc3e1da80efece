//! Progress event throttling
//!
//! Policies in precedence order:
//! 1. interval: at most one event per `interval_ms`
//! 2. unbounded: every chunk, when neither interval nor divider is set
//! 3. divider: only when the rounded percentage lands on a multiple of
//!    `divider`, plus a final event once `transferred == total`
//!
//! An unknown or zero total cannot be bucketed, so it falls back to the
//! unbounded policy.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressPolicy {
    /// 0 disables the interval policy
    pub interval_ms: u64,
    /// Percentage bucket size; 0 emits on every chunk
    pub divider: u32,
}

impl ProgressPolicy {
    pub fn interval(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            divider: 0,
        }
    }

    pub fn divider(divider: u32) -> Self {
        Self {
            interval_ms: 0,
            divider,
        }
    }
}

/// Per-transfer throttling state
#[derive(Debug, Clone)]
pub struct ProgressThrottler {
    policy: ProgressPolicy,
    last_emit: Option<Instant>,
    last_percent: u64,
}

impl ProgressThrottler {
    pub fn new(policy: ProgressPolicy) -> Self {
        Self {
            policy,
            last_emit: None,
            last_percent: 0,
        }
    }

    pub fn should_emit(&mut self, total: Option<u64>, transferred: u64) -> bool {
        self.should_emit_at(total, transferred, Instant::now())
    }

    /// Decide whether to emit, using `now` as the wall clock
    pub fn should_emit_at(&mut self, total: Option<u64>, transferred: u64, now: Instant) -> bool {
        if self.policy.interval_ms > 0 {
            let interval = Duration::from_millis(self.policy.interval_ms);
            let due = self
                .last_emit
                .is_none_or(|last| now.saturating_duration_since(last) > interval);
            if due {
                self.last_emit = Some(now);
            }
            return due;
        }

        let divider = u64::from(self.policy.divider);
        let total = match total {
            Some(total) if total > 0 && divider > 0 => total,
            _ => return true,
        };

        let percent = rounded_percent(transferred, total);
        let on_bucket = percent % divider == 0 && percent != self.last_percent;
        if on_bucket || transferred == total {
            self.last_percent = percent;
            return true;
        }
        false
    }
}

/// `round(transferred * 100 / total)` in integer arithmetic
fn rounded_percent(transferred: u64, total: u64) -> u64 {
    let scaled = u128::from(transferred) * 200 + u128::from(total);
    let percent = scaled / (2 * u128::from(total));
    u64::try_from(percent).unwrap_or(u64::MAX)
}
