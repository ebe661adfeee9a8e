use std::time::Duration;

use rand::Rng;

/// Bounded, jittered delay schedule between attempts.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

/// Schedule used by the supervisor's reconnect loop.
pub const RECONNECT: BackoffPolicy = BackoffPolicy {
    base: Duration::from_secs(1),
    max_delay: Duration::from_secs(10),
    max_jitter: Duration::from_millis(500),
};

/// Schedule used by the request executors between retry attempts.
pub const REQUEST: BackoffPolicy = BackoffPolicy {
    base: Duration::from_secs(1),
    max_delay: Duration::from_secs(15),
    max_jitter: Duration::from_millis(500),
};

/// Linear schedule: `min(base * attempt, max_delay)` plus uniform jitter in
/// `0..=max_jitter`. Attempt numbering starts at 1; zero is clamped up.
#[must_use]
pub fn delay(attempt: u32, policy: &BackoffPolicy) -> Duration {
    let attempt = attempt.max(1);
    let scaled = policy.base.saturating_mul(attempt);
    let capped = scaled.min(policy.max_delay);
    capped + jitter(policy.max_jitter)
}

fn jitter(max_jitter: Duration) -> Duration {
    let ceiling = u64::try_from(max_jitter.as_millis()).unwrap_or(u64::MAX);
    if ceiling == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ceiling))
}
