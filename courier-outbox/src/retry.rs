//! Bounded retry with exponential backoff and full jitter.

use std::time::Duration;

use rand::Rng;

/// How many times a transiently failing operation is attempted in total.
pub(crate) const MAX_ATTEMPTS: u32 = 8;

const BASE_DELAY_MS: u64 = 30;
const MAX_DELAY_MS: u64 = 1_000;

/// Sleep duration before retry number `attempt` (0-indexed).
///
/// Uniformly random in `[0, min(base * 2^attempt, cap)]`, so contending
/// workers that hit the same deadlock do not retry in lockstep.
pub(crate) fn backoff_duration(attempt: u32) -> Duration {
    let ceiling = if attempt >= 63 {
        MAX_DELAY_MS
    } else {
        BASE_DELAY_MS
            .saturating_mul(1u64 << attempt)
            .min(MAX_DELAY_MS)
    };

    let jittered = rand::rng().random_range(0..=ceiling);
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_ceiling() {
        for attempt in 0..MAX_ATTEMPTS {
            let ceiling = (BASE_DELAY_MS << attempt).min(MAX_DELAY_MS);
            for _ in 0..50 {
                let delay = backoff_duration(attempt);
                assert!(
                    delay <= Duration::from_millis(ceiling),
                    "attempt {attempt}: {delay:?} exceeds {ceiling}ms"
                );
            }
        }
    }

    #[test]
    fn backoff_is_capped_for_large_attempts() {
        for attempt in [10, 63, 64, u32::MAX] {
            assert!(backoff_duration(attempt) <= Duration::from_millis(MAX_DELAY_MS));
        }
    }

    #[test]
    fn early_attempts_have_small_ceilings() {
        // attempt 0 draws from [0, 30ms]
        for _ in 0..50 {
            assert!(backoff_duration(0) <= Duration::from_millis(BASE_DELAY_MS));
        }
    }
}
