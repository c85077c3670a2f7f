use std::time::Duration;

use rand::Rng;

/// Failures after which the delay stops doubling.
const MAX_DOUBLINGS: u32 = 16;

/// Delay before the next scheduled sync after `failures` consecutive
/// failures.
///
/// No failures means the plain interval. Otherwise the interval doubles per
/// failure, is capped at `max`, and is jittered into the upper half of that
/// value so many clients do not retry in lockstep. Never shorter than half
/// the interval.
pub fn next_sync_delay(interval: Duration, failures: u32, max: Duration) -> Duration {
    if failures == 0 {
        return interval;
    }
    let base = interval.as_millis() as u64;
    let cap = (max.as_millis() as u64).max(base);
    let exponential = base.saturating_mul(1u64 << failures.min(MAX_DOUBLINGS));
    let capped = exponential.min(cap);
    let floor = capped / 2;
    Duration::from_millis(rand::thread_rng().gen_range(floor..=capped))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);
    const CAP: Duration = Duration::from_secs(15 * 60);

    #[test]
    fn healthy_engine_uses_the_interval() {
        assert_eq!(next_sync_delay(MINUTE, 0, CAP), MINUTE);
    }

    #[test]
    fn delay_grows_and_stays_within_jitter_band() {
        for failures in 1..=3u32 {
            let expected = MINUTE * 2u32.pow(failures);
            for _ in 0..50 {
                let delay = next_sync_delay(MINUTE, failures, CAP);
                assert!(delay <= expected, "{delay:?} > {expected:?}");
                assert!(delay >= expected / 2, "{delay:?} < {:?}", expected / 2);
            }
        }
    }

    #[test]
    fn delay_is_capped() {
        for failures in [5, 20, u32::MAX] {
            let delay = next_sync_delay(MINUTE, failures, CAP);
            assert!(delay <= CAP);
            assert!(delay >= CAP / 2);
        }
    }

    #[test]
    fn cap_below_interval_falls_back_to_interval() {
        let delay = next_sync_delay(MINUTE, 3, Duration::from_secs(1));
        assert!(delay <= MINUTE && delay >= MINUTE / 2);
    }
}
