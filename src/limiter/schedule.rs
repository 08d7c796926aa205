//! Reset window arithmetic and the background rollover task.

use super::SpendLimiter;
use crate::request::RequestDetails;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Start of the UTC day containing `now`.
pub fn midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Earliest instant strictly after `now` reachable from `current` by whole
/// multiples of `interval`. `current` is returned unchanged if it is
/// already in the future, so repeated calls never advance twice.
pub fn next_reset(current: DateTime<Utc>, now: DateTime<Utc>, interval: TimeDelta) -> DateTime<Utc> {
    if current > now {
        return current;
    }
    let interval_ms = interval.num_milliseconds().max(1);
    let elapsed_ms = (now - current).num_milliseconds();
    let steps = elapsed_ms / interval_ms + 1;
    current + TimeDelta::milliseconds(steps * interval_ms)
}

/// First reset of a limiter started at `now`: anchored at midnight UTC.
pub fn initial_reset(now: DateTime<Utc>, interval: TimeDelta) -> DateTime<Utc> {
    next_reset(midnight_utc(now), now, interval)
}

/// Rolls the budget over at each reset instant, even when no traffic arrives
/// to trigger the rollover from the admission path.
pub struct ResetScheduler {
    limiter: Arc<SpendLimiter>,
}

impl ResetScheduler {
    pub fn new(limiter: Arc<SpendLimiter>) -> Self {
        Self { limiter }
    }

    /// Start the background task.
    /// Returns a JoinHandle that resolves when the loop stops.
    pub fn start(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let request = RequestDetails::internal("reset-scheduler");
            tracing::info!(
                reset_at = %self.limiter.reset_at(),
                "Budget reset scheduler started"
            );

            loop {
                let wait = self.time_until_reset();
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::info!("Budget reset scheduler shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {
                        if let Err(e) = self.limiter.roll_over_if_due(&request).await {
                            tracing::warn!(error = %e, "Scheduled budget reset failed, retrying");
                        }
                    }
                }
            }
        })
    }

    /// Sleep until the next reset, at least one second so a failing reset
    /// does not spin.
    fn time_until_reset(&self) -> Duration {
        let remaining = self.limiter.reset_at() - self.limiter.now();
        remaining
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn midnight_truncates_to_day_start() {
        assert_eq!(midnight_utc(at(17, 45, 3)), at(0, 0, 0));
    }

    #[test]
    fn initial_reset_is_next_midnight_for_daily_window() {
        let next = initial_reset(at(9, 0, 0), TimeDelta::days(1));
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn future_reset_is_left_alone() {
        let current = at(12, 0, 0);
        assert_eq!(next_reset(current, at(11, 0, 0), TimeDelta::hours(1)), current);
    }

    #[test]
    fn long_pause_advances_in_one_step() {
        // Three and a half hours late on an hourly window: one catch-up.
        let next = next_reset(at(8, 0, 0), at(11, 30, 0), TimeDelta::hours(1));
        assert_eq!(next, at(12, 0, 0));
    }

    #[test]
    fn exact_boundary_moves_to_next_interval() {
        let next = next_reset(at(8, 0, 0), at(10, 0, 0), TimeDelta::hours(1));
        assert_eq!(next, at(11, 0, 0));
    }

    #[test]
    fn reset_is_idempotent() {
        let now = at(11, 30, 0);
        let once = next_reset(at(8, 0, 0), now, TimeDelta::hours(1));
        let twice = next_reset(once, now, TimeDelta::hours(1));
        assert_eq!(once, twice);
    }

    proptest! {
        #[test]
        fn prop_next_reset_is_future_and_on_grid(
            elapsed_ms in 0i64..10_000_000_000,
            interval_ms in 1i64..100_000_000,
        ) {
            let anchor = at(0, 0, 0);
            let now = anchor + TimeDelta::milliseconds(elapsed_ms);
            let interval = TimeDelta::milliseconds(interval_ms);

            let next = next_reset(anchor, now, interval);

            prop_assert!(next > now);
            prop_assert!(next - interval <= now);
            prop_assert_eq!((next - anchor).num_milliseconds() % interval_ms, 0);
        }
    }
}
