use crate::stream::{seeded_stream, JITTER_SALT};
use chrono::{DateTime, Duration, Utc};
use dripfeed_core::RunConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    pub interval: Duration,
    pub jitter_seconds: u64,
    pub seed: u64,
    pub start_at: Option<DateTime<Utc>>,
}

impl PacingConfig {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            interval: config.pacing_interval(),
            jitter_seconds: config.jitter_seconds,
            seed: config.seed,
            start_at: config.start_at,
        }
    }
}

/// Earliest time the dispatch after `last_dispatch` may happen. The first
/// dispatch of a run (`None`) is not gated and yields `None`.
pub fn next_slot(
    config: &RunConfig,
    last_dispatch: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    last_dispatch.map(|last| saturating_add(last, config.pacing_interval()))
}

/// Single global pacing clock for a run.
///
/// Subreddits are not tracked here; per-subreddit limits are an eligibility
/// concern.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: PacingConfig,
    next_allowed: Option<DateTime<Utc>>,
    last_dispatch: Option<DateTime<Utc>>,
    dispatches: u64,
}

impl Scheduler {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            next_allowed: config.start_at,
            config,
            last_dispatch: None,
            dispatches: 0,
        }
    }

    pub fn for_run(config: &RunConfig) -> Self {
        Self::new(PacingConfig::from_run_config(config))
    }

    /// Reserves the slot at `now` if it is open, pushing the next allowed
    /// dispatch one interval (plus jitter) past `now`.
    pub fn try_advance(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_open(now) {
            return false;
        }

        let gap = self
            .config
            .interval
            .checked_add(&self.jitter_for(self.dispatches))
            .unwrap_or(Duration::MAX);
        self.next_allowed = Some(saturating_add(now, gap));
        self.last_dispatch = Some(now);
        self.dispatches += 1;

        tracing::debug!(
            dispatch = self.dispatches,
            next_allowed = ?self.next_allowed,
            "Pacing slot reserved"
        );
        true
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.next_allowed.map_or(true, |next| now >= next)
    }

    /// Time left until the slot opens; zero when it is already open.
    pub fn wait_time(&self, now: DateTime<Utc>) -> std::time::Duration {
        self.next_allowed
            .and_then(|next| (next - now).to_std().ok())
            .unwrap_or(std::time::Duration::ZERO)
    }

    pub fn next_allowed(&self) -> Option<DateTime<Utc>> {
        self.next_allowed
    }

    pub fn last_dispatch(&self) -> Option<DateTime<Utc>> {
        self.last_dispatch
    }

    pub fn status(&self, now: DateTime<Utc>) -> PacingStatus {
        PacingStatus {
            interval_seconds: self.config.interval.num_milliseconds() as f64 / 1000.0,
            dispatches: self.dispatches,
            last_dispatch: self.last_dispatch,
            next_allowed: self.next_allowed,
            is_open: self.is_open(now),
            wait_seconds: self.wait_time(now).as_secs_f64(),
        }
    }

    fn jitter_for(&self, dispatch_index: u64) -> Duration {
        if self.config.jitter_seconds == 0 {
            return Duration::zero();
        }
        let mut rng = seeded_stream(self.config.seed ^ JITTER_SALT, dispatch_index);
        let jitter = rng.u64(0..=self.config.jitter_seconds);
        Duration::try_seconds(jitter.min(i64::MAX as u64) as i64).unwrap_or(Duration::zero())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingStatus {
    pub interval_seconds: f64,
    pub dispatches: u64,
    pub last_dispatch: Option<DateTime<Utc>>,
    pub next_allowed: Option<DateTime<Utc>>,
    pub is_open: bool,
    pub wait_seconds: f64,
}

fn saturating_add(at: DateTime<Utc>, gap: Duration) -> DateTime<Utc> {
    at.checked_add_signed(gap).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn config(posts_per_hour: f64) -> RunConfig {
        RunConfig {
            posts_per_hour,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_next_slot() {
        let config = config(2.0);
        assert_eq!(next_slot(&config, None), None);
        assert_eq!(
            next_slot(&config, Some(t0())),
            Some(t0() + Duration::minutes(30))
        );
    }

    #[test]
    fn test_first_dispatch_is_immediate() {
        let mut scheduler = Scheduler::for_run(&config(2.0));
        assert!(scheduler.is_open(t0()));
        assert!(scheduler.try_advance(t0()));
        assert_eq!(scheduler.next_allowed(), Some(t0() + Duration::minutes(30)));
    }

    #[test]
    fn test_try_advance_blocks_until_interval_elapsed() {
        let mut scheduler = Scheduler::for_run(&config(2.0));
        assert!(scheduler.try_advance(t0()));

        let early = t0() + Duration::minutes(29);
        assert!(!scheduler.try_advance(early));
        // A refused attempt must not move the clock
        assert_eq!(scheduler.next_allowed(), Some(t0() + Duration::minutes(30)));
        assert_eq!(scheduler.wait_time(early), std::time::Duration::from_secs(60));

        let on_time = t0() + Duration::minutes(30);
        assert!(scheduler.try_advance(on_time));
        assert_eq!(scheduler.last_dispatch(), Some(on_time));
    }

    #[test]
    fn test_idle_time_does_not_bank_slots() {
        let mut scheduler = Scheduler::for_run(&config(60.0));
        assert!(scheduler.try_advance(t0()));

        let much_later = t0() + Duration::hours(5);
        assert!(scheduler.try_advance(much_later));
        // Next slot is measured from the last dispatch, not the missed ones
        assert!(!scheduler.try_advance(much_later + Duration::seconds(59)));
    }

    #[test]
    fn test_start_at_gates_first_dispatch() {
        let config = RunConfig {
            start_at: Some(t0() + Duration::hours(1)),
            ..config(1.0)
        };
        let mut scheduler = Scheduler::for_run(&config);
        assert!(!scheduler.try_advance(t0()));
        assert_eq!(scheduler.wait_time(t0()), std::time::Duration::from_secs(3600));
        assert!(scheduler.try_advance(t0() + Duration::hours(1)));
    }

    #[test]
    fn test_jitter_only_lengthens_interval_and_is_reproducible() {
        let config = RunConfig {
            jitter_seconds: 120,
            seed: 7,
            ..config(4.0)
        };
        let mut a = Scheduler::for_run(&config);
        let mut b = Scheduler::for_run(&config);

        let mut now = t0();
        for _ in 0..10 {
            assert!(a.try_advance(now));
            assert!(b.try_advance(now));
            assert_eq!(a.next_allowed(), b.next_allowed());

            let next = a.next_allowed().unwrap();
            let gap = next - now;
            assert!(gap >= Duration::minutes(15));
            assert!(gap <= Duration::minutes(15) + Duration::seconds(120));
            now = next;
        }
    }

    #[test]
    fn test_status_reports_wait() {
        let mut scheduler = Scheduler::for_run(&config(1.0));
        scheduler.try_advance(t0());

        let status = scheduler.status(t0() + Duration::minutes(10));
        assert_eq!(status.dispatches, 1);
        assert!(!status.is_open);
        assert_eq!(status.interval_seconds, 3600.0);
        assert_eq!(status.wait_seconds, 3000.0);
    }
}
