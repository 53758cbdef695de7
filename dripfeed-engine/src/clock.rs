use chrono::{DateTime, Duration, Utc};
use tokio::time::Instant;

/// Wall-clock time derived from Tokio's monotonic clock.
///
/// The wall time is read once at construction and advanced by
/// `tokio::time::Instant`, so a paused Tokio runtime (tests) and a real one
/// produce the same timestamps for the same sequence of sleeps.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl RunClock {
    pub fn system() -> Self {
        Self::anchored_at(Utc::now())
    }

    pub fn anchored_at(wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: wall,
            anchor: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.anchor.elapsed()).unwrap_or(Duration::MAX);
        self.anchor_wall
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for RunClock {
    fn default() -> Self {
        Self::system()
    }
}
