use std::time::{Duration, Instant};

/// Monotonic clock that stamps events as `hhmmss` elapsed since session start.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started_at: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started_at: Instant) -> Self {
        Self { started_at }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn stamp(&self) -> String {
        self.stamp_at(Instant::now())
    }

    pub fn stamp_at(&self, now: Instant) -> String {
        let secs = self.elapsed_at(now).as_secs();
        format!(
            "{:02}{:02}{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        )
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::start()
    }
}
