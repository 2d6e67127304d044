use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock was never started")]
    NotStarted,
    #[error("clock already started")]
    AlreadyStarted,
}

/// Monotonic elapsed-time source for one session.
///
/// The clock is handed to whoever needs it rather than living in a global.
/// Clones share the same start instant, so the device loop and anything it
/// spawns report elapsed time against one origin. Reading the clock before
/// `start` is an error rather than a zero.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    origin: Arc<OnceLock<Instant>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a clock that is already running.
    pub fn started() -> Self {
        let clock = Self::new();
        let _ = clock.origin.set(Instant::now());
        clock
    }

    pub fn start(&self) -> Result<(), ClockError> {
        self.origin
            .set(Instant::now())
            .map_err(|_| ClockError::AlreadyStarted)
    }

    pub fn is_started(&self) -> bool {
        self.origin.get().is_some()
    }

    pub fn elapsed(&self) -> Result<Duration, ClockError> {
        self.origin
            .get()
            .map(Instant::elapsed)
            .ok_or(ClockError::NotStarted)
    }

    pub fn elapsed_ms(&self) -> Result<f64, ClockError> {
        self.elapsed().map(|d| d.as_secs_f64() * 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn reading_before_start_is_an_error() {
        let clock = Clock::new();
        assert!(!clock.is_started());
        assert_eq!(clock.elapsed(), Err(ClockError::NotStarted));
        assert_eq!(clock.elapsed_ms(), Err(ClockError::NotStarted));
    }

    #[test_timeout::timeout]
    fn second_start_is_rejected() {
        let clock = Clock::new();
        clock.start().expect("first start");
        assert_eq!(clock.start(), Err(ClockError::AlreadyStarted));
    }

    #[test_timeout::timeout]
    fn clones_share_origin() {
        let clock = Clock::new();
        let shared = clock.clone();
        clock.start().expect("start");
        assert!(shared.is_started());
        std::thread::sleep(Duration::from_millis(5));
        let elapsed = shared.elapsed().expect("elapsed");
        assert!(elapsed >= Duration::from_millis(5));
        assert!(clock.elapsed().expect("elapsed") >= elapsed);
    }

    #[test_timeout::timeout]
    fn started_clock_is_running() {
        let clock = Clock::started();
        assert!(clock.elapsed_ms().expect("elapsed") >= 0.0);
        assert_eq!(clock.start(), Err(ClockError::AlreadyStarted));
    }
}
