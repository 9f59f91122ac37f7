//! Monotonic UTC clock abstraction.
//!
//! Every component that reasons about expiry (`Grant.expires`,
//! `Token.expires`, `Token.approval_expires`) reads "now" through a [`Clock`]
//! rather than calling `OffsetDateTime::now_utc()` directly, so tests can
//! substitute a fixed or advancing clock without sleeping.

use time::OffsetDateTime;

/// Source of the current UTC instant.
pub trait Clock: Send + Sync {
    /// Returns the current UTC instant.
    fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] backed by the operating system's real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// [`Clock`] that always reports a fixed instant, advanceable by tests.
///
/// Enabled outside this crate via the `test-util` feature so downstream
/// crates' own test suites can drive expiry logic deterministically.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone)]
pub struct FixedClock(std::sync::Arc<parking_lot::Mutex<OffsetDateTime>>);

#[cfg(any(test, feature = "test-util"))]
impl FixedClock {
    /// Builds a clock fixed at `instant`.
    #[must_use]
    pub fn new(instant: OffsetDateTime) -> Self {
        Self(std::sync::Arc::new(parking_lot::Mutex::new(instant)))
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: time::Duration) {
        *self.0.lock() += delta;
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn fixed_clock_advances_on_demand() {
        let start = OffsetDateTime::now_utc();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(time::Duration::seconds(100));
        assert_eq!(clock.now(), start + time::Duration::seconds(100));
    }
}
