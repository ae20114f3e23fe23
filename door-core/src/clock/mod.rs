//! Wrapping millisecond clock shared by every tick-driven component.
//!
//! The counter is a plain `u32` that wraps after roughly 49.7 days. All
//! comparisons go through [`Millis::elapsed_since`], which uses wrapping
//! subtraction, so a deadline armed shortly before the wrap still expires at
//! the right moment afterwards. Anything that must never observe a double wrap
//! is covered by the preventive restart in [`crate::timing`].

use core::fmt;

/// One second expressed in milliseconds.
pub const SECOND_MS: u32 = 1_000;
/// One minute expressed in milliseconds.
pub const MINUTE_MS: u32 = 60 * SECOND_MS;
/// One hour expressed in milliseconds.
pub const HOUR_MS: u32 = 60 * MINUTE_MS;
/// One day expressed in milliseconds.
pub const DAY_MS: u32 = 24 * HOUR_MS;

/// Point on the wrapping millisecond timeline.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Millis(u32);

impl Millis {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the instant `duration_ms` after `self`, wrapping around.
    #[must_use]
    pub const fn wrapping_add(self, duration_ms: u32) -> Self {
        Self(self.0.wrapping_add(duration_ms))
    }

    /// Milliseconds elapsed between `earlier` and `self`, tolerant of one wrap.
    #[must_use]
    pub const fn elapsed_since(self, earlier: Millis) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Monotonic wrapping millisecond source.
pub trait Clock {
    fn now(&self) -> Millis;
}

/// Clock that only moves when told to; drives simulations and tests.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ManualClock {
    now: Millis,
}

impl ManualClock {
    #[must_use]
    pub const fn starting_at(now: Millis) -> Self {
        Self { now }
    }

    /// Moves the clock forward and returns the new time.
    pub fn advance(&mut self, duration_ms: u32) -> Millis {
        self.now = self.now.wrapping_add(duration_ms);
        self.now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.now
    }
}

/// Countdown anchored at the instant it was armed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Deadline {
    started_at: Millis,
    duration_ms: u32,
}

impl Deadline {
    /// Arms a deadline `duration_ms` after `now`.
    #[must_use]
    pub const fn after(now: Millis, duration_ms: u32) -> Self {
        Self {
            started_at: now,
            duration_ms,
        }
    }

    #[must_use]
    pub const fn started_at(&self) -> Millis {
        self.started_at
    }

    #[must_use]
    pub const fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    /// Instant at which the deadline is reached.
    #[must_use]
    pub const fn due_at(&self) -> Millis {
        self.started_at.wrapping_add(self.duration_ms)
    }

    /// `true` once strictly more than the duration has elapsed.
    #[must_use]
    pub const fn has_passed(&self, now: Millis) -> bool {
        now.elapsed_since(self.started_at) > self.duration_ms
    }

    /// `true` once at least the duration has elapsed.
    #[must_use]
    pub const fn is_reached(&self, now: Millis) -> bool {
        now.elapsed_since(self.started_at) >= self.duration_ms
    }

    /// Milliseconds left before the deadline is reached.
    #[must_use]
    pub const fn remaining(&self, now: Millis) -> u32 {
        self.duration_ms
            .saturating_sub(now.elapsed_since(self.started_at))
    }

    /// Deadline of the same length starting where this one is due.
    #[must_use]
    pub const fn next_period(&self) -> Self {
        Self::after(self.due_at(), self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_survives_counter_wrap() {
        let before_wrap = Millis::new(u32::MAX - 9);
        let after_wrap = before_wrap.wrapping_add(25);

        assert_eq!(after_wrap, Millis::new(15));
        assert_eq!(after_wrap.elapsed_since(before_wrap), 25);
    }

    #[test]
    fn deadline_armed_before_wrap_expires_after_it() {
        let deadline = Deadline::after(Millis::new(u32::MAX - 100), 200);

        assert!(!deadline.has_passed(Millis::new(u32::MAX)));
        assert!(!deadline.is_reached(Millis::new(98)));
        assert!(deadline.is_reached(Millis::new(99)));
        assert!(!deadline.has_passed(Millis::new(99)));
        assert!(deadline.has_passed(Millis::new(100)));
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let deadline = Deadline::after(Millis::new(1_000), 300);

        assert_eq!(deadline.remaining(Millis::new(1_100)), 200);
        assert_eq!(deadline.remaining(Millis::new(5_000)), 0);
    }

    #[test]
    fn manual_clock_wraps_with_the_counter() {
        let mut clock = ManualClock::starting_at(Millis::new(u32::MAX - 1));

        assert_eq!(clock.advance(3), Millis::new(1));
        assert_eq!(clock.now(), Millis::new(1));
    }

    #[test]
    fn next_period_does_not_drift() {
        let deadline = Deadline::after(Millis::new(10), 50);
        let next = deadline.next_period();

        assert_eq!(next.started_at(), Millis::new(60));
        assert_eq!(next.due_at(), Millis::new(110));
    }
}
