use std::time::Duration;
use tokio::time::Instant;

/// Upper bound applied to retain durations so `now + retain` cannot overflow (~100 years)
pub const MAX_RETAIN: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Absolute instant at which a stored value becomes eligible for delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `retain` from now.
    pub fn after(retain: Duration) -> Self {
        Self::at_offset(Instant::now(), retain)
    }

    /// Deadline `retain` after `now`, with `retain` capped at [`MAX_RETAIN`].
    ///
    /// A zero retain yields a deadline equal to `now`, which is already due.
    pub fn at_offset(now: Instant, retain: Duration) -> Self {
        Self(now + retain.min(MAX_RETAIN))
    }

    /// Deadline at an explicit instant. Past instants are already due.
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// Returns the underlying instant
    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Checks if the deadline is due at `now` (inclusive)
    pub fn has_passed_at(&self, now: Instant) -> bool {
        self.0 <= now
    }

    /// Checks if the deadline is due right now
    pub fn has_passed(&self) -> bool {
        self.has_passed_at(Instant::now())
    }

    /// Time left until the deadline, zero once due
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self {
        Self::at(instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_not_passed() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.has_passed());
        assert!(deadline.remaining() > Duration::from_secs(59));
    }

    #[test]
    fn test_zero_retain_is_due_immediately() {
        let now = Instant::now();
        let deadline = Deadline::at_offset(now, Duration::ZERO);
        assert!(deadline.has_passed_at(now));
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_past_instant_is_due() {
        let now = Instant::now();
        let deadline = Deadline::at(now - Duration::from_secs(1));
        assert!(deadline.has_passed_at(now));
    }

    #[test]
    fn test_extreme_retain_is_capped() {
        let now = Instant::now();
        // Must not panic on overflow
        let deadline = Deadline::at_offset(now, Duration::MAX);
        assert_eq!(deadline.instant(), now + MAX_RETAIN);
    }

    #[test]
    fn test_ordering_follows_instants() {
        let now = Instant::now();
        let early = Deadline::at_offset(now, Duration::from_millis(10));
        let late = Deadline::at_offset(now, Duration::from_millis(20));
        assert!(early < late);
    }
}
