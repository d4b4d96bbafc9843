use std::time::{Duration, Instant};

/// A point in time after which cooperative work should stop at its next
/// checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub const NONE: Deadline = Deadline(None);

    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or(Self::NONE, Self::after)
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

impl Default for Deadline {
    fn default() -> Self { Self::NONE }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_expires() {
        assert!(!Deadline::NONE.is_expired());
        assert_eq!(Deadline::NONE.remaining(), None);
    }

    #[test]
    fn zero_timeout_is_expired() {
        assert!(Deadline::after(Duration::ZERO).is_expired());
        assert!(!Deadline::after(Duration::from_secs(3600)).is_expired());
    }
}
