//! Absolute pipeline deadline
//!
//! One `Deadline` is fixed when a request arrives. Every suspension point
//! clamps its own timeout to what is left of it.

use std::time::Duration;
use tokio::time::Instant;

/// Stand-in horizon for budgets that do not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Absolute deadline `T0 + budget`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    /// Start the clock now
    ///
    /// A budget too large to represent saturates at a far-future instant.
    #[inline]
    #[must_use]
    pub fn starting_now(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: saturating_add(started, budget),
        }
    }

    /// Absolute instant at which the budget is gone
    #[inline]
    #[must_use]
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Absolute instant `grace` past the deadline, saturating
    #[inline]
    #[must_use]
    pub fn instant_after(&self, grace: Duration) -> Instant {
        saturating_add(self.at, grace)
    }

    /// Time since the pipeline started
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Budget left, zero once crossed
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Check whether the budget is gone
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Clamp a per-call limit to the remaining budget
    #[inline]
    #[must_use]
    pub fn clamp(&self, limit: Duration) -> Duration {
        limit.min(self.remaining())
    }
}

fn saturating_add(base: Instant, by: Duration) -> Instant {
    base.checked_add(by)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_budget_saturates() {
        let deadline = Deadline::starting_now(Duration::MAX);
        assert!(!deadline.is_exhausted());
        assert!(deadline.remaining() >= FAR_FUTURE - Duration::from_secs(1));
        assert!(deadline.instant_after(Duration::MAX) >= deadline.instant());
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_shrinks_and_saturates() {
        let deadline = Deadline::starting_now(Duration::from_secs(10));
        assert_eq!(deadline.remaining(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(deadline.remaining(), Duration::from_secs(6));
        assert_eq!(deadline.elapsed(), Duration::from_secs(4));
        assert_eq!(deadline.clamp(Duration::from_secs(180)), Duration::from_secs(6));
        assert_eq!(deadline.clamp(Duration::from_secs(1)), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(deadline.is_exhausted());
        assert_eq!(deadline.clamp(Duration::from_secs(1)), Duration::ZERO);
    }
}
