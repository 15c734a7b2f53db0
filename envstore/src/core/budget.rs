//! Time budget shared by every subprocess in a single call.

use std::time::{Duration, Instant};

use crate::error::StoreError;

/// Optional wall-clock deadline for a multi-step operation.
///
/// `Deadline::none()` never expires; each subprocess still runs under its own
/// per-command timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    /// Clamp `timeout` to the time left before the deadline.
    ///
    /// Errors when the deadline has already passed, so callers never spawn a
    /// process they would immediately have to kill.
    pub fn clamp(&self, timeout: Duration, operation: &str) -> Result<Duration, StoreError> {
        let Some(deadline) = self.0 else {
            return Ok(timeout);
        };
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::from_secs(0));
        if remaining.is_zero() {
            return Err(StoreError::DeadlineExceeded {
                operation: operation.to_string(),
            });
        }
        Ok(remaining.min(timeout))
    }

    pub fn is_bounded(&self) -> bool {
        self.0.is_some()
    }
}
