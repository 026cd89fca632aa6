// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::{Duration, Instant};

use crate::error::{AptError, Result};

/// The deadline used by `send_expect_reply` unless a caller overrides it.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// A scoped deadline. Each call to [`Deadline::check`] fails `Timeout` once
/// the deadline has passed; until then it returns the time remaining so a
/// caller can bound an inner blocking operation (e.g. a queue `recv_timeout`)
/// without overshooting the outer deadline.
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Deadline {
            expires_at: Instant::now() + budget,
        }
    }

    /// Returns the remaining budget, or `Timeout` if the deadline has
    /// already elapsed.
    pub fn check(&self) -> Result<Duration> {
        let now = Instant::now();
        if now >= self.expires_at {
            Err(AptError::Timeout)
        } else {
            Ok(self.expires_at - now)
        }
    }
}

/// Construct a deadline with the given budget. Named to read like the
/// scoped-iterator idiom the connection core's reply wait loop uses:
/// `let deadline = with_deadline(timeout); while let Ok(remaining) = deadline.check() { ... }`.
pub fn with_deadline(budget: Duration) -> Deadline {
    Deadline::new(budget)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn check_fails_once_elapsed() {
        let deadline = with_deadline(Duration::from_millis(10));
        assert!(deadline.check().is_ok());
        sleep(Duration::from_millis(20));
        assert!(matches!(deadline.check(), Err(AptError::Timeout)));
    }
}
