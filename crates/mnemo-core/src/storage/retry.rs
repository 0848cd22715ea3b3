//! Busy/Locked Retry
//!
//! SQLite reports transient contention as SQLITE_BUSY / SQLITE_LOCKED. The
//! typed helpers wrap every statement and transaction in this retry loop;
//! non-transient failures propagate immediately, and the last error is
//! surfaced unchanged once the budget is exhausted.

use std::time::Duration;

use crate::error::{MemoryError, Result};

/// Retry budget with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Single statements and reads: 100 ms base, 1 s cap
pub const STATEMENT: RetryPolicy = RetryPolicy {
    attempts: 3,
    base_delay: Duration::from_millis(100),
    max_delay: Duration::from_millis(1000),
};

/// Transactions hold the write lock longer: 200 ms base, 2 s cap
pub const TRANSACTION: RetryPolicy = RetryPolicy {
    attempts: 3,
    base_delay: Duration::from_millis(200),
    max_delay: Duration::from_millis(2000),
};

impl RetryPolicy {
    /// Delay before retry `attempt` (0-based): base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Whether an error is transient contention worth retrying
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

/// Run `op` under the retry policy.
///
/// Callers pass a closure that re-executes the full statement each attempt
/// (prepared statements are re-bound from scratch, so a retried attempt
/// observes the database state of its own execution).
pub fn with_retry<T>(
    policy: &RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> rusqlite::Result<T>,
) -> Result<T> {
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if is_busy(&err) => {
                if attempt >= policy.attempts {
                    tracing::warn!("{what}: busy after {} attempts: {err}", attempt + 1);
                    return Err(MemoryError::Busy(err.to_string()));
                }
                let delay = policy.delay_for(attempt);
                tracing::debug!("{what}: busy, retrying in {delay:?} (attempt {})", attempt + 1);
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(MemoryError::from_sqlite(err)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn busy_error() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        )
    }

    #[test]
    fn test_succeeds_after_transient_busy() {
        let mut calls = 0;
        let result = with_retry(&STATEMENT, "test", || {
            calls += 1;
            if calls < 2 {
                Err(busy_error())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_surfaces_busy_after_budget() {
        let policy = RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let mut calls = 0;
        let result: Result<()> = with_retry(&policy, "test", || {
            calls += 1;
            Err(busy_error())
        });
        // Initial attempt plus two retries
        assert_eq!(calls, 3);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(err.to_string().contains("database is locked"));
    }

    #[test]
    fn test_non_transient_propagates_immediately() {
        let mut calls = 0;
        let result: Result<()> = with_retry(&STATEMENT, "test", || {
            calls += 1;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(STATEMENT.delay_for(0), Duration::from_millis(100));
        assert_eq!(STATEMENT.delay_for(1), Duration::from_millis(200));
        assert_eq!(STATEMENT.delay_for(10), Duration::from_millis(1000));
        assert_eq!(TRANSACTION.delay_for(4), Duration::from_millis(2000));
    }
}
