// Retry wrapper for write contention. Per spec §4.1: writers that hit
// `SQLITE_BUSY`/`SQLITE_LOCKED` back off and retry before giving up, at which
// point the caller sees `LOCK_CONTENTION` and (in the pipeline) requeues the
// item rather than failing it.

use crate::constants::{RETRY_BASE_BACKOFF_MS, RETRY_MAX_ATTEMPTS, RETRY_MAX_BACKOFF_MS};
use crate::error::{EngineError, Result};
use std::thread::sleep;
use std::time::Duration;

/// Run `f`, retrying on lock contention with bounded exponential backoff.
pub fn with_retry<T>(mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_lock_contention() && attempt + 1 < RETRY_MAX_ATTEMPTS => {
                attempt += 1;
                let backoff = (RETRY_BASE_BACKOFF_MS * 2u64.pow(attempt - 1)).min(RETRY_MAX_BACKOFF_MS);
                tracing::debug!(attempt, backoff_ms = backoff, "store write contended, retrying");
                sleep(Duration::from_millis(backoff));
            }
            Err(e) if e.is_lock_contention() => {
                tracing::warn!("store write exhausted retries under lock contention");
                return Err(EngineError::LockContention);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn succeeds_immediately_when_no_contention() {
        let calls = Cell::new(0);
        let result = with_retry(|| {
            calls.set(calls.get() + 1);
            Ok::<_, EngineError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn propagates_non_contention_errors_immediately() {
        let calls = Cell::new(0);
        let result: Result<()> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(EngineError::FileNotFound("x".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retries_then_succeeds_on_contention() {
        let calls = Cell::new(0);
        let result = with_retry(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(EngineError::LockContention)
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }
}
