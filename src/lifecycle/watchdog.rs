// Parent-process watchdog: if the process that launched the engine (the
// desktop shell, a CLI wrapper, a supervisor) disappears without shutting
// the engine down cleanly, the engine shuts itself down rather than running
// forever as an orphan (spec §4.2).

use crate::constants::{WATCHDOG_INTERVAL_SECS, WATCHDOG_MISSES_BEFORE_SHUTDOWN};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

#[cfg(unix)]
fn parent_is_alive(parent_pid: u32) -> bool {
    unsafe { libc::kill(parent_pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn parent_is_alive(_parent_pid: u32) -> bool {
    true
}

/// Poll the parent pid every `WATCHDOG_INTERVAL_SECS`; after
/// `WATCHDOG_MISSES_BEFORE_SHUTDOWN` consecutive misses, signal shutdown over
/// `shutdown_tx` so `main` can drain in-flight work before exiting. A single
/// miss is tolerated without tripping the watchdog since a busy scheduler can
/// delay the poll past the parent actually exiting mid-tick.
pub fn spawn(parent_pid: u32, shutdown_tx: watch::Sender<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let misses = AtomicUsize::new(0);
        let mut interval = tokio::time::interval(Duration::from_secs(WATCHDOG_INTERVAL_SECS));

        loop {
            interval.tick().await;
            if parent_is_alive(parent_pid) {
                misses.store(0, Ordering::SeqCst);
                continue;
            }

            let count = misses.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(parent_pid, miss = count, "parent process watchdog check missed");

            if count >= WATCHDOG_MISSES_BEFORE_SHUTDOWN {
                warn!(parent_pid, "parent process appears gone, initiating shutdown");
                let _ = shutdown_tx.send(true);
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(parent_is_alive(std::process::id()));
    }

    #[test]
    fn implausible_pid_is_not_alive() {
        assert!(!parent_is_alive(999_999));
    }
}
