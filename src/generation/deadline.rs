//! Bounded-time execution of uncancellable blocking calls
//!
//! Model generation is a blocking call that can run far past any acceptable
//! response time and offers no cancellation hook. [`DeadlineRunner`] runs
//! such a call on a dedicated worker thread and waits up to a deadline for
//! the result. A worker that overruns is abandoned, not killed: it keeps
//! running and only releases its slot when it finishes on its own. The
//! number of live workers is capped, so a stream of timeouts degrades into
//! [`DeadlineOutcome::Saturated`] refusals instead of unbounded thread
//! growth.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Result of a deadline-bounded run
#[derive(Debug, PartialEq, Eq)]
pub enum DeadlineOutcome<T> {
    /// The worker finished within the deadline
    Completed(T),
    /// The deadline passed; the worker was abandoned and may still be running
    TimedOut,
    /// No worker was spawned: too many abandoned workers are still running
    Saturated,
}

impl<T> DeadlineOutcome<T> {
    /// Extract the completed value, if any
    pub fn into_completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Runs blocking calls under a deadline with a cap on abandoned workers
#[derive(Debug, Clone)]
pub struct DeadlineRunner {
    deadline: Duration,
    max_outstanding: usize,
    live_workers: Arc<AtomicUsize>,
}

/// Releases the worker slot when the worker exits, panics included
struct SlotGuard(Arc<AtomicUsize>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl DeadlineRunner {
    pub const DEFAULT_MAX_OUTSTANDING: usize = 4;

    /// Create a runner with the given deadline and the default worker cap
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            max_outstanding: Self::DEFAULT_MAX_OUTSTANDING,
            live_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the cap on concurrently live (running or abandoned) workers
    pub fn with_max_outstanding(mut self, max_outstanding: usize) -> Self {
        self.max_outstanding = max_outstanding.max(1);
        self
    }

    /// The configured deadline
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Number of workers currently running (including abandoned ones)
    pub fn outstanding(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// Run a blocking task, waiting at most the deadline for its result.
    ///
    /// Returns within deadline plus scheduling overhead in all cases. The
    /// task itself is never cancelled; on timeout it runs to completion in
    /// the background and its result is discarded.
    pub fn run<T, F>(&self, task: F) -> DeadlineOutcome<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        // Reserve a slot before spawning; refuse when the cap is reached
        let mut current = self.live_workers.load(Ordering::Acquire);
        loop {
            if current >= self.max_outstanding {
                tracing::warn!(
                    "Refusing to spawn worker: {} still running (cap {})",
                    current,
                    self.max_outstanding
                );
                return DeadlineOutcome::Saturated;
            }
            match self.live_workers.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let slot = SlotGuard(Arc::clone(&self.live_workers));

        thread::spawn(move || {
            let _slot = slot;
            let result = task();
            // The receiver is gone if the caller already timed out
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.deadline) {
            Ok(value) => DeadlineOutcome::Completed(value),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Worker exceeded {:.1}s deadline, abandoning it",
                    self.deadline.as_secs_f64()
                );
                DeadlineOutcome::TimedOut
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::warn!("Worker exited without producing a result");
                DeadlineOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_fast_task_completes() {
        let runner = DeadlineRunner::new(Duration::from_secs(5));
        let outcome = runner.run(|| 42);
        assert_eq!(outcome, DeadlineOutcome::Completed(42));
    }

    #[test]
    fn test_slow_task_times_out_promptly() {
        let runner = DeadlineRunner::new(Duration::from_millis(50));
        let start = Instant::now();
        let outcome = runner.run(|| {
            thread::sleep(Duration::from_millis(500));
            1
        });
        let elapsed = start.elapsed();

        assert_eq!(outcome, DeadlineOutcome::TimedOut);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(450), "blocked past deadline");
    }

    #[test]
    fn test_saturation_refuses_new_workers() {
        let runner = DeadlineRunner::new(Duration::from_millis(20)).with_max_outstanding(2);

        for _ in 0..2 {
            let outcome = runner.run(|| {
                thread::sleep(Duration::from_millis(400));
                0
            });
            assert_eq!(outcome, DeadlineOutcome::TimedOut);
        }

        // Both slots are held by abandoned workers
        assert_eq!(runner.outstanding(), 2);
        assert_eq!(runner.run(|| 0), DeadlineOutcome::Saturated);

        // Slots come back once the abandoned workers finish
        thread::sleep(Duration::from_millis(600));
        assert_eq!(runner.outstanding(), 0);
        assert_eq!(runner.run(|| 7), DeadlineOutcome::Completed(7));
    }

    #[test]
    fn test_panicking_worker_releases_slot() {
        let runner = DeadlineRunner::new(Duration::from_millis(200)).with_max_outstanding(1);

        let outcome: DeadlineOutcome<i32> = runner.run(|| panic!("worker died"));
        assert_eq!(outcome, DeadlineOutcome::TimedOut);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(runner.outstanding(), 0);
        assert_eq!(runner.run(|| 3), DeadlineOutcome::Completed(3));
    }

    #[test]
    fn test_into_completed() {
        assert_eq!(DeadlineOutcome::Completed(5).into_completed(), Some(5));
        assert_eq!(DeadlineOutcome::<i32>::TimedOut.into_completed(), None);
    }
}
