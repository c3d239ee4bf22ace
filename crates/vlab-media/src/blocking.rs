//! CPU-bound work inside async runs.
//!
//! Filter chains, inference and image codecs run for tens of milliseconds
//! per frame. On a multi-threaded runtime they go through
//! [`tokio::task::block_in_place`] so the worker thread's other tasks
//! (status publishing, decoder stderr drains, shutdown timers) move to
//! another worker meanwhile. Single-threaded runtimes cannot hand tasks off,
//! so the work runs inline there.

use tokio::runtime::{Handle, RuntimeFlavor};

/// Run `f` without stalling the other tasks on this worker thread.
pub fn run_cpu_bound<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_runs_inline_outside_a_runtime() {
        assert_eq!(run_cpu_bound(|| 2 + 2), 4);
    }

    #[tokio::test]
    async fn test_runs_inline_on_current_thread_runtime() {
        let mut calls = 0;
        run_cpu_bound(|| calls += 1);
        assert_eq!(calls, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_other_tasks_keep_running() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        // Occupy the only worker with CPU-bound work
        let during = tokio::spawn({
            let ticks = Arc::clone(&ticks);
            async move {
                let before = ticks.load(Ordering::SeqCst);
                run_cpu_bound(|| std::thread::sleep(Duration::from_millis(300)));
                ticks.load(Ordering::SeqCst) - before
            }
        })
        .await
        .unwrap();

        ticker.abort();
        assert!(during >= 5, "ticker advanced only {during} times");
    }
}
