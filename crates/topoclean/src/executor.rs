//! Parallel batch executor shared by every pipeline stage.

use crate::error::CleanError;
use log::info;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Report after this many completions, and once more at 100%.
pub const DEFAULT_REPORT_EVERY: usize = 100;

/// Receives progress of a running batch. Called from worker threads.
pub trait ProgressObserver: Sync {
    fn on_progress(&self, label: &str, processed: usize, total: usize, rate_per_sec: f64);
}

/// Default observer: one `info!` line per report.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, label: &str, processed: usize, total: usize, rate_per_sec: f64) {
        let percent = if total == 0 {
            100.0
        } else {
            processed as f64 * 100.0 / total as f64
        };
        info!(
            "{label}: {processed:>8}/{total} ({percent:5.1}%), {rate_per_sec:8.1} items/s"
        );
    }
}

/// Runs a pure function over a list of jobs on a dedicated rayon pool.
///
/// Every job is processed exactly once and results come back in submission
/// order. Failures are expected to be part of `R`.
pub struct BatchExecutor {
    pool: ThreadPool,
    observer: Box<dyn ProgressObserver + Send>,
}

impl BatchExecutor {
    /// `None` sizes the pool to the available parallelism.
    pub fn new(workers: Option<usize>) -> Result<Self, CleanError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("topoclean-{i}"));
        if let Some(n) = workers {
            builder = builder.num_threads(n.max(1));
        }
        Ok(Self {
            pool: builder.build()?,
            observer: Box::new(LogProgress),
        })
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + Send + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `work` for every job and block until all results are in.
    pub fn process<J, R, F>(&self, label: &str, jobs: Vec<J>, work: F) -> Vec<R>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> R + Sync + Send,
    {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }

        let done = AtomicUsize::new(0);
        let start = Instant::now();
        let work = &work;
        let done = &done;

        self.pool.install(|| {
            jobs.into_par_iter()
                .map(|job| {
                    let result = work(job);
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % DEFAULT_REPORT_EVERY == 0 || n == total {
                        let rate = n as f64 / start.elapsed().as_secs_f64().max(1e-9);
                        self.observer.on_progress(label, n, total, rate);
                    }
                    result
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(usize, usize)>>>);

    impl ProgressObserver for Recorder {
        fn on_progress(&self, _label: &str, processed: usize, total: usize, rate: f64) {
            assert!(rate >= 0.0);
            self.0.lock().unwrap().push((processed, total));
        }
    }

    #[test]
    fn every_job_runs_exactly_once_in_order() {
        let executor = BatchExecutor::new(Some(4)).unwrap();
        let calls = AtomicUsize::new(0);

        let jobs: Vec<usize> = (0..1000).collect();
        let results = executor.process("square", jobs, |i| {
            calls.fetch_add(1, Ordering::Relaxed);
            i * i
        });

        assert_eq!(calls.load(Ordering::Relaxed), 1000);
        assert_eq!(results.len(), 1000);
        assert!(results.iter().enumerate().all(|(i, r)| *r == i * i));
    }

    #[test]
    fn progress_is_reported_periodically_and_at_completion() {
        let recorder = Recorder::default();
        let executor = BatchExecutor::new(Some(3))
            .unwrap()
            .with_observer(recorder.clone());

        executor.process("noop", (0..250).collect::<Vec<_>>(), |i: i32| i);

        let mut seen = recorder.0.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![(100, 250), (200, 250), (250, 250)]);
    }

    #[test]
    fn empty_batch_reports_nothing() {
        let recorder = Recorder::default();
        let executor = BatchExecutor::new(Some(1))
            .unwrap()
            .with_observer(recorder.clone());

        let out: Vec<u8> = executor.process("empty", Vec::<u8>::new(), |b| b);
        assert!(out.is_empty());
        assert!(recorder.0.lock().unwrap().is_empty());
    }
}
