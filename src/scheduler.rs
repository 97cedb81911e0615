//! Deduplicating job scheduler.
//!
//! The scheduler owns a table of in-flight generations keyed by
//! [`GenerationKey`]. Each key moves through
//!
//! ```text
//! IDLE ──submit──▶ IN_FLIGHT ──job ends──▶ IDLE
//!                    ▲    │
//!            submit ─┘    └─▶ every waiter gets the same JobResult
//! ```
//!
//! A submit for a key that is already in flight joins the existing
//! [`JobHandle`] instead of starting a second job, so one derivative is
//! generated at most once between two "not present" observations. When the
//! job ends the key is removed *before* the result is published; a later
//! submit starts a fresh job, which re-checks storage (cheap when the files
//! now exist) or retries after a failure.
//!
//! Waiting blocks on a condition variable. Execution itself is delegated to
//! an [`ExecutionStrategy`].

use crate::executor::ExecutionStrategy;
use crate::job::{DerivativeKey, GenerationJob, GenerationKey, JobResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Flight {
    result: Mutex<Option<JobResult>>,
    ready: Condvar,
}

/// Shared completion slot for one job. Clones observe the same result.
#[derive(Clone)]
pub struct JobHandle {
    flight: Arc<Flight>,
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl JobHandle {
    fn pending() -> Self {
        Self {
            flight: Arc::new(Flight {
                result: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// A handle that is already resolved.
    pub fn completed(result: JobResult) -> Self {
        let handle = Self::pending();
        handle.set(result);
        handle
    }

    /// Publish the result. Only the first call has an effect.
    fn set(&self, result: JobResult) {
        let mut slot = lock(&self.flight.result);
        if slot.is_none() {
            *slot = Some(result);
        }
        self.flight.ready.notify_all();
    }

    /// Block until the job finishes.
    pub fn wait(&self) -> JobResult {
        let mut slot = lock(&self.flight.result);
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self
                .flight
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn try_result(&self) -> Option<JobResult> {
        lock(&self.flight.result).clone()
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.flight.result).is_some()
    }

    /// True when both handles belong to the same job.
    pub fn same_job(&self, other: &JobHandle) -> bool {
        Arc::ptr_eq(&self.flight, &other.flight)
    }
}

#[derive(Default)]
struct Counters {
    submitted: AtomicUsize,
    joined: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs handed to the strategy.
    pub submitted: usize,
    /// Submits that attached to an in-flight job.
    pub joined: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} jobs ({} joined), {} succeeded, {} failed",
            self.submitted, self.joined, self.succeeded, self.failed
        )
    }
}

/// Deduplicating front of an [`ExecutionStrategy`]. Share it with `Arc`.
pub struct Scheduler {
    strategy: Arc<dyn ExecutionStrategy>,
    in_flight: Arc<Mutex<HashMap<GenerationKey, JobHandle>>>,
    counters: Arc<Counters>,
}

impl Scheduler {
    pub fn new(strategy: Arc<dyn ExecutionStrategy>) -> Self {
        Self {
            strategy,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Submit the job that produces the derivative named by `key`.
    pub fn submit(&self, key: &DerivativeKey, job: GenerationJob) -> JobHandle {
        self.submit_generation(key.generation_key(), job)
    }

    /// Submit under an explicit deduplication key. Joins the in-flight job
    /// for `key` if there is one; `job` is dropped in that case.
    pub fn submit_generation(&self, key: GenerationKey, job: GenerationJob) -> JobHandle {
        let handle = {
            let mut table = lock(&self.in_flight);
            if let Some(existing) = table.get(&key) {
                self.counters.joined.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, "joined in-flight derivative job");
                return existing.clone();
            }
            let handle = JobHandle::pending();
            table.insert(key.clone(), handle.clone());
            handle
        };
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%key, strategy = self.strategy.name(), "submitting derivative job");

        let table = Arc::clone(&self.in_flight);
        let counters = Arc::clone(&self.counters);
        let completion = handle.clone();
        self.strategy.spawn(
            job,
            Box::new(move |result| {
                {
                    let mut table = lock(&table);
                    if table.get(&key).is_some_and(|h| h.same_job(&completion)) {
                        table.remove(&key);
                    }
                }
                match &result {
                    Ok(_) => counters.succeeded.fetch_add(1, Ordering::Relaxed),
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "derivative job failed");
                        counters.failed.fetch_add(1, Ordering::Relaxed)
                    }
                };
                completion.set(result);
            }),
        );
        handle
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn workers(&self) -> usize {
        self.strategy.workers()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            joined: self.counters.joined.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Completion, InProcessPool};
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{GenerateError, GenerateOutcome, OutputFormat};
    use crate::job::Generator;
    use crate::storage::tests::MemoryStorage;
    use crate::test_helpers::sample_job;
    use std::sync::Barrier;
    use std::time::Duration;

    /// Strategy that parks every job until the test releases it.
    #[derive(Default)]
    struct HoldingStrategy {
        parked: Mutex<Vec<(GenerationJob, Completion)>>,
    }

    impl HoldingStrategy {
        fn parked(&self) -> usize {
            self.parked.lock().unwrap().len()
        }

        fn release_all(&self, result: JobResult) {
            let parked: Vec<_> = self.parked.lock().unwrap().drain(..).collect();
            for (_, done) in parked {
                done(result.clone());
            }
        }
    }

    impl ExecutionStrategy for HoldingStrategy {
        fn spawn(&self, job: GenerationJob, done: Completion) {
            self.parked.lock().unwrap().push((job, done));
        }

        fn workers(&self) -> usize {
            1
        }

        fn name(&self) -> &'static str {
            "holding"
        }
    }

    fn key(media: &str, index: usize) -> DerivativeKey {
        DerivativeKey {
            media: media.into(),
            token: "_sa".into(),
            base: media.into(),
            size_index: index,
            format: OutputFormat::Jpeg,
        }
    }

    fn job() -> GenerationJob {
        sample_job("/src/banner.jpg", "/out")
    }

    // =========================================================================
    // JobHandle
    // =========================================================================

    #[test]
    fn completed_handle_returns_immediately() {
        let handle = JobHandle::completed(Ok(GenerateOutcome::Cached));
        assert!(handle.is_finished());
        assert_eq!(handle.wait(), Ok(GenerateOutcome::Cached));
    }

    #[test]
    fn first_result_wins() {
        let handle = JobHandle::pending();
        handle.set(Ok(GenerateOutcome::Cached));
        handle.set(Err(GenerateError::Encode("late".into())));
        assert_eq!(handle.try_result(), Some(Ok(GenerateOutcome::Cached)));
    }

    // =========================================================================
    // Deduplication
    // =========================================================================

    #[test]
    fn concurrent_submits_share_one_job() {
        let strategy = Arc::new(HoldingStrategy::default());
        let scheduler = Scheduler::new(strategy.clone());

        let handles: Vec<JobHandle> = (0..5).map(|_| scheduler.submit(&key("hero", 2), job())).collect();

        assert_eq!(strategy.parked(), 1);
        assert!(handles.iter().all(|h| h.same_job(&handles[0])));
        assert!(!handles[0].is_finished());

        strategy.release_all(Ok(GenerateOutcome::Cached));
        for handle in &handles {
            assert_eq!(handle.wait(), Ok(GenerateOutcome::Cached));
        }
        let stats = scheduler.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.joined, 4);
        assert_eq!(stats.succeeded, 1);
    }

    #[test]
    fn original_and_webp_requests_join() {
        let strategy = Arc::new(HoldingStrategy::default());
        let scheduler = Scheduler::new(strategy.clone());

        let jpg = scheduler.submit(&key("hero", 2), job());
        let webp_key = DerivativeKey {
            format: OutputFormat::WebP,
            ..key("hero", 2)
        };
        let webp = scheduler.submit(&webp_key, job());

        assert!(jpg.same_job(&webp));
        assert_eq!(strategy.parked(), 1);
    }

    #[test]
    fn distinct_keys_run_separately() {
        let strategy = Arc::new(HoldingStrategy::default());
        let scheduler = Scheduler::new(strategy.clone());

        scheduler.submit(&key("hero", 0), job());
        scheduler.submit(&key("hero", 1), job());
        scheduler.submit(&key("banner", 0), job());

        assert_eq!(strategy.parked(), 3);
        assert_eq!(scheduler.in_flight(), 3);
    }

    #[test]
    fn key_returns_to_idle_after_completion() {
        let strategy = Arc::new(HoldingStrategy::default());
        let scheduler = Scheduler::new(strategy.clone());

        let first = scheduler.submit(&key("hero", 0), job());
        strategy.release_all(Ok(GenerateOutcome::Cached));
        assert_eq!(scheduler.in_flight(), 0);

        let second = scheduler.submit(&key("hero", 0), job());
        assert!(!first.same_job(&second));
        assert_eq!(scheduler.stats().submitted, 2);
    }

    #[test]
    fn failure_reaches_every_waiter_and_allows_retry() {
        let strategy = Arc::new(HoldingStrategy::default());
        let scheduler = Scheduler::new(strategy.clone());
        let failure = Err(GenerateError::SourceRead("gone".into()));

        let a = scheduler.submit(&key("hero", 1), job());
        let b = scheduler.submit(&key("hero", 1), job());
        strategy.release_all(failure.clone());

        assert_eq!(a.wait(), failure);
        assert_eq!(b.wait(), failure);
        assert_eq!(scheduler.stats().failed, 1);

        scheduler.submit(&key("hero", 1), job());
        assert_eq!(strategy.parked(), 1);
    }

    #[test]
    fn waiters_block_until_release() {
        let strategy = Arc::new(HoldingStrategy::default());
        let scheduler = Arc::new(Scheduler::new(strategy.clone()));
        let handle = scheduler.submit(&key("hero", 0), job());

        let waiter = {
            let handle = handle.clone();
            std::thread::spawn(move || handle.wait())
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        strategy.release_all(Ok(GenerateOutcome::Unsupported));
        assert_eq!(waiter.join().unwrap(), Ok(GenerateOutcome::Unsupported));
    }

    // =========================================================================
    // With a real pool
    // =========================================================================

    #[cfg(unix)]
    #[test]
    fn timeout_reaches_every_joined_caller() {
        use crate::executor::SubprocessStrategy;

        let strategy = SubprocessStrategy::new(
            "sleep",
            vec!["5".into()],
            Some(Duration::from_millis(100)),
            1,
        )
        .unwrap();
        let scheduler = Scheduler::new(Arc::new(strategy));

        let handles: Vec<JobHandle> = (0..3).map(|_| scheduler.submit(&key("hero", 0), job())).collect();
        assert!(handles.iter().all(|h| h.same_job(&handles[0])));

        for handle in &handles {
            assert_eq!(handle.wait(), Err(GenerateError::Timeout(100)));
        }
        let stats = scheduler.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.joined, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn racing_threads_generate_once() {
        let backend = Arc::new(MockBackend::with_delay(Duration::from_millis(100)));
        let storage = Arc::new(MemoryStorage::with_file("/src/banner.jpg", b"jpeg"));
        let generator = Generator::new(backend.clone(), storage.clone());
        let pool = InProcessPool::new(generator, 4).unwrap();
        let scheduler = Arc::new(Scheduler::new(Arc::new(pool)));
        let barrier = Arc::new(Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    scheduler.submit(&key("banner", 0), job()).wait()
                })
            })
            .collect();

        for thread in threads {
            assert!(thread.join().unwrap().is_ok());
        }
        assert_eq!(backend.render_count(), 1);
        assert_eq!(storage.write_count(), 2);
    }
}
