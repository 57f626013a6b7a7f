//! Update Scheduler
//!
//! The scheduler decides when triggered subscribers run.
//!
//! Outside a batch a job runs as soon as it is scheduled. Inside a batch it
//! is queued, keyed by subscriber, so a subscriber triggered several times in
//! the same burst runs once. The queue is flushed in first-trigger order when
//! the outermost batch closes.
//!
//! # Algorithm
//!
//! 1. `batch` increments the depth and runs the closure.
//! 2. Jobs scheduled while the depth is non-zero are queued unless their
//!    subscriber is already queued.
//! 3. When the depth returns to zero the queue is drained front to back.
//!    Each job is removed before it runs, so a job that is triggered again
//!    while running is queued again.
//! 4. If a job panics, the rest of the queue is discarded.
//!
//! State is thread-local, like the running-effect stack.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::reactive::SubscriberId;

/// A unit of scheduled work.
pub type Job = Arc<dyn Fn() + Send + Sync>;

thread_local! {
    static SCHEDULER: RefCell<UpdateScheduler> = RefCell::new(UpdateScheduler::new());
}

/// The batch depth and pending queue of one thread.
pub struct UpdateScheduler {
    depth: usize,
    queue: VecDeque<(SubscriberId, Job)>,
    queued: HashSet<SubscriberId>,
}

impl UpdateScheduler {
    /// Create a new idle scheduler.
    pub fn new() -> Self {
        Self {
            depth: 0,
            queue: VecDeque::new(),
            queued: HashSet::new(),
        }
    }

    /// Whether a batch is open.
    pub fn is_batching(&self) -> bool {
        self.depth > 0
    }

    /// Queue a job. Returns `false` if the subscriber is already queued.
    pub fn enqueue(&mut self, id: SubscriberId, job: Job) -> bool {
        if !self.queued.insert(id) {
            return false;
        }
        self.queue.push_back((id, job));
        true
    }

    /// Take the next job in first-trigger order.
    pub fn pop_front(&mut self) -> Option<Job> {
        let (id, job) = self.queue.pop_front()?;
        self.queued.remove(&id);
        Some(job)
    }

    /// Empty the queue, handing back the jobs so they can be dropped
    /// outside the thread-local borrow.
    fn discard(&mut self) -> VecDeque<(SubscriberId, Job)> {
        self.queued.clear();
        std::mem::take(&mut self.queue)
    }

    /// Number of queued jobs.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn enter(&mut self) {
        self.depth += 1;
    }

    /// Close one level. Returns `true` when the outermost batch closed.
    fn exit(&mut self) -> bool {
        self.depth = self.depth.saturating_sub(1);
        self.depth == 0
    }

    /// Run `job` now, or queue it when a batch is open on this thread.
    pub fn schedule(id: SubscriberId, job: Job) {
        let deferred = SCHEDULER.with(|scheduler| {
            let mut scheduler = scheduler.borrow_mut();
            if scheduler.is_batching() {
                scheduler.enqueue(id, job.clone());
                true
            } else {
                false
            }
        });
        if !deferred {
            job();
        }
    }

    /// Whether a batch is open on this thread.
    pub fn batching() -> bool {
        SCHEDULER.with(|scheduler| scheduler.borrow().is_batching())
    }

    fn flush() {
        let guard = FlushGuard;
        let mut flushed = 0usize;
        loop {
            let next = SCHEDULER.with(|scheduler| scheduler.borrow_mut().pop_front());
            match next {
                Some(job) => {
                    job();
                    flushed += 1;
                }
                None => break,
            }
        }
        std::mem::forget(guard);
        if flushed > 0 {
            debug!(jobs = flushed, "batch flushed");
        }
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Discards what is left of the queue when a job panics mid-flush.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let discarded = SCHEDULER.with(|scheduler| scheduler.borrow_mut().discard());
        if !discarded.is_empty() {
            debug!(jobs = discarded.len(), "flush aborted, queue discarded");
        }
        drop(discarded);
    }
}

/// Closes a batch level. If the closure panicked, the outermost guard
/// discards the queue instead of running it.
struct BatchGuard {
    armed: bool,
}

impl BatchGuard {
    fn enter() -> Self {
        SCHEDULER.with(|scheduler| scheduler.borrow_mut().enter());
        Self { armed: true }
    }

    fn exit(mut self) -> bool {
        self.armed = false;
        SCHEDULER.with(|scheduler| scheduler.borrow_mut().exit())
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let discarded = SCHEDULER.with(|scheduler| {
            let mut scheduler = scheduler.borrow_mut();
            if scheduler.exit() {
                scheduler.discard()
            } else {
                VecDeque::new()
            }
        });
        drop(discarded);
    }
}

/// Run `f` as one mutation burst.
///
/// Effects triggered inside run once each, after `f` returns, in the order
/// they were first triggered. Nested batches join the outermost one.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let guard = BatchGuard::enter();
    let result = f();
    if guard.exit() {
        UpdateScheduler::flush();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Mutex;

    fn counting_job(counter: &Arc<AtomicI32>) -> Job {
        let counter = counter.clone();
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn jobs_run_immediately_outside_a_batch() {
        let counter = Arc::new(AtomicI32::new(0));
        UpdateScheduler::schedule(SubscriberId::new(), counting_job(&counter));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_deduplicates_by_subscriber() {
        let counter = Arc::new(AtomicI32::new(0));
        let id = SubscriberId::new();

        batch(|| {
            UpdateScheduler::schedule(id, counting_job(&counter));
            UpdateScheduler::schedule(id, counting_job(&counter));
            assert_eq!(counter.load(Ordering::SeqCst), 0);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_batches_flush_once_at_the_outermost() {
        let counter = Arc::new(AtomicI32::new(0));

        batch(|| {
            batch(|| {
                UpdateScheduler::schedule(SubscriberId::new(), counting_job(&counter));
            });
            assert_eq!(counter.load(Ordering::SeqCst), 0);
            assert!(UpdateScheduler::batching());
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!UpdateScheduler::batching());
    }

    #[test]
    fn flush_preserves_first_trigger_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = SubscriberId::new();
        let second = SubscriberId::new();

        let job = |label: &'static str| -> Job {
            let order = order.clone();
            Arc::new(move || order.lock().unwrap().push(label))
        };

        batch(|| {
            UpdateScheduler::schedule(first, job("first"));
            UpdateScheduler::schedule(second, job("second"));
            UpdateScheduler::schedule(first, job("first again"));
        });

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn batch_returns_the_closure_result() {
        assert_eq!(batch(|| 7), 7);
    }

    #[test]
    fn panicking_batch_discards_the_queue() {
        let counter = Arc::new(AtomicI32::new(0));
        let queued = counter.clone();

        let result = std::panic::catch_unwind(move || {
            batch(|| {
                UpdateScheduler::schedule(SubscriberId::new(), counting_job(&queued));
                panic!("burst failed");
            })
        });

        assert!(result.is_err());
        assert!(!UpdateScheduler::batching());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(SCHEDULER.with(|s| s.borrow().pending()), 0);
    }

    #[test]
    fn panicking_job_discards_the_rest_of_the_flush() {
        let counter = Arc::new(AtomicI32::new(0));
        let queued = counter.clone();
        let skipped = SubscriberId::new();

        let result = std::panic::catch_unwind(move || {
            batch(|| {
                UpdateScheduler::schedule(SubscriberId::new(), Arc::new(|| panic!("job failed")));
                UpdateScheduler::schedule(skipped, counting_job(&queued));
            })
        });

        assert!(result.is_err());
        assert_eq!(SCHEDULER.with(|s| s.borrow().pending()), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // The discarded subscriber is not treated as still queued.
        batch(|| UpdateScheduler::schedule(skipped, counting_job(&counter)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        batch(|| UpdateScheduler::schedule(SubscriberId::new(), counting_job(&counter)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn requeued_subscriber_runs_again_after_popping() {
        let mut scheduler = UpdateScheduler::new();
        let counter = Arc::new(AtomicI32::new(0));
        let id = SubscriberId::new();

        assert!(scheduler.enqueue(id, counting_job(&counter)));
        assert!(!scheduler.enqueue(id, counting_job(&counter)));
        assert!(scheduler.pop_front().is_some());
        assert!(scheduler.enqueue(id, counting_job(&counter)));
        assert_eq!(scheduler.pending(), 1);
    }
}
