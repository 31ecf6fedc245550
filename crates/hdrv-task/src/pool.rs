//! Priority thread pool driving boxed futures.
//!
//! Jobs wait in a single priority queue; higher priorities run first and
//! jobs of equal priority run in submission order. A job is a future: when
//! it awaits a [`Task`] that is not ready yet the worker moves on, and the
//! job re-enters the queue once its waker fires. Workers therefore never
//! block on each other, which keeps nested fan-out/fan-in deadlock-free.
//!
//! # Example
//!
//! ```rust
//! use hdrv_task::ThreadPool;
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let squares = pool.parallel_map(10, 0, |i| i * i);
//! let sum = pool.spawn(0, async move {
//!     let squares = squares.await?;
//!     Ok(squares.iter().sum::<usize>())
//! });
//! assert_eq!(sum.wait().unwrap(), 285);
//! ```

use std::cell::Cell;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::future::Future;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError, Weak};
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, JoinHandle};

use hdrv_core::Result;
use tracing::{debug, trace, warn};

use crate::task::{lock, Task};

/// A boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Smallest number of elements a [`ThreadPool::map_chunks`] chunk covers.
pub const MIN_CHUNK_LEN: usize = 4096;

/// Chunks queued per worker by [`ThreadPool::map_chunks`].
const CHUNKS_PER_WORKER: usize = 4;

thread_local! {
    static IS_WORKER: Cell<bool> = const { Cell::new(false) };
}

// ============================================================================
// Runnable
// ============================================================================

struct Runnable {
    future: Mutex<Option<BoxFuture<()>>>,
    priority: i32,
    scheduled: AtomicBool,
    queue: Weak<Queue>,
}

impl Runnable {
    fn schedule(self: Arc<Self>) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(queue) = self.queue.upgrade() {
            queue.push(self);
        }
    }

    fn run(self: Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);
        let waker = Waker::from(Arc::clone(&self));
        let mut cx = Context::from_waker(&waker);

        let mut slot = lock(&self.future);
        let Some(future) = slot.as_mut() else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => {}
            Ok(Poll::Ready(())) => *slot = None,
            Err(_) => {
                warn!(priority = self.priority, "task panicked, dropping it");
                *slot = None;
            }
        }
    }
}

impl Wake for Runnable {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Arc::clone(self).schedule();
    }
}

// ============================================================================
// Queue
// ============================================================================

struct Job {
    priority: i32,
    seq: u64,
    runnable: Arc<Runnable>,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    // Max-heap: higher priority first, then lower sequence number first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Job>,
    next_seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Queue {
    fn push(&self, runnable: Arc<Runnable>) {
        let mut state = lock(&self.state);
        if state.shutdown {
            // Dropped after the guard is released: dropping the future may
            // wake other runnables, which re-enter push().
            drop(state);
            drop(runnable);
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Job {
            priority: runnable.priority,
            seq,
            runnable,
        });
        drop(state);
        self.available.notify_one();
    }

    fn pop(&self) -> Option<Arc<Runnable>> {
        let mut state = lock(&self.state);
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(job) = state.heap.pop() {
                return Some(job.runnable);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn len(&self) -> usize {
        lock(&self.state).heap.len()
    }

    fn shutdown(&self) {
        let pending = {
            let mut state = lock(&self.state);
            state.shutdown = true;
            std::mem::take(&mut state.heap)
        };
        self.available.notify_all();
        if !pending.is_empty() {
            debug!(count = pending.len(), "discarding queued tasks on shutdown");
        }
        drop(pending);
    }
}

fn worker_loop(queue: Arc<Queue>) {
    IS_WORKER.with(|flag| flag.set(true));
    while let Some(runnable) = queue.pop() {
        runnable.run();
    }
    trace!("worker exiting");
}

// ============================================================================
// ThreadPool
// ============================================================================

struct PoolInner {
    queue: Arc<Queue>,
    workers: Vec<JoinHandle<()>>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.queue.shutdown();
        // A worker that drops the last handle cannot join its siblings: one of
        // them may be waiting on a future lock the dropping worker holds.
        if IS_WORKER.with(Cell::get) {
            return;
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Cheaply cloneable handle to a priority worker pool.
///
/// The pool shuts down when the last handle is dropped. Tasks still queued
/// at that point fail with a computation error.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// Starts a pool with `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Result<Self> {
        let num_threads = num_threads.max(1);
        let queue = Arc::new(Queue::default());
        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let worker_queue = Arc::clone(&queue);
            let handle = thread::Builder::new()
                .name(format!("hdrv-worker-{i}"))
                .spawn(move || worker_loop(worker_queue));
            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    queue.shutdown();
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e.into());
                }
            }
        }
        debug!(num_threads, "started thread pool");
        Ok(Self {
            inner: Arc::new(PoolInner { queue, workers }),
        })
    }

    /// Pool sized to the machine's available parallelism.
    pub fn with_default_threads() -> Result<Self> {
        Self::new(default_num_threads())
    }

    /// Process-wide pool, started on first use.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to start any worker thread,
    /// the same way [`std::thread::spawn`] does.
    pub fn global() -> &'static ThreadPool {
        static GLOBAL: OnceLock<ThreadPool> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            Self::with_default_threads()
                .unwrap_or_else(|e| panic!("failed to start the global thread pool: {e}"))
        })
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.inner.workers.len()
    }

    /// Number of jobs waiting to run.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// Schedules `future` at `priority` and returns a handle to its result.
    ///
    /// A panic inside the future fails the task with a computation error.
    pub fn spawn<T, F>(&self, priority: i32, future: F) -> Task<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (promise, task) = Task::pending();
        self.spawn_detached(priority, async move {
            promise.fulfill(future.await);
        });
        task
    }

    /// Schedules a future whose output nobody observes.
    pub fn spawn_detached<F>(&self, priority: i32, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runnable = Arc::new(Runnable {
            future: Mutex::new(Some(Box::pin(future))),
            priority,
            scheduled: AtomicBool::new(false),
            queue: Arc::downgrade(&self.inner.queue),
        });
        runnable.schedule();
    }

    /// Splits `0..len` into contiguous ranges and runs `f` on each in
    /// parallel. Results come back in range order.
    ///
    /// Chunks are never shorter than [`MIN_CHUNK_LEN`] elements (except the
    /// only chunk of a short input), so small inputs run as a single job.
    pub fn map_chunks<R, F>(&self, len: usize, priority: i32, f: F) -> Task<Vec<R>>
    where
        R: Send + 'static,
        F: Fn(Range<usize>) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let chunks: Vec<Task<R>> = chunk_ranges(len, self.num_threads())
            .into_iter()
            .map(|range| {
                let f = Arc::clone(&f);
                self.spawn(priority, async move { Ok(f(range)) })
            })
            .collect();

        self.spawn(priority, async move {
            let mut results = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                results.push(chunk.await?);
            }
            Ok(results)
        })
    }

    /// Evaluates `f(i)` for every `i` in `0..len` in parallel.
    pub fn parallel_map<T, F>(&self, len: usize, priority: i32, f: F) -> Task<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        let chunks = self.map_chunks(len, priority, move |range| range.map(&f).collect::<Vec<T>>());
        self.spawn(priority, async move {
            let mut out = Vec::with_capacity(len);
            for chunk in chunks.await? {
                out.extend(chunk);
            }
            Ok(out)
        })
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.num_threads())
            .field("queued", &self.queued())
            .finish()
    }
}

/// Worker count used when none is configured.
pub fn default_num_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

fn chunk_ranges(len: usize, num_threads: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let max_chunks = (num_threads * CHUNKS_PER_WORKER).max(1);
    let num_chunks = len.div_ceil(MIN_CHUNK_LEN).clamp(1, max_chunks);
    let chunk_len = len.div_ceil(num_chunks);
    (0..len)
        .step_by(chunk_len)
        .map(|start| start..(start + chunk_len).min(len))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_chunk_ranges_cover_input() {
        assert!(chunk_ranges(0, 4).is_empty());
        assert_eq!(chunk_ranges(10, 4), vec![0..10]);

        let ranges = chunk_ranges(100_000, 4);
        assert!(ranges.len() <= 16);
        assert_eq!(ranges.first().unwrap().start, 0);
        assert_eq!(ranges.last().unwrap().end, 100_000);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(ranges.iter().all(|r| r.len() >= MIN_CHUNK_LEN));
    }

    #[test]
    fn test_spawn_returns_value() {
        let pool = ThreadPool::new(2).unwrap();
        let task = pool.spawn(0, async { Ok(6 * 7) });
        assert_eq!(task.wait().unwrap(), 42);
    }

    #[test]
    fn test_higher_priority_runs_first() {
        let pool = ThreadPool::new(1).unwrap();

        // Park the only worker until every job below is queued.
        let (release, gate) = mpsc::channel::<()>();
        let blocker = pool.spawn(100, async move {
            let _ = gate.recv();
            Ok(())
        });

        let order = Arc::new(Mutex::new(Vec::new()));
        let tasks: Vec<_> = [(1, "low"), (5, "high"), (1, "low-later"), (3, "mid")]
            .into_iter()
            .map(|(priority, name)| {
                let order = Arc::clone(&order);
                pool.spawn(priority, async move {
                    order.lock().unwrap().push(name);
                    Ok(())
                })
            })
            .collect();

        release.send(()).unwrap();
        blocker.wait().unwrap();
        for task in tasks {
            task.wait().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec!["high", "mid", "low", "low-later"]);
    }

    #[test]
    fn test_panic_becomes_computation_failure() {
        let pool = ThreadPool::new(1).unwrap();
        let task = pool.spawn(0, async {
            let samples: Vec<u32> = Vec::new();
            Ok(samples[3])
        });
        assert!(task.wait().unwrap_err().is_computation_failure());

        // The worker survives the panic.
        assert_eq!(pool.spawn(0, async { Ok(1) }).wait().unwrap(), 1);
    }

    #[test]
    fn test_nested_awaits_on_single_worker() {
        let pool = ThreadPool::new(1).unwrap();
        let inner_pool = pool.clone();
        let outer = pool.spawn(0, async move {
            let a = inner_pool.spawn(0, async { Ok(20) });
            let b = inner_pool.spawn(0, async { Ok(22) });
            Ok(a.await? + b.await?)
        });
        assert_eq!(outer.wait().unwrap(), 42);
    }

    #[test]
    fn test_parallel_map_preserves_order() {
        let pool = ThreadPool::new(4).unwrap();
        let len = 3 * MIN_CHUNK_LEN + 17;
        let values = pool.parallel_map(len, 0, |i| i as u64 * 2).wait().unwrap();
        assert_eq!(values.len(), len);
        assert!(values.iter().enumerate().all(|(i, &v)| v == i as u64 * 2));
    }

    #[test]
    fn test_map_chunks_empty_input() {
        let pool = ThreadPool::new(2).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let chunks = pool
            .map_chunks(0, 0, move |_| counter.fetch_add(1, Ordering::SeqCst))
            .wait()
            .unwrap();
        assert!(chunks.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_queued_tasks_fail_when_pool_dropped() {
        let pool = ThreadPool::new(1).unwrap();
        let (started_tx, started) = mpsc::channel::<()>();
        let (release, gate) = mpsc::channel::<()>();
        let blocker = pool.spawn(0, async move {
            let _ = started_tx.send(());
            let _ = gate.recv_timeout(Duration::from_secs(5));
            Ok(())
        });
        let queued = pool.spawn(0, async { Ok(()) });
        started.recv().unwrap();

        let dropper = thread::spawn(move || drop(pool));
        thread::sleep(Duration::from_millis(50));
        release.send(()).unwrap();
        dropper.join().unwrap();

        blocker.wait().unwrap();
        assert!(queued.wait().unwrap_err().is_computation_failure());
    }
}
