//! Awaitable results of background work.
//!
//! Every handle in this module points at one shared completion slot:
//!
//! - [`Promise`] - Write side, fulfilled exactly once by the producer
//! - [`Task`] - Single-consumer read side, yields the result by value
//! - [`Shared`] - Cloneable read side, yields a clone of the result to every
//!   awaiter
//!
//! A promise that is dropped without being fulfilled completes its task with
//! [`Error::ComputationFailure`]. That covers producers that panic, return
//! early, or are discarded when the pool shuts down.
//!
//! # Example
//!
//! ```rust
//! use hdrv_task::Task;
//!
//! let (promise, task) = Task::<u32>::pending();
//! std::thread::spawn(move || promise.fulfill(Ok(42)));
//! assert_eq!(task.wait().unwrap(), 42);
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use hdrv_core::{Error, Result};

/// Locks a mutex, recovering the data if a holder panicked.
///
/// Task bodies run under `catch_unwind`, so poisoning only ever means a
/// producer died mid-update; the slot itself is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Completion slot
// ============================================================================

struct Slot<T> {
    result: Option<Result<T>>,
    done: bool,
    wakers: Vec<Waker>,
}

struct Completion<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Completion<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                result: None,
                done: false,
                wakers: Vec::new(),
            }),
            ready: Condvar::new(),
        })
    }

    fn completed(result: Result<T>) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                result: Some(result),
                done: true,
                wakers: Vec::new(),
            }),
            ready: Condvar::new(),
        })
    }

    fn complete(&self, result: Result<T>) {
        let wakers = {
            let mut slot = lock(&self.slot);
            if slot.done {
                return;
            }
            slot.result = Some(result);
            slot.done = true;
            std::mem::take(&mut slot.wakers)
        };
        self.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    fn is_done(&self) -> bool {
        lock(&self.slot).done
    }

    /// Blocks until the slot is completed and returns the guard.
    fn wait_done(&self) -> MutexGuard<'_, Slot<T>> {
        let mut slot = lock(&self.slot);
        while !slot.done {
            slot = self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
        slot
    }
}

impl<T> Slot<T> {
    fn register(&mut self, waker: &Waker) {
        if !self.wakers.iter().any(|w| w.will_wake(waker)) {
            self.wakers.push(waker.clone());
        }
    }

    fn take(&mut self) -> Result<T> {
        self.result.take().unwrap_or_else(taken)
    }
}

fn taken<T>() -> Result<T> {
    Err(Error::computation("task result was already taken"))
}

// ============================================================================
// Promise
// ============================================================================

/// Write side of a [`Task`].
pub struct Promise<T> {
    completion: Option<Arc<Completion<T>>>,
}

impl<T> Promise<T> {
    /// Completes the task, waking every awaiter.
    pub fn fulfill(mut self, result: Result<T>) {
        if let Some(completion) = self.completion.take() {
            completion.complete(result);
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.complete(Err(Error::computation(
                "task was abandoned before producing a result",
            )));
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

// ============================================================================
// Task
// ============================================================================

/// Handle to a result that becomes available later.
///
/// Await it from inside another task, poll it with [`Task::try_take`] from a
/// UI loop, or block on it with [`Task::wait`] from a thread that is not a
/// pool worker.
#[must_use = "a task does nothing unless awaited or polled"]
pub struct Task<T> {
    completion: Arc<Completion<T>>,
}

impl<T> Task<T> {
    /// Creates a connected promise/task pair.
    pub fn pending() -> (Promise<T>, Task<T>) {
        let completion = Completion::new();
        (
            Promise {
                completion: Some(Arc::clone(&completion)),
            },
            Task { completion },
        )
    }

    /// A task that is already complete with `value`.
    pub fn ready(value: T) -> Self {
        Self::from_result(Ok(value))
    }

    /// A task that has already failed with `err`.
    pub fn failed(err: Error) -> Self {
        Self::from_result(Err(err))
    }

    /// A task that is already complete with `result`.
    pub fn from_result(result: Result<T>) -> Self {
        Self {
            completion: Completion::completed(result),
        }
    }

    /// Whether the result is available.
    pub fn is_ready(&self) -> bool {
        self.completion.is_done()
    }

    /// Takes the result if it is available.
    ///
    /// Returns `None` while the task is still running. After a result has
    /// been returned, later calls yield a [`Error::ComputationFailure`].
    pub fn try_take(&mut self) -> Option<Result<T>> {
        let mut slot = lock(&self.completion.slot);
        if slot.done {
            Some(slot.take())
        } else {
            None
        }
    }

    /// Blocks the calling thread until the result is available.
    ///
    /// Do not call this from a pool worker: the work it waits for may be
    /// queued behind the blocked worker. Await the task instead.
    pub fn wait(self) -> Result<T> {
        self.completion.wait_done().take()
    }

    /// Converts into a cloneable handle.
    pub fn shared(self) -> Shared<T>
    where
        T: Clone,
    {
        Shared {
            completion: self.completion,
        }
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.completion.slot);
        if slot.done {
            Poll::Ready(slot.take())
        } else {
            slot.register(cx.waker());
            Poll::Pending
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("ready", &self.is_ready()).finish()
    }
}

// ============================================================================
// Shared
// ============================================================================

/// Cloneable handle to a result that many consumers await.
///
/// Every clone observes the same outcome: all of them resolve to the value,
/// or all of them resolve to the same error.
#[must_use = "a shared task does nothing unless awaited or polled"]
pub struct Shared<T> {
    completion: Arc<Completion<T>>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            completion: Arc::clone(&self.completion),
        }
    }
}

impl<T: Clone> Shared<T> {
    /// A handle that is already complete with `value`.
    pub fn ready(value: T) -> Self {
        Self {
            completion: Completion::completed(Ok(value)),
        }
    }

    /// A handle that has already failed with `err`.
    pub fn failed(err: Error) -> Self {
        Self {
            completion: Completion::completed(Err(err)),
        }
    }

    /// Whether the result is available.
    pub fn is_ready(&self) -> bool {
        self.completion.is_done()
    }

    /// A clone of the result if it is available.
    pub fn peek(&self) -> Option<Result<T>> {
        let slot = lock(&self.completion.slot);
        if !slot.done {
            return None;
        }
        Some(slot.result.clone().unwrap_or_else(taken))
    }

    /// Blocks until the result is available and returns a clone of it.
    ///
    /// Same caveat as [`Task::wait`]: never call this on a pool worker.
    pub fn wait(&self) -> Result<T> {
        self.completion.wait_done().result.clone().unwrap_or_else(taken)
    }

    /// Whether two handles refer to the same computation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.completion, &other.completion)
    }
}

impl<T: Clone> Future for Shared<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.completion.slot);
        if slot.done {
            Poll::Ready(slot.result.clone().unwrap_or_else(taken))
        } else {
            slot.register(cx.waker());
            Poll::Pending
        }
    }
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("ready", &self.completion.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_ready_task() {
        let mut task = Task::ready(7);
        assert!(task.is_ready());
        assert_eq!(task.try_take().unwrap().unwrap(), 7);
        assert!(task.try_take().unwrap().unwrap_err().is_computation_failure());
    }

    #[test]
    fn test_pending_until_fulfilled() {
        let (promise, mut task) = Task::<&str>::pending();
        assert!(!task.is_ready());
        assert!(task.try_take().is_none());
        promise.fulfill(Ok("done"));
        assert_eq!(task.try_take().unwrap().unwrap(), "done");
    }

    #[test]
    fn test_dropped_promise_fails_task() {
        let (promise, task) = Task::<u8>::pending();
        drop(promise);
        let err = task.wait().unwrap_err();
        assert!(err.is_computation_failure());
    }

    #[test]
    fn test_wait_across_threads() {
        let (promise, task) = Task::pending();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.fulfill(Ok(vec![1, 2, 3]));
        });
        assert_eq!(task.wait().unwrap(), vec![1, 2, 3]);
        producer.join().unwrap();
    }

    #[test]
    fn test_shared_fans_out_errors() {
        let (promise, task) = Task::<u32>::pending();
        let a = task.shared();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(a.peek().is_none());
        promise.fulfill(Err(Error::invalid_config("boom")));
        assert!(a.wait().is_err());
        assert!(b.wait().is_err());
        assert_eq!(
            a.peek().unwrap().unwrap_err().to_string(),
            b.peek().unwrap().unwrap_err().to_string()
        );
    }

    #[test]
    fn test_shared_clones_value() {
        let shared = Shared::ready(String::from("hdr"));
        assert_eq!(shared.wait().unwrap(), "hdr");
        assert_eq!(shared.wait().unwrap(), "hdr");
    }
}
