//! Single-flight memoised values.
//!
//! A [`Lazy`] computes its value at most once per generation, however many
//! consumers ask for it concurrently. Consumers that arrive while the
//! computation runs share its [`Shared`] handle. [`Lazy::invalidate`] starts
//! a new generation; a computation from an older generation may still finish
//! and resolve its own awaiters, but it never stores its value.
//!
//! ```text
//!            compute()                 Ok(v)
//!   Empty ─────────────▶ Computing ─────────────▶ Ready(v)
//!     ▲                     │                       │
//!     └──── Err / invalidate┘◀──── invalidate ──────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use hdrv_task::{Lazy, ThreadPool};
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let answer = Lazy::new(pool, |_| async { Ok(6 * 7) });
//!
//! let first = answer.compute(0);
//! let second = answer.compute(0);
//! assert_eq!(first.wait().unwrap(), 42);
//! assert_eq!(second.wait().unwrap(), 42);
//! assert_eq!(answer.computation_count(), 1);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use hdrv_core::Result;
use tracing::trace;

use crate::pool::{BoxFuture, ThreadPool};
use crate::task::{lock, Shared};

type ComputeFn<T> = dyn Fn(i32) -> BoxFuture<Result<T>> + Send + Sync;

enum Phase<T> {
    Empty,
    Computing(Shared<T>),
    Ready { value: T, became_ready_at: Instant },
}

struct State<T> {
    generation: u64,
    phase: Phase<T>,
}

/// A value computed on the pool on first demand and cached afterwards.
pub struct Lazy<T> {
    pool: ThreadPool,
    compute: Arc<ComputeFn<T>>,
    state: Arc<Mutex<State<T>>>,
    computations: AtomicUsize,
}

impl<T: Clone + Send + 'static> Lazy<T> {
    /// Creates an empty lazy value. Nothing runs until [`Lazy::compute`].
    ///
    /// `compute` builds a fresh future per computation and receives the
    /// priority of the request that started it.
    pub fn new<F, Fut>(pool: ThreadPool, compute: F) -> Self
    where
        F: Fn(i32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let compute: Arc<ComputeFn<T>> = Arc::new(move |priority| Box::pin(compute(priority)) as BoxFuture<Result<T>>);
        Self {
            pool,
            compute,
            state: Arc::new(Mutex::new(State {
                generation: 0,
                phase: Phase::Empty,
            })),
            computations: AtomicUsize::new(0),
        }
    }

    /// Returns a handle to the value, starting the computation if needed.
    ///
    /// While a computation is in flight every caller receives the same
    /// handle. A failed computation resolves every awaiter with the error
    /// and leaves the value empty, so the next call retries.
    pub fn compute(&self, priority: i32) -> Shared<T> {
        let mut state = lock(&self.state);
        match &state.phase {
            Phase::Ready { value, .. } => return Shared::ready(value.clone()),
            // A handle that already failed belongs to an abandoned computation.
            Phase::Computing(shared) if !matches!(shared.peek(), Some(Err(_))) => return shared.clone(),
            Phase::Computing(_) | Phase::Empty => {}
        }

        let generation = state.generation;
        let computation = (self.compute)(priority);
        let cell = Arc::clone(&self.state);
        self.computations.fetch_add(1, Ordering::Relaxed);
        trace!(generation, priority, "starting lazy computation");

        // The task cannot publish before `state` is released below, so the
        // Computing phase is always installed first.
        let shared = self
            .pool
            .spawn(priority, async move {
                let mut guard = AbandonGuard {
                    cell: Arc::clone(&cell),
                    generation,
                    armed: true,
                };
                let result = computation.await;
                guard.armed = false;
                {
                    let mut state = lock(&cell);
                    if state.generation == generation {
                        state.phase = match &result {
                            Ok(value) => Phase::Ready {
                                value: value.clone(),
                                became_ready_at: Instant::now(),
                            },
                            Err(_) => Phase::Empty,
                        };
                    }
                }
                result
            })
            .shared();
        state.phase = Phase::Computing(shared.clone());
        shared
    }

    /// Discards the cached value and detaches any in-flight computation.
    pub fn invalidate(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.phase = Phase::Empty;
    }

    /// Whether a value is cached.
    pub fn is_ready(&self) -> bool {
        matches!(lock(&self.state).phase, Phase::Ready { .. })
    }

    /// Whether a computation of the current generation is running.
    pub fn is_computing(&self) -> bool {
        match &lock(&self.state).phase {
            Phase::Computing(shared) => !matches!(shared.peek(), Some(Err(_))),
            _ => false,
        }
    }

    /// The cached value, if any.
    pub fn get(&self) -> Option<T> {
        match &lock(&self.state).phase {
            Phase::Ready { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    /// When the cached value was stored.
    pub fn became_ready_at(&self) -> Option<Instant> {
        match lock(&self.state).phase {
            Phase::Ready { became_ready_at, .. } => Some(became_ready_at),
            _ => None,
        }
    }

    /// How many computations have been started so far.
    pub fn computation_count(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}

/// Puts the phase back to `Empty` when a computation is dropped before it
/// finishes, which is what happens to a future that panics.
struct AbandonGuard<T> {
    cell: Arc<Mutex<State<T>>>,
    generation: u64,
    armed: bool,
}

impl<T> Drop for AbandonGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(&self.cell);
        if state.generation == self.generation && matches!(state.phase, Phase::Computing(_)) {
            trace!(generation = self.generation, "lazy computation abandoned");
            state.phase = Phase::Empty;
        }
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        let phase = match state.phase {
            Phase::Empty => "empty",
            Phase::Computing(_) => "computing",
            Phase::Ready { .. } => "ready",
        };
        f.debug_struct("Lazy")
            .field("generation", &state.generation)
            .field("phase", &phase)
            .finish_non_exhaustive()
    }
}
