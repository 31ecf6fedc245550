//! # hdrv-task
//!
//! Background execution for the hdrv viewer.
//!
//! - [`ThreadPool`] - Priority queue of futures served by worker threads
//! - [`Task`] / [`Promise`] - One-shot result handle and its write side
//! - [`Shared`] - Cloneable result handle for many awaiters
//! - [`Lazy`] - Single-flight memoised value with generation-based
//!   invalidation
//!
//! Work scheduled on the pool is written as ordinary `async` blocks. A job
//! that awaits an unfinished [`Task`] yields its worker instead of blocking
//! it, so image decoding can fan out into chunks and fan back in on any
//! number of workers, including one.
//!
//! ```rust
//! use hdrv_task::ThreadPool;
//!
//! let pool = ThreadPool::new(1).unwrap();
//! let inner = pool.clone();
//! let total = pool.spawn(0, async move {
//!     let parts = inner.map_chunks(10_000, 0, |range| range.len());
//!     Ok(parts.await?.into_iter().sum::<usize>())
//! });
//! assert_eq!(total.wait().unwrap(), 10_000);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod lazy;
pub mod pool;
pub mod task;

pub use lazy::Lazy;
pub use pool::{default_num_threads, BoxFuture, ThreadPool, MIN_CHUNK_LEN};
pub use task::{Promise, Shared, Task};
