//! Concurrency behaviour of `Lazy` and `ThreadPool` under contention.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use hdrv_core::Error;
use hdrv_task::{Lazy, Shared, ThreadPool};

fn slow_counter(pool: ThreadPool, runs: Arc<AtomicUsize>) -> Arc<Lazy<Arc<Vec<f32>>>> {
    Arc::new(Lazy::new(pool, move |_| {
        let runs = Arc::clone(&runs);
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            Ok(Arc::new(vec![0.25; 1024]))
        }
    }))
}

#[test]
fn concurrent_compute_runs_once() {
    let pool = ThreadPool::new(4).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let lazy = slow_counter(pool, Arc::clone(&runs));

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<Shared<Arc<Vec<f32>>>> = (0..8)
        .map(|_| {
            let lazy = Arc::clone(&lazy);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                lazy.compute(0)
            })
        })
        .map(|h| h.join().unwrap())
        .collect();

    let values: Vec<_> = handles.iter().map(|h| h.wait().unwrap()).collect();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(lazy.computation_count(), 1);
    for value in &values[1..] {
        assert!(Arc::ptr_eq(value, &values[0]));
    }
}

#[test]
fn invalidate_then_compute_runs_once_more() {
    let pool = ThreadPool::new(2).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let lazy = slow_counter(pool, Arc::clone(&runs));

    lazy.compute(0).wait().unwrap();
    lazy.invalidate();
    assert!(!lazy.is_ready());

    let a = lazy.compute(0);
    let b = lazy.compute(0);
    assert!(a.ptr_eq(&b));
    a.wait().unwrap();
    b.wait().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn failure_reaches_every_awaiter() {
    let pool = ThreadPool::new(2).unwrap();
    let lazy: Lazy<u8> = Lazy::new(pool, |_| async {
        thread::sleep(Duration::from_millis(10));
        Err(Error::channel_mismatch("reference has no RGB group"))
    });

    let awaiters: Vec<_> = (0..4).map(|_| lazy.compute(0)).collect();
    for awaiter in &awaiters {
        let err = awaiter.wait().unwrap_err();
        assert!(matches!(err, Error::ChannelMismatch(_)));
    }
    assert_eq!(lazy.computation_count(), 1);
}

#[test]
fn panic_fails_every_awaiter_then_recomputes() {
    let pool = ThreadPool::new(2).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let lazy: Lazy<u32> = Lazy::new(pool, move |_| {
        let run = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if run == 0 {
                thread::sleep(Duration::from_millis(10));
                panic!("histogram bucket out of range");
            }
            Ok(7)
        }
    });

    let awaiters: Vec<_> = (0..4).map(|_| lazy.compute(0)).collect();
    for awaiter in &awaiters[1..] {
        assert!(awaiter.ptr_eq(&awaiters[0]));
    }
    for awaiter in &awaiters {
        assert!(awaiter.wait().unwrap_err().is_computation_failure());
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    assert_eq!(lazy.compute(0).wait().unwrap(), 7);
    assert!(lazy.is_ready());
    assert_eq!(lazy.computation_count(), 2);
}

#[test]
fn tasks_awaiting_lazy_values_on_the_pool() {
    let pool = ThreadPool::new(1).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let lazy = slow_counter(pool.clone(), Arc::clone(&runs));

    // Consumers scheduled on the pool await the lazy value rather than block.
    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let lazy = Arc::clone(&lazy);
            pool.spawn(1, async move {
                let data = lazy.compute(0).await?;
                Ok(data.iter().sum::<f32>())
            })
        })
        .collect();

    for consumer in consumers {
        assert_eq!(consumer.wait().unwrap(), 256.0);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
