//! `Future<T>`/`Promise<T>`: a one-shot, mutex/condvar-backed result channel. Rust's
//! `std::thread::Result<T>` (`Result<T, Box<dyn Any + Send>>`) is exactly the `Try<T>`
//! the source built by hand, so it is reused rather than reinvented (see
//! `crate::error::Try`).

use std::sync::{Arc, Condvar, Mutex};

use crate::error::{PanicPayload, Try};

enum Slot<T> {
    Empty,
    Value(Try<T>),
    Continuation(Box<dyn FnOnce(Try<T>) + Send>),
    Done,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// The producer half. Dropping a `Promise` without calling `set_value`/`set_exception`
/// completes its `Future` with a broken-promise panic payload, so a waiting
/// continuation is never left hanging.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
    fulfilled: bool,
}

/// The consumer half. One-shot: `wait()` or `then()` consumes it. Cloning is not
/// offered — a single continuation is the documented contract.
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

pub fn channel<T: Send + 'static>() -> (Promise<T>, Future<T>) {
    let shared = Arc::new(Shared { slot: Mutex::new(Slot::Empty), ready: Condvar::new() });
    (Promise { shared: shared.clone(), fulfilled: false }, Future { shared })
}

impl<T: Send + 'static> Promise<T> {
    pub fn set_value(mut self, value: T) {
        self.complete(Ok(value));
        self.fulfilled = true;
    }

    pub fn set_exception(mut self, payload: PanicPayload) {
        self.complete(Err(payload));
        self.fulfilled = true;
    }

    fn complete(&self, result: Try<T>) {
        let mut slot = self.shared.slot.lock().unwrap();
        let prior = std::mem::replace(&mut *slot, Slot::Done);
        match prior {
            Slot::Continuation(cont) => {
                drop(slot);
                cont(result);
            }
            Slot::Empty => {
                *slot = Slot::Value(result);
                drop(slot);
                self.shared.ready.notify_all();
            }
            Slot::Value(_) | Slot::Done => {
                unreachable!("a promise's shared state was completed twice");
            }
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if self.fulfilled {
            return;
        }
        let mut slot = self.shared.slot.lock().unwrap();
        if matches!(*slot, Slot::Empty | Slot::Continuation(_)) {
            let prior = std::mem::replace(&mut *slot, Slot::Done);
            let broken = PanicPayload(Box::new("broken promise: dropped without a value"));
            if let Slot::Continuation(cont) = prior {
                drop(slot);
                cont(Err(broken));
            } else {
                *slot = Slot::Value(Err(broken));
                drop(slot);
                self.shared.ready.notify_all();
            }
        }
    }
}

impl<T: Send + 'static> Future<T> {
    /// Blocks the calling thread until the promise completes, returning its `Try<T>`
    /// directly. Additive relative to `Then`: the non-blocking composition path below
    /// still exists for callers who do not want to block.
    pub fn wait(self) -> Try<T> {
        let mut slot = self.shared.slot.lock().unwrap();
        loop {
            match std::mem::replace(&mut *slot, Slot::Done) {
                Slot::Value(v) => return v,
                Slot::Empty => {
                    *slot = Slot::Empty;
                    slot = self.shared.ready.wait(slot).unwrap();
                }
                Slot::Continuation(_) => unreachable!("wait() and then() both consume the Future"),
                Slot::Done => unreachable!("a Future's shared state was consumed twice"),
            }
        }
    }

    /// Attaches a continuation that runs with the completed `Try<T>`, once, either
    /// immediately (if already completed) or from whichever thread calls
    /// `set_value`/`set_exception`. Returns a new `Future<U>` for `g`'s result;
    /// a panic inside `g` propagates into the returned future rather than unwinding
    /// the completing thread.
    pub fn then<U, F>(self, g: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(Try<T>) -> U + Send + 'static,
    {
        let (promise, future) = channel::<U>();
        let cont: Box<dyn FnOnce(Try<T>) + Send> = Box::new(move |t: Try<T>| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| g(t)));
            match result {
                Ok(value) => promise.set_value(value),
                Err(payload) => promise.set_exception(PanicPayload(payload)),
            }
        });

        let mut slot = self.shared.slot.lock().unwrap();
        match std::mem::replace(&mut *slot, Slot::Done) {
            Slot::Value(v) => {
                drop(slot);
                cont(v);
            }
            Slot::Empty => {
                *slot = Slot::Continuation(cont);
            }
            Slot::Continuation(_) => unreachable!("then() called twice on the same Future"),
            Slot::Done => unreachable!("a Future's shared state was consumed twice"),
        }
        future
    }
}

/// An already-completed future, for call sites that need the `Future<T>` shape but
/// have the value in hand (e.g. `ThreadPool::execute` called after shutdown).
pub fn ready<T: Send + 'static>(value: T) -> Future<T> {
    let (promise, future) = channel();
    promise.set_value(value);
    future
}
