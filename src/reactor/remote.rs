use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

use mio::Waker;

/// A cross-thread-safe submission handle to a loop, decoupled from the loop object
/// itself (`EventLoop` holds `Rc<dyn Handle>` internally and so is `!Send`).
///
/// This is the piece of the design that has no analogue in the C++ source: there, a
/// `shared_ptr<EventLoop>` can simply be handed to another thread and `Execute` relied
/// on an internal mutex for safety. Rust's `Send` bound means the *whole* loop can't
/// cross threads just because one method is internally synchronized — so the
/// thread-safe slice of an `EventLoop` (the task queue and the waker) is split into its
/// own small `Clone` type. `Connection::safe_send` holds one of these instead of a
/// second reference to the loop.
#[derive(Clone)]
pub struct Remote {
    pub(super) tasks: Arc<Mutex<Vec<RemoteTask>>>,
    pub(super) waker: Arc<Waker>,
}

pub(super) enum RemoteTask {
    Exec(Box<dyn FnOnce() + Send>),
    SendBytes { fd: RawFd, data: Vec<u8> },
}

impl Remote {
    /// Enqueues an arbitrary task to run on the owning loop's thread.
    pub fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        self.tasks.lock().unwrap().push(RemoteTask::Exec(task));
        let _ = self.waker.wake();
    }

    /// Enqueues a byte payload for delivery to the connection identified by `fd`. The
    /// owning loop looks the handle up by `fd` when it drains the queue, so no
    /// `!Send` connection reference needs to cross the thread boundary.
    pub fn send_bytes(&self, fd: RawFd, data: Vec<u8>) {
        self.tasks.lock().unwrap().push(RemoteTask::SendBytes { fd, data });
        let _ = self.waker.wake();
    }
}
