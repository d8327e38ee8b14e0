use std::os::unix::io::RawFd;
use std::rc::Rc;

use super::{Handle, Interest, Remote};
use crate::error::ReactorError;

/// The abstract registrar contract from the spec (§4.1): the only boundary between
/// the core and OS-level readiness polling. `EventLoop` is the one concrete, `mio`-backed
/// implementation shipped in this crate; `Connection` and `Acceptor` are written
/// against this trait, not against `EventLoop` directly, so a unit test can swap in a
/// fake registrar and drive the state machine without touching a real socket.
pub trait Registrar {
    /// Installs `handle` for delivery of events in `interest`. Fails if the registrar
    /// rejected it (e.g. its underlying source registration failed).
    fn register(&self, interest: Interest, handle: Rc<dyn Handle>) -> Result<(), ReactorError>;

    /// Replaces the registered mask for the handle identified by `fd`. Fails if `fd`
    /// is not currently registered.
    fn modify(&self, interest: Interest, fd: RawFd) -> Result<(), ReactorError>;

    /// Removes interest for `fd`. The handle may still see its current in-flight
    /// callback complete; removal only prevents *future* dispatch.
    fn unregister(&self, fd: RawFd);

    /// Enqueues `task` to run on the loop's own thread. Thread-safe; FIFO per
    /// submitting thread.
    fn execute(&self, task: Box<dyn FnOnce() + Send>);

    /// True iff the caller is executing on this registrar's own thread.
    fn in_this_loop(&self) -> bool;

    /// A `Send + Sync` submission handle, for code that holds this registrar from
    /// another thread and cannot call `execute` on it directly (the registrar itself
    /// is confined to its owning thread; see `Remote`'s docs).
    fn remote(&self) -> Remote;
}
