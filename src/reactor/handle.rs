use std::io;
use std::os::unix::io::RawFd;

use mio::Registry;

/// The capability set any object registered with a loop must satisfy — `Connection`
/// and `Acceptor` are the only two implementors. Mirrors the polymorphic handle the
/// C++ `EventLoop` dispatches to (`Identifier`, `HandleReadEvent`, `HandleWriteEvent`,
/// `HandleErrorEvent` in the original source).
///
/// Handles are stored as `Rc<dyn Handle>` inside the loop: registration is confined to
/// a single OS thread (see `Registrar::in_this_loop`), so there is no need for `Arc`
/// here — only `Registrar::execute` crosses threads, and it moves data rather than a
/// handle reference.
pub trait Handle {
    /// The fd identifying this handle within its loop.
    fn identifier(&self) -> RawFd;

    /// A readable edge fired. Returns `false` to request unregistration and disposal.
    fn handle_read_event(&self) -> bool;

    /// A writable edge fired. Returns `false` to request unregistration and disposal.
    fn handle_write_event(&self) -> bool;

    /// An error edge fired (including the loop's own teardown path). Terminal: the
    /// loop removes the handle immediately afterward regardless of return value.
    fn handle_error_event(&self);

    /// Registers this handle's underlying source with `registry` for `interest`.
    /// Implementations own the concrete `mio` source type and are the only code that
    /// needs to know it.
    fn register_source(
        &self,
        registry: &Registry,
        token: mio::Token,
        interest: mio::Interest,
    ) -> io::Result<()>;

    /// Replaces the registered interest for this handle's source.
    fn reregister_source(
        &self,
        registry: &Registry,
        token: mio::Token,
        interest: mio::Interest,
    ) -> io::Result<()>;

    /// Removes this handle's source from `registry`.
    fn deregister_source(&self, registry: &Registry) -> io::Result<()>;

    /// Delivers a byte payload submitted cross-thread via `Connection::safe_send`.
    /// Only `Connection` overrides this; `Acceptor` has no use for it.
    fn deliver_bytes(&self, _data: Vec<u8>) {}
}
