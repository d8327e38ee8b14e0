//! A non-blocking TCP reactor: a connection state machine with a scatter/gather send
//! path, a listening acceptor, and an elastic compute thread pool with a
//! future/promise interface for offloading blocking work off the reactor thread.
//!
//! An embedder builds an [`reactor::EventLoop`], binds an [`Acceptor`] on it, wires
//! [`connection::Callbacks`] onto each accepted [`Connection`], and optionally keeps a
//! [`pool::ThreadPool`] around for work that should not run on the loop thread.

pub mod acceptor;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod reactor;
pub mod send_buffer;

pub use acceptor::{Acceptor, OnAccept};
pub use config::{AcceptorConfig, ConnectionConfig, ThreadPoolConfig};
pub use connection::{Callbacks, Connection, ShutdownKind, State};
pub use error::{PanicPayload, ReactorError, Try};
pub use pool::{Future, Promise, ThreadPool};
pub use reactor::{EventLoop, Handle, Interest, Registrar, Remote};
