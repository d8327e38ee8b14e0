//! One listening endpoint. `Acceptor` itself never decides which loop a newly accepted
//! connection ends up on — that is the "top-level application object" the purpose
//! section excludes — it just drives accept() to exhaustion on each read-edge and
//! hands each accepted stream to an injected collaborator.

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;

use log::{error, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Registry, Token};
use socket2::{Domain, Socket, Type};

use crate::config::{AcceptorConfig, ConnectionConfig};
use crate::error::ReactorError;
use crate::reactor::{Handle, Interest, Registrar};

/// Kernel send/receive buffer sizes applied to every listening socket, mirroring
/// `SetRcvBuf`/`SetSndBuf` in `examples/original_source/ananas/net/Acceptor.cc`. The
/// original leaves the exact size to a platform default; 256 KiB is a generous floor
/// for a TCP reactor that expects bursty, batched traffic.
const SOCKET_BUFFER_SIZE: usize = 256 * 1024;

/// Invoked once per accepted connection, on the acceptor's own loop thread, with the
/// raw stream, its peer address, and the per-connection tunables the acceptor was
/// configured with. The application's round-robin collaborator from §1's scope list
/// lives here: single-loop setups just register on `self`'s loop, multi-loop setups
/// dispatch the stream to whichever loop they pick.
pub type OnAccept = Box<dyn Fn(TcpStream, SocketAddr, &ConnectionConfig)>;

pub struct Acceptor {
    fd: RawFd,
    listener: std::cell::RefCell<TcpListener>,
    loop_: Rc<dyn Registrar>,
    connection_config: ConnectionConfig,
    on_accept: OnAccept,
}

impl Acceptor {
    /// Binds `addr` with `SO_REUSEADDR`, non-blocking mode, and the configured
    /// backlog, then wraps the result for registration with `loop_`. `on_accept` is
    /// called for every accepted connection before this returns.
    pub fn bind(
        addr: SocketAddr,
        loop_: Rc<dyn Registrar>,
        config: &AcceptorConfig,
        on_accept: OnAccept,
    ) -> io::Result<Rc<Acceptor>> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.set_nodelay(true)?;
        socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
        socket.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
        socket.bind(&addr.into())?;
        socket.listen(config.listen_backlog)?;

        let listener = TcpListener::from_std(socket.into());
        let fd = listener.as_raw_fd();

        Ok(Rc::new(Acceptor {
            fd,
            listener: std::cell::RefCell::new(listener),
            loop_,
            connection_config: config.connection,
            on_accept,
        }))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.borrow().local_addr()
    }

    /// Registers for read-edge delivery. Call once, after `bind`.
    pub fn register_with_loop(acceptor: &Rc<Acceptor>) -> Result<(), ReactorError> {
        acceptor.loop_.register(Interest::Read, acceptor.clone())
    }
}

impl Handle for Acceptor {
    fn identifier(&self) -> RawFd {
        self.fd
    }

    fn handle_read_event(&self) -> bool {
        loop {
            let accepted = self.listener.borrow_mut().accept();
            match accepted {
                Ok((stream, peer)) => {
                    (self.on_accept)(stream, peer, &self.connection_config);
                }
                Err(e) => match e.kind() {
                    io::ErrorKind::WouldBlock => return true,
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::ConnectionAborted => continue,
                    _ => match e.raw_os_error() {
                        Some(libc_errno) if is_resource_exhaustion(libc_errno) => {
                            warn!("acceptor fd={} accept resource exhaustion: {}", self.fd, e);
                            return true;
                        }
                        Some(libc_errno) if is_protocol_retry(libc_errno) => continue,
                        _ => {
                            error!("acceptor fd={} accept returned a bug-class error: {}", self.fd, e);
                            debug_assert!(
                                false,
                                "accept() returned a programmer-error errno: {}",
                                e
                            );
                            return true;
                        }
                    },
                },
            }
        }
    }

    fn handle_write_event(&self) -> bool {
        debug_assert!(false, "an acceptor is never registered for write interest");
        true
    }

    fn handle_error_event(&self) {
        info!("acceptor fd={} torn down", self.fd);
    }

    fn register_source(&self, registry: &Registry, token: Token, interest: mio::Interest) -> io::Result<()> {
        registry.register(&mut *self.listener.borrow_mut(), token, interest)
    }

    fn reregister_source(&self, registry: &Registry, token: Token, interest: mio::Interest) -> io::Result<()> {
        registry.reregister(&mut *self.listener.borrow_mut(), token, interest)
    }

    fn deregister_source(&self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut *self.listener.borrow_mut())
    }
}

/// `EMFILE`, `ENFILE`, `ENOBUFS`, `ENOMEM`: the process or system is out of some
/// resource needed to accept another connection. The listener stays registered and
/// the caller may throttle at a higher level; this is not a bug.
fn is_resource_exhaustion(errno: i32) -> bool {
    matches!(errno, libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
}

/// `ECONNABORTED`, `EPROTO`: the connection died between the kernel's accept queue and
/// our `accept()` call. Retrying immediately picks up the next queued connection.
fn is_protocol_retry(errno: i32) -> bool {
    matches!(errno, libc::ECONNABORTED | libc::EPROTO)
}
