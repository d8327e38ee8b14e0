//! Plain, `Default`-backed configuration structs. There is no file or CLI layer here —
//! this is a library, not an application — so unlike the teacher's `serde`-deserialized
//! YAML `ServerConfig`, these are just structs an embedder constructs or overrides by
//! hand before building a loop, acceptor, or pool.

/// Tunables for an individual `Connection`.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Bytes `recvBuf` must hold before `on_message` is invoked.
    pub min_packet_size: usize,
    /// Queued outbound bytes above which `on_write_high_water` fires.
    pub send_buf_high_water: usize,
    /// Whether synchronous sends issued from inside `on_message` are coalesced into a
    /// single write on exit from the read handler.
    pub batch_send: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            min_packet_size: 1,
            send_buf_high_water: 10 * 1024 * 1024,
            batch_send: true,
        }
    }
}

/// Tunables for a listening `Acceptor`.
#[derive(Debug, Clone, Copy)]
pub struct AcceptorConfig {
    pub listen_backlog: i32,
    pub connection: ConnectionConfig,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        AcceptorConfig { listen_backlog: 1024, connection: ConnectionConfig::default() }
    }
}

/// Tunables for a `ThreadPool`.
#[derive(Debug, Clone, Copy)]
pub struct ThreadPoolConfig {
    /// Hard cap on live worker threads.
    pub max_threads: usize,
    /// Target the monitor shrinks toward once workers go idle.
    pub max_idle_threads: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        ThreadPoolConfig { max_threads: 1024, max_idle_threads: 4 }
    }
}
