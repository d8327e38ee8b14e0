use std::net::SocketAddr;

use super::Connection;

pub type OnConnect = Box<dyn Fn(&Connection)>;
/// Returns the number of bytes consumed from `data`; 0 means "need more bytes".
pub type OnMessage = Box<dyn Fn(&Connection, &[u8]) -> usize>;
pub type OnDisconnect = Box<dyn Fn(&Connection)>;
pub type OnConnFail = Box<dyn Fn(SocketAddr)>;
pub type OnWriteComplete = Box<dyn Fn(&Connection)>;
pub type OnWriteHighWater = Box<dyn Fn(&Connection, usize)>;

/// The optional callback set a `Connection` dispatches into. Unset callbacks are
/// simply skipped, mirroring the source's nullable `std::function` members.
#[derive(Default)]
pub struct Callbacks {
    pub on_connect: Option<OnConnect>,
    pub on_message: Option<OnMessage>,
    pub on_disconnect: Option<OnDisconnect>,
    pub on_conn_fail: Option<OnConnFail>,
    pub on_write_complete: Option<OnWriteComplete>,
    pub on_write_high_water: Option<OnWriteHighWater>,
}
