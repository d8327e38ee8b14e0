/// A connection's lifecycle stage. Moves monotonically toward `Closed` along the edges
/// documented on `Connection`; any other transition is a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed but not yet registered with a loop.
    None,
    Connected,
    /// The peer sent FIN while our send buffer was empty; we drain nothing further and
    /// wait for the error edge that tears us down.
    PassiveClose,
    /// The peer sent FIN while bytes were still queued to send; writes keep draining
    /// until the queue empties, then this becomes `PassiveClose`.
    CloseWaitWrite,
    /// We initiated teardown via `active_close`.
    ActiveClose,
    /// An unrecoverable I/O error occurred.
    Error,
    /// Terminal. The fd is shut down and no further callbacks fire.
    Closed,
}
