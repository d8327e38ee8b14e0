use std::fmt;
use std::io;

/// Errors surfaced by the core that are not simply "a syscall returned an
/// `io::Error`" — those are folded into the connection state machine instead (see
/// `connection::State::Error`) rather than propagated through `Result`.
#[derive(thiserror::Error, Debug)]
pub enum ReactorError {
    /// The registrar rejected a `register`/`modify` call, e.g. because `register_source`
    /// failed or `modify` targeted an fd the registrar does not currently hold.
    #[error("registrar rejected interest change for fd {fd}: {source}")]
    Registrar { fd: i32, source: io::Error },

    /// A method was invoked on a `Connection` while it was in a state that does not
    /// permit it (e.g. `send` while not `Connected`/`CloseWaitWrite`).
    #[error("connection fd {fd} is in state {state:?}, which does not permit this operation")]
    WrongState {
        fd: i32,
        state: crate::connection::State,
    },
}

/// The Rust analogue of `std::current_exception()`: a panic payload caught by
/// `catch_unwind` at a task boundary. Carries no trait bounds beyond `Send` because a
/// panic payload's only use is being re-thrown or described.
pub struct PanicPayload(pub Box<dyn std::any::Any + Send + 'static>);

impl PanicPayload {
    /// Best-effort extraction of the panic message, mirroring how `std::panic`
    /// formats unhandled panics.
    pub fn message(&self) -> String {
        if let Some(s) = self.0.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = self.0.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        }
    }
}

impl fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicPayload").field(&self.message()).finish()
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panicked: {}", self.message())
    }
}

impl std::error::Error for PanicPayload {}

/// `Try<T>` from the spec: either the task's value, or the panic it raised.
pub type Try<T> = Result<T, PanicPayload>;
