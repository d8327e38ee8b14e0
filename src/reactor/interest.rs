/// The readiness mask a handle may be registered for.
///
/// This is the Rust shape of the C++ source's `eET_Read | eET_Write` bitmask
/// (`internal::eET_Read`, `internal::eET_Write` in
/// `examples/original_source/ananas/net/Connection.cc`). An enum rather than bitflags
/// because only the three combinations below are ever meaningful — there is no
/// "neither" interest a registered handle can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    ReadWrite,
}

impl Interest {
    pub fn readable(self) -> bool {
        matches!(self, Interest::Read | Interest::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Interest::Write | Interest::ReadWrite)
    }

    pub(crate) fn to_mio(self) -> mio::Interest {
        match self {
            Interest::Read => mio::Interest::READABLE,
            Interest::Write => mio::Interest::WRITABLE,
            Interest::ReadWrite => mio::Interest::READABLE.add(mio::Interest::WRITABLE),
        }
    }
}
