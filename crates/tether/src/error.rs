//! Error types for the host runtime.

use core::fmt;

use tether_dwarf::DwarfError;
use tether_elf::ElfError;

/// Failures of the byte link itself.
///
/// All of these are fatal for the current session: the framing state of the
/// wire is unknown afterwards, so callers must reconstruct a fresh link
/// rather than retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// A read did not complete within the port's timeout.
    Timeout,
    /// The peer closed the connection.
    Closed,
    /// The initial echo handshake did not return the probe bytes.
    HandshakeFailed,
    /// The target replied out of protocol (bad ACK or echo mismatch).
    Desync,
    /// The reply payload was shorter than the request demanded.
    ShortReply,
    /// Any other I/O failure, by kind.
    Io(std::io::ErrorKind),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "target took too long to respond"),
            Self::Closed => write!(f, "link closed by peer"),
            Self::HandshakeFailed => write!(f, "echo handshake failed"),
            Self::Desync => write!(f, "link out of sync (unexpected reply)"),
            Self::ShortReply => write!(f, "reply shorter than expected"),
            Self::Io(kind) => write!(f, "link I/O error: {kind}"),
        }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => Self::Closed,
            kind => Self::Io(kind),
        }
    }
}

/// Errors surfaced by the tether runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The byte link failed; see [`LinkError`].
    Link(LinkError),
    /// The ELF image could not be parsed.
    Elf(ElfError),
    /// The DWARF data could not be parsed.
    Dwarf(DwarfError),
    /// Reading the target image from disk failed.
    Io(std::io::ErrorKind),
    /// A name is not present in the type graph.
    UnknownType(String),
    /// A struct or union has no member of the given name.
    UnknownMember(String),
    /// The operation is not supported on this kind of value.
    TypeMismatch(&'static str),
    /// A symbol has no resolved target address.
    UnknownAddress(String),
    /// The scratch region has no free slot of the requested size.
    OutOfMemory,
    /// Indexed access beyond the bounds of a sized array.
    IndexOutOfRange {
        /// The requested element index.
        index: i64,
        /// The array length.
        length: i64,
    },
    /// Length-dependent operation on a proxy of unknown length.
    UnsizedArray,
    /// The operation is recognized but deliberately not implemented.
    Unimplemented(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "{e}"),
            Self::Elf(e) => write!(f, "{e}"),
            Self::Dwarf(e) => write!(f, "{e}"),
            Self::Io(kind) => write!(f, "I/O error: {kind}"),
            Self::UnknownType(name) => write!(f, "unknown type or symbol: {name}"),
            Self::UnknownMember(name) => write!(f, "unknown member: {name}"),
            Self::TypeMismatch(what) => write!(f, "type mismatch: {what}"),
            Self::UnknownAddress(name) => write!(f, "no address known for {name}"),
            Self::OutOfMemory => write!(f, "scratch region out of memory"),
            Self::IndexOutOfRange { index, length } => {
                write!(f, "index {index} out of range for length {length}")
            }
            Self::UnsizedArray => write!(f, "operation requires a known array length"),
            Self::Unimplemented(what) => write!(f, "not implemented: {what}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<LinkError> for Error {
    fn from(err: LinkError) -> Self {
        Self::Link(err)
    }
}

impl From<ElfError> for Error {
    fn from(err: ElfError) -> Self {
        Self::Elf(err)
    }
}

impl From<DwarfError> for Error {
    fn from(err: DwarfError) -> Self {
        Self::Dwarf(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.kind())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
