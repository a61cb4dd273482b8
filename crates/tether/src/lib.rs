//! Drive and inspect a separately-compiled C target as if linked against it.
//!
//! The stack, bottom up:
//!
//! - [`link`]: blocking byte ports (TCP, raw serial).
//! - [`proto`]: the four-command wire protocol (echo, memory read, memory
//!   write, call), big-endian, length-prefixed, `ACK`-acknowledged.
//! - [`graph`]: the C type graph recovered from the target ELF's DWARF.
//! - [`proxy`]: typed handles turning indexing, member access, and calls
//!   into wire traffic.
//! - [`alloc`]: the scratch allocator over a target-reserved heap symbol.
//! - [`library`]: the facade binding all of the above together.
//!
//! ```no_run
//! use tether::{Commander, Lib, TypeGraph};
//!
//! # fn main() -> tether::Result<()> {
//! let graph = TypeGraph::load(std::path::Path::new("firmware.elf"))?;
//! let com = Commander::connect_tcp("localhost:9999", graph.word_size)?;
//! let lib = Lib::attach(graph, com);
//! lib.init_heap(tether::library::DEFAULT_HEAP_SYMBOL)?;
//!
//! let answer = lib.func("compute")?.call(&[tether::Arg::Int(21)])?;
//! # Ok(())
//! # }
//! ```

pub mod alloc;
pub mod error;
pub mod graph;
pub mod library;
pub mod link;
pub mod proto;
pub mod proxy;

pub use error::{Error, LinkError, Result};
pub use graph::{TypeGraph, TypeId, TypeKind};
pub use library::{Lib, NewInit};
pub use link::{Port, SerialPort, TcpPort};
pub use proto::Commander;
pub use proxy::{Arg, FuncProxy, Rhs, Value, VarProxy};
