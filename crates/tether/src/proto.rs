//! The command protocol spoken over a [`Port`].
//!
//! Four primitives — echo, memory read, memory write, call — framed as
//! `u16 opcode ‖ u16 length ‖ payload`, everything big-endian. The target
//! answers each request with the literal bytes `ACK` followed by the
//! expected reply payload. Requests are strictly sequential; a framing
//! error leaves the wire in an unknown state and is fatal for the session.

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, LinkError, Result};
use crate::link::{Port, SerialPort, TcpPort};

/// Longest frame the target's command loop accepts, header included.
pub const CMD_MAX_LENGTH: usize = 1024;

/// Bytes of the `opcode ‖ length` request header.
pub const CMD_HEADER_LENGTH: usize = 4;

/// Probe payload used by the connection handshake.
const HELLO: &[u8] = b"hello";

const ACK: &[u8; 3] = b"ACK";

const OP_ECHO: u16 = 0;
const OP_MEM_READ: u16 = 1;
const OP_MEM_WRITE: u16 = 2;
const OP_CALL: u16 = 3;

/// Converts an unsigned value of `size` bytes into a signed integer by
/// two's complement.
///
/// Bits above the declared size are discarded first: the target's call
/// trampoline returns a full register word whose upper bits are whatever
/// the callee left there.
#[must_use]
pub fn uint_to_int(value: u64, size: usize) -> i64 {
    if size == 0 || size >= 8 {
        return value as i64;
    }
    let mask = (1u64 << (8 * size)) - 1;
    let value = value & mask;
    let sign_bit = 1u64 << (8 * size - 1);
    if value & sign_bit != 0 {
        (value as i64) - (1i64 << (8 * size))
    } else {
        value as i64
    }
}

/// Converts a signed integer into its unsigned two's complement image of
/// `size` bytes.
#[must_use]
pub fn int_to_uint(value: i64, size: usize) -> u64 {
    if size >= 8 {
        return value as u64;
    }
    let mask = (1u64 << (8 * size)) - 1;
    (value as u64) & mask
}

/// Issues protocol commands over an exclusively-owned [`Port`].
pub struct Commander {
    port: Box<dyn Port>,
    /// Target pointer width in bytes (the protocol `WORD`).
    pub word_size: usize,
    /// When set, hex-dump every frame to stderr.
    pub trace: bool,
}

impl Commander {
    /// Wraps an already-connected port. No handshake is performed.
    #[must_use]
    pub fn over(port: Box<dyn Port>, word_size: usize) -> Self {
        Self {
            port,
            word_size,
            trace: false,
        }
    }

    /// Connects over TCP and performs the echo handshake.
    ///
    /// # Errors
    ///
    /// [`LinkError::HandshakeFailed`] if the probe does not come back
    /// verbatim; otherwise the underlying connection error.
    pub fn connect_tcp(addr: &str, word_size: usize) -> Result<Self> {
        let port = TcpPort::connect(addr).map_err(Error::Link)?;
        let mut commander = Self::over(Box::new(port), word_size);
        if commander.echo(HELLO)? != HELLO {
            return Err(Error::Link(LinkError::HandshakeFailed));
        }
        Ok(commander)
    }

    /// Opens a serial device and handshakes until the target responds.
    ///
    /// Boot chatter is tolerated: input is drained and the probe repeated
    /// under a 500 ms read timeout until the echo comes back clean, then
    /// the timeout is lifted.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the device cannot be opened or
    /// configured. Handshake mismatches and timeouts are retried, not
    /// reported.
    pub fn connect_serial(path: &Path, baud: u32, word_size: usize) -> Result<Self> {
        let port = SerialPort::open(path, baud).map_err(Error::Link)?;
        let mut commander = Self::over(Box::new(port), word_size);
        loop {
            commander.port.drain_input().map_err(Error::Link)?;
            commander
                .port
                .set_read_timeout(Some(Duration::from_millis(500)))
                .map_err(Error::Link)?;
            match commander.echo(HELLO) {
                Ok(reply) if reply == HELLO => break,
                Ok(_)
                | Err(Error::Link(
                    LinkError::Timeout | LinkError::Desync | LinkError::ShortReply,
                )) => {}
                Err(other) => return Err(other),
            }
        }
        commander.port.set_read_timeout(None).map_err(Error::Link)?;
        Ok(commander)
    }

    /// Encodes a pointer-sized unsigned integer, big-endian.
    #[must_use]
    pub fn marshal_word(&self, value: u64) -> Vec<u8> {
        value.to_be_bytes()[8 - self.word_size..].to_vec()
    }

    /// Decodes a big-endian unsigned integer of any width up to 8 bytes.
    #[must_use]
    pub fn unmarshal_word(&self, bytes: &[u8]) -> u64 {
        bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }

    /// Round-trips arbitrary bytes through the target.
    ///
    /// # Errors
    ///
    /// Propagates link failures; any reply framing problem is
    /// [`LinkError::Desync`].
    pub fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.command(OP_ECHO, data, data.len())
    }

    /// Reads `size` bytes of target memory at `addr`.
    ///
    /// # Errors
    ///
    /// Propagates link failures.
    pub fn memory_read(&mut self, addr: u64, size: usize) -> Result<Vec<u8>> {
        let mut payload = self.marshal_word(addr);
        payload.extend_from_slice(&self.marshal_word(size as u64));
        self.command(OP_MEM_READ, &payload, size)
    }

    /// Writes `data` to target memory at `addr`, chunking as needed.
    ///
    /// # Errors
    ///
    /// Propagates link failures. A failure mid-stream leaves the target
    /// memory partially written.
    pub fn memory_write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let chunk_size = CMD_MAX_LENGTH - self.word_size - CMD_HEADER_LENGTH;
        let mut addr = addr;
        for chunk in data.chunks(chunk_size) {
            let mut payload = self.marshal_word(addr);
            payload.extend_from_slice(chunk);
            self.command(OP_MEM_WRITE, &payload, 0)?;
            addr += chunk.len() as u64;
        }
        Ok(())
    }

    /// Calls the function at `addr` with pointer-word arguments.
    ///
    /// `numbytes_return` is the declared size of the return type; any
    /// nonzero value is clamped to one word on the wire, and zero means the
    /// reply carries no payload at all. Returns the raw return word.
    ///
    /// # Errors
    ///
    /// Propagates link failures.
    pub fn call(&mut self, addr: u64, numbytes_return: usize, args: &[u64]) -> Result<u64> {
        let retsize = if numbytes_return > 0 {
            self.word_size
        } else {
            0
        };
        let mut payload = self.marshal_word(addr);
        payload.extend_from_slice(&(retsize as u16).to_be_bytes());
        payload.extend_from_slice(&(args.len() as u16).to_be_bytes());
        for &arg in args {
            payload.extend_from_slice(&self.marshal_word(arg));
        }
        let reply = self.command(OP_CALL, &payload, retsize)?;
        Ok(self.unmarshal_word(&reply))
    }

    /// One request/reply exchange: frame, send, check ACK, read payload.
    fn command(&mut self, opcode: u16, payload: &[u8], expected: usize) -> Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(CMD_HEADER_LENGTH + payload.len());
        frame.extend_from_slice(&opcode.to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(payload);
        if self.trace {
            eprintln!("tether: >> {}", hex(&frame));
        }
        self.port.write_all(&frame).map_err(Error::Link)?;

        let mut ack = [0u8; 3];
        self.port.read_exact(&mut ack).map_err(Error::Link)?;
        if &ack != ACK {
            return Err(Error::Link(LinkError::Desync));
        }

        // The target acknowledged but the payload died mid-stream.
        let mut reply = vec![0u8; expected];
        self.port.read_exact(&mut reply).map_err(|e| match e {
            LinkError::Timeout => Error::Link(LinkError::ShortReply),
            other => Error::Link(other),
        })?;
        if self.trace {
            eprintln!("tether: << {}", hex(&reply));
        }
        Ok(reply)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
