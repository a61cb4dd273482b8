//! Byte ports to the target.
//!
//! A [`Port`] is the lowest layer of the stack: a blocking, exclusive byte
//! pipe with exact-length reads. Two concrete transports are provided — a
//! TCP stream for co-process targets and a raw termios tty for boards on a
//! serial line. Everything above (framing, commands, proxies) is transport
//! agnostic.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::AsFd;
use std::path::Path;
use std::time::Duration;

use nix::sys::termios::{
    self, BaudRate, FlushArg, SetArg, SpecialCharacterIndices,
};

use crate::error::LinkError;

/// A blocking byte pipe to the target.
///
/// Ports are single-user and carry no locking; the owning commander
/// serializes all traffic.
pub trait Port {
    /// Reads exactly `buf.len()` bytes.
    ///
    /// # Errors
    ///
    /// [`LinkError::Timeout`] if the port's read timeout elapses first,
    /// [`LinkError::Closed`] if the peer goes away mid-read.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError>;

    /// Writes all of `data`.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] describing the underlying I/O failure.
    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError>;

    /// Bounds every subsequent read; `None` blocks indefinitely.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the transport rejects the setting.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), LinkError> {
        let _ = timeout;
        Ok(())
    }

    /// Discards any bytes already buffered by the transport.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the transport cannot be flushed.
    fn drain_input(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TCP
// ---------------------------------------------------------------------------

/// A TCP stream port.
pub struct TcpPort {
    stream: TcpStream,
}

impl TcpPort {
    /// Connects to the target's listening socket.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the connection cannot be established.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, LinkError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Port for TcpPort {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        self.stream.read_exact(buf)?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.stream.write_all(data)?;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), LinkError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serial
// ---------------------------------------------------------------------------

/// A raw-mode serial tty port.
pub struct SerialPort {
    file: File,
}

impl SerialPort {
    /// Opens `path` and configures it raw at the given baud rate.
    ///
    /// The port starts fully blocking (VMIN=1, VTIME=0); use
    /// [`Port::set_read_timeout`] for bounded reads during handshake.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the device cannot be opened or configured,
    /// or [`LinkError::Io`] with `InvalidInput` for an unsupported baud rate.
    pub fn open(path: &Path, baud: u32) -> Result<Self, LinkError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let speed = baud_rate(baud)?;

        let mut tios = termios::tcgetattr(file.as_fd()).map_err(errno)?;
        termios::cfmakeraw(&mut tios);
        termios::cfsetispeed(&mut tios, speed).map_err(errno)?;
        termios::cfsetospeed(&mut tios, speed).map_err(errno)?;
        tios.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        tios.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(file.as_fd(), SetArg::TCSANOW, &tios).map_err(errno)?;

        Ok(Self { file })
    }
}

impl Port for SerialPort {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                // VTIME expiry surfaces as a zero-length read.
                return Err(LinkError::Timeout);
            }
            filled += n;
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), LinkError> {
        let mut tios = termios::tcgetattr(self.file.as_fd()).map_err(errno)?;
        match timeout {
            Some(t) => {
                // VTIME counts in tenths of a second, capped at 25.5 s.
                let tenths = (t.as_millis() / 100).clamp(1, 255) as u8;
                tios.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
                tios.control_chars[SpecialCharacterIndices::VTIME as usize] = tenths;
            }
            None => {
                tios.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
                tios.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
            }
        }
        termios::tcsetattr(self.file.as_fd(), SetArg::TCSANOW, &tios).map_err(errno)?;
        Ok(())
    }

    fn drain_input(&mut self) -> Result<(), LinkError> {
        termios::tcflush(self.file.as_fd(), FlushArg::TCIFLUSH).map_err(errno)?;
        Ok(())
    }
}

fn errno(err: nix::Error) -> LinkError {
    LinkError::from(std::io::Error::from(err))
}

fn baud_rate(baud: u32) -> Result<BaudRate, LinkError> {
    Ok(match baud {
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        _ => return Err(LinkError::Io(std::io::ErrorKind::InvalidInput)),
    })
}
