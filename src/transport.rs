//! Byte transport underneath the protocol.
//!
//! The controller sits on a half-duplex serial line, so one exchange (write, then
//! read the reply) must own the transport from start to end. [`Exchange`] holds the
//! transport for that span and releases it when dropped, whichever way the exchange
//! ends.

use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use log::{debug, trace, warn};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use thiserror::Error;

use crate::ProtocolError;

/// Upper bound for a reply line; anything longer is treated as line noise.
const MAX_LINE_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The read timed out before the requested bytes arrived. Partial bytes are dropped.
    #[error("read timed out after {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serial(#[from] serialport::Error),
}

impl From<TransportError> for ProtocolError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { expected, received } => ProtocolError::TransportTimeout { expected, received },
            TransportError::Io(e) => ProtocolError::TransportIo(e),
            TransportError::Serial(e) => ProtocolError::TransportIo(e.into()),
        }
    }
}

pub trait Transport {
    /// Called before an exchange starts.
    fn acquire(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Called when an exchange ends, successfully or not.
    fn release(&mut self) {}

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Reads exactly `count` bytes or fails with [`TransportError::Timeout`].
    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, TransportError>;

    /// Reads up to and excluding `terminator`.
    fn read_until(&mut self, terminator: u8) -> Result<Vec<u8>, TransportError>;
}

/// Scoped hold on a transport for one exchange.
pub struct Exchange<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
}

impl<'a, T: Transport + ?Sized> Exchange<'a, T> {
    pub fn begin(transport: &'a mut T) -> Result<Self, TransportError> {
        transport.acquire()?;
        Ok(Self { transport })
    }
}

impl<T: Transport + ?Sized> Deref for Exchange<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.transport
    }
}

impl<T: Transport + ?Sized> DerefMut for Exchange<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.transport
    }
}

impl<T: Transport + ?Sized> Drop for Exchange<'_, T> {
    fn drop(&mut self) {
        self.transport.release();
    }
}

/// Serial line settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::from("/dev/ttyUSB16"),
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(200),
        }
    }
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        debug!("Opening {} at {} baud", config.port, config.baud_rate);
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .timeout(config.timeout)
            .open()?;
        Ok(Self::from_port(port))
    }

    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Transport for SerialTransport {
    fn release(&mut self) {
        if let Err(e) = self.port.flush() {
            warn!("Failed to flush serial port: {}", e);
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        trace!("Wrote {} bytes", bytes.len());
        Ok(())
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, TransportError> {
        let buf = read_exact_or_timeout(&mut self.port, count)?;
        trace!("Read {} bytes: {:02X?}", count, buf);
        Ok(buf)
    }

    fn read_until(&mut self, terminator: u8) -> Result<Vec<u8>, TransportError> {
        let line = read_line(&mut self.port, terminator)?;
        trace!("Read line {:?}", String::from_utf8_lossy(&line));
        Ok(line)
    }
}

/// Fills `count` bytes from `reader`. A short read ends in `Timeout` and the partial bytes are dropped.
fn read_exact_or_timeout<R: Read + ?Sized>(reader: &mut R, count: usize) -> Result<Vec<u8>, TransportError> {
    let mut buf = vec![0u8; count];
    let mut filled = 0;
    while filled < count {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(TransportError::Timeout { expected: count, received: filled }),
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(TransportError::Timeout { expected: count, received: filled });
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(buf)
}

/// Reads up to `terminator`, which is consumed but not returned.
fn read_line<R: Read + ?Sized>(reader: &mut R, terminator: u8) -> Result<Vec<u8>, TransportError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Err(TransportError::Timeout { expected: line.len() + 1, received: line.len() }),
            Ok(_) if byte[0] == terminator => return Ok(line),
            Ok(_) => {
                if line.len() >= MAX_LINE_LEN {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "reply line exceeds maximum length").into());
                }
                line.push(byte[0]);
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(TransportError::Timeout { expected: line.len() + 1, received: line.len() });
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
            Err(e) => return Err(e.into()),
        }
    }
}

/// In-memory transport that replays canned replies, for tests.
#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::io;

    use super::{Transport, TransportError};

    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub written: Vec<Vec<u8>>,
        pub acquired: usize,
        pub released: usize,
        pub fail_writes: bool,
        replies: VecDeque<Result<Vec<u8>, TransportError>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, bytes: &[u8]) -> Self {
            self.replies.push_back(Ok(bytes.to_vec()));
            self
        }

        pub fn fail_read(mut self, err: TransportError) -> Self {
            self.replies.push_back(Err(err));
            self
        }

        pub fn pending_replies(&self) -> usize {
            self.replies.len()
        }

        fn next_reply(&mut self, expected: usize) -> Result<Vec<u8>, TransportError> {
            self.replies
                .pop_front()
                .unwrap_or(Err(TransportError::Timeout { expected, received: 0 }))
        }
    }

    impl Transport for ScriptedTransport {
        fn acquire(&mut self) -> Result<(), TransportError> {
            self.acquired += 1;
            Ok(())
        }

        fn release(&mut self) {
            self.released += 1;
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "line down").into());
            }
            self.written.push(bytes.to_vec());
            Ok(())
        }

        // Replies are handed back as scripted, even if the length is wrong.
        fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, TransportError> {
            self.next_reply(count)
        }

        fn read_until(&mut self, _terminator: u8) -> Result<Vec<u8>, TransportError> {
            self.next_reply(1)
        }
    }
}
