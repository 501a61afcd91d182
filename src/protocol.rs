//! Request/response exchanges with the controller.
//!
//! A protocol owns its transport and speaks exactly one TMCL variant. Each call is a
//! single exchange: hold the transport, write the request, read the reply, decode it,
//! release the transport. Nothing is retried here; the caller sees every failure.
//!
//! Neither type is safe to share between threads without a lock around it, since the
//! wire has no request ids to tell interleaved replies apart.

use log::{debug, trace, warn};

use crate::ascii::{AsciiMessage, AsciiResponse, TERMINATOR};
use crate::binary::{BinaryCommand, BinaryResponse, FRAME_LEN};
use crate::transport::{Exchange, Transport, TransportError};
use crate::{ProtocolError, Result};

/// Binary TMCL over a transport.
pub struct BinaryProtocol<T: Transport> {
    transport: T,
    module_address: u8,
}

impl<T: Transport> BinaryProtocol<T> {
    pub fn new(transport: T, module_address: u8) -> Self {
        Self { transport, module_address }
    }

    pub fn module_address(&self) -> u8 {
        self.module_address
    }

    /// Sends one command and returns the decoded reply.
    pub fn execute(&mut self, command: &BinaryCommand) -> Result<BinaryResponse> {
        let frame = command.encode();

        let mut exchange = Exchange::begin(&mut self.transport)?;
        debug!("Sending message {:02X?}", frame);
        exchange.write(&frame)?;
        let raw = exchange.read_bytes(FRAME_LEN)?;
        debug!("Received message {:02X?}", raw);
        let response = BinaryResponse::decode(&raw)?;

        if response.module_address() != command.module_address() {
            warn!(
                "Reply from module {} to a command for module {}",
                response.module_address(),
                command.module_address()
            );
        }
        if response.command_id() != command.command_id() {
            warn!(
                "Reply echoes command {} instead of {}",
                response.command_id(),
                command.command_id()
            );
        }
        Ok(response)
    }

    /// Drains stale replies until the line stays quiet for one read timeout.
    ///
    /// Returns the number of whole frames thrown away.
    pub fn clear(&mut self) -> Result<usize> {
        let mut exchange = Exchange::begin(&mut self.transport)?;
        let mut drained = 0;
        loop {
            match exchange.read_bytes(FRAME_LEN) {
                Ok(bytes) => {
                    trace!("Discarding {:02X?}", bytes);
                    drained += 1;
                }
                Err(TransportError::Timeout { received, .. }) => {
                    if received > 0 {
                        trace!("Discarding {} trailing bytes", received);
                    }
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        if drained > 0 {
            debug!("Cleared {} stale frames", drained);
        }
        Ok(drained)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

/// ASCII TMCL over a transport.
pub struct AsciiProtocol<T: Transport> {
    transport: T,
    address: String,
}

impl<T: Transport> AsciiProtocol<T> {
    pub fn new(transport: T, address: &str) -> Self {
        Self {
            transport,
            address: address.to_string(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends `message` to the configured address and parses the reply line.
    pub fn query(&mut self, message: &AsciiMessage) -> Result<AsciiResponse> {
        let line = message.addressed(&self.address)?.encode();

        let mut exchange = Exchange::begin(&mut self.transport)?;
        debug!("Sending message {:?}", line);
        exchange.write(line.as_bytes())?;
        let raw = exchange.read_until(TERMINATOR as u8)?;
        let reply = String::from_utf8(raw)
            .map_err(|e| ProtocolError::MalformedResponse(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
        debug!("Received message {:?}", reply);
        AsciiResponse::decode(&reply)
    }

    /// Same exchange as [`AsciiProtocol::query`]; the controller always replies.
    pub fn write(&mut self, message: &AsciiMessage) -> Result<AsciiResponse> {
        self.query(message)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}
