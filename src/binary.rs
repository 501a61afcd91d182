//! Binary TMCL framing.
//!
//! Every request and every reply is a fixed 9-byte frame:
//! `[addr, cmd, type/status, bank/motor, value3, value2, value1, value0, checksum]`.
//! The 32-bit value is sent big-endian as its two's-complement bit pattern and the
//! checksum covers the first 8 bytes.

use log::warn;

use crate::{compute_checksum, ProtocolError, Result};

/// Length of every binary request and reply frame.
pub const FRAME_LEN: usize = 9;

/// Reply status codes of the binary protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Success = 100,
    CommandLoaded = 101,
    ChecksumWrong = 1,
    CommandInvalid = 2,
    TypeWrong = 3,
    ValueInvalid = 4,
    EepromLocked = 5,
    CommandUnavailable = 6,
}

impl Status {
    pub fn from_code(code: u8) -> Option<Status> {
        match code {
            100 => Some(Status::Success),
            101 => Some(Status::CommandLoaded),
            1 => Some(Status::ChecksumWrong),
            2 => Some(Status::CommandInvalid),
            3 => Some(Status::TypeWrong),
            4 => Some(Status::ValueInvalid),
            5 => Some(Status::EepromLocked),
            6 => Some(Status::CommandUnavailable),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_successful(self) -> bool {
        matches!(self, Status::Success | Status::CommandLoaded)
    }
}

/// An outbound binary command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryCommand {
    module_address: u8,
    command_id: u8,
    type_number: u8,
    bank_or_motor: u8,
    value: i32,
}

impl BinaryCommand {
    /// Placeholder for the type or bank/motor byte when the command does not use it.
    pub const IGNORE: u8 = 0;

    pub fn new(module_address: u8, command_id: u8, type_number: u8, bank_or_motor: u8, value: i32) -> Self {
        Self {
            module_address,
            command_id,
            type_number,
            bank_or_motor,
            value,
        }
    }

    /// Builds a command from wider integers, masking every field to its width.
    ///
    /// Out-of-range inputs are cut down silently. Use [`BinaryCommand::checked`] when
    /// the inputs come from outside the program.
    pub fn truncating(module_address: u32, command_id: u32, type_number: u32, bank_or_motor: u32, value: i64) -> Self {
        Self::new(
            (module_address & 0xFF) as u8,
            (command_id & 0xFF) as u8,
            (type_number & 0xFF) as u8,
            (bank_or_motor & 0xFF) as u8,
            (value & 0xFFFF_FFFF) as u32 as i32,
        )
    }

    /// Builds a command from wider integers, rejecting any field that does not fit.
    ///
    /// The value may be given either signed (`i32` range) or as an unsigned 32-bit
    /// pattern (up to `u32::MAX`).
    pub fn checked(module_address: u32, command_id: u32, type_number: u32, bank_or_motor: u32, value: i64) -> Result<Self> {
        let byte = |name: &str, field: u32| {
            u8::try_from(field).map_err(|_| ProtocolError::InvalidParameter(format!("{} {} does not fit in one byte", name, field)))
        };

        if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
            return Err(ProtocolError::InvalidParameter(format!("value {} does not fit in 32 bits", value)));
        }

        Ok(Self::new(
            byte("module address", module_address)?,
            byte("command id", command_id)?,
            byte("type number", type_number)?,
            byte("bank/motor number", bank_or_motor)?,
            value as u32 as i32,
        ))
    }

    pub fn module_address(&self) -> u8 {
        self.module_address
    }

    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    pub fn type_number(&self) -> u8 {
        self.type_number
    }

    pub fn bank_or_motor(&self) -> u8 {
        self.bank_or_motor
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    /// Serializes the command into its 9-byte wire frame.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = self.module_address;
        frame[1] = self.command_id;
        frame[2] = self.type_number;
        frame[3] = self.bank_or_motor;
        frame[4..8].copy_from_slice(&self.value.to_be_bytes());
        frame[8] = compute_checksum(&frame[..8]);
        frame
    }
}

/// A decoded binary reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryResponse {
    reply_address: u8,
    module_address: u8,
    status: u8,
    command_id: u8,
    value: i32,
    checksum: u8,
}

impl BinaryResponse {
    /// Decodes a reply frame, verifying its length and checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != FRAME_LEN {
            return Err(ProtocolError::MalformedFrame {
                expected: FRAME_LEN,
                actual: bytes.len(),
            });
        }

        let calculated = compute_checksum(&bytes[..8]);
        let received = bytes[8];
        if calculated != received {
            warn!(
                "Invalid checksum - calculated={:02X} received={:02X} frame={:02X?}",
                calculated, received, bytes
            );
            return Err(ProtocolError::ChecksumMismatch { calculated, received });
        }

        Ok(Self {
            reply_address: bytes[0],
            module_address: bytes[1],
            status: bytes[2],
            command_id: bytes[3],
            value: i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            checksum: received,
        })
    }

    pub fn reply_address(&self) -> u8 {
        self.reply_address
    }

    pub fn module_address(&self) -> u8 {
        self.module_address
    }

    /// The raw status byte. See [`BinaryResponse::status`] for the decoded form.
    pub fn status_code(&self) -> u8 {
        self.status
    }

    /// The decoded status, or `None` for a code outside the known set.
    pub fn status(&self) -> Option<Status> {
        Status::from_code(self.status)
    }

    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    pub fn is_successful(&self) -> bool {
        self.status().map_or(false, Status::is_successful)
    }

    /// Turns a non-success status into [`ProtocolError::Rejected`].
    pub fn ensure_success(self) -> Result<Self> {
        if self.is_successful() {
            Ok(self)
        } else {
            Err(ProtocolError::Rejected { status: self.status })
        }
    }
}
