//! # TMCL Protocol Library for the Trinamic PD-110
//!
//! This library contains the protocol layer used to drive a Trinamic PD-110 stepper
//! controller over a serial line. It frames binary and ASCII TMCL commands, validates
//! parameter addresses before anything is sent, and decodes the controller's replies.
//!
//! Leaves first:
//! - [`compute_checksum`] is the 8-bit additive checksum shared by every binary frame.
//! - [`binary`] encodes 9-byte request frames and decodes 9-byte reply frames.
//! - [`ascii`] encodes textual command lines and parses textual replies.
//! - [`params`] holds the axis and global parameter tables.
//! - [`protocol`] performs one write-then-read exchange per call over a [`transport`].
//! - [`driver`] exposes the motor verbs (move, stop, get/set parameter).

pub mod ascii;
pub mod binary;
pub mod driver;
pub mod params;
pub mod protocol;
pub mod transport;

pub use ascii::{AsciiMessage, AsciiResponse, MoveType};
pub use binary::{BinaryCommand, BinaryResponse, Status};
pub use driver::{CommandHeader, Instruction, Pd110, RampMode};
pub use params::{make_gpvar, validate_axis, validate_global, AxisParameter, GlobalParameter, NamedGlobal};
pub use protocol::{AsciiProtocol, BinaryProtocol};
pub use transport::{SerialConfig, SerialTransport, Transport, TransportError};

use thiserror::Error;

// Errors raised by the protocol layer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A parameter address failed validation. Nothing was sent.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A binary frame did not have the fixed frame length.
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },
    /// An ASCII reply did not match the reply pattern.
    #[error("malformed response: {0:?}")]
    MalformedResponse(String),
    /// The trailing checksum byte of a binary frame is wrong.
    #[error("checksum mismatch: calculated {calculated:#04x}, received {received:#04x}")]
    ChecksumMismatch { calculated: u8, received: u8 },
    /// The transport gave up waiting for the reply.
    #[error("transport timed out after {received} of {expected} bytes")]
    TransportTimeout { expected: usize, received: usize },
    /// The transport failed for any other reason.
    #[error("transport I/O error: {0}")]
    TransportIo(#[source] std::io::Error),
    /// An ASCII message type outside the instruction's fixed set.
    #[error("unsupported type {0:?}")]
    UnsupportedType(String),
    /// The controller answered with a non-success status.
    #[error("command rejected by the controller with status {status}")]
    Rejected { status: u8 },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Sums all bytes and keeps the low 8 bits.
pub fn compute_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_empty_input_is_zero() {
        assert_eq!(compute_checksum(&[]), 0);
    }

    #[test]
    fn checksum_wraps_without_carry() {
        assert_eq!(compute_checksum(&[0xFF, 0x01]), 0x00);
        assert_eq!(compute_checksum(&[0xFF, 0xFF, 0xFF]), 0xFD);
        assert_eq!(compute_checksum(&[0x01, 0x04, 0x01, 0x00, 0x00, 0x00, 0x03, 0xE8]), 0xF1);
    }

    #[test]
    fn checksum_changes_for_every_single_bit_flip() {
        let samples: [[u8; 8]; 4] = [
            [0x01, 0x04, 0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF],
            [0x01, 0x06, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
            [0x02, 0x01, 0x64, 0x05, 0x12, 0x34, 0x56, 0x78],
            [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
        ];

        for sample in samples {
            let original = compute_checksum(&sample);
            for byte in 0..sample.len() {
                for bit in 0..8 {
                    let mut mutated = sample;
                    mutated[byte] ^= 1 << bit;
                    assert_ne!(
                        compute_checksum(&mutated),
                        original,
                        "flip of bit {} in byte {} of {:02X?} went undetected",
                        bit,
                        byte,
                        sample
                    );
                }
            }
        }
    }

    #[test]
    fn error_messages_are_readable() {
        let err = ProtocolError::ChecksumMismatch { calculated: 0x12, received: 0x34 };
        assert_eq!(err.to_string(), "checksum mismatch: calculated 0x12, received 0x34");
        let err = ProtocolError::MalformedFrame { expected: 9, actual: 8 };
        assert_eq!(err.to_string(), "malformed frame: expected 9 bytes, got 8");
    }
}
