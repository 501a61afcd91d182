//! ASCII TMCL messages.
//!
//! A request line reads `<address> <instruction> <type>, <bank>, <value>\r`, with
//! empty fields left out of the comma list. A reply line reads
//! `<host> <client> <status> <value>`. The ASCII variant carries no checksum.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::binary::Status;
use crate::{ProtocolError, Result};

/// Terminates every request and reply line.
pub const TERMINATOR: char = '\r';
const SPACE: char = ' ';
const PARAM_SEPARATOR: &str = ", ";

/// Move types accepted by the `MVP` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    Absolute,
    Relative,
    Coordinate,
}

impl MoveType {
    pub fn as_str(self) -> &'static str {
        match self {
            MoveType::Absolute => "ABS",
            MoveType::Relative => "REL",
            MoveType::Coordinate => "COORD",
        }
    }

    /// Type number of the binary `MVP` command.
    pub fn type_number(self) -> u8 {
        match self {
            MoveType::Absolute => 0,
            MoveType::Relative => 1,
            MoveType::Coordinate => 2,
        }
    }
}

impl FromStr for MoveType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ABS" => Ok(MoveType::Absolute),
            "REL" => Ok(MoveType::Relative),
            "COORD" => Ok(MoveType::Coordinate),
            other => Err(ProtocolError::UnsupportedType(other.to_string())),
        }
    }
}

impl fmt::Display for MoveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound ASCII command line.
///
/// Built once through [`AsciiMessageBuilder`] and never changed afterwards. The
/// address is normally left empty and filled in by the protocol at dispatch time
/// through [`AsciiMessage::addressed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsciiMessage {
    address: String,
    instruction: String,
    type_: String,
    bank: String,
    value: String,
}

impl AsciiMessage {
    pub fn builder(instruction: &str) -> AsciiMessageBuilder {
        AsciiMessageBuilder {
            message: AsciiMessage {
                instruction: instruction.to_string(),
                ..Default::default()
            },
        }
    }

    /// `MVP <type>, <value>`
    pub fn mvp(move_type: MoveType, value: i32) -> AsciiMessage {
        AsciiMessage {
            instruction: String::from("MVP"),
            type_: move_type.as_str().to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    /// Returns a copy of this message sent to `address`.
    pub fn addressed(&self, address: &str) -> Result<AsciiMessage> {
        check_token("address", address)?;
        Ok(AsciiMessage {
            address: address.to_string(),
            ..self.clone()
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn bank(&self) -> &str {
        &self.bank
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Serializes the message into its request line, terminator included.
    pub fn encode(&self) -> String {
        let params = [&self.type_, &self.bank, &self.value]
            .iter()
            .filter(|field| !field.is_empty())
            .map(|field| field.as_str())
            .collect::<Vec<_>>()
            .join(PARAM_SEPARATOR);

        let mut line = String::with_capacity(self.address.len() + self.instruction.len() + params.len() + 3);
        line.push_str(&self.address);
        line.push(SPACE);
        line.push_str(&self.instruction);
        line.push(SPACE);
        line.push_str(&params);
        line.push(TERMINATOR);
        line
    }
}

/// Validating builder for [`AsciiMessage`].
#[derive(Debug, Clone)]
pub struct AsciiMessageBuilder {
    message: AsciiMessage,
}

impl AsciiMessageBuilder {
    pub fn address(mut self, address: &str) -> Self {
        self.message.address = address.to_string();
        self
    }

    pub fn type_(mut self, type_: &str) -> Self {
        self.message.type_ = type_.to_string();
        self
    }

    pub fn bank(mut self, bank: &str) -> Self {
        self.message.bank = bank.to_string();
        self
    }

    pub fn value<V: ToString>(mut self, value: V) -> Self {
        self.message.value = value.to_string();
        self
    }

    pub fn build(self) -> Result<AsciiMessage> {
        let message = self.message;
        if message.instruction.is_empty() {
            return Err(ProtocolError::InvalidParameter(String::from("instruction must not be empty")));
        }
        check_token("address", &message.address)?;
        check_token("instruction", &message.instruction)?;
        check_param("type", &message.type_)?;
        check_param("bank", &message.bank)?;
        check_param("value", &message.value)?;
        Ok(message)
    }
}

// Tokens separated by single spaces must not contain whitespace themselves.
fn check_token(name: &str, token: &str) -> Result<()> {
    if token.chars().any(char::is_whitespace) {
        return Err(ProtocolError::InvalidParameter(format!("{} {:?} contains whitespace", name, token)));
    }
    Ok(())
}

fn check_param(name: &str, param: &str) -> Result<()> {
    if param.contains(TERMINATOR) || param.contains(',') || param.contains('\n') {
        return Err(ProtocolError::InvalidParameter(format!("{} {:?} contains a separator", name, param)));
    }
    Ok(())
}

/// A parsed ASCII reply. Fields are kept as the text that was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiResponse {
    host: String,
    client: String,
    status: String,
    value: String,
}

impl AsciiResponse {
    /// Finds `<letter> <letter> <1-3 digits> <-?digits>` anywhere in `line`.
    ///
    /// Letters match either case and whitespace between the fields is optional.
    pub fn decode(line: &str) -> Result<Self> {
        let caps = reply_pattern()?
            .captures(line)
            .ok_or_else(|| ProtocolError::MalformedResponse(line.to_string()))?;
        let field = |i: usize| caps.get(i).map_or_else(String::new, |m| m.as_str().to_string());

        Ok(Self {
            host: field(1),
            client: field(2),
            status: field(3),
            value: field(4),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn status_code(&self) -> Result<u16> {
        self.status
            .parse()
            .map_err(|_| ProtocolError::MalformedResponse(format!("status {:?} is not a number", self.status)))
    }

    /// The reply value as an integer; fails if it does not fit in 32 bits.
    pub fn value_i32(&self) -> Result<i32> {
        self.value
            .parse()
            .map_err(|_| ProtocolError::MalformedResponse(format!("value {:?} does not fit in 32 bits", self.value)))
    }

    pub fn is_successful(&self) -> bool {
        self.status_code()
            .ok()
            .and_then(|code| u8::try_from(code).ok())
            .and_then(Status::from_code)
            .map_or(false, Status::is_successful)
    }
}

// ASCII classes: `\s` covers tab, newline, vertical tab, form feed, carriage return and space.
const REPLY_PATTERN: &str = r"(?i-u)([a-z])\s*([a-z])\s*([0-9]{1,3})\s*(-?[0-9]+)";

fn reply_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(REPLY_PATTERN))
        .as_ref()
        .map_err(|e| ProtocolError::MalformedResponse(format!("reply pattern: {}", e)))
}
