//! Axis and global parameter addresses.
//!
//! Nothing parameter-bearing goes on the wire without passing through this table.
//! Axis parameters are a closed set of ids. Global parameters are `(bank, id)` pairs:
//! either one of the named bank 0 settings or a general-purpose variable in bank 2.

use std::fmt;

use crate::{ProtocolError, Result};

/// Bank holding the general-purpose variables.
pub const GPVAR_BANK: u8 = 2;
/// Highest general-purpose variable id.
pub const GPVAR_MAX_ID: u8 = 55;

/// Per-motor parameters addressable through SAP/GAP/STAP/RSAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AxisParameter {
    TargetPosition = 0,
    ActualPosition = 1,
    TargetSpeed = 2,
    ActualSpeed = 3,
    MaxPositioningSpeed = 4,
    MaxAcceleration = 5,
    AbsoluteMaxCurrent = 6,
    StandbyCurrent = 7,
    TargetPositionReached = 8,
    ReferenceSwitchStatus = 9,
    RightLimitSwitchStatus = 10,
    LeftLimitSwitchStatus = 11,
    RightLimitSwitchDisable = 12,
    LeftLimitSwitchDisable = 13,
    MinimumSpeed = 130,
    ActualAcceleration = 135,
    RampMode = 138,
    MicrostepResolution = 140,
    SoftStopFlag = 149,
    RampDivisor = 153,
    PulseDivisor = 154,
    ReferencingMode = 193,
    ReferencingSearchSpeed = 194,
    ReferencingSwitchSpeed = 195,
    EndSwitchDistance = 196,
    MixedDecayThreshold = 203,
    Freewheeling = 204,
    StallDetectionThreshold = 205,
    ActualLoadValue = 206,
    DriverErrorFlags = 208,
    PowerDownDelay = 214,
}

impl AxisParameter {
    pub const ALL: [AxisParameter; 31] = [
        AxisParameter::TargetPosition,
        AxisParameter::ActualPosition,
        AxisParameter::TargetSpeed,
        AxisParameter::ActualSpeed,
        AxisParameter::MaxPositioningSpeed,
        AxisParameter::MaxAcceleration,
        AxisParameter::AbsoluteMaxCurrent,
        AxisParameter::StandbyCurrent,
        AxisParameter::TargetPositionReached,
        AxisParameter::ReferenceSwitchStatus,
        AxisParameter::RightLimitSwitchStatus,
        AxisParameter::LeftLimitSwitchStatus,
        AxisParameter::RightLimitSwitchDisable,
        AxisParameter::LeftLimitSwitchDisable,
        AxisParameter::MinimumSpeed,
        AxisParameter::ActualAcceleration,
        AxisParameter::RampMode,
        AxisParameter::MicrostepResolution,
        AxisParameter::SoftStopFlag,
        AxisParameter::RampDivisor,
        AxisParameter::PulseDivisor,
        AxisParameter::ReferencingMode,
        AxisParameter::ReferencingSearchSpeed,
        AxisParameter::ReferencingSwitchSpeed,
        AxisParameter::EndSwitchDistance,
        AxisParameter::MixedDecayThreshold,
        AxisParameter::Freewheeling,
        AxisParameter::StallDetectionThreshold,
        AxisParameter::ActualLoadValue,
        AxisParameter::DriverErrorFlags,
        AxisParameter::PowerDownDelay,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u32) -> Option<AxisParameter> {
        AxisParameter::ALL.iter().copied().find(|param| u32::from(param.id()) == id)
    }
}

impl TryFrom<u32> for AxisParameter {
    type Error = ProtocolError;

    fn try_from(id: u32) -> Result<Self> {
        AxisParameter::from_id(id).ok_or_else(|| ProtocolError::InvalidParameter(format!("unknown axis parameter {}", id)))
    }
}

/// Named device-wide settings. All of them live in bank 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NamedGlobal {
    EepromMagic = 64,
    Rs485BaudRate = 65,
    SerialAddress = 66,
    AsciiMode = 67,
    SerialHeartbeat = 68,
    CanBitRate = 69,
    CanReplyId = 70,
    CanId = 71,
    EepromLock = 73,
    TelegramPauseTime = 75,
    SerialHostAddress = 76,
    AutoStartMode = 77,
    CodeProtection = 81,
    CoordinateStorage = 84,
    ApplicationStatus = 128,
    DownloadMode = 129,
    ProgramCounter = 130,
    TickTimer = 132,
    RandomNumber = 133,
}

impl NamedGlobal {
    pub const BANK: u8 = 0;

    pub const ALL: [NamedGlobal; 19] = [
        NamedGlobal::EepromMagic,
        NamedGlobal::Rs485BaudRate,
        NamedGlobal::SerialAddress,
        NamedGlobal::AsciiMode,
        NamedGlobal::SerialHeartbeat,
        NamedGlobal::CanBitRate,
        NamedGlobal::CanReplyId,
        NamedGlobal::CanId,
        NamedGlobal::EepromLock,
        NamedGlobal::TelegramPauseTime,
        NamedGlobal::SerialHostAddress,
        NamedGlobal::AutoStartMode,
        NamedGlobal::CodeProtection,
        NamedGlobal::CoordinateStorage,
        NamedGlobal::ApplicationStatus,
        NamedGlobal::DownloadMode,
        NamedGlobal::ProgramCounter,
        NamedGlobal::TickTimer,
        NamedGlobal::RandomNumber,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    fn contains(bank: u32, id: u32) -> bool {
        bank == u32::from(NamedGlobal::BANK) && NamedGlobal::ALL.iter().any(|named| u32::from(named.id()) == id)
    }
}

/// A validated `(bank, id)` global parameter address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalParameter {
    bank: u8,
    id: u8,
}

impl GlobalParameter {
    pub fn new(bank: u32, id: u32) -> Result<Self> {
        if !validate_global((bank, id)) {
            return Err(ProtocolError::InvalidParameter(format!("unknown global parameter (bank {}, id {})", bank, id)));
        }
        // Both fit in a byte once validated.
        Ok(Self { bank: bank as u8, id: id as u8 })
    }

    pub fn bank(&self) -> u8 {
        self.bank
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn is_gpvar(&self) -> bool {
        self.bank == GPVAR_BANK
    }
}

impl From<NamedGlobal> for GlobalParameter {
    fn from(named: NamedGlobal) -> Self {
        Self { bank: NamedGlobal::BANK, id: named.id() }
    }
}

impl fmt::Display for GlobalParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.bank, self.id)
    }
}

pub fn validate_axis(id: u32) -> bool {
    AxisParameter::from_id(id).is_some()
}

pub fn validate_global((bank, id): (u32, u32)) -> bool {
    NamedGlobal::contains(bank, id) || (bank == u32::from(GPVAR_BANK) && id <= u32::from(GPVAR_MAX_ID))
}

/// Addresses general-purpose variable `id` in bank 2.
pub fn make_gpvar(id: u32) -> Result<GlobalParameter> {
    if id > u32::from(GPVAR_MAX_ID) {
        return Err(ProtocolError::InvalidParameter(format!(
            "general purpose variable {} outside 0..={}",
            id, GPVAR_MAX_ID
        )));
    }
    Ok(GlobalParameter { bank: GPVAR_BANK, id: id as u8 })
}
