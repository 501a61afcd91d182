//! Motor verbs on top of the binary protocol.
//!
//! [`Pd110`] turns calls such as "move right" or "read the actual position" into
//! validated binary commands. Parameter addresses come in as [`AxisParameter`] and
//! [`GlobalParameter`] values, so an unknown address never reaches the wire.

use log::debug;

use crate::ascii::MoveType;
use crate::binary::{BinaryCommand, BinaryResponse};
use crate::params::{AxisParameter, GlobalParameter};
use crate::protocol::BinaryProtocol;
use crate::transport::{SerialConfig, SerialTransport, Transport};
use crate::{ProtocolError, Result};

/// Microsteps per full turn of the shutter motor.
pub const STEPS_PER_REVOLUTION: i64 = 25990 / 2;

/// TMCL instruction numbers used by this driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    RotateRight = 1,
    RotateLeft = 2,
    MotorStop = 3,
    MoveToPosition = 4,
    SetAxisParameter = 5,
    GetAxisParameter = 6,
    StoreAxisParameter = 7,
    RestoreAxisParameter = 8,
    SetGlobalParameter = 9,
    GetGlobalParameter = 10,
    StoreGlobalParameter = 11,
    RestoreGlobalParameter = 12,
}

impl Instruction {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Instruction::RotateRight => "ROR",
            Instruction::RotateLeft => "ROL",
            Instruction::MotorStop => "MST",
            Instruction::MoveToPosition => "MVP",
            Instruction::SetAxisParameter => "SAP",
            Instruction::GetAxisParameter => "GAP",
            Instruction::StoreAxisParameter => "STAP",
            Instruction::RestoreAxisParameter => "RSAP",
            Instruction::SetGlobalParameter => "SGP",
            Instruction::GetGlobalParameter => "GGP",
            Instruction::StoreGlobalParameter => "STGP",
            Instruction::RestoreGlobalParameter => "RSGP",
        }
    }
}

/// Instruction, type and bank/motor selector of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub instruction: Instruction,
    pub type_number: u8,
    pub bank_or_motor: u8,
}

impl CommandHeader {
    pub const fn new(instruction: Instruction, type_number: u8, bank_or_motor: u8) -> Self {
        Self {
            instruction,
            type_number,
            bank_or_motor,
        }
    }

    pub fn command(&self, module_address: u8, value: i32) -> BinaryCommand {
        BinaryCommand::new(module_address, self.instruction.code(), self.type_number, self.bank_or_motor, value)
    }
}

/// Values of axis parameter 138.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampMode {
    Position,
    Velocity,
}

impl RampMode {
    pub fn value(self) -> i32 {
        match self {
            RampMode::Position => 0,
            RampMode::Velocity => 2,
        }
    }
}

/// Trinamic PD-110 stepper driver.
pub struct Pd110<T: Transport> {
    protocol: BinaryProtocol<T>,
    motor: u8,
}

impl Pd110<SerialTransport> {
    /// Opens the serial port described by `config` and talks to `module_address`.
    pub fn open(config: &SerialConfig, module_address: u8) -> Result<Self> {
        let transport = SerialTransport::open(config)?;
        Ok(Self::new(BinaryProtocol::new(transport, module_address)))
    }
}

impl<T: Transport> Pd110<T> {
    pub fn new(protocol: BinaryProtocol<T>) -> Self {
        Self { protocol, motor: 0 }
    }

    /// Selects the motor addressed by axis commands.
    pub fn with_motor(mut self, motor: u8) -> Self {
        self.motor = motor;
        self
    }

    pub fn motor(&self) -> u8 {
        self.motor
    }

    pub fn protocol(&self) -> &BinaryProtocol<T> {
        &self.protocol
    }

    pub fn into_protocol(self) -> BinaryProtocol<T> {
        self.protocol
    }

    pub fn send(&mut self, header: CommandHeader, value: i32) -> Result<BinaryResponse> {
        let command = header.command(self.protocol.module_address(), value);
        debug!("{} type={} bank/motor={} value={}", header.instruction.mnemonic(), header.type_number, header.bank_or_motor, value);
        self.protocol.execute(&command)
    }

    fn axis(&mut self, instruction: Instruction, param: AxisParameter, value: i32) -> Result<BinaryResponse> {
        let header = CommandHeader::new(instruction, param.id(), self.motor);
        self.send(header, value)
    }

    fn global(&mut self, instruction: Instruction, param: GlobalParameter, value: i32) -> Result<BinaryResponse> {
        let header = CommandHeader::new(instruction, param.id(), param.bank());
        self.send(header, value)
    }

    pub fn get_axis(&mut self, param: AxisParameter) -> Result<BinaryResponse> {
        self.axis(Instruction::GetAxisParameter, param, 0)
    }

    pub fn set_axis(&mut self, param: AxisParameter, value: i32) -> Result<BinaryResponse> {
        self.axis(Instruction::SetAxisParameter, param, value)
    }

    pub fn store_axis(&mut self, param: AxisParameter) -> Result<BinaryResponse> {
        self.axis(Instruction::StoreAxisParameter, param, 0)
    }

    pub fn restore_axis(&mut self, param: AxisParameter) -> Result<BinaryResponse> {
        self.axis(Instruction::RestoreAxisParameter, param, 0)
    }

    pub fn get_global(&mut self, param: GlobalParameter) -> Result<BinaryResponse> {
        self.global(Instruction::GetGlobalParameter, param, 0)
    }

    pub fn set_global(&mut self, param: GlobalParameter, value: i32) -> Result<BinaryResponse> {
        self.global(Instruction::SetGlobalParameter, param, value)
    }

    pub fn store_global(&mut self, param: GlobalParameter) -> Result<BinaryResponse> {
        self.global(Instruction::StoreGlobalParameter, param, 0)
    }

    pub fn restore_global(&mut self, param: GlobalParameter) -> Result<BinaryResponse> {
        self.global(Instruction::RestoreGlobalParameter, param, 0)
    }

    pub fn move_to(&mut self, move_type: MoveType, value: i32) -> Result<BinaryResponse> {
        let header = CommandHeader::new(Instruction::MoveToPosition, move_type.type_number(), self.motor);
        self.send(header, value)
    }

    pub fn move_abs(&mut self, position: i32) -> Result<BinaryResponse> {
        self.move_to(MoveType::Absolute, position)
    }

    pub fn move_rel(&mut self, offset: i32) -> Result<BinaryResponse> {
        self.move_to(MoveType::Relative, offset)
    }

    /// Moves to stored coordinate number `coordinate`.
    pub fn move_coord(&mut self, coordinate: i32) -> Result<BinaryResponse> {
        self.move_to(MoveType::Coordinate, coordinate)
    }

    pub fn move_right(&mut self, velocity: i32) -> Result<BinaryResponse> {
        let header = CommandHeader::new(Instruction::RotateRight, BinaryCommand::IGNORE, self.motor);
        self.send(header, velocity)
    }

    pub fn move_left(&mut self, velocity: i32) -> Result<BinaryResponse> {
        let header = CommandHeader::new(Instruction::RotateLeft, BinaryCommand::IGNORE, self.motor);
        self.send(header, velocity)
    }

    pub fn stop(&mut self) -> Result<BinaryResponse> {
        let header = CommandHeader::new(Instruction::MotorStop, BinaryCommand::IGNORE, self.motor);
        self.send(header, 0)
    }

    pub fn set_ramp_mode(&mut self, mode: RampMode) -> Result<BinaryResponse> {
        self.set_axis(AxisParameter::RampMode, mode.value())
    }

    /// Turns the motor by `degrees`, relative to where it stands.
    ///
    /// Partial steps round toward negative infinity, so -90 degrees is -3249 steps.
    pub fn move_degrees(&mut self, degrees: i32) -> Result<BinaryResponse> {
        let steps = (STEPS_PER_REVOLUTION * i64::from(degrees)).div_euclid(360);
        let steps = i32::try_from(steps)
            .map_err(|_| ProtocolError::InvalidParameter(format!("{} degrees is out of range", degrees)))?;
        self.move_rel(steps)
    }

    fn query(&mut self, param: AxisParameter) -> Result<i32> {
        Ok(self.get_axis(param)?.ensure_success()?.value())
    }

    fn update(&mut self, param: AxisParameter, value: i32) -> Result<()> {
        self.set_axis(param, value)?.ensure_success()?;
        Ok(())
    }

    pub fn position(&mut self) -> Result<i32> {
        self.query(AxisParameter::ActualPosition)
    }

    pub fn set_target_position(&mut self, position: i32) -> Result<()> {
        self.update(AxisParameter::TargetPosition, position)
    }

    pub fn speed_max(&mut self) -> Result<i32> {
        self.query(AxisParameter::MaxPositioningSpeed)
    }

    pub fn set_speed_max(&mut self, speed: i32) -> Result<()> {
        self.update(AxisParameter::MaxPositioningSpeed, speed)
    }

    /// Actual speed of the motor.
    pub fn speed(&mut self) -> Result<i32> {
        self.query(AxisParameter::ActualSpeed)
    }

    /// Sets the target speed; read it back through [`Pd110::speed`] once reached.
    pub fn set_speed(&mut self, speed: i32) -> Result<()> {
        self.update(AxisParameter::TargetSpeed, speed)
    }

    pub fn acceleration(&mut self) -> Result<i32> {
        self.query(AxisParameter::MaxAcceleration)
    }

    pub fn set_acceleration(&mut self, acceleration: i32) -> Result<()> {
        self.update(AxisParameter::MaxAcceleration, acceleration)
    }

    pub fn clear(&mut self) -> Result<usize> {
        self.protocol.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_checksum;
    use crate::params::{make_gpvar, NamedGlobal};
    use crate::transport::scripted::ScriptedTransport;

    fn ok(command_id: u8, value: i32) -> Vec<u8> {
        reply(100, command_id, value)
    }

    fn reply(status: u8, command_id: u8, value: i32) -> Vec<u8> {
        let mut frame = vec![2, 1, status, command_id];
        frame.extend_from_slice(&value.to_be_bytes());
        frame.push(compute_checksum(&frame));
        frame
    }

    fn driver(replies: &[Vec<u8>]) -> Pd110<ScriptedTransport> {
        let transport = replies.iter().fold(ScriptedTransport::new(), |t, r| t.reply(r));
        Pd110::new(BinaryProtocol::new(transport, 1))
    }

    fn sent(driver: &Pd110<ScriptedTransport>) -> Vec<[u8; 8]> {
        driver
            .protocol()
            .transport()
            .written
            .iter()
            .map(|frame| {
                assert_eq!(frame.len(), 9);
                assert_eq!(frame[8], compute_checksum(&frame[..8]));
                let mut header = [0u8; 8];
                header.copy_from_slice(&frame[..8]);
                header
            })
            .collect()
    }

    #[test]
    fn position_reads_actual_position() {
        let mut pd = driver(&[ok(6, 4242)]);
        assert_eq!(pd.position().unwrap(), 4242);
        assert_eq!(sent(&pd), vec![[1, 6, 1, 0, 0, 0, 0, 0]]);
    }

    #[test]
    fn setters_write_the_motion_parameters() {
        let mut pd = driver(&[ok(5, 0), ok(5, 0), ok(5, 0), ok(5, 0)]);
        pd.set_target_position(1000).unwrap();
        pd.set_speed_max(500).unwrap();
        pd.set_speed(300).unwrap();
        pd.set_acceleration(100).unwrap();
        assert_eq!(
            sent(&pd),
            vec![
                [1, 5, 0, 0, 0, 0, 0x03, 0xE8],
                [1, 5, 4, 0, 0, 0, 0x01, 0xF4],
                [1, 5, 2, 0, 0, 0, 0x01, 0x2C],
                [1, 5, 5, 0, 0, 0, 0x00, 0x64],
            ]
        );
    }

    #[test]
    fn getters_read_the_motion_parameters() {
        let mut pd = driver(&[ok(6, 1), ok(6, 2), ok(6, 3)]);
        assert_eq!(pd.speed_max().unwrap(), 1);
        assert_eq!(pd.speed().unwrap(), 2);
        assert_eq!(pd.acceleration().unwrap(), 3);
        let types: Vec<u8> = sent(&pd).iter().map(|h| h[2]).collect();
        assert_eq!(types, vec![4, 3, 5]);
    }

    #[test]
    fn typed_query_reports_rejection() {
        let mut pd = driver(&[reply(3, 6, 0)]);
        assert!(matches!(pd.position(), Err(ProtocolError::Rejected { status: 3 })));
    }

    #[test]
    fn rotation_and_stop() {
        let mut pd = driver(&[ok(1, 0), ok(2, 0), ok(3, 0)]);
        pd.move_right(500).unwrap();
        pd.move_left(250).unwrap();
        pd.stop().unwrap();
        assert_eq!(
            sent(&pd),
            vec![
                [1, 1, 0, 0, 0, 0, 0x01, 0xF4],
                [1, 2, 0, 0, 0, 0, 0x00, 0xFA],
                [1, 3, 0, 0, 0, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn move_types() {
        let mut pd = driver(&[ok(4, 0), ok(4, 0), ok(4, 0)]);
        pd.move_abs(100).unwrap();
        pd.move_rel(-1).unwrap();
        pd.move_coord(3).unwrap();
        assert_eq!(
            sent(&pd),
            vec![
                [1, 4, 0, 0, 0, 0, 0, 100],
                [1, 4, 1, 0, 0xFF, 0xFF, 0xFF, 0xFF],
                [1, 4, 2, 0, 0, 0, 0, 3],
            ]
        );
    }

    #[test]
    fn move_degrees_converts_to_steps() {
        let mut pd = driver(&[ok(4, 0), ok(4, 0)]);
        pd.move_degrees(180).unwrap();
        pd.move_degrees(-360).unwrap();
        let frames = sent(&pd);
        assert_eq!(i32::from_be_bytes([frames[0][4], frames[0][5], frames[0][6], frames[0][7]]), 6497);
        assert_eq!(i32::from_be_bytes([frames[1][4], frames[1][5], frames[1][6], frames[1][7]]), -12995);
    }

    #[test]
    fn move_degrees_floors_negative_partial_steps() {
        let mut pd = driver(&[ok(4, 0), ok(4, 0), ok(4, 0)]);
        pd.move_degrees(-90).unwrap();
        pd.move_degrees(-1).unwrap();
        pd.move_degrees(90).unwrap();
        let steps: Vec<i32> = sent(&pd).iter().map(|h| i32::from_be_bytes([h[4], h[5], h[6], h[7]])).collect();
        assert_eq!(steps, vec![-3249, -37, 3248]);
    }

    #[test]
    fn move_degrees_out_of_range_fails_before_io() {
        let mut pd = driver(&[]);
        assert!(matches!(pd.move_degrees(i32::MAX), Err(ProtocolError::InvalidParameter(_))));
        assert!(pd.protocol().transport().written.is_empty());
    }

    #[test]
    fn failed_move_is_reported() {
        let mut pd = driver(&[]);
        assert!(matches!(pd.move_degrees(90), Err(ProtocolError::TransportTimeout { .. })));
    }

    #[test]
    fn ramp_mode() {
        let mut pd = driver(&[ok(5, 0)]);
        pd.set_ramp_mode(RampMode::Velocity).unwrap();
        assert_eq!(sent(&pd), vec![[1, 5, 138, 0, 0, 0, 0, 2]]);
    }

    #[test]
    fn axis_commands_target_the_selected_motor() {
        let mut pd = driver(&[ok(7, 0), ok(8, 0)]).with_motor(2);
        pd.store_axis(AxisParameter::StallDetectionThreshold).unwrap();
        pd.restore_axis(AxisParameter::MicrostepResolution).unwrap();
        assert_eq!(sent(&pd), vec![[1, 7, 205, 2, 0, 0, 0, 0], [1, 8, 140, 2, 0, 0, 0, 0]]);
    }

    #[test]
    fn global_commands_use_bank_and_id() {
        let mut pd = driver(&[ok(10, 9600), ok(9, 0), ok(11, 0), ok(12, 0)]);
        let baud = GlobalParameter::from(NamedGlobal::Rs485BaudRate);
        assert_eq!(pd.get_global(baud).unwrap().value(), 9600);

        let gpvar = make_gpvar(30).unwrap();
        pd.set_global(gpvar, -2).unwrap();
        pd.store_global(gpvar).unwrap();
        pd.restore_global(GlobalParameter::new(0, 64).unwrap()).unwrap();

        assert_eq!(
            sent(&pd),
            vec![
                [1, 10, 65, 0, 0, 0, 0, 0],
                [1, 9, 30, 2, 0xFF, 0xFF, 0xFF, 0xFE],
                [1, 11, 30, 2, 0, 0, 0, 0],
                [1, 12, 64, 0, 0, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn generic_calls_leave_status_to_the_caller() {
        let mut pd = driver(&[reply(5, 5, 0)]);
        let response = pd.set_axis(AxisParameter::MaxAcceleration, 10).unwrap();
        assert!(!response.is_successful());
    }

    #[test]
    fn clear_drains_the_line() {
        let mut pd = driver(&[ok(6, 0)]);
        assert_eq!(pd.clear().unwrap(), 1);
        assert!(pd.protocol().transport().written.is_empty());
    }

    #[test]
    fn instruction_codes() {
        assert_eq!(Instruction::MoveToPosition.code(), 4);
        assert_eq!(Instruction::RestoreGlobalParameter.code(), 12);
        assert_eq!(Instruction::GetAxisParameter.mnemonic(), "GAP");
    }
}
