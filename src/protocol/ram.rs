//! Typed builders for the RAM registers.

use super::ServoProtocol;
use crate::endian::write_u16_le;
use crate::error::{BuildError, OutOfRange};
use crate::units;

/// The RAM register map.
///
/// RAM values are volatile and reset when the servo powers down.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RamField {
	TorqueEnable,
	Led,
	CwComplianceMargin,
	CcwComplianceMargin,
	CwComplianceSlope,
	CcwComplianceSlope,
	GoalPosition,
	MovingSpeed,
	Acceleration,
	Deceleration,
	PresentPosition,
	PresentSpeed,
	PresentLoad,
	PresentVoltage,
	Temperature,
	RegWriteFlag,
	MovingFlag,
	Lock,
	MinPwm,
}

impl RamField {
	/// Every field in register order.
	pub const ALL: [RamField; 19] = [
		Self::TorqueEnable,
		Self::Led,
		Self::CwComplianceMargin,
		Self::CcwComplianceMargin,
		Self::CwComplianceSlope,
		Self::CcwComplianceSlope,
		Self::GoalPosition,
		Self::MovingSpeed,
		Self::Acceleration,
		Self::Deceleration,
		Self::PresentPosition,
		Self::PresentSpeed,
		Self::PresentLoad,
		Self::PresentVoltage,
		Self::Temperature,
		Self::RegWriteFlag,
		Self::MovingFlag,
		Self::Lock,
		Self::MinPwm,
	];

	/// The address of the first (or only) byte of the field.
	pub fn address(self) -> u8 {
		match self {
			Self::TorqueEnable => 0x18,
			Self::Led => 0x19,
			Self::CwComplianceMargin => 0x1A,
			Self::CcwComplianceMargin => 0x1B,
			Self::CwComplianceSlope => 0x1C,
			Self::CcwComplianceSlope => 0x1D,
			Self::GoalPosition => 0x1E,
			Self::MovingSpeed => 0x20,
			Self::Acceleration => 0x22,
			Self::Deceleration => 0x23,
			Self::PresentPosition => 0x24,
			Self::PresentSpeed => 0x26,
			Self::PresentLoad => 0x28,
			Self::PresentVoltage => 0x2A,
			Self::Temperature => 0x2B,
			Self::RegWriteFlag => 0x2C,
			Self::MovingFlag => 0x2E,
			Self::Lock => 0x2F,
			Self::MinPwm => 0x30,
		}
	}

	/// The width of the field in bytes.
	pub fn size(self) -> u8 {
		match self {
			Self::GoalPosition
			| Self::MovingSpeed
			| Self::PresentPosition
			| Self::PresentSpeed
			| Self::PresentLoad
			| Self::MinPwm => 2,
			_ => 1,
		}
	}

	/// Whether the field accepts writes.
	pub fn writable(self) -> bool {
		!matches!(
			self,
			Self::PresentPosition
				| Self::PresentSpeed
				| Self::PresentLoad
				| Self::PresentVoltage
				| Self::Temperature
				| Self::RegWriteFlag
				| Self::MovingFlag
		)
	}
}

/// Typed packet builders for the RAM registers of one servo.
#[derive(Debug, Copy, Clone)]
pub struct Ram {
	servo: ServoProtocol,
}

impl Ram {
	pub(super) fn new(servo: ServoProtocol) -> Self {
		Self { servo }
	}

	/// Read a single field.
	pub fn get(self, field: RamField) -> Vec<u8> {
		self.servo.read(field.address(), field.size())
	}

	/// Read `length` bytes starting at `field`.
	pub fn read_block(self, field: RamField, length: u8) -> Vec<u8> {
		self.servo.read(field.address(), length)
	}

	pub fn get_torque_enable(self) -> Vec<u8> {
		self.get(RamField::TorqueEnable)
	}

	/// Enable or disable the output torque.
	pub fn set_torque_enable(self, enable: bool) -> Vec<u8> {
		self.servo.write(RamField::TorqueEnable.address(), &[enable as u8])
	}

	pub fn get_led(self) -> Vec<u8> {
		self.get(RamField::Led)
	}

	pub fn set_led(self, on: bool) -> Vec<u8> {
		self.servo.write(RamField::Led.address(), &[on as u8])
	}

	pub fn get_cw_compliance_margin(self) -> Vec<u8> {
		self.get(RamField::CwComplianceMargin)
	}

	pub fn get_ccw_compliance_margin(self) -> Vec<u8> {
		self.get(RamField::CcwComplianceMargin)
	}

	pub fn get_cw_compliance_slope(self) -> Vec<u8> {
		self.get(RamField::CwComplianceSlope)
	}

	pub fn get_ccw_compliance_slope(self) -> Vec<u8> {
		self.get(RamField::CcwComplianceSlope)
	}

	/// Move to an angle at the speed currently configured in the servo.
	pub fn move_to(self, degrees: f32) -> Result<Vec<u8>, BuildError> {
		let position = units::degrees_to_register(degrees)?;
		let mut data = [0; 2];
		write_u16_le(&mut data, position);
		Ok(self.servo.write(RamField::GoalPosition.address(), &data))
	}

	/// Move to an angle at the given speed.
	///
	/// Goal position and moving speed are adjacent registers,
	/// so both are written in one transfer.
	pub fn move_to_with_speed_rpm(self, degrees: f32, rpm: f32) -> Result<Vec<u8>, BuildError> {
		let position = units::degrees_to_register(degrees)?;
		let speed = units::rpm_to_register(rpm)?;
		let mut data = [0; 4];
		write_u16_le(&mut data[0..], position);
		write_u16_le(&mut data[2..], speed);
		Ok(self.servo.write(RamField::GoalPosition.address(), &data))
	}

	/// Stage a move that is applied by a later ACTION.
	pub fn reg_write_move_to(self, degrees: f32) -> Result<Vec<u8>, BuildError> {
		let position = units::degrees_to_register(degrees)?;
		let mut data = [0; 2];
		write_u16_le(&mut data, position);
		Ok(self.servo.reg_write(RamField::GoalPosition.address(), &data))
	}

	/// Apply the staged writes of every servo that has one pending.
	pub fn action(self) -> Vec<u8> {
		self.servo.action()
	}

	pub fn get_goal_position(self) -> Vec<u8> {
		self.get(RamField::GoalPosition)
	}

	pub fn get_moving_speed(self) -> Vec<u8> {
		self.get(RamField::MovingSpeed)
	}

	/// Set the acceleration and deceleration ramps in one transfer.
	pub fn set_acceleration_deceleration(self, acceleration: u8, deceleration: u8) -> Vec<u8> {
		self.servo.write(RamField::Acceleration.address(), &[acceleration, deceleration])
	}

	pub fn get_acceleration(self) -> Vec<u8> {
		self.get(RamField::Acceleration)
	}

	pub fn get_deceleration(self) -> Vec<u8> {
		self.get(RamField::Deceleration)
	}

	/// Read the acceleration and deceleration ramps in one transfer.
	pub fn get_acceleration_deceleration(self) -> Vec<u8> {
		self.read_block(RamField::Acceleration, 2)
	}

	pub fn get_position(self) -> Vec<u8> {
		self.get(RamField::PresentPosition)
	}

	pub fn get_speed(self) -> Vec<u8> {
		self.get(RamField::PresentSpeed)
	}

	pub fn get_load(self) -> Vec<u8> {
		self.get(RamField::PresentLoad)
	}

	pub fn get_voltage(self) -> Vec<u8> {
		self.get(RamField::PresentVoltage)
	}

	pub fn get_temperature(self) -> Vec<u8> {
		self.get(RamField::Temperature)
	}

	/// Check whether a staged write is waiting for an ACTION.
	pub fn get_reg_write_flag(self) -> Vec<u8> {
		self.get(RamField::RegWriteFlag)
	}

	/// Check whether the servo is currently moving.
	pub fn get_moving_flag(self) -> Vec<u8> {
		self.get(RamField::MovingFlag)
	}

	pub fn get_lock(self) -> Vec<u8> {
		self.get(RamField::Lock)
	}

	/// Lock the control table so only addresses 0x18 to 0x23 accept writes.
	pub fn set_lock(self, lock: bool) -> Vec<u8> {
		self.servo.write(RamField::Lock.address(), &[lock as u8])
	}

	pub fn get_min_pwm(self) -> Vec<u8> {
		self.get(RamField::MinPwm)
	}

	/// Set the minimum PWM duty, 0 to 1023.
	pub fn set_min_pwm(self, pwm: u16) -> Result<Vec<u8>, BuildError> {
		OutOfRange::check("minimum PWM", f32::from(pwm), 0.0, 1023.0)?;
		let mut data = [0; 2];
		write_u16_le(&mut data, pwm);
		Ok(self.servo.write(RamField::MinPwm.address(), &data))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::{assert, let_assert};

	fn ram(id: u8) -> Ram {
		ServoProtocol::new(id).unwrap().ram()
	}

	#[test]
	fn test_torque_and_led() {
		assert!(ram(0).set_torque_enable(false) == [0xFF, 0xFF, 0x00, 0x04, 0x03, 0x18, 0x00, 0xE0]);
		assert!(ram(0).set_led(false) == [0xFF, 0xFF, 0x00, 0x04, 0x03, 0x19, 0x00, 0xDF]);
	}

	#[test]
	fn test_move_to() {
		let_assert!(Ok(packet) = ram(0).move_to(150.0));
		assert!(packet == [0xFF, 0xFF, 0x00, 0x05, 0x03, 0x1E, 0x00, 0x02, 0xD7]);
		assert!(ram(0).move_to(300.1).is_err());
	}

	#[test]
	fn test_move_to_with_speed_rpm() {
		let_assert!(Ok(packet) = ram(0).move_to_with_speed_rpm(150.0, 31.0));
		assert!(packet == [0xFF, 0xFF, 0x00, 0x07, 0x03, 0x1E, 0x00, 0x02, 0x00, 0x02, 0xD3]);
		assert!(ram(0).move_to_with_speed_rpm(150.0, 0.0).is_err());
		assert!(ram(0).move_to_with_speed_rpm(150.0, 62.1).is_err());
	}

	#[test]
	fn test_reg_write_move_to() {
		let_assert!(Ok(packet) = ram(2).reg_write_move_to(0.0));
		assert!(packet == [0xFF, 0xFF, 0x02, 0x05, 0x04, 0x1E, 0x00, 0x00, 0xD6]);

		let_assert!(Ok(packet) = ram(1).reg_write_move_to(300.0));
		assert!(packet == [0xFF, 0xFF, 0x01, 0x05, 0x04, 0x1E, 0xFF, 0x03, 0xD5]);
	}

	#[test]
	fn test_set_acceleration_deceleration() {
		let packet = ram(0).set_acceleration_deceleration(4, 6);
		assert!(packet == [0xFF, 0xFF, 0x00, 0x05, 0x03, 0x22, 0x04, 0x06, 0xCB]);
	}

	#[test]
	fn test_telemetry_reads() {
		assert!(ram(0).get_position() == [0xFF, 0xFF, 0x00, 0x04, 0x02, 0x24, 0x02, 0xD3]);
		assert!(ram(0).get_speed() == [0xFF, 0xFF, 0x00, 0x04, 0x02, 0x26, 0x02, 0xD1]);
		assert!(ram(0).get_load() == [0xFF, 0xFF, 0x00, 0x04, 0x02, 0x28, 0x02, 0xCF]);
		assert!(ram(0).get_voltage() == [0xFF, 0xFF, 0x00, 0x04, 0x02, 0x2A, 0x01, 0xCE]);
		assert!(ram(0).get_temperature() == [0xFF, 0xFF, 0x00, 0x04, 0x02, 0x2B, 0x01, 0xCD]);
		assert!(ram(0).get_reg_write_flag() == [0xFF, 0xFF, 0x00, 0x04, 0x02, 0x2C, 0x01, 0xCC]);
		assert!(ram(0).get_moving_flag() == [0xFF, 0xFF, 0x00, 0x04, 0x02, 0x2E, 0x01, 0xCA]);
	}

	#[test]
	fn test_lock() {
		assert!(ram(0).set_lock(true) == [0xFF, 0xFF, 0x00, 0x04, 0x03, 0x2F, 0x01, 0xC8]);
	}

	#[test]
	fn test_set_min_pwm() {
		let_assert!(Ok(packet) = ram(0).set_min_pwm(90));
		assert!(packet == [0xFF, 0xFF, 0x00, 0x05, 0x03, 0x30, 0x5A, 0x00, 0x6D]);
		assert!(ram(0).set_min_pwm(1024).is_err());
	}
}
