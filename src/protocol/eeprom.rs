//! Typed builders for the EEPROM registers.

use super::ServoProtocol;
use crate::endian::write_u16_le;
use crate::error::{BuildError, InvalidId, OutOfRange};
use crate::response::FaultFlags;
use crate::units;

/// The EEPROM register map.
///
/// EEPROM values survive a power cycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum EepromField {
	ModelNumber,
	Version,
	Id,
	BaudRate,
	ReturnDelayTime,
	CwAngleLimit,
	CcwAngleLimit,
	MaxTemperature,
	MinVoltage,
	MaxVoltage,
	MaxTorque,
	StatusReturnLevel,
	AlarmLed,
	AlarmShutdown,
}

impl EepromField {
	/// Every field in register order.
	pub const ALL: [EepromField; 14] = [
		Self::ModelNumber,
		Self::Version,
		Self::Id,
		Self::BaudRate,
		Self::ReturnDelayTime,
		Self::CwAngleLimit,
		Self::CcwAngleLimit,
		Self::MaxTemperature,
		Self::MinVoltage,
		Self::MaxVoltage,
		Self::MaxTorque,
		Self::StatusReturnLevel,
		Self::AlarmLed,
		Self::AlarmShutdown,
	];

	/// The address of the first (or only) byte of the field.
	pub fn address(self) -> u8 {
		match self {
			Self::ModelNumber => 0x00,
			Self::Version => 0x02,
			Self::Id => 0x03,
			Self::BaudRate => 0x04,
			Self::ReturnDelayTime => 0x05,
			Self::CwAngleLimit => 0x06,
			Self::CcwAngleLimit => 0x08,
			Self::MaxTemperature => 0x0B,
			Self::MinVoltage => 0x0C,
			Self::MaxVoltage => 0x0D,
			Self::MaxTorque => 0x0E,
			Self::StatusReturnLevel => 0x10,
			Self::AlarmLed => 0x11,
			Self::AlarmShutdown => 0x12,
		}
	}

	/// The width of the field in bytes.
	pub fn size(self) -> u8 {
		match self {
			Self::ModelNumber | Self::CwAngleLimit | Self::CcwAngleLimit | Self::MaxTorque => 2,
			_ => 1,
		}
	}

	/// Whether the field accepts writes.
	pub fn writable(self) -> bool {
		!matches!(self, Self::ModelNumber | Self::Version)
	}
}

/// What the servo replies to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StatusReturnLevel {
	/// Never reply, not even to reads.
	NoResponse = 0,

	/// Reply to read instructions only.
	ReadOnly = 1,

	/// Reply to every instruction.
	AllResponse = 2,
}

/// Typed packet builders for the EEPROM registers of one servo.
#[derive(Debug, Copy, Clone)]
pub struct Eeprom {
	servo: ServoProtocol,
}

impl Eeprom {
	pub(super) fn new(servo: ServoProtocol) -> Self {
		Self { servo }
	}

	/// Read a single field.
	pub fn get(self, field: EepromField) -> Vec<u8> {
		self.servo.read(field.address(), field.size())
	}

	/// Read `length` bytes starting at `field`.
	pub fn read_block(self, field: EepromField, length: u8) -> Vec<u8> {
		self.servo.read(field.address(), length)
	}

	pub fn get_model_number(self) -> Vec<u8> {
		self.get(EepromField::ModelNumber)
	}

	pub fn get_version(self) -> Vec<u8> {
		self.get(EepromField::Version)
	}

	pub fn get_id(self) -> Vec<u8> {
		self.get(EepromField::Id)
	}

	/// Assign a new identifier to the servo.
	pub fn set_id(self, new_id: u8) -> Result<Vec<u8>, BuildError> {
		InvalidId::check(new_id, super::MAX_UNICAST_ID)?;
		Ok(self.servo.write(EepromField::Id.address(), &[new_id]))
	}

	pub fn get_baud_rate(self) -> Vec<u8> {
		self.get(EepromField::BaudRate)
	}

	/// Change the bus baud rate of the servo.
	///
	/// Rates outside the supported table select the 1 Mbaud default.
	pub fn set_baud_rate(self, baud_rate: u32) -> Vec<u8> {
		let register = match baud_rate {
			1_000_000 => 0x01,
			500_000 => 0x03,
			250_000 => 0x07,
			115_200 => 0x10,
			57_600 => 0x22,
			19_200 => 0x67,
			_ => 0x01,
		};
		self.servo.write(EepromField::BaudRate.address(), &[register])
	}

	pub fn get_return_delay_time(self) -> Vec<u8> {
		self.get(EepromField::ReturnDelayTime)
	}

	/// Set how long the servo waits before answering, in microseconds.
	pub fn set_return_delay_time(self, delay: u8) -> Result<Vec<u8>, BuildError> {
		OutOfRange::check("return delay time", f32::from(delay), 0.0, 254.0)?;
		Ok(self.servo.write(EepromField::ReturnDelayTime.address(), &[delay]))
	}

	pub fn get_cw_angle_limit(self) -> Vec<u8> {
		self.get(EepromField::CwAngleLimit)
	}

	pub fn get_ccw_angle_limit(self) -> Vec<u8> {
		self.get(EepromField::CcwAngleLimit)
	}

	/// Read both angle limits in one transfer.
	pub fn get_angle_limits(self) -> Vec<u8> {
		self.read_block(EepromField::CwAngleLimit, 4)
	}

	/// Restrict the servo to a clockwise/counter-clockwise angle range.
	///
	/// A zero clockwise limit matches the factory default, so only the
	/// counter-clockwise register is written in that case; otherwise both
	/// registers are written as one block.
	pub fn set_angle_limits(self, cw_degrees: f32, ccw_degrees: f32) -> Result<Vec<u8>, BuildError> {
		let cw = units::degrees_to_limit_register(cw_degrees)?;
		let ccw = units::degrees_to_limit_register(ccw_degrees)?;
		if cw >= ccw {
			return Err(OutOfRange {
				what: "clockwise angle limit",
				value: cw_degrees,
				min: 0.0,
				max: ccw_degrees,
			}
			.into());
		}
		if cw == 0 {
			let mut data = [0; 2];
			write_u16_le(&mut data, ccw);
			Ok(self.servo.write(EepromField::CcwAngleLimit.address(), &data))
		} else {
			let mut data = [0; 4];
			write_u16_le(&mut data[0..], cw);
			write_u16_le(&mut data[2..], ccw);
			Ok(self.servo.write(EepromField::CwAngleLimit.address(), &data))
		}
	}

	pub fn get_max_temperature(self) -> Vec<u8> {
		self.get(EepromField::MaxTemperature)
	}

	/// Set the temperature above which the servo raises an overheat fault.
	pub fn set_max_temperature(self, celsius: u8) -> Result<Vec<u8>, BuildError> {
		OutOfRange::check("temperature", f32::from(celsius), 0.0, 80.0)?;
		Ok(self.servo.write(EepromField::MaxTemperature.address(), &[celsius]))
	}

	pub fn get_min_voltage(self) -> Vec<u8> {
		self.get(EepromField::MinVoltage)
	}

	pub fn get_max_voltage(self) -> Vec<u8> {
		self.get(EepromField::MaxVoltage)
	}

	/// Read both voltage bounds in one transfer.
	pub fn get_voltage_range(self) -> Vec<u8> {
		self.read_block(EepromField::MinVoltage, 2)
	}

	/// Set the allowed supply voltage band, in volts.
	pub fn set_voltage_range(self, min_volts: f32, max_volts: f32) -> Result<Vec<u8>, BuildError> {
		let min = units::volts_to_register(min_volts)?;
		let max = units::volts_to_register(max_volts)?;
		if min >= max {
			return Err(OutOfRange {
				what: "minimum voltage",
				value: min_volts,
				min: 6.0,
				max: max_volts,
			}
			.into());
		}
		Ok(self.servo.write(EepromField::MinVoltage.address(), &[min, max]))
	}

	pub fn get_max_torque(self) -> Vec<u8> {
		self.get(EepromField::MaxTorque)
	}

	/// Limit the output torque, 0 to 1023.
	pub fn set_max_torque(self, torque: u16) -> Result<Vec<u8>, BuildError> {
		OutOfRange::check("torque", f32::from(torque), 0.0, 1023.0)?;
		let mut data = [0; 2];
		write_u16_le(&mut data, torque);
		Ok(self.servo.write(EepromField::MaxTorque.address(), &data))
	}

	pub fn get_status_return_level(self) -> Vec<u8> {
		self.get(EepromField::StatusReturnLevel)
	}

	/// Choose which instructions the servo answers.
	pub fn set_status_return_level(self, level: StatusReturnLevel) -> Vec<u8> {
		self.servo.write(EepromField::StatusReturnLevel.address(), &[level as u8])
	}

	pub fn get_alarm_led(self) -> Vec<u8> {
		self.get(EepromField::AlarmLed)
	}

	/// Choose which faults make the LED blink.
	pub fn set_alarm_led(self, faults: FaultFlags) -> Vec<u8> {
		self.servo.write(EepromField::AlarmLed.address(), &[faults.raw()])
	}

	pub fn get_alarm_shutdown(self) -> Vec<u8> {
		self.get(EepromField::AlarmShutdown)
	}

	/// Choose which faults disable the output torque.
	pub fn set_alarm_shutdown(self, faults: FaultFlags) -> Vec<u8> {
		self.servo.write(EepromField::AlarmShutdown.address(), &[faults.raw()])
	}
}
