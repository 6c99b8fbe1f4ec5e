//! Conversions between engineering units and register values.
//!
//! Positions occupy a 10 bit register spanning 0 to 300 degrees,
//! speeds a 10 bit register spanning 0 to 62 RPM,
//! voltages a single byte holding tenths of a volt.

use crate::error::OutOfRange;

/// The largest angle a position register can hold, in degrees.
pub const MAX_DEGREES: f32 = 300.0;

/// The largest speed a moving speed register can hold, in RPM.
pub const MAX_RPM: f32 = 62.0;

const REGISTER_MAX: f32 = 1023.0;

/// Convert an angle in degrees to a goal position register value.
pub fn degrees_to_register(degrees: f32) -> Result<u16, OutOfRange> {
	OutOfRange::check("angle", degrees, 0.0, MAX_DEGREES)?;
	Ok((degrees / MAX_DEGREES * REGISTER_MAX).round() as u16)
}

/// Convert a position register value to degrees.
pub fn register_to_degrees(register: u16) -> f32 {
	f32::from(register) * MAX_DEGREES / REGISTER_MAX
}

/// Convert an angle in degrees to an angle limit register value.
///
/// Limit registers truncate instead of rounding: 150 degrees maps to 511.
pub fn degrees_to_limit_register(degrees: f32) -> Result<u16, OutOfRange> {
	OutOfRange::check("angle limit", degrees, 0.0, MAX_DEGREES)?;
	Ok((degrees / MAX_DEGREES * REGISTER_MAX) as u16)
}

/// Convert a servo mode speed in RPM to a moving speed register value.
///
/// Servo mode speeds are strictly positive.
/// A register value of zero means "full speed" on the wire, so zero is rejected here.
pub fn rpm_to_register(rpm: f32) -> Result<u16, OutOfRange> {
	if !(rpm > 0.0 && rpm <= MAX_RPM) {
		return Err(OutOfRange {
			what: "speed",
			value: rpm,
			min: 0.0,
			max: MAX_RPM,
		});
	}
	Ok((rpm * REGISTER_MAX / MAX_RPM).round() as u16)
}

/// Convert a moving speed register value to RPM.
pub fn register_to_rpm(register: u16) -> f32 {
	f32::from(register) * MAX_RPM / REGISTER_MAX
}

/// Convert a signed wheel mode speed in RPM to a moving speed register value.
///
/// The magnitude occupies bits 0 to 9.
/// Bit 10 selects the direction: set for clockwise (non-negative speeds).
pub fn wheel_rpm_to_register(rpm: f32) -> Result<u16, OutOfRange> {
	OutOfRange::check("wheel speed", rpm, -MAX_RPM, MAX_RPM)?;
	let magnitude = (rpm.abs() * REGISTER_MAX / MAX_RPM).round() as u16;
	if rpm >= 0.0 {
		Ok(magnitude | 1 << 10)
	} else {
		Ok(magnitude)
	}
}

/// Convert a voltage in volts to its register value.
pub fn volts_to_register(volts: f32) -> Result<u8, OutOfRange> {
	OutOfRange::check("voltage", volts, 6.0, 10.0)?;
	Ok((volts * 10.0).round() as u8)
}

/// Convert a voltage register value to volts.
pub fn register_to_volts(register: u8) -> f32 {
	f32::from(register) / 10.0
}

/// Decode a position register split in low and high bytes to degrees.
pub fn position_to_degrees(low: u8, high: u8) -> f32 {
	register_to_degrees(word_to_int(low, high))
}

/// Decode a speed register split in low and high bytes to RPM.
pub fn speed_to_rpm(low: u8, high: u8) -> f32 {
	register_to_rpm(word_to_int(low, high))
}

/// Widen a single register byte.
pub fn byte_to_int(byte: u8) -> u16 {
	u16::from(byte)
}

/// Combine a low and high register byte pair.
pub fn word_to_int(low: u8, high: u8) -> u16 {
	u16::from(low) | u16::from(high) << 8
}
