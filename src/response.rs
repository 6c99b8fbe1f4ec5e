//! Validation and extraction of response packets.

use crate::checksum::packet_checksum;
use crate::error::{HeaderNotFound, InvalidChecksum, InvalidLength, ParseError, TooShort};
use crate::protocol::{EepromField, RamField, HEADER_PREFIX};

/// Fault flags reported in the error byte of a response.
///
/// A single response may assert several flags at once.
/// The same bits configure the alarm LED and alarm shutdown registers.
#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct FaultFlags(u8);

impl FaultFlags {
	pub const INSTRUCTION_ERROR: u8 = 1 << 6;
	pub const OVERLOAD: u8 = 1 << 5;
	pub const CHECKSUM_ERROR: u8 = 1 << 4;
	pub const COMMAND_OUT_OF_RANGE: u8 = 1 << 3;
	pub const OVERHEAT: u8 = 1 << 2;
	pub const ANGLE_OUT_OF_RANGE: u8 = 1 << 1;
	pub const VOLTAGE_OUT_OF_RANGE: u8 = 1 << 0;

	const LABELS: [(u8, &'static str); 7] = [
		(Self::INSTRUCTION_ERROR, "instruction error"),
		(Self::OVERLOAD, "overload"),
		(Self::CHECKSUM_ERROR, "checksum error"),
		(Self::COMMAND_OUT_OF_RANGE, "command out of range"),
		(Self::OVERHEAT, "overheat"),
		(Self::ANGLE_OUT_OF_RANGE, "angle out of range"),
		(Self::VOLTAGE_OUT_OF_RANGE, "voltage out of range"),
	];

	/// Wrap a raw error byte.
	pub fn from_raw(raw: u8) -> Self {
		Self(raw)
	}

	/// The raw error byte.
	pub fn raw(self) -> u8 {
		self.0
	}

	/// Whether no fault is asserted.
	pub fn is_ok(self) -> bool {
		self.0 == 0
	}

	/// Whether the given flag is asserted.
	pub fn contains(self, flag: u8) -> bool {
		self.0 & flag != 0
	}

	/// A human readable description, listing asserted flags from high bit to low bit.
	pub fn describe(self) -> String {
		self.to_string()
	}
}

impl std::fmt::Display for FaultFlags {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		if self.is_ok() {
			return write!(f, "no fault");
		}
		let mut first = true;
		for (flag, label) in Self::LABELS {
			if self.contains(flag) {
				if !first {
					write!(f, ", ")?;
				}
				write!(f, "{}", label)?;
				first = false;
			}
		}
		Ok(())
	}
}

impl std::fmt::Debug for FaultFlags {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "FaultFlags({:#04X}: {})", self.0, self)
	}
}

/// A validated response packet.
///
/// Owns the full frame, including the header and checksum.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StatusPacket {
	data: Vec<u8>,
}

impl StatusPacket {
	/// The raw bytes of the frame, including header and checksum.
	pub fn as_bytes(&self) -> &[u8] {
		&self.data
	}

	/// The identifier of the servo that sent the response.
	pub fn id(&self) -> u8 {
		self.data[2]
	}

	/// The fault flags of the response.
	pub fn error(&self) -> FaultFlags {
		FaultFlags::from_raw(self.data[4])
	}

	/// The parameter bytes of the response.
	pub fn parameters(&self) -> &[u8] {
		&self.data[5..self.data.len() - 1]
	}
}

/// Validate a candidate response and extract it as a [`StatusPacket`].
///
/// The input must start with the `0xFF 0xFF` header; callers that read from
/// a stream should resynchronize with [`find_header`] first. Trailing bytes
/// beyond the length claimed by the packet are ignored.
pub fn validate_and_extract(data: &[u8]) -> Result<StatusPacket, ParseError> {
	if data.len() < 2 || data[..2] != HEADER_PREFIX {
		return Err(HeaderNotFound.into());
	}
	if data.len() < 6 {
		return Err(TooShort { actual: data.len(), expected: 6 }.into());
	}
	let length = data[3] as usize;
	if length < 2 {
		// The length byte always counts the error byte and the checksum, so
		// this can only be noise. Waiting for more bytes would never help;
		// stream readers must resynchronize past the header instead.
		return Err(InvalidLength { actual: data[3] }.into());
	}
	let total = length + 4;
	if data.len() < total {
		return Err(TooShort { actual: data.len(), expected: total }.into());
	}
	let computed = packet_checksum(&data[2..total - 1]);
	InvalidChecksum::check(data[total - 1], computed)?;
	Ok(StatusPacket {
		data: data[..total].to_vec(),
	})
}

/// Find the first possible start of a packet header.
///
/// This returns the first position of the header prefix. Note that if the
/// buffer ends with a partial header prefix, the start position of the
/// partial prefix is returned.
pub fn find_header(buffer: &[u8]) -> usize {
	for i in 0..buffer.len() {
		let possible_prefix = HEADER_PREFIX.len().min(buffer.len() - i);
		if buffer[i..].starts_with(&HEADER_PREFIX[..possible_prefix]) {
			return i;
		}
	}

	buffer.len()
}

/// Map a block of EEPROM bytes read starting at `start` to fields in register order.
///
/// Consumes one value per known field and stops when the data runs out.
/// Two byte fields consume a low/high byte pair.
pub fn parse_eeprom_block(data: &[u8], start: EepromField) -> Vec<(EepromField, u16)> {
	parse_block(data, EepromField::ALL.iter().copied().skip_while(|&field| field != start), EepromField::size)
}

/// Map a block of RAM bytes read starting at `start` to fields in register order.
pub fn parse_ram_block(data: &[u8], start: RamField) -> Vec<(RamField, u16)> {
	parse_block(data, RamField::ALL.iter().copied().skip_while(|&field| field != start), RamField::size)
}

fn parse_block<F: Copy>(data: &[u8], fields: impl Iterator<Item = F>, size: impl Fn(F) -> u8) -> Vec<(F, u16)> {
	let mut values = Vec::new();
	let mut index = 0;
	for field in fields {
		let size = size(field) as usize;
		if index + size > data.len() {
			break;
		}
		let value = if size == 2 {
			crate::endian::read_u16_le(&data[index..])
		} else {
			u16::from(data[index])
		};
		values.push((field, value));
		index += size;
	}
	values
}
