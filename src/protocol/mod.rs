//! Construction of command packets.
//!
//! A [`ServoProtocol`] is configured with one servo identifier and builds
//! fully framed packets for it. Register specific builders live on the
//! [`Eeprom`], [`Ram`] and [`Motor`] views, which borrow nothing and simply
//! reuse the identifier.

mod eeprom;
mod motor;
mod ram;

pub use eeprom::{Eeprom, EepromField, StatusReturnLevel};
pub use motor::Motor;
pub use ram::{Ram, RamField};

use crate::checksum::packet_checksum;
use crate::error::{BuildError, InvalidBlockSize, InvalidId, TooShort};

/// The packet header preceding every command and response.
pub const HEADER_PREFIX: [u8; 2] = [0xFF, 0xFF];

/// The broadcast identifier. Broadcast packets are never answered.
pub const BROADCAST_ID: u8 = 0xFE;

/// The largest identifier a single servo can have.
pub const MAX_UNICAST_ID: u8 = 0xFD;

/// Instructions understood by the servos.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
	/// Query the working state of a servo.
	Ping,

	/// Read a span of the control table.
	Read,

	/// Write a span of the control table.
	Write,

	/// Stage a write that is applied by a later [`Instruction::Action`].
	RegWrite,

	/// Apply all staged writes at once.
	Action,

	/// Restore the control table to factory defaults.
	Reset,

	/// Restart the servo into its serial bootloader.
	///
	/// The instruction code is vendor specific and not part of the public
	/// protocol documentation.
	BootloaderReset,

	/// Write distinct blocks to multiple servos in one broadcast.
	SyncWrite,
}

impl Instruction {
	/// The instruction code as it appears on the wire.
	pub fn id(self) -> u8 {
		match self {
			Self::Ping => 0x01,
			Self::Read => 0x02,
			Self::Write => 0x03,
			Self::RegWrite => 0x04,
			Self::Action => 0x05,
			Self::Reset => 0x06,
			Self::BootloaderReset => 0x08,
			Self::SyncWrite => 0x83,
		}
	}

	/// Whether a command with this instruction carries an address byte.
	pub fn takes_address(self) -> bool {
		match self {
			Self::Read | Self::Write | Self::RegWrite | Self::SyncWrite => true,
			Self::Ping | Self::Action | Self::Reset | Self::BootloaderReset => false,
		}
	}
}

/// One servo's block in a synchronous write.
#[derive(Debug, Clone)]
pub struct SyncWriteData<'a> {
	/// The servo the block is for.
	pub servo_id: u8,

	/// The bytes to write, exactly the advertised write length.
	pub data: &'a [u8],
}

/// Packet builder for one servo on the bus.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ServoProtocol {
	id: u8,
}

impl ServoProtocol {
	/// Create a builder for the given servo identifier.
	///
	/// [`BROADCAST_ID`] is accepted; replies must not be awaited for it.
	pub fn new(id: u8) -> Result<Self, InvalidId> {
		InvalidId::check(id, BROADCAST_ID)?;
		Ok(Self { id })
	}

	/// Create a builder addressing every servo on the bus.
	pub fn broadcast() -> Self {
		Self { id: BROADCAST_ID }
	}

	/// The identifier this builder addresses.
	pub fn id(self) -> u8 {
		self.id
	}

	/// Whether this builder addresses the whole bus.
	pub fn is_broadcast(self) -> bool {
		self.id == BROADCAST_ID
	}

	/// Typed builders for the EEPROM registers.
	pub fn eeprom(self) -> Eeprom {
		Eeprom::new(self)
	}

	/// Typed builders for the RAM registers.
	pub fn ram(self) -> Ram {
		Ram::new(self)
	}

	/// Builders for continuous rotation (wheel) mode.
	pub fn motor(self) -> Motor {
		Motor::new(self)
	}

	/// Build a fully framed command packet.
	///
	/// The length byte counts the instruction, the optional address, the
	/// parameters and the checksum. The checksum is the inverted sum of
	/// every byte after the two header bytes.
	pub fn command(self, instruction: Instruction, address: u8, parameters: &[u8]) -> Vec<u8> {
		let mut packet = Vec::with_capacity(7 + parameters.len());
		packet.extend_from_slice(&HEADER_PREFIX);
		packet.push(self.id);
		if instruction.takes_address() {
			packet.push(parameters.len() as u8 + 3);
			packet.push(instruction.id());
			packet.push(address);
		} else {
			packet.push(parameters.len() as u8 + 2);
			packet.push(instruction.id());
		}
		packet.extend_from_slice(parameters);
		let checksum = packet_checksum(&packet[2..]);
		packet.push(checksum);
		packet
	}

	/// Query the working state of the servo.
	///
	/// Servos answer a ping regardless of their status return level,
	/// unless it was broadcast.
	pub fn ping(self) -> Vec<u8> {
		self.command(Instruction::Ping, 0, &[])
	}

	/// Restore the control table to factory defaults.
	pub fn reset(self) -> Vec<u8> {
		self.command(Instruction::Reset, 0, &[])
	}

	/// Restart the servo into its serial bootloader.
	pub fn reset_to_bootloader(self) -> Vec<u8> {
		self.command(Instruction::BootloaderReset, 0, &[])
	}

	/// Apply the staged writes of every servo that has one pending.
	pub fn action(self) -> Vec<u8> {
		self.command(Instruction::Action, 0, &[])
	}

	/// Read `count` bytes of the control table starting at `address`.
	pub fn read(self, address: u8, count: u8) -> Vec<u8> {
		self.command(Instruction::Read, address, &[count])
	}

	/// Write bytes to the control table starting at `address`.
	pub fn write(self, address: u8, data: &[u8]) -> Vec<u8> {
		self.command(Instruction::Write, address, data)
	}

	/// Stage a write that is applied by a later ACTION.
	pub fn reg_write(self, address: u8, data: &[u8]) -> Vec<u8> {
		self.command(Instruction::RegWrite, address, data)
	}

	/// Extract the final `write_length` parameter bytes from a framed command packet.
	///
	/// This strips the header, identifier, length, instruction, address and
	/// checksum, leaving only the value bytes. Useful to turn a regular
	/// write packet into a [`SyncWriteData`] block.
	pub fn short_payload(write_length: usize, packet: &[u8]) -> Result<&[u8], TooShort> {
		// Smallest enclosing packet: header, id, length, instruction, address, payload, checksum.
		let expected = write_length + 7;
		if packet.len() < expected {
			return Err(TooShort {
				actual: packet.len(),
				expected,
			});
		}
		let end = packet.len() - 1;
		Ok(&packet[end - write_length..end])
	}

	/// Build a synchronous write carrying one block per listed servo.
	///
	/// The packet body is the start address, the per servo write length and
	/// then each servo's identifier followed by its block. Every block must
	/// be exactly `write_length` bytes.
	pub fn sync_write(
		self,
		address: u8,
		write_length: usize,
		blocks: &[SyncWriteData],
	) -> Result<Vec<u8>, BuildError> {
		let mut parameters = Vec::with_capacity(1 + blocks.len() * (write_length + 1));
		parameters.push(write_length as u8);
		for block in blocks {
			InvalidId::check(block.servo_id, MAX_UNICAST_ID)?;
			InvalidBlockSize::check(block.data.len(), write_length)?;
			parameters.push(block.servo_id);
			parameters.extend_from_slice(block.data);
		}
		Ok(self.command(Instruction::SyncWrite, address, &parameters))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::{assert, let_assert};

	#[test]
	fn test_ping() {
		let_assert!(Ok(servo) = ServoProtocol::new(1));
		assert!(servo.ping() == [0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
	}

	#[test]
	fn test_reset() {
		let_assert!(Ok(servo) = ServoProtocol::new(0));
		assert!(servo.reset() == [0xFF, 0xFF, 0x00, 0x02, 0x06, 0xF7]);
	}

	#[test]
	fn test_action_broadcast() {
		let servo = ServoProtocol::broadcast();
		assert!(servo.action() == [0xFF, 0xFF, 0xFE, 0x02, 0x05, 0xFA]);
	}

	#[test]
	fn test_read() {
		let_assert!(Ok(servo) = ServoProtocol::new(1));
		// Read the temperature register.
		assert!(servo.read(0x2B, 1) == [0xFF, 0xFF, 0x01, 0x04, 0x02, 0x2B, 0x01, 0xCC]);
	}

	#[test]
	fn test_write() {
		// Broadcast a new identifier.
		let servo = ServoProtocol::broadcast();
		assert!(servo.write(0x03, &[0x01]) == [0xFF, 0xFF, 0xFE, 0x04, 0x03, 0x03, 0x01, 0xF6]);
	}

	#[test]
	fn test_invalid_id() {
		let_assert!(Err(e) = ServoProtocol::new(0xFF));
		assert!(e.actual == 0xFF);
	}

	#[test]
	fn test_short_payload() {
		let_assert!(Ok(servo) = ServoProtocol::new(0));
		let packet = servo.write(0x1E, &[0x00, 0x02, 0x00, 0x02]);
		let_assert!(Ok(payload) = ServoProtocol::short_payload(4, &packet));
		assert!(payload == [0x00, 0x02, 0x00, 0x02]);
		assert!(ServoProtocol::short_payload(16, &packet).is_err());
	}

	#[test]
	fn test_sync_write() {
		let servo = ServoProtocol::broadcast();
		let blocks = [
			SyncWriteData { servo_id: 0, data: &[0x10, 0x00, 0x50, 0x01] },
			SyncWriteData { servo_id: 1, data: &[0x20, 0x02, 0x60, 0x03] },
			SyncWriteData { servo_id: 2, data: &[0x30, 0x00, 0x70, 0x01] },
			SyncWriteData { servo_id: 3, data: &[0x20, 0x02, 0x80, 0x03] },
		];
		let_assert!(Ok(packet) = servo.sync_write(0x1E, 4, &blocks));
		assert!(
			packet
				== [
					0xFF, 0xFF, 0xFE, 0x18, 0x83, 0x1E, 0x04, 0x00, 0x10, 0x00, 0x50, 0x01, 0x01, 0x20, 0x02, 0x60,
					0x03, 0x02, 0x30, 0x00, 0x70, 0x01, 0x03, 0x20, 0x02, 0x80, 0x03, 0x12
				]
		);
	}

	#[test]
	fn test_sync_write_wrong_block_size() {
		let servo = ServoProtocol::broadcast();
		let blocks = [SyncWriteData { servo_id: 0, data: &[0x10, 0x00] }];
		let_assert!(Err(BuildError::InvalidBlockSize(e)) = servo.sync_write(0x1E, 4, &blocks));
		assert!(e.actual == 2);
		assert!(e.expected == 4);
	}
}
