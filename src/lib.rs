//! Host side driver for CDS55xx serial bus servos.
//!
//! The servos share one half duplex serial line and speak a framed packet
//! protocol: `0xFF 0xFF`, an identifier, a length, an instruction, optional
//! parameters and an inverted sum checksum. This crate builds and parses
//! those packets, runs the request/response traffic on the line, discovers
//! servos with unknown identifiers or baud rates, and reflashes servo
//! firmware through the serial bootloader.
//!
//! - [`ServoProtocol`] builds command packets; its [`protocol::Eeprom`],
//!   [`protocol::Ram`] and [`protocol::Motor`] views add typed builders for
//!   every register.
//! - [`validate_and_extract`] parses response packets into [`StatusPacket`]s.
//! - [`Bus`] owns a transport and turns the line into an RPC with per call
//!   timeouts.
//! - [`Scanner`] sweeps identifiers and baud rates for unknown servos.
//! - [`firmware`] drives the XMODEM style bootloader protocol.
//!
//! The serial line is abstracted by the [`Transport`] trait, implemented
//! for real ports by [`SerialTransport`] on top of the `serial2` crate.

#[macro_use]
mod log;

pub mod checksum;
pub mod endian;
pub mod firmware;
pub mod protocol;
pub mod transport;
pub mod units;

mod bus;
mod error;
mod response;
mod scanner;

pub use bus::Bus;
pub use error::{
	BuildError, HeaderNotFound, InvalidBlockSize, InvalidChecksum, InvalidId, InvalidLength, OutOfRange, ParseError,
	ShortWrite, TooShort, TransferError, TransportError,
};
pub use protocol::{Instruction, ServoProtocol, SyncWriteData, BROADCAST_ID, MAX_UNICAST_ID};
pub use response::{find_header, parse_eeprom_block, parse_ram_block, validate_and_extract, FaultFlags, StatusPacket};
pub use scanner::{Scanner, ScannerConfig, MAX_SCAN_ID};
pub use transport::{SerialSettings, SerialTransport, Timeout, Transport};
