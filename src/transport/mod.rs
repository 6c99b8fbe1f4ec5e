//! The [`Transport`] trait describes the serial line the driver talks through.
//!
//! The bus, the discovery scanner and the firmware updater all consume this
//! contract instead of a concrete serial port, so they can be driven against
//! anything that moves bytes. The `serial2` backed implementation lives in
//! [`SerialTransport`].

mod serial2;

pub use serial2::SerialTransport;

use std::time::Duration;

use crate::error::TransportError;

/// Timeout profile of a transport.
///
/// The effective timeout of an `n` byte read is
/// `read_constant + n * read_multiplier` milliseconds, and equivalently for
/// writes. The inter byte timeout bounds the gap between consecutive bytes
/// of one read, where the backend supports it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Timeout {
	/// Maximum gap between consecutive bytes of one read, in milliseconds.
	pub inter_byte: u32,

	/// Base read timeout in milliseconds.
	pub read_constant: u32,

	/// Additional read timeout per requested byte, in milliseconds.
	pub read_multiplier: u32,

	/// Base write timeout in milliseconds.
	pub write_constant: u32,

	/// Additional write timeout per written byte, in milliseconds.
	pub write_multiplier: u32,
}

impl Timeout {
	/// A profile that waits `ms` milliseconds for any read or write,
	/// without per byte scaling.
	pub fn simple(ms: u32) -> Self {
		Self {
			inter_byte: u32::MAX,
			read_constant: ms,
			read_multiplier: 0,
			write_constant: ms,
			write_multiplier: 0,
		}
	}

	/// The timeout for a read of `count` bytes.
	pub fn read_timeout(&self, count: usize) -> Duration {
		Duration::from_millis(u64::from(self.read_constant) + u64::from(self.read_multiplier) * count as u64)
	}

	/// The timeout for a write of `count` bytes.
	pub fn write_timeout(&self, count: usize) -> Duration {
		Duration::from_millis(u64::from(self.write_constant) + u64::from(self.write_multiplier) * count as u64)
	}
}

/// Number of data bits per character.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CharSize {
	Five,
	Six,
	Seven,
	Eight,
}

/// Parity checking mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Parity {
	None,
	Odd,
	Even,
	Mark,
	Space,
}

/// Number of stop bits per character.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopBits {
	One,
	OnePointFive,
	Two,
}

/// Flow control mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlowControl {
	None,
	Software,
	Hardware,
}

/// How the transmit direction of an RS-485 transceiver is signalled.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DirectionMode {
	/// No direction line; the transceiver manages itself.
	None,

	/// Drive the RTS line: high while transmitting, low while receiving.
	Rts,
}

/// Serial line settings.
///
/// The servos speak 8-N-1 without flow control, which is the default.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SerialSettings {
	pub baud_rate: u32,
	pub char_size: CharSize,
	pub parity: Parity,
	pub stop_bits: StopBits,
	pub flow_control: FlowControl,
	pub timeout: Timeout,
	pub direction: DirectionMode,
}

impl SerialSettings {
	/// 8-N-1 at the given baud rate, no flow control, no direction line,
	/// one second timeouts.
	pub fn new(baud_rate: u32) -> Self {
		Self {
			baud_rate,
			char_size: CharSize::Eight,
			parity: Parity::None,
			stop_bits: StopBits::One,
			flow_control: FlowControl::None,
			timeout: Timeout::simple(1000),
			direction: DirectionMode::None,
		}
	}
}

/// A half duplex serial line.
///
/// Implementations are expected to be blocking; every read and write is
/// bounded by the [`Timeout`] profile the transport reports.
pub trait Transport {
	/// Whether the transport is usable.
	fn is_open(&self) -> bool;

	/// The timeout profile of the transport.
	fn timeout(&self) -> Timeout;

	/// Write the buffer, returning the number of bytes accepted.
	fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

	/// Read up to `buffer.len()` bytes.
	///
	/// Returns 0 when the read timeout expires without data.
	fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError>;

	/// The number of bytes that can be read without blocking.
	fn bytes_available(&mut self) -> Result<usize, TransportError>;

	/// Discard unread input.
	fn flush_input(&mut self) -> Result<(), TransportError>;

	/// Wait until at least one byte can be read, or the timeout expires.
	fn wait_readable(&mut self, timeout: Duration) -> Result<bool, TransportError>;

	/// Drive the direction line, when one is configured.
	fn set_direction(&mut self, _high: bool) -> Result<(), TransportError> {
		Ok(())
	}
}
