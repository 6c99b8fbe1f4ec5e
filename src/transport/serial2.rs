//! Transport implementation using the `serial2` crate.

use std::path::Path;
use std::time::Duration;

use super::{CharSize, DirectionMode, FlowControl, Parity, SerialSettings, StopBits, Timeout, Transport};
use crate::error::TransportError;

// Timeout used to poll for buffered input without really blocking.
const PROBE_TIMEOUT: Duration = Duration::from_millis(1);

const READ_AHEAD_CHUNK: usize = 256;

/// A [`Transport`] backed by a [`serial2::SerialPort`].
///
/// The port itself exposes no readability poll, so the transport reads ahead
/// into an internal buffer to answer [`Transport::bytes_available`] and
/// [`Transport::wait_readable`]; later reads drain that buffer first.
pub struct SerialTransport {
	port: serial2::SerialPort,
	timeout: Timeout,
	direction: DirectionMode,
	pending: Vec<u8>,
}

impl SerialTransport {
	/// Open a serial port with the given settings.
	///
	/// Mark and space parity and 1.5 stop bits are not representable in the
	/// backend and are rejected with [`TransportError::Unsupported`], as is
	/// combining hardware flow control with RTS direction gating.
	pub fn open(path: impl AsRef<Path>, settings: &SerialSettings) -> Result<Self, TransportError> {
		let char_size = match settings.char_size {
			CharSize::Five => serial2::CharSize::Bits5,
			CharSize::Six => serial2::CharSize::Bits6,
			CharSize::Seven => serial2::CharSize::Bits7,
			CharSize::Eight => serial2::CharSize::Bits8,
		};
		let parity = match settings.parity {
			Parity::None => serial2::Parity::None,
			Parity::Odd => serial2::Parity::Odd,
			Parity::Even => serial2::Parity::Even,
			Parity::Mark | Parity::Space => return Err(TransportError::Unsupported("mark and space parity")),
		};
		let stop_bits = match settings.stop_bits {
			StopBits::One => serial2::StopBits::One,
			StopBits::Two => serial2::StopBits::Two,
			StopBits::OnePointFive => return Err(TransportError::Unsupported("1.5 stop bits")),
		};
		let flow_control = match settings.flow_control {
			FlowControl::None => serial2::FlowControl::None,
			FlowControl::Software => serial2::FlowControl::XonXoff,
			FlowControl::Hardware => serial2::FlowControl::RtsCts,
		};
		if settings.direction == DirectionMode::Rts && settings.flow_control == FlowControl::Hardware {
			return Err(TransportError::Unsupported("RTS direction gating with hardware flow control"));
		}

		let baud_rate = settings.baud_rate;
		let port = serial2::SerialPort::open(path, move |mut serial: serial2::Settings| {
			serial.set_raw();
			serial.set_baud_rate(baud_rate)?;
			serial.set_char_size(char_size);
			serial.set_parity(parity);
			serial.set_stop_bits(stop_bits);
			serial.set_flow_control(flow_control);
			Ok(serial)
		})?;

		let mut transport = Self {
			port,
			timeout: settings.timeout,
			direction: settings.direction,
			pending: Vec::new(),
		};
		// Start out in receive mode.
		transport.set_direction(false)?;
		Ok(transport)
	}

	/// Open a serial port with default 8-N-1 settings and the given timeout profile.
	pub fn open_simple(path: impl AsRef<Path>, baud_rate: u32, timeout: Timeout) -> Result<Self, TransportError> {
		let mut settings = SerialSettings::new(baud_rate);
		settings.timeout = timeout;
		Self::open(path, &settings)
	}

	// Pull whatever the port has buffered into the read-ahead buffer,
	// waiting at most `timeout`.
	fn read_ahead(&mut self, timeout: Duration) -> Result<(), TransportError> {
		self.port.set_read_timeout(timeout.max(PROBE_TIMEOUT)).map_err(TransportError::Io)?;
		let mut chunk = [0; READ_AHEAD_CHUNK];
		match self.port.read(&mut chunk) {
			Ok(count) => {
				self.pending.extend_from_slice(&chunk[..count]);
				Ok(())
			},
			Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
			Err(e) => Err(TransportError::Io(e)),
		}
	}
}

impl std::fmt::Debug for SerialTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("SerialTransport")
			.field("timeout", &self.timeout)
			.field("direction", &self.direction)
			.finish_non_exhaustive()
	}
}

impl Transport for SerialTransport {
	fn is_open(&self) -> bool {
		true
	}

	fn timeout(&self) -> Timeout {
		self.timeout
	}

	fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
		self.port
			.set_write_timeout(self.timeout.write_timeout(data.len()))
			.map_err(TransportError::Io)?;
		self.port.write(data).map_err(TransportError::Io)
	}

	fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
		if !self.pending.is_empty() {
			let count = self.pending.len().min(buffer.len());
			buffer[..count].copy_from_slice(&self.pending[..count]);
			self.pending.drain(..count);
			return Ok(count);
		}
		self.port
			.set_read_timeout(self.timeout.read_timeout(buffer.len()))
			.map_err(TransportError::Io)?;
		match self.port.read(buffer) {
			Ok(count) => Ok(count),
			Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
			Err(e) => Err(TransportError::Io(e)),
		}
	}

	fn bytes_available(&mut self) -> Result<usize, TransportError> {
		if self.pending.is_empty() {
			self.read_ahead(PROBE_TIMEOUT)?;
		}
		Ok(self.pending.len())
	}

	fn flush_input(&mut self) -> Result<(), TransportError> {
		self.pending.clear();
		self.port.discard_input_buffer().map_err(TransportError::Io)
	}

	fn wait_readable(&mut self, timeout: Duration) -> Result<bool, TransportError> {
		if self.pending.is_empty() {
			self.read_ahead(timeout)?;
		}
		Ok(!self.pending.is_empty())
	}

	fn set_direction(&mut self, high: bool) -> Result<(), TransportError> {
		match self.direction {
			DirectionMode::None => Ok(()),
			DirectionMode::Rts => self.port.set_rts(high).map_err(TransportError::Io),
		}
	}
}
