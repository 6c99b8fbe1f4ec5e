use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use cds55xx::transport::{Timeout, Transport};
use cds55xx::TransportError;

/// A byte buffer shared between a test and a mock transport.
#[derive(Clone, Default)]
pub struct SharedBuffer {
	buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
	pub fn new() -> SharedBuffer {
		SharedBuffer::default()
	}

	pub fn lock(&self) -> MutexGuard<Vec<u8>> {
		self.buffer.lock().unwrap()
	}

	pub fn push(&self, data: &[u8]) {
		self.lock().extend_from_slice(data);
	}

	pub fn take(&self) -> Vec<u8> {
		std::mem::take(&mut *self.lock())
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}
}

type Device = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// A [`Transport`] backed by in memory buffers, with a scripted device on
/// the far side of the line.
///
/// The device closure is invoked once per write with exactly the written
/// bytes; whatever it returns becomes readable input.
pub struct MockTransport {
	read_buffer: SharedBuffer,
	written: SharedBuffer,
	device: Option<Device>,
	timeout: Timeout,
}

impl MockTransport {
	pub fn new() -> Self {
		Self {
			read_buffer: SharedBuffer::new(),
			written: SharedBuffer::new(),
			device: None,
			timeout: Timeout::simple(50),
		}
	}

	pub fn with_device<F>(device: F) -> Self
	where
		F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
	{
		let mut transport = Self::new();
		transport.device = Some(Box::new(device));
		transport
	}

	pub fn with_timeout(mut self, timeout: Timeout) -> Self {
		self.timeout = timeout;
		self
	}

	/// The buffer the transport reads from. Tests push device-to-host
	/// bytes (or garbage) here directly.
	pub fn read_buffer(&self) -> SharedBuffer {
		self.read_buffer.clone()
	}

	/// Every byte written by the host so far.
	pub fn written(&self) -> SharedBuffer {
		self.written.clone()
	}
}

impl Transport for MockTransport {
	fn is_open(&self) -> bool {
		true
	}

	fn timeout(&self) -> Timeout {
		self.timeout
	}

	fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
		self.written.push(data);
		if let Some(device) = self.device.as_mut() {
			if let Some(reply) = device(data) {
				self.read_buffer.push(&reply);
			}
		}
		Ok(data.len())
	}

	fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
		let deadline = Instant::now() + self.timeout.read_timeout(buffer.len());
		loop {
			{
				let mut data = self.read_buffer.lock();
				if !data.is_empty() {
					let count = data.len().min(buffer.len());
					buffer[..count].copy_from_slice(&data[..count]);
					data.drain(..count);
					return Ok(count);
				}
			}
			if Instant::now() >= deadline {
				return Ok(0);
			}
			std::thread::sleep(Duration::from_millis(1));
		}
	}

	fn bytes_available(&mut self) -> Result<usize, TransportError> {
		Ok(self.read_buffer.len())
	}

	fn flush_input(&mut self) -> Result<(), TransportError> {
		self.read_buffer.take();
		Ok(())
	}

	fn wait_readable(&mut self, timeout: Duration) -> Result<bool, TransportError> {
		let deadline = Instant::now() + timeout;
		loop {
			if self.read_buffer.len() > 0 {
				return Ok(true);
			}
			if Instant::now() >= deadline {
				return Ok(false);
			}
			std::thread::sleep(Duration::from_millis(1));
		}
	}
}
