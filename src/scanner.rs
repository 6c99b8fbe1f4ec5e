//! Discovery of servos with unknown identifiers or baud rates.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{ParseError, TransportError};
use crate::protocol::ServoProtocol;
use crate::response::{find_header, validate_and_extract, FaultFlags};
use crate::transport::{SerialTransport, Timeout, Transport};

/// The highest identifier the scanner tries. 0xFE is the broadcast
/// identifier and never answers with its own.
pub const MAX_SCAN_ID: u8 = 253;

/// Configuration for a bus scan.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
	/// The serial port to scan.
	pub port: PathBuf,

	/// The baud rates to try, in order.
	pub baud_rates: Vec<u32>,

	/// Only report replies whose identifier matches the pinged one.
	/// When disabled, any activity after a ping counts as a discovery.
	pub verify: bool,

	/// How long to wait for each ping reply.
	pub search_timeout: Duration,
}

impl ScannerConfig {
	/// Scan the given port with verification on and a 500 ms reply window.
	pub fn new(port: impl Into<PathBuf>, baud_rates: Vec<u32>) -> Self {
		Self {
			port: port.into(),
			baud_rates,
			verify: true,
			search_timeout: Duration::from_millis(500),
		}
	}
}

/// Sweeps every (baud rate, identifier) pair on a port and reports servos
/// that answer a ping.
///
/// A scanner runs at most one background worker. Reports arrive on that
/// worker through the callback passed to [`Scanner::start`], ordered by baud
/// rate and then by identifier. The callback must not call back into the
/// scanner.
pub struct Scanner {
	config: ScannerConfig,
	stop: Arc<AtomicBool>,
	scanning: Arc<AtomicBool>,
	worker: Option<JoinHandle<()>>,
}

impl Scanner {
	pub fn new(config: ScannerConfig) -> Self {
		Self {
			config,
			stop: Arc::new(AtomicBool::new(false)),
			scanning: Arc::new(AtomicBool::new(false)),
			worker: None,
		}
	}

	/// Whether a scan is currently running.
	pub fn is_scanning(&self) -> bool {
		self.scanning.load(Ordering::Acquire)
	}

	/// Start a scan on the configured serial port.
	///
	/// Does nothing when a scan is already running.
	pub fn start<F>(&mut self, callback: F)
	where
		F: FnMut(u32, u8, FaultFlags) + Send + 'static,
	{
		let config = self.config.clone();
		let timeout = Timeout::simple(self.config.search_timeout.as_millis() as u32);
		self.start_with(
			move |baud_rate| SerialTransport::open_simple(&config.port, baud_rate, timeout),
			callback,
		);
	}

	/// Start a scan using caller supplied transports, one per baud rate.
	pub fn start_with<T, O, F>(&mut self, open: O, callback: F)
	where
		T: Transport,
		O: FnMut(u32) -> Result<T, TransportError> + Send + 'static,
		F: FnMut(u32, u8, FaultFlags) + Send + 'static,
	{
		if self.scanning.swap(true, Ordering::AcqRel) {
			info!("a scan is already running");
			return;
		}
		self.stop.store(false, Ordering::Release);
		if let Some(worker) = self.worker.take() {
			let _ = worker.join();
		}
		let config = self.config.clone();
		let stop = self.stop.clone();
		let scanning = self.scanning.clone();
		self.worker = Some(std::thread::spawn(move || {
			run_scan(&config, &stop, open, callback);
			scanning.store(false, Ordering::Release);
		}));
	}

	/// Stop a running scan and wait for the worker to finish.
	///
	/// Stopping an idle scanner does nothing.
	pub fn stop(&mut self) {
		self.stop.store(true, Ordering::Release);
		if let Some(worker) = self.worker.take() {
			let _ = worker.join();
		}
	}
}

impl Drop for Scanner {
	fn drop(&mut self) {
		self.stop();
	}
}

fn run_scan<T, O, F>(config: &ScannerConfig, stop: &AtomicBool, mut open: O, mut callback: F)
where
	T: Transport,
	O: FnMut(u32) -> Result<T, TransportError>,
	F: FnMut(u32, u8, FaultFlags),
{
	for &baud_rate in &config.baud_rates {
		if stop.load(Ordering::Acquire) {
			info!("scan stopped");
			return;
		}
		info!("scanning {} at {} baud", config.port.display(), baud_rate);
		let mut port = match open(baud_rate) {
			Ok(port) => port,
			Err(e) => {
				error!("failed to open {} at {} baud: {}", config.port.display(), baud_rate, e);
				continue;
			},
		};
		for id in 0..=MAX_SCAN_ID {
			if stop.load(Ordering::Acquire) {
				info!("scan stopped");
				return;
			}
			scan_one(config, &mut port, baud_rate, id, &mut callback);
		}
		// The transport is dropped here; the next baud rate reopens the port.
	}
	info!("scan complete");
}

fn scan_one<T, F>(config: &ScannerConfig, port: &mut T, baud_rate: u32, id: u8, callback: &mut F)
where
	T: Transport,
	F: FnMut(u32, u8, FaultFlags),
{
	let Ok(servo) = ServoProtocol::new(id) else {
		return;
	};
	let ping = servo.ping();
	if port.flush_input().is_err() {
		return;
	}
	match port.write(&ping) {
		Ok(count) if count == ping.len() => (),
		_ => {
			debug!("failed to send ping to {}", id);
			return;
		},
	}

	if !config.verify {
		// Any activity within the window counts as a discovery.
		if matches!(port.wait_readable(config.search_timeout), Ok(true)) {
			debug!("activity from identifier {}", id);
			callback(baud_rate, id, FaultFlags::default());
		}
		return;
	}

	let deadline = Instant::now() + config.search_timeout;
	let mut response = Vec::new();
	let mut chunk = [0; 64];
	while Instant::now() < deadline {
		let read = match port.read(&mut chunk) {
			Ok(count) => count,
			Err(_) => return,
		};
		if read == 0 {
			continue;
		}
		response.extend_from_slice(&chunk[..read]);
		let start = find_header(&response);
		match validate_and_extract(&response[start..]) {
			Ok(packet) => {
				if packet.id() == id {
					debug!("found servo {} at {} baud", id, baud_rate);
					callback(baud_rate, id, packet.error());
				} else {
					debug!("reply for identifier {} while pinging {}", packet.id(), id);
				}
				return;
			},
			Err(ParseError::TooShort(_)) | Err(ParseError::HeaderNotFound(_)) => (),
			Err(e) => {
				debug!("discarding invalid ping reply: {}", e);
				return;
			},
		}
	}
}
