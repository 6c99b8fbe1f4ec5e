//! Request/response engine for one half duplex serial line.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{ParseError, ShortWrite, TransferError, TransportError};
use crate::response::{find_header, validate_and_extract, StatusPacket};
use crate::transport::{SerialSettings, SerialTransport, Transport};

// How long the reader sleeps when the line is idle.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(2);

// How long the reader sleeps when the port is not usable.
const CLOSED_PORT_RETRY: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 256;

type BroadcastCallback = Box<dyn FnMut(&StatusPacket) + Send>;

/// A request/response engine for one half duplex serial bus.
///
/// The bus owns its transport. A background reader frames incoming bytes
/// and hands each parsed response to the caller that transmitted last.
/// The send lock is held from the transmission until the reply arrives or
/// the timeout expires, so at most one request is in flight at any moment
/// and responses are delivered in the order senders acquired the lock.
///
/// All methods take `&self`; share a bus between threads with [`Arc`].
pub struct Bus<T: Transport + Send + 'static> {
	shared: Arc<Shared<T>>,
	reader: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<T> {
	port: Mutex<T>,
	send_lock: Mutex<()>,
	running: AtomicBool,
	message_counter: AtomicU64,
	waiters: Mutex<HashMap<u64, Arc<Waiter>>>,
	broadcast: Mutex<Option<BroadcastCallback>>,
}

struct Waiter {
	state: Mutex<WaitState>,
	condition: Condvar,
}

enum WaitState {
	Pending,
	Complete(StatusPacket),
	Closed,
}

impl Waiter {
	fn new() -> Self {
		Self {
			state: Mutex::new(WaitState::Pending),
			condition: Condvar::new(),
		}
	}

	fn wait(&self, timeout: Duration) -> Result<StatusPacket, TransferError> {
		let deadline = Instant::now() + timeout;
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		loop {
			match std::mem::replace(&mut *state, WaitState::Pending) {
				WaitState::Complete(packet) => return Ok(packet),
				WaitState::Closed => return Err(TransferError::Closed),
				WaitState::Pending => (),
			}
			let now = Instant::now();
			if now >= deadline {
				return Err(TransferError::Timeout);
			}
			let (guard, _) = self
				.condition
				.wait_timeout(state, deadline - now)
				.unwrap_or_else(PoisonError::into_inner);
			state = guard;
		}
	}

	fn complete(&self, packet: StatusPacket) {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		*state = WaitState::Complete(packet);
		self.condition.notify_one();
	}

	fn close(&self) {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		if let WaitState::Pending = *state {
			*state = WaitState::Closed;
		}
		self.condition.notify_one();
	}
}

impl Bus<SerialTransport> {
	/// Open a serial port and start a bus on it.
	pub fn open(path: impl AsRef<Path>, settings: &SerialSettings) -> Result<Self, TransportError> {
		Ok(Self::new(SerialTransport::open(path, settings)?))
	}
}

impl<T: Transport + Send + 'static> Bus<T> {
	/// Take exclusive ownership of a transport and start the reader.
	pub fn new(transport: T) -> Self {
		let shared = Arc::new(Shared {
			port: Mutex::new(transport),
			send_lock: Mutex::new(()),
			running: AtomicBool::new(true),
			message_counter: AtomicU64::new(0),
			waiters: Mutex::new(HashMap::new()),
			broadcast: Mutex::new(None),
		});
		let reader = {
			let shared = shared.clone();
			std::thread::spawn(move || run_reader(&shared))
		};
		Self {
			shared,
			reader: Mutex::new(Some(reader)),
		}
	}

	/// Register a callback invoked with every successfully parsed response.
	///
	/// The callback runs on the reader thread, in addition to any waiter
	/// being fulfilled. It must not call [`Self::close`].
	pub fn on_broadcast<F>(&self, callback: F)
	where
		F: FnMut(&StatusPacket) + Send + 'static,
	{
		let mut broadcast = self.shared.broadcast.lock().unwrap_or_else(PoisonError::into_inner);
		*broadcast = Some(Box::new(callback));
	}

	/// Transmit a packet without retrieving a reply.
	///
	/// Use this for broadcasts and for servos whose status return level
	/// suppresses replies. Returns whether the port became readable within
	/// the transport's base read window.
	pub fn send_no_wait(&self, data: &[u8]) -> Result<bool, TransferError> {
		let _send = self.shared.send_lock.lock().unwrap_or_else(PoisonError::into_inner);
		if !self.shared.running.load(Ordering::Acquire) {
			return Err(TransferError::Closed);
		}
		let mut port = self.shared.port.lock().unwrap_or_else(PoisonError::into_inner);
		transmit(&mut *port, data)?;
		let window = port.timeout().read_timeout(0);
		port.wait_readable(window).map_err(TransferError::Write)
	}

	/// Transmit a packet and wait for the matching response.
	///
	/// The waiter is registered under a fresh message counter value before
	/// the packet is written, and the send lock is held until the response
	/// arrives or `timeout` expires, so the reader always finds exactly one
	/// outstanding waiter.
	pub fn send_and_wait(&self, data: &[u8], timeout: Duration) -> Result<StatusPacket, TransferError> {
		let _send = self.shared.send_lock.lock().unwrap_or_else(PoisonError::into_inner);
		if !self.shared.running.load(Ordering::Acquire) {
			return Err(TransferError::Closed);
		}
		let key = self.shared.message_counter.fetch_add(1, Ordering::AcqRel) + 1;
		let waiter = Arc::new(Waiter::new());
		{
			let mut waiters = self.shared.waiters.lock().unwrap_or_else(PoisonError::into_inner);
			waiters.insert(key, waiter.clone());
		}
		let transmitted = {
			let mut port = self.shared.port.lock().unwrap_or_else(PoisonError::into_inner);
			transmit(&mut *port, data)
		};
		let result = match transmitted {
			Ok(()) => waiter.wait(timeout),
			Err(e) => Err(e),
		};
		let mut waiters = self.shared.waiters.lock().unwrap_or_else(PoisonError::into_inner);
		waiters.remove(&key);
		result
	}

	/// Stop the reader and wake every pending waiter with a closed error.
	///
	/// Closing is idempotent. The bus cannot be reused afterwards.
	pub fn close(&self) {
		if self.shared.running.swap(false, Ordering::AcqRel) {
			let waiters = self.shared.waiters.lock().unwrap_or_else(PoisonError::into_inner);
			for waiter in waiters.values() {
				waiter.close();
			}
		}
		let handle = {
			let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
			reader.take()
		};
		if let Some(handle) = handle {
			let _ = handle.join();
		}
	}
}

impl<T: Transport + Send + 'static> Drop for Bus<T> {
	fn drop(&mut self) {
		self.close();
	}
}

// Send discipline shared by both send paths: raise the direction line,
// drop stale input, write, lower the direction line again.
fn transmit<T: Transport>(port: &mut T, data: &[u8]) -> Result<(), TransferError> {
	port.set_direction(true).map_err(TransferError::Write)?;
	port.flush_input().map_err(TransferError::Write)?;
	trace!("sending command: {:02X?}", data);
	let written = port.write(data).map_err(TransferError::Write)?;
	port.set_direction(false).map_err(TransferError::Write)?;
	ShortWrite::check(written, data.len())
		.map_err(|e| TransferError::Write(TransportError::ShortWrite(e)))?;
	Ok(())
}

fn run_reader<T: Transport>(shared: &Shared<T>) {
	let mut buffer = Vec::new();
	let mut chunk = [0; READ_CHUNK];
	while shared.running.load(Ordering::Acquire) {
		let read = {
			let mut port = shared.port.lock().unwrap_or_else(PoisonError::into_inner);
			if !port.is_open() {
				None
			} else {
				match port.bytes_available() {
					Ok(0) | Err(_) => Some(0),
					Ok(_) => match port.read(&mut chunk) {
						Ok(count) => Some(count),
						Err(e) => {
							debug!("bus read failed: {}", e);
							Some(0)
						},
					},
				}
			}
		};
		match read {
			None => std::thread::sleep(CLOSED_PORT_RETRY),
			Some(0) => std::thread::sleep(READ_POLL_INTERVAL),
			Some(count) => {
				buffer.extend_from_slice(&chunk[..count]);
				process_buffer(shared, &mut buffer);
			},
		}
	}
}

// Frame and dispatch everything currently in the rolling buffer.
fn process_buffer<T: Transport>(shared: &Shared<T>, buffer: &mut Vec<u8>) {
	loop {
		let garbage = find_header(buffer);
		if garbage > 0 {
			debug!("skipping {} bytes of leading garbage", garbage);
			trace!("skipped garbage: {:02X?}", &buffer[..garbage]);
			buffer.drain(..garbage);
		}
		if buffer.len() < 6 {
			return;
		}
		match validate_and_extract(buffer) {
			Ok(packet) => {
				buffer.drain(..packet.as_bytes().len());
				deliver(shared, packet);
			},
			Err(ParseError::TooShort(_)) => return,
			Err(e) => {
				// Bad frame: drop the header marker and resynchronize.
				debug!("discarding invalid response: {}", e);
				buffer.drain(..2);
			},
		}
	}
}

fn deliver<T: Transport>(shared: &Shared<T>, packet: StatusPacket) {
	trace!("response from {}: {:02X?}", packet.id(), packet.as_bytes());
	// The half duplex send discipline guarantees the counter still holds
	// the value of the request this response answers.
	let key = shared.message_counter.load(Ordering::Acquire);
	let waiter = {
		let waiters = shared.waiters.lock().unwrap_or_else(PoisonError::into_inner);
		waiters.get(&key).cloned()
	};
	if let Some(waiter) = waiter {
		waiter.complete(packet.clone());
	}
	let mut broadcast = shared.broadcast.lock().unwrap_or_else(PoisonError::into_inner);
	if let Some(callback) = broadcast.as_mut() {
		callback(&packet);
	}
}
