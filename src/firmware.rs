//! Firmware replacement over the serial bus.
//!
//! The servo bootloader speaks an XMODEM style protocol at 9600 baud.
//! A session walks through four phases: reset the servo into its
//! bootloader at the normal bus baud rate, handshake, transfer the image
//! in 133 byte frames, and sign off with an end of transmission byte.
//! Every phase and every frame is retried a bounded number of times, and
//! the whole session is retried around all of that.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::checksum::crc16_ccitt;
use crate::error::TransportError;
use crate::protocol::ServoProtocol;
use crate::transport::{SerialSettings, SerialTransport, Timeout, Transport};

/// The byte the host repeats to ask the bootloader for a transfer.
pub const HANDSHAKE_REQUEST: u8 = 0x64;

/// The byte the bootloader repeats while it is ready to receive.
pub const HANDSHAKE_ACK: u8 = 0x43;

/// The byte that ends a completed transfer.
pub const END_OF_TRANSMISSION: u8 = 0x04;

/// The first byte of every data frame.
pub const FRAME_MARKER: u8 = 0x01;

/// The payload carried by one data frame.
pub const FRAME_PAYLOAD: usize = 128;

/// The total size of one data frame.
pub const FRAME_LEN: usize = FRAME_PAYLOAD + 5;

// The bootloader always listens at this rate, regardless of the bus rate.
const BOOTLOADER_BAUD: u32 = 9600;

const HANDSHAKE_WRITE_ATTEMPTS: u32 = 10;
const HANDSHAKE_WRITE_SPACING: Duration = Duration::from_millis(100);
const HANDSHAKE_POLL_INTERVAL: Duration = Duration::from_millis(5);
const FRAME_REPLY_WINDOW: Duration = Duration::from_millis(1000);
const FRAME_RETRY_BACKOFF: Duration = Duration::from_millis(100);
const WAVE_RETRY_SPACING: Duration = Duration::from_millis(20);
const SESSION_RETRY_BACKOFF: Duration = Duration::from_millis(2000);
const TRANSFER_POLL_INTERVAL: Duration = Duration::from_millis(1);
const BOOT_REPLY_WINDOW: Duration = Duration::from_millis(1000);
const SETTLE_DELAY: Duration = Duration::from_millis(10);

/// Configuration of a firmware update session.
#[derive(Debug, Clone)]
pub struct FirmwareConfig {
	/// The serial port the servo is attached to.
	pub port: PathBuf,

	/// The normal bus baud rate, used to reach the servo before the reset.
	pub baud_rate: u32,

	/// The servo to update.
	pub servo_id: u8,

	/// How many times to run the whole session before giving up.
	pub total_retry: u32,

	/// How many acknowledgement bytes complete the handshake.
	pub handshake_threshold: u32,

	/// How many times to resend one data frame before giving up.
	pub frame_retry_count: u32,

	/// How many times to try sending the end of transmission byte.
	pub sign_retry_count: u32,
}

impl FirmwareConfig {
	/// A session with the default retry limits.
	pub fn new(port: impl Into<PathBuf>, baud_rate: u32, servo_id: u8) -> Self {
		Self {
			port: port.into(),
			baud_rate,
			servo_id,
			total_retry: 10,
			handshake_threshold: 5,
			frame_retry_count: 5,
			sign_retry_count: 5,
		}
	}
}

/// Build the data frame carrying the given 1-based sequence number.
///
/// The frame is the marker byte, the sequence number, its complement, 128
/// payload bytes (zero padded past the end of the image) and the
/// CRC-16-CCITT of the padded payload, high byte first. A sequence of
/// zero, or one starting past the end of the image, carries an all zero
/// payload.
pub fn build_frame(image: &[u8], sequence: usize) -> [u8; FRAME_LEN] {
	let mut frame = [0; FRAME_LEN];
	let seq = (sequence & 0xFF) as u8;
	frame[0] = FRAME_MARKER;
	frame[1] = seq;
	frame[2] = 0xFF - seq;
	let offset = sequence.saturating_sub(1).saturating_mul(FRAME_PAYLOAD);
	if sequence > 0 && offset < image.len() {
		let copy = (image.len() - offset).min(FRAME_PAYLOAD);
		frame[3..3 + copy].copy_from_slice(&image[offset..offset + copy]);
	}
	let crc = crc16_ccitt(&frame[3..3 + FRAME_PAYLOAD]);
	frame[FRAME_LEN - 2] = (crc >> 8) as u8;
	frame[FRAME_LEN - 1] = (crc & 0xFF) as u8;
	frame
}

/// Slice a firmware image into data frames, zero padding the last one.
pub fn split_frames(image: &[u8]) -> Vec<[u8; FRAME_LEN]> {
	let mut frames = Vec::with_capacity(image.len().div_ceil(FRAME_PAYLOAD));
	let mut sequence = 1;
	let mut offset = 0;
	while offset < image.len() {
		frames.push(build_frame(image, sequence));
		offset += FRAME_PAYLOAD;
		sequence += 1;
	}
	frames
}

/// Replace the servo firmware with the image read from `path`.
///
/// Returns whether some session iteration completed all four phases.
pub fn upgrade_file(config: &FirmwareConfig, path: impl AsRef<Path>) -> std::io::Result<bool> {
	let path = path.as_ref();
	debug!("reading firmware image from {}", path.display());
	let image = std::fs::read(path)?;
	Ok(upgrade(config, &image))
}

/// Replace the servo firmware with the given image.
///
/// Returns whether some session iteration completed all four phases.
pub fn upgrade(config: &FirmwareConfig, image: &[u8]) -> bool {
	upgrade_with(config, image, |baud_rate| {
		let mut settings = SerialSettings::new(baud_rate);
		settings.timeout = Timeout::simple(1000);
		SerialTransport::open(&config.port, &settings)
	})
}

/// Replace the servo firmware using caller supplied transports.
///
/// `open` is invoked once per needed transport: at the configured bus baud
/// rate for the bootloader reset, then at 9600 baud for the handshake,
/// transfer and sign-off phases.
pub fn upgrade_with<T, F>(config: &FirmwareConfig, image: &[u8], mut open: F) -> bool
where
	T: Transport + Send,
	F: FnMut(u32) -> Result<T, TransportError>,
{
	if image.is_empty() {
		error!("refusing to flash an empty firmware image");
		return false;
	}
	let frames = split_frames(image);
	debug!("firmware image of {} bytes split into {} frames", image.len(), frames.len());

	for attempt in 0..config.total_retry {
		if attempt > 0 {
			std::thread::sleep(SESSION_RETRY_BACKOFF);
			info!("firmware update attempt {} of {}", attempt + 1, config.total_retry);
		}
		if !boot(config, &mut open) {
			error!("bootloader reset failed, retrying");
			continue;
		}
		let mut port = match open(BOOTLOADER_BAUD) {
			Ok(port) => port,
			Err(e) => {
				error!("failed to reopen port at {} baud: {}", BOOTLOADER_BAUD, e);
				continue;
			},
		};
		if !handshake(config, &mut port) {
			error!("bootloader handshake failed, retrying");
			continue;
		}
		if !transfer(config, &mut port, &frames) {
			error!("firmware transfer failed, retrying");
			continue;
		}
		if !wave(config, &mut port) {
			error!("end of transmission failed, retrying");
			continue;
		}
		info!("firmware update complete");
		return true;
	}
	error!("firmware update failed after {} attempts", config.total_retry);
	false
}

// Phase 1: reset the servo into its bootloader at the normal bus rate.
fn boot<T, F>(config: &FirmwareConfig, open: &mut F) -> bool
where
	T: Transport,
	F: FnMut(u32) -> Result<T, TransportError>,
{
	let mut port = match open(config.baud_rate) {
		Ok(port) => port,
		Err(e) => {
			error!("failed to open port at {} baud: {}", config.baud_rate, e);
			return false;
		},
	};
	std::thread::sleep(SETTLE_DELAY);

	let Ok(servo) = ServoProtocol::new(config.servo_id) else {
		error!("invalid servo identifier {:#04X}", config.servo_id);
		return false;
	};
	let packet = servo.reset_to_bootloader();
	debug!("sending bootloader reset: {:02X?}", packet);
	if port.flush_input().is_err() {
		return false;
	}
	match port.write(&packet) {
		Ok(count) if count == packet.len() => (),
		Ok(count) => {
			error!("short write of bootloader reset, {} of {} bytes", count, packet.len());
			return false;
		},
		Err(e) => {
			error!("failed to send bootloader reset: {}", e);
			return false;
		},
	}

	let acknowledged = matches!(port.wait_readable(BOOT_REPLY_WINDOW), Ok(true));
	if acknowledged {
		debug!("servo acknowledged the bootloader reset");
	} else {
		error!("servo did not acknowledge the bootloader reset");
	}
	std::thread::sleep(SETTLE_DELAY);
	acknowledged
}

// Phase 2: repeat the handshake request until the bootloader has
// acknowledged often enough.
fn handshake<T: Transport + Send>(config: &FirmwareConfig, port: &mut T) -> bool {
	std::thread::sleep(Duration::from_millis(5));

	let port = Mutex::new(port);
	let ack_count = AtomicU32::new(0);
	let stop = AtomicBool::new(false);
	let writer_finished = Mutex::new(false);
	let condition = Condvar::new();
	let threshold = config.handshake_threshold;

	std::thread::scope(|scope| {
		scope.spawn(|| {
			let mut chunk = [0; 64];
			while !stop.load(Ordering::Acquire) {
				let read = {
					let mut port = port.lock().unwrap_or_else(PoisonError::into_inner);
					match port.bytes_available() {
						Ok(count) if count > 0 => port.read(&mut chunk).unwrap_or(0),
						_ => 0,
					}
				};
				if read > 0 {
					debug!("handshake data: {:02X?}", &chunk[..read]);
					let acks = chunk[..read].iter().filter(|&&byte| byte == HANDSHAKE_ACK).count() as u32;
					if acks > 0 {
						let total = ack_count.fetch_add(acks, Ordering::AcqRel) + acks;
						if total >= threshold {
							debug!("handshake acknowledged {} times", total);
							stop.store(true, Ordering::Release);
							condition.notify_all();
							break;
						}
					}
				}
				std::thread::sleep(HANDSHAKE_POLL_INTERVAL);
			}
		});

		scope.spawn(|| {
			for _ in 0..HANDSHAKE_WRITE_ATTEMPTS {
				if stop.load(Ordering::Acquire) {
					break;
				}
				{
					let mut port = port.lock().unwrap_or_else(PoisonError::into_inner);
					match port.write(&[HANDSHAKE_REQUEST]) {
						Ok(1) => debug!("handshake request sent"),
						_ => error!("failed to send handshake request"),
					}
				}
				std::thread::sleep(HANDSHAKE_WRITE_SPACING);
			}
			let mut finished = writer_finished.lock().unwrap_or_else(PoisonError::into_inner);
			*finished = true;
			condition.notify_all();
		});

		let mut finished = writer_finished.lock().unwrap_or_else(PoisonError::into_inner);
		while !*finished && ack_count.load(Ordering::Acquire) < threshold {
			let (guard, _) = condition
				.wait_timeout(finished, HANDSHAKE_POLL_INTERVAL)
				.unwrap_or_else(PoisonError::into_inner);
			finished = guard;
		}
		drop(finished);
		stop.store(true, Ordering::Release);
	});

	ack_count.load(Ordering::Acquire) >= threshold
}

// Phase 3: push the data frames, one in flight at a time.
//
// The reader publishes whatever the bootloader sends under the message
// counter value current at read time. The per frame replies are device
// specific and deliberately not interpreted: any bytes within the window
// acknowledge the frame.
fn transfer<T: Transport + Send>(config: &FirmwareConfig, port: &mut T, frames: &[[u8; FRAME_LEN]]) -> bool {
	let port = Mutex::new(port);
	let stop = AtomicBool::new(false);
	let message_counter = AtomicU64::new(0);
	let replies: Mutex<HashMap<u64, Vec<u8>>> = Mutex::new(HashMap::new());
	let condition = Condvar::new();

	std::thread::scope(|scope| {
		scope.spawn(|| {
			let mut chunk = [0; 64];
			while !stop.load(Ordering::Acquire) {
				let read = {
					let mut port = port.lock().unwrap_or_else(PoisonError::into_inner);
					match port.bytes_available() {
						Ok(count) if count > 0 => port.read(&mut chunk).unwrap_or(0),
						_ => 0,
					}
				};
				if read > 0 {
					debug!("bootloader replied: {:02X?}", &chunk[..read]);
					let key = message_counter.load(Ordering::Acquire);
					let mut replies = replies.lock().unwrap_or_else(PoisonError::into_inner);
					replies.insert(key, chunk[..read].to_vec());
					condition.notify_all();
				}
				std::thread::sleep(TRANSFER_POLL_INTERVAL);
			}
		});

		let mut complete = true;
		for (index, frame) in frames.iter().enumerate() {
			let mut delivered = false;
			for retry in 0..config.frame_retry_count {
				if retry > 0 {
					std::thread::sleep(FRAME_RETRY_BACKOFF);
				}
				if send_frame(&port, &message_counter, &replies, &condition, frame) {
					delivered = true;
					break;
				}
				error!("frame {} of {} not acknowledged", index + 1, frames.len());
			}
			if !delivered {
				error!("frame {} failed {} times, aborting transfer", index + 1, config.frame_retry_count);
				complete = false;
				break;
			}
			debug!("frame {} of {} delivered", index + 1, frames.len());
		}
		stop.store(true, Ordering::Release);
		complete
	})
}

fn send_frame<T: Transport>(
	port: &Mutex<&mut T>,
	message_counter: &AtomicU64,
	replies: &Mutex<HashMap<u64, Vec<u8>>>,
	condition: &Condvar,
	frame: &[u8; FRAME_LEN],
) -> bool {
	let key = message_counter.fetch_add(1, Ordering::AcqRel) + 1;
	{
		let mut port = port.lock().unwrap_or_else(PoisonError::into_inner);
		if port.flush_input().is_err() {
			return false;
		}
		match port.write(frame) {
			Ok(count) if count == frame.len() => (),
			Ok(count) => {
				error!("short frame write, {} of {} bytes", count, frame.len());
				return false;
			},
			Err(e) => {
				error!("failed to send frame: {}", e);
				return false;
			},
		}
	}

	let deadline = Instant::now() + FRAME_REPLY_WINDOW;
	let mut replies = replies.lock().unwrap_or_else(PoisonError::into_inner);
	loop {
		if replies.remove(&key).is_some() {
			return true;
		}
		let now = Instant::now();
		if now >= deadline {
			return false;
		}
		let (guard, _) = condition
			.wait_timeout(replies, deadline - now)
			.unwrap_or_else(PoisonError::into_inner);
		replies = guard;
	}
}

// Phase 4: sign the transfer off with the end of transmission byte.
fn wave<T: Transport>(config: &FirmwareConfig, port: &mut T) -> bool {
	for attempt in 0..config.sign_retry_count {
		if attempt > 0 {
			std::thread::sleep(WAVE_RETRY_SPACING);
		}
		if port.flush_input().is_err() {
			continue;
		}
		match port.write(&[END_OF_TRANSMISSION]) {
			Ok(1) => {
				debug!("end of transmission sent");
				return true;
			},
			_ => error!("failed to send end of transmission"),
		}
	}
	error!("end of transmission failed after {} attempts", config.sign_retry_count);
	false
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[test]
	fn test_build_frame() {
		let image: Vec<u8> = (0..200u16).map(|value| value as u8).collect();
		let frame = build_frame(&image, 1);
		assert!(frame.len() == 133);
		assert!(frame[0] == 0x01);
		assert!(frame[1] == 1);
		assert!(frame[2] == 254);
		assert!(frame[3..131] == image[..128]);
		let crc = crc16_ccitt(&image[..128]);
		assert!(frame[131] == (crc >> 8) as u8);
		assert!(frame[132] == (crc & 0xFF) as u8);
	}

	#[test]
	fn test_final_frame_is_zero_padded() {
		let image = [0xAB; 130];
		let frames = split_frames(&image);
		assert!(frames.len() == 2);
		assert!(frames[1][1] == 2);
		assert!(frames[1][2] == 253);
		assert!(frames[1][3..5] == [0xAB, 0xAB]);
		assert!(frames[1][5..131].iter().all(|&byte| byte == 0));

		// The CRC covers the padded payload.
		let mut padded = [0; 128];
		padded[..2].copy_from_slice(&[0xAB, 0xAB]);
		let crc = crc16_ccitt(&padded);
		assert!(frames[1][131] == (crc >> 8) as u8);
		assert!(frames[1][132] == (crc & 0xFF) as u8);
	}

	#[test]
	fn test_out_of_range_sequences_carry_empty_payloads() {
		let image = [0xAB; 64];
		let crc = crc16_ccitt(&[0; FRAME_PAYLOAD]);

		// Sequence 0 and sequences past the image do not panic.
		let frame = build_frame(&image, 0);
		assert!(frame[1] == 0);
		assert!(frame[3..131].iter().all(|&byte| byte == 0));
		assert!(frame[131] == (crc >> 8) as u8);

		let frame = build_frame(&image, 2);
		assert!(frame[1] == 2);
		assert!(frame[3..131].iter().all(|&byte| byte == 0));
		assert!(frame[132] == (crc & 0xFF) as u8);

		let frame = build_frame(&image, 5000);
		assert!(frame[3..131].iter().all(|&byte| byte == 0));
	}

	#[test]
	fn test_sequence_numbers_wrap() {
		let image = [0x11; 128 * 300];
		let frames = split_frames(&image);
		assert!(frames.len() == 300);
		assert!(frames[254][1] == 255);
		assert!(frames[254][2] == 0);
		assert!(frames[255][1] == 0);
		assert!(frames[255][2] == 255);
		assert!(frames[256][1] == 1);
		assert!(frames[256][2] == 254);
	}
}
