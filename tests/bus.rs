use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert2::{assert, let_assert};
use test_log::test;

use cds55xx::{validate_and_extract, Bus, ServoProtocol, TransferError};

mod common;
use common::{response_frame, MockTransport};

const TIMEOUT: Duration = Duration::from_millis(200);

// A device that answers pings and echoes the address of read commands.
fn echo_device(command: &[u8]) -> Option<Vec<u8>> {
	let packet = validate_and_extract(command).ok()?;
	let id = packet.id();
	match packet.as_bytes()[4] {
		// PING
		0x01 => Some(response_frame(id, 0, &[])),
		// READ: answer with the requested address as payload.
		0x02 => Some(response_frame(id, 0, &[packet.parameters()[0]])),
		_ => None,
	}
}

#[test]
fn test_ping_gets_reply() {
	let bus = Bus::new(MockTransport::with_device(echo_device));
	let_assert!(Ok(servo) = ServoProtocol::new(3));
	let_assert!(Ok(response) = bus.send_and_wait(&servo.ping(), TIMEOUT));
	assert!(response.id() == 3);
	assert!(response.error().is_ok());
	assert!(response.parameters().is_empty());
}

#[test]
fn test_timeout_when_device_is_silent() {
	let bus = Bus::new(MockTransport::with_device(|_| None));
	let_assert!(Ok(servo) = ServoProtocol::new(3));
	let_assert!(Err(TransferError::Timeout) = bus.send_and_wait(&servo.ping(), Duration::from_millis(50)));
}

#[test]
fn test_send_no_wait_reports_readability() {
	let bus = Bus::new(MockTransport::with_device(echo_device));
	let_assert!(Ok(servo) = ServoProtocol::new(3));
	let_assert!(Ok(true) = bus.send_no_wait(&servo.ping()));

	let bus = Bus::new(MockTransport::with_device(|_| None));
	let_assert!(Ok(false) = bus.send_no_wait(&servo.ping()));
}

#[test]
fn test_responses_with_leading_garbage_are_delivered() {
	let bus = Bus::new(MockTransport::with_device(|command| {
		let packet = validate_and_extract(command).ok()?;
		let mut reply = vec![0xAA, 0x55, 0x00];
		reply.extend_from_slice(&response_frame(packet.id(), 0, &[0x0A]));
		Some(reply)
	}));
	let_assert!(Ok(servo) = ServoProtocol::new(1));
	let_assert!(Ok(response) = bus.send_and_wait(&servo.read(0x2B, 1), TIMEOUT));
	assert!(response.parameters() == [0x0A]);
}

#[test]
fn test_corrupt_frame_is_skipped_and_resynchronized() {
	let bus = Bus::new(MockTransport::with_device(|command| {
		let packet = validate_and_extract(command).ok()?;
		// A frame with a broken checksum, then the real response.
		let mut reply = response_frame(packet.id(), 0, &[0x0B]);
		let last = reply.len() - 1;
		reply[last] ^= 0xFF;
		reply.extend_from_slice(&response_frame(packet.id(), 0, &[0x0C]));
		Some(reply)
	}));
	let_assert!(Ok(servo) = ServoProtocol::new(1));
	let_assert!(Ok(response) = bus.send_and_wait(&servo.read(0x2B, 1), TIMEOUT));
	assert!(response.parameters() == [0x0C]);
}

#[test]
fn test_header_like_noise_with_impossible_length_does_not_wedge_the_reader() {
	// A noise prefix that looks like a header with a length below 2 must be
	// skipped; it can never complete into a frame, so waiting on it would
	// starve every later response.
	let bus = Bus::new(MockTransport::with_device(|command| {
		let packet = validate_and_extract(command).ok()?;
		let mut reply = vec![0xFF, 0xFF, 0x00, 0x01];
		reply.extend_from_slice(&response_frame(packet.id(), 0, &[0x0D]));
		Some(reply)
	}));
	let_assert!(Ok(servo) = ServoProtocol::new(1));
	let_assert!(Ok(response) = bus.send_and_wait(&servo.read(0x2B, 1), TIMEOUT));
	assert!(response.parameters() == [0x0D]);

	// The reader stays usable for the next transfer.
	let_assert!(Ok(response) = bus.send_and_wait(&servo.read(0x2B, 1), TIMEOUT));
	assert!(response.parameters() == [0x0D]);
}

#[test]
fn test_broadcast_callback_sees_every_response() {
	let bus = Bus::new(MockTransport::with_device(echo_device));
	let seen = Arc::new(Mutex::new(Vec::new()));
	{
		let seen = seen.clone();
		bus.on_broadcast(move |response| {
			seen.lock().unwrap().push(response.id());
		});
	}
	let_assert!(Ok(servo) = ServoProtocol::new(5));
	let_assert!(Ok(_) = bus.send_and_wait(&servo.ping(), TIMEOUT));
	let_assert!(Ok(_) = bus.send_and_wait(&servo.ping(), TIMEOUT));
	bus.close();
	assert!(*seen.lock().unwrap() == [5, 5]);
}

#[test]
fn test_concurrent_senders_each_get_their_own_reply() {
	let bus = Arc::new(Bus::new(MockTransport::with_device(echo_device)));
	let mut workers = Vec::new();
	for thread_index in 0..4u8 {
		let bus = bus.clone();
		workers.push(std::thread::spawn(move || {
			let servo = ServoProtocol::new(1).unwrap();
			for request in 0..8u8 {
				let address = thread_index * 8 + request;
				let response = bus.send_and_wait(&servo.read(address, 1), TIMEOUT).unwrap();
				// The reply payload must match this caller's request.
				assert!(response.parameters() == [address], "address = {}", address);
			}
		}));
	}
	for worker in workers {
		let_assert!(Ok(()) = worker.join());
	}
}

#[test]
fn test_close_wakes_pending_waiter() {
	let bus = Arc::new(Bus::new(MockTransport::with_device(|_| None)));
	let waiter = {
		let bus = bus.clone();
		std::thread::spawn(move || {
			let servo = ServoProtocol::new(1).unwrap();
			bus.send_and_wait(&servo.ping(), Duration::from_secs(10))
		})
	};
	std::thread::sleep(Duration::from_millis(50));
	bus.close();
	let_assert!(Ok(Err(TransferError::Closed)) = waiter.join());

	// A closed bus refuses new requests.
	let servo = ServoProtocol::new(1).unwrap();
	let_assert!(Err(TransferError::Closed) = bus.send_no_wait(&servo.ping()));
}
