use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert2::assert;
use test_log::test;

use cds55xx::transport::Timeout;
use cds55xx::{validate_and_extract, FaultFlags, Scanner, ScannerConfig};

mod common;
use common::{response_frame, MockTransport};

fn config(baud_rates: Vec<u32>) -> ScannerConfig {
	let mut config = ScannerConfig::new("mock", baud_rates);
	config.search_timeout = Duration::from_millis(5);
	config
}

// A bus with two servos that only answer at 57600 baud.
fn two_servo_bus(baud_rate: u32) -> Result<MockTransport, cds55xx::TransportError> {
	let transport = MockTransport::with_device(move |command| {
		let packet = validate_and_extract(command).ok()?;
		if baud_rate != 57_600 || packet.as_bytes()[4] != 0x01 {
			return None;
		}
		match packet.id() {
			3 => Some(response_frame(3, 0, &[])),
			9 => Some(response_frame(9, FaultFlags::OVERHEAT, &[])),
			_ => None,
		}
	});
	Ok(transport.with_timeout(Timeout::simple(2)))
}

#[test]
fn test_scan_reports_each_servo_once_in_order() {
	let reports = Arc::new(Mutex::new(Vec::new()));
	let mut scanner = Scanner::new(config(vec![1_000_000, 57_600]));
	{
		let reports = reports.clone();
		scanner.start_with(two_servo_bus, move |baud_rate, id, faults| {
			reports.lock().unwrap().push((baud_rate, id, faults.raw()));
		});
	}
	assert!(scanner.is_scanning());
	while scanner.is_scanning() {
		std::thread::sleep(Duration::from_millis(10));
	}
	let reports = reports.lock().unwrap();
	assert!(*reports == [(57_600, 3, 0), (57_600, 9, FaultFlags::OVERHEAT)]);
}

#[test]
fn test_scan_without_verification_reports_any_activity() {
	let reports = Arc::new(Mutex::new(Vec::new()));
	let mut config = config(vec![57_600]);
	config.verify = false;
	let mut scanner = Scanner::new(config);
	{
		let reports = reports.clone();
		scanner.start_with(
			|_| {
				// Answers every ping with garbage from a different identifier.
				let transport = MockTransport::with_device(move |command| {
					let packet = validate_and_extract(command).ok()?;
					if packet.id() == 7 {
						Some(vec![0xAA, 0xBB])
					} else {
						None
					}
				});
				Ok(transport.with_timeout(Timeout::simple(2)))
			},
			move |baud_rate, id, faults| {
				reports.lock().unwrap().push((baud_rate, id, faults.raw()));
			},
		);
	}
	while scanner.is_scanning() {
		std::thread::sleep(Duration::from_millis(10));
	}
	let reports = reports.lock().unwrap();
	assert!(*reports == [(57_600, 7, 0)]);
}

#[test]
fn test_verification_rejects_mismatched_identifiers() {
	let reports = Arc::new(Mutex::new(Vec::new()));
	let mut scanner = Scanner::new(config(vec![57_600]));
	{
		let reports = reports.clone();
		scanner.start_with(
			|_| {
				// Always answers as servo 42, whoever was pinged.
				let transport = MockTransport::with_device(|command| {
					validate_and_extract(command).ok()?;
					Some(response_frame(42, 0, &[]))
				});
				Ok(transport.with_timeout(Timeout::simple(2)))
			},
			move |baud_rate, id, faults| {
				reports.lock().unwrap().push((baud_rate, id, faults.raw()));
			},
		);
	}
	while scanner.is_scanning() {
		std::thread::sleep(Duration::from_millis(10));
	}
	let reports = reports.lock().unwrap();
	assert!(*reports == [(57_600, 42, 0)]);
}

#[test]
fn test_stop_is_idempotent_and_start_while_running_is_ignored() {
	let count = Arc::new(Mutex::new(0u32));
	let mut scanner = Scanner::new(config(vec![57_600; 100]));
	{
		let count = count.clone();
		scanner.start_with(two_servo_bus, move |_, _, _| {
			*count.lock().unwrap() += 1;
		});
	}
	assert!(scanner.is_scanning());

	// A second start while running must not spawn a second worker.
	scanner.start_with(two_servo_bus, |_, _, _| panic!("second scan must not run"));

	scanner.stop();
	assert!(!scanner.is_scanning());
	scanner.stop();
}
