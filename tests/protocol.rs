//! Wire level scenarios exercising the builder and parser together.

use assert2::{assert, let_assert};
use test_log::test;

use cds55xx::protocol::EepromField;
use cds55xx::{parse_eeprom_block, validate_and_extract, ServoProtocol, SyncWriteData};

mod common;
use common::response_frame;

#[test]
fn test_assign_identifier() {
	let_assert!(Ok(servo) = ServoProtocol::new(1));
	let_assert!(Ok(packet) = servo.eeprom().set_id(0));
	assert!(packet == [0xFF, 0xFF, 0x01, 0x04, 0x03, 0x03, 0x00, 0xF4]);
}

#[test]
fn test_sync_write_from_stripped_move_packets() {
	// Build one positioned move per servo, strip each down to its payload
	// block, and broadcast all four blocks in a single sync write.
	let targets = [(4.69, 20.37), (159.53, 52.37), (14.07, 22.33), (159.53, 54.28)];
	let mut blocks = Vec::new();
	for (id, (degrees, rpm)) in targets.iter().enumerate() {
		let_assert!(Ok(servo) = ServoProtocol::new(id as u8));
		let_assert!(Ok(packet) = servo.ram().move_to_with_speed_rpm(*degrees as f32, *rpm as f32));
		let_assert!(Ok(payload) = ServoProtocol::short_payload(4, &packet));
		blocks.push((id as u8, payload.to_vec()));
	}
	let blocks: Vec<SyncWriteData> = blocks
		.iter()
		.map(|(servo_id, data)| SyncWriteData { servo_id: *servo_id, data })
		.collect();

	let_assert!(Ok(packet) = ServoProtocol::broadcast().sync_write(0x1E, 4, &blocks));
	assert!(
		packet
			== [
				0xFF, 0xFF, 0xFE, 0x18, 0x83, 0x1E, 0x04, 0x00, 0x10, 0x00, 0x50, 0x01, 0x01, 0x20, 0x02, 0x60, 0x03,
				0x02, 0x30, 0x00, 0x70, 0x01, 0x03, 0x20, 0x02, 0x80, 0x03, 0x12
			]
	);

	// The broadcast parses back as a well formed frame.
	let_assert!(Ok(parsed) = validate_and_extract(&packet));
	assert!(parsed.id() == 0xFE);
	assert!(packet.len() == 7 + 1 + (4 + 1) * blocks.len());
}

#[test]
fn test_staged_moves_applied_by_action() {
	let_assert!(Ok(left) = ServoProtocol::new(2));
	let_assert!(Ok(right) = ServoProtocol::new(1));

	let_assert!(Ok(stage_left) = left.ram().reg_write_move_to(0.0));
	assert!(stage_left == [0xFF, 0xFF, 0x02, 0x05, 0x04, 0x1E, 0x00, 0x00, 0xD6]);

	let_assert!(Ok(stage_right) = right.ram().reg_write_move_to(300.0));
	assert!(stage_right == [0xFF, 0xFF, 0x01, 0x05, 0x04, 0x1E, 0xFF, 0x03, 0xD5]);

	assert!(ServoProtocol::broadcast().action() == [0xFF, 0xFF, 0xFE, 0x02, 0x05, 0xFA]);
}

#[test]
fn test_parse_temperature_reply() {
	// Reply to a temperature read: 32 degrees Celsius, no faults.
	let_assert!(Ok(packet) = validate_and_extract(&[0xFF, 0xFF, 0x01, 0x03, 0x00, 0x20, 0xDB]));
	assert!(packet.id() == 1);
	assert!(packet.error().is_ok());
	assert!(packet.parameters() == [0x20]);
}

#[test]
fn test_parse_identity_block_reply() {
	// Reply to a read of VERSION through RETURN_DELAY_TIME.
	let frame = response_frame(1, 0, &[0x07, 0x01, 0x01, 0x00]);
	let_assert!(Ok(packet) = validate_and_extract(&frame));
	let values = parse_eeprom_block(packet.parameters(), EepromField::Version);
	assert!(
		values
			== [
				(EepromField::Version, 0x07),
				(EepromField::Id, 0x01),
				(EepromField::BaudRate, 0x01),
				(EepromField::ReturnDelayTime, 0x00),
			]
	);
}

#[test]
fn test_every_builder_output_survives_a_parse_round_trip() {
	let_assert!(Ok(servo) = ServoProtocol::new(5));
	let mut packets = vec![
		servo.ping(),
		servo.reset(),
		servo.reset_to_bootloader(),
		servo.action(),
		servo.eeprom().get_model_number(),
		servo.eeprom().get_angle_limits(),
		servo.eeprom().set_baud_rate(19_200),
		servo.ram().get_position(),
		servo.ram().set_torque_enable(true),
		servo.motor().wheel_mode(),
	];
	packets.push(servo.eeprom().set_max_torque(1023).unwrap());
	packets.push(servo.ram().move_to_with_speed_rpm(299.9, 61.9).unwrap());
	packets.push(servo.motor().set_speed_rpm(-0.5).unwrap());

	for packet in packets {
		let_assert!(Ok(parsed) = validate_and_extract(&packet), "packet = {:02X?}", packet);
		assert!(parsed.id() == 5);
		assert!(parsed.as_bytes() == packet);
	}
}
