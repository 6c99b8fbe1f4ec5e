// Not every test binary uses every helper.
#![allow(dead_code)]

mod mock;

pub use mock::{MockTransport, SharedBuffer};

use cds55xx::checksum::packet_checksum;

/// Assemble a well formed response frame for tests.
pub fn response_frame(id: u8, error: u8, parameters: &[u8]) -> Vec<u8> {
	let mut frame = vec![0xFF, 0xFF, id, parameters.len() as u8 + 2, error];
	frame.extend_from_slice(parameters);
	let checksum = packet_checksum(&frame[2..]);
	frame.push(checksum);
	frame
}
