//! CRC-16 as used by the single-wire frames
//!
//! Polynomial 0x8005, register starts at zero; data bits are fed LSB first,
//! the register is shifted MSB first. The result goes on the wire low byte
//! first.

pub const CRC_SIZE: usize = 2;

const POLYNOMIAL: u16 = 0x8005;

pub fn crc16(data: &[u8]) -> u16 {
	let mut register = 0u16;
	for &byte in data {
		for bit in 0..8 {
			let data_bit = 0 != (byte >> bit) & 1;
			let crc_bit = 0 != register & 0x8000;
			register <<= 1;
			if data_bit != crc_bit {
				register ^= POLYNOMIAL;
			}
		}
	}
	register
}

/// write crc of `data` into `target` (little-endian)
pub fn calculate(data: &[u8], target: &mut [u8; CRC_SIZE]) {
	let crc = crc16(data);
	target[0] = crc as u8;
	target[1] = (crc >> 8) as u8;
}

/// fill the last two bytes of `frame` with the crc of the bytes before
pub fn append(frame: &mut [u8]) {
	assert!(frame.len() >= CRC_SIZE);
	let split = frame.len() - CRC_SIZE;
	let (data, crc) = frame.split_at_mut(split);
	let mut c = [0u8; CRC_SIZE];
	calculate(data, &mut c);
	crc.copy_from_slice(&c);
}

/// verify a frame using its own length byte
///
/// returns false if the length byte doesn't describe a frame that fits
/// into `frame`.
pub fn check_frame(frame: &[u8]) -> bool {
	let count = match frame.first() {
		Some(&c) => c as usize,
		None => return false,
	};
	if count < CRC_SIZE + 1 || count > frame.len() {
		return false;
	}
	let split = count - CRC_SIZE;
	let mut c = [0u8; CRC_SIZE];
	calculate(&frame[..split], &mut c);
	c[..] == frame[split..count]
}
