//! Higher-level routines built from plain commands: serial number, config
//! zone dump, key slot setup and config zone locking.
//!
//! The device must be awake; none of these wake it up or send it to sleep.

use crate::comm::StatusByte;
use crate::command::consts::{
	CONFIG_SIZE,
	LOCK_ZONE_CONFIG,
	ZONE_ACCESS_32,
	ZONE_ACCESS_4,
	ZONE_CONFIG,
};
use crate::command::{
	Response,
	Sha204,
};
use crate::crc;
use crate::swi::Transceiver;

pub const SERIAL_NUMBER_SIZE: usize = 9;
const SERIAL_NUMBER_SENTINEL: u8 = 0xee;

// config zone byte addresses
const ADDRESS_SN03: u16 = 0;
const ADDRESS_SN47: u16 = 8;
const ADDRESS_SN8: u16 = 12;
const ADDRESS_SLOT_CONFIG: u16 = 32;
const OFFSET_LOCK_CONFIG: usize = 87;
const LOCKED: u8 = 0x00;

/// (offset in the 32 bytes at `ADDRESS_SLOT_CONFIG`, value) for a child key
/// derived from a parent key
const DERIVE_KEY_CONFIG: [(usize, u8); 2] = [
	(9, 0x7d), // child
	(14, 0xcd), // parent
];

fn ensure_success(response: &Response, what: &str) -> crate::AResult<()> {
	match response.status() {
		None | Some(StatusByte::Success) => Ok(()),
		Some(status) => bail!("{}: device returned status 0x{:02x}", what, status.byte()),
	}
}

fn read_into<T: Transceiver>(dev: &mut Sha204<T>, address: u16, target: &mut [u8]) -> crate::AResult<()> {
	let long = target.len() == ZONE_ACCESS_32;
	let response = with_context!(("read config zone at {}", address), {
		Ok(dev.read(ZONE_CONFIG, address, long)?)
	})?;
	ensure!(response.data().len() == target.len(),
		"read config zone at {}: got {} bytes, expected {}", address, response.data().len(), target.len());
	target.copy_from_slice(response.data());
	Ok(())
}

/// 9-byte serial number: config bytes 0..4, 8..12 and 12
pub fn serial_number<T: Transceiver>(dev: &mut Sha204<T>) -> crate::AResult<[u8; SERIAL_NUMBER_SIZE]> {
	let mut serial = [0u8; SERIAL_NUMBER_SIZE];
	let mut word = [0u8; ZONE_ACCESS_4];

	read_into(dev, ADDRESS_SN03, &mut serial[0..4])?;
	read_into(dev, ADDRESS_SN47, &mut serial[4..8])?;
	read_into(dev, ADDRESS_SN8, &mut word)?;
	serial[8] = word[0];

	if serial[8] != SERIAL_NUMBER_SENTINEL {
		warn!("Unexpected last serial number byte 0x{:02x} (expected 0x{:02x})", serial[8], SERIAL_NUMBER_SENTINEL);
	}
	Ok(serial)
}

/// whole config zone: two 32-byte reads, the remaining 24 bytes in 4-byte
/// reads
pub fn read_config_zone<T: Transceiver>(dev: &mut Sha204<T>) -> crate::AResult<[u8; CONFIG_SIZE]> {
	let mut config = [0u8; CONFIG_SIZE];
	let mut address = 0;
	while address < CONFIG_SIZE {
		let width = if address < 2 * ZONE_ACCESS_32 {
			ZONE_ACCESS_32
		} else {
			ZONE_ACCESS_4
		};
		read_into(dev, address as u16, &mut config[address..address + width])?;
		address += width;
	}
	Ok(config)
}

/// set up the slot configuration for key derivation
///
/// Returns `false` if the markers were already in place and nothing was
/// written.
pub fn configure_key<T: Transceiver>(dev: &mut Sha204<T>) -> crate::AResult<bool> {
	let mut slots = [0u8; ZONE_ACCESS_32];
	read_into(dev, ADDRESS_SLOT_CONFIG, &mut slots)?;

	if DERIVE_KEY_CONFIG.iter().all(|&(offset, value)| slots[offset] == value) {
		info!("Key configuration already present");
		return Ok(false);
	}

	for &(offset, value) in DERIVE_KEY_CONFIG.iter() {
		slots[offset] = value;
	}
	let response = with_context!("write key configuration", {
		Ok(dev.write(ZONE_CONFIG, ADDRESS_SLOT_CONFIG, &slots, None)?)
	})?;
	ensure_success(&response, "write key configuration")?;
	info!("Wrote key configuration");
	Ok(true)
}

/// lock the config zone with the crc of its current content
///
/// Returns `false` if it was locked already.
pub fn lock_config_zone<T: Transceiver>(dev: &mut Sha204<T>) -> crate::AResult<bool> {
	let config = read_config_zone(dev)?;
	if config[OFFSET_LOCK_CONFIG] == LOCKED {
		info!("Config zone already locked");
		return Ok(false);
	}

	let summary = crc::crc16(&config);
	let response = with_context!(("lock config zone (summary 0x{:04x})", summary), {
		Ok(dev.lock(LOCK_ZONE_CONFIG, Some(summary))?)
	})?;
	ensure_success(&response, "lock config zone")?;
	info!("Locked config zone");
	Ok(true)
}

pub fn configure_derive_key<T: Transceiver>(dev: &mut Sha204<T>) -> crate::AResult<()> {
	configure_key(dev)?;
	lock_config_zone(dev)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{
		frame,
		status,
		MockDevice,
		Reply,
	};
	use crate::timing::Timing;

	fn device(replies: Vec<Reply>) -> Sha204<MockDevice> {
		Sha204::new(MockDevice::new(replies), Timing::default())
	}

	fn config() -> [u8; CONFIG_SIZE] {
		let mut config = [0u8; CONFIG_SIZE];
		for (i, b) in config.iter_mut().enumerate() {
			*b = i as u8;
		}
		config
	}

	fn config_replies(config: &[u8; CONFIG_SIZE]) -> Vec<Reply> {
		let mut replies = vec![frame(&config[0..32]), frame(&config[32..64])];
		for chunk in config[64..].chunks(4) {
			replies.push(frame(chunk));
		}
		replies
	}

	// (opcode, param1, word address) of every command sent
	fn reads(dev: Sha204<MockDevice>) -> Vec<(u8, u8, u8)> {
		dev.into_inner().commands.iter().map(|c| (c[1], c[2], c[3])).collect()
	}

	#[test]
	fn serial_number_reads() {
		let mut dev = device(vec![frame(&[1, 2, 3, 4]), frame(&[5, 6, 7, 8]), frame(&[0xee, 0, 0, 0])]);
		assert_eq!(serial_number(&mut dev).unwrap(), [1, 2, 3, 4, 5, 6, 7, 8, 0xee]);
		assert_eq!(reads(dev), vec![(0x02, 0x00, 0), (0x02, 0x00, 2), (0x02, 0x00, 3)]);
	}

	#[test]
	fn serial_number_read_failure() {
		let mut dev = device(vec![frame(&[1, 2, 3, 4]), status(0x0f)]);
		let e = serial_number(&mut dev).unwrap_err();
		assert!(e.to_string().starts_with("read config zone at 8"), "{}", e);
	}

	#[test]
	fn config_zone_layout() {
		let expected = config();
		let mut dev = device(config_replies(&expected));
		assert_eq!(&read_config_zone(&mut dev).unwrap()[..], &expected[..]);
		assert_eq!(reads(dev), vec![
			(0x02, 0x80, 0), (0x02, 0x80, 8),
			(0x02, 0x00, 16), (0x02, 0x00, 17), (0x02, 0x00, 18),
			(0x02, 0x00, 19), (0x02, 0x00, 20), (0x02, 0x00, 21),
		]);
	}

	#[test]
	fn configure_key_writes_markers() {
		let slots = [0u8; 32];
		let mut dev = device(vec![frame(&slots), status(0)]);
		assert!(configure_key(&mut dev).unwrap());
		let commands = dev.into_inner().commands;
		assert_eq!(commands.len(), 2);
		let write = &commands[1];
		assert_eq!(&write[..5], &[39, 0x12, 0x80, 8, 0]);
		let mut expected = [0u8; 32];
		expected[9] = 0x7d;
		expected[14] = 0xcd;
		assert_eq!(&write[5..37], &expected[..]);
	}

	#[test]
	fn configure_key_skips_when_present() {
		let mut slots = [0u8; 32];
		slots[9] = 0x7d;
		slots[14] = 0xcd;
		let mut dev = device(vec![frame(&slots)]);
		assert!(!configure_key(&mut dev).unwrap());
		assert_eq!(dev.into_inner().commands.len(), 1);
	}

	#[test]
	fn lock_uses_config_crc() {
		let config = config();
		let mut replies = config_replies(&config);
		replies.push(status(0));
		let mut dev = device(replies);
		assert!(lock_config_zone(&mut dev).unwrap());
		let summary = crc::crc16(&config);
		let commands = dev.into_inner().commands;
		assert_eq!(commands.len(), 9);
		assert_eq!(&commands[8][..5], &[7, 0x17, 0x00, summary as u8, (summary >> 8) as u8]);
	}

	#[test]
	fn lock_skips_locked_zone() {
		let mut config = config();
		config[87] = 0x00;
		let mut dev = device(config_replies(&config));
		assert!(!lock_config_zone(&mut dev).unwrap());
		assert_eq!(dev.into_inner().commands.len(), 8);
	}

	#[test]
	fn lock_reports_device_status() {
		let config = config();
		let mut replies = config_replies(&config);
		replies.push(status(0x01));
		let mut dev = device(replies);
		assert!(lock_config_zone(&mut dev).is_err());
	}
}
