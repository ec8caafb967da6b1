// per-command wrappers; they only fill in param1 / param2 / data and leave
// all checking to the catalog

use super::consts::*;
use super::{
	Command,
	Error,
	Opcode,
	Response,
	Sha204,
};
use crate::swi::Transceiver;

impl<T: Transceiver> Sha204<T> {
	fn run(&mut self, opcode: Opcode, param1: u8, param2: u16, data: [Option<&[u8]>; 3]) -> Result<Response, Error> {
		let command = Command {
			opcode: opcode.code(),
			param1,
			param2,
			data,
		};
		self.execute(&command)
	}

	/// 32 random bytes; without seed update the EEPROM seed isn't written
	pub fn random(&mut self, seed_update: bool) -> Result<Response, Error> {
		let mode = if seed_update { RANDOM_SEED_UPDATE } else { RANDOM_NO_SEED_UPDATE };
		self.run(Opcode::Random, mode, 0, [None, None, None])
	}

	/// four revision bytes
	pub fn dev_rev(&mut self) -> Result<Response, Error> {
		self.run(Opcode::DevRev, 0, 0, [None, None, None])
	}

	/// read 4 (or 32 with `long`) bytes at a byte address in `zone`
	pub fn read(&mut self, zone: u8, address: u16, long: bool) -> Result<Response, Error> {
		let param1 = if long { zone | ZONE_COUNT_FLAG } else { zone };
		self.run(Opcode::Read, param1, address >> 2, [None, None, None])
	}

	/// write 4 or 32 bytes at a byte address; the width follows `data`
	pub fn write(&mut self, zone: u8, address: u16, data: &[u8], mac: Option<&[u8]>) -> Result<Response, Error> {
		let mut param1 = zone;
		if data.len() == ZONE_ACCESS_32 {
			param1 |= ZONE_COUNT_FLAG;
		}
		if mac.is_some() {
			param1 |= WRITE_ZONE_WITH_MAC;
		}
		self.run(Opcode::Write, param1, address >> 2, [Some(data), mac, None])
	}

	/// lock a zone; without a summary the zone crc isn't checked
	pub fn lock(&mut self, zone: u8, summary: Option<u16>) -> Result<Response, Error> {
		match summary {
			Some(summary) => self.run(Opcode::Lock, zone, summary, [None, None, None]),
			None => self.run(Opcode::Lock, zone | LOCK_ZONE_NO_CRC, 0, [None, None, None]),
		}
	}

	pub fn nonce(&mut self, mode: u8, num_in: &[u8]) -> Result<Response, Error> {
		self.run(Opcode::Nonce, mode, 0, [Some(num_in), None, None])
	}

	pub fn mac(&mut self, mode: u8, key_id: u16, challenge: Option<&[u8]>) -> Result<Response, Error> {
		self.run(Opcode::Mac, mode, key_id, [challenge, None, None])
	}

	pub fn hmac(&mut self, mode: u8, key_id: u16) -> Result<Response, Error> {
		self.run(Opcode::Hmac, mode, key_id, [None, None, None])
	}

	pub fn check_mac(
		&mut self,
		mode: u8,
		key_id: u16,
		challenge: &[u8],
		response: &[u8],
		other_data: &[u8],
	) -> Result<Response, Error> {
		self.run(Opcode::CheckMac, mode, key_id, [Some(challenge), Some(response), Some(other_data)])
	}

	pub fn gen_dig(&mut self, zone: u8, key_id: u16, other_data: Option<&[u8]>) -> Result<Response, Error> {
		self.run(Opcode::GenDig, zone, key_id, [other_data, None, None])
	}

	pub fn derive_key(&mut self, random: bool, target_key: u16, mac: Option<&[u8]>) -> Result<Response, Error> {
		let mode = if random { DERIVE_KEY_RANDOM_FLAG } else { 0 };
		self.run(Opcode::DeriveKey, mode, target_key, [mac, None, None])
	}

	/// update config byte 85 (mode 0) or 86 (mode 1)
	pub fn update_extra(&mut self, mode: u8, value: u8) -> Result<Response, Error> {
		self.run(Opcode::UpdateExtra, mode, value as u16, [None, None, None])
	}

	/// put all devices whose selector doesn't match into idle
	pub fn pause(&mut self, selector: u8) -> Result<Response, Error> {
		self.run(Opcode::Pause, selector, 0, [None, None, None])
	}
}
