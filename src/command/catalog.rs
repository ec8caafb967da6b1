use failure::Fail;

use super::Command;

pub mod consts {
	// frame layout
	pub const CMD_HEADER_SIZE: usize = 5; // count, opcode, param1, param2 (2 bytes)
	pub const CMD_SIZE_MIN: usize = 7;
	pub const CMD_SIZE_MAX: usize = 84; // CheckMac with all data

	// zones (param1 of Read / Write / Lock)
	pub const ZONE_CONFIG: u8 = 0x00;
	pub const ZONE_OTP: u8 = 0x01;
	pub const ZONE_DATA: u8 = 0x02;
	pub const ZONE_MASK: u8 = 0x03;
	pub const ZONE_COUNT_FLAG: u8 = 0x80; // access 32 bytes instead of 4
	pub const ZONE_ACCESS_4: usize = 4;
	pub const ZONE_ACCESS_32: usize = 32;

	// word addresses (param2)
	pub const ADDRESS_MASK_CONFIG: u16 = 0x1f;
	pub const ADDRESS_MASK_OTP: u16 = 0x0f;
	pub const ADDRESS_MASK: u16 = 0x7f;

	pub const CONFIG_SIZE: usize = 88;
	pub const KEY_ID_MAX: u16 = 15;

	pub const CHECKMAC_MODE_MASK: u8 = 0x21;
	pub const CHECKMAC_CLIENT_CHALLENGE_SIZE: usize = 32;
	pub const CHECKMAC_CLIENT_RESPONSE_SIZE: usize = 32;
	pub const CHECKMAC_OTHER_DATA_SIZE: usize = 13;

	pub const DERIVE_KEY_RANDOM_FLAG: u8 = 0x04;
	pub const DERIVE_KEY_MAC_SIZE: usize = 32;

	pub const GENDIG_ZONE_OTP: u8 = 0x01;
	pub const GENDIG_ZONE_DATA: u8 = 0x02;
	pub const GENDIG_OTHER_DATA_SIZE: usize = 4;

	pub const HMAC_MODE_MASK: u8 = 0x74;

	pub const LOCK_ZONE_CONFIG: u8 = 0x00;
	pub const LOCK_ZONE_DATA: u8 = 0x01;
	pub const LOCK_ZONE_NO_CRC: u8 = 0x80; // summary must be zero then
	pub const LOCK_ZONE_MASK: u8 = 0x81;

	pub const MAC_MODE_BLOCK2_TEMPKEY: u8 = 0x01; // no challenge needed
	pub const MAC_MODE_MASK: u8 = 0x77;
	pub const MAC_CHALLENGE_SIZE: usize = 32;

	pub const NONCE_MODE_SEED_UPDATE: u8 = 0x00;
	pub const NONCE_MODE_NO_SEED_UPDATE: u8 = 0x01;
	pub const NONCE_MODE_INVALID: u8 = 0x02;
	pub const NONCE_MODE_PASSTHROUGH: u8 = 0x03;
	pub const NONCE_NUMIN_SIZE: usize = 20;
	pub const NONCE_NUMIN_SIZE_PASSTHROUGH: usize = 32;

	pub const RANDOM_SEED_UPDATE: u8 = 0x00;
	pub const RANDOM_NO_SEED_UPDATE: u8 = 0x01;

	pub const UPDATE_CONFIG_BYTE_85: u8 = 0x00;
	pub const UPDATE_CONFIG_BYTE_86: u8 = 0x01;

	pub const WRITE_ZONE_WITH_MAC: u8 = 0x40;
	pub const WRITE_ZONE_MASK: u8 = 0xc3;
	pub const WRITE_MAC_SIZE: usize = 32;

	// response sizes including count and crc
	pub const RSP_SIZE_STATUS: usize = 4;
	pub const RSP_SIZE_4: usize = 7;
	pub const RSP_SIZE_32: usize = 35;
}

use self::consts::*;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Opcode {
	CheckMac,
	DeriveKey,
	DevRev,
	GenDig,
	Hmac,
	Lock,
	Mac,
	Nonce,
	Pause,
	Random,
	Read,
	UpdateExtra,
	Write,
}

impl Opcode {
	pub fn code(self) -> u8 {
		match self {
			Opcode::CheckMac => 0x28,
			Opcode::DeriveKey => 0x1c,
			Opcode::DevRev => 0x30,
			Opcode::GenDig => 0x15,
			Opcode::Hmac => 0x11,
			Opcode::Lock => 0x17,
			Opcode::Mac => 0x08,
			Opcode::Nonce => 0x16,
			Opcode::Pause => 0x01,
			Opcode::Random => 0x1b,
			Opcode::Read => 0x02,
			Opcode::UpdateExtra => 0x20,
			Opcode::Write => 0x12,
		}
	}

	pub fn from_code(code: u8) -> Option<Self> {
		lookup(code).map(|spec| spec.opcode)
	}

	pub fn spec(self) -> &'static OpcodeSpec {
		CATALOG.iter().find(|spec| spec.opcode == self).expect("every opcode has a catalog entry")
	}
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, Fail)]
pub enum ParameterError {
	#[fail(display = "unknown opcode 0x{:02x}", _0)]
	UnknownOpcode(u8),
	#[fail(display = "reserved bits set in param1 0x{:02x} (allowed: 0x{:02x})", param1, allowed)]
	ReservedBits {
		param1: u8,
		allowed: u8,
	},
	#[fail(display = "param1 0x{:02x} out of range", _0)]
	Param1(u8),
	#[fail(display = "key id {} larger than 15", _0)]
	KeyId(u16),
	#[fail(display = "summary 0x{:04x} must be zero when not checking the zone crc", _0)]
	SummaryNotZero(u16),
	#[fail(display = "invalid zone {}", _0)]
	Zone(u8),
	#[fail(display = "word address 0x{:02x} outside zone {}", address, zone)]
	Address {
		zone: u8,
		address: u16,
	},
	#[fail(display = "32-byte access not allowed for the OTP zone")]
	LongOtpAccess,
	#[fail(display = "data segment {} is required", _0)]
	MissingData(usize),
	#[fail(display = "data segment {} not used by this command", _0)]
	UnexpectedData(usize),
	#[fail(display = "data segment {} has invalid length {}", segment, length)]
	DataLength {
		segment: usize,
		length: usize,
	},
	#[fail(display = "command of {} bytes too long", _0)]
	FrameTooLong(usize),
	#[fail(display = "response buffer of {} bytes too small for {} byte response", length, needed)]
	ResponseBuffer {
		length: usize,
		needed: usize,
	},
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Param1 {
	Any,
	/// only bits in the mask may be set
	Mask(u8),
	Max(u8),
	OneOf(&'static [u8]),
}

/// data segment usage; the length list is empty when any length is fine
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Segment {
	Unused,
	Optional(&'static [usize]),
	Required(&'static [usize]),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ResponseSize {
	Fixed(usize),
	/// 4 or 32 bytes data depending on the zone count flag in param1
	ZoneWidth,
	/// only the non-passthrough modes return a random number
	NonceMode,
}

impl ResponseSize {
	pub fn resolve(self, param1: u8) -> usize {
		match self {
			ResponseSize::Fixed(size) => size,
			ResponseSize::ZoneWidth => {
				if 0 != param1 & ZONE_COUNT_FLAG { RSP_SIZE_32 } else { RSP_SIZE_4 }
			},
			ResponseSize::NonceMode => {
				if param1 == NONCE_MODE_PASSTHROUGH { RSP_SIZE_STATUS } else { RSP_SIZE_32 }
			},
		}
	}
}

pub type Check = fn(&Command) -> Result<(), ParameterError>;

pub struct OpcodeSpec {
	pub opcode: Opcode,
	pub param1: Param1,
	/// param2 selects a key slot
	pub key_id: bool,
	pub data: [Segment; 3],
	/// rules spanning several fields
	pub check: Option<Check>,
	/// typical execution time; polling starts after it
	pub delay_ms: u32,
	/// maximum execution time
	pub exec_max_ms: u32,
	pub response: ResponseSize,
}

impl OpcodeSpec {
	pub fn code(&self) -> u8 {
		self.opcode.code()
	}

	pub fn poll_timeout_ms(&self) -> u32 {
		self.exec_max_ms - self.delay_ms
	}

	pub fn response_size(&self, param1: u8) -> usize {
		self.response.resolve(param1)
	}

	pub fn validate(&self, command: &Command) -> Result<(), ParameterError> {
		let param1 = command.param1;
		match self.param1 {
			Param1::Any => (),
			Param1::Mask(allowed) => ensure_param(0 == param1 & !allowed, ParameterError::ReservedBits { param1, allowed })?,
			Param1::Max(max) => ensure_param(param1 <= max, ParameterError::Param1(param1))?,
			Param1::OneOf(values) => ensure_param(values.contains(&param1), ParameterError::Param1(param1))?,
		}

		if self.key_id {
			ensure_param(command.param2 <= KEY_ID_MAX, ParameterError::KeyId(command.param2))?;
		}

		for (index, (segment, data)) in self.data.iter().zip(command.data.iter()).enumerate() {
			let number = index + 1;
			match (*segment, *data) {
				(Segment::Unused, Some(_)) => return Err(ParameterError::UnexpectedData(number)),
				(Segment::Required(_), None) => return Err(ParameterError::MissingData(number)),
				(Segment::Optional(lengths), Some(data)) | (Segment::Required(lengths), Some(data)) => {
					if !lengths.is_empty() && !lengths.contains(&data.len()) {
						return Err(ParameterError::DataLength { segment: number, length: data.len() });
					}
				},
				_ => (),
			}
		}

		match self.check {
			Some(check) => check(command),
			None => Ok(()),
		}
	}
}

fn ensure_param(condition: bool, error: ParameterError) -> Result<(), ParameterError> {
	if condition { Ok(()) } else { Err(error) }
}

fn check_zone_address(command: &Command) -> Result<(), ParameterError> {
	let zone = command.param1 & ZONE_MASK;
	let max = match zone {
		ZONE_CONFIG => ADDRESS_MASK_CONFIG,
		ZONE_OTP => ADDRESS_MASK_OTP,
		ZONE_DATA => ADDRESS_MASK,
		_ => return Err(ParameterError::Zone(zone)),
	};
	ensure_param(command.param2 <= max, ParameterError::Address { zone, address: command.param2 })
}

fn check_read(command: &Command) -> Result<(), ParameterError> {
	let long = 0 != command.param1 & ZONE_COUNT_FLAG;
	ensure_param(!(long && command.param1 & ZONE_MASK == ZONE_OTP), ParameterError::LongOtpAccess)?;
	check_zone_address(command)
}

fn check_write(command: &Command) -> Result<(), ParameterError> {
	check_zone_address(command)?;
	let expected = if 0 != command.param1 & ZONE_COUNT_FLAG { ZONE_ACCESS_32 } else { ZONE_ACCESS_4 };
	let length = command.data[0].map_or(0, |d| d.len());
	ensure_param(length == expected, ParameterError::DataLength { segment: 1, length })?;

	// the mac segment goes with the mac flag
	match (0 != command.param1 & WRITE_ZONE_WITH_MAC, command.data[1].is_some()) {
		(true, false) => Err(ParameterError::MissingData(2)),
		(false, true) => Err(ParameterError::UnexpectedData(2)),
		_ => Ok(()),
	}
}

fn check_lock(command: &Command) -> Result<(), ParameterError> {
	let no_crc = 0 != command.param1 & LOCK_ZONE_NO_CRC;
	ensure_param(!no_crc || command.param2 == 0, ParameterError::SummaryNotZero(command.param2))
}

fn check_mac(command: &Command) -> Result<(), ParameterError> {
	let tempkey = 0 != command.param1 & MAC_MODE_BLOCK2_TEMPKEY;
	ensure_param(tempkey || command.data[0].is_some(), ParameterError::MissingData(1))
}

fn check_nonce(command: &Command) -> Result<(), ParameterError> {
	ensure_param(command.param1 != NONCE_MODE_INVALID, ParameterError::Param1(command.param1))?;
	let expected = if command.param1 == NONCE_MODE_PASSTHROUGH { NONCE_NUMIN_SIZE_PASSTHROUGH } else { NONCE_NUMIN_SIZE };
	let length = command.data[0].map_or(0, |d| d.len());
	ensure_param(length == expected, ParameterError::DataLength { segment: 1, length })
}

const NO_DATA: [Segment; 3] = [Segment::Unused, Segment::Unused, Segment::Unused];

/// All commands the device understands, with datasheet timing
pub static CATALOG: [OpcodeSpec; 13] = [
	OpcodeSpec {
		opcode: Opcode::CheckMac,
		param1: Param1::Mask(CHECKMAC_MODE_MASK),
		key_id: true,
		data: [
			Segment::Required(&[CHECKMAC_CLIENT_CHALLENGE_SIZE]),
			Segment::Required(&[CHECKMAC_CLIENT_RESPONSE_SIZE]),
			Segment::Optional(&[CHECKMAC_OTHER_DATA_SIZE]),
		],
		check: None,
		delay_ms: 11,
		exec_max_ms: 38,
		response: ResponseSize::Fixed(RSP_SIZE_STATUS),
	},
	OpcodeSpec {
		opcode: Opcode::DeriveKey,
		param1: Param1::Mask(DERIVE_KEY_RANDOM_FLAG),
		key_id: true,
		data: [Segment::Optional(&[DERIVE_KEY_MAC_SIZE]), Segment::Unused, Segment::Unused],
		check: None,
		delay_ms: 13,
		exec_max_ms: 63,
		response: ResponseSize::Fixed(RSP_SIZE_STATUS),
	},
	OpcodeSpec {
		opcode: Opcode::DevRev,
		param1: Param1::Max(0),
		key_id: false,
		data: NO_DATA,
		check: None,
		delay_ms: 0,
		exec_max_ms: 2,
		response: ResponseSize::Fixed(RSP_SIZE_4),
	},
	OpcodeSpec {
		opcode: Opcode::GenDig,
		param1: Param1::OneOf(&[GENDIG_ZONE_OTP, GENDIG_ZONE_DATA]),
		key_id: false,
		data: [Segment::Optional(&[GENDIG_OTHER_DATA_SIZE]), Segment::Unused, Segment::Unused],
		check: None,
		delay_ms: 10,
		exec_max_ms: 43,
		response: ResponseSize::Fixed(RSP_SIZE_STATUS),
	},
	OpcodeSpec {
		opcode: Opcode::Hmac,
		param1: Param1::Mask(HMAC_MODE_MASK),
		key_id: true,
		data: NO_DATA,
		check: None,
		delay_ms: 26,
		exec_max_ms: 70,
		response: ResponseSize::Fixed(RSP_SIZE_32),
	},
	OpcodeSpec {
		opcode: Opcode::Lock,
		param1: Param1::Mask(LOCK_ZONE_MASK),
		key_id: false,
		data: NO_DATA,
		check: Some(check_lock),
		delay_ms: 4,
		exec_max_ms: 24,
		response: ResponseSize::Fixed(RSP_SIZE_STATUS),
	},
	OpcodeSpec {
		opcode: Opcode::Mac,
		param1: Param1::Mask(MAC_MODE_MASK),
		key_id: true,
		data: [Segment::Optional(&[MAC_CHALLENGE_SIZE]), Segment::Unused, Segment::Unused],
		check: Some(check_mac),
		delay_ms: 11,
		exec_max_ms: 35,
		response: ResponseSize::Fixed(RSP_SIZE_32),
	},
	OpcodeSpec {
		opcode: Opcode::Nonce,
		param1: Param1::Max(NONCE_MODE_PASSTHROUGH),
		key_id: false,
		data: [
			Segment::Required(&[NONCE_NUMIN_SIZE, NONCE_NUMIN_SIZE_PASSTHROUGH]),
			Segment::Unused,
			Segment::Unused,
		],
		check: Some(check_nonce),
		delay_ms: 21,
		exec_max_ms: 61,
		response: ResponseSize::NonceMode,
	},
	OpcodeSpec {
		opcode: Opcode::Pause,
		param1: Param1::Any,
		key_id: false,
		data: NO_DATA,
		check: None,
		delay_ms: 0,
		exec_max_ms: 2,
		response: ResponseSize::Fixed(RSP_SIZE_STATUS),
	},
	OpcodeSpec {
		opcode: Opcode::Random,
		param1: Param1::Max(RANDOM_NO_SEED_UPDATE),
		key_id: false,
		data: NO_DATA,
		check: None,
		delay_ms: 10,
		exec_max_ms: 51,
		response: ResponseSize::Fixed(RSP_SIZE_32),
	},
	OpcodeSpec {
		opcode: Opcode::Read,
		param1: Param1::Mask(ZONE_COUNT_FLAG | ZONE_MASK),
		key_id: false,
		data: NO_DATA,
		check: Some(check_read),
		delay_ms: 0,
		exec_max_ms: 4,
		response: ResponseSize::ZoneWidth,
	},
	OpcodeSpec {
		opcode: Opcode::UpdateExtra,
		param1: Param1::Max(UPDATE_CONFIG_BYTE_86),
		key_id: false,
		data: NO_DATA,
		check: None,
		delay_ms: 3,
		exec_max_ms: 6,
		response: ResponseSize::Fixed(RSP_SIZE_STATUS),
	},
	OpcodeSpec {
		opcode: Opcode::Write,
		param1: Param1::Mask(WRITE_ZONE_MASK),
		key_id: false,
		data: [
			Segment::Required(&[ZONE_ACCESS_4, ZONE_ACCESS_32]),
			Segment::Optional(&[WRITE_MAC_SIZE]),
			Segment::Unused,
		],
		check: Some(check_write),
		delay_ms: 3,
		exec_max_ms: 42,
		response: ResponseSize::Fixed(RSP_SIZE_STATUS),
	},
];

pub fn lookup(code: u8) -> Option<&'static OpcodeSpec> {
	CATALOG.iter().find(|spec| spec.code() == code)
}
