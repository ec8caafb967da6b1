//! Command executor: validation against the opcode catalog, frame assembly
//! and dispatch through the communication layer.

pub mod catalog;
mod marshal;

pub use self::catalog::{
	consts,
	Opcode,
	OpcodeSpec,
	ParameterError,
	CATALOG,
};

use failure::Fail;

use crate::comm::{
	BUFFER_POS_COUNT,
	BUFFER_POS_DATA,
	BUFFER_POS_STATUS,
	Channel,
	CommError,
	Outcome,
	RSP_SIZE_MAX,
	RSP_SIZE_MIN,
	StatusByte,
};
use crate::crc::{
	self,
	CRC_SIZE,
};
use crate::swi::Transceiver;
use crate::timing::Timing;
use self::consts::{
	CMD_HEADER_SIZE,
	CMD_SIZE_MAX,
};

#[derive(Clone, PartialEq, Eq, Debug, Fail)]
pub enum Error {
	#[fail(display = "invalid command: {}", _0)]
	Parameter(#[fail(cause)] ParameterError),
	#[fail(display = "communication failed: {}", _0)]
	Comm(#[fail(cause)] CommError),
}

impl From<ParameterError> for Error {
	fn from(e: ParameterError) -> Self {
		Error::Parameter(e)
	}
}

impl From<CommError> for Error {
	fn from(e: CommError) -> Self {
		Error::Comm(e)
	}
}

/// One device command before assembly
///
/// The data segments are copied into the frame in order; absent segments
/// take no space.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Command<'a> {
	pub opcode: u8,
	pub param1: u8,
	pub param2: u16,
	pub data: [Option<&'a [u8]>; 3],
}

impl<'a> Command<'a> {
	pub fn new(opcode: u8, param1: u8, param2: u16) -> Self {
		Command {
			opcode,
			param1,
			param2,
			data: [None; 3],
		}
	}

	pub fn data1(mut self, data: &'a [u8]) -> Self {
		self.data[0] = Some(data);
		self
	}

	pub fn data2(mut self, data: &'a [u8]) -> Self {
		self.data[1] = Some(data);
		self
	}

	pub fn data3(mut self, data: &'a [u8]) -> Self {
		self.data[2] = Some(data);
		self
	}

	/// header + data segments + crc
	pub fn frame_len(&self) -> usize {
		let data: usize = self.data.iter().map(|d| d.map_or(0, |d| d.len())).sum();
		CMD_HEADER_SIZE + data + CRC_SIZE
	}

	/// build the wire frame `[count, opcode, param1, param2 lo, param2 hi,
	/// data..., crc lo, crc hi]`
	pub fn assemble(&self) -> Result<Vec<u8>, ParameterError> {
		let len = self.frame_len();
		if len > CMD_SIZE_MAX {
			return Err(ParameterError::FrameTooLong(len));
		}

		let mut frame = Vec::with_capacity(len);
		frame.push(len as u8);
		frame.push(self.opcode);
		frame.push(self.param1);
		frame.push(self.param2 as u8);
		frame.push((self.param2 >> 8) as u8);
		for data in self.data.iter().filter_map(|d| *d) {
			frame.extend_from_slice(data);
		}
		frame.extend_from_slice(&[0; CRC_SIZE]);
		crc::append(&mut frame);
		Ok(frame)
	}
}

/// A validated response frame
#[derive(Clone, Copy)]
pub struct Response {
	buffer: [u8; RSP_SIZE_MAX],
	outcome: Outcome,
}

impl Response {
	/// count byte, payload and crc
	pub fn frame(&self) -> &[u8] {
		&self.buffer[..self.buffer[BUFFER_POS_COUNT] as usize]
	}

	/// payload without count and crc
	pub fn data(&self) -> &[u8] {
		let frame = self.frame();
		&frame[BUFFER_POS_DATA..frame.len() - CRC_SIZE]
	}

	/// status byte if the device answered with a status frame
	pub fn status(&self) -> Option<StatusByte> {
		if self.frame().len() == RSP_SIZE_MIN {
			Some(StatusByte::from(self.buffer[BUFFER_POS_STATUS]))
		} else {
			None
		}
	}

	pub fn outcome(&self) -> Outcome {
		self.outcome
	}
}

impl std::fmt::Debug for Response {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("Response")
			.field("frame", &self.frame())
			.field("outcome", &self.outcome)
			.finish()
	}
}

/// Handle for one device on a single-wire bus
pub struct Sha204<T: Transceiver> {
	channel: Channel<T>,
}

impl<T: Transceiver> Sha204<T> {
	pub fn new(swi: T, timing: Timing) -> Self {
		Sha204 {
			channel: Channel::new(swi, timing),
		}
	}

	pub fn channel(&mut self) -> &mut Channel<T> {
		&mut self.channel
	}

	pub fn into_inner(self) -> T {
		self.channel.into_inner()
	}

	pub fn wakeup(&mut self) -> Result<(), CommError> {
		self.channel.wakeup()
	}

	pub fn sleep(&mut self) -> Result<(), CommError> {
		self.channel.sleep()
	}

	pub fn idle(&mut self) -> Result<(), CommError> {
		self.channel.idle()
	}

	/// validate, assemble and run a command; the response frame ends up at
	/// the start of `response`
	///
	/// Nothing is transmitted if validation fails.
	pub fn execute_into(&mut self, command: &Command, response: &mut [u8]) -> Result<Outcome, Error> {
		let spec = catalog::lookup(command.opcode).ok_or(ParameterError::UnknownOpcode(command.opcode))?;
		spec.validate(command)?;

		let size = spec.response_size(command.param1);
		if response.len() < size {
			return Err(ParameterError::ResponseBuffer { length: response.len(), needed: size }.into());
		}

		let mut frame = command.assemble()?;
		debug!("{:?}: param1 0x{:02x}, param2 0x{:04x}, {} bytes", spec.opcode, command.param1, command.param2, frame.len());
		let outcome = self.channel.send_and_receive(&mut frame, response, size, spec.delay_ms, spec.poll_timeout_ms())?;
		Ok(outcome)
	}

	pub fn execute(&mut self, command: &Command) -> Result<Response, Error> {
		let mut buffer = [0u8; RSP_SIZE_MAX];
		let outcome = self.execute_into(command, &mut buffer)?;
		Ok(Response {
			buffer,
			outcome,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use super::catalog::Segment;
	use super::consts::*;
	use crate::testing::{
		frame,
		status,
		MockDevice,
		Reply,
	};

	fn device(replies: Vec<Reply>) -> Sha204<MockDevice> {
		Sha204::new(MockDevice::new(replies), Timing::default())
	}

	#[test]
	fn frame_layout() {
		let data = [0x11u8, 0x22, 0x33, 0x44];
		let mac = [0x55u8; 32];
		let command = Command::new(Opcode::Write.code(), ZONE_DATA, 0x0102).data1(&data).data2(&mac);
		let frame = command.assemble().unwrap();
		assert_eq!(frame.len(), command.frame_len());
		assert_eq!(frame.len(), 5 + 4 + 32 + 2);
		assert_eq!(&frame[..5], &[43, 0x12, 0x02, 0x02, 0x01]);
		assert_eq!(&frame[5..9], &data);
		assert_eq!(&frame[9..41], &mac[..]);
		assert!(crc::check_frame(&frame));
	}

	fn segment_choices(segment: Segment) -> Vec<Option<usize>> {
		match segment {
			Segment::Unused => vec![None],
			Segment::Optional(lengths) => {
				std::iter::once(None).chain(lengths.iter().map(|&l| Some(l))).collect()
			},
			Segment::Required(lengths) => lengths.iter().map(|&l| Some(l)).collect(),
		}
	}

	// a param1 that agrees with the given data layout
	fn param1_for(opcode: Opcode, lengths: &[Option<usize>; 3]) -> u8 {
		match opcode {
			Opcode::Write => {
				let mut param1 = ZONE_DATA;
				if lengths[0] == Some(ZONE_ACCESS_32) {
					param1 |= ZONE_COUNT_FLAG;
				}
				if lengths[1].is_some() {
					param1 |= WRITE_ZONE_WITH_MAC;
				}
				param1
			},
			Opcode::Nonce if lengths[0] == Some(NONCE_NUMIN_SIZE_PASSTHROUGH) => NONCE_MODE_PASSTHROUGH,
			Opcode::Mac if lengths[0].is_none() => MAC_MODE_BLOCK2_TEMPKEY,
			Opcode::GenDig => GENDIG_ZONE_DATA,
			_ => 0,
		}
	}

	#[test]
	fn frame_len_for_every_legal_layout() {
		let buffer = [0x5au8; 32];
		for spec in CATALOG.iter() {
			let mut layouts = 0;
			for &a in segment_choices(spec.data[0]).iter() {
				for &b in segment_choices(spec.data[1]).iter() {
					for &c in segment_choices(spec.data[2]).iter() {
						let lengths = [a, b, c];
						let mut command = Command::new(spec.code(), param1_for(spec.opcode, &lengths), 0);
						for (slot, length) in command.data.iter_mut().zip(lengths.iter()) {
							*slot = length.map(|l| &buffer[..l]);
						}
						assert_eq!(spec.validate(&command), Ok(()), "{:?} {:?}", spec.opcode, lengths);

						let frame = command.assemble().unwrap();
						let data: usize = lengths.iter().map(|l| l.unwrap_or(0)).sum();
						assert_eq!(frame.len(), CMD_HEADER_SIZE + data + CRC_SIZE, "{:?} {:?}", spec.opcode, lengths);
						assert_eq!(frame.len(), command.frame_len());
						assert_eq!(frame[0] as usize, frame.len());
						assert!(crc::check_frame(&frame));
						layouts += 1;
					}
				}
			}
			assert!(layouts > 0, "{:?}", spec.opcode);
		}
	}

	#[test]
	fn frame_too_long() {
		let big = [0u8; 80];
		let command = Command::new(Opcode::CheckMac.code(), 0, 0).data1(&big);
		assert_eq!(command.assemble(), Err(ParameterError::FrameTooLong(87)));
	}

	#[test]
	fn random_frame() {
		let mut dev = device(vec![frame(&[0x5a; 32])]);
		let response = dev.execute(&Command::new(Opcode::Random.code(), 0, 0)).unwrap();
		assert_eq!(response.data(), &[0x5a; 32][..]);
		assert_eq!(response.frame().len(), 35);
		assert_eq!(response.status(), None);
		assert_eq!(response.outcome(), Outcome::Success);
		let mock = dev.into_inner();
		assert_eq!(mock.commands, vec![vec![0x07, 0x1b, 0x00, 0x00, 0x00, 0x24, 0xcd]]);
		assert_eq!(mock.delays, vec![10]);
	}

	#[test]
	fn read_frame() {
		let mut dev = device(vec![frame(&[1, 2, 3, 4])]);
		let response = dev.execute(&Command::new(Opcode::Read.code(), ZONE_CONFIG, 0)).unwrap();
		assert_eq!(response.data(), &[1, 2, 3, 4]);
		assert_eq!(dev.into_inner().commands, vec![vec![0x07, 0x02, 0x00, 0x00, 0x00, 0x1e, 0x2d]]);
	}

	#[test]
	fn status_response() {
		let mut dev = device(vec![status(0x00)]);
		let response = dev.execute(&Command::new(Opcode::Lock.code(), LOCK_ZONE_NO_CRC, 0)).unwrap();
		assert_eq!(response.status(), Some(StatusByte::Success));
		assert!(response.data() == &[0x00]);
	}

	#[test]
	fn invalid_commands_are_not_sent() {
		let mut dev = device(vec![status(0x00)]);
		assert_eq!(
			dev.execute(&Command::new(0x42, 0, 0)).unwrap_err(),
			Error::Parameter(ParameterError::UnknownOpcode(0x42))
		);
		assert_eq!(
			dev.execute(&Command::new(Opcode::Read.code(), ZONE_OTP | ZONE_COUNT_FLAG, 0)).unwrap_err(),
			Error::Parameter(ParameterError::LongOtpAccess)
		);
		assert_eq!(
			dev.execute(&Command::new(Opcode::Nonce.code(), NONCE_MODE_SEED_UPDATE, 0)).unwrap_err(),
			Error::Parameter(ParameterError::MissingData(1))
		);
		let mock = dev.into_inner();
		assert!(mock.commands.is_empty());
		assert!(mock.flags.is_empty());
		assert_eq!(mock.remaining(), 1);
	}

	#[test]
	fn response_buffer_too_small() {
		let mut dev = device(vec![]);
		let mut small = [0u8; 7];
		assert_eq!(
			dev.execute_into(&Command::new(Opcode::Random.code(), 0, 0), &mut small).unwrap_err(),
			Error::Parameter(ParameterError::ResponseBuffer { length: 7, needed: 35 })
		);
		assert!(dev.into_inner().commands.is_empty());
	}

	#[test]
	fn device_error_is_reported() {
		let mut dev = device(vec![status(0x0f)]);
		assert_eq!(
			dev.execute(&Command::new(Opcode::DevRev.code(), 0, 0)).unwrap_err(),
			Error::Comm(CommError::DeviceExecution)
		);
	}
}
