// test doubles for the wire: a pin with scripted input levels and a
// transceiver with scripted device replies

use std::collections::VecDeque;

use crate::crc;
use crate::swi::{
	self,
	Level,
	SignalPin,
	SwiError,
	Transceiver,
};
use crate::timing::Timing;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PinEvent {
	Output,
	Input,
	Write(Level),
	Micros(u32),
	Millis(u32),
	Critical(bool),
}

pub struct ScriptedPin {
	reads: VecDeque<(Level, usize)>,
	pub events: Vec<PinEvent>,
}

impl ScriptedPin {
	pub fn new(reads: Vec<(Level, usize)>) -> Self {
		ScriptedPin {
			reads: reads.into_iter().collect(),
			events: Vec::new(),
		}
	}

	// input levels a device would produce for `bytes`
	pub fn encode(timing: &Timing, bytes: &[u8]) -> Vec<(Level, usize)> {
		let mut reads = Vec::new();
		for &byte in bytes {
			for bit in 0..8 {
				if 0 != (byte >> bit) & 1 {
					reads.push((Level::Low, 1));
					reads.push((Level::High, 1 + timing.zero_pulse_polls as usize));
				} else {
					reads.push((Level::Low, 1));
					reads.push((Level::High, 1));
					reads.push((Level::Low, 1));
					reads.push((Level::High, 1));
				}
			}
		}
		reads
	}

	// bytes recovered from the written pulse pattern
	pub fn decode_sent(&self, unit: u32) -> Vec<u8> {
		let pulses: Vec<PinEvent> = self.events.iter().cloned().filter(|e| match e {
			PinEvent::Write(_) | PinEvent::Micros(_) => true,
			_ => false,
		}).collect();

		let mut bits = Vec::new();
		let mut i = 0;
		while i + 3 < pulses.len() {
			let head = (pulses[i], pulses[i + 1], pulses[i + 2]);
			if head != (PinEvent::Write(Level::Low), PinEvent::Micros(unit), PinEvent::Write(Level::High)) {
				i += 1;
				continue;
			}
			match pulses[i + 3] {
				PinEvent::Micros(us) if us == 7 * unit => {
					bits.push(true);
					i += 4;
				},
				PinEvent::Micros(us) if us == unit => {
					assert_eq!(pulses[i + 7], PinEvent::Micros(5 * unit));
					bits.push(false);
					i += 8;
				},
				e => panic!("unexpected pulse {:?}", e),
			}
		}

		assert_eq!(bits.len() % 8, 0, "incomplete byte on the wire");
		bits.chunks(8).map(|chunk| {
			chunk.iter().enumerate().fold(0u8, |byte, (bit, &one)| {
				if one { byte | (1 << bit) } else { byte }
			})
		}).collect()
	}
}

impl SignalPin for ScriptedPin {
	fn set_output(&mut self) {
		self.events.push(PinEvent::Output);
	}

	fn set_input(&mut self) {
		self.events.push(PinEvent::Input);
	}

	fn write(&mut self, level: Level) {
		self.events.push(PinEvent::Write(level));
	}

	// idle line is pulled up
	fn read(&mut self) -> Level {
		match self.reads.front_mut() {
			None => Level::High,
			Some(entry) => {
				let level = entry.0;
				entry.1 -= 1;
				if 0 == entry.1 {
					self.reads.pop_front();
				}
				level
			},
		}
	}

	fn delay_micros(&mut self, us: u32) {
		self.events.push(PinEvent::Micros(us));
	}

	fn delay_millis(&mut self, ms: u32) {
		self.events.push(PinEvent::Millis(ms));
	}

	fn enter_critical(&mut self) {
		self.events.push(PinEvent::Critical(true));
	}

	fn leave_critical(&mut self) {
		self.events.push(PinEvent::Critical(false));
	}
}

/// what the scripted device does on the next receive
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Reply {
	Silent,
	/// sent as-is; a frame shorter than the receive buffer ends in a
	/// partial receive like on the real wire
	Frame(Vec<u8>),
}

pub fn frame(payload: &[u8]) -> Reply {
	Reply::Frame(with_crc(payload))
}

pub fn with_crc(payload: &[u8]) -> Vec<u8> {
	let mut frame = Vec::with_capacity(payload.len() + 3);
	frame.push((payload.len() + 3) as u8);
	frame.extend_from_slice(payload);
	frame.extend_from_slice(&[0, 0]);
	crc::append(&mut frame);
	frame
}

pub fn status(byte: u8) -> Reply {
	frame(&[byte])
}

pub fn wakeup_ack() -> Reply {
	Reply::Frame(vec![0x04, 0x11, 0x33, 0x43])
}

pub fn corrupt(payload: &[u8]) -> Reply {
	let mut frame = with_crc(payload);
	let last = frame.len() - 1;
	frame[last] ^= 0x01;
	Reply::Frame(frame)
}

#[derive(Default)]
pub struct MockDevice {
	replies: VecDeque<Reply>,
	expect_command: bool,
	pub commands: Vec<Vec<u8>>,
	pub flags: Vec<u8>,
	pub receives: usize,
	pub wakeups: usize,
	pub delays: Vec<u32>,
	pub fail_sends: usize,
}

impl MockDevice {
	pub fn new(replies: Vec<Reply>) -> Self {
		MockDevice {
			replies: replies.into_iter().collect(),
			..Default::default()
		}
	}

	pub fn remaining(&self) -> usize {
		self.replies.len()
	}
}

impl Transceiver for MockDevice {
	fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), SwiError> {
		if self.fail_sends > 0 {
			self.fail_sends -= 1;
			return Err(SwiError::Timeout);
		}
		if self.expect_command {
			self.expect_command = false;
			self.commands.push(bytes.to_vec());
			return Ok(());
		}
		assert_eq!(bytes.len(), 1, "expected a flag, got {:02x?}", bytes);
		if bytes[0] == swi::FLAG_COMMAND {
			self.expect_command = true;
		}
		self.flags.push(bytes[0]);
		Ok(())
	}

	fn receive_bytes(&mut self, buffer: &mut [u8]) -> Result<(), SwiError> {
		assert!(buffer.iter().all(|&b| b == 0), "receive buffer not zeroed");
		self.receives += 1;
		match self.replies.pop_front().unwrap_or(Reply::Silent) {
			Reply::Silent => Err(SwiError::Timeout),
			Reply::Frame(frame) => {
				let n = frame.len().min(buffer.len());
				buffer[..n].copy_from_slice(&frame[..n]);
				if n < buffer.len() {
					Err(SwiError::PartialReceive { received: n })
				} else {
					Ok(())
				}
			},
		}
	}

	fn wakeup_pulse(&mut self) {
		self.wakeups += 1;
	}

	fn delay_millis(&mut self, ms: u32) {
		self.delays.push(ms);
	}
}
