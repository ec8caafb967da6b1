//! Single-wire interface (SWI) of the ATSHA204 family
//!
//! One open-drain line carries both directions. Every byte is sent LSB
//! first, every bit takes eight pulse units:
//! - "1": 1 unit low, 7 units high
//! - "0": 1 unit low, 1 unit high, 1 unit low, 5 units high
//!
//! The receiver only looks for a second falling edge shortly after the
//! start pulse; the exact pulse widths don't matter.
//!
//! Before each transfer the host sends a flag byte:
//! - 0x77: a command frame follows
//! - 0x88: device may transmit its response now
//! - 0xBB: go idle (keeps volatile state)
//! - 0xCC: go to sleep (volatile state lost)

mod hardware;
mod low_level;

pub use self::hardware::{
	Level,
	SignalPin,
	busy_wait,
	reliable_sleep,
};

pub use self::low_level::{
	CriticalSection,
	LowLevel,
};

use failure::Fail;

use crate::timing::Timing;

pub const FLAG_COMMAND: u8 = 0x77;
pub const FLAG_TRANSMIT: u8 = 0x88;
pub const FLAG_IDLE: u8 = 0xBB;
pub const FLAG_SLEEP: u8 = 0xCC;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Fail)]
pub enum SwiError {
	#[fail(display = "timeout waiting for a bit")]
	Timeout,
	#[fail(display = "timeout after receiving {} bytes", received)]
	PartialReceive {
		received: usize,
	},
}

/// Byte level access to the wire, as needed by the communication layer
pub trait Transceiver {
	fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), SwiError>;

	/// fills `buffer` completely or fails; `buffer` must be zeroed
	fn receive_bytes(&mut self, buffer: &mut [u8]) -> Result<(), SwiError>;

	/// pull the line low long enough to wake the device, then give it time
	/// to start up
	fn wakeup_pulse(&mut self);

	fn delay_millis(&mut self, ms: u32);

	fn send_byte(&mut self, byte: u8) -> Result<(), SwiError> {
		self.send_bytes(&[byte])
	}

	fn sleep_byte(&mut self) -> Result<(), SwiError> {
		self.send_byte(FLAG_SLEEP)
	}
}

impl<'a, T: ?Sized + Transceiver> Transceiver for &'a mut T {
	fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), SwiError> {
		T::send_bytes(*self, bytes)
	}
	fn receive_bytes(&mut self, buffer: &mut [u8]) -> Result<(), SwiError> {
		T::receive_bytes(*self, buffer)
	}
	fn wakeup_pulse(&mut self) {
		T::wakeup_pulse(*self)
	}
	fn delay_millis(&mut self, ms: u32) {
		T::delay_millis(*self, ms)
	}
}

/// Bit-banged transceiver on top of a GPIO
pub struct BitBang<P: SignalPin> {
	pin: P,
	timing: Timing,
}

impl<P: SignalPin> BitBang<P> {
	pub fn new(pin: P, timing: Timing) -> Self {
		BitBang {
			pin,
			timing,
		}
	}

	pub fn into_inner(self) -> P {
		self.pin
	}

	pub fn set_signal(&mut self, level: Level) {
		self.pin.set_signal(level);
	}
}

impl<P: SignalPin> Transceiver for BitBang<P> {
	// pushing bits can't fail; nobody acknowledges them
	fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), SwiError> {
		trace!("swi send: {:02x?}", bytes);
		LowLevel::send_bytes(&mut self.pin, &self.timing, bytes);
		Ok(())
	}

	fn receive_bytes(&mut self, buffer: &mut [u8]) -> Result<(), SwiError> {
		let result = LowLevel::receive_bytes(&mut self.pin, &self.timing, buffer);
		trace!("swi receive: {:02x?} ({:?})", buffer, result);
		result
	}

	fn wakeup_pulse(&mut self) {
		self.pin.set_signal(Level::Low);
		self.pin.delay_micros(self.timing.wakeup_pulse_us);
		self.pin.set_signal(Level::High);
		self.pin.delay_millis(self.timing.wakeup_delay_ms);
	}

	fn delay_millis(&mut self, ms: u32) {
		self.pin.delay_millis(ms);
	}
}
