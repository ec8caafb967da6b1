use std::ops::{
	Deref,
	DerefMut,
};

use super::{
	Level,
	SignalPin,
	SwiError,
};
use crate::timing::Timing;

/// Scheduler/interrupt suppression for the duration of a transfer
///
/// Leaves the critical section when dropped, including early returns on
/// receive timeouts.
pub struct CriticalSection<'a, P: ?Sized + SignalPin + 'a>(&'a mut P);

impl<'a, P: ?Sized + SignalPin> Drop for CriticalSection<'a, P> {
	fn drop(&mut self) {
		self.0.leave_critical();
	}
}

impl<'a, P: ?Sized + SignalPin> Deref for CriticalSection<'a, P> {
	type Target = P;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a, P: ?Sized + SignalPin> DerefMut for CriticalSection<'a, P> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

trait InternalLowLevel: SignalPin {
	// "1": one unit low, then seven units high
	fn pulse_one(&mut self, timing: &Timing) {
		self.write(Level::Low);
		self.delay_micros(timing.bit_unit_us);
		self.write(Level::High);
		self.delay_micros(7 * timing.bit_unit_us);
	}

	// "0": two short low pulses within the same eight units
	fn pulse_zero(&mut self, timing: &Timing) {
		self.write(Level::Low);
		self.delay_micros(timing.bit_unit_us);
		self.write(Level::High);
		self.delay_micros(timing.bit_unit_us);
		self.write(Level::Low);
		self.delay_micros(timing.bit_unit_us);
		self.write(Level::High);
		self.delay_micros(5 * timing.bit_unit_us);
	}

	// returns false if `level` wasn't seen within `polls` reads
	fn wait_for(&mut self, level: Level, polls: u16) -> bool {
		for _ in 0..polls {
			if self.read() == level {
				return true;
			}
		}
		false
	}

	// returns None on timeout
	fn receive_bit(&mut self, timing: &Timing) -> Option<bool> {
		// start pulse
		if !self.wait_for(Level::Low, timing.start_pulse_polls) {
			return None;
		}
		if !self.wait_for(Level::High, timing.start_pulse_polls) {
			return None;
		}

		// a second falling edge within the window means "0"
		let mut remaining = timing.zero_pulse_polls;
		let mut zero = false;
		while remaining > 0 {
			remaining -= 1;
			if self.read() == Level::Low {
				zero = true;
				break;
			}
		}
		if !zero {
			return Some(true);
		}

		// wait for the end of the zero pulse, otherwise its rising edge
		// looks like the start of the next bit
		while remaining > 0 {
			remaining -= 1;
			if self.read() == Level::High {
				break;
			}
		}
		Some(false)
	}
}

impl<P: SignalPin + ?Sized> InternalLowLevel for P {
}

pub trait LowLevel: SignalPin {
	fn critical_section(&mut self) -> CriticalSection<Self> {
		self.enter_critical();

		CriticalSection(self)
	}

	fn set_signal(&mut self, level: Level) {
		self.set_output();
		self.write(level);
	}

	// bytes in order, each byte LSB first
	fn send_bytes(&mut self, timing: &Timing, bytes: &[u8]) {
		let mut cs = self.critical_section();

		cs.write(Level::High);
		cs.set_output();
		cs.delay_micros(timing.rx_tx_delay_us);

		for &byte in bytes {
			for bit in 0..8 {
				if 0 != (byte >> bit) & 1 {
					cs.pulse_one(timing);
				} else {
					cs.pulse_zero(timing);
				}
			}
		}
	}

	// `buffer` must be zeroed: only "1" bits get set
	fn receive_bytes(&mut self, timing: &Timing, buffer: &mut [u8]) -> Result<(), SwiError> {
		let mut cs = self.critical_section();

		cs.set_input();

		for (index, byte) in buffer.iter_mut().enumerate() {
			for bit in 0..8 {
				match cs.receive_bit(timing) {
					Some(true) => *byte |= 1 << bit,
					Some(false) => (),
					None if index == 0 => return Err(SwiError::Timeout),
					None => return Err(SwiError::PartialReceive { received: index }),
				}
			}
		}

		Ok(())
	}
}

impl<P: SignalPin + ?Sized> LowLevel for P {
}
