use std::thread;
use std::time::{
	Duration,
	Instant,
};

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

// sleeping has way too much jitter for pulse timing; spin instead
pub fn busy_wait(duration: Duration) {
	let start = Instant::now();
	while start.elapsed() < duration {}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Level {
	Low,
	High,
}

impl From<bool> for Level {
	fn from(v: bool) -> Self {
		match v {
			false => Level::Low,
			true => Level::High,
		}
	}
}

/// GPIO capabilities needed to drive the signal wire
pub trait SignalPin {
	fn set_output(&mut self);
	fn set_input(&mut self);
	fn write(&mut self, level: Level);
	fn read(&mut self) -> Level;

	fn delay_micros(&mut self, us: u32) {
		busy_wait(Duration::from_micros(us as u64));
	}

	fn delay_millis(&mut self, ms: u32) {
		reliable_sleep(Duration::from_millis(ms as u64));
	}

	// keep the scheduler (or interrupts) away while bits are on the wire
	fn enter_critical(&mut self) {
	}

	fn leave_critical(&mut self) {
	}
}

impl<'a, P: ?Sized + SignalPin> SignalPin for &'a mut P {
	fn set_output(&mut self) {
		P::set_output(*self)
	}
	fn set_input(&mut self) {
		P::set_input(*self)
	}
	fn write(&mut self, level: Level) {
		P::write(*self, level)
	}
	fn read(&mut self) -> Level {
		P::read(*self)
	}
	fn delay_micros(&mut self, us: u32) {
		P::delay_micros(*self, us)
	}
	fn delay_millis(&mut self, ms: u32) {
		P::delay_millis(*self, ms)
	}
	fn enter_critical(&mut self) {
		P::enter_critical(*self)
	}
	fn leave_critical(&mut self) {
		P::leave_critical(*self)
	}
}
