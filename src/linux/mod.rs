//! Signal pin on a Linux sysfs GPIO (`/sys/class/gpio`).

mod sched;
mod sysfs;

use std::path::PathBuf;
use std::time::Duration;

use crate::swi::{
	Level,
	SignalPin,
	reliable_sleep,
};

const GPIO_ROOT: &str = "/sys/class/gpio";

pub struct GpioPin {
	gpio: u32,
	direction: sysfs::Attribute,
	value: sysfs::Attribute,
	output: bool,
	// level to drive once switched to output
	level: Level,
	restore: Option<sched::Policy>,
	priority_warned: bool,
}

fn gpio_dir(gpio: u32) -> PathBuf {
	PathBuf::from(GPIO_ROOT).join(format!("gpio{}", gpio))
}

/// export `gpio` (if needed) and open it as input
pub fn open_signal_pin(gpio: u32) -> crate::AResult<GpioPin> {
	let dir = gpio_dir(gpio);
	if !dir.exists() {
		with_context!(("export GPIO {}", gpio), {
			sysfs::write_once(PathBuf::from(GPIO_ROOT).join("export"), gpio.to_string().as_bytes())?;
			Ok(())
		})?;
		debug!("Exported GPIO {}", gpio);
	}

	// udev might still be adjusting permissions of a fresh export
	let mut attempt = 0;
	let direction = loop {
		match sysfs::Attribute::open(dir.join("direction"), true) {
			Ok(direction) => break direction,
			Err(e) => {
				attempt += 1;
				if attempt >= 10 {
					bail!("couldn't open direction of GPIO {}: {}", gpio, e);
				}
				reliable_sleep(Duration::from_millis(20));
			},
		}
	};
	let value = with_context!(("open value of GPIO {}", gpio), {
		Ok(sysfs::Attribute::open(dir.join("value"), true)?)
	})?;

	with_context!(("set GPIO {} as input", gpio), {
		direction.write_all(b"in")?;
		Ok(())
	})?;

	Ok(GpioPin {
		gpio,
		direction,
		value,
		output: false,
		level: Level::High,
		restore: None,
		priority_warned: false,
	})
}

impl GpioPin {
	fn set_direction(&mut self, direction: &[u8]) {
		self.direction.write_all(direction).unwrap_or_else(|e| {
			panic!("writing {:?} must not fail: {}", self.direction.path(), e)
		});
	}
}

impl SignalPin for GpioPin {
	fn set_output(&mut self) {
		if self.output {
			return;
		}
		// "high" / "low" switch direction without a glitch
		let direction: &[u8] = match self.level {
			Level::High => b"high",
			Level::Low => b"low",
		};
		self.set_direction(direction);
		self.output = true;
	}

	fn set_input(&mut self) {
		if !self.output {
			return;
		}
		self.set_direction(b"in");
		self.output = false;
	}

	fn write(&mut self, level: Level) {
		self.level = level;
		if !self.output {
			return;
		}
		let value: &[u8] = match level {
			Level::High => b"1",
			Level::Low => b"0",
		};
		self.value.write_all(value).expect("gpio value write must not fail");
	}

	fn read(&mut self) -> Level {
		let value = self.value.read_first().expect("gpio value read must not fail");
		Level::from(value != b'0')
	}

	fn enter_critical(&mut self) {
		match sched::raise_priority() {
			Ok(previous) => self.restore = Some(previous),
			Err(e) => {
				if !self.priority_warned {
					warn!("GPIO {}: couldn't switch to realtime scheduling, bit timing may suffer: {}", self.gpio, e);
					self.priority_warned = true;
				}
			},
		}
	}

	fn leave_critical(&mut self) {
		if let Some(previous) = self.restore.take() {
			if let Err(e) = previous.apply() {
				warn!("GPIO {}: couldn't restore scheduling policy: {}", self.gpio, e);
			}
		}
	}
}

impl Drop for GpioPin {
	fn drop(&mut self) {
		// release the line to the pull-up
		if self.output {
			let _ = self.direction.write_all(b"in");
		}
	}
}
