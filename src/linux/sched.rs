use std::io;
use std::mem;

use libc::{
	SCHED_FIFO,
	c_int,
	sched_get_priority_max,
	sched_getparam,
	sched_getscheduler,
	sched_param,
	sched_setscheduler,
};

/// Scheduling policy of the calling thread
#[derive(Clone, Copy)]
pub struct Policy {
	policy: c_int,
	param: sched_param,
}

impl Policy {
	pub fn current() -> io::Result<Self> {
		unsafe {
			let policy = sched_getscheduler(0);
			if policy < 0 {
				return Err(io::Error::last_os_error());
			}
			let mut param: sched_param = mem::zeroed();
			if 0 != sched_getparam(0, &mut param) {
				return Err(io::Error::last_os_error());
			}
			Ok(Policy { policy, param })
		}
	}

	pub fn fifo_max() -> io::Result<Self> {
		let priority = unsafe { sched_get_priority_max(SCHED_FIFO) };
		if priority < 0 {
			return Err(io::Error::last_os_error());
		}
		let mut param: sched_param = unsafe { mem::zeroed() };
		param.sched_priority = priority;
		Ok(Policy {
			policy: SCHED_FIFO,
			param,
		})
	}

	pub fn apply(&self) -> io::Result<()> {
		if 0 != unsafe { sched_setscheduler(0, self.policy, &self.param) } {
			return Err(io::Error::last_os_error());
		}
		Ok(())
	}
}

/// switch to realtime scheduling; returns the policy to restore later
pub fn raise_priority() -> io::Result<Policy> {
	let previous = Policy::current()?;
	Policy::fifo_max()?.apply()?;
	Ok(previous)
}
