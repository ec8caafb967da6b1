/// Delays and polling budgets for the single-wire interface.
///
/// Defaults follow the datasheet with +1% / -1% clock deviation already
/// applied; platforms with a very different polling speed should adjust
/// `start_pulse_polls` and `zero_pulse_polls`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Timing {
	/// width of one pulse unit (a "1" bit is 1 unit low + 7 units high)
	pub bit_unit_us: u32,
	/// turn-around time before driving the line after it was released
	pub rx_tx_delay_us: u32,
	/// pin reads while waiting for the start pulse of a bit
	pub start_pulse_polls: u16,
	/// pin reads while waiting for the second pulse of a "0" bit
	pub zero_pulse_polls: u16,
	pub wakeup_pulse_us: u32,
	/// time the device needs after the wake pulse
	pub wakeup_delay_ms: u32,
	/// time after which the device drops an incomplete frame
	pub sync_timeout_ms: u32,
	/// cost of a single response poll, used to split the poll budget
	pub response_poll_us: u32,
	/// longest execution time of any command
	pub command_exec_max_ms: u32,
	/// additional attempts for sending and for receiving
	pub retry_count: u8,
}

impl Default for Timing {
	fn default() -> Self {
		Timing {
			bit_unit_us: 4,
			rx_tx_delay_us: 15,
			start_pulse_polls: 255,
			zero_pulse_polls: 26,
			wakeup_pulse_us: 60,
			wakeup_delay_ms: 3,
			sync_timeout_ms: 85,
			response_poll_us: 37,
			command_exec_max_ms: 70,
			retry_count: 1,
		}
	}
}

impl Timing {
	/// number of response polls that fit into `ceiling_ms`
	pub fn response_polls(&self, ceiling_ms: u32) -> u32 {
		let poll = self.response_poll_us.max(1);
		let budget = ceiling_ms * 1000 + poll;
		// polling continues while more than one poll is left in the budget
		((budget - 1) / poll).max(1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn poll_budget_is_bounded() {
		let t = Timing::default();
		assert_eq!(t.response_polls(0), 1);
		assert_eq!(t.response_polls(4), (4037 - 1) / 37);
		assert!(t.response_polls(70) < 2000);
	}
}
