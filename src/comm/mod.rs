//! Communication layer: wakeup, resynchronisation and the retrying
//! command/response exchange.
//!
//! Only one command can be in flight; everything blocks, and every loop is
//! bounded by `Timing::retry_count` and the per-command poll ceiling.

mod response;

pub use self::response::{
	BUFFER_POS_COUNT,
	BUFFER_POS_DATA,
	BUFFER_POS_STATUS,
	RSP_SIZE_MAX,
	RSP_SIZE_MIN,
	StatusByte,
	WAKEUP_ACK,
	check_length,
	check_wakeup,
};

use failure::Fail;

use crate::crc;
use crate::swi::{
	FLAG_COMMAND,
	FLAG_IDLE,
	FLAG_TRANSMIT,
	SwiError,
	Transceiver,
};
use crate::timing::Timing;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Fail)]
pub enum CommError {
	#[fail(display = "no response from device")]
	NoResponse,
	#[fail(display = "response broke off after {} of {} bytes", received, count)]
	PartialReceive {
		received: usize,
		count: usize,
	},
	#[fail(display = "invalid response size 0x{:02x}", _0)]
	InvalidSize(u8),
	#[fail(display = "response checksum mismatch")]
	BadCrc,
	#[fail(display = "unexpected wakeup status 0x{:02x}", _0)]
	WakeupFailed(u8),
	#[fail(display = "failed to send command")]
	SendFailed,
	#[fail(display = "device reported a communication error")]
	DeviceCommunication,
	#[fail(display = "device could not parse the command")]
	DeviceParse,
	#[fail(display = "device failed to execute the command")]
	DeviceExecution,
	#[fail(display = "device unreachable")]
	DeviceUnreachable,
}

/// Result of a successful resynchronisation
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Resync {
	/// the device was awake, only the bit sync was off
	Synced,
	/// the device needed a new wake pulse; its volatile state is gone
	WokenUp,
}

/// Qualifies a successful exchange
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Outcome {
	Success,
	/// the response is valid, but the device was woken up again on the way
	/// (TempKey / nonce state from earlier commands is lost)
	ResyncedWithWakeup,
}

impl Outcome {
	pub fn session_lost(self) -> bool {
		self == Outcome::ResyncedWithWakeup
	}
}

pub struct Channel<T: Transceiver> {
	swi: T,
	timing: Timing,
}

impl<T: Transceiver> Channel<T> {
	pub fn new(swi: T, timing: Timing) -> Self {
		Channel {
			swi,
			timing,
		}
	}

	pub fn transceiver(&mut self) -> &mut T {
		&mut self.swi
	}

	pub fn into_inner(self) -> T {
		self.swi
	}

	/// wake the device and check its wakeup response
	///
	/// On failure this waits the maximum command execution time: the device
	/// might still be busy sending something.
	pub fn wakeup(&mut self) -> Result<(), CommError> {
		self.swi.wakeup_pulse();

		let mut response = [0u8; RSP_SIZE_MIN];
		let result = self.receive_response(&mut response)
			.and_then(|_| check_wakeup(&response));

		if let Err(e) = result {
			debug!("wakeup failed: {} (response {:02x?})", e, response);
			self.swi.delay_millis(self.timing.command_exec_max_ms);
		}
		result
	}

	pub fn sleep(&mut self) -> Result<(), CommError> {
		self.swi.sleep_byte().map_err(|_| CommError::SendFailed)
	}

	pub fn idle(&mut self) -> Result<(), CommError> {
		self.swi.send_byte(FLAG_IDLE).map_err(|_| CommError::SendFailed)
	}

	fn send_command(&mut self, frame: &[u8]) -> Result<(), CommError> {
		trace!("command: {:02x?}", frame);
		self.swi.send_byte(FLAG_COMMAND).map_err(|_| CommError::SendFailed)?;
		self.swi.send_bytes(frame).map_err(|_| CommError::SendFailed)
	}

	/// ask the device for a response of `response.len()` bytes
	///
	/// A status frame is shorter than most responses; a transfer ending
	/// after a complete status frame is fine. Returns the frame length; the
	/// crc is not checked.
	pub fn receive_response(&mut self, response: &mut [u8]) -> Result<usize, CommError> {
		for b in response.iter_mut() {
			*b = 0;
		}

		// a lost transmit flag shows up as missing response below
		let _ = self.swi.send_byte(FLAG_TRANSMIT);

		let received = match self.swi.receive_bytes(response) {
			Ok(()) => response.len(),
			Err(SwiError::PartialReceive { received }) => received,
			Err(SwiError::Timeout) => return Err(CommError::NoResponse),
		};

		let count = check_length(response, received)?;
		trace!("response: {:02x?}", &response[..count]);
		Ok(count)
	}

	/// recover bit sync; wakes the device if it doesn't answer anymore
	pub fn resync(&mut self, response: &mut [u8]) -> Result<Resync, CommError> {
		// device drops partial frames after the sync timeout
		self.swi.delay_millis(self.timing.sync_timeout_ms);
		match self.receive_response(response) {
			Ok(_) => {
				debug!("resynced without wakeup");
				return Ok(Resync::Synced);
			},
			Err(e) => debug!("resync without wakeup failed: {}", e),
		}

		let _ = self.swi.sleep_byte();
		self.wakeup()?;
		warn!("device had to be woken up again, volatile state lost");
		Ok(Resync::WokenUp)
	}

	// poll until a response shows up or the ceiling is used up, then check it
	fn poll_response(&mut self, response: &mut [u8], exec_timeout_ms: u32) -> Result<usize, CommError> {
		let polls = self.timing.response_polls(exec_timeout_ms);
		let mut result = Err(CommError::NoResponse);
		for _ in 0..polls {
			result = self.receive_response(response);
			if result != Err(CommError::NoResponse) {
				break;
			}
		}
		let count = result?;
		if !crc::check_frame(&response[..count]) {
			return Err(CommError::BadCrc);
		}
		Ok(count)
	}

	/// send a command frame and receive its response into
	/// `response[..response_size]`
	///
	/// `frame[0]` must hold the full frame length; the last two bytes get
	/// overwritten with the crc. The device needs at least `exec_delay_ms`
	/// before it answers; polling then goes on for up to `exec_timeout_ms`.
	///
	/// Transient errors are retried locally; the device's own parse and
	/// execution errors are returned right away.
	pub fn send_and_receive(
		&mut self,
		frame: &mut [u8],
		response: &mut [u8],
		response_size: usize,
		exec_delay_ms: u32,
		exec_timeout_ms: u32,
	) -> Result<Outcome, CommError> {
		assert_eq!(frame[BUFFER_POS_COUNT] as usize, frame.len());
		assert!(response_size >= RSP_SIZE_MIN && response_size <= response.len());

		crc::append(frame);

		let response = &mut response[..response_size];
		let attempts = self.timing.retry_count as usize + 1;
		let mut woken_up = false;
		let mut last_error = CommError::NoResponse;

		'send: for attempt in 0..attempts {
			if attempt > 0 {
				debug!("resending command (attempt {}): {}", attempt + 1, last_error);
			}

			if let Err(e) = self.send_command(frame) {
				last_error = e;
				match self.resync(response) {
					Err(CommError::NoResponse) => return Err(CommError::DeviceUnreachable),
					Ok(Resync::WokenUp) => woken_up = true,
					_ => (),
				}
				continue 'send;
			}

			self.swi.delay_millis(exec_delay_ms);

			for _ in 0..attempts {
				let count = match self.poll_response(response, exec_timeout_ms) {
					Ok(count) => count,
					Err(CommError::NoResponse) => {
						// no response within the ceiling: command got lost
						last_error = CommError::NoResponse;
						match self.resync(response) {
							Ok(Resync::WokenUp) => woken_up = true,
							Ok(Resync::Synced) => (),
							Err(e) => {
								error!("resync failed: {}", e);
								return Err(CommError::DeviceUnreachable);
							},
						}
						continue 'send;
					},
					Err(e) => {
						// garbage on the wire: try to get the response again
						last_error = e;
						match self.resync(response) {
							Ok(Resync::Synced) => continue,
							Ok(Resync::WokenUp) => {
								woken_up = true;
								continue 'send;
							},
							Err(e) => {
								error!("resync failed: {}", e);
								return Err(CommError::DeviceUnreachable);
							},
						}
					},
				};

				let outcome = if woken_up { Outcome::ResyncedWithWakeup } else { Outcome::Success };

				if count > RSP_SIZE_MIN {
					return Ok(outcome);
				}

				match StatusByte::from(response[BUFFER_POS_STATUS]) {
					StatusByte::ParseError => return Err(CommError::DeviceParse),
					StatusByte::ExecutionError => return Err(CommError::DeviceExecution),
					StatusByte::CommunicationError => {
						last_error = CommError::DeviceCommunication;
						continue 'send;
					},
					_ => return Ok(outcome),
				}
			}
		}

		Err(last_error)
	}
}
