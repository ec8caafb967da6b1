use super::CommError;
use crate::crc::CRC_SIZE;

pub const BUFFER_POS_COUNT: usize = 0;
pub const BUFFER_POS_STATUS: usize = 1;
pub const BUFFER_POS_DATA: usize = 1;

/// count + status + crc
pub const RSP_SIZE_MIN: usize = 1 + 1 + CRC_SIZE;
/// count + 32 data bytes + crc
pub const RSP_SIZE_MAX: usize = 1 + 32 + CRC_SIZE;

// not a computed crc: the device always answers a wake pulse with these bytes
pub const WAKEUP_ACK: [u8; RSP_SIZE_MIN] = [0x04, 0x11, 0x33, 0x43];

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum StatusByte {
	Success,
	CheckMacMiscompare,
	ParseError,
	ExecutionError,
	WakeupAck,
	CommunicationError,
	Unknown(u8),
}

impl From<u8> for StatusByte {
	fn from(v: u8) -> Self {
		match v {
			0x00 => StatusByte::Success,
			0x01 => StatusByte::CheckMacMiscompare,
			0x03 => StatusByte::ParseError,
			0x0f => StatusByte::ExecutionError,
			0x11 => StatusByte::WakeupAck,
			0xff => StatusByte::CommunicationError,
			v => StatusByte::Unknown(v),
		}
	}
}

impl StatusByte {
	pub fn byte(self) -> u8 {
		match self {
			StatusByte::Success => 0x00,
			StatusByte::CheckMacMiscompare => 0x01,
			StatusByte::ParseError => 0x03,
			StatusByte::ExecutionError => 0x0f,
			StatusByte::WakeupAck => 0x11,
			StatusByte::CommunicationError => 0xff,
			StatusByte::Unknown(v) => v,
		}
	}
}

/// validate the count byte of a (possibly partially) received response
///
/// `response.len()` is the size expected for the command; a device may
/// always answer with a status frame instead. Returns the frame length.
pub fn check_length(response: &[u8], received: usize) -> Result<usize, CommError> {
	let count_byte = response[BUFFER_POS_COUNT];
	let count = count_byte as usize;

	// 0xff count means we lost bit sync
	if count != RSP_SIZE_MIN && count != response.len() {
		return Err(CommError::InvalidSize(count_byte));
	}
	if received < count {
		return Err(CommError::PartialReceive { received, count });
	}
	Ok(count)
}

pub fn check_wakeup(response: &[u8; RSP_SIZE_MIN]) -> Result<(), CommError> {
	if response[BUFFER_POS_COUNT] as usize != RSP_SIZE_MIN {
		return Err(CommError::InvalidSize(response[BUFFER_POS_COUNT]));
	}
	if response[BUFFER_POS_STATUS] != WAKEUP_ACK[BUFFER_POS_STATUS] {
		return Err(CommError::WakeupFailed(response[BUFFER_POS_STATUS]));
	}
	if response[2..] != WAKEUP_ACK[2..] {
		return Err(CommError::BadCrc);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_bytes() {
		for &b in [0x00u8, 0x01, 0x03, 0x0f, 0x11, 0xff, 0x42].iter() {
			assert_eq!(StatusByte::from(b).byte(), b);
		}
		assert_eq!(StatusByte::from(0x0f), StatusByte::ExecutionError);
		assert_eq!(StatusByte::from(0x42), StatusByte::Unknown(0x42));
	}

	#[test]
	fn length_checks() {
		let mut rsp = [0u8; 7];
		rsp[0] = 7;
		assert_eq!(check_length(&rsp, 7), Ok(7));
		rsp[0] = 4;
		assert_eq!(check_length(&rsp, 4), Ok(4));
		assert_eq!(check_length(&rsp, 3), Err(CommError::PartialReceive { received: 3, count: 4 }));
		rsp[0] = 0xff;
		assert_eq!(check_length(&rsp, 7), Err(CommError::InvalidSize(0xff)));
		// neither status frame nor the size the command asked for
		rsp[0] = 5;
		assert_eq!(check_length(&rsp, 7), Err(CommError::InvalidSize(5)));
		rsp[0] = 3;
		assert_eq!(check_length(&rsp, 7), Err(CommError::InvalidSize(3)));
	}

	#[test]
	fn wakeup_ack() {
		assert_eq!(check_wakeup(&WAKEUP_ACK), Ok(()));
		assert_eq!(check_wakeup(&[0x07, 0x11, 0x33, 0x43]), Err(CommError::InvalidSize(7)));
		assert_eq!(check_wakeup(&[0x04, 0x00, 0x33, 0x43]), Err(CommError::WakeupFailed(0)));
		assert_eq!(check_wakeup(&[0x04, 0x11, 0x33, 0x44]), Err(CommError::BadCrc));
	}
}
