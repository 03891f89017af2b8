//! Record mapping for contract events.
//!
//! Raw logs are first decoded into tagged argument variants, with an explicit `Malformed` case
//! for anything that does not have the expected shape, and then mapped into display records.
//! Mapping is total: a malformed payload yields a record of empty strings. Such records are a
//! display placeholder and must not be read as zero values.

use crate::ledger::abi::{word_to_address, word_to_u64, words};
use crate::ledger::{Address, Amount, RawLog};
use crate::utils::format_timestamp;

use serde::Serialize;

/// A payment received by the contract, ready for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentRecord {
	pub payer: String,
	pub amount: String,
	pub timestamp: String,
}

/// A withdrawal executed by the owner, ready for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WithdrawalRecord {
	pub amount: String,
	pub timestamp: String,
}

/// Arguments of a `PaymentEvent(address payer, uint256 amount, uint256 timestamp)` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentArgs {
	Decoded {
		payer: Address,
		amount: Amount,
		timestamp: u64,
	},
	Malformed,
}

/// Arguments of a `Withdrawal(uint256 amount, uint256 timestamp)` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalArgs {
	Decoded { amount: Amount, timestamp: u64 },
	Malformed,
}

/// Decode a payment log. The payer may be indexed (in `topics[1]`) or part of the data.
pub fn decode_payment(log: &RawLog) -> PaymentArgs {
	let Some(data) = words(&log.data) else {
		return PaymentArgs::Malformed;
	};
	let decoded = match (log.topics.len(), data.as_slice()) {
		(1, [payer, amount, timestamp]) => word_to_address(payer)
			.zip(word_to_u64(timestamp))
			.map(|(payer, timestamp)| (payer, Amount::from_be_bytes(*amount), timestamp)),
		(2, [amount, timestamp]) => word_to_address(&log.topics[1])
			.zip(word_to_u64(timestamp))
			.map(|(payer, timestamp)| (payer, Amount::from_be_bytes(*amount), timestamp)),
		_ => None,
	};
	match decoded {
		Some((payer, amount, timestamp)) => PaymentArgs::Decoded {
			payer,
			amount,
			timestamp,
		},
		None => PaymentArgs::Malformed,
	}
}

/// Decode a withdrawal log.
pub fn decode_withdrawal(log: &RawLog) -> WithdrawalArgs {
	match words(&log.data).as_deref() {
		Some([amount, timestamp]) => match word_to_u64(timestamp) {
			Some(timestamp) => WithdrawalArgs::Decoded {
				amount: Amount::from_be_bytes(*amount),
				timestamp,
			},
			None => WithdrawalArgs::Malformed,
		},
		_ => WithdrawalArgs::Malformed,
	}
}

pub fn payment_record(args: &PaymentArgs) -> PaymentRecord {
	match args {
		PaymentArgs::Decoded {
			payer,
			amount,
			timestamp,
		} => PaymentRecord {
			payer: payer.to_string(),
			amount: amount.to_decimal_string(),
			timestamp: format_timestamp(*timestamp),
		},
		PaymentArgs::Malformed => PaymentRecord::default(),
	}
}

pub fn withdrawal_record(args: &WithdrawalArgs) -> WithdrawalRecord {
	match args {
		WithdrawalArgs::Decoded { amount, timestamp } => WithdrawalRecord {
			amount: amount.to_decimal_string(),
			timestamp: format_timestamp(*timestamp),
		},
		WithdrawalArgs::Malformed => WithdrawalRecord::default(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ledger::EventKind;

	fn word(value: u128) -> [u8; 32] {
		Amount::from(value).to_be_bytes()
	}

	fn address_word(last: u8) -> [u8; 32] {
		let mut word = [0u8; 32];
		word[31] = last;
		word
	}

	fn log(topics: Vec<[u8; 32]>, data: Vec<[u8; 32]>) -> RawLog {
		RawLog {
			address: Address::new("0xb5b209b4de252716240ef40d9658265dae8d3453"),
			topics,
			data: data.concat(),
			block_height: 1,
			log_index: 0,
			transaction_hash: "0x01".to_string(),
			removed: false,
		}
	}

	#[test]
	fn test_malformed_payment_maps_to_empty_strings() {
		assert_eq!(
			payment_record(&PaymentArgs::Malformed),
			PaymentRecord {
				payer: String::new(),
				amount: String::new(),
				timestamp: String::new(),
			}
		);
		assert_eq!(
			withdrawal_record(&WithdrawalArgs::Malformed),
			WithdrawalRecord::default()
		);
	}

	#[test]
	fn test_payment_record_fields() {
		let record = payment_record(&PaymentArgs::Decoded {
			payer: Address::new("0xABC"),
			amount: Amount::from(1000u128),
			timestamp: 1_700_000_000,
		});
		assert_eq!(
			record,
			PaymentRecord {
				payer: "0xABC".to_string(),
				amount: "1000".to_string(),
				timestamp: format_timestamp(1_700_000_000),
			}
		);
	}

	#[test]
	fn test_decode_payment_data_and_indexed_payer() {
		let topic = EventKind::Payment.topic();
		let from_data = decode_payment(&log(
			vec![topic],
			vec![address_word(0xab), word(5), word(1_700_000_000)],
		));
		let from_topic = decode_payment(&log(
			vec![topic, address_word(0xab)],
			vec![word(5), word(1_700_000_000)],
		));
		assert_eq!(from_data, from_topic);
		match from_data {
			PaymentArgs::Decoded {
				payer,
				amount,
				timestamp,
			} => {
				assert!(payer.matches(&Address::new(
					"0x00000000000000000000000000000000000000ab"
				)));
				assert_eq!(amount, Amount::from(5u128));
				assert_eq!(timestamp, 1_700_000_000);
			}
			PaymentArgs::Malformed => panic!("expected decoded payment"),
		}
	}

	#[test]
	fn test_decode_rejects_wrong_shapes() {
		let topic = EventKind::Payment.topic();
		assert_eq!(
			decode_payment(&log(vec![topic], vec![word(5), word(1)])),
			PaymentArgs::Malformed
		);
		// upper bytes set: not an address
		assert_eq!(
			decode_payment(&log(vec![topic], vec![[0xff; 32], word(5), word(1)])),
			PaymentArgs::Malformed
		);
		let mut truncated = log(vec![topic], vec![word(1), word(2), word(3)]);
		truncated.data.pop();
		assert_eq!(decode_payment(&truncated), PaymentArgs::Malformed);

		let withdrawal = EventKind::Withdrawal.topic();
		assert_eq!(
			decode_withdrawal(&log(vec![withdrawal], vec![word(5)])),
			WithdrawalArgs::Malformed
		);
		assert_eq!(
			decode_withdrawal(&log(vec![withdrawal], vec![word(5), word(u128::MAX)])),
			WithdrawalArgs::Malformed
		);
	}

	#[test]
	fn test_withdrawal_amount_is_exact() {
		let args = decode_withdrawal(&log(
			vec![EventKind::Withdrawal.topic()],
			vec![word(u128::MAX), word(1_700_000_000)],
		));
		let record = withdrawal_record(&args);
		assert_eq!(record.amount, u128::MAX.to_string());
		assert_eq!(record.timestamp, format_timestamp(1_700_000_000));
	}
}
