//! Contract ABI helpers for the payments contract.
//!
//! Covers the two events the contract emits, the two methods the synchronizer calls, 32-byte
//! word decoding and EIP-55 address checksums. All hashing is Keccak-256.

use super::types::{Address, LedgerError};

use sha3::{Digest, Keccak256};
use std::fmt;

/// `owner()` accessor.
pub const OWNER_SIGNATURE: &str = "owner()";
/// `withdraw()` method, callable by the owner only.
pub const WITHDRAW_SIGNATURE: &str = "withdraw()";

/// The events emitted by the payments contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// A payment was received by the contract.
	Payment,
	/// The owner withdrew the contract balance.
	Withdrawal,
}

impl EventKind {
	pub const ALL: [EventKind; 2] = [EventKind::Payment, EventKind::Withdrawal];

	/// Solidity event signature.
	pub fn signature(&self) -> &'static str {
		match self {
			EventKind::Payment => "PaymentEvent(address,uint256,uint256)",
			EventKind::Withdrawal => "Withdrawal(uint256,uint256)",
		}
	}

	/// `topics[0]` of logs of this kind.
	pub fn topic(&self) -> [u8; 32] {
		keccak256(self.signature().as_bytes())
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EventKind::Payment => f.write_str("PaymentEvent"),
			EventKind::Withdrawal => f.write_str("Withdrawal"),
		}
	}
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
	let mut hasher = Keccak256::new();
	hasher.update(data);
	hasher.finalize().into()
}

/// First four bytes of the hashed method signature.
pub fn selector(signature: &str) -> [u8; 4] {
	let hash = keccak256(signature.as_bytes());
	[hash[0], hash[1], hash[2], hash[3]]
}

/// Calldata for a method without arguments.
pub fn encode_call(signature: &str) -> Vec<u8> {
	selector(signature).to_vec()
}

/// Split ABI data into 32-byte words. `None` if the length is not a multiple of 32.
pub fn words(data: &[u8]) -> Option<Vec<[u8; 32]>> {
	if data.len() % 32 != 0 {
		return None;
	}
	data.chunks_exact(32)
		.map(|chunk| chunk.try_into().ok())
		.collect()
}

/// Interpret a word as an address. `None` if the upper 12 bytes are not zero.
pub fn word_to_address(word: &[u8; 32]) -> Option<Address> {
	if word[..12].iter().any(|b| *b != 0) {
		return None;
	}
	Some(checksum_address(&word[12..]))
}

/// Interpret a word as an unsigned integer that must fit in 64 bits.
pub fn word_to_u64(word: &[u8; 32]) -> Option<u64> {
	if word[..24].iter().any(|b| *b != 0) {
		return None;
	}
	let mut low = [0u8; 8];
	low.copy_from_slice(&word[24..]);
	Some(u64::from_be_bytes(low))
}

/// Decode the return data of an accessor returning a single `address`.
pub fn decode_address_return(data: &[u8]) -> Result<Address, LedgerError> {
	let words = words(data)
		.filter(|words| words.len() == 1)
		.ok_or_else(|| LedgerError::Decode(format!("expected one word, got {} bytes", data.len())))?;
	word_to_address(&words[0])
		.ok_or_else(|| LedgerError::Decode("return word is not an address".to_string()))
}

/// EIP-55 mixed-case rendering of 20 address bytes.
pub fn checksum_address(bytes: &[u8]) -> Address {
	let lower = hex::encode(bytes);
	let hash = keccak256(lower.as_bytes());
	let checksummed: String = lower
		.chars()
		.enumerate()
		.map(|(i, c)| {
			let byte = hash[i / 2];
			let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
			if c.is_ascii_alphabetic() && nibble >= 8 {
				c.to_ascii_uppercase()
			} else {
				c
			}
		})
		.collect();
	Address::new(format!("0x{checksummed}"))
}
