//! Types for the ledger client boundary: addresses, exact amounts, logs, transactions and errors.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

/// Block height on the ledger.
pub type BlockHeight = u64;

/// Stream of live logs delivered by a subscription.
pub type LogStream =
	Pin<Box<dyn futures_util::Stream<Item = Result<RawLog, LedgerError>> + Send>>;

/// Account or contract address as reported by the ledger.
///
/// The original casing is preserved for display. Comparisons between addresses coming from
/// different sources should use [`Address::matches`], which ignores case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
	/// Wrap an address string without validation.
	pub fn new(address: impl Into<String>) -> Self {
		Self(address.into())
	}

	/// Parse a `0x`-prefixed, 20-byte hex address.
	pub fn parse(address: &str) -> Result<Self, LedgerError> {
		let digits = address
			.strip_prefix("0x")
			.or_else(|| address.strip_prefix("0X"))
			.ok_or_else(|| LedgerError::Decode(format!("address {address} is missing 0x prefix")))?;
		if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
			return Err(LedgerError::Decode(format!(
				"address {address} is not 20 hex-encoded bytes"
			)));
		}
		Ok(Self(address.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Case-insensitive comparison, so checksummed and lowercase forms are equal.
	pub fn matches(&self, other: &Address) -> bool {
		self.0.eq_ignore_ascii_case(&other.0)
	}
}

impl From<&str> for Address {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Unsigned 256-bit ledger amount.
///
/// Ledger amounts routinely exceed the range of `f64` integers, so every conversion goes
/// through exact [`U256`] arithmetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(U256);

impl Amount {
	pub const ZERO: Amount = Amount(U256([0; 4]));

	pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
		Self(U256::from_big_endian(&bytes))
	}

	/// Build from at most 32 big-endian bytes.
	pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
		(bytes.len() <= 32).then(|| Self(U256::from_big_endian(bytes)))
	}

	pub fn to_be_bytes(&self) -> [u8; 32] {
		self.0.to_big_endian()
	}

	pub fn is_zero(&self) -> bool {
		self.0.is_zero()
	}

	/// Narrow to `u64` if the value fits.
	pub fn to_u64(&self) -> Option<u64> {
		u64::try_from(self.0).ok()
	}

	/// Parse a JSON-RPC hex quantity such as `0x1bc16d674ec80000`.
	pub fn from_hex_quantity(quantity: &str) -> Result<Self, LedgerError> {
		let digits = quantity
			.strip_prefix("0x")
			.or_else(|| quantity.strip_prefix("0X"))
			.ok_or_else(|| LedgerError::Decode(format!("quantity {quantity} is missing 0x prefix")))?;
		if digits.is_empty() {
			return Ok(Self::ZERO);
		}
		U256::from_str_radix(digits, 16)
			.map(Self)
			.map_err(|e| LedgerError::Decode(format!("invalid quantity {quantity}: {e}")))
	}

	/// Minimal hex quantity encoding (`0x0` for zero, no leading zeros otherwise).
	pub fn to_hex_quantity(&self) -> String {
		format!("0x{:x}", self.0)
	}

	/// Exact base-10 rendering.
	pub fn to_decimal_string(&self) -> String {
		self.0.to_string()
	}

	/// Parse a plain base-10 integer. Returns `None` on non-digits or overflow.
	pub fn from_decimal_str(text: &str) -> Option<Self> {
		if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
			return None;
		}
		U256::from_dec_str(text).ok().map(Self)
	}
}

impl From<u128> for Amount {
	fn from(value: u128) -> Self {
		Self(U256::from(value))
	}
}

impl From<U256> for Amount {
	fn from(value: U256) -> Self {
		Self(value)
	}
}

impl From<Amount> for U256 {
	fn from(value: Amount) -> Self {
		value.0
	}
}

impl FromStr for Amount {
	type Err = LedgerError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_decimal_str(s.trim())
			.ok_or_else(|| LedgerError::Decode(format!("{s} is not an unsigned 256-bit integer")))
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

/// Filter selecting one event kind emitted by one contract, over full history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
	pub address: Address,
	pub topic: [u8; 32],
}

/// A log entry as returned by the ledger, before any ABI decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
	pub address: Address,
	pub topics: Vec<[u8; 32]>,
	pub data: Vec<u8>,
	pub block_height: BlockHeight,
	pub log_index: u64,
	pub transaction_hash: String,
	/// Set when the log was dropped by a chain reorganisation.
	pub removed: bool,
}

/// A transaction to be signed and broadcast by the account's owner (node or wallet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
	pub from: Address,
	pub to: Address,
	pub value: Amount,
	pub data: Vec<u8>,
}

impl TransactionRequest {
	/// Plain value transfer.
	pub fn transfer(from: Address, to: Address, value: Amount) -> Self {
		Self {
			from,
			to,
			value,
			data: Vec::new(),
		}
	}

	/// Contract method invocation without attached value.
	pub fn invoke(from: Address, to: Address, data: Vec<u8>) -> Self {
		Self {
			from,
			to,
			value: Amount::ZERO,
			data,
		}
	}
}

/// Handle to a broadcast transaction awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
	pub hash: String,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
	pub transaction_hash: String,
	pub block_height: BlockHeight,
	/// False when execution reverted.
	pub success: bool,
}

/// JSON-RPC log object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
	pub address: String,
	#[serde(default)]
	pub topics: Vec<String>,
	#[serde(default)]
	pub data: String,
	pub block_number: Option<String>,
	pub log_index: Option<String>,
	pub transaction_hash: Option<String>,
	#[serde(default)]
	pub removed: bool,
}

impl TryFrom<RpcLog> for RawLog {
	type Error = LedgerError;

	fn try_from(log: RpcLog) -> Result<Self, Self::Error> {
		let block_number = log
			.block_number
			.as_deref()
			.ok_or_else(|| LedgerError::Decode("log has no block number".to_string()))?;
		let topics = log
			.topics
			.iter()
			.map(|topic| decode_word(topic))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(RawLog {
			address: Address::new(log.address),
			topics,
			data: decode_hex_data(&log.data)?,
			block_height: parse_quantity(block_number)?,
			log_index: log.log_index.as_deref().map(parse_quantity).transpose()?.unwrap_or(0),
			transaction_hash: log.transaction_hash.unwrap_or_default(),
			removed: log.removed,
		})
	}
}

/// JSON-RPC transaction receipt object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
	pub transaction_hash: String,
	pub block_number: Option<String>,
	pub status: Option<String>,
}

impl TryFrom<RpcReceipt> for Receipt {
	type Error = LedgerError;

	fn try_from(receipt: RpcReceipt) -> Result<Self, Self::Error> {
		let block_height = receipt
			.block_number
			.as_deref()
			.map(parse_quantity)
			.transpose()?
			.unwrap_or(0);
		// Pre-Byzantium receipts carry no status field; treat them as successful.
		let success = match receipt.status.as_deref() {
			Some(status) => parse_quantity(status)? == 1,
			None => true,
		};
		Ok(Receipt {
			transaction_hash: receipt.transaction_hash,
			block_height,
			success,
		})
	}
}

/// Parse a hex quantity that must fit in 64 bits.
pub fn parse_quantity(quantity: &str) -> Result<u64, LedgerError> {
	Amount::from_hex_quantity(quantity)?
		.to_u64()
		.ok_or_else(|| LedgerError::Decode(format!("quantity {quantity} exceeds 64 bits")))
}

/// Decode `0x`-prefixed hex data. An empty `0x` decodes to no bytes.
pub fn decode_hex_data(data: &str) -> Result<Vec<u8>, LedgerError> {
	let digits = data.strip_prefix("0x").unwrap_or(data);
	hex::decode(digits).map_err(|e| LedgerError::Decode(format!("invalid hex data: {e}")))
}

fn decode_word(word: &str) -> Result<[u8; 32], LedgerError> {
	let bytes = decode_hex_data(word)?;
	bytes
		.try_into()
		.map_err(|_| LedgerError::Decode(format!("topic {word} is not 32 bytes")))
}

/// Error types for ledger client operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	#[error("RPC error {code}: {message}")]
	Rpc { code: i64, message: String },

	#[error("HTTP status {0}")]
	HttpStatus(u16),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("WebSocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Decode error: {0}")]
	Decode(String),

	#[error("Subscription error: {0}")]
	Subscription(String),

	#[error("No data returned")]
	NoData,
}
