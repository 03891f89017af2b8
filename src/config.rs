//! Runtime configuration for the synchronizer.

use crate::ledger::{Address, LedgerError};

use reqwest::Url;
use std::time::Duration;

/// Chain id of the Goerli test network the payments contract was deployed to.
pub const DEFAULT_CHAIN_ID: u64 = 5;
pub const DEFAULT_CONTRACT: &str = "0xB5b209B4DE252716240ef40D9658265dae8d3453";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8546";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Invalid {field} address: {source}")]
	InvalidAddress {
		field: &'static str,
		#[source]
		source: LedgerError,
	},

	#[error("Invalid {field} endpoint {url}: expected one of {expected}")]
	InvalidEndpoint {
		field: &'static str,
		url: String,
		expected: &'static str,
	},

	#[error("Poll interval must be greater than zero")]
	ZeroPollInterval,
}

/// Validated synchronizer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
	pub rpc_url: String,
	pub ws_url: String,
	pub contract: Address,
	pub expected_chain_id: u64,
	/// Account used for transactions. `None` means "ask the ledger".
	pub account: Option<Address>,
	/// Interval between receipt polls and between connection identity checks.
	pub poll_interval: Duration,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			rpc_url: DEFAULT_RPC_URL.to_string(),
			ws_url: DEFAULT_WS_URL.to_string(),
			contract: Address::new(DEFAULT_CONTRACT),
			expected_chain_id: DEFAULT_CHAIN_ID,
			account: None,
			poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
		}
	}
}

impl SyncConfig {
	/// Build a configuration from raw settings, validating every field.
	///
	/// # Arguments
	///
	/// * `rpc_url` - HTTP(S) JSON-RPC endpoint
	/// * `ws_url` - WS(S) endpoint used for live subscriptions
	/// * `contract` - Payments contract address
	/// * `expected_chain_id` - The only network the synchronizer activates on
	/// * `account` - Optional account for deposits and withdrawals
	/// * `poll_interval_ms` - Receipt and connection poll interval in milliseconds
	pub fn new(
		rpc_url: &str,
		ws_url: &str,
		contract: &str,
		expected_chain_id: u64,
		account: Option<&str>,
		poll_interval_ms: u64,
	) -> Result<Self, ConfigError> {
		check_scheme("rpc", rpc_url, &["http", "https"], "http://, https://")?;
		check_scheme("websocket", ws_url, &["ws", "wss"], "ws://, wss://")?;
		if poll_interval_ms == 0 {
			return Err(ConfigError::ZeroPollInterval);
		}

		let contract = Address::parse(contract).map_err(|source| ConfigError::InvalidAddress {
			field: "contract",
			source,
		})?;
		let account = account
			.filter(|account| !account.is_empty())
			.map(Address::parse)
			.transpose()
			.map_err(|source| ConfigError::InvalidAddress {
				field: "account",
				source,
			})?;

		Ok(Self {
			rpc_url: rpc_url.to_string(),
			ws_url: ws_url.to_string(),
			contract,
			expected_chain_id,
			account,
			poll_interval: Duration::from_millis(poll_interval_ms),
		})
	}
}

fn check_scheme(
	field: &'static str,
	url: &str,
	schemes: &[&str],
	expected: &'static str,
) -> Result<(), ConfigError> {
	let valid = Url::parse(url)
		.is_ok_and(|parsed| schemes.contains(&parsed.scheme()) && parsed.host_str().is_some());
	if valid {
		Ok(())
	} else {
		Err(ConfigError::InvalidEndpoint {
			field,
			url: url.to_string(),
			expected,
		})
	}
}
