use super::types::{ActivationContext, SyncError};
use crate::ledger::LedgerClient;

use tracing::{info, warn};

/// Gate that keeps the synchronizer inert on any network but the expected one.
#[derive(Debug, Clone, Copy)]
pub struct ActivationGuard {
	expected_network_id: u64,
}

impl ActivationGuard {
	pub fn new(expected_network_id: u64) -> Self {
		Self {
			expected_network_id,
		}
	}

	pub fn expected_network_id(&self) -> u64 {
		self.expected_network_id
	}

	/// Check the connected network and capture the starting block height.
	///
	/// Only the network id is read on a mismatch; nothing else touches the ledger.
	pub async fn check(&self, ledger: &dyn LedgerClient) -> Result<ActivationContext, SyncError> {
		let actual = ledger
			.network_id()
			.await
			.map_err(SyncError::query("network id"))?;
		if actual != self.expected_network_id {
			warn!(
				"Connected to network {}, waiting for network {}",
				actual, self.expected_network_id
			);
			return Err(SyncError::NetworkMismatch {
				expected: self.expected_network_id,
				actual,
			});
		}

		let start_block_height = ledger
			.block_height()
			.await
			.map_err(SyncError::query("block height"))?;
		info!(
			"Network {} matched, activating at block {}",
			actual, start_block_height
		);
		Ok(ActivationContext {
			expected_network_id: self.expected_network_id,
			start_block_height,
		})
	}
}
