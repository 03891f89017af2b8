//! Balance and ownership tracking for the payments contract.
//!
//! Three independent reads feed the [`ContractSnapshot`](super::state::ContractSnapshot): the
//! contract balance, the owner address and the owner balance. Each read writes only its own
//! field, and a failed read leaves the previous value in place and goes to the error sink.
//! Nothing is retried.

use super::state::SyncState;
use super::types::{ErrorSink, SyncError};
use crate::ledger::abi::{OWNER_SIGNATURE, decode_address_return, encode_call};
use crate::ledger::{Address, LedgerClient};

use std::sync::Arc;
use tracing::debug;

pub struct BalanceTracker {
	ledger: Arc<dyn LedgerClient>,
	contract: Address,
	state: Arc<SyncState>,
	errors: Arc<dyn ErrorSink>,
}

impl BalanceTracker {
	pub fn new(
		ledger: Arc<dyn LedgerClient>,
		contract: Address,
		state: Arc<SyncState>,
		errors: Arc<dyn ErrorSink>,
	) -> Self {
		Self {
			ledger,
			contract,
			state,
			errors,
		}
	}

	/// Refresh the contract balance field.
	pub async fn refresh_contract_balance(&self) {
		match self.fetch_contract_balance().await {
			Ok(balance) => {
				debug!("Contract balance: {}", balance);
				self.state
					.update_snapshot(|snapshot| snapshot.contract_balance = balance);
			}
			Err(e) => self.errors.report(&e),
		}
	}

	/// Refresh the owner address field.
	pub async fn refresh_owner_address(&self) {
		match self.fetch_owner().await {
			Ok(owner) => {
				debug!("Contract owner: {}", owner);
				self.state
					.update_snapshot(|snapshot| snapshot.owner_address = owner.to_string());
			}
			Err(e) => self.errors.report(&e),
		}
	}

	/// Refresh the owner balance field. The owner is looked up afresh for every refresh.
	pub async fn refresh_owner_balance(&self) {
		match self.fetch_owner_balance().await {
			Ok(balance) => {
				debug!("Owner balance: {}", balance);
				self.state
					.update_snapshot(|snapshot| snapshot.owner_balance = balance);
			}
			Err(e) => self.errors.report(&e),
		}
	}

	/// Refresh every snapshot field, one after another.
	pub async fn refresh_all(&self) {
		self.refresh_contract_balance().await;
		self.refresh_owner_address().await;
		self.refresh_owner_balance().await;
	}

	async fn fetch_contract_balance(&self) -> Result<String, SyncError> {
		let balance = self
			.ledger
			.balance(&self.contract)
			.await
			.map_err(SyncError::query("contract balance"))?;
		Ok(balance.to_decimal_string())
	}

	async fn fetch_owner(&self) -> Result<Address, SyncError> {
		let data = self
			.ledger
			.call(&self.contract, &encode_call(OWNER_SIGNATURE))
			.await
			.map_err(SyncError::query("contract owner"))?;
		decode_address_return(&data).map_err(SyncError::query("contract owner"))
	}

	async fn fetch_owner_balance(&self) -> Result<String, SyncError> {
		let owner = self.fetch_owner().await?;
		let balance = self
			.ledger
			.balance(&owner)
			.await
			.map_err(SyncError::query("owner balance"))?;
		Ok(balance.to_decimal_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sync::mock::{CONTRACT, MockLedger, OWNER, RecordingSink};

	fn tracker(ledger: Arc<MockLedger>) -> (BalanceTracker, Arc<SyncState>, Arc<RecordingSink>) {
		let state = Arc::new(SyncState::new());
		let sink = Arc::new(RecordingSink::default());
		let tracker = BalanceTracker::new(ledger, Address::new(CONTRACT), state.clone(), sink.clone());
		(tracker, state, sink)
	}

	#[tokio::test]
	async fn test_refresh_all_fills_snapshot() {
		let ledger = Arc::new(MockLedger::new(5, 100));
		ledger.set_balance(CONTRACT, 1_500);
		ledger.set_balance(OWNER, 42);
		let (tracker, state, sink) = tracker(ledger);

		tracker.refresh_all().await;

		let snapshot = state.snapshot();
		assert_eq!(snapshot.contract_balance, "1500");
		assert_eq!(snapshot.owner_address, OWNER);
		assert_eq!(snapshot.owner_balance, "42");
		assert!(sink.is_empty());
	}

	#[tokio::test]
	async fn test_failed_read_keeps_stale_value() {
		let ledger = Arc::new(MockLedger::new(5, 100));
		ledger.set_balance(CONTRACT, 1_500);
		let (tracker, state, sink) = tracker(ledger.clone());
		tracker.refresh_all().await;

		ledger.set_balance(CONTRACT, 9_000);
		ledger.fail("balance");
		tracker.refresh_contract_balance().await;
		tracker.refresh_owner_balance().await;

		let snapshot = state.snapshot();
		assert_eq!(snapshot.contract_balance, "1500");
		assert_eq!(snapshot.owner_balance, "0");
		assert_eq!(sink.len(), 2);

		// the owner lookup does not depend on balances
		tracker.refresh_owner_address().await;
		assert_eq!(state.snapshot().owner_address, OWNER);
		assert_eq!(sink.len(), 2);
	}
}
