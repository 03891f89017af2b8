//! Deposit and withdraw lifecycles.
//!
//! Each operation walks `Idle → Submitting → AwaitingConfirmation → (Confirmed | Failed)` and
//! always lands back on `Idle`. The phase is owned by a [`PendingGuard`] for the duration of
//! the call, so every exit path, including early returns and panics, restores it.

use super::balance_tracker::BalanceTracker;
use super::state::SyncState;
use super::types::{ErrorSink, Operation, SyncError, TxPhase};
use crate::ledger::abi::{WITHDRAW_SIGNATURE, encode_call};
use crate::ledger::{Address, Amount, LedgerClient, Receipt, TransactionRequest};

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Exclusive claim on one operation's phase. Dropping it resets the phase to `Idle`.
struct PendingGuard<'a> {
	phase: &'a watch::Sender<TxPhase>,
}

impl<'a> PendingGuard<'a> {
	/// Claim the phase, or return `None` if the operation is already pending.
	fn acquire(phase: &'a watch::Sender<TxPhase>) -> Option<Self> {
		let acquired = phase.send_if_modified(|current| {
			if current.is_pending() {
				return false;
			}
			*current = TxPhase::Submitting;
			true
		});
		acquired.then_some(Self { phase })
	}

	fn advance(&self, phase: TxPhase) {
		self.phase.send_replace(phase);
	}
}

impl Drop for PendingGuard<'_> {
	fn drop(&mut self) {
		self.phase.send_replace(TxPhase::Idle);
	}
}

pub struct TransactionManager {
	ledger: Arc<dyn LedgerClient>,
	contract: Address,
	account: Option<Address>,
	tracker: Arc<BalanceTracker>,
	state: Arc<SyncState>,
	errors: Arc<dyn ErrorSink>,
}

impl TransactionManager {
	pub fn new(
		ledger: Arc<dyn LedgerClient>,
		contract: Address,
		account: Option<Address>,
		tracker: Arc<BalanceTracker>,
		state: Arc<SyncState>,
		errors: Arc<dyn ErrorSink>,
	) -> Self {
		Self {
			ledger,
			contract,
			account,
			tracker,
			state,
			errors,
		}
	}

	pub fn account(&self) -> Option<&Address> {
		self.account.as_ref()
	}

	/// Send `amount` base units from the active account to the contract.
	///
	/// Returns the receipt once the transfer is confirmed. Any failure is reported and yields
	/// `None`; the contract balance is refreshed only after a successful confirmation.
	pub async fn deposit(&self, amount: Amount) -> Option<Receipt> {
		let guard = self.acquire(Operation::Deposit)?;
		let result = match self.active_account() {
			Ok(_) if amount.is_zero() => Err(SyncError::InvalidAmount),
			Ok(account) => {
				info!("Depositing {} to {}", amount, self.contract);
				let request = TransactionRequest::transfer(account, self.contract.clone(), amount);
				self.execute(Operation::Deposit, &guard, request).await
			}
			Err(e) => Err(e),
		};
		let receipt = self.settle(Operation::Deposit, &guard, result)?;

		self.tracker.refresh_contract_balance().await;
		Some(receipt)
	}

	/// Invoke `withdraw()` on the contract from the active account.
	///
	/// Ownership is not checked here. On confirmation both the contract balance and the owner
	/// balance are refreshed.
	pub async fn withdraw(&self) -> Option<Receipt> {
		let guard = self.acquire(Operation::Withdraw)?;
		let result = match self.active_account() {
			Ok(account) => {
				info!("Withdrawing contract funds as {}", account);
				let request = TransactionRequest::invoke(
					account,
					self.contract.clone(),
					encode_call(WITHDRAW_SIGNATURE),
				);
				self.execute(Operation::Withdraw, &guard, request).await
			}
			Err(e) => Err(e),
		};
		let receipt = self.settle(Operation::Withdraw, &guard, result)?;

		self.tracker.refresh_contract_balance().await;
		self.tracker.refresh_owner_balance().await;
		Some(receipt)
	}

	fn acquire(&self, operation: Operation) -> Option<PendingGuard<'_>> {
		let guard = PendingGuard::acquire(self.state.phase_sender(operation));
		if guard.is_none() {
			self.errors.report(&SyncError::OperationPending(operation));
		}
		guard
	}

	fn active_account(&self) -> Result<Address, SyncError> {
		match &self.account {
			Some(account) if !account.is_empty() => Ok(account.clone()),
			_ => Err(SyncError::NoActiveAccount),
		}
	}

	async fn execute(
		&self,
		operation: Operation,
		guard: &PendingGuard<'_>,
		request: TransactionRequest,
	) -> Result<Receipt, SyncError> {
		let pending = self
			.ledger
			.submit_transaction(&request)
			.await
			.map_err(|source| SyncError::Submission { operation, source })?;
		info!("Submitted {} transaction {}", operation, pending.hash);

		guard.advance(TxPhase::AwaitingConfirmation);
		let receipt = self
			.ledger
			.await_confirmation(&pending)
			.await
			.map_err(|source| SyncError::Confirmation { operation, source })?;

		if !receipt.success {
			return Err(SyncError::Reverted {
				operation,
				tx_hash: receipt.transaction_hash,
			});
		}
		Ok(receipt)
	}

	/// Record the outcome on the phase. Failures are reported while the phase still reads
	/// `Failed`.
	fn settle(
		&self,
		operation: Operation,
		guard: &PendingGuard<'_>,
		result: Result<Receipt, SyncError>,
	) -> Option<Receipt> {
		match result {
			Ok(receipt) => {
				guard.advance(TxPhase::Confirmed);
				info!(
					"{} transaction {} confirmed in block {}",
					operation, receipt.transaction_hash, receipt.block_height
				);
				Some(receipt)
			}
			Err(e) => {
				guard.advance(TxPhase::Failed);
				self.errors.report(&e);
				None
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sync::mock::{CONTRACT, MockLedger, OWNER};
	use std::sync::Mutex;

	/// Sink that captures both operation phases at the moment an error is reported.
	struct PhaseProbe {
		state: Arc<SyncState>,
		seen: Mutex<Vec<(String, TxPhase, TxPhase)>>,
	}

	impl PhaseProbe {
		fn seen(&self) -> Vec<(String, TxPhase, TxPhase)> {
			self.seen.lock().expect("probe lock").clone()
		}
	}

	impl ErrorSink for PhaseProbe {
		fn report(&self, error: &SyncError) {
			self.seen.lock().expect("probe lock").push((
				error.to_string(),
				self.state.phase(Operation::Deposit),
				self.state.phase(Operation::Withdraw),
			));
		}
	}

	fn setup(
		ledger: Arc<MockLedger>,
		account: Option<&str>,
	) -> (TransactionManager, Arc<SyncState>, Arc<PhaseProbe>) {
		let state = Arc::new(SyncState::new());
		let probe = Arc::new(PhaseProbe {
			state: state.clone(),
			seen: Mutex::new(Vec::new()),
		});
		let tracker = Arc::new(BalanceTracker::new(
			ledger.clone(),
			Address::new(CONTRACT),
			state.clone(),
			probe.clone(),
		));
		let manager = TransactionManager::new(
			ledger,
			Address::new(CONTRACT),
			account.map(Address::new),
			tracker,
			state.clone(),
			probe.clone(),
		);
		(manager, state, probe)
	}

	#[tokio::test]
	async fn test_deposit_confirms_and_refreshes_contract_balance() {
		let ledger = Arc::new(MockLedger::new(5, 100));
		ledger.set_balance(CONTRACT, 1_000);
		let (manager, state, probe) = setup(ledger.clone(), Some(OWNER));

		let receipt = manager.deposit(Amount::from(1_000u128)).await;

		assert!(receipt.is_some_and(|r| r.success));
		let submitted = ledger.submitted();
		assert_eq!(submitted.len(), 1);
		assert_eq!(submitted[0].value, Amount::from(1_000u128));
		assert_eq!(submitted[0].to.as_str(), CONTRACT);
		assert!(submitted[0].data.is_empty());
		assert_eq!(state.snapshot().contract_balance, "1000");
		assert_eq!(state.phase(Operation::Deposit), TxPhase::Idle);
		assert!(probe.seen().is_empty());
	}

	#[tokio::test]
	async fn test_withdraw_confirms_and_refreshes_both_balances() {
		let ledger = Arc::new(MockLedger::new(5, 100));
		ledger.set_balance(OWNER, 77);
		let (manager, state, probe) = setup(ledger.clone(), Some(OWNER));

		assert!(manager.withdraw().await.is_some());

		let submitted = ledger.submitted();
		assert_eq!(submitted[0].data, encode_call(WITHDRAW_SIGNATURE));
		assert!(submitted[0].value.is_zero());
		let snapshot = state.snapshot();
		assert_eq!(snapshot.contract_balance, "0");
		assert_eq!(snapshot.owner_balance, "77");
		assert!(!state.is_pending(Operation::Withdraw));
		assert!(probe.seen().is_empty());
	}

	#[tokio::test]
	async fn test_submission_failure_resets_phase() {
		let ledger = Arc::new(MockLedger::new(5, 100));
		ledger.fail("submit_transaction");
		let (manager, state, probe) = setup(ledger.clone(), Some(OWNER));

		assert!(manager.deposit(Amount::from(5u128)).await.is_none());
		assert!(manager.withdraw().await.is_none());

		let seen = probe.seen();
		assert_eq!(seen.len(), 2);
		assert!(seen[0].0.contains("submit deposit"));
		assert_eq!(seen[0].1, TxPhase::Failed);
		assert!(seen[1].0.contains("submit withdraw"));
		assert_eq!(seen[1].2, TxPhase::Failed);
		assert!(!state.is_pending(Operation::Deposit));
		assert!(!state.is_pending(Operation::Withdraw));
		assert_eq!(ledger.calls("await_confirmation"), 0);
		assert_eq!(ledger.calls("balance"), 0);
	}

	#[tokio::test]
	async fn test_confirmation_failure_resets_phase() {
		let ledger = Arc::new(MockLedger::new(5, 100));
		ledger.fail("await_confirmation");
		let (manager, state, probe) = setup(ledger.clone(), Some(OWNER));

		assert!(manager.deposit(Amount::from(5u128)).await.is_none());
		assert!(manager.withdraw().await.is_none());

		let seen = probe.seen();
		assert_eq!(seen.len(), 2);
		assert!(seen[0].0.contains("confirm deposit"));
		assert!(seen[1].0.contains("confirm withdraw"));
		assert_eq!(state.phase(Operation::Deposit), TxPhase::Idle);
		assert_eq!(state.phase(Operation::Withdraw), TxPhase::Idle);
		assert_eq!(ledger.calls("balance"), 0);
	}

	#[tokio::test]
	async fn test_reverted_receipt_is_a_failure() {
		let ledger = Arc::new(MockLedger::new(5, 100));
		ledger.revert_transactions();
		let (manager, state, probe) = setup(ledger.clone(), Some(OWNER));

		assert!(manager.withdraw().await.is_none());

		let seen = probe.seen();
		assert_eq!(seen.len(), 1);
		assert!(seen[0].0.contains("reverted"));
		assert_eq!(state.phase(Operation::Withdraw), TxPhase::Idle);
		assert_eq!(ledger.calls("balance"), 0);
	}

	#[tokio::test]
	async fn test_deposit_requires_account_and_amount() {
		let ledger = Arc::new(MockLedger::new(5, 100));
		let (manager, state, probe) = setup(ledger.clone(), None);
		assert!(manager.deposit(Amount::from(5u128)).await.is_none());

		let (with_account, _, with_account_probe) = setup(ledger.clone(), Some(OWNER));
		assert!(with_account.deposit(Amount::ZERO).await.is_none());

		assert!(probe.seen()[0].0.contains("No active account"));
		assert!(with_account_probe.seen()[0].0.contains("positive"));
		assert!(ledger.submitted().is_empty());
		assert!(!state.is_pending(Operation::Deposit));
	}

	#[tokio::test]
	async fn test_reentry_is_refused_while_pending() {
		let ledger = Arc::new(MockLedger::new(5, 100));
		let (manager, state, probe) = setup(ledger.clone(), Some(OWNER));
		state
			.phase_sender(Operation::Deposit)
			.send_replace(TxPhase::AwaitingConfirmation);

		assert!(manager.deposit(Amount::from(5u128)).await.is_none());
		assert_eq!(state.phase(Operation::Deposit), TxPhase::AwaitingConfirmation);
		assert!(probe.seen()[0].0.contains("already pending"));
		assert!(ledger.submitted().is_empty());

		// operations are independent
		assert!(manager.withdraw().await.is_some());
		assert_eq!(ledger.submitted().len(), 1);
	}
}
