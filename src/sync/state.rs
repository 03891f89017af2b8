//! Observable display state for one session.
//!
//! Every field is a `watch` channel: writers replace whole values, so observers see either the
//! previous or the next complete value and never a partially updated sequence.

use super::records::{PaymentRecord, WithdrawalRecord};
use super::types::{Operation, TxPhase};

use tokio::sync::watch;

/// Balances and ownership of the contract.
///
/// Fields are refreshed independently and may reflect different blocks. Empty means "not
/// read yet".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractSnapshot {
	pub contract_balance: String,
	pub owner_address: String,
	pub owner_balance: String,
}

pub struct SyncState {
	payments: watch::Sender<Vec<PaymentRecord>>,
	withdrawals: watch::Sender<Vec<WithdrawalRecord>>,
	snapshot: watch::Sender<ContractSnapshot>,
	deposit: watch::Sender<TxPhase>,
	withdraw: watch::Sender<TxPhase>,
}

impl SyncState {
	pub fn new() -> Self {
		Self {
			payments: watch::Sender::new(Vec::new()),
			withdrawals: watch::Sender::new(Vec::new()),
			snapshot: watch::Sender::new(ContractSnapshot::default()),
			deposit: watch::Sender::new(TxPhase::Idle),
			withdraw: watch::Sender::new(TxPhase::Idle),
		}
	}

	pub fn payments(&self) -> Vec<PaymentRecord> {
		self.payments.borrow().clone()
	}

	pub fn withdrawals(&self) -> Vec<WithdrawalRecord> {
		self.withdrawals.borrow().clone()
	}

	pub fn snapshot(&self) -> ContractSnapshot {
		self.snapshot.borrow().clone()
	}

	pub fn phase(&self, operation: Operation) -> TxPhase {
		*self.phase_sender(operation).borrow()
	}

	pub fn is_pending(&self, operation: Operation) -> bool {
		self.phase(operation).is_pending()
	}

	pub fn watch_payments(&self) -> watch::Receiver<Vec<PaymentRecord>> {
		self.payments.subscribe()
	}

	pub fn watch_withdrawals(&self) -> watch::Receiver<Vec<WithdrawalRecord>> {
		self.withdrawals.subscribe()
	}

	pub fn watch_snapshot(&self) -> watch::Receiver<ContractSnapshot> {
		self.snapshot.subscribe()
	}

	pub fn watch_phase(&self, operation: Operation) -> watch::Receiver<TxPhase> {
		self.phase_sender(operation).subscribe()
	}

	pub(crate) fn replace_payments(&self, records: Vec<PaymentRecord>) {
		self.payments.send_replace(records);
	}

	pub(crate) fn replace_withdrawals(&self, records: Vec<WithdrawalRecord>) {
		self.withdrawals.send_replace(records);
	}

	pub(crate) fn update_snapshot(&self, update: impl FnOnce(&mut ContractSnapshot)) {
		self.snapshot.send_modify(update);
	}

	pub(crate) fn phase_sender(&self, operation: Operation) -> &watch::Sender<TxPhase> {
		match operation {
			Operation::Deposit => &self.deposit,
			Operation::Withdraw => &self.withdraw,
		}
	}
}

impl Default for SyncState {
	fn default() -> Self {
		Self::new()
	}
}
