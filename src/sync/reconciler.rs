//! Full-history reconciliation of contract events.
//!
//! Each pass queries every log of one event kind from genesis, maps it into records, and
//! replaces the held sequence wholesale. Because nothing is ever appended, running a pass any
//! number of times converges on the same sequence: duplicates cannot arise no matter how often
//! or in which order passes are triggered.

use super::records::{decode_payment, decode_withdrawal, payment_record, withdrawal_record};
use super::state::SyncState;
use super::types::{ErrorSink, SyncError};
use crate::ledger::{Address, EventFilter, EventKind, LedgerClient, RawLog};

use std::sync::Arc;
use tracing::{debug, info};

pub struct LogReconciler {
	ledger: Arc<dyn LedgerClient>,
	contract: Address,
	state: Arc<SyncState>,
	errors: Arc<dyn ErrorSink>,
}

impl LogReconciler {
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

	/// Reconcile one event kind, reporting failures to the error sink.
	pub async fn reconcile(&self, kind: EventKind) {
		if let Err(e) = self.try_reconcile(kind).await {
			self.errors.report(&e);
		}
	}

	/// Reconcile both event kinds, one after the other.
	pub async fn reconcile_all(&self) {
		for kind in EventKind::ALL {
			self.reconcile(kind).await;
		}
	}

	/// Reconcile one event kind and return the number of records now held.
	///
	/// On failure the previously held sequence is left untouched.
	pub async fn try_reconcile(&self, kind: EventKind) -> Result<usize, SyncError> {
		let filter = EventFilter {
			address: self.contract.clone(),
			topic: kind.topic(),
		};
		let logs = self
			.ledger
			.query_events(&filter)
			.await
			.map_err(|source| SyncError::Query {
				what: match kind {
					EventKind::Payment => "payment events",
					EventKind::Withdrawal => "withdrawal events",
				},
				source,
			})?;
		let logs = in_ledger_order(logs);
		let count = logs.len();

		match kind {
			EventKind::Payment => {
				let records = logs
					.iter()
					.map(|log| payment_record(&decode_payment(log)))
					.collect();
				self.state.replace_payments(records);
			}
			EventKind::Withdrawal => {
				let records = logs
					.iter()
					.map(|log| withdrawal_record(&decode_withdrawal(log)))
					.collect();
				self.state.replace_withdrawals(records);
			}
		}

		info!("Reconciled {} {} records", count, kind);
		Ok(count)
	}
}

/// Drop reorged logs and order the rest by block, then log index.
fn in_ledger_order(mut logs: Vec<RawLog>) -> Vec<RawLog> {
	let before = logs.len();
	logs.retain(|log| !log.removed);
	if logs.len() != before {
		debug!("Skipped {} removed logs", before - logs.len());
	}
	logs.sort_by_key(|log| (log.block_height, log.log_index));
	logs
}
