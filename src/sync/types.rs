use crate::ledger::{Address, BlockHeight, EventKind, LedgerError};

use std::fmt;
use tracing::error;

/// State captured when the activation guard passes.
///
/// Lives exactly as long as the session it belongs to; a reconnect creates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationContext {
	pub expected_network_id: u64,
	/// High-water mark for live events: anything at or below it is covered by the initial
	/// reconciliation.
	pub start_block_height: BlockHeight,
}

/// User-initiated, state-changing contract operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	Deposit,
	Withdraw,
}

impl fmt::Display for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Operation::Deposit => f.write_str("deposit"),
			Operation::Withdraw => f.write_str("withdraw"),
		}
	}
}

/// Lifecycle phase of one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxPhase {
	#[default]
	Idle,
	Submitting,
	AwaitingConfirmation,
	Confirmed,
	Failed,
}

impl TxPhase {
	pub fn is_pending(&self) -> bool {
		!matches!(self, TxPhase::Idle)
	}
}

/// Single sink for every failure the synchronizer encounters.
///
/// The synchronizer never decides how errors are shown; it only reports them here.
pub trait ErrorSink: Send + Sync {
	fn report(&self, error: &SyncError);
}

/// Error sink that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
	fn report(&self, error: &SyncError) {
		error!("{}", error);
	}
}

/// Error types for contract state synchronization and transactions
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Connected to network {actual}, expected {expected}")]
	NetworkMismatch { expected: u64, actual: u64 },

	#[error("Failed to read {what}: {source}")]
	Query {
		what: &'static str,
		#[source]
		source: LedgerError,
	},

	#[error("{kind} subscription error: {source}")]
	Subscription {
		kind: EventKind,
		#[source]
		source: LedgerError,
	},

	#[error("Failed to submit {operation} transaction: {source}")]
	Submission {
		operation: Operation,
		#[source]
		source: LedgerError,
	},

	#[error("Failed to confirm {operation} transaction: {source}")]
	Confirmation {
		operation: Operation,
		#[source]
		source: LedgerError,
	},

	#[error("{operation} transaction {tx_hash} reverted")]
	Reverted {
		operation: Operation,
		tx_hash: String,
	},

	#[error("No active account")]
	NoActiveAccount,

	#[error("Amount must be a positive integer")]
	InvalidAmount,

	#[error("A {0} transaction is already pending")]
	OperationPending(Operation),

	#[error("Account {account} is not the contract owner {owner}")]
	NotOwner { account: String, owner: String },
}

impl SyncError {
	pub(crate) fn query(what: &'static str) -> impl FnOnce(LedgerError) -> SyncError {
		move |source| SyncError::Query { what, source }
	}
}

/// Compare an account against the contract owner, ignoring case.
///
/// Unknown (empty) identities never match.
pub fn is_owner(account: Option<&Address>, owner: &Address) -> bool {
	match account {
		Some(account) => !account.is_empty() && !owner.is_empty() && account.matches(owner),
		None => false,
	}
}
