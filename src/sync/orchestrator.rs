//! Synchronizer orchestration and session lifecycle.
//!
//! The [`Synchronizer`] runs the activation sequence against a ledger:
//!
//! 1. the activation guard checks the network and captures the start block height,
//! 2. both event kinds are reconciled from full history,
//! 3. one live listener per event kind is attached, then history is reconciled again if the
//!    chain advanced while they were being registered,
//! 4. contract balance, owner and owner balance are read.
//!
//! A successful activation yields a [`SyncSession`] that owns the observable state, the live
//! listeners and the transaction manager. Deactivating the session disposes the listeners; a
//! later activation builds everything from scratch.
//!
//! The [`ConnectionSupervisor`] keeps a session alive across network and account changes by
//! polling the connection identity and re-activating whenever it changes or a live listener
//! has stopped.

use super::activation::ActivationGuard;
use super::balance_tracker::BalanceTracker;
use super::events::{LiveEventSubscriber, SubscriptionSet};
use super::reconciler::LogReconciler;
use super::state::SyncState;
use super::transactions::TransactionManager;
use super::types::{ActivationContext, ErrorSink, Operation, SyncError, is_owner};
use crate::ledger::{Address, Amount, EventKind, LedgerClient, Receipt};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct Synchronizer {
	ledger: Arc<dyn LedgerClient>,
	contract: Address,
	guard: ActivationGuard,
	errors: Arc<dyn ErrorSink>,
}

impl Synchronizer {
	pub fn new(
		ledger: Arc<dyn LedgerClient>,
		contract: Address,
		expected_network_id: u64,
		errors: Arc<dyn ErrorSink>,
	) -> Self {
		Self {
			ledger,
			contract,
			guard: ActivationGuard::new(expected_network_id),
			errors,
		}
	}

	pub fn contract(&self) -> &Address {
		&self.contract
	}

	/// Use the configured account, or fall back to the first account the ledger exposes.
	pub async fn resolve_account(&self, configured: Option<Address>) -> Option<Address> {
		if configured.is_some() {
			return configured;
		}
		match self.ledger.accounts().await {
			Ok(accounts) => {
				let account = accounts.into_iter().next();
				match &account {
					Some(account) => debug!("Using ledger account {}", account),
					None => debug!("Ledger exposes no accounts"),
				}
				account
			}
			Err(source) => {
				self.errors.report(&SyncError::Query {
					what: "accounts",
					source,
				});
				None
			}
		}
	}

	/// Run the activation sequence for `account`.
	///
	/// Returns `None` when the guard rejects the connection or cannot read the ledger; the
	/// failure has been reported and nothing beyond the guard's reads reached the ledger.
	pub async fn activate(&self, account: Option<Address>) -> Option<SyncSession> {
		match self.try_activate(account).await {
			Ok(session) => Some(session),
			Err(e) => {
				self.errors.report(&e);
				None
			}
		}
	}

	/// Run the activation sequence, returning the guard's failure instead of reporting it.
	///
	/// Failures after the guard has passed are reported as they happen and do not fail the
	/// activation.
	pub async fn try_activate(&self, account: Option<Address>) -> Result<SyncSession, SyncError> {
		let context = self.guard.check(self.ledger.as_ref()).await?;

		let state = Arc::new(SyncState::new());
		let reconciler = Arc::new(LogReconciler::new(
			self.ledger.clone(),
			self.contract.clone(),
			state.clone(),
			self.errors.clone(),
		));
		reconciler.reconcile_all().await;

		let subscriptions = LiveEventSubscriber::new(
			self.ledger.clone(),
			self.contract.clone(),
			reconciler.clone(),
			self.errors.clone(),
		)
		.attach(context)
		.await;
		self.catch_up(&context, &reconciler).await;

		let tracker = Arc::new(BalanceTracker::new(
			self.ledger.clone(),
			self.contract.clone(),
			state.clone(),
			self.errors.clone(),
		));
		tracker.refresh_all().await;

		let transactions = TransactionManager::new(
			self.ledger.clone(),
			self.contract.clone(),
			account,
			tracker.clone(),
			state.clone(),
			self.errors.clone(),
		);

		info!(
			"Session active for contract {} from block {}",
			self.contract, context.start_block_height
		);
		Ok(SyncSession {
			context,
			state,
			reconciler,
			tracker,
			transactions,
			subscriptions,
			errors: self.errors.clone(),
		})
	}

	/// Reconcile again if blocks were mined while the listeners were being attached.
	///
	/// Logs from those blocks are above the start height but predate the subscriptions, so
	/// neither the initial reconciliation nor the listeners would see them.
	async fn catch_up(&self, context: &ActivationContext, reconciler: &LogReconciler) {
		match self.ledger.block_height().await {
			Ok(height) if height > context.start_block_height => {
				debug!(
					"Chain advanced to block {} during activation, reconciling again",
					height
				);
				reconciler.reconcile_all().await;
			}
			Ok(_) => {}
			Err(source) => self.errors.report(&SyncError::Query {
				what: "block height",
				source,
			}),
		}
	}
}

/// Everything tied to one activation. Dropping it also stops the live listeners.
pub struct SyncSession {
	context: ActivationContext,
	state: Arc<SyncState>,
	reconciler: Arc<LogReconciler>,
	tracker: Arc<BalanceTracker>,
	transactions: TransactionManager,
	subscriptions: SubscriptionSet,
	errors: Arc<dyn ErrorSink>,
}

impl SyncSession {
	pub fn state(&self) -> &Arc<SyncState> {
		&self.state
	}

	pub fn context(&self) -> ActivationContext {
		self.context
	}

	pub fn account(&self) -> Option<&Address> {
		self.transactions.account()
	}

	pub fn listener_count(&self) -> usize {
		self.subscriptions.len()
	}

	/// Whether every event kind still has a running live listener.
	pub fn is_live(&self) -> bool {
		self.subscriptions.len() == EventKind::ALL.len() && self.subscriptions.all_running()
	}

	pub async fn deposit(&self, amount: Amount) -> Option<Receipt> {
		self.transactions.deposit(amount).await
	}

	/// Withdraw the contract balance, if the active account is the contract owner.
	///
	/// The owner is taken from the last successful owner read. Unknown accounts or owners are
	/// refused like any other mismatch.
	pub async fn withdraw(&self) -> Option<Receipt> {
		let owner = Address::new(self.state.snapshot().owner_address);
		if !is_owner(self.account(), &owner) {
			self.errors.report(&SyncError::NotOwner {
				account: self.account().map(Address::to_string).unwrap_or_default(),
				owner: owner.to_string(),
			});
			return None;
		}
		self.transactions.withdraw().await
	}

	/// Whether a withdrawal would currently be accepted.
	pub fn can_withdraw(&self) -> bool {
		let owner = Address::new(self.state.snapshot().owner_address);
		is_owner(self.account(), &owner) && !self.state.is_pending(Operation::Withdraw)
	}

	/// Re-run reconciliation and every balance read.
	pub async fn refresh(&self) {
		self.reconciler.reconcile_all().await;
		self.tracker.refresh_all().await;
	}

	pub fn deactivate(self) {
		info!(
			"Deactivating session started at block {}",
			self.context.start_block_height
		);
		self.subscriptions.dispose();
	}
}

/// The network and account a session was activated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
	pub network_id: u64,
	pub account: Option<Address>,
}

/// Keeps one session active for the current connection identity.
pub struct ConnectionSupervisor {
	synchronizer: Synchronizer,
	ledger: Arc<dyn LedgerClient>,
	configured_account: Option<Address>,
	poll_interval: Duration,
	states: watch::Sender<Option<Arc<SyncState>>>,
}

impl ConnectionSupervisor {
	pub fn new(
		synchronizer: Synchronizer,
		configured_account: Option<Address>,
		poll_interval: Duration,
	) -> Self {
		Self {
			ledger: synchronizer.ledger.clone(),
			synchronizer,
			configured_account,
			poll_interval,
			states: watch::Sender::new(None),
		}
	}

	/// State of the current session; `None` while no session is active.
	pub fn watch_states(&self) -> watch::Receiver<Option<Arc<SyncState>>> {
		self.states.subscribe()
	}

	async fn identity(&self) -> Result<ConnectionIdentity, SyncError> {
		let network_id = self
			.ledger
			.network_id()
			.await
			.map_err(SyncError::query("network id"))?;
		let account = self
			.synchronizer
			.resolve_account(self.configured_account.clone())
			.await;
		Ok(ConnectionIdentity {
			network_id,
			account,
		})
	}

	/// Poll the connection identity until `shutdown` resolves.
	///
	/// The current session is replaced whenever the identity changes or the session has lost
	/// a live listener; the old session is always deactivated before a new one is activated.
	/// An identity only counts as settled once it produced a session or was rejected as the
	/// wrong network, so transient read failures are retried on the next poll. A failed
	/// identity poll is reported and leaves the current session in place.
	pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
		tokio::pin!(shutdown);
		let mut current: Option<ConnectionIdentity> = None;
		let mut session: Option<SyncSession> = None;

		loop {
			match self.identity().await {
				Ok(identity) => {
					let changed = current.as_ref() != Some(&identity);
					let lost = session.as_ref().is_some_and(|s| !s.is_live());
					if changed || lost {
						if let Some(previous) = session.take() {
							previous.deactivate();
						}
						if lost && !changed {
							warn!("Live listeners stopped, re-activating");
						} else {
							info!(
								"Connection identity changed: network {}, account {}",
								identity.network_id,
								identity
									.account
									.as_ref()
									.map(Address::to_string)
									.unwrap_or_else(|| "none".to_string())
							);
						}
						current = self.reactivate(identity, &mut session).await;
					}
				}
				Err(e) => self.synchronizer.errors.report(&e),
			}

			tokio::select! {
				_ = &mut shutdown => break,
				_ = tokio::time::sleep(self.poll_interval) => {}
			}
		}

		if let Some(session) = session.take() {
			session.deactivate();
		}
		self.states.send_replace(None);
	}

	/// Activate for `identity` and publish the outcome. Returns the identity if it is settled.
	async fn reactivate(
		&self,
		identity: ConnectionIdentity,
		session: &mut Option<SyncSession>,
	) -> Option<ConnectionIdentity> {
		let settled = match self.synchronizer.try_activate(identity.account.clone()).await {
			Ok(activated) => {
				*session = Some(activated);
				true
			}
			Err(e) => {
				let settled = matches!(e, SyncError::NetworkMismatch { .. });
				self.synchronizer.errors.report(&e);
				settled
			}
		};
		self.states
			.send_replace(session.as_ref().map(|s| s.state().clone()));
		settled.then_some(identity)
	}
}
