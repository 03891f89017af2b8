//! Live event subscription.
//!
//! One listener per event kind consumes the ledger's live log stream. Events at or below the
//! activation's start height are already covered by the initial reconciliation and are
//! dropped; anything newer triggers a full reconciliation of that kind. Listener failures are
//! reported and the listener keeps running. All listeners belong to a [`SubscriptionSet`] that
//! stops every one of them when disposed or dropped.

use super::reconciler::LogReconciler;
use super::types::{ActivationContext, ErrorSink, SyncError};
use crate::ledger::{
	Address, EventFilter, EventKind, LedgerClient, LedgerError, LogStream, RawLog,
};

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Whether a live event is newer than what the initial reconciliation covered.
pub fn is_new_event(log: &RawLog, context: &ActivationContext) -> bool {
	log.block_height > context.start_block_height
}

/// Listener tasks attached during one activation.
#[derive(Default)]
pub struct SubscriptionSet {
	listeners: Vec<(EventKind, JoinHandle<()>)>,
}

impl SubscriptionSet {
	pub fn len(&self) -> usize {
		self.listeners.len()
	}

	pub fn is_empty(&self) -> bool {
		self.listeners.is_empty()
	}

	/// False once any listener has exited, e.g. because its stream ended.
	pub fn all_running(&self) -> bool {
		self.listeners.iter().all(|(_, handle)| !handle.is_finished())
	}

	pub fn kinds(&self) -> Vec<EventKind> {
		self.listeners.iter().map(|(kind, _)| *kind).collect()
	}

	/// Stop every listener. In-flight reconciliations are abandoned at their next await.
	pub fn dispose(mut self) {
		self.abort_all();
	}

	fn abort_all(&mut self) {
		for (kind, handle) in self.listeners.drain(..) {
			debug!("Detaching {} listener", kind);
			handle.abort();
		}
	}
}

impl Drop for SubscriptionSet {
	fn drop(&mut self) {
		self.abort_all();
	}
}

pub struct LiveEventSubscriber {
	ledger: Arc<dyn LedgerClient>,
	contract: Address,
	reconciler: Arc<LogReconciler>,
	errors: Arc<dyn ErrorSink>,
}

impl LiveEventSubscriber {
	pub fn new(
		ledger: Arc<dyn LedgerClient>,
		contract: Address,
		reconciler: Arc<LogReconciler>,
		errors: Arc<dyn ErrorSink>,
	) -> Self {
		Self {
			ledger,
			contract,
			reconciler,
			errors,
		}
	}

	/// Attach one listener per event kind and return them as a set.
	///
	/// A kind whose registration fails is reported and left out; the others still attach.
	pub async fn attach(&self, context: ActivationContext) -> SubscriptionSet {
		let mut set = SubscriptionSet::default();
		for kind in EventKind::ALL {
			let filter = EventFilter {
				address: self.contract.clone(),
				topic: kind.topic(),
			};
			match self.ledger.subscribe(&filter).await {
				Ok(stream) => {
					let handle = tokio::spawn(run_listener(
						kind,
						stream,
						context,
						self.reconciler.clone(),
						self.errors.clone(),
					));
					set.listeners.push((kind, handle));
					info!("Listening for {} events after block {}", kind, context.start_block_height);
				}
				Err(source) => {
					self.errors.report(&SyncError::Subscription { kind, source });
				}
			}
		}
		set
	}
}

/// Consume one kind's live stream until it ends.
///
/// A stream that ends on its own is reported, since no further live updates arrive for that
/// kind until the listener is attached again.
pub async fn run_listener(
	kind: EventKind,
	mut stream: LogStream,
	context: ActivationContext,
	reconciler: Arc<LogReconciler>,
	errors: Arc<dyn ErrorSink>,
) {
	while let Some(item) = stream.next().await {
		match item {
			Ok(log) if is_new_event(&log, &context) => {
				debug!(
					"New {} event at block {}, reconciling",
					kind, log.block_height
				);
				if let Err(e) = reconciler.try_reconcile(kind).await {
					errors.report(&e);
				}
			}
			Ok(log) => {
				debug!(
					"Ignoring {} event at block {} (start block {})",
					kind, log.block_height, context.start_block_height
				);
			}
			Err(source) => errors.report(&SyncError::Subscription { kind, source }),
		}
	}
	warn!("{} event stream ended", kind);
	errors.report(&SyncError::Subscription {
		kind,
		source: LedgerError::Subscription("stream ended".to_string()),
	});
}
