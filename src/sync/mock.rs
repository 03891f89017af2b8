//! In-memory ledger used by the sync tests.

use super::types::{ErrorSink, SyncError};
use crate::ledger::abi::{OWNER_SIGNATURE, encode_call};
use crate::ledger::*;

use futures::channel::mpsc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const CONTRACT: &str = "0xB5b209B4DE252716240ef40D9658265dae8d3453";
pub const OWNER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const PAYER: &str = "0x00000000000000000000000000000000000000ab";

/// Error sink that keeps every reported error's message.
#[derive(Default)]
pub struct RecordingSink {
	errors: Mutex<Vec<String>>,
}

impl RecordingSink {
	pub fn len(&self) -> usize {
		self.errors.lock().expect("sink lock").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn messages(&self) -> Vec<String> {
		self.errors.lock().expect("sink lock").clone()
	}
}

impl ErrorSink for RecordingSink {
	fn report(&self, error: &SyncError) {
		self.errors.lock().expect("sink lock").push(error.to_string());
	}
}

#[derive(Default)]
struct Inner {
	network_id: u64,
	block_height: u64,
	accounts: Vec<Address>,
	balances: HashMap<String, Amount>,
	logs: HashMap<[u8; 32], Vec<RawLog>>,
	failing: HashSet<&'static str>,
	reverting: bool,
	calls: HashMap<&'static str, usize>,
	queries: HashMap<[u8; 32], usize>,
	live: Vec<([u8; 32], mpsc::UnboundedSender<Result<RawLog, LedgerError>>)>,
	mined_on_subscribe: Option<(EventKind, RawLog)>,
	submitted: Vec<TransactionRequest>,
}

pub struct MockLedger {
	inner: Mutex<Inner>,
}

impl MockLedger {
	pub fn new(network_id: u64, block_height: u64) -> Self {
		let inner = Inner {
			network_id,
			block_height,
			accounts: vec![Address::new(OWNER)],
			..Default::default()
		};
		Self {
			inner: Mutex::new(inner),
		}
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().expect("mock ledger lock")
	}

	fn enter(&self, method: &'static str) -> Result<(), LedgerError> {
		let mut inner = self.lock();
		*inner.calls.entry(method).or_default() += 1;
		if inner.failing.contains(method) {
			return Err(LedgerError::Rpc {
				code: -32000,
				message: format!("{method} unavailable"),
			});
		}
		Ok(())
	}

	pub fn set_balance(&self, address: &str, amount: u128) {
		self.lock()
			.balances
			.insert(address.to_ascii_lowercase(), Amount::from(amount));
	}

	pub fn set_block_height(&self, height: u64) {
		self.lock().block_height = height;
	}

	pub fn set_accounts(&self, accounts: Vec<Address>) {
		self.lock().accounts = accounts;
	}

	pub fn set_network_id(&self, network_id: u64) {
		self.lock().network_id = network_id;
	}

	pub fn push_log(&self, kind: EventKind, log: RawLog) {
		self.lock().logs.entry(kind.topic()).or_default().push(log);
	}

	/// Mine `log` when the next subscription is registered, raising the block height to its block.
	pub fn mine_during_subscribe(&self, kind: EventKind, log: RawLog) {
		self.lock().mined_on_subscribe = Some((kind, log));
	}

	pub fn fail(&self, method: &'static str) {
		self.lock().failing.insert(method);
	}

	pub fn recover(&self, method: &'static str) {
		self.lock().failing.remove(method);
	}

	pub fn revert_transactions(&self) {
		self.lock().reverting = true;
	}

	pub fn calls(&self, method: &str) -> usize {
		self.lock().calls.get(method).copied().unwrap_or(0)
	}

	/// Total ledger round trips made so far.
	pub fn total_calls(&self) -> usize {
		self.lock().calls.values().sum()
	}

	pub fn queries(&self, kind: EventKind) -> usize {
		self.lock().queries.get(&kind.topic()).copied().unwrap_or(0)
	}

	pub fn submitted(&self) -> Vec<TransactionRequest> {
		self.lock().submitted.clone()
	}

	/// Deliver a live log to every open subscription for `kind`.
	pub fn emit(&self, kind: EventKind, item: Result<RawLog, LedgerError>) {
		let inner = self.lock();
		let mut item = Some(item);
		for (topic, sender) in &inner.live {
			if *topic == kind.topic() {
				if let Some(item) = item.take() {
					let _ = sender.unbounded_send(item);
				}
			}
		}
	}

	/// End every open live stream, as a dropped WebSocket connection would.
	pub fn close_subscriptions(&self) {
		self.lock().live.clear();
	}

	/// Subscriptions whose receiving end is still alive.
	pub fn open_subscriptions(&self) -> usize {
		self.lock()
			.live
			.iter()
			.filter(|(_, sender)| !sender.is_closed())
			.count()
	}
}

pub fn payment_log(block_height: u64, log_index: u64, amount: u128, timestamp: u64) -> RawLog {
	let mut payer = [0u8; 32];
	payer[31] = 0xab;
	RawLog {
		address: Address::new(CONTRACT),
		topics: vec![EventKind::Payment.topic()],
		data: [
			payer,
			Amount::from(amount).to_be_bytes(),
			Amount::from(u128::from(timestamp)).to_be_bytes(),
		]
		.concat(),
		block_height,
		log_index,
		transaction_hash: format!("0x{block_height:x}{log_index:x}"),
		removed: false,
	}
}

pub fn withdrawal_log(block_height: u64, log_index: u64, amount: u128, timestamp: u64) -> RawLog {
	RawLog {
		address: Address::new(CONTRACT),
		topics: vec![EventKind::Withdrawal.topic()],
		data: [
			Amount::from(amount).to_be_bytes(),
			Amount::from(u128::from(timestamp)).to_be_bytes(),
		]
		.concat(),
		block_height,
		log_index,
		transaction_hash: format!("0x{block_height:x}{log_index:x}"),
		removed: false,
	}
}

#[async_trait::async_trait]
impl LedgerClient for MockLedger {
	async fn network_id(&self) -> Result<u64, LedgerError> {
		self.enter("network_id")?;
		Ok(self.lock().network_id)
	}

	async fn block_height(&self) -> Result<BlockHeight, LedgerError> {
		self.enter("block_height")?;
		Ok(self.lock().block_height)
	}

	async fn accounts(&self) -> Result<Vec<Address>, LedgerError> {
		self.enter("accounts")?;
		Ok(self.lock().accounts.clone())
	}

	async fn balance(&self, address: &Address) -> Result<Amount, LedgerError> {
		self.enter("balance")?;
		Ok(self
			.lock()
			.balances
			.get(&address.as_str().to_ascii_lowercase())
			.copied()
			.unwrap_or(Amount::ZERO))
	}

	async fn call(&self, _to: &Address, data: &[u8]) -> Result<Vec<u8>, LedgerError> {
		self.enter("call")?;
		if data != encode_call(OWNER_SIGNATURE).as_slice() {
			return Err(LedgerError::Rpc {
				code: 3,
				message: "execution reverted".to_string(),
			});
		}
		let owner = hex::decode(OWNER.trim_start_matches("0x")).expect("owner hex");
		let mut word = vec![0u8; 12];
		word.extend(owner);
		Ok(word)
	}

	async fn query_events(&self, filter: &EventFilter) -> Result<Vec<RawLog>, LedgerError> {
		self.enter("query_events")?;
		let mut inner = self.lock();
		*inner.queries.entry(filter.topic).or_default() += 1;
		Ok(inner.logs.get(&filter.topic).cloned().unwrap_or_default())
	}

	async fn subscribe(&self, filter: &EventFilter) -> Result<LogStream, LedgerError> {
		self.enter("subscribe")?;
		let (sender, receiver) = mpsc::unbounded();
		let mut inner = self.lock();
		if let Some((kind, log)) = inner.mined_on_subscribe.take() {
			inner.block_height = inner.block_height.max(log.block_height);
			inner.logs.entry(kind.topic()).or_default().push(log);
		}
		inner.live.push((filter.topic, sender));
		Ok(Box::pin(receiver))
	}

	async fn submit_transaction(
		&self,
		request: &TransactionRequest,
	) -> Result<PendingTransaction, LedgerError> {
		self.enter("submit_transaction")?;
		let mut inner = self.lock();
		inner.submitted.push(request.clone());
		Ok(PendingTransaction {
			hash: format!("0x{:064x}", inner.submitted.len()),
		})
	}

	async fn await_confirmation(
		&self,
		pending: &PendingTransaction,
	) -> Result<Receipt, LedgerError> {
		self.enter("await_confirmation")?;
		let inner = self.lock();
		Ok(Receipt {
			transaction_hash: pending.hash.clone(),
			block_height: inner.block_height + 1,
			success: !inner.reverting,
		})
	}
}
