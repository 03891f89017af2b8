use super::types::{
	Address, Amount, BlockHeight, EventFilter, LedgerError, LogStream, PendingTransaction, RawLog,
	Receipt, TransactionRequest,
};

/// Read and write access to the remote ledger.
///
/// This is the only seam between the synchronizer and the network. Every method is a single
/// round trip (or, for [`LedgerClient::await_confirmation`], a wait for one outcome) and
/// surfaces failures as-is: implementations must not retry.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
	/// Identity of the connected network (the EIP-155 chain id).
	async fn network_id(&self) -> Result<u64, LedgerError>;

	/// Height of the latest block.
	async fn block_height(&self) -> Result<BlockHeight, LedgerError>;

	/// Accounts the connected wallet or node can sign for.
	async fn accounts(&self) -> Result<Vec<Address>, LedgerError>;

	/// Raw balance held at `address`.
	async fn balance(&self, address: &Address) -> Result<Amount, LedgerError>;

	/// Read-only contract call returning the raw ABI-encoded result.
	async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>, LedgerError>;

	/// Every log matching `filter` from genesis to the latest block, in ledger order.
	async fn query_events(&self, filter: &EventFilter) -> Result<Vec<RawLog>, LedgerError>;

	/// Live logs matching `filter`. Dropping the stream ends the subscription.
	async fn subscribe(&self, filter: &EventFilter) -> Result<LogStream, LedgerError>;

	/// Hand a transaction to the signer and broadcast it.
	async fn submit_transaction(
		&self,
		request: &TransactionRequest,
	) -> Result<PendingTransaction, LedgerError>;

	/// Wait until the transaction is mined and return its receipt.
	async fn await_confirmation(
		&self,
		pending: &PendingTransaction,
	) -> Result<Receipt, LedgerError>;
}
