//!
//! JSON-RPC client for an Ethereum-compatible node.
//!
//! Reads and writes go over HTTP; live logs are delivered through `eth_subscribe` on a
//! WebSocket connection, one connection per subscription so that dropping a stream tears down
//! exactly that subscription. All methods are async and designed for use with Tokio.

use super::client::LedgerClient;
use super::types::*;

use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
struct RpcErrorObject {
	code: i64,
	message: String,
}

/// JSON-RPC response envelope. A missing `result` decodes as `null`.
#[derive(Debug, Deserialize)]
struct RpcResponse {
	#[serde(default)]
	result: Value,
	error: Option<RpcErrorObject>,
}

impl RpcResponse {
	fn into_result(self) -> Result<Value, LedgerError> {
		match self.error {
			Some(error) => Err(LedgerError::Rpc {
				code: error.code,
				message: error.message,
			}),
			None => Ok(self.result),
		}
	}
}

/// Ledger client speaking Ethereum JSON-RPC
#[derive(Clone)]
pub struct JsonRpcLedgerClient {
	/// The underlying HTTP client for JSON-RPC requests.
	http_client: Client,
	/// The HTTP JSON-RPC endpoint.
	rpc_url: String,
	/// The WebSocket endpoint for `eth_subscribe`.
	ws_url: String,
	/// Delay between receipt lookups while awaiting confirmation.
	poll_interval: Duration,
	next_id: Arc<AtomicU64>,
}

impl JsonRpcLedgerClient {
	/// Create a new JSON-RPC client.
	///
	/// # Arguments
	/// * `rpc_url` - The HTTP endpoint for requests.
	/// * `ws_url` - The WebSocket endpoint for subscriptions.
	/// * `poll_interval` - Delay between receipt lookups.
	pub fn new(
		rpc_url: String,
		ws_url: String,
		poll_interval: Duration,
	) -> Result<Self, LedgerError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			rpc_url,
			ws_url,
			poll_interval,
			next_id: Arc::new(AtomicU64::new(1)),
		})
	}

	fn request_body(&self, method: &str, params: Value) -> Value {
		json!({
			"jsonrpc": "2.0",
			"id": self.next_id.fetch_add(1, Ordering::Relaxed),
			"method": method,
			"params": params,
		})
	}

	/// Execute a JSON-RPC request and return the raw `result` value.
	pub async fn execute(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
		let request_body = self.request_body(method, params);
		debug!("JSON-RPC request: {}", request_body);

		let response = self
			.http_client
			.post(&self.rpc_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(LedgerError::HttpStatus(response.status().as_u16()));
		}

		let response: RpcResponse = response.json().await?;
		response.into_result()
	}

	/// Execute a JSON-RPC request and deserialize its `result`.
	pub async fn request<T: DeserializeOwned>(
		&self,
		method: &str,
		params: Value,
	) -> Result<T, LedgerError> {
		let result = self.execute(method, params).await?;
		Ok(serde_json::from_value(result)?)
	}

	async fn request_quantity(&self, method: &str, params: Value) -> Result<u64, LedgerError> {
		let quantity: String = self.request(method, params).await?;
		parse_quantity(&quantity)
	}
}

fn filter_object(filter: &EventFilter) -> Value {
	json!({
		"address": filter.address.as_str(),
		"topics": [format!("0x{}", hex::encode(filter.topic))],
	})
}

/// Turn one WebSocket frame into a log for `subscription_id`, or `None` to skip the frame.
fn parse_notification(
	message: Message,
	subscription_id: &str,
) -> Option<Result<RawLog, LedgerError>> {
	let text = match message {
		Message::Text(text) => text,
		Message::Close(frame) => {
			info!("Log subscription {} closed: {:?}", subscription_id, frame);
			return None;
		}
		_ => return None,
	};

	let parsed: Value = match serde_json::from_str(&text) {
		Ok(parsed) => parsed,
		Err(e) => return Some(Err(LedgerError::Json(e))),
	};

	if parsed.get("method").and_then(|m| m.as_str()) != Some("eth_subscription") {
		debug!("Ignoring non-notification message: {}", text);
		return None;
	}

	let params = parsed.get("params")?;
	if params.get("subscription").and_then(|s| s.as_str()) != Some(subscription_id) {
		debug!("Ignoring notification for another subscription");
		return None;
	}

	let log = params.get("result").cloned().unwrap_or(Value::Null);
	Some(
		serde_json::from_value::<RpcLog>(log)
			.map_err(LedgerError::Json)
			.and_then(RawLog::try_from),
	)
}

#[async_trait::async_trait]
impl LedgerClient for JsonRpcLedgerClient {
	async fn network_id(&self) -> Result<u64, LedgerError> {
		self.request_quantity("eth_chainId", json!([])).await
	}

	async fn block_height(&self) -> Result<BlockHeight, LedgerError> {
		self.request_quantity("eth_blockNumber", json!([])).await
	}

	async fn accounts(&self) -> Result<Vec<Address>, LedgerError> {
		let accounts: Vec<String> = self.request("eth_accounts", json!([])).await?;
		accounts.iter().map(|a| Address::parse(a)).collect()
	}

	async fn balance(&self, address: &Address) -> Result<Amount, LedgerError> {
		let quantity: String = self
			.request("eth_getBalance", json!([address.as_str(), "latest"]))
			.await?;
		Amount::from_hex_quantity(&quantity)
	}

	async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>, LedgerError> {
		let result: String = self
			.request(
				"eth_call",
				json!([
					{ "to": to.as_str(), "data": format!("0x{}", hex::encode(data)) },
					"latest"
				]),
			)
			.await?;
		decode_hex_data(&result)
	}

	async fn query_events(&self, filter: &EventFilter) -> Result<Vec<RawLog>, LedgerError> {
		let mut params = filter_object(filter);
		params["fromBlock"] = json!("earliest");
		params["toBlock"] = json!("latest");

		let logs: Vec<RpcLog> = self.request("eth_getLogs", json!([params])).await?;
		debug!("eth_getLogs returned {} logs", logs.len());
		logs.into_iter().map(RawLog::try_from).collect()
	}

	async fn subscribe(&self, filter: &EventFilter) -> Result<LogStream, LedgerError> {
		debug!("Attempting WebSocket connection to: {}", self.ws_url);

		let (ws_stream, response) = connect_async(self.ws_url.as_str()).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		let subscribe_message =
			self.request_body("eth_subscribe", json!(["logs", filter_object(filter)]));
		ws_sender
			.send(Message::Text(subscribe_message.to_string()))
			.await?;

		// Wait for the subscription id
		let subscription_id = loop {
			let Some(msg) = ws_receiver.next().await else {
				return Err(LedgerError::Subscription(
					"Connection closed before subscription was confirmed".to_string(),
				));
			};
			match msg? {
				Message::Text(text) => {
					let reply: RpcResponse = serde_json::from_str(&text)?;
					let result = reply.into_result()?;
					break result
						.as_str()
						.ok_or_else(|| {
							LedgerError::Subscription("Missing subscription id".to_string())
						})?
						.to_string();
				}
				Message::Ping(_) | Message::Pong(_) => continue,
				_ => {
					return Err(LedgerError::Subscription(
						"Unexpected message type during handshake".to_string(),
					));
				}
			}
		};
		info!("Subscribed to logs with subscription id {}", subscription_id);

		// The sender half travels with the stream so the connection lives as long as it does.
		// A transport error is yielded once and then ends the stream.
		let stream = futures_util::stream::unfold(
			(ws_sender, ws_receiver, false),
			move |(ws_sender, mut ws_receiver, closed)| {
				let subscription_id = subscription_id.clone();
				async move {
					if closed {
						return None;
					}
					loop {
						match ws_receiver.next().await? {
							Ok(message) => {
								if let Some(item) = parse_notification(message, &subscription_id)
								{
									return Some((item, (ws_sender, ws_receiver, false)));
								}
							}
							Err(e) => {
								warn!("Log subscription {} failed: {}", subscription_id, e);
								return Some((
									Err(LedgerError::WebSocket(e)),
									(ws_sender, ws_receiver, true),
								));
							}
						}
					}
				}
			},
		);

		Ok(Box::pin(stream))
	}

	async fn submit_transaction(
		&self,
		request: &TransactionRequest,
	) -> Result<PendingTransaction, LedgerError> {
		let mut transaction = json!({
			"from": request.from.as_str(),
			"to": request.to.as_str(),
			"value": request.value.to_hex_quantity(),
		});
		if !request.data.is_empty() {
			transaction["data"] = json!(format!("0x{}", hex::encode(&request.data)));
		}

		let hash: String = self
			.request("eth_sendTransaction", json!([transaction]))
			.await?;
		info!("Submitted transaction {}", hash);
		Ok(PendingTransaction { hash })
	}

	async fn await_confirmation(
		&self,
		pending: &PendingTransaction,
	) -> Result<Receipt, LedgerError> {
		loop {
			let receipt: Option<RpcReceipt> = self
				.request("eth_getTransactionReceipt", json!([pending.hash]))
				.await?;
			match receipt {
				Some(receipt) => {
					let receipt = Receipt::try_from(receipt)?;
					info!(
						"Transaction {} mined in block {}",
						receipt.transaction_hash, receipt.block_height
					);
					return Ok(receipt);
				}
				None => {
					debug!("Transaction {} not mined yet", pending.hash);
					tokio::time::sleep(self.poll_interval).await;
				}
			}
		}
	}
}
