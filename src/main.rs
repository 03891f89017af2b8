use clap::{Parser, Subcommand};
use payments_sync::config::{
	DEFAULT_CHAIN_ID, DEFAULT_CONTRACT, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RPC_URL, DEFAULT_WS_URL,
	SyncConfig,
};
use payments_sync::ledger::{Amount, JsonRpcLedgerClient, LedgerClient};
use payments_sync::sync::{
	ConnectionSupervisor, ContractSnapshot, ErrorSink, PaymentRecord, SyncSession, SyncState,
	Synchronizer, TracingErrorSink, WithdrawalRecord,
};
use payments_sync::utils::group_digits;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Keep a local view of a payments contract in sync with the ledger
#[derive(Parser, Debug)]
#[command(name = "payments-sync", version, about)]
struct Cli {
	/// HTTP JSON-RPC endpoint of the node
	#[arg(long, env = "PAYMENTS_RPC_URL", default_value = DEFAULT_RPC_URL)]
	rpc_url: String,

	/// WebSocket endpoint used for live event subscriptions
	#[arg(long, env = "PAYMENTS_WS_URL", default_value = DEFAULT_WS_URL)]
	ws_url: String,

	/// Payments contract address
	#[arg(long, env = "PAYMENTS_CONTRACT", default_value = DEFAULT_CONTRACT)]
	contract: String,

	/// The only chain id the synchronizer activates on
	#[arg(long, env = "PAYMENTS_CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID)]
	chain_id: u64,

	/// Account for deposits and withdrawals; defaults to the node's first account
	#[arg(long, env = "PAYMENTS_ACCOUNT")]
	account: Option<String>,

	/// Receipt and connection poll interval in milliseconds
	#[arg(long, env = "PAYMENTS_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
	poll_interval_ms: u64,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Follow payments, withdrawals and balances until interrupted
	Watch,
	/// Print the current contract state once
	Status,
	/// Send an amount (in wei) to the contract
	Deposit { amount: Amount },
	/// Withdraw the contract balance to the owner
	Withdraw,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let cli = Cli::parse();
	let config = match SyncConfig::new(
		&cli.rpc_url,
		&cli.ws_url,
		&cli.contract,
		cli.chain_id,
		cli.account.as_deref(),
		cli.poll_interval_ms,
	) {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return ExitCode::FAILURE;
		}
	};

	let ledger: Arc<dyn LedgerClient> = match JsonRpcLedgerClient::new(
		config.rpc_url.clone(),
		config.ws_url.clone(),
		config.poll_interval,
	) {
		Ok(client) => Arc::new(client),
		Err(e) => {
			error!("Failed to create ledger client: {}", e);
			return ExitCode::FAILURE;
		}
	};
	let errors: Arc<dyn ErrorSink> = Arc::new(TracingErrorSink);
	let synchronizer = Synchronizer::new(
		ledger,
		config.contract.clone(),
		config.expected_chain_id,
		errors,
	);

	info!(
		"Payments contract {} on chain {}",
		config.contract, config.expected_chain_id
	);

	match cli.command {
		Command::Watch => {
			follow(synchronizer, &config).await;
			ExitCode::SUCCESS
		}
		command => {
			let account = synchronizer.resolve_account(config.account.clone()).await;
			let Some(session) = synchronizer.activate(account).await else {
				return ExitCode::FAILURE;
			};
			let succeeded = run_once(&session, command).await;
			session.deactivate();
			if succeeded {
				ExitCode::SUCCESS
			} else {
				ExitCode::FAILURE
			}
		}
	}
}

async fn run_once(session: &SyncSession, command: Command) -> bool {
	match command {
		Command::Status => {
			let state = session.state();
			print_payments(&state.payments());
			print_withdrawals(&state.withdrawals());
			print_snapshot(&state.snapshot());
			info!(
				"Withdraw {} for this account",
				if session.can_withdraw() {
					"available"
				} else {
					"unavailable"
				}
			);
			true
		}
		Command::Deposit { amount } => match session.deposit(amount).await {
			Some(receipt) => {
				info!(
					"Deposited {} wei in {}",
					group_digits(&amount.to_decimal_string()),
					receipt.transaction_hash
				);
				print_snapshot(&session.state().snapshot());
				true
			}
			None => false,
		},
		Command::Withdraw => match session.withdraw().await {
			Some(receipt) => {
				info!("Withdrew contract balance in {}", receipt.transaction_hash);
				print_snapshot(&session.state().snapshot());
				true
			}
			None => false,
		},
		Command::Watch => false,
	}
}

async fn follow(synchronizer: Synchronizer, config: &SyncConfig) {
	let supervisor =
		ConnectionSupervisor::new(synchronizer, config.account.clone(), config.poll_interval);
	let states = supervisor.watch_states();
	let shutdown = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			error!("Failed to listen for ctrl-c: {}", e);
		}
		info!("Shutting down");
	};

	tokio::join!(supervisor.run_until(shutdown), print_updates(states));
}

/// Print every display change of the current session until the supervisor stops.
async fn print_updates(mut states: watch::Receiver<Option<Arc<SyncState>>>) {
	loop {
		let current = states.borrow_and_update().clone();
		let Some(state) = current else {
			if states.changed().await.is_err() {
				return;
			}
			continue;
		};

		let mut payments = state.watch_payments();
		let mut withdrawals = state.watch_withdrawals();
		let mut snapshot = state.watch_snapshot();
		print_payments(&payments.borrow_and_update());
		print_withdrawals(&withdrawals.borrow_and_update());
		print_snapshot(&snapshot.borrow_and_update());

		loop {
			tokio::select! {
				changed = states.changed() => {
					if changed.is_err() {
						return;
					}
					break;
				}
				Ok(()) = payments.changed() => print_payments(&payments.borrow_and_update()),
				Ok(()) = withdrawals.changed() => print_withdrawals(&withdrawals.borrow_and_update()),
				Ok(()) = snapshot.changed() => print_snapshot(&snapshot.borrow_and_update()),
			}
		}
	}
}

fn print_payments(records: &[PaymentRecord]) {
	info!("{} payments", records.len());
	for record in records {
		info!(
			"  {} paid {} wei at {}",
			record.payer,
			group_digits(&record.amount),
			record.timestamp
		);
	}
}

fn print_withdrawals(records: &[WithdrawalRecord]) {
	info!("{} withdrawals", records.len());
	for record in records {
		info!(
			"  withdrew {} wei at {}",
			group_digits(&record.amount),
			record.timestamp
		);
	}
}

fn print_snapshot(snapshot: &ContractSnapshot) {
	info!(
		"Contract balance: {} wei, owner {} holds {} wei",
		group_digits(&snapshot.contract_balance),
		snapshot.owner_address,
		group_digits(&snapshot.owner_balance)
	);
}
