//! Payments Contract Synchronization Module
//!
//! This module keeps a local, observable view of one payments contract consistent with the
//! ledger and drives the contract's two state-changing operations. It is composed of several
//! submodules, each responsible for a specific aspect of the sync process:
//!
//! - `orchestrator`: The activation sequence, the per-activation session and the connection supervisor.
//! - `activation`: Network check that gates every other component.
//! - `records`: Decoding of raw event logs and mapping into display records.
//! - `reconciler`: Full-history re-queries that replace the held record sequences.
//! - `events`: Live listeners that trigger reconciliation for events past the start block.
//! - `balance_tracker`: Contract balance, owner and owner balance reads.
//! - `transactions`: Deposit and withdraw lifecycles with their pending phases.
//! - `state`: Observable display state shared with the UI layer.
//!
//! Every failure is routed to a single [`ErrorSink`]; nothing in this module retries.

/// Network check performed on every activation
pub mod activation;
/// Contract balance and owner tracking
pub mod balance_tracker;
/// Live event subscription and listener lifecycle
pub mod events;
/// Activation sequence, sessions and connection supervision
pub mod orchestrator;
/// Full-history event reconciliation
pub mod reconciler;
/// Event decoding and record mapping
pub mod records;
/// Observable display state
pub mod state;
/// Deposit and withdraw lifecycles
pub mod transactions;
/// Shared sync types and errors
pub mod types;

#[cfg(test)]
mod mock;

pub use orchestrator::*;
pub use records::{PaymentRecord, WithdrawalRecord};
pub use state::{ContractSnapshot, SyncState};
pub use types::*;
