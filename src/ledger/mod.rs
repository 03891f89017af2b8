//! Ledger integration module
//!
//! This module provides the boundary between the synchronizer and the remote ledger: the
//! `LedgerClient` trait, a JSON-RPC implementation for Ethereum-compatible nodes, the
//! payments contract ABI, and the value types that cross the boundary.

/// Contract ABI helpers (topics, selectors, word decoding)
pub mod abi;
/// The ledger client trait
mod client;
/// JSON-RPC client over HTTP and WebSocket
mod rpc;
/// Type definitions for ledger data structures
mod types;

pub use abi::EventKind;
pub use client::LedgerClient;
pub use rpc::JsonRpcLedgerClient;
pub use types::*;
