//! Common types module for the wallet transaction engine.
//!
//! This module defines the core data types and structures shared by every
//! crate in the workspace. It provides a centralized location for the data
//! model so accounts, transactions, history records and backend payloads
//! stay consistent across all components.

/// Account records and the closed set of account kinds.
pub mod accounts;
/// Payload types exchanged with the smart-wallet backend services.
pub mod backend;
/// Supported chains and per-chain configuration tables.
pub mod chains;
/// Event types for inter-service communication.
pub mod events;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Secret string wrapper keeping key material out of logs.
pub mod secret_string;
/// Storage namespace keys for persisted data.
pub mod storage;
/// Transaction intents, descriptors, fee info and history records.
pub mod transactions;
/// Utility functions for formatting and hash comparison.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;
/// WalletConnect session and call-request types.
pub mod walletconnect;

// Re-export all types for convenient access
pub use accounts::*;
pub use backend::*;
pub use chains::{
	deserialize_chains, Chain, ChainConfig, ChainsConfig, TokenConfig, NATIVE_TOKEN_ADDRESS,
};
pub use events::*;
pub use registry::*;
pub use secret_string::SecretString;
pub use storage::*;
pub use transactions::*;
pub use utils::{
	current_timestamp, format_token_amount, same_hash, truncate_id, with_0x_prefix,
	without_0x_prefix,
};
pub use validation::*;
pub use walletconnect::*;
