//! Core orchestration module for the wallet transaction engine.
//!
//! This module ties the component services together: the fee-estimation
//! dispatcher, the per-account transaction history, the backend
//! notification reconciliation engine and the WalletConnect session
//! handling. The [`WalletEngine`] drives everything from one event loop;
//! the [`WalletBuilder`] constructs it from configuration through
//! per-concern factory maps.

pub mod builder;
pub mod engine;
pub mod estimation;
pub mod history;
pub mod reconciliation;

pub use builder::{BuilderError, WalletBuilder, WalletFactories};
pub use engine::{EngineError, EventBus, WalletEngine};
pub use estimation::{
	EstimationError, EstimationState, EstimationTracker, FeeEstimator, GasInfo, GasPrices,
	GasTracker,
};
pub use history::{HistoryError, HistoryService};
pub use reconciliation::{ReconciliationEngine, ReconciliationError};
