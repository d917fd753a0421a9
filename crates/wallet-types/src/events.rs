//! Event types for inter-service communication.
//!
//! This module defines the event system used by the wallet engine for
//! asynchronous communication between components and toward the UI layer.
//! Events flow through an event bus allowing consumers to react to
//! estimation progress, history changes and user-facing notifications.

use crate::{Chain, TransactionFeeInfo};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all wallet engine events.
///
/// Events are categorized by the concern that produces them, allowing
/// consumers to filter and handle specific event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalletEvent {
	/// Events from the fee-estimation dispatcher.
	Estimation(EstimationEvent),
	/// Events about persisted transaction history.
	History(HistoryEvent),
	/// Events asking the balance layer to refetch.
	Balances(BalancesEvent),
	/// Events about the stored account set.
	Account(AccountEvent),
	/// Transient user-facing notifications.
	Toast(ToastEvent),
}

/// Events emitted while an estimation request moves through the
/// dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EstimationEvent {
	/// A new request entered the estimating state, superseding any prior
	/// result.
	Started { chain: Chain, generation: u64 },
	/// The current request resolved with usable fee info.
	Resolved {
		chain: Chain,
		fee_info: TransactionFeeInfo,
	},
	/// The current request resolved with an error message.
	Failed { chain: Chain, message: String },
}

/// Events about persisted transaction history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HistoryEvent {
	/// Records changed for the listed accounts on one chain; consumers
	/// re-read through the history service.
	Updated {
		account_ids: Vec<String>,
		chain: Chain,
	},
}

/// Events asking the balance layer to refetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BalancesEvent {
	/// Balances for the account on the chain are stale and should be
	/// refetched.
	RefreshRequested { account_id: String, chain: Chain },
}

/// Events about the stored account set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AccountEvent {
	/// Backend sync merged fresh per-chain data into the account.
	Synced { account_id: String },
	/// The active account switched.
	Activated { account_id: String },
}

/// Kind of a toast notification.
///
/// Consumers replace a visible toast of the same kind instead of stacking
/// a new one on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToastKind {
	EstimationFailed,
	PaymentConfirmed,
}

/// A transient, non-blocking user notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToastEvent {
	pub kind: ToastKind,
	pub message: String,
	/// Emoji name rendered alongside the message.
	pub emoji: String,
}
