//! Backend notification reconciliation.
//!
//! The engine feeds backend notifications through here one at a time. An
//! account notification resyncs per-chain smart-wallet data; a batch
//! notification resolves the submitted batch and folds its state back into
//! history, rewriting placeholder hashes to the mined one and promoting
//! the record to confirmed at most once. Errors never escape: each
//! notification is reconciled independently and a failure is logged with
//! its full context so the stream keeps flowing.

use std::sync::Arc;
use thiserror::Error;
use wallet_accounts::{AccountError, AccountsService};
use wallet_backends::{BackendError, BackendService};
use wallet_types::{
	format_token_amount, same_hash, truncate_id, AccountEvent, BackendNotification, BalancesEvent,
	Chain, ChainsConfig, GatewayBatchState, HistoryEvent, HistoryRecord, ToastEvent, ToastKind,
	TransactionStatus, WalletEvent,
};

use crate::engine::EventBus;
use crate::history::{HistoryError, HistoryService};

/// Errors that can occur while reconciling a notification.
#[derive(Debug, Error)]
pub enum ReconciliationError {
	/// Error that occurs in a backend call.
	#[error("Backend error: {0}")]
	Backend(#[from] BackendError),
	/// Error that occurs while updating accounts.
	#[error("Account error: {0}")]
	Account(#[from] AccountError),
	/// Error that occurs while updating history.
	#[error("History error: {0}")]
	History(#[from] HistoryError),
}

/// Maps a backend batch state into the transaction status vocabulary.
///
/// The mapping is total: states this build does not know land on pending
/// and get picked up by a later notification.
pub fn map_batch_state(state: GatewayBatchState) -> TransactionStatus {
	match state {
		GatewayBatchState::Queued | GatewayBatchState::Sending | GatewayBatchState::Unknown => {
			TransactionStatus::Pending
		}
		GatewayBatchState::Sent => TransactionStatus::Confirmed,
		GatewayBatchState::Reverted | GatewayBatchState::Cancelled => TransactionStatus::Failed,
	}
}

/// Folds backend notifications into accounts and history.
pub struct ReconciliationEngine {
	accounts: Arc<AccountsService>,
	backends: Arc<BackendService>,
	history: Arc<HistoryService>,
	chains: ChainsConfig,
	event_bus: EventBus,
}

impl ReconciliationEngine {
	/// Creates a new reconciliation engine over the given services.
	pub fn new(
		accounts: Arc<AccountsService>,
		backends: Arc<BackendService>,
		history: Arc<HistoryService>,
		chains: ChainsConfig,
		event_bus: EventBus,
	) -> Self {
		Self {
			accounts,
			backends,
			history,
			chains,
			event_bus,
		}
	}

	/// Reconciles one notification, containing any failure to a log entry.
	pub async fn handle(&self, chain: Chain, notification: BackendNotification) {
		if let Err(e) = self.process(chain, &notification).await {
			tracing::error!(
				error = %e,
				chain = %chain,
				notification_type = notification.kind(),
				notification = ?notification,
				"Failed to reconcile backend notification"
			);
		}
	}

	async fn process(
		&self,
		chain: Chain,
		notification: &BackendNotification,
	) -> Result<(), ReconciliationError> {
		match notification {
			BackendNotification::AccountUpdated => self.resync_accounts().await,
			BackendNotification::GatewayBatchUpdated { hash } => {
				self.reconcile_batch(chain, hash).await
			}
		}
	}

	/// Refetches per-chain data for every smart-wallet account and merges
	/// it into the stored set. History is not touched here.
	async fn resync_accounts(&self) -> Result<(), ReconciliationError> {
		for account in self.accounts.all().await {
			if !account.kind.is_smart_wallet() {
				continue;
			}

			let extras = self.backends.fetch_account_chains(&account).await?;
			for (chain, extra) in extras {
				self.accounts
					.merge_chain_extras(&account.id, chain, extra)
					.await?;
			}

			self.event_bus
				.publish(WalletEvent::Account(AccountEvent::Synced {
					account_id: account.id.clone(),
				}))
				.ok();
		}
		Ok(())
	}

	async fn reconcile_batch(
		&self,
		chain: Chain,
		batch_hash: &str,
	) -> Result<(), ReconciliationError> {
		// Resolving the batch is the hard dependency; everything after it
		// degrades to a quiet return.
		let batch = self.backends.submitted_batch(chain, batch_hash).await?;

		let Some(active) = self.accounts.active_account().await else {
			tracing::debug!(chain = %chain, "No active account; skipping batch reconciliation");
			return Ok(());
		};

		let Some(record) = self.history.find_by_batch(&active.id, chain, batch_hash).await else {
			tracing::debug!(
				chain = %chain,
				batch_hash = %truncate_id(batch_hash),
				"No history record for batch on active account"
			);
			return Ok(());
		};

		let mut record_hash = record.hash.clone();
		if let Some(mined) = batch.transaction.as_ref() {
			if !same_hash(&record.hash, &mined.hash) {
				let rewritten = self
					.history
					.rewrite_hash(chain, batch_hash, &mined.hash)
					.await?;
				if !rewritten.is_empty() {
					self.event_bus
						.publish(WalletEvent::History(HistoryEvent::Updated {
							account_ids: rewritten,
							chain,
						}))
						.ok();
				}
			}
			record_hash = mined.hash.clone();
		}

		let mapped = map_batch_state(batch.state);

		// Promotion fires exactly once: the transition table rejects a
		// repeat confirmation, so a duplicate notification stops here.
		if record.status != TransactionStatus::Confirmed
			&& mapped == TransactionStatus::Confirmed
			&& !record_hash.is_empty()
		{
			let changed = self
				.history
				.set_status_by_hash(chain, &record_hash, TransactionStatus::Confirmed)
				.await?;
			if !changed.is_empty() {
				self.event_bus
					.publish(WalletEvent::History(HistoryEvent::Updated {
						account_ids: changed,
						chain,
					}))
					.ok();
				self.event_bus
					.publish(WalletEvent::Balances(BalancesEvent::RefreshRequested {
						account_id: active.id.clone(),
						chain,
					}))
					.ok();
				self.publish_payment_toast(chain, &record);
			}
		}

		Ok(())
	}

	/// Raises the payment-sent toast when the record's asset resolves on
	/// the chain; an unknown asset promotes without one.
	fn publish_payment_toast(&self, chain: Chain, record: &HistoryRecord) {
		let Some(token) = self
			.chains
			.get(&chain)
			.and_then(|c| c.token_by_symbol(&record.asset_symbol))
		else {
			tracing::debug!(
				chain = %chain,
				asset = record.asset_symbol,
				"Asset not resolvable; promoting without toast"
			);
			return;
		};

		let amount = format_token_amount(&record.value.to_string(), token.decimals);
		self.event_bus
			.publish(WalletEvent::Toast(ToastEvent {
				kind: ToastKind::PaymentConfirmed,
				message: format!("Payment of {} {} sent", amount, token.symbol),
				emoji: "ok_hand".to_string(),
			}))
			.ok();
	}
}
