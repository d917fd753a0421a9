//! Wallet backend module for the wallet transaction engine.
//!
//! This module handles communication with the smart-wallet backend services.
//! It provides abstractions over the batching gateway used by Etherspot
//! accounts and the legacy Archanova service, routing each request to the
//! implementation serving the account's kind. Direct chain RPC access for
//! key-based accounts lives in the [`rpc`] module.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use wallet_types::{
	Account, AccountExtra, AccountKind, BackendNotification, Chain, ChainTransaction, ConfigSchema,
	ImplementationRegistry, RawBatchEstimate, SubmittedBatch, TokenConfig,
};

/// Re-export implementations
pub mod implementations {
	pub mod archanova;
	pub mod etherspot;
	pub mod evm {
		pub mod alloy;
	}
}

/// Direct chain RPC access for key-based estimation.
pub mod rpc;

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
	/// Error that occurs during communication with the backend service.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when a requested batch does not exist on the backend.
	#[error("Batch not found: {0}")]
	BatchNotFound(String),
	/// Error that occurs when an implementation does not support an operation.
	#[error("Operation not supported: {0}")]
	Unsupported(&'static str),
	/// Error that occurs when subscribing while a subscription is already active.
	#[error("Already subscribed")]
	AlreadySubscribed,
	/// Error that occurs when no backend serves the requested account kind.
	#[error("No backend available for account kind: {0}")]
	NoBackendAvailable(AccountKind),
	/// Error that occurs when a named implementation is not configured.
	#[error("Backend implementation not found: {0}")]
	NotFound(String),
}

/// Trait defining the interface for wallet backend implementations.
///
/// This trait must be implemented by any backend that wants to integrate
/// with the wallet engine. It covers the batching gateway operations used
/// during fee estimation, account synchronization, and the notification
/// stream the reconciliation engine consumes.
#[async_trait]
pub trait WalletBackendInterface: Send + Sync {
	/// Returns the configuration schema for this backend implementation.
	///
	/// This allows each implementation to define its own configuration
	/// requirements with specific validation rules. The schema is used to
	/// validate TOML configuration before initializing the backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Drops any pending batch for the account on the chain.
	///
	/// Estimation starts from a cleared batch; a failure here must abort the
	/// whole estimate rather than risk pricing stale transactions.
	async fn clear_batch(&self, account: &Account, chain: Chain) -> Result<(), BackendError>;

	/// Appends one transaction to the account's pending batch on the chain.
	async fn append_to_batch(
		&self,
		account: &Account,
		chain: Chain,
		transaction: &ChainTransaction,
	) -> Result<(), BackendError>;

	/// Estimates the account's pending batch as it would be submitted.
	///
	/// When a gas token is given the backend also prices the submission in
	/// that token, reported through
	/// [`RawBatchEstimate::gas_token_cost`].
	async fn estimate_batch(
		&self,
		account: &Account,
		chain: Chain,
		gas_token: Option<&TokenConfig>,
	) -> Result<RawBatchEstimate, BackendError>;

	/// Estimates the given transactions directly, without batch state.
	async fn estimate_transactions(
		&self,
		account: &Account,
		chain: Chain,
		transactions: &[ChainTransaction],
		gas_token: Option<&TokenConfig>,
	) -> Result<RawBatchEstimate, BackendError>;

	/// Resolves a submitted batch by its hash.
	async fn submitted_batch(
		&self,
		chain: Chain,
		batch_hash: &str,
	) -> Result<SubmittedBatch, BackendError>;

	/// Fetches the addresses of all smart-wallet accounts known to the
	/// backend for the configured key.
	async fn fetch_accounts(&self) -> Result<Vec<String>, BackendError>;

	/// Fetches the account's per-chain state from the backend.
	async fn fetch_account_chains(
		&self,
		account: &Account,
	) -> Result<HashMap<Chain, AccountExtra>, BackendError>;

	/// Starts streaming backend notifications through the provided channel.
	///
	/// The implementation should keep delivering notifications until
	/// stop_notifications is called or the receiver is dropped.
	async fn start_notifications(
		&self,
		sender: mpsc::UnboundedSender<(Chain, BackendNotification)>,
	) -> Result<(), BackendError>;

	/// Stops streaming backend notifications.
	async fn stop_notifications(&self) -> Result<(), BackendError>;
}

/// Type alias for backend factory functions.
///
/// This is the function signature that all backend implementations must
/// provide to create instances of their backend interface.
pub type BackendFactory = fn(&toml::Value) -> Result<Box<dyn WalletBackendInterface>, BackendError>;

/// Registry trait for backend implementations.
pub trait BackendRegistry: ImplementationRegistry<Factory = BackendFactory> {}

/// Get all registered backend implementations.
pub fn get_all_implementations() -> Vec<(&'static str, BackendFactory)> {
	use implementations::{archanova, etherspot};

	vec![
		(etherspot::Registry::NAME, etherspot::Registry::factory()),
		(archanova::Registry::NAME, archanova::Registry::factory()),
	]
}

/// Service that routes backend requests to the implementation serving each
/// account kind.
///
/// The service owns the per-(account, chain) locks that serialize batch
/// mutation on the gateway, and the guard keeping the notification stream a
/// single subscription.
pub struct BackendService {
	/// Backend implementations keyed by configuration name.
	implementations: HashMap<String, Box<dyn WalletBackendInterface>>,
	/// Implementation the notification stream is taken from.
	primary: String,
	/// Per-(account, chain) locks serializing clear, append and estimate
	/// against the shared gateway batch.
	batch_locks: Mutex<HashMap<(String, Chain), Arc<Mutex<()>>>>,
	/// Flag indicating if the notification stream is already subscribed.
	subscribed: AtomicBool,
}

impl BackendService {
	/// Creates a new BackendService with the specified implementations.
	///
	/// The primary name selects the implementation whose notification stream
	/// drives reconciliation.
	pub fn new(
		implementations: HashMap<String, Box<dyn WalletBackendInterface>>,
		primary: String,
	) -> Self {
		Self {
			implementations,
			primary,
			batch_locks: Mutex::new(HashMap::new()),
			subscribed: AtomicBool::new(false),
		}
	}

	/// Returns the implementation serving the given account kind.
	///
	/// Key-based accounts have no backend; they estimate through the chain
	/// RPC instead.
	pub fn backend_for_kind(
		&self,
		kind: AccountKind,
	) -> Result<&dyn WalletBackendInterface, BackendError> {
		let name = match kind {
			AccountKind::EtherspotSmartWallet => implementations::etherspot::Registry::NAME,
			AccountKind::ArchanovaSmartWallet => implementations::archanova::Registry::NAME,
			AccountKind::KeyBased => return Err(BackendError::NoBackendAvailable(kind)),
		};

		self.implementations
			.get(name)
			.map(|b| b.as_ref())
			.ok_or(BackendError::NoBackendAvailable(kind))
	}

	/// Returns the implementation reconciliation listens to.
	pub fn primary(&self) -> Result<&dyn WalletBackendInterface, BackendError> {
		self.implementations
			.get(&self.primary)
			.map(|b| b.as_ref())
			.ok_or_else(|| BackendError::NotFound(self.primary.clone()))
	}

	/// Returns the lock guarding the account's batch on the chain.
	async fn batch_lock(&self, account: &Account, chain: Chain) -> Arc<Mutex<()>> {
		let mut locks = self.batch_locks.lock().await;
		locks
			.entry((account.id.clone(), chain))
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	/// Estimates a smart-wallet submission for the account on the chain.
	///
	/// Etherspot accounts go through the gateway batch: the batch is cleared,
	/// rebuilt from the given transactions and estimated while holding the
	/// account's batch lock, so concurrent estimates cannot interleave their
	/// batch state. Archanova accounts estimate directly.
	pub async fn estimate_smart_wallet(
		&self,
		account: &Account,
		chain: Chain,
		transactions: &[ChainTransaction],
		gas_token: Option<&TokenConfig>,
	) -> Result<RawBatchEstimate, BackendError> {
		match account.kind {
			AccountKind::EtherspotSmartWallet => {
				let backend = self.backend_for_kind(account.kind)?;
				let lock = self.batch_lock(account, chain).await;
				let _guard = lock.lock().await;

				backend.clear_batch(account, chain).await?;
				for transaction in transactions {
					backend.append_to_batch(account, chain, transaction).await?;
				}
				backend.estimate_batch(account, chain, gas_token).await
			}
			AccountKind::ArchanovaSmartWallet => {
				let backend = self.backend_for_kind(account.kind)?;
				backend
					.estimate_transactions(account, chain, transactions, gas_token)
					.await
			}
			AccountKind::KeyBased => Err(BackendError::NoBackendAvailable(account.kind)),
		}
	}

	/// Resolves a submitted batch through the primary backend.
	pub async fn submitted_batch(
		&self,
		chain: Chain,
		batch_hash: &str,
	) -> Result<SubmittedBatch, BackendError> {
		self.primary()?.submitted_batch(chain, batch_hash).await
	}

	/// Fetches the smart-wallet account addresses known to the backend
	/// serving the given kind.
	pub async fn fetch_accounts(&self, kind: AccountKind) -> Result<Vec<String>, BackendError> {
		self.backend_for_kind(kind)?.fetch_accounts().await
	}

	/// Fetches the account's per-chain state from its backend.
	pub async fn fetch_account_chains(
		&self,
		account: &Account,
	) -> Result<HashMap<Chain, AccountExtra>, BackendError> {
		self.backend_for_kind(account.kind)?
			.fetch_account_chains(account)
			.await
	}

	/// Subscribes the given channel to the primary backend's notification
	/// stream.
	///
	/// At most one subscription may be live at a time; the reconciliation
	/// engine owns it for the lifetime of the engine.
	pub async fn subscribe(
		&self,
		sender: mpsc::UnboundedSender<(Chain, BackendNotification)>,
	) -> Result<(), BackendError> {
		let backend = self.primary()?;

		if self.subscribed.swap(true, Ordering::SeqCst) {
			return Err(BackendError::AlreadySubscribed);
		}

		if let Err(e) = backend.start_notifications(sender).await {
			self.subscribed.store(false, Ordering::SeqCst);
			return Err(e);
		}

		Ok(())
	}

	/// Tears down the active notification subscription, if any.
	pub async fn unsubscribe(&self) -> Result<(), BackendError> {
		if !self.subscribed.swap(false, Ordering::SeqCst) {
			return Ok(());
		}

		self.primary()?.stop_notifications().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Address, U256};
	use std::sync::Mutex as StdMutex;

	/// Backend stub recording the order of batch operations.
	struct RecordingBackend {
		calls: Arc<StdMutex<Vec<String>>>,
		fail_clear: bool,
	}

	#[async_trait]
	impl WalletBackendInterface for RecordingBackend {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not exercised in tests")
		}

		async fn clear_batch(&self, _account: &Account, _chain: Chain) -> Result<(), BackendError> {
			self.calls.lock().unwrap().push("clear".to_string());
			if self.fail_clear {
				return Err(BackendError::Network("clear rejected".to_string()));
			}
			Ok(())
		}

		async fn append_to_batch(
			&self,
			_account: &Account,
			_chain: Chain,
			_transaction: &ChainTransaction,
		) -> Result<(), BackendError> {
			self.calls.lock().unwrap().push("append".to_string());
			Ok(())
		}

		async fn estimate_batch(
			&self,
			_account: &Account,
			_chain: Chain,
			_gas_token: Option<&TokenConfig>,
		) -> Result<RawBatchEstimate, BackendError> {
			self.calls.lock().unwrap().push("estimate".to_string());
			Ok(RawBatchEstimate {
				estimated_gas: U256::from(21000u64),
				estimated_gas_price: U256::from(2u64),
				gas_token_cost: None,
			})
		}

		async fn estimate_transactions(
			&self,
			_account: &Account,
			_chain: Chain,
			_transactions: &[ChainTransaction],
			_gas_token: Option<&TokenConfig>,
		) -> Result<RawBatchEstimate, BackendError> {
			self.calls.lock().unwrap().push("direct".to_string());
			Ok(RawBatchEstimate {
				estimated_gas: U256::from(30000u64),
				estimated_gas_price: U256::from(3u64),
				gas_token_cost: None,
			})
		}

		async fn submitted_batch(
			&self,
			_chain: Chain,
			batch_hash: &str,
		) -> Result<SubmittedBatch, BackendError> {
			Err(BackendError::BatchNotFound(batch_hash.to_string()))
		}

		async fn fetch_accounts(&self) -> Result<Vec<String>, BackendError> {
			Ok(vec![])
		}

		async fn fetch_account_chains(
			&self,
			_account: &Account,
		) -> Result<HashMap<Chain, AccountExtra>, BackendError> {
			Ok(HashMap::new())
		}

		async fn start_notifications(
			&self,
			_sender: mpsc::UnboundedSender<(Chain, BackendNotification)>,
		) -> Result<(), BackendError> {
			self.calls.lock().unwrap().push("subscribe".to_string());
			Ok(())
		}

		async fn stop_notifications(&self) -> Result<(), BackendError> {
			self.calls.lock().unwrap().push("unsubscribe".to_string());
			Ok(())
		}
	}

	fn service_with(
		fail_clear: bool,
	) -> (BackendService, Arc<StdMutex<Vec<String>>>) {
		let calls = Arc::new(StdMutex::new(Vec::new()));
		let backend = RecordingBackend {
			calls: calls.clone(),
			fail_clear,
		};
		let mut implementations: HashMap<String, Box<dyn WalletBackendInterface>> = HashMap::new();
		implementations.insert("etherspot".to_string(), Box::new(backend));
		(
			BackendService::new(implementations, "etherspot".to_string()),
			calls,
		)
	}

	fn etherspot_account() -> Account {
		Account::new(
			"0x7c78E038F3b2A8A8f0E1a405382a50C702DD4875",
			AccountKind::EtherspotSmartWallet,
		)
	}

	fn transfer() -> ChainTransaction {
		ChainTransaction {
			to: Address::ZERO,
			data: "0x".to_string(),
			value: U256::from(1u64),
		}
	}

	#[tokio::test]
	async fn test_estimate_runs_clear_append_estimate_in_order() {
		let (service, calls) = service_with(false);
		let account = etherspot_account();
		let transactions = [transfer(), transfer()];

		let estimate = service
			.estimate_smart_wallet(&account, Chain::Ethereum, &transactions, None)
			.await
			.unwrap();

		assert_eq!(estimate.estimated_gas, U256::from(21000u64));
		assert_eq!(
			*calls.lock().unwrap(),
			vec!["clear", "append", "append", "estimate"]
		);
	}

	#[tokio::test]
	async fn test_clear_failure_aborts_estimate() {
		let (service, calls) = service_with(true);
		let account = etherspot_account();
		let transactions = [transfer()];

		let result = service
			.estimate_smart_wallet(&account, Chain::Ethereum, &transactions, None)
			.await;

		assert!(matches!(result, Err(BackendError::Network(_))));
		// Nothing was appended or estimated after the failed clear.
		assert_eq!(*calls.lock().unwrap(), vec!["clear"]);
	}

	#[tokio::test]
	async fn test_key_based_accounts_have_no_backend() {
		let (service, _) = service_with(false);
		let account = Account::new("0xKey", AccountKind::KeyBased);

		let result = service
			.estimate_smart_wallet(&account, Chain::Ethereum, &[transfer()], None)
			.await;

		assert!(matches!(result, Err(BackendError::NoBackendAvailable(_))));
	}

	#[tokio::test]
	async fn test_second_subscription_is_rejected() {
		let (service, calls) = service_with(false);
		let (tx, _rx) = mpsc::unbounded_channel();
		let (tx2, _rx2) = mpsc::unbounded_channel();

		service.subscribe(tx).await.unwrap();
		let second = service.subscribe(tx2).await;

		assert!(matches!(second, Err(BackendError::AlreadySubscribed)));
		assert_eq!(*calls.lock().unwrap(), vec!["subscribe"]);

		service.unsubscribe().await.unwrap();
		assert_eq!(*calls.lock().unwrap(), vec!["subscribe", "unsubscribe"]);
	}
}
