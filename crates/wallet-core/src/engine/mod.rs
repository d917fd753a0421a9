//! Core wallet engine that orchestrates estimation and reconciliation.
//!
//! This module contains the main WalletEngine struct which wires the
//! account, backend, RPC, history and bridge services together and runs
//! the main event loop: backend notifications feed the reconciliation
//! engine, dApp bridge events feed session bookkeeping and the fee
//! estimation dispatcher.

pub mod event_bus;
pub mod lifecycle;

pub use event_bus::EventBus;

use crate::estimation::{EstimationTracker, FeeEstimator, GasTracker};
use crate::history::HistoryService;
use crate::reconciliation::ReconciliationEngine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use wallet_accounts::AccountsService;
use wallet_backends::rpc::RpcService;
use wallet_backends::BackendService;
use wallet_config::Config;
use wallet_connect::{map_call_request, BridgeEvent, WalletConnectService};
use wallet_storage::StorageService;
use wallet_types::{AccountEvent, CallRequest, WalletEvent};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Service error: {0}")]
	Service(String),
}

/// Main wallet engine that orchestrates estimation and reconciliation.
#[derive(Clone)]
pub struct WalletEngine {
	/// Wallet configuration.
	pub(crate) config: Config,
	/// Storage service for persisted snapshots.
	pub(crate) storage: Arc<StorageService>,
	/// Account set and active-account selection.
	pub(crate) accounts: Arc<AccountsService>,
	/// Smart-wallet backend services.
	pub(crate) backends: Arc<BackendService>,
	/// Chain RPC providers.
	pub(crate) rpc: Arc<RpcService>,
	/// dApp bridge service, absent when not configured.
	pub(crate) walletconnect: Option<Arc<WalletConnectService>>,
	/// Event bus toward the UI layer.
	pub(crate) event_bus: EventBus,
	/// Per-account transaction history.
	pub(crate) history: Arc<HistoryService>,
	/// Shared gas price table.
	pub(crate) gas: Arc<GasTracker>,
	/// Estimation lifecycle state.
	pub(crate) estimation: Arc<EstimationTracker>,
	/// Fee estimation dispatcher.
	pub(crate) estimator: Arc<FeeEstimator>,
	/// Backend notification reconciliation.
	pub(crate) reconciliation: Arc<ReconciliationEngine>,
}

impl WalletEngine {
	/// Creates a new wallet engine with the given services.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		accounts: Arc<AccountsService>,
		backends: Arc<BackendService>,
		rpc: Arc<RpcService>,
		walletconnect: Option<Arc<WalletConnectService>>,
		history: Arc<HistoryService>,
		event_bus: EventBus,
	) -> Self {
		let gas = Arc::new(GasTracker::new(rpc.clone()));
		let estimation = Arc::new(EstimationTracker::new(event_bus.clone()));

		let estimator = Arc::new(FeeEstimator::new(
			accounts.clone(),
			backends.clone(),
			rpc.clone(),
			gas.clone(),
			estimation.clone(),
			config.chains.clone(),
			config.wallet.clone(),
		));

		let reconciliation = Arc::new(ReconciliationEngine::new(
			accounts.clone(),
			backends.clone(),
			history.clone(),
			config.chains.clone(),
			event_bus.clone(),
		));

		Self {
			config,
			storage,
			accounts,
			backends,
			rpc,
			walletconnect,
			event_bus,
			history,
			gas,
			estimation,
			estimator,
			reconciliation,
		}
	}

	/// Main execution loop for the wallet engine.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.initialize().await?;

		// Subscribe to backend notifications
		let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();
		self.backends.subscribe(notification_tx).await.map_err(|e| {
			EngineError::Service(format!("Failed to subscribe to backend notifications: {}", e))
		})?;

		// Start dApp bridges when configured
		let (bridge_tx, mut bridge_rx) = mpsc::unbounded_channel();
		if let Some(walletconnect) = &self.walletconnect {
			walletconnect.start_all(bridge_tx).await.map_err(|e| {
				EngineError::Service(format!("Failed to start WalletConnect bridges: {}", e))
			})?;
		}

		// Start gas price refresh task
		let gas = self.gas.clone();
		let refresh_interval = tokio::time::interval(Duration::from_secs(
			self.config.wallet.gas_refresh_interval_seconds,
		));
		let gas_handle = tokio::spawn(async move {
			let mut interval = refresh_interval;
			// The first tick fires immediately; initialization already
			// primed the table.
			interval.tick().await;
			loop {
				interval.tick().await;
				gas.refresh_all().await;
			}
		});

		// Start storage cleanup task
		let storage = self.storage.clone();
		let cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		let cleanup_handle = tokio::spawn(async move {
			let mut interval = cleanup_interval;
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					}
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					}
					_ => {} // No expired entries
				}
			}
		});

		let semaphore = Arc::new(Semaphore::new(100)); // Limit to 100 concurrent tasks

		loop {
			tokio::select! {
				// Handle backend notifications
				Some((chain, notification)) = notification_rx.recv() => {
					self.spawn_handler(&semaphore, move |engine| async move {
						engine.reconciliation.handle(chain, notification).await;
						Ok(())
					})
					.await;
				}

				// Handle dApp bridge events
				Some(event) = bridge_rx.recv() => {
					self.spawn_handler(&semaphore, move |engine| async move {
						engine.handle_bridge_event(event).await;
						Ok(())
					})
					.await;
				}

				// Shutdown signal
				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		// Cleanup
		gas_handle.abort();
		cleanup_handle.abort();

		self.shutdown().await?;

		Ok(())
	}

	/// Folds one bridge event into session state and, for transaction
	/// requests, into the estimation dispatcher.
	pub(crate) async fn handle_bridge_event(&self, event: BridgeEvent) {
		let Some(walletconnect) = &self.walletconnect else {
			return;
		};

		match event {
			BridgeEvent::SessionConnected(connector) => {
				tracing::info!(
					peer_id = %connector.peer_id,
					chain = %connector.chain,
					name = %connector.name,
					"dApp session connected"
				);
				walletconnect.add_connector(connector).await;
			}
			BridgeEvent::SessionDisconnected { peer_id } => {
				tracing::info!(peer_id = %peer_id, "dApp session disconnected");
				walletconnect.remove_connector(&peer_id).await;
			}
			BridgeEvent::CallRequestReceived(request) => {
				walletconnect.register_request(request.clone()).await;
				self.handle_call_request(walletconnect, request).await;
			}
		}
	}

	/// Kicks off estimation for an `eth_sendTransaction` request.
	///
	/// The request stays pending either way; a method or mapping problem
	/// only means no fee shows up alongside it.
	async fn handle_call_request(&self, walletconnect: &WalletConnectService, request: CallRequest) {
		if request.method != "eth_sendTransaction" {
			tracing::debug!(
				call_id = request.call_id,
				method = %request.method,
				"Call request needs no estimation"
			);
			return;
		}

		let Some(connector) = walletconnect
			.connectors()
			.await
			.into_iter()
			.find(|c| c.peer_id == request.peer_id)
		else {
			tracing::warn!(peer_id = %request.peer_id, "Call request from unknown session");
			return;
		};

		let chain = connector.chain;
		let Some(chain_config) = self.config.chains.get(&chain) else {
			tracing::warn!(chain = %chain, "Session chain is not configured");
			return;
		};

		match map_call_request(&request, chain_config) {
			Ok(intent) => {
				// A new dApp request supersedes whatever estimation was on
				// screen.
				self.estimation.reset().await;
				self.estimator.estimate(&[intent], chain).await;
			}
			Err(e) => {
				tracing::warn!(
					call_id = request.call_id,
					error = %e,
					"Call request could not be mapped for estimation"
				);
			}
		}
	}

	/// Switches the active account and announces the change on the bus.
	pub async fn set_active_account(&self, account_id: &str) -> Result<(), EngineError> {
		let account = self
			.accounts
			.set_active(account_id)
			.await
			.map_err(|e| EngineError::Service(format!("Failed to switch account: {}", e)))?;

		self.event_bus
			.publish(WalletEvent::Account(AccountEvent::Activated {
				account_id: account.id,
			}))
			.ok();
		Ok(())
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Returns a reference to the accounts service.
	pub fn accounts(&self) -> &Arc<AccountsService> {
		&self.accounts
	}

	/// Returns a reference to the backend service.
	pub fn backends(&self) -> &Arc<BackendService> {
		&self.backends
	}

	/// Returns a reference to the RPC service.
	pub fn rpc(&self) -> &Arc<RpcService> {
		&self.rpc
	}

	/// Returns a reference to the history service.
	pub fn history(&self) -> &Arc<HistoryService> {
		&self.history
	}

	/// Returns a reference to the estimation state tracker.
	pub fn estimation(&self) -> &Arc<EstimationTracker> {
		&self.estimation
	}

	/// Returns a reference to the fee estimation dispatcher.
	pub fn estimator(&self) -> &Arc<FeeEstimator> {
		&self.estimator
	}

	/// Returns the dApp bridge service, when configured.
	pub fn walletconnect(&self) -> Option<&WalletConnectService> {
		self.walletconnect.as_deref()
	}

	/// Helper method to spawn handler tasks with semaphore-based
	/// concurrency control.
	async fn spawn_handler<F, Fut>(&self, semaphore: &Arc<Semaphore>, handler: F)
	where
		F: FnOnce(WalletEngine) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
	{
		let engine = self.clone();
		match semaphore.clone().acquire_owned().await {
			Ok(permit) => {
				tokio::spawn(async move {
					let _permit = permit; // Keep permit alive for duration of task
					if let Err(e) = handler(engine).await {
						tracing::error!("Handler error: {}", e);
					}
				});
			}
			Err(e) => {
				tracing::error!("Failed to acquire semaphore permit: {}", e);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Address, U256};
	use async_trait::async_trait;
	use serde_json::json;
	use std::collections::HashMap;
	use wallet_accounts::{AccountError, SignerInterface};
	use wallet_backends::rpc::{ChainRpcInterface, RpcError};
	use wallet_backends::WalletBackendInterface;
	use wallet_config::{
		AccountsConfig, BackendsConfig, RpcConfig, StorageConfig, WalletSettings,
	};
	use wallet_storage::implementations::memory::MemoryStorage;
	use wallet_types::{
		AccountKind, Chain, ChainConfig, ChainTransaction, ConfigSchema, Connector, TokenConfig,
	};

	use crate::estimation::EstimationState;

	struct StubSigner;

	#[async_trait]
	impl SignerInterface for StubSigner {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not exercised in tests")
		}

		async fn address(&self) -> Result<Address, AccountError> {
			Ok(Address::repeat_byte(0x11))
		}
	}

	struct StubRpc;

	#[async_trait]
	impl ChainRpcInterface for StubRpc {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not exercised in tests")
		}

		async fn estimate_gas(
			&self,
			_chain: Chain,
			_from: Address,
			_transaction: &ChainTransaction,
		) -> Result<U256, RpcError> {
			Ok(U256::from(21_000u64))
		}

		async fn gas_price(&self, _chain: Chain) -> Result<U256, RpcError> {
			Ok(U256::from(10u64))
		}

		async fn balance(&self, _chain: Chain, _address: Address) -> Result<U256, RpcError> {
			Ok(U256::ZERO)
		}
	}

	fn config() -> Config {
		let mut chains = HashMap::new();
		chains.insert(
			Chain::Ethereum,
			ChainConfig {
				chain_id: 1,
				rpc_url: "http://localhost:8545".to_string(),
				tokens: vec![TokenConfig {
					address: Address::ZERO,
					symbol: "ETH".to_string(),
					decimals: 18,
				}],
			},
		);

		Config {
			wallet: WalletSettings {
				name: "test-wallet".to_string(),
				use_gas_token: false,
				preferred_gas_token: "PLR".to_string(),
				gas_refresh_interval_seconds: 60,
			},
			chains,
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: HashMap::new(),
				cleanup_interval_seconds: 3600,
			},
			accounts: AccountsConfig {
				primary: "local".to_string(),
				implementations: HashMap::new(),
			},
			backends: BackendsConfig {
				primary: "etherspot".to_string(),
				implementations: HashMap::new(),
			},
			rpc: RpcConfig {
				implementations: HashMap::new(),
			},
			walletconnect: None,
		}
	}

	fn engine() -> WalletEngine {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let accounts = Arc::new(AccountsService::new(Box::new(StubSigner), storage.clone()));

		let implementations: HashMap<String, Box<dyn WalletBackendInterface>> = HashMap::new();
		let backends = Arc::new(BackendService::new(
			implementations,
			"etherspot".to_string(),
		));

		let mut providers: HashMap<Chain, Arc<dyn ChainRpcInterface>> = HashMap::new();
		providers.insert(Chain::Ethereum, Arc::new(StubRpc));
		let rpc = Arc::new(RpcService::new(providers));

		let history = Arc::new(HistoryService::new(storage.clone()));
		let walletconnect = Some(Arc::new(WalletConnectService::new(Vec::new())));

		WalletEngine::new(
			config(),
			storage,
			accounts,
			backends,
			rpc,
			walletconnect,
			history,
			EventBus::new(64),
		)
	}

	fn connector(peer_id: &str) -> Connector {
		Connector {
			peer_id: peer_id.to_string(),
			chain: Chain::Ethereum,
			name: "dApp".to_string(),
			url: "https://dapp.example.com".to_string(),
			icon: None,
		}
	}

	fn send_request(peer_id: &str, call_id: u64) -> CallRequest {
		CallRequest {
			peer_id: peer_id.to_string(),
			call_id,
			method: "eth_sendTransaction".to_string(),
			params: vec![json!({
				"to": "0x2222222222222222222222222222222222222222",
				"value": "0xde0b6b3a7640000"
			})],
			name: "dApp".to_string(),
			url: "https://dapp.example.com".to_string(),
			icon: None,
		}
	}

	#[tokio::test]
	async fn test_bridge_session_lifecycle() {
		let engine = engine();

		engine
			.handle_bridge_event(BridgeEvent::SessionConnected(connector("peer-1")))
			.await;
		let connectors = engine.walletconnect().unwrap().connectors().await;
		assert_eq!(connectors.len(), 1);
		assert_eq!(connectors[0].peer_id, "peer-1");

		engine
			.handle_bridge_event(BridgeEvent::SessionDisconnected {
				peer_id: "peer-1".to_string(),
			})
			.await;
		assert!(engine.walletconnect().unwrap().connectors().await.is_empty());
	}

	#[tokio::test]
	async fn test_send_transaction_request_triggers_estimation() {
		let engine = engine();
		engine.accounts.ensure_key_based().await.unwrap();
		engine
			.handle_bridge_event(BridgeEvent::SessionConnected(connector("peer-1")))
			.await;

		engine
			.handle_bridge_event(BridgeEvent::CallRequestReceived(send_request("peer-1", 7)))
			.await;

		let pending = engine.walletconnect().unwrap().pending_requests().await;
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].call_id, 7);
		assert!(matches!(
			engine.estimation.state().await,
			EstimationState::Resolved(_)
		));
	}

	#[tokio::test]
	async fn test_non_transaction_request_skips_estimation() {
		let engine = engine();
		engine.accounts.ensure_key_based().await.unwrap();
		engine
			.handle_bridge_event(BridgeEvent::SessionConnected(connector("peer-1")))
			.await;

		let mut request = send_request("peer-1", 8);
		request.method = "personal_sign".to_string();
		engine
			.handle_bridge_event(BridgeEvent::CallRequestReceived(request))
			.await;

		// Registered for approval, but no fee was computed.
		assert_eq!(
			engine.walletconnect().unwrap().pending_requests().await.len(),
			1
		);
		assert_eq!(engine.estimation.state().await, EstimationState::Idle);
	}

	#[tokio::test]
	async fn test_request_from_unknown_session_is_dropped() {
		let engine = engine();
		engine.accounts.ensure_key_based().await.unwrap();

		engine
			.handle_bridge_event(BridgeEvent::CallRequestReceived(send_request("ghost", 9)))
			.await;

		assert_eq!(engine.estimation.state().await, EstimationState::Idle);
	}

	#[tokio::test]
	async fn test_account_switch_publishes_activation() {
		let engine = engine();
		engine.accounts.ensure_key_based().await.unwrap();
		let smart = engine
			.accounts
			.upsert_smart_wallet(
				AccountKind::EtherspotSmartWallet,
				"0xAbC0000000000000000000000000000000000001",
			)
			.await
			.unwrap();
		let mut events = engine.event_bus().subscribe();

		engine.set_active_account(&smart.id).await.unwrap();

		let active = engine.accounts.active_account().await.unwrap();
		assert_eq!(active.id, smart.id);
		assert!(matches!(
			events.recv().await.unwrap(),
			WalletEvent::Account(AccountEvent::Activated { account_id }) if account_id == smart.id
		));

		assert!(engine.set_active_account("0xmissing").await.is_err());
	}
}
