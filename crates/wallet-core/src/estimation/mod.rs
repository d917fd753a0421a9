//! Fee estimation dispatcher.
//!
//! This module prices transfer intents for the active account. Dispatch is
//! exhaustive over the account kind: key-based accounts estimate a single
//! transaction against the chain RPC with a 50% gas margin, Etherspot
//! accounts estimate through the gateway batch and Archanova accounts
//! estimate directly. Results land in a tri-state tracker whose generation
//! counter discards superseded requests, and every transition is published
//! on the event bus.

pub mod builder;
pub mod gas;

pub use gas::{GasInfo, GasPrices, GasTracker};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use wallet_accounts::AccountsService;
use wallet_backends::rpc::{RpcError, RpcService};
use wallet_backends::{BackendError, BackendService};
use wallet_config::WalletSettings;
use wallet_types::{
	Account, AccountKind, Chain, ChainTransaction, ChainsConfig, EstimationEvent, ToastEvent,
	ToastKind, TokenConfig, TransactionFeeInfo, TransactionToEstimate, WalletEvent,
};

use crate::engine::EventBus;

/// User-facing message for any estimation failure; detail stays in logs.
pub const ESTIMATION_FAILED_MESSAGE: &str = "Transaction fee estimation failed";

/// Errors that can occur during fee estimation.
///
/// All of these resolve to the same generic user-facing message; the
/// variants exist for logging and tests.
#[derive(Debug, Error)]
pub enum EstimationError {
	/// Error that occurs when an intent cannot be built into a transaction.
	#[error("Transaction build failed: {0}")]
	Build(String),
	/// Error that occurs in a smart-wallet backend call.
	#[error("Backend error: {0}")]
	Backend(#[from] BackendError),
	/// Error that occurs in a chain RPC call.
	#[error("RPC error: {0}")]
	Rpc(#[from] RpcError),
	/// Error that occurs when the chain has no fetched gas price.
	#[error("Gas price not available for chain: {0}")]
	GasPriceUnavailable(Chain),
	/// Error that occurs when there is nothing to estimate.
	#[error("Nothing to estimate")]
	Empty,
}

/// Where the current estimation request stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EstimationState {
	/// No estimation has been requested.
	Idle,
	/// A request is in flight; any prior result is stale.
	Estimating,
	/// The latest request produced usable fee info.
	Resolved(TransactionFeeInfo),
	/// The latest request failed with a user-facing message.
	Failed(String),
}

/// Tracks the estimation lifecycle and discards superseded results.
///
/// Every `begin` bumps the generation; a resolve or fail carrying an older
/// generation lost the race and is dropped without touching state.
pub struct EstimationTracker {
	/// Generation of the most recent request.
	generation: AtomicU64,
	/// Current lifecycle state.
	state: Mutex<EstimationState>,
	/// Bus the transitions are published on.
	event_bus: EventBus,
}

impl EstimationTracker {
	/// Creates a new tracker in the idle state.
	pub fn new(event_bus: EventBus) -> Self {
		Self {
			generation: AtomicU64::new(0),
			state: Mutex::new(EstimationState::Idle),
			event_bus,
		}
	}

	/// Enters the estimating state and returns the new generation.
	pub async fn begin(&self, chain: Chain) -> u64 {
		let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
		*self.state.lock().await = EstimationState::Estimating;
		self.event_bus
			.publish(WalletEvent::Estimation(EstimationEvent::Started {
				chain,
				generation,
			}))
			.ok();
		generation
	}

	/// Resolves the request if it is still the current generation.
	///
	/// Returns false when the result was superseded and discarded.
	pub async fn resolve(
		&self,
		chain: Chain,
		generation: u64,
		fee_info: TransactionFeeInfo,
	) -> bool {
		let mut state = self.state.lock().await;
		if generation != self.generation.load(Ordering::SeqCst) {
			tracing::debug!(chain = %chain, generation, "Discarding superseded estimation result");
			return false;
		}

		*state = EstimationState::Resolved(fee_info.clone());
		self.event_bus
			.publish(WalletEvent::Estimation(EstimationEvent::Resolved {
				chain,
				fee_info,
			}))
			.ok();
		true
	}

	/// Fails the request if it is still the current generation.
	///
	/// A current failure also raises the estimation-failed toast; consumers
	/// replace a visible toast of the same kind rather than stacking.
	pub async fn fail(&self, chain: Chain, generation: u64, message: &str) -> bool {
		let mut state = self.state.lock().await;
		if generation != self.generation.load(Ordering::SeqCst) {
			tracing::debug!(chain = %chain, generation, "Discarding superseded estimation failure");
			return false;
		}

		*state = EstimationState::Failed(message.to_string());
		self.event_bus
			.publish(WalletEvent::Estimation(EstimationEvent::Failed {
				chain,
				message: message.to_string(),
			}))
			.ok();
		self.event_bus
			.publish(WalletEvent::Toast(ToastEvent {
				kind: ToastKind::EstimationFailed,
				message: message.to_string(),
				emoji: "hushed".to_string(),
			}))
			.ok();
		true
	}

	/// Clears the state back to idle.
	///
	/// The reset counts as a new generation, so an in-flight request cannot
	/// resurface a result afterwards.
	pub async fn reset(&self) {
		let mut state = self.state.lock().await;
		self.generation.fetch_add(1, Ordering::SeqCst);
		*state = EstimationState::Idle;
	}

	/// Returns the current estimation state.
	pub async fn state(&self) -> EstimationState {
		self.state.lock().await.clone()
	}
}

/// Dispatches fee estimation across the account-kind branches.
pub struct FeeEstimator {
	/// Account set; the active account decides the branch.
	accounts: Arc<AccountsService>,
	/// Smart-wallet backends for the batch and direct estimates.
	backends: Arc<BackendService>,
	/// Chain RPC providers for the key-based estimate.
	rpc: Arc<RpcService>,
	/// Shared gas price table, refreshed by the key-based branch.
	gas: Arc<GasTracker>,
	/// Lifecycle state the results land in.
	tracker: Arc<EstimationTracker>,
	/// Per-chain asset tables for gas-token lookup.
	chains: ChainsConfig,
	/// Gas-token preference.
	settings: WalletSettings,
}

impl FeeEstimator {
	/// Creates a new estimator over the given services.
	pub fn new(
		accounts: Arc<AccountsService>,
		backends: Arc<BackendService>,
		rpc: Arc<RpcService>,
		gas: Arc<GasTracker>,
		tracker: Arc<EstimationTracker>,
		chains: ChainsConfig,
		settings: WalletSettings,
	) -> Self {
		Self {
			accounts,
			backends,
			rpc,
			gas,
			tracker,
			chains,
			settings,
		}
	}

	/// Runs one estimation request for the given intents on the chain.
	///
	/// Without an active account the request is dropped before any state is
	/// touched, as is a multi-intent request on a key-based account, which
	/// cannot batch. Everything else resolves the tracker to exactly one of
	/// fee info or the generic error.
	pub async fn estimate(&self, intents: &[TransactionToEstimate], chain: Chain) {
		let Some(account) = self.accounts.active_account().await else {
			tracing::warn!(chain = %chain, "No active account; estimation request dropped");
			return;
		};

		if account.kind == AccountKind::KeyBased && intents.len() > 1 {
			tracing::warn!(
				chain = %chain,
				count = intents.len(),
				"Key-based accounts estimate a single transaction; request dropped"
			);
			return;
		}

		let generation = self.tracker.begin(chain).await;

		match self.estimate_inner(&account, intents, chain).await {
			Ok(fee_info) if fee_info.fee.is_zero() => {
				tracing::warn!(chain = %chain, "Estimation produced a zero fee");
				self.tracker
					.fail(chain, generation, ESTIMATION_FAILED_MESSAGE)
					.await;
			}
			Ok(fee_info) => {
				self.tracker.resolve(chain, generation, fee_info).await;
			}
			Err(e) => {
				tracing::error!(
					chain = %chain,
					error = %e,
					intents = ?intents,
					"Fee estimation failed"
				);
				self.tracker
					.fail(chain, generation, ESTIMATION_FAILED_MESSAGE)
					.await;
			}
		}
	}

	async fn estimate_inner(
		&self,
		account: &Account,
		intents: &[TransactionToEstimate],
		chain: Chain,
	) -> Result<TransactionFeeInfo, EstimationError> {
		let transactions = intents
			.iter()
			.map(builder::build_transaction)
			.collect::<Result<Vec<_>, _>>()?;

		match account.kind {
			AccountKind::KeyBased => self.estimate_key_based(account, &transactions, chain).await,
			AccountKind::ArchanovaSmartWallet | AccountKind::EtherspotSmartWallet => {
				let gas_token = self.gas_token_for(chain);
				let raw = self
					.backends
					.estimate_smart_wallet(account, chain, &transactions, gas_token.as_ref())
					.await?;
				Ok(raw.to_fee_info(gas_token))
			}
		}
	}

	/// Prices a single transaction against the chain RPC.
	///
	/// The node's estimate is padded with a 50% margin in integer gas units
	/// and priced at the instant tier of a freshly refreshed gas table.
	async fn estimate_key_based(
		&self,
		account: &Account,
		transactions: &[ChainTransaction],
		chain: Chain,
	) -> Result<TransactionFeeInfo, EstimationError> {
		let transaction = transactions.first().ok_or(EstimationError::Empty)?;
		let from: Address = account
			.address
			.parse()
			.map_err(|e| EstimationError::Build(format!("Invalid account address: {}", e)))?;

		let raw_gas = self.rpc.estimate_gas(chain, from, transaction).await?;
		let padded_gas = raw_gas + raw_gas / U256::from(2u64);

		self.gas.refresh(chain).await?;
		let instant = self
			.gas
			.info(chain)
			.await
			.and_then(|info| info.instant())
			.ok_or(EstimationError::GasPriceUnavailable(chain))?;

		Ok(TransactionFeeInfo {
			fee: padded_gas.saturating_mul(instant),
			gas_price: Some(instant),
			gas_token: None,
		})
	}

	/// Resolves the preferred gas token on the chain, when enabled.
	///
	/// A preference that does not resolve to a supported non-native asset
	/// silently falls back to paying in the native asset.
	fn gas_token_for(&self, chain: Chain) -> Option<TokenConfig> {
		if !self.settings.use_gas_token {
			return None;
		}

		self.chains
			.get(&chain)?
			.token_by_symbol(&self.settings.preferred_gas_token)
			.filter(|token| !token.is_native())
			.cloned()
	}
}
