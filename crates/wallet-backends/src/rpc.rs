//! Direct chain RPC access for key-based estimation.
//!
//! Key-based accounts estimate and price transactions against the chain
//! itself rather than through a wallet backend. This module defines the RPC
//! abstraction and the service routing each request to the provider
//! configured for its chain.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use wallet_types::{Chain, ChainTransaction, ChainsConfig, ConfigSchema, ImplementationRegistry};

/// Errors that can occur during chain RPC operations.
#[derive(Debug, Error)]
pub enum RpcError {
	/// Error that occurs during network communication with the node.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when no provider is configured for the chain.
	#[error("No provider available for chain: {0}")]
	NoProviderAvailable(Chain),
}

/// Trait defining the interface for chain RPC implementations.
#[async_trait]
pub trait ChainRpcInterface: Send + Sync {
	/// Returns the configuration schema for this RPC implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Estimates the gas required to execute the transaction from the given
	/// sender, as reported by the node with no margin applied.
	async fn estimate_gas(
		&self,
		chain: Chain,
		from: Address,
		transaction: &ChainTransaction,
	) -> Result<U256, RpcError>;

	/// Gets the node's current gas price in wei.
	async fn gas_price(&self, chain: Chain) -> Result<U256, RpcError>;

	/// Gets the native balance of an address in wei.
	async fn balance(&self, chain: Chain, address: Address) -> Result<U256, RpcError>;
}

/// Type alias for RPC factory functions.
///
/// Factories receive the chains configuration alongside their own table so
/// an implementation can resolve RPC endpoints for the chains it serves.
pub type RpcFactory =
	fn(&toml::Value, &ChainsConfig) -> Result<Box<dyn ChainRpcInterface>, RpcError>;

/// Registry trait for RPC implementations.
pub trait RpcRegistry: ImplementationRegistry<Factory = RpcFactory> {}

/// Get all registered RPC implementations.
pub fn get_all_implementations() -> Vec<(&'static str, RpcFactory)> {
	use crate::implementations::evm;

	vec![(evm::alloy::Registry::NAME, evm::alloy::Registry::factory())]
}

/// Service that routes RPC requests to the provider serving each chain.
///
/// One implementation instance may serve several chains; the map holds a
/// shared handle per chain it covers.
pub struct RpcService {
	/// Map of chains to their RPC providers.
	providers: HashMap<Chain, Arc<dyn ChainRpcInterface>>,
}

impl RpcService {
	/// Creates a new RpcService with the specified providers.
	pub fn new(providers: HashMap<Chain, Arc<dyn ChainRpcInterface>>) -> Self {
		Self { providers }
	}

	fn provider(&self, chain: Chain) -> Result<&dyn ChainRpcInterface, RpcError> {
		self.providers
			.get(&chain)
			.map(|p| p.as_ref())
			.ok_or(RpcError::NoProviderAvailable(chain))
	}

	/// Estimates gas for the transaction on the chain it targets.
	pub async fn estimate_gas(
		&self,
		chain: Chain,
		from: Address,
		transaction: &ChainTransaction,
	) -> Result<U256, RpcError> {
		self.provider(chain)?
			.estimate_gas(chain, from, transaction)
			.await
	}

	/// Gets the current gas price on the chain in wei.
	pub async fn gas_price(&self, chain: Chain) -> Result<U256, RpcError> {
		self.provider(chain)?.gas_price(chain).await
	}

	/// Gets the native balance of an address on the chain in wei.
	pub async fn balance(&self, chain: Chain, address: Address) -> Result<U256, RpcError> {
		self.provider(chain)?.balance(chain, address).await
	}

	/// Returns the chains this service has a provider for.
	pub fn chains(&self) -> Vec<Chain> {
		self.providers.keys().copied().collect()
	}
}
