//! Alloy-based chain RPC implementation.
//!
//! This implementation uses the Alloy library to talk to EVM nodes directly.
//! It serves the key-based estimation path: raw gas estimation, gas price
//! reads and native balance lookups. Supports multiple chains with a single
//! instance.

use crate::rpc::{ChainRpcInterface, RpcError, RpcFactory, RpcRegistry};
use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::TransactionRequest;
use alloy_transport_http::Http;
use async_trait::async_trait;
use std::collections::HashMap;
use wallet_types::{
	without_0x_prefix, Chain, ChainTransaction, ChainsConfig, ConfigSchema, Field, FieldType,
	ImplementationRegistry, Schema, ValidationError,
};

/// Alloy-based RPC implementation.
pub struct AlloyRpc {
	/// Alloy providers for each supported chain.
	providers: HashMap<Chain, RootProvider<Http<reqwest::Client>>>,
}

impl AlloyRpc {
	/// Creates a new AlloyRpc instance serving the given chains.
	///
	/// Each chain's RPC URL is taken from the chains configuration; a chain
	/// without configuration is a setup error surfaced immediately.
	pub fn new(chains: Vec<Chain>, chains_config: &ChainsConfig) -> Result<Self, RpcError> {
		if chains.is_empty() {
			return Err(RpcError::Network(
				"At least one chain must be specified".to_string(),
			));
		}

		let mut providers = HashMap::new();

		for chain in chains {
			let chain_config = chains_config
				.get(&chain)
				.ok_or(RpcError::NoProviderAvailable(chain))?;

			let provider = RootProvider::new_http(
				chain_config
					.rpc_url
					.parse()
					.map_err(|e| RpcError::Network(format!("Invalid RPC URL: {}", e)))?,
			);

			providers.insert(chain, provider);
		}

		Ok(Self { providers })
	}

	fn provider(&self, chain: Chain) -> Result<&RootProvider<Http<reqwest::Client>>, RpcError> {
		self.providers
			.get(&chain)
			.ok_or(RpcError::NoProviderAvailable(chain))
	}
}

/// Configuration schema for the Alloy RPC implementation.
pub struct AlloyRpcSchema;

impl AlloyRpcSchema {
	/// Static validation method for use before instance creation
	pub fn validate_config(config: &toml::Value) -> Result<(), ValidationError> {
		let instance = Self;
		instance.validate(config)
	}
}

impl ConfigSchema for AlloyRpcSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![],
			// Optional fields
			vec![
				Field::new("chains", FieldType::Array(Box::new(FieldType::String)))
					.with_validator(|value| {
						if let Some(arr) = value.as_array() {
							for entry in arr {
								let name = entry.as_str().unwrap_or("");
								if name.parse::<Chain>().is_err() {
									return Err(format!("Unknown chain: {}", name));
								}
							}
							Ok(())
						} else {
							Err("chains must be an array".to_string())
						}
					}),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl ChainRpcInterface for AlloyRpc {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyRpcSchema)
	}

	async fn estimate_gas(
		&self,
		chain: Chain,
		from: Address,
		transaction: &ChainTransaction,
	) -> Result<U256, RpcError> {
		let provider = self.provider(chain)?;

		let call_data = hex::decode(without_0x_prefix(&transaction.data))
			.map_err(|e| RpcError::Network(format!("Invalid transaction data: {}", e)))?;

		let request = TransactionRequest::default()
			.from(from)
			.to(transaction.to)
			.value(transaction.value)
			.input(call_data.into());

		let gas = provider
			.estimate_gas(&request)
			.await
			.map_err(|e| RpcError::Network(format!("Failed to estimate gas: {}", e)))?;

		Ok(U256::from(gas))
	}

	async fn gas_price(&self, chain: Chain) -> Result<U256, RpcError> {
		let provider = self.provider(chain)?;

		let gas_price = provider
			.get_gas_price()
			.await
			.map_err(|e| RpcError::Network(format!("Failed to get gas price: {}", e)))?;

		Ok(U256::from(gas_price))
	}

	async fn balance(&self, chain: Chain, address: Address) -> Result<U256, RpcError> {
		let provider = self.provider(chain)?;

		provider
			.get_balance(address)
			.await
			.map_err(|e| RpcError::Network(format!("Failed to get balance: {}", e)))
	}
}

/// Factory function to create an Alloy RPC provider from configuration.
///
/// Optional configuration parameters:
/// - `chains`: Chain names to serve (defaults to every configured chain)
pub fn create_rpc(
	config: &toml::Value,
	chains_config: &ChainsConfig,
) -> Result<Box<dyn ChainRpcInterface>, RpcError> {
	// Validate configuration first
	AlloyRpcSchema::validate_config(config)
		.map_err(|e| RpcError::Network(format!("Invalid configuration: {}", e)))?;

	let chains = match config.get("chains").and_then(|v| v.as_array()) {
		Some(entries) => entries
			.iter()
			.filter_map(|v| v.as_str())
			.filter_map(|name| name.parse::<Chain>().ok())
			.collect(),
		None => chains_config.keys().copied().collect(),
	};

	Ok(Box::new(AlloyRpc::new(chains, chains_config)?))
}

/// Registry for the Alloy RPC implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = RpcFactory;

	fn factory() -> Self::Factory {
		create_rpc
	}
}

impl RpcRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use wallet_types::ChainConfig;

	fn chains_config() -> ChainsConfig {
		let mut chains = ChainsConfig::new();
		chains.insert(
			Chain::Ethereum,
			ChainConfig {
				chain_id: 1,
				rpc_url: "http://localhost:8545".to_string(),
				tokens: vec![],
			},
		);
		chains
	}

	#[test]
	fn test_schema_rejects_unknown_chain() {
		let valid: toml::Value = r#"chains = ["ethereum", "xdai"]"#.parse().unwrap();
		assert!(AlloyRpcSchema::validate_config(&valid).is_ok());

		let invalid: toml::Value = r#"chains = ["solana"]"#.parse().unwrap();
		assert!(AlloyRpcSchema::validate_config(&invalid).is_err());
	}

	#[test]
	fn test_create_rpc_requires_configured_chain() {
		let config: toml::Value = r#"chains = ["polygon"]"#.parse().unwrap();
		let result = create_rpc(&config, &chains_config());
		assert!(matches!(
			result,
			Err(RpcError::NoProviderAvailable(Chain::Polygon))
		));
	}

	#[test]
	fn test_create_rpc_defaults_to_all_configured_chains() {
		let config: toml::Value = "".parse().unwrap();
		assert!(create_rpc(&config, &chains_config()).is_ok());
	}
}
