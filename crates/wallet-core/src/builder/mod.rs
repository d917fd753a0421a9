//! Builder pattern for constructing wallet engines.
//!
//! Provides a flexible way to compose a WalletEngine from various service
//! implementations using factory functions. Supports pluggable storage,
//! signer, smart-wallet backend, chain RPC and dApp bridge
//! implementations, and bootstraps the account set and history before the
//! engine starts.

use crate::engine::{event_bus::EventBus, WalletEngine};
use crate::history::HistoryService;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use wallet_accounts::{AccountError, AccountsService, SignerInterface};
use wallet_backends::rpc::{ChainRpcInterface, RpcError, RpcService};
use wallet_backends::{BackendError, BackendService, WalletBackendInterface};
use wallet_config::Config;
use wallet_connect::{BridgeInterface, WalletConnectError, WalletConnectService};
use wallet_storage::{StorageError, StorageInterface, StorageService};
use wallet_types::{AccountKind, Chain, ChainsConfig, StorageKey};

/// Errors that can occur during wallet engine construction.
///
/// These errors indicate problems with configuration or missing required
/// components when building a wallet engine instance.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build a WalletEngine.
///
/// This struct holds factory functions for creating implementations of
/// each service type required by the wallet engine. Each factory function
/// takes a TOML configuration value and returns the corresponding service
/// implementation.
pub struct WalletFactories<SF, AF, BF, RF, WF> {
	pub storage_factories: HashMap<String, SF>,
	pub signer_factories: HashMap<String, AF>,
	pub backend_factories: HashMap<String, BF>,
	pub rpc_factories: HashMap<String, RF>,
	pub bridge_factories: HashMap<String, WF>,
}

/// Builder for constructing a WalletEngine with pluggable implementations.
pub struct WalletBuilder {
	config: Config,
}

impl WalletBuilder {
	/// Creates a new WalletBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the WalletEngine using factories for each component type.
	pub async fn build<SF, AF, BF, RF, WF>(
		self,
		factories: WalletFactories<SF, AF, BF, RF, WF>,
	) -> Result<WalletEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn SignerInterface>, AccountError>,
		BF: Fn(&toml::Value) -> Result<Box<dyn WalletBackendInterface>, BackendError>,
		RF: Fn(&toml::Value, &ChainsConfig) -> Result<Box<dyn ChainRpcInterface>, RpcError>,
		WF: Fn(&toml::Value) -> Result<Box<dyn BridgeInterface>, WalletConnectError>,
	{
		// Create storage implementations
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						// Validation already happened in the factory
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		if storage_impls.is_empty() {
			return Err(BuilderError::MissingComponent("storage".to_string()));
		}

		// Get the primary storage implementation
		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;

		let storage = Arc::new(StorageService::new(storage_backend));

		// Create signer implementations
		let mut signer_impls = HashMap::new();
		for (name, config) in &self.config.accounts.implementations {
			if let Some(factory) = factories.signer_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						// Validation already happened in the factory
						signer_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.accounts.primary == name;
						tracing::info!(component = "account", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "account",
							implementation = %name,
							error = %e,
							"Failed to create account implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create account implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		if signer_impls.is_empty() {
			return Err(BuilderError::MissingComponent("account".to_string()));
		}

		// Get the primary signer implementation
		let primary_signer = &self.config.accounts.primary;
		let signer = signer_impls.remove(primary_signer).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary account '{}' failed to load or has invalid configuration",
				primary_signer
			))
		})?;

		let accounts = Arc::new(AccountsService::new(signer, storage.clone()));

		// Create backend implementations; all loaded backends stay
		// addressable, keyed by the account kinds they serve
		let mut backend_impls = HashMap::new();
		for (name, config) in &self.config.backends.implementations {
			if let Some(factory) = factories.backend_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						// Validation already happened in the factory
						backend_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.backends.primary == name;
						tracing::info!(component = "backend", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "backend",
							implementation = %name,
							error = %e,
							"Failed to create backend implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create backend implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		if backend_impls.is_empty() {
			return Err(BuilderError::MissingComponent("backend".to_string()));
		}

		let primary_backend = &self.config.backends.primary;
		if !backend_impls.contains_key(primary_backend) {
			return Err(BuilderError::Config(format!(
				"Primary backend '{}' failed to load or has invalid configuration",
				primary_backend
			)));
		}

		let backends = Arc::new(BackendService::new(backend_impls, primary_backend.clone()));

		// Create chain RPC providers
		let mut rpc_providers: HashMap<Chain, Arc<dyn ChainRpcInterface>> = HashMap::new();
		for (name, config) in &self.config.rpc.implementations {
			if let Some(factory) = factories.rpc_factories.get(name) {
				match factory(config, &self.config.chains) {
					Ok(implementation) => {
						let implementation_arc: Arc<dyn ChainRpcInterface> = implementation.into();
						for chain in rpc_chains(config, &self.config.chains)? {
							rpc_providers.insert(chain, implementation_arc.clone());
							tracing::info!(component = "rpc", implementation = %name, chain = %chain, "Loaded");
						}
					}
					Err(e) => {
						tracing::error!(
							component = "rpc",
							implementation = %name,
							error = %e,
							"Failed to create rpc implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create rpc implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		if rpc_providers.is_empty() {
			tracing::warn!(
				"No chain RPC providers available - key-based estimation will not work"
			);
		}

		let rpc = Arc::new(RpcService::new(rpc_providers));

		// Create dApp bridge implementations
		let walletconnect = match &self.config.walletconnect {
			Some(walletconnect_config) => {
				let mut bridges = Vec::new();
				for (name, config) in &walletconnect_config.implementations {
					if let Some(factory) = factories.bridge_factories.get(name) {
						match factory(config) {
							Ok(implementation) => {
								// Validation already happened in the factory
								bridges.push(implementation);
								tracing::info!(component = "walletconnect", implementation = %name, "Loaded");
							}
							Err(e) => {
								tracing::error!(
									component = "walletconnect",
									implementation = %name,
									error = %e,
									"Failed to create walletconnect implementation"
								);
								return Err(BuilderError::Config(format!(
									"Failed to create walletconnect implementation '{}': {}",
									name, e
								)));
							}
						}
					}
				}

				if bridges.is_empty() {
					tracing::warn!(
						"WalletConnect configured but no bridges loaded - dApp sessions will not work"
					);
					None
				} else {
					Some(Arc::new(WalletConnectService::new(bridges)))
				}
			}
			None => None,
		};

		// Load the stored account set and make sure the key-based account
		// exists before anything imports on top of it
		if let Err(e) = accounts.load().await {
			tracing::error!(component = "account", error = %e, "Failed to load stored accounts");
			return Err(BuilderError::Config(format!(
				"Failed to load stored accounts: {}",
				e
			)));
		}

		if let Err(e) = accounts.ensure_key_based().await {
			tracing::error!(component = "account", error = %e, "Failed to derive key-based account");
			return Err(BuilderError::Config(format!(
				"Failed to derive key-based account: {}",
				e
			)));
		}

		// Import smart-wallet accounts from the backends that serve them
		for kind in [
			AccountKind::EtherspotSmartWallet,
			AccountKind::ArchanovaSmartWallet,
		] {
			if backends.backend_for_kind(kind).is_err() {
				continue;
			}

			match backends.fetch_accounts(kind).await {
				Ok(addresses) => {
					for address in addresses {
						if let Err(e) = accounts.upsert_smart_wallet(kind, &address).await {
							tracing::warn!(
								kind = %kind,
								address = %address,
								error = %e,
								"Failed to import account"
							);
						}
					}
				}
				Err(e) => {
					tracing::warn!(kind = %kind, error = %e, "Failed to fetch accounts");
				}
			}
		}

		match accounts.ensure_active().await {
			Ok(Some(account)) => {
				tracing::info!(component = "account", account_id = %account.id, "Active account selected");
			}
			Ok(None) => {}
			Err(e) => {
				return Err(BuilderError::Config(format!(
					"Failed to activate an account: {}",
					e
				)));
			}
		}

		// Load persisted history for every known account
		let history = Arc::new(HistoryService::new(storage.clone()));
		for account in accounts.all().await {
			if let Err(e) = history.load_account(&account.id).await {
				tracing::warn!(account_id = %account.id, error = %e, "Failed to load history");
			}
		}

		// Seed the supported-assets snapshot consumed by the balance layer
		for (chain, chain_config) in &self.config.chains {
			if let Err(e) = storage
				.store(StorageKey::Assets, chain.as_str(), &chain_config.tokens)
				.await
			{
				tracing::warn!(chain = %chain, error = %e, "Failed to seed assets snapshot");
			}
		}

		Ok(WalletEngine::new(
			self.config,
			storage,
			accounts,
			backends,
			rpc,
			walletconnect,
			history,
			EventBus::new(1000),
		))
	}
}

/// Resolves which chains an RPC implementation serves.
///
/// A `chains` array in the implementation config restricts it to those
/// chains; without one the implementation serves every configured chain.
fn rpc_chains(config: &toml::Value, chains: &ChainsConfig) -> Result<Vec<Chain>, BuilderError> {
	match config.get("chains").and_then(|v| v.as_array()) {
		Some(entries) => entries
			.iter()
			.map(|entry| {
				entry
					.as_str()
					.ok_or_else(|| {
						BuilderError::Config(
							"Invalid chain entry in rpc implementation".to_string(),
						)
					})?
					.parse::<Chain>()
					.map_err(|e| {
						BuilderError::Config(format!(
							"Invalid chain in rpc implementation: {}",
							e
						))
					})
			})
			.collect(),
		None => Ok(chains.keys().copied().collect()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::Address;
	use wallet_types::{ChainConfig, TokenConfig};

	fn chains() -> ChainsConfig {
		let mut chains = HashMap::new();
		for chain in [Chain::Ethereum, Chain::Polygon] {
			chains.insert(
				chain,
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
		}
		chains
	}

	#[test]
	fn test_rpc_chains_restricted_by_config() {
		let config: toml::Value = toml::from_str("chains = [\"ethereum\"]").unwrap();

		let resolved = rpc_chains(&config, &chains()).unwrap();

		assert_eq!(resolved, vec![Chain::Ethereum]);
	}

	#[test]
	fn test_rpc_chains_default_to_all_configured() {
		let config: toml::Value = toml::from_str("url = \"http://localhost:8545\"").unwrap();

		let mut resolved = rpc_chains(&config, &chains()).unwrap();
		resolved.sort_by_key(|c| c.as_str());

		assert_eq!(resolved, vec![Chain::Ethereum, Chain::Polygon]);
	}

	#[test]
	fn test_rpc_chains_rejects_unknown_chain() {
		let config: toml::Value = toml::from_str("chains = [\"fantom\"]").unwrap();

		assert!(rpc_chains(&config, &chains()).is_err());
	}
}
