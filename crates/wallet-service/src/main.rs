//! Main entry point for the wallet service.
//!
//! This binary provides a complete wallet engine that estimates transaction
//! fees, reconciles smart-wallet batch notifications, and serves WalletConnect
//! dApp sessions. It uses a modular architecture with pluggable
//! implementations for different components.

use clap::Parser;
use std::path::PathBuf;
use wallet_config::Config;
use wallet_core::{WalletBuilder, WalletEngine, WalletFactories};

// Import implementations from individual crates
use wallet_accounts::implementations::local::create_signer;
use wallet_backends::implementations::archanova::create_backend as archanova_create_backend;
use wallet_backends::implementations::etherspot::create_backend as etherspot_create_backend;
use wallet_backends::implementations::evm::alloy::create_rpc;
use wallet_connect::implementations::relay::create_bridge;
use wallet_storage::implementations::file::create_storage as create_file_storage;
use wallet_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the wallet service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the wallet service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the wallet engine with all implementations
/// 5. Runs the wallet until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	// Create env filter with default from args
	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started wallet");

	// Load configuration
	let config = Config::from_file(args.config.to_str().unwrap()).await?;
	tracing::info!("Loaded configuration [{}]", config.wallet.name);

	// Build wallet engine with implementations
	let wallet = build_wallet(config).await?;

	// Run the wallet until interrupted
	wallet.run().await?;

	tracing::info!("Stopped wallet");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};

    // Variant for factories that take chains config
    ($interface:path, $error:path, chains, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value, &wallet_types::ChainsConfig) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the wallet engine with all necessary implementations.
///
/// This function wires up all the concrete implementations for:
/// - Storage backends (e.g., in-memory, file)
/// - Account signers (e.g., local private keys)
/// - Smart-wallet backends (e.g., Etherspot, Archanova)
/// - Chain RPC providers (e.g., Alloy HTTP)
/// - WalletConnect bridges (e.g., relay polling)
async fn build_wallet(config: Config) -> Result<WalletEngine, Box<dyn std::error::Error>> {
	let builder = WalletBuilder::new(config);

	// Storage factories (simple config-only interface)
	let storage_factories = create_factory_map!(
		wallet_storage::StorageInterface,
		wallet_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	// Signer factories (simple config-only interface)
	let signer_factories = create_factory_map!(
		wallet_accounts::SignerInterface,
		wallet_accounts::AccountError,
		"local" => create_signer,
	);

	// Backend factories (simple config-only interface)
	let backend_factories = create_factory_map!(
		wallet_backends::WalletBackendInterface,
		wallet_backends::BackendError,
		"etherspot" => etherspot_create_backend,
		"archanova" => archanova_create_backend,
	);

	// RPC factories (config + chains)
	let rpc_factories = create_factory_map!(
		wallet_backends::rpc::ChainRpcInterface,
		wallet_backends::rpc::RpcError,
		chains,
		"evm_alloy" => create_rpc,
	);

	// Bridge factories (simple config-only interface)
	let bridge_factories = create_factory_map!(
		wallet_connect::BridgeInterface,
		wallet_connect::WalletConnectError,
		"relay" => create_bridge,
	);

	let factories = WalletFactories {
		storage_factories,
		signer_factories,
		backend_factories,
		rpc_factories,
		bridge_factories,
	};

	Ok(builder.build(factories).await?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use tempfile::tempdir;
	use toml::Value;
	use wallet_config::{
		AccountsConfig, BackendsConfig, RpcConfig, StorageConfig, WalletSettings,
	};
	use wallet_types::{AccountKind, Chain, ChainConfig, TokenConfig, NATIVE_TOKEN_ADDRESS};

	/// Creates a minimal test configuration for unit testing
	fn create_test_config() -> Config {
		Config {
			wallet: WalletSettings {
				name: "test-wallet".to_string(),
				use_gas_token: false,
				preferred_gas_token: "PLR".to_string(),
				gas_refresh_interval_seconds: 60,
			},
			chains: {
				let mut map = HashMap::new();
				map.insert(
					Chain::Ethereum,
					ChainConfig {
						chain_id: 1,
						rpc_url: "http://localhost:8545".to_string(),
						tokens: vec![TokenConfig {
							address: NATIVE_TOKEN_ADDRESS,
							symbol: "ETH".to_string(),
							decimals: 18,
						}],
					},
				);
				map
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: {
					let mut map = HashMap::new();
					map.insert("memory".to_string(), Value::Table(toml::map::Map::new()));
					map
				},
				cleanup_interval_seconds: 60,
			},
			accounts: AccountsConfig {
				primary: "local".to_string(),
				implementations: {
					let mut map = HashMap::new();
					let mut table = toml::map::Map::new();
					table.insert(
						"private_key".to_string(),
						Value::String(
							"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
								.to_string(),
						),
					);
					map.insert("local".to_string(), Value::Table(table));
					map
				},
			},
			backends: BackendsConfig {
				primary: "etherspot".to_string(),
				implementations: {
					let mut map = HashMap::new();
					let mut table = toml::map::Map::new();
					table.insert(
						"endpoint".to_string(),
						Value::String("http://localhost:4000".to_string()),
					);
					map.insert("etherspot".to_string(), Value::Table(table));
					map
				},
			},
			rpc: RpcConfig {
				implementations: HashMap::new(),
			},
			walletconnect: None,
		}
	}

	#[test]
	fn test_args_default_values() {
		let args = Args {
			config: PathBuf::from("config.toml"),
			log_level: "info".to_string(),
		};

		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args {
			config: PathBuf::from("custom.toml"),
			log_level: "debug".to_string(),
		};

		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_create_factory_map_macro() {
		use wallet_storage::implementations::memory::create_storage;
		use wallet_storage::{StorageError, StorageInterface};

		let factories = create_factory_map!(
			StorageInterface,
			StorageError,
			"memory" => create_storage,
		);

		assert_eq!(factories.len(), 1);
		assert!(factories.contains_key("memory"));
	}

	#[test]
	fn test_create_factory_map_multiple_entries() {
		use wallet_storage::implementations::{
			file::create_storage as create_file, memory::create_storage as create_memory,
		};
		use wallet_storage::{StorageError, StorageInterface};

		let factories = create_factory_map!(
			StorageInterface,
			StorageError,
			"memory" => create_memory,
			"file" => create_file,
		);

		assert_eq!(factories.len(), 2);
		assert!(factories.contains_key("memory"));
		assert!(factories.contains_key("file"));
	}

	#[tokio::test]
	async fn test_build_wallet_with_minimal_config() {
		let config = create_test_config();

		let result = build_wallet(config).await;

		// Should succeed with minimal valid configuration
		assert!(result.is_ok(), "Failed to build wallet: {:?}", result.err());

		let wallet = result.unwrap();
		assert_eq!(wallet.config().wallet.name, "test-wallet");
	}

	#[tokio::test]
	async fn test_build_wallet_selects_active_account() {
		let config = create_test_config();

		let wallet = build_wallet(config).await.expect("Failed to build wallet");

		// The configured backend is unreachable, so the bootstrap falls
		// back to the key-based account
		let active = wallet
			.accounts()
			.active_account()
			.await
			.expect("no active account");
		assert_eq!(active.kind, AccountKind::KeyBased);
	}

	#[test]
	fn test_storage_factories_creation() {
		let storage_factories = create_factory_map!(
			wallet_storage::StorageInterface,
			wallet_storage::StorageError,
			"file" => create_file_storage,
			"memory" => create_memory_storage,
		);

		assert_eq!(storage_factories.len(), 2);
		assert!(storage_factories.contains_key("file"));
		assert!(storage_factories.contains_key("memory"));
	}

	#[test]
	fn test_backend_factories_creation() {
		let backend_factories = create_factory_map!(
			wallet_backends::WalletBackendInterface,
			wallet_backends::BackendError,
			"etherspot" => etherspot_create_backend,
			"archanova" => archanova_create_backend,
		);

		assert_eq!(backend_factories.len(), 2);
		assert!(backend_factories.contains_key("etherspot"));
		assert!(backend_factories.contains_key("archanova"));
	}

	#[test]
	fn test_bridge_factories_creation() {
		let bridge_factories = create_factory_map!(
			wallet_connect::BridgeInterface,
			wallet_connect::WalletConnectError,
			"relay" => create_bridge,
		);

		assert_eq!(bridge_factories.len(), 1);
		assert!(bridge_factories.contains_key("relay"));
	}

	#[test]
	fn test_rpc_factories_manual_creation() {
		let mut rpc_factories = std::collections::HashMap::new();

		rpc_factories.insert(
			"evm_alloy".to_string(),
			create_rpc
				as fn(
					&toml::Value,
					&wallet_types::ChainsConfig,
				) -> Result<
					Box<dyn wallet_backends::rpc::ChainRpcInterface>,
					wallet_backends::rpc::RpcError,
				>,
		);

		assert_eq!(rpc_factories.len(), 1);
		assert!(rpc_factories.contains_key("evm_alloy"));
	}

	#[tokio::test]
	async fn test_config_file_loading() {
		let temp_dir = tempdir().expect("Failed to create temp dir");
		let config_path = temp_dir.path().join("test_config.toml");

		// Create a test config file that won't try to connect to networks
		let config_content = r#"
[wallet]
name = "test-file-wallet"
use_gas_token = true
preferred_gas_token = "PLR"
gas_refresh_interval_seconds = 30

[chains.ethereum]
chain_id = 1
rpc_url = "http://localhost:8545"
[[chains.ethereum.tokens]]
address = "0x0000000000000000000000000000000000000000"
symbol = "ETH"
decimals = 18

[chains.xdai]
chain_id = 100
rpc_url = "http://localhost:8546"
[[chains.xdai.tokens]]
address = "0x0000000000000000000000000000000000000000"
symbol = "XDAI"
decimals = 18

[storage]
primary = "memory"
cleanup_interval_seconds = 120
[storage.implementations.memory]

[accounts]
primary = "local"
[accounts.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[backends]
primary = "etherspot"
[backends.implementations.etherspot]
endpoint = "http://localhost:4000"

[rpc.implementations.evm_alloy]
chains = ["ethereum"]

[walletconnect.implementations.relay]
endpoint = "http://localhost:5001"
"#;

		std::fs::write(&config_path, config_content).expect("Failed to write config");

		let config = Config::from_file(config_path.to_str().unwrap())
			.await
			.expect("Failed to load config");

		// Test only config loading, not actual wallet building since that
		// requires network connections
		assert_eq!(config.wallet.name, "test-file-wallet");
		assert!(config.wallet.use_gas_token);
		assert_eq!(config.chains.len(), 2);
		assert!(config.chains.contains_key(&Chain::Ethereum));
		assert!(config.chains.contains_key(&Chain::Xdai));
		assert!(config.walletconnect.is_some());
	}

	// Test for ensuring WalletFactories struct is properly constructed
	#[test]
	fn test_wallet_factories_construction() {
		let storage_factories = create_factory_map!(
			wallet_storage::StorageInterface,
			wallet_storage::StorageError,
			"memory" => create_memory_storage,
		);

		let signer_factories = create_factory_map!(
			wallet_accounts::SignerInterface,
			wallet_accounts::AccountError,
			"local" => create_signer,
		);

		let backend_factories = create_factory_map!(
			wallet_backends::WalletBackendInterface,
			wallet_backends::BackendError,
			"etherspot" => etherspot_create_backend,
		);

		let mut rpc_factories = std::collections::HashMap::new();
		rpc_factories.insert(
			"evm_alloy".to_string(),
			create_rpc
				as fn(
					&toml::Value,
					&wallet_types::ChainsConfig,
				) -> Result<
					Box<dyn wallet_backends::rpc::ChainRpcInterface>,
					wallet_backends::rpc::RpcError,
				>,
		);

		let bridge_factories = create_factory_map!(
			wallet_connect::BridgeInterface,
			wallet_connect::WalletConnectError,
			"relay" => create_bridge,
		);

		let factories = WalletFactories {
			storage_factories,
			signer_factories,
			backend_factories,
			rpc_factories,
			bridge_factories,
		};

		// Verify all factories are properly set
		assert!(!factories.storage_factories.is_empty());
		assert!(!factories.signer_factories.is_empty());
		assert!(!factories.backend_factories.is_empty());
		assert!(!factories.rpc_factories.is_empty());
		assert!(!factories.bridge_factories.is_empty());
	}
}
