//! Configuration module for the wallet engine.
//!
//! This module provides structures and utilities for managing wallet
//! configuration. It supports loading configuration from TOML files and
//! validates that all required configuration values are properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use wallet_types::{chains::deserialize_chains, Chain, ChainsConfig};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the wallet engine.
///
/// Holds every section the engine needs: wallet identity and estimation
/// options, chain definitions, storage, account providers, smart-wallet
/// backends, chain RPC providers and the optional WalletConnect bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Wallet identity and estimation behavior.
	pub wallet: WalletSettings,
	/// Chain and token configurations keyed by chain name.
	#[serde(deserialize_with = "deserialize_chains")]
	pub chains: ChainsConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for account providers.
	pub accounts: AccountsConfig,
	/// Configuration for smart-wallet backends.
	pub backends: BackendsConfig,
	/// Configuration for chain RPC providers.
	pub rpc: RpcConfig,
	/// Configuration for the WalletConnect bridge, if enabled.
	pub walletconnect: Option<WalletConnectConfig>,
}

/// Wallet identity and estimation behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletSettings {
	/// Human-readable name for this wallet instance.
	pub name: String,
	/// Whether smart-wallet estimates should be paid in a gas token
	/// instead of the chain's native asset.
	#[serde(default)]
	pub use_gas_token: bool,
	/// Symbol of the preferred gas token, looked up per chain.
	#[serde(default = "default_gas_token_symbol")]
	pub preferred_gas_token: String,
	/// Interval in seconds between gas price refreshes.
	#[serde(default = "default_gas_refresh_interval")]
	pub gas_refresh_interval_seconds: u64,
}

/// Returns the default preferred gas token symbol.
fn default_gas_token_symbol() -> String {
	"PLR".to_string()
}

/// Returns the default gas price refresh interval in seconds.
fn default_gas_refresh_interval() -> u64 {
	60
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

/// Configuration for account providers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountsConfig {
	/// Which implementation derives the key-based account.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for smart-wallet backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendsConfig {
	/// Which implementation serves the active smart-wallet accounts.
	pub primary: String,
	/// Map of backend implementation names to their configurations.
	/// Each implementation has its own configuration format stored as raw TOML values.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for chain RPC providers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
	/// Map of RPC implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the WalletConnect bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletConnectConfig {
	/// Map of bridge implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	///
	/// This method supports modular configuration through include directives:
	/// - `include = ["file1.toml", "file2.toml"]` - Include specific files
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// Checks cover:
	/// - Wallet name is not empty
	/// - At least one chain is configured, each with an RPC URL
	/// - Storage primary exists and the cleanup interval is sane
	/// - Account and backend primaries reference configured implementations
	/// - RPC implementations only reference configured chains
	fn validate(&self) -> Result<(), ConfigError> {
		if self.wallet.name.is_empty() {
			return Err(ConfigError::Validation("Wallet name cannot be empty".into()));
		}
		if self.wallet.use_gas_token && self.wallet.preferred_gas_token.is_empty() {
			return Err(ConfigError::Validation(
				"preferred_gas_token cannot be empty when use_gas_token is set".into(),
			));
		}

		if self.chains.is_empty() {
			return Err(ConfigError::Validation(
				"Chains configuration cannot be empty".into(),
			));
		}
		for (chain, chain_config) in &self.chains {
			if chain_config.rpc_url.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Chain {} must have an rpc_url",
					chain
				)));
			}
			if chain_config.chain_id == 0 {
				return Err(ConfigError::Validation(format!(
					"Chain {} must have a non-zero chain_id",
					chain
				)));
			}
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		if self.accounts.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one account implementation must be configured".into(),
			));
		}
		if !self
			.accounts
			.implementations
			.contains_key(&self.accounts.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary account provider '{}' not found in implementations",
				self.accounts.primary
			)));
		}

		if self.backends.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one backend implementation must be configured".into(),
			));
		}
		if !self
			.backends
			.implementations
			.contains_key(&self.backends.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary backend '{}' not found in implementations",
				self.backends.primary
			)));
		}

		if self.rpc.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one RPC implementation must be configured".into(),
			));
		}

		if let Some(ref walletconnect) = self.walletconnect {
			if walletconnect.implementations.is_empty() {
				return Err(ConfigError::Validation(
					"WalletConnect section present but no bridge implementations configured"
						.into(),
				));
			}
		}

		self.validate_rpc_coverage()?;

		Ok(())
	}

	/// Validates that RPC implementations only reference configured chains.
	///
	/// Each `[rpc.implementations.<name>]` table may carry a `chains` array
	/// restricting which chains it serves; every entry must name a known
	/// chain that also appears in `[chains]`. An implementation without a
	/// `chains` key serves all configured chains.
	fn validate_rpc_coverage(&self) -> Result<(), ConfigError> {
		for (impl_name, impl_config) in &self.rpc.implementations {
			let Some(chain_names) = impl_config.get("chains").and_then(|v| v.as_array()) else {
				continue;
			};

			for chain_value in chain_names {
				let chain_name = chain_value.as_str().ok_or_else(|| {
					ConfigError::Validation(format!(
						"Invalid chain entry in rpc implementation '{}'",
						impl_name
					))
				})?;

				let chain: Chain = chain_name.parse().map_err(|_| {
					ConfigError::Validation(format!(
						"RPC implementation '{}' references unknown chain '{}'",
						impl_name, chain_name
					))
				})?;

				if !self.chains.contains_key(&chain) {
					return Err(ConfigError::Validation(format!(
						"RPC implementation '{}' references chain '{}' which is not configured",
						impl_name, chain_name
					)));
				}
			}
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_config() -> String {
		r#"
[wallet]
name = "test-wallet"

[chains.ethereum]
chain_id = 1
rpc_url = "http://localhost:8545"
[[chains.ethereum.tokens]]
address = "0x0000000000000000000000000000000000000000"
symbol = "ETH"
decimals = 18

[storage]
primary = "memory"
cleanup_interval_seconds = 3600
[storage.implementations.memory]

[accounts]
primary = "local"
[accounts.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[backends]
primary = "etherspot"
[backends.implementations.etherspot]
endpoint = "http://localhost:4000"

[rpc]
[rpc.implementations.evm_alloy]
chains = ["ethereum"]
"#
		.to_string()
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_HOST", "localhost");
		std::env::set_var("TEST_PORT", "5432");

		let input = "host = \"${TEST_HOST}:${TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("TEST_HOST");
		std::env::remove_var("TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	#[test]
	fn test_full_config_parses() {
		std::env::set_var("TEST_WALLET_NAME", "env-wallet");

		let config_str = base_config().replace("test-wallet", "${TEST_WALLET_NAME}");
		let config: Config = config_str.parse().unwrap();

		assert_eq!(config.wallet.name, "env-wallet");
		assert!(!config.wallet.use_gas_token);
		assert_eq!(config.wallet.preferred_gas_token, "PLR");
		assert_eq!(config.chains.len(), 1);
		assert!(config.chains.contains_key(&Chain::Ethereum));
		assert_eq!(config.backends.primary, "etherspot");
		assert!(config.walletconnect.is_none());

		std::env::remove_var("TEST_WALLET_NAME");
	}

	#[test]
	fn test_primary_storage_must_exist() {
		let config_str = base_config().replace("primary = \"memory\"", "primary = \"file\"");
		let result = Config::from_str(&config_str);

		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Primary storage 'file' not found"));
	}

	#[test]
	fn test_backend_primary_must_exist() {
		let config_str =
			base_config().replace("primary = \"etherspot\"", "primary = \"archanova\"");
		let result = Config::from_str(&config_str);

		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Primary backend 'archanova' not found"));
	}

	#[test]
	fn test_rpc_coverage_rejects_unconfigured_chain() {
		let config_str = base_config().replace(
			"chains = [\"ethereum\"]",
			"chains = [\"ethereum\", \"polygon\"]",
		);
		let result = Config::from_str(&config_str);

		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("chain 'polygon' which is not configured"));
	}

	#[test]
	fn test_rpc_coverage_rejects_unknown_chain_name() {
		let config_str =
			base_config().replace("chains = [\"ethereum\"]", "chains = [\"dogechain\"]");
		let result = Config::from_str(&config_str);

		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("unknown chain 'dogechain'"));
	}

	#[test]
	fn test_cleanup_interval_bounds() {
		let config_str = base_config().replace(
			"cleanup_interval_seconds = 3600",
			"cleanup_interval_seconds = 0",
		);
		assert!(Config::from_str(&config_str).is_err());

		let config_str = base_config().replace(
			"cleanup_interval_seconds = 3600",
			"cleanup_interval_seconds = 100000",
		);
		assert!(Config::from_str(&config_str).is_err());
	}

	#[test]
	fn test_gas_token_settings() {
		let config_str = base_config().replace(
			"name = \"test-wallet\"",
			"name = \"test-wallet\"\nuse_gas_token = true\npreferred_gas_token = \"PLR\"",
		);
		let config: Config = config_str.parse().unwrap();

		assert!(config.wallet.use_gas_token);
		assert_eq!(config.wallet.preferred_gas_token, "PLR");
	}
}
