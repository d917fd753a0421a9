//! Chain definitions and per-chain configuration tables.
//!
//! This module defines the closed set of chains the wallet operates on and
//! the configuration structures describing each chain: its RPC endpoint and
//! the supported assets used for transfers, gas-token selection and history
//! display.

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Address listed for a chain's native asset in its token table.
pub const NATIVE_TOKEN_ADDRESS: Address = Address::ZERO;

/// The chains the wallet can operate on.
///
/// This is a closed set: every exhaustive match over chains breaks at
/// compile time when a chain is added, which is intentional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
	Ethereum,
	Polygon,
	Binance,
	Xdai,
	Avalanche,
	Optimism,
}

impl Chain {
	/// Returns the lowercase identifier used in configuration tables,
	/// storage keys and logs.
	pub fn as_str(&self) -> &'static str {
		match self {
			Chain::Ethereum => "ethereum",
			Chain::Polygon => "polygon",
			Chain::Binance => "binance",
			Chain::Xdai => "xdai",
			Chain::Avalanche => "avalanche",
			Chain::Optimism => "optimism",
		}
	}

	/// Returns all supported chains.
	pub fn all() -> [Chain; 6] {
		[
			Chain::Ethereum,
			Chain::Polygon,
			Chain::Binance,
			Chain::Xdai,
			Chain::Avalanche,
			Chain::Optimism,
		]
	}
}

impl fmt::Display for Chain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Chain {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"ethereum" => Ok(Chain::Ethereum),
			"polygon" => Ok(Chain::Polygon),
			"binance" => Ok(Chain::Binance),
			"xdai" => Ok(Chain::Xdai),
			"avalanche" => Ok(Chain::Avalanche),
			"optimism" => Ok(Chain::Optimism),
			_ => Err(format!("Unknown chain: {}", s)),
		}
	}
}

/// Configuration for a supported asset on a specific chain.
///
/// # Fields
///
/// * `address` - The on-chain address of the token contract; the zero
///   address denotes the chain's native asset
/// * `symbol` - The token symbol (e.g., "ETH", "PLR")
/// * `decimals` - The number of decimal places for the token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TokenConfig {
	pub address: Address,
	pub symbol: String,
	pub decimals: u8,
}

impl TokenConfig {
	/// True when this entry is the chain's native asset.
	pub fn is_native(&self) -> bool {
		self.address == NATIVE_TOKEN_ADDRESS
	}
}

/// Configuration for a single chain.
///
/// # Fields
///
/// * `chain_id` - The EVM chain id used when talking to the RPC node
/// * `rpc_url` - The HTTP(S) RPC endpoint for direct chain interaction
/// * `tokens` - Supported assets on this chain, native asset included
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	pub chain_id: u64,
	pub rpc_url: String,
	#[serde(default)]
	pub tokens: Vec<TokenConfig>,
}

impl ChainConfig {
	/// Looks up a supported asset by symbol, case-insensitively.
	pub fn token_by_symbol(&self, symbol: &str) -> Option<&TokenConfig> {
		self.tokens
			.iter()
			.find(|t| t.symbol.eq_ignore_ascii_case(symbol))
	}

	/// Looks up a supported asset by contract address.
	pub fn token_by_address(&self, address: &Address) -> Option<&TokenConfig> {
		self.tokens.iter().find(|t| &t.address == address)
	}
}

/// Chains configuration mapping chain names to their configurations.
pub type ChainsConfig = HashMap<Chain, ChainConfig>;

/// Helper function to deserialize chain configurations from TOML.
///
/// Chain tables are keyed by the lowercase chain name in TOML; this
/// converts those string keys into [`Chain`] values for internal use.
///
/// # Errors
///
/// Returns a deserialization error if a key is not a known chain name or
/// the underlying chain configuration is invalid.
pub fn deserialize_chains<'de, D>(deserializer: D) -> Result<ChainsConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, ChainConfig> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, value) in string_map {
		let chain = key
			.parse::<Chain>()
			.map_err(serde::de::Error::custom)?;
		result.insert(chain, value);
	}

	Ok(result)
}
