//! Per-chain gas price tracking.
//!
//! The key-based estimation path prices transactions with the instant tier
//! of this table, refreshed against the chain RPC. Entries start unfetched
//! and are only trusted after a successful refresh.

use alloy_primitives::U256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use wallet_backends::rpc::{RpcError, RpcService};
use wallet_types::Chain;

/// Gas price tiers derived from one node-reported base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPrices {
	pub standard: U256,
	pub fast: U256,
	pub instant: U256,
}

impl GasPrices {
	/// Derives the tier table from the node's reported price: standard is
	/// the price as reported, fast adds 25% and instant adds 50%.
	pub fn from_base(base: U256) -> Self {
		Self {
			standard: base,
			fast: base + base / U256::from(4u64),
			instant: base + base / U256::from(2u64),
		}
	}
}

/// Snapshot of one chain's gas price table.
///
/// `is_fetched` distinguishes a seeded placeholder from an entry actually
/// refreshed against the node; estimation only trusts fetched entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasInfo {
	pub is_fetched: bool,
	pub prices: Option<GasPrices>,
}

impl GasInfo {
	/// The instant-tier price, present only after a successful refresh.
	pub fn instant(&self) -> Option<U256> {
		if !self.is_fetched {
			return None;
		}
		self.prices.map(|p| p.instant)
	}
}

/// Tracks gas prices for every chain the RPC service covers.
pub struct GasTracker {
	/// RPC providers the prices are fetched from.
	rpc: Arc<RpcService>,
	/// Per-chain price table.
	table: RwLock<HashMap<Chain, GasInfo>>,
}

impl GasTracker {
	/// Creates a tracker seeded with an unfetched entry per served chain.
	pub fn new(rpc: Arc<RpcService>) -> Self {
		let table = rpc
			.chains()
			.into_iter()
			.map(|chain| {
				(
					chain,
					GasInfo {
						is_fetched: false,
						prices: None,
					},
				)
			})
			.collect();

		Self {
			rpc,
			table: RwLock::new(table),
		}
	}

	/// Refreshes the chain's entry from the node's current gas price.
	pub async fn refresh(&self, chain: Chain) -> Result<(), RpcError> {
		let base = self.rpc.gas_price(chain).await?;
		self.table.write().await.insert(
			chain,
			GasInfo {
				is_fetched: true,
				prices: Some(GasPrices::from_base(base)),
			},
		);
		Ok(())
	}

	/// Refreshes every served chain, logging failures per chain.
	pub async fn refresh_all(&self) {
		for chain in self.rpc.chains() {
			if let Err(e) = self.refresh(chain).await {
				tracing::warn!(chain = %chain, error = %e, "Gas price refresh failed");
			}
		}
	}

	/// Returns the chain's current entry, if the chain is tracked.
	pub async fn info(&self, chain: Chain) -> Option<GasInfo> {
		self.table.read().await.get(&chain).copied()
	}
}
