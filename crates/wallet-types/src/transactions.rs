//! Transaction intents, built descriptors, fee results and history records.
//!
//! These types flow through the whole estimation and reconciliation
//! pipeline: a [`TransactionToEstimate`] enters the dispatcher, becomes a
//! [`ChainTransaction`] through the transaction builder, resolves into a
//! [`TransactionFeeInfo`], and once submitted is tracked as a
//! [`HistoryRecord`] until the reconciliation engine confirms it.

use crate::chains::TokenConfig;
use crate::utils::same_hash;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token metadata attached to a transfer intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetData {
	/// Token contract address; the zero address denotes the native asset.
	pub contract_address: Address,
	pub decimals: u8,
	pub symbol: String,
	/// Marks assets kept for compatibility with older token lists.
	#[serde(default)]
	pub legacy: bool,
}

impl AssetData {
	/// True when the asset is the chain's native one rather than a token
	/// contract.
	pub fn is_native(&self) -> bool {
		self.contract_address == Address::ZERO
	}
}

/// One logical transfer awaiting fee estimation.
///
/// # Fields
///
/// * `to` - Recipient of the transfer
/// * `data` - Raw 0x-hex call payload, when the caller already built one
/// * `value` - Amount in the asset's smallest unit
/// * `asset_data` - Token being transferred; absent for native transfers
///   and for pre-built payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionToEstimate {
	pub to: Address,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
	pub value: U256,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub asset_data: Option<AssetData>,
}

/// A chain-ready transaction descriptor produced by the transaction
/// builder.
///
/// For token transfers `to` is the token contract, `data` carries the
/// encoded transfer call and `value` is zero; native transfers pass the
/// intent's fields through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
	pub to: Address,
	/// 0x-hex call data; "0x" for value-only transfers.
	pub data: String,
	/// Native value in wei.
	pub value: U256,
}

/// Normalized result of a fee estimation, independent of the account-type
/// branch that produced it.
///
/// # Fields
///
/// * `fee` - Total fee in wei, or in the gas token's smallest unit when
///   one is set; never negative by construction
/// * `gas_price` - Gas price used, present only for the key-based path
/// * `gas_token` - ERC20 paying the fee instead of the native asset,
///   smart-wallet paths only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFeeInfo {
	pub fee: U256,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_price: Option<U256>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_token: Option<TokenConfig>,
}

/// Lifecycle status of a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionStatus {
	Pending,
	Confirmed,
	Failed,
	#[serde(rename = "timedout")]
	TimedOut,
}

impl fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			TransactionStatus::Pending => "pending",
			TransactionStatus::Confirmed => "confirmed",
			TransactionStatus::Failed => "failed",
			TransactionStatus::TimedOut => "timedout",
		};
		f.write_str(s)
	}
}

/// One entry in an account's per-chain transaction history.
///
/// Records are keyed logically by `hash` for dedup; `batch_hash`
/// correlates a locally recorded pending entry with its eventual
/// submitted batch before the real on-chain hash is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
	/// Transaction hash; may start as a local placeholder until the batch
	/// resolves to a mined transaction.
	pub hash: String,
	/// Submission batch this record belongs to, when sent through a
	/// batching backend.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub batch_hash: Option<String>,
	pub from: String,
	pub to: String,
	/// Amount in the asset's smallest unit.
	pub value: U256,
	pub asset_symbol: String,
	pub status: TransactionStatus,
	pub created_at: u64,
}

impl HistoryRecord {
	/// True when this record belongs to the given submission batch,
	/// compared case-insensitively.
	pub fn matches_batch(&self, batch_hash: &str) -> bool {
		self.batch_hash
			.as_deref()
			.map(|h| same_hash(h, batch_hash))
			.unwrap_or(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_serde_vocabulary() {
		assert_eq!(
			serde_json::to_string(&TransactionStatus::Pending).unwrap(),
			"\"pending\""
		);
		assert_eq!(
			serde_json::to_string(&TransactionStatus::TimedOut).unwrap(),
			"\"timedout\""
		);
		let parsed: TransactionStatus = serde_json::from_str("\"confirmed\"").unwrap();
		assert_eq!(parsed, TransactionStatus::Confirmed);
	}

	#[test]
	fn test_matches_batch_is_case_insensitive() {
		let record = HistoryRecord {
			hash: "0xabc".to_string(),
			batch_hash: Some("0xBATCH01".to_string()),
			from: "0x1".to_string(),
			to: "0x2".to_string(),
			value: U256::from(1u64),
			asset_symbol: "ETH".to_string(),
			status: TransactionStatus::Pending,
			created_at: 0,
		};

		assert!(record.matches_batch("0xbatch01"));
		assert!(record.matches_batch("0xBATCH01"));
		assert!(!record.matches_batch("0xbatch02"));
	}
}
