//! Account records and the closed set of account kinds.
//!
//! An account is one signing/execution context of the wallet: the legacy
//! key-based wallet or one of the smart-contract wallets managed by a
//! backend service. The active account decides which fee-estimation branch
//! runs, so the kind is a closed sum type matched exhaustively wherever
//! behavior differs per kind.

use crate::Chain;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The kind of signing/execution context behind an account.
///
/// A closed set: a new wallet backend cannot be added without updating
/// every exhaustive match, the fee-estimation dispatcher included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountKind {
	KeyBased,
	ArchanovaSmartWallet,
	EtherspotSmartWallet,
}

impl AccountKind {
	/// True for the smart-contract wallet kinds backed by a remote service.
	pub fn is_smart_wallet(&self) -> bool {
		matches!(
			self,
			AccountKind::ArchanovaSmartWallet | AccountKind::EtherspotSmartWallet
		)
	}
}

impl fmt::Display for AccountKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AccountKind::KeyBased => "KEY_BASED",
			AccountKind::ArchanovaSmartWallet => "ARCHANOVA_SMART_WALLET",
			AccountKind::EtherspotSmartWallet => "ETHERSPOT_SMART_WALLET",
		};
		f.write_str(s)
	}
}

/// Per-chain account data reported by a smart-wallet backend.
///
/// All fields are optional: a sync merges only the fields present in the
/// fetched payload and preserves everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountExtra {
	/// Chain-specific deployment address of the smart wallet.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
	/// Whether the account contract is deployed on the chain.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deployed: Option<bool>,
	/// Account nonce as last reported by the backend.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nonce: Option<u64>,
}

impl AccountExtra {
	/// Overwrites only the fields present in `incoming`; absent fields keep
	/// their stored value.
	pub fn merge(&mut self, incoming: AccountExtra) {
		if incoming.address.is_some() {
			self.address = incoming.address;
		}
		if incoming.deployed.is_some() {
			self.deployed = incoming.deployed;
		}
		if incoming.nonce.is_some() {
			self.nonce = incoming.nonce;
		}
	}
}

/// One signing/execution context of the wallet.
///
/// # Fields
///
/// * `id` - Stable identifier, the lowercase account address; unique
///   case-insensitively within the account set
/// * `address` - On-chain address of the account
/// * `kind` - Which wallet backend executes for this account
/// * `active` - Exactly one account in the set is active at a time
/// * `extras` - Per-chain data merged in from backend syncs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
	pub id: String,
	pub address: String,
	pub kind: AccountKind,
	pub active: bool,
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub extras: HashMap<Chain, AccountExtra>,
}

impl Account {
	/// Creates an inactive account for the given address.
	pub fn new(address: &str, kind: AccountKind) -> Self {
		Self {
			id: address.to_lowercase(),
			address: address.to_string(),
			kind,
			active: false,
			extras: HashMap::new(),
		}
	}
}
