//! Storage-related types for the wallet engine.

use std::str::FromStr;

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for the stored account set
	Accounts,
	/// Key for per-account transaction history
	History,
	/// Key for the supported-assets snapshot written at import
	Assets,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Accounts => "accounts",
			StorageKey::History => "history",
			StorageKey::Assets => "assets",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Accounts, Self::History, Self::Assets].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"accounts" => Ok(Self::Accounts),
			"history" => Ok(Self::History),
			"assets" => Ok(Self::Assets),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
