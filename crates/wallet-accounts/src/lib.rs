//! Account management module for the wallet engine.
//!
//! This module manages the wallet's account set: the key-based account derived
//! from the configured signing key and the smart-wallet accounts imported from
//! a backend. It owns the exactly-one-active invariant and persists the whole
//! account list on every mutation.

use alloy_primitives::Address;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use wallet_storage::{StorageError, StorageService};
use wallet_types::{Account, AccountExtra, AccountKind, Chain, ConfigSchema, ImplementationRegistry, StorageKey};

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Error that occurs when a referenced account does not exist.
	#[error("Account not found: {0}")]
	NotFound(String),
	/// Error that occurs when interacting with the signer implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
	/// Error that occurs when persisting or loading the account set.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Trait defining the interface for signer implementations.
///
/// A signer supplies the address of the key-based account. Signing itself
/// happens inside the wallet SDKs, so the engine only ever needs the address.
#[async_trait]
pub trait SignerInterface: Send + Sync {
	/// Returns the configuration schema for this signer implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves the address derived from the configured key.
	async fn address(&self) -> Result<Address, AccountError>;
}

/// Type alias for signer factory functions.
///
/// This is the function signature that all signer implementations must provide
/// to create instances of their signer interface.
pub type SignerFactory = fn(&toml::Value) -> Result<Box<dyn SignerInterface>, AccountError>;

/// Registry trait for signer implementations.
pub trait SignerRegistry: ImplementationRegistry<Factory = SignerFactory> {}

/// Get all registered signer implementations.
pub fn get_all_implementations() -> Vec<(&'static str, SignerFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that manages the wallet's account set.
///
/// Accounts are held in memory behind a read-write lock and written back to
/// storage wholesale after every mutation. Lookups by id are case-insensitive
/// since ids are addresses.
pub struct AccountsService {
	/// Signer backing the key-based account.
	signer: Box<dyn SignerInterface>,
	/// Persistence layer for the account set.
	storage: Arc<StorageService>,
	/// The in-memory account list, replaced wholesale on load.
	accounts: RwLock<Vec<Account>>,
}

/// Storage id under which the whole account list is persisted.
const ACCOUNTS_RECORD_ID: &str = "all";

impl AccountsService {
	/// Creates a new AccountsService with the given signer and storage.
	pub fn new(signer: Box<dyn SignerInterface>, storage: Arc<StorageService>) -> Self {
		Self {
			signer,
			storage,
			accounts: RwLock::new(Vec::new()),
		}
	}

	/// Loads the persisted account set into memory.
	///
	/// A missing record is not an error; the wallet starts with an empty set
	/// on first run.
	pub async fn load(&self) -> Result<(), AccountError> {
		match self
			.storage
			.retrieve::<Vec<Account>>(StorageKey::Accounts, ACCOUNTS_RECORD_ID)
			.await
		{
			Ok(stored) => {
				let mut accounts = self.accounts.write().await;
				*accounts = stored;
				Ok(())
			},
			Err(StorageError::NotFound) => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	/// Ensures the key-based account exists, deriving it from the signer.
	///
	/// Returns the existing or newly created account. The first account ever
	/// created becomes active.
	pub async fn ensure_key_based(&self) -> Result<Account, AccountError> {
		{
			let accounts = self.accounts.read().await;
			if let Some(existing) = accounts.iter().find(|a| a.kind == AccountKind::KeyBased) {
				return Ok(existing.clone());
			}
		}

		let address = self.signer.address().await?;
		let address = format!("{}", address);

		let mut accounts = self.accounts.write().await;
		let mut account = Account::new(&address, AccountKind::KeyBased);
		account.active = accounts.iter().all(|a| !a.active);
		accounts.push(account.clone());
		self.persist(&accounts).await?;

		tracing::info!(account_id = %account.id, "Created key-based account");
		Ok(account)
	}

	/// Inserts a smart-wallet account or returns the existing one.
	///
	/// Matching is by case-insensitive id. Newly imported accounts start
	/// inactive; activation is a separate, explicit operation.
	pub async fn upsert_smart_wallet(
		&self,
		kind: AccountKind,
		address: &str,
	) -> Result<Account, AccountError> {
		if !kind.is_smart_wallet() {
			return Err(AccountError::Implementation(format!(
				"{} is not a smart-wallet kind",
				kind
			)));
		}

		let id = address.to_lowercase();
		let mut accounts = self.accounts.write().await;

		if let Some(existing) = accounts.iter().find(|a| a.id == id) {
			return Ok(existing.clone());
		}

		let account = Account::new(address, kind);
		accounts.push(account.clone());
		self.persist(&accounts).await?;

		tracing::info!(account_id = %account.id, kind = %kind, "Imported smart-wallet account");
		Ok(account)
	}

	/// Merges per-chain extra data into an account.
	///
	/// Fields present in `extra` overwrite; absent fields keep their prior
	/// value. The merged set is persisted immediately.
	pub async fn merge_chain_extras(
		&self,
		account_id: &str,
		chain: Chain,
		extra: AccountExtra,
	) -> Result<(), AccountError> {
		let mut accounts = self.accounts.write().await;
		let account = accounts
			.iter_mut()
			.find(|a| a.id.eq_ignore_ascii_case(account_id))
			.ok_or_else(|| AccountError::NotFound(account_id.to_string()))?;

		account.extras.entry(chain).or_default().merge(extra);
		self.persist(&accounts).await?;
		Ok(())
	}

	/// Activates the given account and deactivates every other one.
	pub async fn set_active(&self, account_id: &str) -> Result<Account, AccountError> {
		let mut accounts = self.accounts.write().await;

		if !accounts
			.iter()
			.any(|a| a.id.eq_ignore_ascii_case(account_id))
		{
			return Err(AccountError::NotFound(account_id.to_string()));
		}

		let mut activated = None;
		for account in accounts.iter_mut() {
			account.active = account.id.eq_ignore_ascii_case(account_id);
			if account.active {
				activated = Some(account.clone());
			}
		}
		self.persist(&accounts).await?;

		// The lookup above guarantees a match
		activated.ok_or_else(|| AccountError::NotFound(account_id.to_string()))
	}

	/// Ensures some account is active, choosing a default when none is.
	///
	/// The default prefers the first Etherspot smart wallet, then falls back
	/// to the key-based account. Returns the active account, or `None` when
	/// the set is empty.
	pub async fn ensure_active(&self) -> Result<Option<Account>, AccountError> {
		{
			let accounts = self.accounts.read().await;
			if let Some(active) = accounts.iter().find(|a| a.active) {
				return Ok(Some(active.clone()));
			}
			if accounts.is_empty() {
				return Ok(None);
			}
		}

		let candidate = {
			let accounts = self.accounts.read().await;
			accounts
				.iter()
				.find(|a| a.kind == AccountKind::EtherspotSmartWallet)
				.or_else(|| accounts.iter().find(|a| a.kind == AccountKind::KeyBased))
				.or_else(|| accounts.first())
				.map(|a| a.id.clone())
		};

		match candidate {
			Some(id) => Ok(Some(self.set_active(&id).await?)),
			None => Ok(None),
		}
	}

	/// Returns the active account, if any.
	pub async fn active_account(&self) -> Option<Account> {
		let accounts = self.accounts.read().await;
		accounts.iter().find(|a| a.active).cloned()
	}

	/// Returns a snapshot of the whole account set.
	pub async fn all(&self) -> Vec<Account> {
		self.accounts.read().await.clone()
	}

	/// Returns all accounts of the given kind.
	pub async fn accounts_of_kind(&self, kind: AccountKind) -> Vec<Account> {
		let accounts = self.accounts.read().await;
		accounts.iter().filter(|a| a.kind == kind).cloned().collect()
	}

	/// Looks up an account by case-insensitive id.
	pub async fn account_by_id(&self, account_id: &str) -> Option<Account> {
		let accounts = self.accounts.read().await;
		accounts
			.iter()
			.find(|a| a.id.eq_ignore_ascii_case(account_id))
			.cloned()
	}

	async fn persist(&self, accounts: &[Account]) -> Result<(), AccountError> {
		self.storage
			.store(StorageKey::Accounts, ACCOUNTS_RECORD_ID, &accounts.to_vec())
			.await?;
		Ok(())
	}
}
