//! Per-account transaction history.
//!
//! History is kept as an in-memory map of account id to per-chain record
//! lists, persisted as one snapshot per account. Record hashes are treated
//! case-insensitively everywhere; duplicates collapse to the first
//! occurrence and status changes only follow the forward transition table.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use wallet_storage::{StorageError, StorageService};
use wallet_types::{same_hash, Chain, HistoryRecord, StorageKey, TransactionStatus};

/// Errors that can occur in the history service.
#[derive(Debug, Error)]
pub enum HistoryError {
	/// Error that occurs while persisting or loading snapshots.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Allowed status transitions; anything absent is rejected.
static TRANSITIONS: Lazy<HashMap<TransactionStatus, HashSet<TransactionStatus>>> =
	Lazy::new(|| {
		let mut transitions = HashMap::new();
		transitions.insert(
			TransactionStatus::Pending,
			HashSet::from([
				TransactionStatus::Confirmed,
				TransactionStatus::Failed,
				TransactionStatus::TimedOut,
			]),
		);
		transitions.insert(TransactionStatus::Confirmed, HashSet::new());
		transitions.insert(TransactionStatus::Failed, HashSet::new());
		transitions.insert(TransactionStatus::TimedOut, HashSet::new());
		transitions
	});

/// True when a record may move from `from` to `to`.
///
/// The table only moves forward: terminal statuses never change again, so
/// a repeated confirmation is a no-op rather than a second promotion.
pub fn can_transition(from: TransactionStatus, to: TransactionStatus) -> bool {
	TRANSITIONS
		.get(&from)
		.is_some_and(|allowed| allowed.contains(&to))
}

/// Collapses records sharing a hash, keeping the first occurrence.
pub fn dedup_by_hash(records: &mut Vec<HistoryRecord>) {
	let mut seen = HashSet::new();
	records.retain(|record| seen.insert(record.hash.to_lowercase()));
}

type AccountHistory = HashMap<Chain, Vec<HistoryRecord>>;

/// Stores and mutates transaction history across all known accounts.
pub struct HistoryService {
	storage: Arc<StorageService>,
	records: RwLock<HashMap<String, AccountHistory>>,
}

impl HistoryService {
	/// Creates an empty history over the given storage.
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			records: RwLock::new(HashMap::new()),
		}
	}

	/// Loads the stored snapshot for an account, deduplicating each
	/// chain's records. A missing snapshot loads as empty history.
	pub async fn load_account(&self, account_id: &str) -> Result<(), HistoryError> {
		let account_id = account_id.to_lowercase();
		let mut snapshot: AccountHistory = match self
			.storage
			.retrieve(StorageKey::History, &account_id)
			.await
		{
			Ok(snapshot) => snapshot,
			Err(StorageError::NotFound) => HashMap::new(),
			Err(e) => return Err(e.into()),
		};

		for records in snapshot.values_mut() {
			dedup_by_hash(records);
		}

		self.records.write().await.insert(account_id, snapshot);
		Ok(())
	}

	/// Returns the account's records on a chain, oldest first.
	pub async fn records(&self, account_id: &str, chain: Chain) -> Vec<HistoryRecord> {
		let account_id = account_id.to_lowercase();
		self.records
			.read()
			.await
			.get(&account_id)
			.and_then(|chains| chains.get(&chain))
			.cloned()
			.unwrap_or_default()
	}

	/// Appends a record unless one with the same hash already exists.
	///
	/// Returns false when the record was a duplicate and nothing changed.
	pub async fn insert(
		&self,
		account_id: &str,
		chain: Chain,
		record: HistoryRecord,
	) -> Result<bool, HistoryError> {
		let account_id = account_id.to_lowercase();
		let snapshot = {
			let mut map = self.records.write().await;
			let chains = map.entry(account_id.clone()).or_default();
			let records = chains.entry(chain).or_default();
			if records.iter().any(|r| same_hash(&r.hash, &record.hash)) {
				return Ok(false);
			}
			records.push(record);
			chains.clone()
		};

		self.persist(&account_id, &snapshot).await?;
		Ok(true)
	}

	/// Finds the account's record belonging to a submission batch.
	pub async fn find_by_batch(
		&self,
		account_id: &str,
		chain: Chain,
		batch_hash: &str,
	) -> Option<HistoryRecord> {
		let account_id = account_id.to_lowercase();
		self.records
			.read()
			.await
			.get(&account_id)
			.and_then(|chains| chains.get(&chain))
			.and_then(|records| records.iter().find(|r| r.matches_batch(batch_hash)))
			.cloned()
	}

	/// Rewrites the hash of every record in the batch on the chain, across
	/// all accounts. Records on other chains are untouched even when their
	/// batch hash collides.
	///
	/// Returns the ids of the accounts whose history changed.
	pub async fn rewrite_hash(
		&self,
		chain: Chain,
		batch_hash: &str,
		new_hash: &str,
	) -> Result<Vec<String>, HistoryError> {
		self.mutate_matching(chain, |record| {
			if record.matches_batch(batch_hash) && !same_hash(&record.hash, new_hash) {
				record.hash = new_hash.to_string();
				return true;
			}
			false
		})
		.await
	}

	/// Moves every record with the hash on the chain to the new status,
	/// where the transition table allows it, across all accounts.
	///
	/// Returns the ids of the accounts whose history changed.
	pub async fn set_status_by_hash(
		&self,
		chain: Chain,
		hash: &str,
		status: TransactionStatus,
	) -> Result<Vec<String>, HistoryError> {
		self.mutate_matching(chain, |record| {
			if same_hash(&record.hash, hash) && can_transition(record.status, status) {
				record.status = status;
				return true;
			}
			false
		})
		.await
	}

	/// Applies `apply` to every record on the chain and persists the
	/// accounts it changed.
	async fn mutate_matching<F>(&self, chain: Chain, mut apply: F) -> Result<Vec<String>, HistoryError>
	where
		F: FnMut(&mut HistoryRecord) -> bool,
	{
		let changed: Vec<(String, AccountHistory)> = {
			let mut map = self.records.write().await;
			let mut changed = Vec::new();
			for (account_id, chains) in map.iter_mut() {
				let Some(records) = chains.get_mut(&chain) else {
					continue;
				};
				let mut touched = false;
				for record in records.iter_mut() {
					if apply(record) {
						touched = true;
					}
				}
				if touched {
					changed.push((account_id.clone(), chains.clone()));
				}
			}
			changed
		};

		let mut account_ids = Vec::with_capacity(changed.len());
		for (account_id, snapshot) in changed {
			self.persist(&account_id, &snapshot).await?;
			account_ids.push(account_id);
		}
		Ok(account_ids)
	}

	async fn persist(
		&self,
		account_id: &str,
		snapshot: &AccountHistory,
	) -> Result<(), HistoryError> {
		self.storage
			.store(StorageKey::History, account_id, snapshot)
			.await?;
		Ok(())
	}
}
