//! Storage module for the wallet engine.
//!
//! This module provides abstractions for persisting wallet data, namely
//! accounts, per-account transaction history and the supported-assets
//! snapshot. Backends are pluggable; an in-memory implementation covers
//! tests and a file-based one covers real deployments.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use wallet_types::{ConfigSchema, ImplementationRegistry, StorageKey};

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Backends expose raw byte operations with optional TTL support; typed
/// access goes through [`StorageService`].
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries from storage (optional operation).
	/// Returns the number of entries removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0) // Default for backends without TTL support
	}
}

/// Type alias for storage factory functions.
///
/// Every storage implementation provides a function with this signature to
/// construct its backend from the `[storage.implementations.*]` config table.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples used by the builder to
/// register every available backend.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level storage service that provides typed operations.
///
/// The service wraps a low-level backend and serializes values as JSON.
/// Keys are namespaced by [`StorageKey`] so callers never hand-build the
/// `namespace:id` strings the backends see.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key_for(namespace: StorageKey, id: &str) -> String {
		format!("{}:{}", namespace.as_str(), id)
	}

	/// Stores a serializable value with optional time-to-live.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let key = Self::key_for(namespace, id);
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes, ttl).await
	}

	/// Stores a serializable value without time-to-live.
	///
	/// File-backed storage still applies the per-namespace TTL from its
	/// configuration when no explicit TTL is given.
	pub async fn store<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<T, StorageError> {
		let key = Self::key_for(namespace, id);
		let bytes = self.backend.get_bytes(&key).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: StorageKey, id: &str) -> Result<(), StorageError> {
		let key = Self::key_for(namespace, id);
		self.backend.delete(&key).await
	}

	/// Updates an existing value in storage.
	///
	/// Unlike [`store`](Self::store), this fails with [`StorageError::NotFound`]
	/// when the key does not already exist.
	pub async fn update<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key_for(namespace, id);

		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes, None).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: StorageKey, id: &str) -> Result<bool, StorageError> {
		let key = Self::key_for(namespace, id);
		self.backend.exists(&key).await
	}

	/// Removes expired entries from storage.
	///
	/// Returns the number of entries that were removed. This is a no-op for
	/// backends that don't support TTL.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Sample {
		label: String,
		count: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_typed_round_trip() {
		let storage = service();
		let value = Sample {
			label: "history".into(),
			count: 3,
		};

		storage
			.store(StorageKey::History, "0xabc", &value)
			.await
			.unwrap();

		let loaded: Sample = storage.retrieve(StorageKey::History, "0xabc").await.unwrap();
		assert_eq!(loaded, value);
	}

	#[tokio::test]
	async fn test_update_requires_existing_key() {
		let storage = service();
		let value = Sample {
			label: "accounts".into(),
			count: 1,
		};

		let result = storage.update(StorageKey::Accounts, "all", &value).await;
		assert!(matches!(result, Err(StorageError::NotFound)));

		storage
			.store(StorageKey::Accounts, "all", &value)
			.await
			.unwrap();
		storage
			.update(StorageKey::Accounts, "all", &value)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_namespaces_do_not_collide() {
		let storage = service();

		storage
			.store(StorageKey::Accounts, "shared", &1u32)
			.await
			.unwrap();
		storage
			.store(StorageKey::History, "shared", &2u32)
			.await
			.unwrap();

		let a: u32 = storage.retrieve(StorageKey::Accounts, "shared").await.unwrap();
		let h: u32 = storage.retrieve(StorageKey::History, "shared").await.unwrap();
		assert_eq!((a, h), (1, 2));
	}
}
