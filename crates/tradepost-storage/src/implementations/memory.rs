//! In-memory storage backend implementation for the tradepost engine.
//!
//! This module provides a memory-based implementation of the
//! StorageInterface trait, useful for testing and development scenarios
//! where persistence is not required. Batch atomicity falls out of the
//! locking: every batch validates and applies under a single write-lock
//! acquisition.

use crate::{BatchOp, DeleteGuard, PutGuard, StorageError, StorageInterface};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tradepost_types::{ConfigSchema, Schema, ValidationError};

/// In-memory storage implementation.
///
/// This implementation stores data in a HashMap in memory, providing
/// fast access but no persistence across restarts.
pub struct MemoryStorage {
	/// The in-memory store protected by a read-write lock.
	store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}

	async fn list_bytes(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let store = self.store.read().await;
		let mut entries: Vec<(String, Vec<u8>)> = store
			.iter()
			.filter_map(|(key, value)| {
				key.strip_prefix(prefix)
					.map(|id| (id.to_string(), value.clone()))
			})
			.collect();
		entries.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(entries)
	}

	async fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;

		// Guards are checked against the pre-batch state; holding the
		// write lock across check and apply is the atomicity.
		for op in &ops {
			match op {
				BatchOp::Put {
					key,
					guard: PutGuard::IfAbsent,
					..
				} if store.contains_key(key) => {
					return Err(StorageError::PreconditionFailed {
						key: key.clone(),
						reason: "key already exists".to_string(),
					});
				},
				BatchOp::Delete {
					key,
					guard: DeleteGuard::MustExist,
				} if !store.contains_key(key) => {
					return Err(StorageError::PreconditionFailed {
						key: key.clone(),
						reason: "key does not exist".to_string(),
					});
				},
				_ => {},
			}
		}

		for op in ops {
			match op {
				BatchOp::Put { key, bytes, .. } => {
					store.insert(key, bytes);
				},
				BatchOp::Delete { key, .. } => {
					store.remove(&key);
				},
			}
		}

		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage has no required configuration
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
///
/// Configuration parameters:
/// - None required for memory storage
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl tradepost_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		// Test set and get
		let key = "orders:ORD-1";
		let value = b"test_value".to_vec();
		storage.set_bytes(key, value.clone()).await.unwrap();

		let retrieved = storage.get_bytes(key).await.unwrap();
		assert_eq!(retrieved, value);

		// Test exists
		assert!(storage.exists(key).await.unwrap());

		// Test delete
		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());

		// Test get after delete
		let result = storage.get_bytes(key).await;
		assert!(matches!(result, Err(StorageError::NotFound)));
	}

	#[tokio::test]
	async fn test_overwrite() {
		let storage = MemoryStorage::new();

		let key = "orders:ORD-1";
		let value1 = b"value1".to_vec();
		let value2 = b"value2".to_vec();

		// Set initial value
		storage.set_bytes(key, value1.clone()).await.unwrap();
		let retrieved = storage.get_bytes(key).await.unwrap();
		assert_eq!(retrieved, value1);

		// Overwrite with new value
		storage.set_bytes(key, value2.clone()).await.unwrap();
		let retrieved = storage.get_bytes(key).await.unwrap();
		assert_eq!(retrieved, value2);
	}

	#[tokio::test]
	async fn test_list_strips_prefix_and_sorts() {
		let storage = MemoryStorage::new();
		storage.set_bytes("orders:ORD-2", b"b".to_vec()).await.unwrap();
		storage.set_bytes("orders:ORD-1", b"a".to_vec()).await.unwrap();
		storage.set_bytes("to_ship:ORD-3", b"c".to_vec()).await.unwrap();

		let listed = storage.list_bytes("orders:").await.unwrap();
		let ids: Vec<&str> = listed.iter().map(|(id, _)| id.as_str()).collect();
		assert_eq!(ids, vec!["ORD-1", "ORD-2"]);
	}

	#[tokio::test]
	async fn test_batch_applies_all_ops() {
		let storage = MemoryStorage::new();
		storage.set_bytes("orders:ORD-1", b"placed".to_vec()).await.unwrap();

		let ops = vec![
			BatchOp::Put {
				key: "to_ship:ORD-1".to_string(),
				bytes: b"packed".to_vec(),
				guard: PutGuard::IfAbsent,
			},
			BatchOp::Delete {
				key: "orders:ORD-1".to_string(),
				guard: DeleteGuard::MustExist,
			},
		];
		storage.apply_batch(ops).await.unwrap();

		assert!(!storage.exists("orders:ORD-1").await.unwrap());
		assert_eq!(
			storage.get_bytes("to_ship:ORD-1").await.unwrap(),
			b"packed".to_vec()
		);
	}

	#[tokio::test]
	async fn test_batch_with_violated_guard_applies_nothing() {
		let storage = MemoryStorage::new();
		storage.set_bytes("orders:ORD-1", b"placed".to_vec()).await.unwrap();

		// Second op's guard fails: ORD-9 was never stored.
		let ops = vec![
			BatchOp::Put {
				key: "to_ship:ORD-1".to_string(),
				bytes: b"packed".to_vec(),
				guard: PutGuard::IfAbsent,
			},
			BatchOp::Delete {
				key: "orders:ORD-9".to_string(),
				guard: DeleteGuard::MustExist,
			},
		];
		let err = storage.apply_batch(ops).await.unwrap_err();
		assert!(matches!(err, StorageError::PreconditionFailed { .. }));

		// The put earlier in the batch must not have landed.
		assert!(!storage.exists("to_ship:ORD-1").await.unwrap());
		assert!(storage.exists("orders:ORD-1").await.unwrap());
	}

	#[tokio::test]
	async fn test_if_absent_guard_rejects_existing_key() {
		let storage = MemoryStorage::new();
		storage.set_bytes("to_ship:ORD-1", b"dup".to_vec()).await.unwrap();

		let ops = vec![BatchOp::Put {
			key: "to_ship:ORD-1".to_string(),
			bytes: b"packed".to_vec(),
			guard: PutGuard::IfAbsent,
		}];
		let err = storage.apply_batch(ops).await.unwrap_err();
		assert!(matches!(err, StorageError::PreconditionFailed { .. }));

		// Original value untouched.
		assert_eq!(
			storage.get_bytes("to_ship:ORD-1").await.unwrap(),
			b"dup".to_vec()
		);
	}
}
