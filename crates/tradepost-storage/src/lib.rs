//! Storage module for the tradepost engine.
//!
//! This module provides abstractions for persistent storage of partitioned
//! documents, supporting different backend implementations such as
//! in-memory or file-based storage.
//!
//! Beyond plain key-value operations, every backend commits
//! [`WriteBatch`]es atomically: either all operations in a batch take
//! effect or none do. Engine transitions lean on this to relocate a
//! document and append its activity log entry as one unit, so a crash can
//! never leave an order in two partitions or in none.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tradepost_types::{ConfigSchema, ImplementationRegistry, Partition};

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
	/// Error that occurs when a batch guard is violated. The whole batch
	/// is rejected and nothing is written.
	#[error("Precondition failed for key '{key}': {reason}")]
	PreconditionFailed { key: String, reason: String },
}

/// Composes the backend key for a document.
///
/// The partition and id are combined into a single flat key; backends
/// treat the text before the first `:` as the partition namespace.
pub fn storage_key(partition: Partition, id: &str) -> String {
	format!("{}:{}", partition.as_str(), id)
}

/// Guard on a put operation within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutGuard {
	/// Write unconditionally.
	None,
	/// Fail the batch if the key already exists. Turns a lost race into
	/// a visible conflict instead of a silent overwrite.
	IfAbsent,
}

/// Guard on a delete operation within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteGuard {
	/// Delete if present, succeed either way.
	None,
	/// Fail the batch if the key does not exist.
	MustExist,
}

/// One operation within a write batch.
///
/// Keys are pre-composed; use [`WriteBatch`] to build ops from typed
/// documents.
#[derive(Debug, Clone)]
pub enum BatchOp {
	Put {
		key: String,
		bytes: Vec<u8>,
		guard: PutGuard,
	},
	Delete {
		key: String,
		guard: DeleteGuard,
	},
}

impl BatchOp {
	/// The key this operation touches.
	pub fn key(&self) -> &str {
		match self {
			BatchOp::Put { key, .. } => key,
			BatchOp::Delete { key, .. } => key,
		}
	}
}

/// An ordered set of operations committed atomically.
///
/// Guards are evaluated against the state as it was before the batch;
/// operations within one batch are expected to touch distinct keys.
/// A prepared batch can be cloned and handed to a retry loop.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
	ops: Vec<BatchOp>,
}

impl WriteBatch {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a guarded put of a serializable document.
	pub fn put<T: Serialize>(
		&mut self,
		partition: Partition,
		id: &str,
		data: &T,
		guard: PutGuard,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.ops.push(BatchOp::Put {
			key: storage_key(partition, id),
			bytes,
			guard,
		});
		Ok(())
	}

	/// Adds a guarded delete.
	pub fn delete(&mut self, partition: Partition, id: &str, guard: DeleteGuard) {
		self.ops.push(BatchOp::Delete {
			key: storage_key(partition, id),
			guard,
		});
	}

	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}

	pub fn len(&self) -> usize {
		self.ops.len()
	}

	/// Consumes the batch into its operations.
	pub fn into_ops(self) -> Vec<BatchOp> {
		self.ops
	}
}

/// Trait defining the low-level interface for storage backends.
///
/// This trait must be implemented by any storage backend that wants to
/// integrate with the engine. It provides basic key-value operations
/// plus atomic multi-key batches and per-partition listing.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists all `(id, bytes)` pairs whose key starts with the given
	/// prefix, with the prefix stripped from the returned ids. Results
	/// are sorted by id.
	async fn list_bytes(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

	/// Applies all operations atomically, or none of them.
	///
	/// Guards are checked against the pre-batch state first; a violated
	/// guard rejects the whole batch with
	/// [`StorageError::PreconditionFailed`].
	async fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
///
/// This is the function signature that all storage implementations must
/// provide to create instances of their storage interface.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
///
/// This trait extends the base ImplementationRegistry to specify that
/// storage implementations must provide a StorageFactory.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage
/// implementations. This is used by the factory registry to automatically
/// register all implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed documents with
/// automatic serialization/deserialization, keyed by [`Partition`].
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable document, creating or overwriting.
	pub async fn store<T: Serialize>(
		&self,
		partition: Partition,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&storage_key(partition, id), bytes)
			.await
	}

	/// Retrieves and deserializes a document.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		partition: Partition,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&storage_key(partition, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Updates an existing document.
	///
	/// This method first checks that the key exists, making it
	/// semantically different from store() which will create or
	/// overwrite.
	pub async fn update<T: Serialize>(
		&self,
		partition: Partition,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = storage_key(partition, id);

		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await
	}

	/// Removes a document.
	pub async fn remove(&self, partition: Partition, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&storage_key(partition, id)).await
	}

	/// Checks if a document exists.
	pub async fn exists(&self, partition: Partition, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&storage_key(partition, id)).await
	}

	/// Lists and deserializes all documents in a partition, sorted by id.
	pub async fn list<T: DeserializeOwned>(
		&self,
		partition: Partition,
	) -> Result<Vec<(String, T)>, StorageError> {
		let prefix = format!("{}:", partition.as_str());
		let raw = self.backend.list_bytes(&prefix).await?;
		raw.into_iter()
			.map(|(id, bytes)| {
				serde_json::from_slice(&bytes)
					.map(|value| (id, value))
					.map_err(|e| StorageError::Serialization(e.to_string()))
			})
			.collect()
	}

	/// Commits a write batch atomically.
	pub async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
		self.backend.apply_batch(batch.into_ops()).await
	}
}
