//! File-based storage backend implementation for the tradepost engine.
//!
//! Documents are stored one file per key, grouped into a directory per
//! partition, with atomic temp-then-rename writes. Write batches are made
//! atomic with a redo journal: the batch is serialized into the journal
//! first, and only then applied file by file. A batch whose journal file
//! exists is committed; replay at open applies any leftover journals, so
//! a crash between the destination write and the source delete of a
//! document relocation can never duplicate or lose the document.
//!
//! The storage directory is guarded by an exclusive `fs2` lock, keeping
//! the single-writer assumption honest across processes. If applying an
//! already-journaled batch faults at runtime, the store fail-stops for
//! writes; the journal completes the batch at the next open.

use crate::{BatchOp, DeleteGuard, PutGuard, StorageError, StorageInterface};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::fs;
use tradepost_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

const JOURNAL_DIR: &str = "_journal";
const LOCK_FILE: &str = ".lock";

/// One operation in a journaled batch.
///
/// Put payloads are embedded as UTF-8 JSON text so replay writes back
/// exactly the bytes the batch carried.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalOp {
	Put { key: String, payload: String },
	Delete { key: String },
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Monotonic journal sequence; journal file names sort in commit order.
	journal_seq: AtomicU64,
	/// Set when applying a journaled batch faulted; writes are refused
	/// until the journal is replayed at the next open.
	poisoned: AtomicBool,
	/// Serializes batch commits within the process.
	commit_lock: tokio::sync::Mutex<()>,
	/// Exclusive lock on the storage directory, held for the lifetime of
	/// this instance.
	_dir_lock: std::fs::File,
}

impl FileStorage {
	/// Opens the storage directory, acquiring its exclusive lock and
	/// replaying any journals a previous run left behind.
	pub fn open(base_path: PathBuf) -> Result<Self, StorageError> {
		let journal_dir = base_path.join(JOURNAL_DIR);
		std::fs::create_dir_all(&journal_dir)
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let dir_lock = std::fs::OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(false)
			.open(base_path.join(LOCK_FILE))
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		dir_lock.try_lock_exclusive().map_err(|e| {
			StorageError::Backend(format!(
				"storage directory {:?} is locked by another process: {}",
				base_path, e
			))
		})?;

		let next_seq = Self::recover_journals(&base_path, &journal_dir)?;

		Ok(Self {
			base_path,
			journal_seq: AtomicU64::new(next_seq),
			poisoned: AtomicBool::new(false),
			commit_lock: tokio::sync::Mutex::new(()),
			_dir_lock: dir_lock,
		})
	}

	/// Replays leftover journal files in commit order and removes them.
	/// Returns the next journal sequence number.
	fn recover_journals(base_path: &Path, journal_dir: &Path) -> Result<u64, StorageError> {
		let mut pending: Vec<(u64, PathBuf)> = Vec::new();
		let entries = std::fs::read_dir(journal_dir)
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		for entry in entries {
			let entry = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
			let path = entry.path();
			match path.extension().and_then(|e| e.to_str()) {
				// A .tmp journal never reached its rename; the batch
				// never committed.
				Some("tmp") => {
					let _ = std::fs::remove_file(&path);
				},
				Some("redo") => {
					let seq = path
						.file_stem()
						.and_then(|s| s.to_str())
						.and_then(|s| s.parse::<u64>().ok());
					match seq {
						Some(seq) => pending.push((seq, path)),
						None => {
							tracing::warn!("Skipping unrecognized journal file {:?}", path);
						},
					}
				},
				_ => {},
			}
		}
		pending.sort_by_key(|(seq, _)| *seq);

		let mut max_seq = 0;
		for (seq, path) in pending {
			let data =
				std::fs::read(&path).map_err(|e| StorageError::Backend(e.to_string()))?;
			let ops: Vec<JournalOp> = serde_json::from_slice(&data)
				.map_err(|e| StorageError::Serialization(e.to_string()))?;
			tracing::info!(journal = seq, ops = ops.len(), "Replaying write journal");
			for op in ops {
				Self::apply_journal_op_sync(base_path, &op)?;
			}
			std::fs::remove_file(&path).map_err(|e| StorageError::Backend(e.to_string()))?;
			max_seq = max_seq.max(seq);
		}
		Ok(max_seq + 1)
	}

	fn apply_journal_op_sync(base_path: &Path, op: &JournalOp) -> Result<(), StorageError> {
		match op {
			JournalOp::Put { key, payload } => {
				let path = Self::path_for(base_path, key);
				if let Some(parent) = path.parent() {
					std::fs::create_dir_all(parent)
						.map_err(|e| StorageError::Backend(e.to_string()))?;
				}
				let temp_path = path.with_extension("tmp");
				std::fs::write(&temp_path, payload.as_bytes())
					.map_err(|e| StorageError::Backend(e.to_string()))?;
				std::fs::rename(&temp_path, &path)
					.map_err(|e| StorageError::Backend(e.to_string()))?;
			},
			JournalOp::Delete { key } => {
				let path = Self::path_for(base_path, key);
				match std::fs::remove_file(&path) {
					Ok(_) => {},
					Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
					Err(e) => return Err(StorageError::Backend(e.to_string())),
				}
			},
		}
		Ok(())
	}

	/// Converts a storage key to a filesystem path.
	///
	/// The text before the first `:` selects the partition directory.
	/// Both halves are sanitized; document ids are expected to be
	/// filesystem-safe already, sanitation only guards against path
	/// separators.
	fn path_for(base_path: &Path, key: &str) -> PathBuf {
		let (namespace, id) = key.split_once(':').unwrap_or(("_root", key));
		base_path
			.join(sanitize(namespace))
			.join(format!("{}.json", sanitize(id)))
	}

	fn file_path(&self, key: &str) -> PathBuf {
		Self::path_for(&self.base_path, key)
	}

	fn check_writable(&self) -> Result<(), StorageError> {
		if self.poisoned.load(Ordering::Acquire) {
			return Err(StorageError::Backend(
				"storage fail-stopped after a write fault; reopen to recover".to_string(),
			));
		}
		Ok(())
	}

	async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		// Write atomically by writing to temp file then renaming
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, bytes)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(())
	}

	async fn apply_op(&self, op: &BatchOp) -> Result<(), StorageError> {
		match op {
			BatchOp::Put { key, bytes, .. } => {
				self.write_file(&self.file_path(key), bytes).await
			},
			BatchOp::Delete { key, .. } => match fs::remove_file(self.file_path(key)).await {
				Ok(_) => Ok(()),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
				Err(e) => Err(StorageError::Backend(e.to_string())),
			},
		}
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.file_path(key);
		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.check_writable()?;
		let _guard = self.commit_lock.lock().await;
		self.write_file(&self.file_path(key), &value).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.check_writable()?;
		let _guard = self.commit_lock.lock().await;
		match fs::remove_file(self.file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.file_path(key).exists())
	}

	async fn list_bytes(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
		let (namespace, id_prefix) = prefix.split_once(':').unwrap_or((prefix, ""));
		let dir = self.base_path.join(sanitize(namespace));
		if !dir.exists() {
			return Ok(Vec::new());
		}

		let mut entries = fs::read_dir(&dir)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		let mut results: Vec<(String, Vec<u8>)> = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("json")) {
				continue;
			}
			let id = match path.file_stem().and_then(|s| s.to_str()) {
				Some(stem) if stem.starts_with(id_prefix) => stem.to_string(),
				_ => continue,
			};
			let bytes = fs::read(&path)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
			results.push((id, bytes));
		}
		results.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(results)
	}

	async fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
		self.check_writable()?;
		let _guard = self.commit_lock.lock().await;

		// Guards are evaluated against the pre-batch state. The commit
		// lock and the directory lock make this free of write races.
		for op in &ops {
			match op {
				BatchOp::Put {
					key,
					guard: PutGuard::IfAbsent,
					..
				} if self.file_path(key).exists() => {
					return Err(StorageError::PreconditionFailed {
						key: key.clone(),
						reason: "key already exists".to_string(),
					});
				},
				BatchOp::Delete {
					key,
					guard: DeleteGuard::MustExist,
				} if !self.file_path(key).exists() => {
					return Err(StorageError::PreconditionFailed {
						key: key.clone(),
						reason: "key does not exist".to_string(),
					});
				},
				_ => {},
			}
		}

		// Journal the batch. Once the rename lands, the batch is
		// committed regardless of what happens below.
		let journal_ops: Vec<JournalOp> = ops
			.iter()
			.map(|op| match op {
				BatchOp::Put { key, bytes, .. } => {
					String::from_utf8(bytes.clone())
						.map(|payload| JournalOp::Put {
							key: key.clone(),
							payload,
						})
						.map_err(|e| StorageError::Serialization(e.to_string()))
				},
				BatchOp::Delete { key, .. } => Ok(JournalOp::Delete { key: key.clone() }),
			})
			.collect::<Result<_, _>>()?;
		let journal_bytes = serde_json::to_vec(&journal_ops)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;

		let seq = self.journal_seq.fetch_add(1, Ordering::SeqCst);
		let journal_path = self
			.base_path
			.join(JOURNAL_DIR)
			.join(format!("{:016}.redo", seq));
		let journal_tmp = journal_path.with_extension("tmp");
		fs::write(&journal_tmp, &journal_bytes)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&journal_tmp, &journal_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		for op in &ops {
			if let Err(e) = self.apply_op(op).await {
				// The journal completes this batch at the next open;
				// refuse further writes so no later write can be
				// reordered before it.
				self.poisoned.store(true, Ordering::Release);
				tracing::error!(key = op.key(), error = %e, "Write fault while applying journaled batch");
				return Err(e);
			}
		}

		if let Err(e) = fs::remove_file(&journal_path).await {
			// Replay of a fully applied journal is idempotent.
			tracing::warn!(journal = seq, error = %e, "Failed to remove applied journal");
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

fn sanitize(part: &str) -> String {
	part.replace(['/', '\\', ':', '\0'], "_")
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![], // No required fields
			vec![Field::new("storage_path", FieldType::String)],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/tradepost")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/tradepost")
		.to_string();

	Ok(Box::new(FileStorage::open(PathBuf::from(storage_path))?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl tradepost_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
