//! Activity log sink for the tradepost engine.
//!
//! This module records who did what and when. Every order transition,
//! stock adjustment, archival and restoration appends one
//! [`ActivityLog`] entry here. Entries are append-only: nothing in the
//! engine ever rewrites one, and only admins may delete or purge them.
//!
//! Engines that commit a transition atomically fold the matching log
//! entry into the same [`WriteBatch`] via [`AuditService::append_to`],
//! so a transition and its audit trail land (or fail) together.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use tradepost_idgen::IdMinter;
use tradepost_storage::{DeleteGuard, PutGuard, StorageError, StorageService, WriteBatch};
use tradepost_types::{ActivityLog, Actor, Partition};

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
	/// Error that occurs when a requested log entry does not exist.
	#[error("Activity log {0} not found")]
	NotFound(String),
	/// Error that occurs when a non-admin attempts a privileged operation.
	#[error("Role '{0}' may not delete activity logs")]
	Forbidden(String),
	/// Error that occurs in the underlying storage layer.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Service for recording and querying activity logs.
///
/// Log ids are minted centrally through the shared [`IdMinter`], so
/// entries created in the same millisecond still sort in creation
/// order.
pub struct AuditService {
	storage: Arc<StorageService>,
	minter: Arc<IdMinter>,
}

impl AuditService {
	/// Creates a new AuditService over the given storage and id minter.
	pub fn new(storage: Arc<StorageService>, minter: Arc<IdMinter>) -> Self {
		Self { storage, minter }
	}

	/// Builds a log entry for an action, stamping a fresh log id, the
	/// acting user and the current time.
	///
	/// The entry is not persisted until passed to [`Self::record`] or
	/// [`Self::append_to`].
	pub fn entry(&self, action: impl Into<String>, actor: &Actor) -> ActivityLog {
		ActivityLog::new(self.minter.log_id(), action, actor)
	}

	/// Persists a single log entry on its own.
	///
	/// Used for actions that are not part of a larger atomic write, such
	/// as stock adjustments.
	pub async fn record(&self, entry: &ActivityLog) -> Result<(), AuditError> {
		let mut batch = WriteBatch::new();
		batch.put(Partition::ActivityLogs, &entry.id, entry, PutGuard::IfAbsent)?;
		self.storage.commit(batch).await?;
		debug!(log_id = %entry.id, action = %entry.action, "recorded activity log");
		Ok(())
	}

	/// Folds a log append into a caller-owned batch.
	///
	/// The entry commits together with whatever else the batch carries.
	pub fn append_to(&self, batch: &mut WriteBatch, entry: &ActivityLog) -> Result<(), StorageError> {
		batch.put(Partition::ActivityLogs, &entry.id, entry, PutGuard::IfAbsent)
	}

	/// Fetches a single log entry by id.
	pub async fn get(&self, log_id: &str) -> Result<ActivityLog, AuditError> {
		match self.storage.retrieve(Partition::ActivityLogs, log_id).await {
			Ok(entry) => Ok(entry),
			Err(StorageError::NotFound) => Err(AuditError::NotFound(log_id.to_string())),
			Err(e) => Err(e.into()),
		}
	}

	/// Lists all log entries in chronological order.
	pub async fn list(&self) -> Result<Vec<ActivityLog>, AuditError> {
		let mut entries: Vec<ActivityLog> = self
			.storage
			.list::<ActivityLog>(Partition::ActivityLogs)
			.await?
			.into_iter()
			.map(|(_, entry)| entry)
			.collect();
		entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
		Ok(entries)
	}

	/// Lists all log entries attributed to the given actor email, in
	/// chronological order.
	///
	/// User archival calls this to snapshot the departing user's trail
	/// into the archive record.
	pub async fn list_by_actor(&self, email: &str) -> Result<Vec<ActivityLog>, AuditError> {
		let mut entries = self.list().await?;
		entries.retain(|entry| entry.user_email == email);
		Ok(entries)
	}

	/// Deletes one log entry. Admin only.
	pub async fn delete(&self, log_id: &str, actor: &Actor) -> Result<(), AuditError> {
		if !actor.is_admin() {
			return Err(AuditError::Forbidden(actor.role.to_string()));
		}
		let mut batch = WriteBatch::new();
		batch.delete(Partition::ActivityLogs, log_id, DeleteGuard::MustExist);
		match self.storage.commit(batch).await {
			Ok(()) => {
				info!(log_id = %log_id, admin = %actor.email, "deleted activity log");
				Ok(())
			},
			Err(StorageError::PreconditionFailed { .. }) => {
				Err(AuditError::NotFound(log_id.to_string()))
			},
			Err(e) => Err(e.into()),
		}
	}

	/// Deletes every log entry in one atomic batch. Admin only.
	///
	/// Returns the number of entries removed.
	pub async fn purge(&self, actor: &Actor) -> Result<usize, AuditError> {
		if !actor.is_admin() {
			return Err(AuditError::Forbidden(actor.role.to_string()));
		}
		let entries = self.list().await?;
		if entries.is_empty() {
			return Ok(0);
		}
		let mut batch = WriteBatch::new();
		for entry in &entries {
			batch.delete(Partition::ActivityLogs, &entry.id, DeleteGuard::None);
		}
		self.storage.commit(batch).await?;
		info!(
			count = entries.len(),
			admin = %actor.email,
			"purged activity logs"
		);
		Ok(entries.len())
	}
}
