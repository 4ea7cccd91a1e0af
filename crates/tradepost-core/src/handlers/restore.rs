//! Restoration engine.
//!
//! Restoration inverts archival: the wrapper's payload is written back
//! into its origin partition under the original id and the wrapper is
//! deleted, in one batch, so the archive metadata never leaks into the
//! live document. Full user restoration replays every embedded
//! dependent row the same way inside a single batch, with an
//! exists-probe per row so a re-run never clobbers live data. An
//! in-memory attempt map keeps at most one restoration per user in
//! flight and exposes its state for polling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, instrument, warn};
use tradepost_storage::{
	DeleteGuard, PutGuard, StorageError, StorageService, WriteBatch,
};
use tradepost_types::{truncate_id, ArchiveRecord, Partition, RestoreReport, RestoreState};

use crate::engine::EngineError;
use crate::retry::{with_retries, RetryPolicy};

/// Last known restoration attempt for one user.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RestoreAttempt {
	pub(crate) state: RestoreState,
	pub(crate) updated_at: Instant,
}

impl RestoreAttempt {
	pub(crate) fn restoring() -> Self {
		Self {
			state: RestoreState::Restoring,
			updated_at: Instant::now(),
		}
	}

	fn settled(state: RestoreState) -> Self {
		Self {
			state,
			updated_at: Instant::now(),
		}
	}
}

/// Engine writing archived documents back into their live partitions.
pub struct RestorationEngine {
	storage: Arc<StorageService>,
	retry: RetryPolicy,
	pub(crate) states: DashMap<String, RestoreAttempt>,
}

impl RestorationEngine {
	pub fn new(storage: Arc<StorageService>, retry: RetryPolicy) -> Self {
		Self {
			storage,
			retry,
			states: DashMap::new(),
		}
	}

	/// Claims the restoration slot for a user.
	///
	/// Returns a conflict while another restoration for the same user
	/// is still marked in flight.
	fn begin(&self, user_id: &str) -> Result<(), EngineError> {
		match self.states.entry(user_id.to_string()) {
			Entry::Occupied(mut slot) => {
				if slot.get().state == RestoreState::Restoring {
					return Err(EngineError::Conflict(format!(
						"A restoration for user {} is already in progress",
						user_id
					)));
				}
				slot.insert(RestoreAttempt::restoring());
			},
			Entry::Vacant(slot) => {
				slot.insert(RestoreAttempt::restoring());
			},
		}
		Ok(())
	}

	fn finish(&self, user_id: &str, state: RestoreState) {
		self.states
			.insert(user_id.to_string(), RestoreAttempt::settled(state));
	}

	/// State of the most recent restoration attempt for a user, if any.
	pub fn restore_state(&self, user_id: &str) -> Option<RestoreState> {
		self.states.get(user_id).map(|attempt| attempt.state)
	}

	/// Marks in-flight attempts older than `max_age` as failed and
	/// returns how many were cleared. A crashed restoration leaves its
	/// slot in `Restoring` forever otherwise, blocking every retry.
	pub fn clear_stale(&self, max_age: Duration) -> usize {
		let mut cleared = 0;
		for mut slot in self.states.iter_mut() {
			if slot.state == RestoreState::Restoring && slot.updated_at.elapsed() >= max_age {
				warn!(user_id = %truncate_id(slot.key()), "clearing stale restoration attempt");
				*slot = RestoreAttempt::settled(RestoreState::Failed);
				cleared += 1;
			}
		}
		cleared
	}

	/// Looks an archive record up by id across every archive partition.
	async fn find_record(
		&self,
		archive_id: &str,
	) -> Result<(Partition, ArchiveRecord), EngineError> {
		for partition in Partition::all() {
			if !partition.is_archive() {
				continue;
			}
			match self.storage.retrieve(partition, archive_id).await {
				Ok(record) => return Ok((partition, record)),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e.into()),
			}
		}
		Err(EngineError::NotFound(format!(
			"Archive record {} not found",
			archive_id
		)))
	}

	/// Restores a single archived document.
	///
	/// The payload goes back to the origin partition under the original
	/// id and the archive record is deleted. A second call finds no
	/// record and returns not-found.
	#[instrument(skip_all, fields(archive_id = %truncate_id(archive_id)))]
	pub async fn restore_entity(&self, archive_id: &str) -> Result<Value, EngineError> {
		let (archive, record) = self.find_record(archive_id).await?;
		if record.original_doc_id.is_empty() {
			return Err(EngineError::NotFound(format!(
				"Archive record {} carries no original document id",
				archive_id
			)));
		}
		let origin = record.origin_partition().ok_or_else(|| {
			EngineError::Validation(format!(
				"Archive record {} names unknown origin partition '{}'",
				archive_id, record.original_collection
			))
		})?;

		let mut batch = WriteBatch::new();
		batch.put(origin, &record.original_doc_id, &record.payload, PutGuard::IfAbsent)?;
		batch.delete(archive, archive_id, DeleteGuard::MustExist);

		let storage = &self.storage;
		let result = with_retries(&self.retry, "restore entity", move || {
			let batch = batch.clone();
			async move { storage.commit(batch).await }
		})
		.await;

		match result {
			Ok(()) => {},
			Err(StorageError::PreconditionFailed { .. }) => {
				return Err(EngineError::Conflict(format!(
					"Restore of {} collided with a live document or a concurrent restore",
					archive_id
				)))
			},
			Err(e) => return Err(e.into()),
		}

		info!(origin = %origin, "entity restored");
		Ok(record.payload)
	}

	/// Restores only the user's base record, leaving dependent rows
	/// archived.
	#[instrument(skip_all, fields(user_id = %truncate_id(user_id)))]
	pub async fn restore_user_only(&self, user_id: &str) -> Result<RestoreReport, EngineError> {
		let record: ArchiveRecord =
			match self.storage.retrieve(Partition::UsersArchive, user_id).await {
				Ok(record) => record,
				Err(StorageError::NotFound) => {
					return Err(EngineError::NotFound(format!(
						"No archive record for user {}",
						user_id
					)))
				},
				Err(e) => return Err(e.into()),
			};
		self.begin(user_id)?;

		let mut batch = WriteBatch::new();
		if let Err(e) = batch.put(Partition::Users, user_id, &record.payload, PutGuard::IfAbsent) {
			self.finish(user_id, RestoreState::Failed);
			return Err(e.into());
		}
		batch.delete(Partition::UsersArchive, user_id, DeleteGuard::MustExist);

		self.commit_restore(user_id, batch, "restore user").await?;
		info!("user record restored");
		Ok(RestoreReport { restored: 1 })
	}

	/// Restores the user's base record and every archived dependent row
	/// in one batch.
	///
	/// Each row is probed first and skipped when a live document with
	/// its id already exists, so replaying a partially applied restore
	/// only fills the gaps. The report counts documents actually
	/// written.
	#[instrument(skip_all, fields(user_id = %truncate_id(user_id)))]
	pub async fn restore_user_with_all_data(
		&self,
		user_id: &str,
	) -> Result<RestoreReport, EngineError> {
		let record: ArchiveRecord =
			match self.storage.retrieve(Partition::UsersArchive, user_id).await {
				Ok(record) => record,
				Err(StorageError::NotFound) => {
					return Err(EngineError::NotFound(format!(
						"No archive record for user {}",
						user_id
					)))
				},
				Err(e) => return Err(e.into()),
			};
		self.begin(user_id)?;

		let batch = match self.build_full_restore(user_id, &record).await {
			Ok(prepared) => prepared,
			Err(e) => {
				self.finish(user_id, RestoreState::Failed);
				return Err(e);
			},
		};
		let restored = batch.restored;

		self.commit_restore(user_id, batch.batch, "restore user data")
			.await?;
		info!(restored, "user and dependents restored");
		Ok(RestoreReport { restored })
	}

	async fn build_full_restore(
		&self,
		user_id: &str,
		record: &ArchiveRecord,
	) -> Result<PreparedRestore, EngineError> {
		let mut batch = WriteBatch::new();
		let mut restored = 0;

		if !self.storage.exists(Partition::Users, user_id).await? {
			batch.put(Partition::Users, user_id, &record.payload, PutGuard::IfAbsent)?;
			restored += 1;
		}
		batch.delete(Partition::UsersArchive, user_id, DeleteGuard::MustExist);

		for partition in Partition::user_dependents() {
			let twin = match partition.archive_of() {
				Some(twin) => twin,
				None => continue,
			};
			let rows = self.storage.list::<ArchiveRecord>(twin).await?;
			for (row_id, wrapper) in rows {
				if wrapper.payload.get("userId").and_then(Value::as_str) != Some(user_id) {
					continue;
				}
				let origin = match wrapper.origin_partition() {
					Some(origin) => origin,
					None => {
						warn!(
							row_id = %truncate_id(&row_id),
							collection = %wrapper.original_collection,
							"archived row names unknown origin partition; leaving it archived"
						);
						continue;
					},
				};
				if !self.storage.exists(origin, &wrapper.original_doc_id).await? {
					batch.put(
						origin,
						&wrapper.original_doc_id,
						&wrapper.payload,
						PutGuard::IfAbsent,
					)?;
					restored += 1;
				}
				batch.delete(twin, &row_id, DeleteGuard::MustExist);
			}
		}

		Ok(PreparedRestore { batch, restored })
	}

	/// Commits a restoration batch and settles the user's attempt slot.
	///
	/// A precondition failure means another restore or a live write won
	/// the race, so the claim is dropped rather than recorded as a
	/// failure.
	async fn commit_restore(
		&self,
		user_id: &str,
		batch: WriteBatch,
		label: &'static str,
	) -> Result<(), EngineError> {
		let storage = &self.storage;
		let result = with_retries(&self.retry, label, move || {
			let batch = batch.clone();
			async move { storage.commit(batch).await }
		})
		.await;

		match result {
			Ok(()) => {
				self.finish(user_id, RestoreState::Restored);
				Ok(())
			},
			Err(StorageError::PreconditionFailed { .. }) => {
				self.states.remove(user_id);
				Err(EngineError::Conflict(format!(
					"Restore of user {} collided with a concurrent restore",
					user_id
				)))
			},
			Err(e) => {
				self.finish(user_id, RestoreState::Failed);
				Err(e.into())
			},
		}
	}
}

struct PreparedRestore {
	batch: WriteBatch,
	restored: usize,
}
