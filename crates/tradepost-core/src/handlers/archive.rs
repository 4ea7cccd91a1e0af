//! Archival engine.
//!
//! Archiving moves a document into its partition's archive twin,
//! wrapped in an [`ArchiveRecord`] carrying provenance, and deletes the
//! original, in one batch. Admin archives additionally bundle the
//! admin's activity trail as a point-in-time snapshot and mint a
//! removal token. User archival is composite: the user's rows in every
//! dependent partition are moved into their archive twins in the same
//! batch and embedded in the user's record as snapshots.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};
use tradepost_audit::AuditService;
use tradepost_idgen::IdMinter;
use tradepost_storage::{
	DeleteGuard, PutGuard, StorageError, StorageService, WriteBatch,
};
use tradepost_types::{
	truncate_id, Actor, ArchiveOutcome, ArchiveRecord, EntityKind, Partition,
};

use crate::engine::EngineError;
use crate::retry::{with_retries, RetryPolicy};

/// True when a row belongs to the given user.
///
/// Live rows carry `userId` at the top level; archive wrappers carry it
/// inside their payload.
fn matches_user(row: &Value, user_id: &str) -> bool {
	let top = row.get("userId").and_then(Value::as_str) == Some(user_id);
	let nested = row
		.get("payload")
		.and_then(|payload| payload.get("userId"))
		.and_then(Value::as_str)
		== Some(user_id);
	top || nested
}

/// Engine moving entities and their dependents into archive partitions.
pub struct ArchivalEngine {
	storage: Arc<StorageService>,
	audit: Arc<AuditService>,
	minter: Arc<IdMinter>,
	retry: RetryPolicy,
}

impl ArchivalEngine {
	pub fn new(
		storage: Arc<StorageService>,
		audit: Arc<AuditService>,
		minter: Arc<IdMinter>,
		retry: RetryPolicy,
	) -> Self {
		Self {
			storage,
			audit,
			minter,
			retry,
		}
	}

	/// Finds which lifecycle partition currently holds an order.
	async fn locate_order(&self, order_id: &str) -> Result<Partition, EngineError> {
		for partition in Partition::lifecycle() {
			if self.storage.exists(partition, order_id).await? {
				return Ok(partition);
			}
		}
		Err(EngineError::NotFound(format!(
			"Order {} not found in any lifecycle partition",
			order_id
		)))
	}

	/// All rows in a partition belonging to the given user.
	async fn rows_for_user(
		&self,
		partition: Partition,
		user_id: &str,
	) -> Result<Vec<(String, Value)>, EngineError> {
		let rows = self
			.storage
			.list::<Value>(partition)
			.await?
			.into_iter()
			.filter(|(_, row)| matches_user(row, user_id))
			.collect();
		Ok(rows)
	}

	/// Archives a single entity: wrap, write to the archive twin,
	/// delete the original.
	///
	/// Admin archives bundle the admin's activity trail and mint a
	/// removal token returned to the caller. The live activity log is
	/// left untouched; the bundle is a snapshot.
	#[instrument(skip_all, fields(kind = %kind, entity_id = %truncate_id(entity_id)))]
	pub async fn archive_entity(
		&self,
		kind: EntityKind,
		entity_id: &str,
		actor: &Actor,
	) -> Result<ArchiveOutcome, EngineError> {
		let source = match kind.partition() {
			Some(partition) => partition,
			None => self.locate_order(entity_id).await?,
		};
		let archive = source.archive_of().ok_or_else(|| {
			EngineError::Validation(format!("Partition '{}' has no archive twin", source))
		})?;

		let payload: Value = match self.storage.retrieve(source, entity_id).await {
			Ok(payload) => payload,
			Err(StorageError::NotFound) => {
				return Err(EngineError::NotFound(format!(
					"{} {} not found",
					kind, entity_id
				)))
			},
			Err(e) => return Err(e.into()),
		};

		let mut record = ArchiveRecord::wrap(entity_id, source, actor, payload.clone());
		let mut removal_token = None;
		if kind == EntityKind::Admin {
			let email = payload
				.get("email")
				.and_then(Value::as_str)
				.unwrap_or_default();
			let trail = self.audit.list_by_actor(email).await?;
			let token = self.minter.removal_token();
			record = record
				.with_activity_logs(trail)
				.with_removal_token(token.clone());
			removal_token = Some(token);
		}

		let entry = self
			.audit
			.entry(format!("Archived {} {}", kind, entity_id), actor);

		let mut batch = WriteBatch::new();
		batch.put(archive, entity_id, &record, PutGuard::IfAbsent)?;
		batch.delete(source, entity_id, DeleteGuard::MustExist);
		self.audit.append_to(&mut batch, &entry)?;

		let storage = &self.storage;
		let result = with_retries(&self.retry, "archive entity", move || {
			let batch = batch.clone();
			async move { storage.commit(batch).await }
		})
		.await;

		match result {
			Ok(()) => {},
			Err(StorageError::PreconditionFailed { .. }) => {
				return Err(EngineError::Conflict(format!(
					"{} {} is already archived or was moved concurrently",
					kind, entity_id
				)))
			},
			Err(e) => return Err(e.into()),
		}

		info!(archive_partition = %archive, "entity archived");
		Ok(ArchiveOutcome {
			archive_id: entity_id.to_string(),
			archive_partition: archive,
			removal_token,
		})
	}

	/// Archives a user together with every dependent row.
	///
	/// The user's base record becomes one archive record embedding a
	/// snapshot of each dependent partition's matching rows; the rows
	/// themselves move into their archive twins in the same batch, so
	/// live partitions hold nothing of the user afterwards. Existing
	/// admin-archive records referencing the user are embedded as
	/// snapshots only.
	#[instrument(skip_all, fields(user_id = %truncate_id(user_id)))]
	pub async fn archive_user(
		&self,
		user_id: &str,
		actor: &Actor,
	) -> Result<ArchiveOutcome, EngineError> {
		let payload: Value = match self.storage.retrieve(Partition::Users, user_id).await {
			Ok(payload) => payload,
			Err(StorageError::NotFound) => {
				return Err(EngineError::NotFound(format!("User {} not found", user_id)))
			},
			Err(e) => return Err(e.into()),
		};

		let mut record = ArchiveRecord::wrap(user_id, Partition::Users, actor, payload);
		let mut moved: Vec<(Partition, String, Value)> = Vec::new();
		for partition in Partition::user_dependents() {
			let rows = self.rows_for_user(partition, user_id).await?;
			record = record.with_dependents(
				partition,
				rows.iter().map(|(_, row)| row.clone()).collect(),
			);
			for (row_id, row) in rows {
				moved.push((partition, row_id, row));
			}
		}

		// Cross-references from earlier admin archives are captured as
		// snapshots and stay where they are.
		let cross_refs = self.rows_for_user(Partition::AdminsArchive, user_id).await?;
		record = record.with_dependents(
			Partition::AdminsArchive,
			cross_refs.into_iter().map(|(_, row)| row).collect(),
		);

		let entry = self
			.audit
			.entry(
				format!(
					"Archived user {} with {} dependent rows",
					user_id,
					moved.len()
				),
				actor,
			)
			.with_user(user_id);

		let mut batch = WriteBatch::new();
		batch.put(Partition::UsersArchive, user_id, &record, PutGuard::IfAbsent)?;
		batch.delete(Partition::Users, user_id, DeleteGuard::MustExist);
		for (partition, row_id, row) in &moved {
			let twin = partition.archive_of().ok_or_else(|| {
				EngineError::Validation(format!("Partition '{}' has no archive twin", partition))
			})?;
			let wrapper = ArchiveRecord::wrap(row_id.clone(), *partition, actor, row.clone());
			batch.put(twin, row_id, &wrapper, PutGuard::IfAbsent)?;
			batch.delete(*partition, row_id, DeleteGuard::MustExist);
		}
		self.audit.append_to(&mut batch, &entry)?;

		let storage = &self.storage;
		let result = with_retries(&self.retry, "archive user", move || {
			let batch = batch.clone();
			async move { storage.commit(batch).await }
		})
		.await;

		match result {
			Ok(()) => {},
			Err(StorageError::PreconditionFailed { .. }) => {
				return Err(EngineError::Conflict(format!(
					"User {} is already archived or was moved concurrently",
					user_id
				)))
			},
			Err(e) => return Err(e.into()),
		}

		info!(dependent_rows = moved.len(), "user archived");
		Ok(ArchiveOutcome {
			archive_id: user_id.to_string(),
			archive_partition: Partition::UsersArchive,
			removal_token: None,
		})
	}
}
