//! Archive record types.
//!
//! Archiving moves a document out of its live partition into the
//! partition's archive twin, wrapped in an [`ArchiveRecord`] that carries
//! enough metadata to restore it: the original document id, the original
//! collection, and when and by whom it was archived. Composite user
//! archives additionally embed the user's dependent rows; admin archives
//! embed the admin's activity trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{ActivityLog, Actor, Partition};

/// Wrapper document stored in archive partitions.
///
/// The payload is the original document verbatim. Restoration writes the
/// payload back under the original id and drops the wrapper, so a
/// restored document carries none of the archive metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
	/// Id the document had in its live partition. Doubles as the archive
	/// record's own id, which makes restore idempotency a plain
	/// exists-probe.
	pub original_doc_id: String,
	/// Live partition the document came from.
	pub original_collection: String,
	/// When the document was archived.
	pub archived_at: DateTime<Utc>,
	/// Who archived it.
	pub archived_by: Actor,
	/// Removal token minted for admin archives.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub removal_token: Option<String>,
	/// The original document, unchanged.
	pub payload: serde_json::Value,
	/// Dependent row snapshots for composite user archives, keyed by the
	/// live partition they came from.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub dependents: BTreeMap<String, Vec<serde_json::Value>>,
	/// Point-in-time activity trail bundled into admin archives.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub activity_logs: Vec<ActivityLog>,
}

impl ArchiveRecord {
	/// Wraps a document for archival.
	pub fn wrap(
		original_doc_id: impl Into<String>,
		original_collection: Partition,
		archived_by: &Actor,
		payload: serde_json::Value,
	) -> Self {
		Self {
			original_doc_id: original_doc_id.into(),
			original_collection: original_collection.as_str().to_string(),
			archived_at: Utc::now(),
			archived_by: archived_by.clone(),
			removal_token: None,
			payload,
			dependents: BTreeMap::new(),
			activity_logs: Vec::new(),
		}
	}

	/// Attaches a removal token (admin archives only).
	pub fn with_removal_token(mut self, token: impl Into<String>) -> Self {
		self.removal_token = Some(token.into());
		self
	}

	/// Attaches one partition's dependent row snapshots.
	pub fn with_dependents(
		mut self,
		partition: Partition,
		rows: Vec<serde_json::Value>,
	) -> Self {
		if !rows.is_empty() {
			self.dependents.insert(partition.as_str().to_string(), rows);
		}
		self
	}

	/// Attaches a bundled activity trail (admin archives only).
	pub fn with_activity_logs(mut self, logs: Vec<ActivityLog>) -> Self {
		self.activity_logs = logs;
		self
	}

	/// Total number of dependent rows embedded across all partitions.
	pub fn embedded_row_count(&self) -> usize {
		self.dependents.values().map(Vec::len).sum()
	}

	/// Live partition this record restores into, if the stored collection
	/// name still maps to one.
	pub fn origin_partition(&self) -> Option<Partition> {
		Partition::from_str(&self.original_collection).ok()
	}
}

/// Kinds of entity the single-entity archival path accepts.
///
/// Users go through the composite path instead; their dependents make
/// them more than a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
	Admin,
	Seller,
	Product,
	Order,
}

impl EntityKind {
	/// Live partition holding entities of this kind.
	///
	/// Orders return `None`: the partition depends on the order's current
	/// lifecycle stage and is resolved by lookup.
	pub fn partition(&self) -> Option<Partition> {
		match self {
			EntityKind::Admin => Some(Partition::Admins),
			EntityKind::Seller => Some(Partition::Sellers),
			EntityKind::Product => Some(Partition::Products),
			EntityKind::Order => None,
		}
	}
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EntityKind::Admin => write!(f, "admin"),
			EntityKind::Seller => write!(f, "seller"),
			EntityKind::Product => write!(f, "product"),
			EntityKind::Order => write!(f, "order"),
		}
	}
}

impl FromStr for EntityKind {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"admin" => Ok(EntityKind::Admin),
			"seller" => Ok(EntityKind::Seller),
			"product" => Ok(EntityKind::Product),
			"order" => Ok(EntityKind::Order),
			_ => Err(()),
		}
	}
}

/// Result of an archival operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutcome {
	/// Id of the archive record, equal to the original document id.
	pub archive_id: String,
	/// Partition the record was written to.
	pub archive_partition: Partition,
	/// Removal token, minted for admin archives only.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub removal_token: Option<String>,
}

/// Observable state of an in-flight restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestoreState {
	/// A restoration is currently executing.
	Restoring,
	/// The last restoration completed.
	Restored,
	/// The last restoration failed; the archive record is still present.
	Failed,
}

impl fmt::Display for RestoreState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RestoreState::Restoring => write!(f, "Restoring"),
			RestoreState::Restored => write!(f, "Restored"),
			RestoreState::Failed => write!(f, "Failed"),
		}
	}
}

/// Result of a restoration operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
	/// Number of documents written back to live partitions.
	pub restored: usize,
}
