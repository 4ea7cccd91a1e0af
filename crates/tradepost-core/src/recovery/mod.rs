//! Recovery module reconciling storage after unexpected exits.
//!
//! Transitions commit as one guarded batch, so a healthy run never
//! leaves an order in two lifecycle partitions. This sweep exists for
//! everything outside a healthy run: rows written by older tooling,
//! restores interrupted mid-flight, or a backend that applied a batch
//! partially before fail-stopping. It scans the lifecycle partitions,
//! keeps the furthest-stage copy of any duplicated order, and clears
//! restoration attempts that have been marked in flight for too long.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::instrument;
use tradepost_storage::{DeleteGuard, StorageService, WriteBatch};
use tradepost_types::{truncate_id, Partition};

use crate::engine::EngineError;
use crate::handlers::RestorationEngine;

/// Report of one reconciliation sweep.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
	/// Total number of lifecycle rows scanned.
	pub scanned: usize,
	/// Number of order ids found in more than one lifecycle partition.
	pub duplicates_resolved: usize,
	/// Number of stale in-flight restoration attempts cleared.
	pub stale_restores_cleared: usize,
}

/// Service reconciling lifecycle partitions and restoration state.
pub struct ReconciliationSweep {
	storage: Arc<StorageService>,
	restoration: Arc<RestorationEngine>,
	stale_after: Duration,
}

impl ReconciliationSweep {
	pub fn new(
		storage: Arc<StorageService>,
		restoration: Arc<RestorationEngine>,
		stale_after: Duration,
	) -> Self {
		Self {
			storage,
			restoration,
			stale_after,
		}
	}

	/// Performs one full sweep.
	///
	/// When an order id appears in several lifecycle partitions, the
	/// copy in the furthest stage is authoritative: the destination
	/// write of a transition happened, the source delete did not. The
	/// extra copies are deleted unguarded so a concurrently completing
	/// transition cannot fail the sweep.
	#[instrument(skip_all)]
	pub async fn run(&self) -> Result<SweepReport, EngineError> {
		tracing::info!("Starting reconciliation sweep");

		let mut report = SweepReport::default();

		// Step 1: collect sightings per order id, in stage order.
		let mut sightings: BTreeMap<String, Vec<Partition>> = BTreeMap::new();
		for partition in Partition::lifecycle() {
			for (order_id, _) in self.storage.list::<serde_json::Value>(partition).await? {
				report.scanned += 1;
				sightings.entry(order_id).or_default().push(partition);
			}
		}

		// Step 2: delete every copy except the furthest-stage one.
		let mut batch = WriteBatch::new();
		for (order_id, stages) in &sightings {
			if stages.len() < 2 {
				continue;
			}
			report.duplicates_resolved += 1;
			for stage in &stages[..stages.len() - 1] {
				tracing::warn!(
					order_id = %truncate_id(order_id),
					duplicate = %stage,
					kept = %stages[stages.len() - 1],
					"resolving duplicated lifecycle row"
				);
				batch.delete(*stage, order_id, DeleteGuard::None);
			}
		}
		if !batch.is_empty() {
			self.storage.commit(batch).await?;
		}

		// Step 3: clear restoration attempts stuck in flight.
		report.stale_restores_cleared = self.restoration.clear_stale(self.stale_after);

		tracing::info!(
			scanned = report.scanned,
			duplicates_resolved = report.duplicates_resolved,
			stale_restores_cleared = report.stale_restores_cleared,
			"Reconciliation sweep finished"
		);
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handlers::restore::RestoreAttempt;
	use crate::retry::RetryPolicy;
	use serde_json::json;
	use std::time::Instant;
	use tradepost_storage::implementations::memory::MemoryStorage;
	use tradepost_types::RestoreState;

	fn sweep(stale_after: Duration) -> (Arc<StorageService>, Arc<RestorationEngine>, ReconciliationSweep) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let restoration = Arc::new(RestorationEngine::new(storage.clone(), RetryPolicy::none()));
		let sweep = ReconciliationSweep::new(storage.clone(), restoration.clone(), stale_after);
		(storage, restoration, sweep)
	}

	#[tokio::test]
	async fn test_sweep_keeps_furthest_stage_copy() {
		let (storage, _restoration, sweep) = sweep(Duration::from_secs(300));
		let order = json!({"orderId": "ORD-1", "status": "Placed"});
		storage.store(Partition::Orders, "ORD-1", &order).await.unwrap();
		storage.store(Partition::ToShip, "ORD-1", &order).await.unwrap();
		storage
			.store(Partition::Orders, "ORD-2", &json!({"orderId": "ORD-2"}))
			.await
			.unwrap();

		let report = sweep.run().await.unwrap();
		assert_eq!(report.scanned, 3);
		assert_eq!(report.duplicates_resolved, 1);

		assert!(!storage.exists(Partition::Orders, "ORD-1").await.unwrap());
		assert!(storage.exists(Partition::ToShip, "ORD-1").await.unwrap());
		assert!(storage.exists(Partition::Orders, "ORD-2").await.unwrap());
	}

	#[tokio::test]
	async fn test_sweep_on_clean_store_reports_nothing() {
		let (storage, _restoration, sweep) = sweep(Duration::from_secs(300));
		storage
			.store(Partition::Completed, "ORD-1", &json!({"orderId": "ORD-1"}))
			.await
			.unwrap();

		let report = sweep.run().await.unwrap();
		assert_eq!(report.scanned, 1);
		assert_eq!(report.duplicates_resolved, 0);
		assert_eq!(report.stale_restores_cleared, 0);
		assert!(storage.exists(Partition::Completed, "ORD-1").await.unwrap());
	}

	#[tokio::test]
	async fn test_sweep_clears_stale_restores() {
		let (_storage, restoration, sweep) = sweep(Duration::from_secs(300));
		let old = Instant::now()
			.checked_sub(Duration::from_secs(600))
			.unwrap();
		restoration.states.insert(
			"U1".to_string(),
			RestoreAttempt {
				state: RestoreState::Restoring,
				updated_at: old,
			},
		);

		let report = sweep.run().await.unwrap();
		assert_eq!(report.stale_restores_cleared, 1);
		assert_eq!(restoration.restore_state("U1"), Some(RestoreState::Failed));
	}
}
