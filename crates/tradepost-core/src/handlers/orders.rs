//! Order lifecycle handler.
//!
//! Moves orders between lifecycle partitions. A transition writes the
//! updated order into the destination partition, deletes it from the
//! source, and appends its activity log entry, all in one guarded write
//! batch, so a fault can never leave the order duplicated or lost. The
//! per-order gate keeps transitions on one order strictly sequential.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use tradepost_audit::AuditService;
use tradepost_idgen::IdMinter;
use tradepost_ledger::{InventoryService, RestorationSummary};
use tradepost_storage::{
	DeleteGuard, PutGuard, StorageError, StorageService, WriteBatch,
};
use tradepost_types::{
	truncate_id, ActivityLog, Actor, BulkReport, LineItem, Order, OrderStatus, Partition,
};

use crate::engine::EngineError;
use crate::retry::{with_retries, RetryPolicy};
use crate::state::{validate_transition, TransitionGate};

/// Handler for order lifecycle transitions.
pub struct OrderHandler {
	storage: Arc<StorageService>,
	audit: Arc<AuditService>,
	ledger: Arc<InventoryService>,
	minter: Arc<IdMinter>,
	gate: TransitionGate,
	retry: RetryPolicy,
}

impl OrderHandler {
	pub fn new(
		storage: Arc<StorageService>,
		audit: Arc<AuditService>,
		ledger: Arc<InventoryService>,
		minter: Arc<IdMinter>,
		retry: RetryPolicy,
	) -> Self {
		Self {
			storage,
			audit,
			ledger,
			minter,
			gate: TransitionGate::new(),
			retry,
		}
	}

	/// Fetches an order from the partition its current status implies.
	async fn fetch(&self, partition: Partition, order_id: &str) -> Result<Order, EngineError> {
		match self.storage.retrieve(partition, order_id).await {
			Ok(order) => Ok(order),
			Err(StorageError::NotFound) => Err(EngineError::NotFound(format!(
				"Order {} not found in '{}'",
				order_id, partition
			))),
			Err(e) => Err(e.into()),
		}
	}

	/// Commits a transition: destination put, source delete, audit
	/// append, as one batch. Guard violations mean another operation
	/// moved the order first.
	async fn commit_transition(
		&self,
		order: &Order,
		from: Partition,
		to: Partition,
		entry: &ActivityLog,
	) -> Result<(), EngineError> {
		let mut batch = WriteBatch::new();
		batch.put(to, &order.id, order, PutGuard::IfAbsent)?;
		batch.delete(from, &order.id, DeleteGuard::MustExist);
		self.audit.append_to(&mut batch, entry)?;

		let storage = &self.storage;
		let result = with_retries(&self.retry, "order transition", move || {
			let batch = batch.clone();
			async move { storage.commit(batch).await }
		})
		.await;

		match result {
			Ok(()) => Ok(()),
			Err(StorageError::PreconditionFailed { key, reason }) => {
				Err(EngineError::Conflict(format!(
					"Order {} was moved concurrently ({}: {})",
					order.id, key, reason
				)))
			},
			Err(e) => Err(e.into()),
		}
	}

	/// Packs a placed order, moving it to "To Ship".
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn pack(&self, order_id: &str, actor: &Actor) -> Result<Order, EngineError> {
		let _guard = self.gate.acquire(order_id).await;

		let mut order = self.fetch(Partition::Orders, order_id).await?;
		validate_transition(order.status, OrderStatus::ToShip)?;

		order.status = OrderStatus::ToShip;
		order.toship_id = Some(self.minter.toship_id());
		order.packed_at = Some(Utc::now());

		let entry = self
			.audit
			.entry(format!("Packed order {}", order_id), actor)
			.with_user(order.user_id.clone());
		self.commit_transition(&order, Partition::Orders, Partition::ToShip, &entry)
			.await?;

		info!(toship_id = order.toship_id.as_deref(), "order packed");
		Ok(order)
	}

	/// Packs a batch of orders, each independently.
	///
	/// An empty input yields an empty report; failures never abort the
	/// remaining orders.
	pub async fn pack_bulk(
		&self,
		order_ids: &[String],
		actor: &Actor,
	) -> Result<BulkReport, EngineError> {
		let mut report = BulkReport::default();
		for order_id in order_ids {
			match self.pack(order_id, actor).await {
				Ok(_) => report.push_ok(order_id.as_str()),
				Err(e) => {
					warn!(
						order_id = %truncate_id(order_id),
						error = %e,
						"bulk pack item failed"
					);
					report.push_failed(order_id.as_str(), e.to_string());
				},
			}
		}
		Ok(report)
	}

	/// Ships a packed order, moving it to "To Receive".
	///
	/// The dispatched item must match one of the order's line items.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn ship(
		&self,
		order_id: &str,
		item: &LineItem,
		actor: &Actor,
	) -> Result<Order, EngineError> {
		let _guard = self.gate.acquire(order_id).await;

		let mut order = self.fetch(Partition::ToShip, order_id).await?;
		validate_transition(order.status, OrderStatus::ToReceive)?;

		let matches_order = order
			.items
			.iter()
			.any(|line| line.product_id == item.product_id && line.size == item.size);
		if !matches_order {
			return Err(EngineError::Validation(format!(
				"Item {} (size {}) is not part of order {}",
				item.product_id, item.size, order_id
			)));
		}

		order.status = OrderStatus::ToReceive;
		order.shipped_at = Some(Utc::now());

		let entry = self
			.audit
			.entry(format!("Shipped order {}", order_id), actor)
			.with_user(order.user_id.clone())
			.with_product(item.product_id.clone());
		self.commit_transition(&order, Partition::ToShip, Partition::ToReceive, &entry)
			.await?;

		info!("order shipped");
		Ok(order)
	}

	/// Confirms receipt of a shipped order, completing it.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn receive(&self, order_id: &str, actor: &Actor) -> Result<Order, EngineError> {
		let _guard = self.gate.acquire(order_id).await;

		let mut order = self.fetch(Partition::ToReceive, order_id).await?;
		validate_transition(order.status, OrderStatus::Completed)?;

		order.status = OrderStatus::Completed;
		order.received_at = Some(Utc::now());

		let entry = self
			.audit
			.entry(format!("Marked order {} as received", order_id), actor)
			.with_user(order.user_id.clone());
		self.commit_transition(&order, Partition::ToReceive, Partition::Completed, &entry)
			.await?;

		info!("order completed");
		Ok(order)
	}

	/// Cancels a placed order, restoring its line item stock.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel(
		&self,
		order_id: &str,
		actor: &Actor,
	) -> Result<(Order, RestorationSummary), EngineError> {
		let _guard = self.gate.acquire(order_id).await;

		let mut order = self.fetch(Partition::Orders, order_id).await?;
		validate_transition(order.status, OrderStatus::Cancelled)?;

		let summary = self.ledger.restore_line_items(&order.items).await?;

		order.status = OrderStatus::Cancelled;
		order.cancelled_at = Some(Utc::now());

		let entry = self
			.audit
			.entry(
				format!(
					"Cancelled order {}; restored {} units to stock",
					order_id, summary.restored_units
				),
				actor,
			)
			.with_user(order.user_id.clone());
		self.commit_transition(&order, Partition::Orders, Partition::Cancelled, &entry)
			.await?;

		info!(restored_units = summary.restored_units, "order cancelled");
		Ok((order, summary))
	}

	/// Removes an order from "To Receive", restoring its line item
	/// stock before deleting the record.
	///
	/// Line items whose product no longer exists are skipped with a
	/// warning instead of aborting the removal.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn remove_to_receive(
		&self,
		order_id: &str,
		actor: &Actor,
	) -> Result<RestorationSummary, EngineError> {
		let _guard = self.gate.acquire(order_id).await;

		let order = self.fetch(Partition::ToReceive, order_id).await?;
		let summary = self.ledger.restore_line_items(&order.items).await?;

		let entry = self
			.audit
			.entry(
				format!(
					"Removed order {} from To Receive; restored {} units to stock",
					order_id, summary.restored_units
				),
				actor,
			)
			.with_user(order.user_id.clone());

		let mut batch = WriteBatch::new();
		batch.delete(Partition::ToReceive, order_id, DeleteGuard::MustExist);
		self.audit.append_to(&mut batch, &entry)?;

		let storage = &self.storage;
		let result = with_retries(&self.retry, "order removal", move || {
			let batch = batch.clone();
			async move { storage.commit(batch).await }
		})
		.await;

		match result {
			Ok(()) => {},
			Err(StorageError::PreconditionFailed { .. }) => {
				return Err(EngineError::Conflict(format!(
					"Order {} was removed concurrently",
					order_id
				)))
			},
			Err(e) => return Err(e.into()),
		}

		info!(restored_units = summary.restored_units, "order removed");
		Ok(summary)
	}

	/// Locates an order, whatever lifecycle stage it is in.
	pub async fn find_order(&self, order_id: &str) -> Result<(Partition, Order), EngineError> {
		for partition in Partition::lifecycle() {
			match self.storage.retrieve::<Order>(partition, order_id).await {
				Ok(order) => return Ok((partition, order)),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e.into()),
			}
		}
		Err(EngineError::NotFound(format!(
			"Order {} not found in any lifecycle partition",
			order_id
		)))
	}

	/// Lists all orders in one lifecycle stage, sorted by id.
	pub async fn list_stage(&self, partition: Partition) -> Result<Vec<Order>, EngineError> {
		if OrderStatus::for_partition(partition).is_none() {
			return Err(EngineError::Validation(format!(
				"'{}' is not an order lifecycle partition",
				partition
			)));
		}
		let orders = self
			.storage
			.list::<Order>(partition)
			.await?
			.into_iter()
			.map(|(_, order)| order)
			.collect();
		Ok(orders)
	}
}
