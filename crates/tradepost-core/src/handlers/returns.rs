//! Return request handler.
//!
//! Return requests are side records keyed by their own id; the
//! completed order they reference stays where it is regardless of the
//! decision. The request's own machine is monotonic: Pending resolves
//! to Approved or Disapproved exactly once. Approval restores the
//! returned items' stock and records the refund amount.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use tradepost_audit::AuditService;
use tradepost_idgen::IdMinter;
use tradepost_ledger::InventoryService;
use tradepost_storage::{PutGuard, StorageError, StorageService, WriteBatch};
use tradepost_types::{
	truncate_id, Actor, LineItem, Order, Partition, ReturnDecision, ReturnRequest, ReturnStatus,
};

use crate::engine::EngineError;
use crate::retry::{with_retries, RetryPolicy};
use crate::state::TransitionGate;

/// Handler for filing and resolving return requests.
pub struct ReturnHandler {
	storage: Arc<StorageService>,
	audit: Arc<AuditService>,
	ledger: Arc<InventoryService>,
	minter: Arc<IdMinter>,
	gate: TransitionGate,
	retry: RetryPolicy,
}

impl ReturnHandler {
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

	/// Files a return request against a completed order.
	///
	/// `items` restricts the return to a subset of the order's line
	/// items; `None` returns the whole order. Each requested item must
	/// match one of the order's items, with a quantity no larger than
	/// what was purchased.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn file(
		&self,
		order_id: &str,
		items: Option<Vec<LineItem>>,
		reason: String,
		actor: &Actor,
	) -> Result<ReturnRequest, EngineError> {
		let order: Order = match self.storage.retrieve(Partition::Completed, order_id).await {
			Ok(order) => order,
			Err(StorageError::NotFound) => {
				return Err(EngineError::NotFound(format!(
					"Order {} is not completed; only completed orders can be returned",
					order_id
				)))
			},
			Err(e) => return Err(e.into()),
		};

		let items = match items {
			Some(requested) => {
				for item in &requested {
					let covered = order.items.iter().any(|line| {
						line.product_id == item.product_id
							&& line.size == item.size && item.quantity <= line.quantity
					});
					if !covered {
						return Err(EngineError::Validation(format!(
							"Item {} (size {}, quantity {}) does not match order {}",
							item.product_id, item.size, item.quantity, order_id
						)));
					}
				}
				requested
			},
			None => order.items.clone(),
		};

		let request = ReturnRequest {
			id: self.minter.return_id(),
			order_id: order_id.to_string(),
			user_id: order.user_id.clone(),
			items,
			reason,
			status: ReturnStatus::Pending,
			created_at: Utc::now(),
			resolved_at: None,
			resolved_by: None,
			refund_total: None,
		};

		let entry = self
			.audit
			.entry(
				format!("Filed return request {} for order {}", request.id, order_id),
				actor,
			)
			.with_user(order.user_id.clone());

		let mut batch = WriteBatch::new();
		batch.put(
			Partition::ReturnRequests,
			&request.id,
			&request,
			PutGuard::IfAbsent,
		)?;
		self.audit.append_to(&mut batch, &entry)?;

		let storage = &self.storage;
		with_retries(&self.retry, "file return", move || {
			let batch = batch.clone();
			async move { storage.commit(batch).await }
		})
		.await?;

		info!(request_id = %request.id, "return request filed");
		Ok(request)
	}

	/// Resolves a pending return request.
	///
	/// Approval restores the requested items' stock and stamps the
	/// refund total; either decision is final.
	#[instrument(skip_all, fields(request_id = %truncate_id(request_id)))]
	pub async fn resolve(
		&self,
		request_id: &str,
		decision: ReturnDecision,
		actor: &Actor,
	) -> Result<ReturnRequest, EngineError> {
		let _guard = self.gate.acquire(request_id).await;

		let mut request: ReturnRequest =
			match self.storage.retrieve(Partition::ReturnRequests, request_id).await {
				Ok(request) => request,
				Err(StorageError::NotFound) => {
					return Err(EngineError::NotFound(format!(
						"Return request {} not found",
						request_id
					)))
				},
				Err(e) => return Err(e.into()),
			};

		if request.status != ReturnStatus::Pending {
			return Err(EngineError::Conflict(format!(
				"Return request {} is already resolved ({})",
				request_id, request.status
			)));
		}

		let action = match decision {
			ReturnDecision::Approve => {
				let summary = self.ledger.restore_line_items(&request.items).await?;
				request.status = ReturnStatus::Approved;
				request.refund_total = Some(request.requested_total());
				format!(
					"Approved return request {} for order {}; restored {} units",
					request_id, request.order_id, summary.restored_units
				)
			},
			ReturnDecision::Disapprove => {
				request.status = ReturnStatus::Disapproved;
				format!(
					"Disapproved return request {} for order {}",
					request_id, request.order_id
				)
			},
		};
		request.resolved_at = Some(Utc::now());
		request.resolved_by = Some(actor.email.clone());

		let entry = self
			.audit
			.entry(action, actor)
			.with_user(request.user_id.clone());

		let mut batch = WriteBatch::new();
		batch.put(
			Partition::ReturnRequests,
			request_id,
			&request,
			PutGuard::None,
		)?;
		self.audit.append_to(&mut batch, &entry)?;

		let storage = &self.storage;
		with_retries(&self.retry, "resolve return", move || {
			let batch = batch.clone();
			async move { storage.commit(batch).await }
		})
		.await?;

		info!(status = %request.status, "return request resolved");
		Ok(request)
	}

	/// Fetches one return request.
	pub async fn get(&self, request_id: &str) -> Result<ReturnRequest, EngineError> {
		match self.storage.retrieve(Partition::ReturnRequests, request_id).await {
			Ok(request) => Ok(request),
			Err(StorageError::NotFound) => Err(EngineError::NotFound(format!(
				"Return request {} not found",
				request_id
			))),
			Err(e) => Err(e.into()),
		}
	}

	/// Lists all return requests, sorted by id.
	pub async fn list(&self) -> Result<Vec<ReturnRequest>, EngineError> {
		let requests = self
			.storage
			.list::<ReturnRequest>(Partition::ReturnRequests)
			.await?
			.into_iter()
			.map(|(_, request)| request)
			.collect();
		Ok(requests)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal::Decimal;
	use std::collections::BTreeMap;
	use tradepost_storage::implementations::memory::MemoryStorage;
	use tradepost_types::{OrderStatus, Product, Role, Size};

	struct Fixture {
		storage: Arc<StorageService>,
		ledger: Arc<InventoryService>,
		audit: Arc<AuditService>,
		handler: ReturnHandler,
	}

	fn fixture() -> Fixture {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let minter = Arc::new(IdMinter::new());
		let audit = Arc::new(AuditService::new(storage.clone(), minter.clone()));
		let ledger = Arc::new(InventoryService::new(storage.clone()));
		let handler = ReturnHandler::new(
			storage.clone(),
			audit.clone(),
			ledger.clone(),
			minter,
			RetryPolicy::none(),
		);
		Fixture {
			storage,
			ledger,
			audit,
			handler,
		}
	}

	fn actor() -> Actor {
		Actor::new("ops@tradepost.live", Role::Admin)
	}

	fn item(product_id: &str, size: Size, quantity: u32) -> LineItem {
		LineItem {
			product_id: product_id.to_string(),
			name: "Linen shirt".to_string(),
			size,
			quantity,
			unit_price: Decimal::new(2500, 2),
		}
	}

	async fn seed_completed_order(fx: &Fixture, order_id: &str, items: Vec<LineItem>) {
		let order = Order {
			id: order_id.to_string(),
			user_id: "U1".to_string(),
			shipping_address: "12 Pier Lane".to_string(),
			items,
			total: Decimal::new(5000, 2),
			status: OrderStatus::Completed,
			created_at: Utc::now(),
			toship_id: None,
			packed_at: None,
			shipped_at: None,
			received_at: Some(Utc::now()),
			cancelled_at: None,
		};
		fx.storage
			.store(Partition::Completed, order_id, &order)
			.await
			.unwrap();
	}

	async fn seed_product(fx: &Fixture, id: &str, size: Size, count: u32) {
		let product = Product {
			id: id.to_string(),
			name: "Linen shirt".to_string(),
			seller_id: "SELLER-1".to_string(),
			price: Decimal::new(2500, 2),
			stock: BTreeMap::from([(size, count)]),
			total_stock: count,
			sold: 0,
			rating: 4.5,
		};
		fx.ledger.put_product(product).await.unwrap();
	}

	#[tokio::test]
	async fn test_file_requires_completed_order() {
		let fx = fixture();
		let err = fx
			.handler
			.file("ORD-404", None, "wrong size".to_string(), &actor())
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_file_defaults_to_whole_order() {
		let fx = fixture();
		seed_completed_order(&fx, "ORD-1", vec![item("P1", Size::S, 2)]).await;

		let request = fx
			.handler
			.file("ORD-1", None, "wrong size".to_string(), &actor())
			.await
			.unwrap();
		assert!(request.id.starts_with("RET-"));
		assert_eq!(request.status, ReturnStatus::Pending);
		assert_eq!(request.items.len(), 1);
		assert_eq!(request.user_id, "U1");

		// The order itself stays in its partition.
		assert!(fx
			.storage
			.exists(Partition::Completed, "ORD-1")
			.await
			.unwrap());
		let logs = fx.audit.list().await.unwrap();
		assert_eq!(logs.len(), 1);
	}

	#[tokio::test]
	async fn test_file_rejects_items_not_in_order() {
		let fx = fixture();
		seed_completed_order(&fx, "ORD-1", vec![item("P1", Size::S, 2)]).await;

		let err = fx
			.handler
			.file(
				"ORD-1",
				Some(vec![item("P9", Size::S, 1)]),
				"bad".to_string(),
				&actor(),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::Validation(_)));

		// Quantity above the purchased amount is rejected too.
		let err = fx
			.handler
			.file(
				"ORD-1",
				Some(vec![item("P1", Size::S, 5)]),
				"bad".to_string(),
				&actor(),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::Validation(_)));
	}

	#[tokio::test]
	async fn test_approve_restores_stock_and_records_refund() {
		let fx = fixture();
		seed_product(&fx, "P1", Size::S, 5).await;
		seed_completed_order(&fx, "ORD-1", vec![item("P1", Size::S, 2)]).await;

		let request = fx
			.handler
			.file("ORD-1", None, "wrong size".to_string(), &actor())
			.await
			.unwrap();
		let resolved = fx
			.handler
			.resolve(&request.id, ReturnDecision::Approve, &actor())
			.await
			.unwrap();

		assert_eq!(resolved.status, ReturnStatus::Approved);
		assert_eq!(resolved.refund_total, Some(Decimal::new(5000, 2)));
		assert_eq!(resolved.resolved_by.as_deref(), Some("ops@tradepost.live"));
		assert!(resolved.resolved_at.is_some());

		let product = fx.ledger.get_product("P1").await.unwrap();
		assert_eq!(product.stock[&Size::S], 7);
		assert_eq!(product.total_stock, 7);
	}

	#[tokio::test]
	async fn test_disapprove_leaves_stock_alone() {
		let fx = fixture();
		seed_product(&fx, "P1", Size::S, 5).await;
		seed_completed_order(&fx, "ORD-1", vec![item("P1", Size::S, 2)]).await;

		let request = fx
			.handler
			.file("ORD-1", None, "changed my mind".to_string(), &actor())
			.await
			.unwrap();
		let resolved = fx
			.handler
			.resolve(&request.id, ReturnDecision::Disapprove, &actor())
			.await
			.unwrap();

		assert_eq!(resolved.status, ReturnStatus::Disapproved);
		assert_eq!(resolved.refund_total, None);

		let product = fx.ledger.get_product("P1").await.unwrap();
		assert_eq!(product.stock[&Size::S], 5);
	}

	#[tokio::test]
	async fn test_resolution_is_monotonic() {
		let fx = fixture();
		seed_product(&fx, "P1", Size::S, 5).await;
		seed_completed_order(&fx, "ORD-1", vec![item("P1", Size::S, 2)]).await;

		let request = fx
			.handler
			.file("ORD-1", None, "wrong size".to_string(), &actor())
			.await
			.unwrap();
		fx.handler
			.resolve(&request.id, ReturnDecision::Disapprove, &actor())
			.await
			.unwrap();

		// A second decision, in either direction, is rejected.
		let err = fx
			.handler
			.resolve(&request.id, ReturnDecision::Approve, &actor())
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::Conflict(_)));

		// Stock was never touched by the rejected approval.
		let product = fx.ledger.get_product("P1").await.unwrap();
		assert_eq!(product.stock[&Size::S], 5);
	}

	#[tokio::test]
	async fn test_resolve_missing_request_is_not_found() {
		let fx = fixture();
		let err = fx
			.handler
			.resolve("RET-404", ReturnDecision::Approve, &actor())
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::NotFound(_)));
	}
}
