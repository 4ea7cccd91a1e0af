//! Engine facade wiring every service together.
//!
//! This module contains the [`Engine`] struct which owns the storage
//! backend, the id minter, the audit sink and the inventory ledger, and
//! exposes the operation handlers built on top of them: order lifecycle
//! transitions, return resolution, archival and restoration, plus the
//! reconciliation sweep run at startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tradepost_audit::{AuditError, AuditService};
use tradepost_config::Config;
use tradepost_idgen::IdMinter;
use tradepost_ledger::{InventoryService, LedgerError};
use tradepost_storage::{
	get_all_implementations, StorageError, StorageFactory, StorageInterface, StorageService,
};

use crate::handlers::{ArchivalEngine, OrderHandler, RestorationEngine, ReturnHandler};
use crate::recovery::{ReconciliationSweep, SweepReport};
use crate::retry::RetryPolicy;
use crate::state::StateError;

/// Errors surfaced by engine operations.
///
/// The taxonomy is small on purpose: a missing document, a lost race, a
/// business-rule violation, a role check, a construction problem, or a
/// storage fault that survived retries.
#[derive(Debug, Error)]
pub enum EngineError {
	/// The referenced document does not exist where the operation
	/// expects it.
	#[error("Not found: {0}")]
	NotFound(String),
	/// A concurrent operation got there first.
	#[error("Conflict: {0}")]
	Conflict(String),
	/// The request contradicts the current state of the data.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The actor's role does not permit the operation.
	#[error("Forbidden: {0}")]
	Forbidden(String),
	/// The engine could not be built from its configuration.
	#[error("Configuration error: {0}")]
	Config(String),
	/// A storage fault that was not transient.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl From<StateError> for EngineError {
	fn from(err: StateError) -> Self {
		EngineError::Validation(err.to_string())
	}
}

impl From<LedgerError> for EngineError {
	fn from(err: LedgerError) -> Self {
		match err {
			LedgerError::ProductNotFound(_) => EngineError::NotFound(err.to_string()),
			LedgerError::InsufficientStock { .. } => EngineError::Validation(err.to_string()),
			LedgerError::Storage(e) => EngineError::Storage(e),
		}
	}
}

impl From<AuditError> for EngineError {
	fn from(err: AuditError) -> Self {
		match err {
			AuditError::NotFound(_) => EngineError::NotFound(err.to_string()),
			AuditError::Forbidden(_) => EngineError::Forbidden(err.to_string()),
			AuditError::Storage(e) => EngineError::Storage(e),
		}
	}
}

impl From<EngineError> for tradepost_types::ApiError {
	fn from(err: EngineError) -> Self {
		use tradepost_types::ApiError;

		let message = err.to_string();
		match err {
			EngineError::NotFound(_) => ApiError::NotFound {
				error_type: "NOT_FOUND".to_string(),
				message,
			},
			EngineError::Conflict(_) => ApiError::Conflict {
				error_type: "CONFLICT".to_string(),
				message,
				details: None,
			},
			EngineError::Validation(_) => ApiError::UnprocessableEntity {
				error_type: "VALIDATION".to_string(),
				message,
				details: None,
			},
			EngineError::Forbidden(_) => ApiError::Forbidden {
				error_type: "FORBIDDEN".to_string(),
				message,
			},
			EngineError::Config(_) => ApiError::InternalServerError {
				error_type: "CONFIGURATION".to_string(),
				message,
			},
			EngineError::Storage(_) => ApiError::InternalServerError {
				error_type: "STORAGE".to_string(),
				message,
			},
		}
	}
}

/// Order lifecycle and archival engine.
///
/// Built once at startup and shared behind an `Arc` by the API layer.
pub struct Engine {
	config: Config,
	storage: Arc<StorageService>,
	minter: Arc<IdMinter>,
	audit: Arc<AuditService>,
	ledger: Arc<InventoryService>,
	orders: OrderHandler,
	returns: ReturnHandler,
	archival: ArchivalEngine,
	restoration: Arc<RestorationEngine>,
	sweep: ReconciliationSweep,
}

impl std::fmt::Debug for Engine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Engine").field("config", &self.config).finish_non_exhaustive()
	}
}

impl Engine {
	/// Builds the engine from configuration, constructing the storage
	/// backend named by `[storage].primary`.
	pub fn from_config(config: Config) -> Result<Self, EngineError> {
		let factories: HashMap<&'static str, StorageFactory> =
			get_all_implementations().into_iter().collect();
		let factory = factories.get(config.storage.primary.as_str()).ok_or_else(|| {
			EngineError::Config(format!(
				"Unknown storage implementation '{}'",
				config.storage.primary
			))
		})?;
		let backend_config = config
			.storage
			.implementations
			.get(&config.storage.primary)
			.ok_or_else(|| {
				EngineError::Config(format!(
					"Missing configuration for storage implementation '{}'",
					config.storage.primary
				))
			})?;
		let backend = factory(backend_config).map_err(|e| EngineError::Config(e.to_string()))?;
		Ok(Self::with_backend(config, backend))
	}

	/// Builds the engine over an already-constructed storage backend.
	pub fn with_backend(config: Config, backend: Box<dyn StorageInterface>) -> Self {
		let storage = Arc::new(StorageService::new(backend));
		let minter = Arc::new(IdMinter::new());
		let audit = Arc::new(AuditService::new(storage.clone(), minter.clone()));
		let ledger = Arc::new(InventoryService::new(storage.clone()));
		let retry = RetryPolicy::from_config(&config.engine);

		let orders = OrderHandler::new(
			storage.clone(),
			audit.clone(),
			ledger.clone(),
			minter.clone(),
			retry,
		);
		let returns = ReturnHandler::new(
			storage.clone(),
			audit.clone(),
			ledger.clone(),
			minter.clone(),
			retry,
		);
		let archival = ArchivalEngine::new(storage.clone(), audit.clone(), minter.clone(), retry);
		let restoration = Arc::new(RestorationEngine::new(storage.clone(), retry));
		let sweep = ReconciliationSweep::new(
			storage.clone(),
			restoration.clone(),
			Duration::from_secs(config.engine.stale_restore_seconds),
		);

		Self {
			config,
			storage,
			minter,
			audit,
			ledger,
			orders,
			returns,
			archival,
			restoration,
			sweep,
		}
	}

	/// Order lifecycle operations.
	pub fn orders(&self) -> &OrderHandler {
		&self.orders
	}

	/// Return request operations.
	pub fn returns(&self) -> &ReturnHandler {
		&self.returns
	}

	/// Archival operations.
	pub fn archival(&self) -> &ArchivalEngine {
		&self.archival
	}

	/// Restoration operations.
	pub fn restoration(&self) -> &RestorationEngine {
		&self.restoration
	}

	/// The audit sink.
	pub fn audit(&self) -> &AuditService {
		&self.audit
	}

	/// The inventory ledger.
	pub fn ledger(&self) -> &InventoryService {
		&self.ledger
	}

	/// The typed storage service.
	pub fn storage(&self) -> &StorageService {
		&self.storage
	}

	/// The id minter.
	pub fn minter(&self) -> &IdMinter {
		&self.minter
	}

	/// The engine configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Runs the reconciliation sweep, resolving duplicated lifecycle
	/// rows and clearing stale restore flags.
	pub async fn run_sweep(&self) -> Result<SweepReport, EngineError> {
		self.sweep.run().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use rust_decimal::Decimal;
	use std::collections::BTreeMap;
	use tradepost_types::{
		Actor, LineItem, Order, OrderStatus, Partition, Product, Role, Size,
	};

	const TEST_CONFIG: &str = r#"
		[engine]
		id = "engine-test"

		[storage]
		primary = "memory"

		[storage.implementations.memory]
	"#;

	fn engine() -> Engine {
		let config: Config = TEST_CONFIG.parse().unwrap();
		Engine::from_config(config).unwrap()
	}

	fn actor() -> Actor {
		Actor::new("ops@tradepost.live", Role::Admin)
	}

	fn placed_order(id: &str, user_id: &str, items: Vec<LineItem>) -> Order {
		let total = items
			.iter()
			.map(|item| item.unit_price * Decimal::from(item.quantity))
			.sum();
		Order {
			id: id.to_string(),
			user_id: user_id.to_string(),
			shipping_address: "12 Pier Lane".to_string(),
			items,
			total,
			status: OrderStatus::Placed,
			created_at: Utc::now(),
			toship_id: None,
			packed_at: None,
			shipped_at: None,
			received_at: None,
			cancelled_at: None,
		}
	}

	fn shirt_item(quantity: u32) -> LineItem {
		LineItem {
			product_id: "P1".to_string(),
			name: "Linen shirt".to_string(),
			size: Size::S,
			quantity,
			unit_price: Decimal::new(2499, 2),
		}
	}

	fn shirt_product(stock_s: u32) -> Product {
		Product {
			id: "P1".to_string(),
			name: "Linen shirt".to_string(),
			seller_id: "SELLER-1".to_string(),
			price: Decimal::new(2499, 2),
			stock: BTreeMap::from([(Size::S, stock_s)]),
			total_stock: stock_s,
			sold: 0,
			rating: 4.5,
		}
	}

	#[test]
	fn test_from_config_rejects_unknown_backend() {
		let config: Config = r#"
			[engine]
			id = "engine-test"

			[storage]
			primary = "sqlite"

			[storage.implementations.sqlite]
		"#
		.parse()
		.unwrap();
		let err = Engine::from_config(config).unwrap_err();
		assert!(matches!(err, EngineError::Config(_)));
	}

	async fn count_sightings(engine: &Engine, order_id: &str) -> usize {
		let mut count = 0;
		for partition in Partition::lifecycle() {
			if engine.storage().exists(partition, order_id).await.unwrap() {
				count += 1;
			}
		}
		count
	}

	#[tokio::test]
	async fn test_full_lifecycle_keeps_order_in_one_partition() {
		let engine = engine();
		let order = placed_order("ORD-1", "U1", vec![shirt_item(2)]);
		engine
			.storage()
			.store(Partition::Orders, &order.id, &order)
			.await
			.unwrap();

		engine.orders().pack("ORD-1", &actor()).await.unwrap();
		assert_eq!(count_sightings(&engine, "ORD-1").await, 1);

		engine
			.orders()
			.ship("ORD-1", &shirt_item(2), &actor())
			.await
			.unwrap();
		assert_eq!(count_sightings(&engine, "ORD-1").await, 1);

		engine.orders().receive("ORD-1", &actor()).await.unwrap();
		assert_eq!(count_sightings(&engine, "ORD-1").await, 1);

		let (partition, stored) = engine.orders().find_order("ORD-1").await.unwrap();
		assert_eq!(partition, Partition::Completed);
		assert_eq!(stored.status, OrderStatus::Completed);
		assert!(stored.packed_at.is_some());
		assert!(stored.shipped_at.is_some());
		assert!(stored.received_at.is_some());

		// One audit entry per transition.
		let logs = engine.audit().list().await.unwrap();
		assert_eq!(logs.len(), 3);
		assert!(logs.iter().all(|entry| entry.action.contains("ORD-1")));
	}

	#[tokio::test]
	async fn test_archive_then_restore_round_trips_product() {
		let engine = engine();
		engine.ledger().put_product(shirt_product(5)).await.unwrap();
		let before = engine.ledger().get_product("P1").await.unwrap();

		let outcome = engine
			.archival()
			.archive_entity(tradepost_types::EntityKind::Product, "P1", &actor())
			.await
			.unwrap();
		assert_eq!(outcome.archive_partition, Partition::ProductsArchive);
		assert!(engine.ledger().get_product("P1").await.is_err());

		let restored = engine
			.restoration()
			.restore_entity(&outcome.archive_id)
			.await
			.unwrap();
		assert_eq!(
			restored,
			serde_json::to_value(&before).unwrap(),
			"restored payload must match the original exactly"
		);
		assert!(restored.get("archivedAt").is_none());
		assert!(restored.get("originalDocId").is_none());

		let after = engine.ledger().get_product("P1").await.unwrap();
		assert_eq!(after.total_stock, before.total_stock);
	}
}
