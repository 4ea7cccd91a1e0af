//! Inventory ledger for the tradepost engine.
//!
//! Product stock is the one resource that concurrent operations contend
//! on, so every mutation goes through [`InventoryService::adjust_stock`],
//! which serializes read-modify-write cycles per product. The ledger
//! maintains one invariant on every write: `totalStock` equals the sum
//! of the per-size buckets, recomputed from the buckets themselves and
//! never accepted from caller input.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use tradepost_storage::{StorageError, StorageService};
use tradepost_types::{LineItem, Partition, Product, Size, StockLevels};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Error that occurs when the referenced product does not exist.
	#[error("Product {0} not found")]
	ProductNotFound(String),
	/// Error that occurs when a deduction would drive a bucket negative.
	#[error("Insufficient stock for product {product_id} size {size}: have {available}, need {requested}")]
	InsufficientStock {
		product_id: String,
		size: Size,
		available: u32,
		requested: u32,
	},
	/// Error that occurs in the underlying storage layer.
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Outcome of restoring a set of line items back onto their products.
///
/// Line items whose product no longer exists are skipped rather than
/// failing the whole restoration; the skipped product ids are reported
/// so callers can log them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestorationSummary {
	/// Units added back across all restored line items.
	pub restored_units: u32,
	/// Product ids referenced by skipped line items.
	pub skipped_products: Vec<String>,
}

impl RestorationSummary {
	pub fn has_skips(&self) -> bool {
		!self.skipped_products.is_empty()
	}
}

/// Service applying serialized stock adjustments to products.
pub struct InventoryService {
	storage: Arc<StorageService>,
	/// Per-product mutexes. Entries are created on first touch and kept
	/// for the life of the service.
	locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InventoryService {
	/// Creates a new InventoryService over the given storage.
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			locks: DashMap::new(),
		}
	}

	fn lock_for(&self, product_id: &str) -> Arc<Mutex<()>> {
		self.locks
			.entry(product_id.to_string())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	/// Applies a delta to one size bucket of a product.
	///
	/// Positive deltas restock, negative deltas deduct. The read, the
	/// bucket update and the write run under the product's mutex, and the
	/// stored total is recomputed from the buckets before the write.
	pub async fn adjust_stock(
		&self,
		product_id: &str,
		size: Size,
		delta: i64,
	) -> Result<StockLevels, LedgerError> {
		let lock = self.lock_for(product_id);
		let _guard = lock.lock().await;

		let mut product: Product = match self.storage.retrieve(Partition::Products, product_id).await
		{
			Ok(product) => product,
			Err(StorageError::NotFound) => {
				return Err(LedgerError::ProductNotFound(product_id.to_string()))
			},
			Err(e) => return Err(e.into()),
		};

		let current = product.stock.get(&size).copied().unwrap_or(0);
		let next = i64::from(current) + delta;
		if next < 0 {
			return Err(LedgerError::InsufficientStock {
				product_id: product_id.to_string(),
				size,
				available: current,
				requested: delta.unsigned_abs() as u32,
			});
		}
		product.stock.insert(size, next as u32);
		product.total_stock = product.computed_total();

		self.storage
			.update(Partition::Products, product_id, &product)
			.await?;

		debug!(
			product_id = %product_id,
			size = %size,
			delta = delta,
			size_stock = next as u32,
			total_stock = product.total_stock,
			"adjusted stock"
		);

		Ok(StockLevels {
			size_stock: next as u32,
			total_stock: product.total_stock,
		})
	}

	/// Adds the quantities of the given line items back onto their
	/// products.
	///
	/// A line item whose product is gone is logged and skipped; the rest
	/// of the restoration proceeds.
	pub async fn restore_line_items(
		&self,
		items: &[LineItem],
	) -> Result<RestorationSummary, LedgerError> {
		let mut summary = RestorationSummary::default();
		for item in items {
			match self
				.adjust_stock(&item.product_id, item.size, i64::from(item.quantity))
				.await
			{
				Ok(_) => summary.restored_units += item.quantity,
				Err(LedgerError::ProductNotFound(id)) => {
					warn!(
						product_id = %id,
						quantity = item.quantity,
						"skipping stock restoration for missing product"
					);
					summary.skipped_products.push(id);
				},
				Err(e) => return Err(e),
			}
		}
		Ok(summary)
	}

	/// Fetches a product.
	pub async fn get_product(&self, product_id: &str) -> Result<Product, LedgerError> {
		match self.storage.retrieve(Partition::Products, product_id).await {
			Ok(product) => Ok(product),
			Err(StorageError::NotFound) => Err(LedgerError::ProductNotFound(product_id.to_string())),
			Err(e) => Err(e.into()),
		}
	}

	/// Stores a product, normalizing its total to the bucket sum first.
	pub async fn put_product(&self, mut product: Product) -> Result<(), LedgerError> {
		let lock = self.lock_for(&product.id);
		let _guard = lock.lock().await;
		product.total_stock = product.computed_total();
		self.storage
			.store(Partition::Products, &product.id, &product)
			.await?;
		Ok(())
	}
}
