//! Product and stock types for the inventory ledger.
//!
//! Stock is tracked per size bucket; the total is derived. The invariant
//! the ledger enforces on every mutation: `total_stock` equals the sum of
//! the per-size buckets.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Garment size bucket.
///
/// Ordering follows the size progression so serialized stock maps keep a
/// stable key order.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Size {
	S,
	M,
	L,
	XL,
}

impl Size {
	/// Returns an iterator over all size buckets.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::S, Self::M, Self::L, Self::XL].into_iter()
	}
}

impl fmt::Display for Size {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Size::S => write!(f, "S"),
			Size::M => write!(f, "M"),
			Size::L => write!(f, "L"),
			Size::XL => write!(f, "XL"),
		}
	}
}

impl FromStr for Size {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"S" => Ok(Size::S),
			"M" => Ok(Size::M),
			"L" => Ok(Size::L),
			"XL" => Ok(Size::XL),
			_ => Err(()),
		}
	}
}

/// A catalog product with per-size stock counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
	/// Unique identifier for this product.
	#[serde(rename = "productId")]
	pub id: String,
	/// Display name.
	pub name: String,
	/// Seller owning this product.
	pub seller_id: String,
	/// Current unit price.
	pub price: Decimal,
	/// Stock count per size bucket.
	pub stock: BTreeMap<Size, u32>,
	/// Derived sum of the per-size buckets. Recomputed by the ledger on
	/// every mutation, never accepted from a caller.
	pub total_stock: u32,
	/// Units sold counter.
	pub sold: u32,
	/// Average customer rating.
	pub rating: f64,
}

impl Product {
	/// Sums the per-size buckets.
	///
	/// This is the authoritative total; the stored `total_stock` field is
	/// a cached copy of this value.
	pub fn computed_total(&self) -> u32 {
		self.stock.values().sum()
	}
}

/// Stock levels reported after a ledger adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevels {
	/// New count in the adjusted size bucket.
	pub size_stock: u32,
	/// New derived total across all buckets.
	pub total_stock: u32,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_product() -> Product {
		Product {
			id: "P1".to_string(),
			name: "Linen shirt".to_string(),
			seller_id: "SELLER-1".to_string(),
			price: Decimal::new(2499, 2),
			stock: BTreeMap::from([(Size::S, 5), (Size::M, 2)]),
			total_stock: 7,
			sold: 0,
			rating: 4.5,
		}
	}

	#[test]
	fn test_computed_total_sums_buckets() {
		let product = sample_product();
		assert_eq!(product.computed_total(), 7);
	}

	#[test]
	fn test_product_serializes_camel_case() {
		let json = serde_json::to_value(sample_product()).unwrap();
		assert_eq!(json["productId"], "P1");
		assert_eq!(json["totalStock"], 7);
		assert_eq!(json["stock"]["S"], 5);
	}

	#[test]
	fn test_size_round_trip() {
		for size in Size::all() {
			assert_eq!(Size::from_str(&size.to_string()), Ok(size));
		}
		assert!(Size::from_str("XXL").is_err());
	}
}
