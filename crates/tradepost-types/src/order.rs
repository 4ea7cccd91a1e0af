//! Order lifecycle types.
//!
//! This module defines orders, their denormalized line items, and the
//! return request side records used throughout the lifecycle engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Partition, Size};

/// A customer order moving through the fulfillment lifecycle.
///
/// The status field and the partition the document lives in always agree:
/// transitioning an order rewrites the status and relocates the document
/// in the same atomic commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Unique identifier for this order, supplied by the checkout flow.
	#[serde(rename = "orderId")]
	pub id: String,
	/// Customer who placed the order.
	pub user_id: String,
	/// Destination address snapshot taken at checkout.
	pub shipping_address: String,
	/// Purchased items with price and size captured at purchase time.
	pub items: Vec<LineItem>,
	/// Order total captured at purchase time.
	pub total: Decimal,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Timestamp when the order was placed.
	pub created_at: DateTime<Utc>,
	/// Packing batch marker assigned when the order is packed.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub toship_id: Option<String>,
	/// Timestamp of the pack transition.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub packed_at: Option<DateTime<Utc>>,
	/// Timestamp of the ship transition.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub shipped_at: Option<DateTime<Utc>>,
	/// Timestamp of the receive transition.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub received_at: Option<DateTime<Utc>>,
	/// Timestamp of the cancel transition.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cancelled_at: Option<DateTime<Utc>>,
}

/// A purchased item within an order.
///
/// Name, size and unit price are denormalized snapshots: later catalog
/// edits never change what a historical order shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
	/// Product purchased.
	pub product_id: String,
	/// Product name at purchase time.
	pub name: String,
	/// Size bucket purchased.
	pub size: Size,
	/// Units purchased.
	pub quantity: u32,
	/// Unit price at purchase time.
	pub unit_price: Decimal,
}

/// Status of an order in the fulfillment lifecycle.
///
/// Serialized values match the console's display strings, which is what
/// the stored documents carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
	/// Order has been placed but not yet packed.
	Placed,
	/// Order has been packed and awaits shipment.
	#[serde(rename = "To Ship")]
	ToShip,
	/// Order has been shipped and awaits receipt confirmation.
	#[serde(rename = "To Receive")]
	ToReceive,
	/// Order has been received. Terminal.
	Completed,
	/// Order was cancelled before packing. Terminal.
	Cancelled,
}

impl OrderStatus {
	/// Returns the lifecycle partition holding orders in this status.
	pub fn partition(&self) -> Partition {
		match self {
			OrderStatus::Placed => Partition::Orders,
			OrderStatus::ToShip => Partition::ToShip,
			OrderStatus::ToReceive => Partition::ToReceive,
			OrderStatus::Completed => Partition::Completed,
			OrderStatus::Cancelled => Partition::Cancelled,
		}
	}

	/// Returns the status whose orders live in the given partition.
	pub fn for_partition(partition: Partition) -> Option<Self> {
		match partition {
			Partition::Orders => Some(OrderStatus::Placed),
			Partition::ToShip => Some(OrderStatus::ToShip),
			Partition::ToReceive => Some(OrderStatus::ToReceive),
			Partition::Completed => Some(OrderStatus::Completed),
			Partition::Cancelled => Some(OrderStatus::Cancelled),
			_ => None,
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Placed => write!(f, "Placed"),
			OrderStatus::ToShip => write!(f, "To Ship"),
			OrderStatus::ToReceive => write!(f, "To Receive"),
			OrderStatus::Completed => write!(f, "Completed"),
			OrderStatus::Cancelled => write!(f, "Cancelled"),
		}
	}
}

/// Status of a return request.
///
/// The machine is monotonic: a resolved request never becomes pending
/// again, and a decision is never overwritten.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReturnStatus {
	/// Filed and awaiting a decision.
	Pending,
	/// Return accepted; stock restored and refund recorded.
	Approved,
	/// Return rejected.
	Disapproved,
}

impl fmt::Display for ReturnStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ReturnStatus::Pending => write!(f, "Pending"),
			ReturnStatus::Approved => write!(f, "Approved"),
			ReturnStatus::Disapproved => write!(f, "Disapproved"),
		}
	}
}

/// A return request filed against a completed order.
///
/// Lives in its own partition as a side record; the order it references
/// stays in `completed` regardless of the decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
	/// Unique identifier for this request.
	#[serde(rename = "requestId")]
	pub id: String,
	/// Completed order the request refers to.
	pub order_id: String,
	/// Customer who filed the request.
	pub user_id: String,
	/// Items being returned, snapshot from the order.
	pub items: Vec<LineItem>,
	/// Customer-supplied reason.
	pub reason: String,
	/// Current decision state.
	pub status: ReturnStatus,
	/// Timestamp when the request was filed.
	pub created_at: DateTime<Utc>,
	/// Timestamp of the decision.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resolved_at: Option<DateTime<Utc>>,
	/// Email of the console user who decided.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resolved_by: Option<String>,
	/// Refund amount recorded on approval.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refund_total: Option<Decimal>,
}

impl ReturnRequest {
	/// Sum of the requested items at their purchase-time prices.
	pub fn requested_total(&self) -> Decimal {
		self.items
			.iter()
			.map(|item| item.unit_price * Decimal::from(item.quantity))
			.sum()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_serializes_display_strings() {
		let json = serde_json::to_value(OrderStatus::ToShip).unwrap();
		assert_eq!(json, "To Ship");
		let back: OrderStatus = serde_json::from_value(json).unwrap();
		assert_eq!(back, OrderStatus::ToShip);
	}

	#[test]
	fn test_status_partition_round_trip() {
		for partition in Partition::lifecycle() {
			let status = OrderStatus::for_partition(partition).unwrap();
			assert_eq!(status.partition(), partition);
		}
	}

	#[test]
	fn test_order_serializes_camel_case() {
		let order = Order {
			id: "ORD-1".to_string(),
			user_id: "U1".to_string(),
			shipping_address: "12 Pier Lane".to_string(),
			items: vec![],
			total: Decimal::ZERO,
			status: OrderStatus::Placed,
			created_at: Utc::now(),
			toship_id: None,
			packed_at: None,
			shipped_at: None,
			received_at: None,
			cancelled_at: None,
		};
		let json = serde_json::to_value(&order).unwrap();
		assert_eq!(json["orderId"], "ORD-1");
		assert_eq!(json["userId"], "U1");
		assert_eq!(json["status"], "Placed");
		assert!(json.get("packedAt").is_none());
	}

	#[test]
	fn test_requested_total_uses_snapshot_prices() {
		let request = ReturnRequest {
			id: "RET-1".to_string(),
			order_id: "ORD-1".to_string(),
			user_id: "U1".to_string(),
			items: vec![LineItem {
				product_id: "P1".to_string(),
				name: "Linen shirt".to_string(),
				size: Size::M,
				quantity: 2,
				unit_price: Decimal::new(2500, 2),
			}],
			reason: "wrong size".to_string(),
			status: ReturnStatus::Pending,
			created_at: Utc::now(),
			resolved_at: None,
			resolved_by: None,
			refund_total: None,
		};
		assert_eq!(request.requested_total(), Decimal::new(5000, 2));
	}
}
