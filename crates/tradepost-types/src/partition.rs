//! Partition map for the document store.
//!
//! Every collection the engine touches is named here. This enum provides
//! type safety for storage operations by replacing string literals with
//! strongly typed variants, and it carries the static archive mapping:
//! each archivable live partition has exactly one archive twin, and every
//! archive partition knows the live partition its records restore into.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage partitions for the marketplace document collections.
///
/// Lifecycle partitions hold orders keyed by stage; each order lives in
/// exactly one of them at any moment. The `*Archive` twins hold
/// [`ArchiveRecord`](crate::ArchiveRecord) wrappers for documents removed
/// from their live partition. Activity logs have no archive twin: log
/// entries are never moved, only bundled into admin archives or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
	/// Newly placed orders awaiting packing.
	Orders,
	/// Packed orders awaiting shipment.
	ToShip,
	/// Shipped orders awaiting receipt confirmation.
	ToReceive,
	/// Received orders, terminal happy path.
	Completed,
	/// Cancelled orders, terminal branch.
	Cancelled,
	/// Return requests filed against completed orders.
	ReturnRequests,
	/// Customer accounts.
	Users,
	/// Product catalog with per-size stock.
	Products,
	/// Console administrator accounts.
	Admins,
	/// Seller accounts.
	Sellers,
	/// Append-only activity log.
	ActivityLogs,
	/// Per-user notification rows.
	Notifications,
	/// Per-user saved shipping locations.
	ShippingLocations,
	/// Per-user chat message rows.
	ChatMessages,
	/// Per-user sizing measurements.
	Measurements,
	/// Archived placed orders.
	OrdersArchive,
	/// Archived packed orders.
	ToShipArchive,
	/// Archived shipped orders.
	ToReceiveArchive,
	/// Archived completed orders.
	CompletedArchive,
	/// Archived cancelled orders.
	CancelledArchive,
	/// Archived return requests.
	ReturnRequestsArchive,
	/// Archived customer accounts.
	UsersArchive,
	/// Archived products.
	ProductsArchive,
	/// Archived administrator accounts.
	AdminsArchive,
	/// Archived seller accounts.
	SellersArchive,
	/// Archived notification rows.
	NotificationsArchive,
	/// Archived shipping locations.
	ShippingLocationsArchive,
	/// Archived chat messages.
	ChatMessagesArchive,
	/// Archived measurements.
	MeasurementsArchive,
}

impl Partition {
	/// Returns the string representation of the partition.
	pub fn as_str(&self) -> &'static str {
		match self {
			Partition::Orders => "orders",
			Partition::ToShip => "to_ship",
			Partition::ToReceive => "to_receive",
			Partition::Completed => "completed",
			Partition::Cancelled => "cancelled",
			Partition::ReturnRequests => "return_requests",
			Partition::Users => "users",
			Partition::Products => "products",
			Partition::Admins => "admins",
			Partition::Sellers => "sellers",
			Partition::ActivityLogs => "activity_logs",
			Partition::Notifications => "notifications",
			Partition::ShippingLocations => "shipping_locations",
			Partition::ChatMessages => "chat_messages",
			Partition::Measurements => "measurements",
			Partition::OrdersArchive => "orders_archive",
			Partition::ToShipArchive => "to_ship_archive",
			Partition::ToReceiveArchive => "to_receive_archive",
			Partition::CompletedArchive => "completed_archive",
			Partition::CancelledArchive => "cancelled_archive",
			Partition::ReturnRequestsArchive => "return_requests_archive",
			Partition::UsersArchive => "users_archive",
			Partition::ProductsArchive => "products_archive",
			Partition::AdminsArchive => "admins_archive",
			Partition::SellersArchive => "sellers_archive",
			Partition::NotificationsArchive => "notifications_archive",
			Partition::ShippingLocationsArchive => "shipping_locations_archive",
			Partition::ChatMessagesArchive => "chat_messages_archive",
			Partition::MeasurementsArchive => "measurements_archive",
		}
	}

	/// Returns an iterator over all Partition variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::ToShip,
			Self::ToReceive,
			Self::Completed,
			Self::Cancelled,
			Self::ReturnRequests,
			Self::Users,
			Self::Products,
			Self::Admins,
			Self::Sellers,
			Self::ActivityLogs,
			Self::Notifications,
			Self::ShippingLocations,
			Self::ChatMessages,
			Self::Measurements,
			Self::OrdersArchive,
			Self::ToShipArchive,
			Self::ToReceiveArchive,
			Self::CompletedArchive,
			Self::CancelledArchive,
			Self::ReturnRequestsArchive,
			Self::UsersArchive,
			Self::ProductsArchive,
			Self::AdminsArchive,
			Self::SellersArchive,
			Self::NotificationsArchive,
			Self::ShippingLocationsArchive,
			Self::ChatMessagesArchive,
			Self::MeasurementsArchive,
		]
		.into_iter()
	}

	/// The lifecycle partitions an order can occupy, in stage order.
	///
	/// The one-partition invariant is defined over this set: an order ID
	/// appears in at most one of these at any moment.
	pub fn lifecycle() -> [Self; 5] {
		[
			Self::Orders,
			Self::ToShip,
			Self::ToReceive,
			Self::Completed,
			Self::Cancelled,
		]
	}

	/// The partitions carrying per-user rows that composite user archival
	/// gathers, moves, and full restoration brings back.
	pub fn user_dependents() -> [Self; 10] {
		[
			Self::ShippingLocations,
			Self::ChatMessages,
			Self::Orders,
			Self::ToShip,
			Self::ToReceive,
			Self::Completed,
			Self::Cancelled,
			Self::ReturnRequests,
			Self::Measurements,
			Self::Notifications,
		]
	}

	/// Returns the archive twin of a live partition, if it has one.
	pub fn archive_of(&self) -> Option<Self> {
		match self {
			Partition::Orders => Some(Partition::OrdersArchive),
			Partition::ToShip => Some(Partition::ToShipArchive),
			Partition::ToReceive => Some(Partition::ToReceiveArchive),
			Partition::Completed => Some(Partition::CompletedArchive),
			Partition::Cancelled => Some(Partition::CancelledArchive),
			Partition::ReturnRequests => Some(Partition::ReturnRequestsArchive),
			Partition::Users => Some(Partition::UsersArchive),
			Partition::Products => Some(Partition::ProductsArchive),
			Partition::Admins => Some(Partition::AdminsArchive),
			Partition::Sellers => Some(Partition::SellersArchive),
			Partition::Notifications => Some(Partition::NotificationsArchive),
			Partition::ShippingLocations => Some(Partition::ShippingLocationsArchive),
			Partition::ChatMessages => Some(Partition::ChatMessagesArchive),
			Partition::Measurements => Some(Partition::MeasurementsArchive),
			_ => None,
		}
	}

	/// Returns the live partition an archive partition restores into.
	pub fn origin_of(&self) -> Option<Self> {
		match self {
			Partition::OrdersArchive => Some(Partition::Orders),
			Partition::ToShipArchive => Some(Partition::ToShip),
			Partition::ToReceiveArchive => Some(Partition::ToReceive),
			Partition::CompletedArchive => Some(Partition::Completed),
			Partition::CancelledArchive => Some(Partition::Cancelled),
			Partition::ReturnRequestsArchive => Some(Partition::ReturnRequests),
			Partition::UsersArchive => Some(Partition::Users),
			Partition::ProductsArchive => Some(Partition::Products),
			Partition::AdminsArchive => Some(Partition::Admins),
			Partition::SellersArchive => Some(Partition::Sellers),
			Partition::NotificationsArchive => Some(Partition::Notifications),
			Partition::ShippingLocationsArchive => Some(Partition::ShippingLocations),
			Partition::ChatMessagesArchive => Some(Partition::ChatMessages),
			Partition::MeasurementsArchive => Some(Partition::Measurements),
			_ => None,
		}
	}

	/// True when this partition holds archive records.
	pub fn is_archive(&self) -> bool {
		self.origin_of().is_some()
	}
}

impl fmt::Display for Partition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl FromStr for Partition {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|p| p.as_str() == s).ok_or(())
	}
}

impl From<Partition> for &'static str {
	fn from(partition: Partition) -> Self {
		partition.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_archive_mapping_is_involutive() {
		for partition in Partition::all() {
			if let Some(archive) = partition.archive_of() {
				assert_eq!(archive.origin_of(), Some(partition));
			}
			if let Some(origin) = partition.origin_of() {
				assert_eq!(origin.archive_of(), Some(partition));
			}
		}
	}

	#[test]
	fn test_activity_logs_have_no_archive_twin() {
		assert_eq!(Partition::ActivityLogs.archive_of(), None);
		assert!(!Partition::ActivityLogs.is_archive());
	}

	#[test]
	fn test_round_trip_from_str() {
		for partition in Partition::all() {
			assert_eq!(Partition::from_str(partition.as_str()), Ok(partition));
		}
		assert!(Partition::from_str("not_a_partition").is_err());
	}

	#[test]
	fn test_user_dependents_are_live_and_archivable() {
		for partition in Partition::user_dependents() {
			assert!(!partition.is_archive());
			assert!(partition.archive_of().is_some());
		}
	}
}
