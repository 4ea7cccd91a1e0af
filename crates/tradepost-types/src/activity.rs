//! Activity log types.
//!
//! Log entries are append-only: there is no update surface anywhere in
//! the engine, and the only deletion path is the admin-gated one on the
//! audit sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Actor, Role};

/// One immutable entry in the activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
	/// Unique identifier, `LOG-<epochMillis>-<seq>`.
	#[serde(rename = "logId")]
	pub id: String,
	/// What happened, e.g. "Packed order ORD-1".
	pub action: String,
	/// Email of the console user who acted.
	pub user_email: String,
	/// Role the user acted under.
	pub role: Role,
	/// Customer the action concerned, when applicable.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	/// Product the action concerned, when applicable.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub product_id: Option<String>,
	/// When the action happened.
	pub timestamp: DateTime<Utc>,
}

impl ActivityLog {
	/// Builds an entry for an action performed by the given actor.
	///
	/// The id must come from the identifier service; this constructor
	/// only assembles fields.
	pub fn new(id: impl Into<String>, action: impl Into<String>, actor: &Actor) -> Self {
		Self {
			id: id.into(),
			action: action.into(),
			user_email: actor.email.clone(),
			role: actor.role,
			user_id: None,
			product_id: None,
			timestamp: Utc::now(),
		}
	}

	/// Attaches the customer the action concerned.
	pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	/// Attaches the product the action concerned.
	pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
		self.product_id = Some(product_id.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_entry_carries_actor_identity() {
		let actor = Actor::new("ops@tradepost.live", Role::Seller);
		let entry = ActivityLog::new("LOG-1700000000000-001", "Packed order ORD-1", &actor)
			.with_user("U1");
		assert_eq!(entry.user_email, "ops@tradepost.live");
		assert_eq!(entry.role, Role::Seller);
		assert_eq!(entry.user_id.as_deref(), Some("U1"));
		assert_eq!(entry.product_id, None);
	}

	#[test]
	fn test_entry_serializes_camel_case() {
		let actor = Actor::new("ops@tradepost.live", Role::Admin);
		let entry = ActivityLog::new("LOG-1700000000000-002", "Archived seller S1", &actor);
		let json = serde_json::to_value(&entry).unwrap();
		assert_eq!(json["logId"], "LOG-1700000000000-002");
		assert_eq!(json["userEmail"], "ops@tradepost.live");
		assert!(json.get("productId").is_none());
	}
}
