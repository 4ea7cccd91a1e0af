//! Actor identity types.
//!
//! Every mutating operation receives the identity of the console user who
//! triggered it. The actor is resolved once at the API boundary and passed
//! down explicitly; no engine component looks identity up from ambient
//! session state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a console user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	/// Full access, including log deletion and archival of any entity.
	Admin,
	/// Order fulfillment and product management.
	Seller,
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Role::Admin => write!(f, "admin"),
			Role::Seller => write!(f, "seller"),
		}
	}
}

impl FromStr for Role {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"admin" => Ok(Role::Admin),
			"seller" => Ok(Role::Seller),
			_ => Err(()),
		}
	}
}

/// Identity of the console user performing an operation.
///
/// Carried into every mutating engine call and stamped onto activity log
/// entries and archive records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
	/// Email address identifying the user.
	pub email: String,
	/// Console role the user acted under.
	pub role: Role,
}

impl Actor {
	/// Creates an actor from an email and role.
	pub fn new(email: impl Into<String>, role: Role) -> Self {
		Self {
			email: email.into(),
			role,
		}
	}

	/// True when the actor holds the admin role.
	pub fn is_admin(&self) -> bool {
		self.role == Role::Admin
	}
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.email, self.role)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_role_round_trip() {
		assert_eq!(Role::from_str("admin"), Ok(Role::Admin));
		assert_eq!(Role::from_str("Seller"), Ok(Role::Seller));
		assert!(Role::from_str("customer").is_err());
	}

	#[test]
	fn test_actor_serializes_role_lowercase() {
		let actor = Actor::new("ops@tradepost.live", Role::Admin);
		let json = serde_json::to_value(&actor).unwrap();
		assert_eq!(json["role"], "admin");
	}
}
