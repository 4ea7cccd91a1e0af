//! Utility functions shared across the engine.

use chrono::Utc;

/// Utility function to truncate an identifier for display purposes.
///
/// Shows only the first 12 characters followed by ".." for longer strings.
/// Keeps log lines readable without losing the `LOG-`/`ORD-` prefixes
/// that identify what kind of id is being shown.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 12 {
		id.to_string()
	} else {
		format!("{}..", &id[..12])
	}
}

/// Current time in epoch milliseconds.
pub fn current_timestamp() -> u64 {
	Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("ORD-1"), "ORD-1");
		assert_eq!(truncate_id("LOG-17000000"), "LOG-17000000");
		assert_eq!(truncate_id("LOG-1700000000000-001"), "LOG-17000000..");
	}
}
