//! Order state machine rules.
//!
//! Validates lifecycle transitions against a static table, ensuring
//! orders move Placed -> To Ship -> To Receive -> Completed, with
//! Cancelled reachable only from Placed. Also provides the per-order
//! gate that keeps one order's transitions strictly sequential: a
//! transition may not begin until the previous one's commit has been
//! acknowledged.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tradepost_types::OrderStatus;

/// Errors that can occur during state validation.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("Invalid transition from '{from}' to '{to}'")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// Static transition table. Each status maps to the statuses an order
/// may move to next; terminal statuses map to the empty set.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderStatus::Placed,
		HashSet::from([OrderStatus::ToShip, OrderStatus::Cancelled]),
	);
	m.insert(OrderStatus::ToShip, HashSet::from([OrderStatus::ToReceive]));
	m.insert(
		OrderStatus::ToReceive,
		HashSet::from([OrderStatus::Completed]),
	);
	m.insert(OrderStatus::Completed, HashSet::new());
	m.insert(OrderStatus::Cancelled, HashSet::new());
	m
});

/// Checks whether a transition is allowed by the table.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
	TRANSITIONS
		.get(&from)
		.map(|next| next.contains(&to))
		.unwrap_or(false)
}

/// Validates a transition, returning the offending pair on failure.
pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), StateError> {
	if is_valid_transition(from, to) {
		Ok(())
	} else {
		Err(StateError::InvalidTransition { from, to })
	}
}

/// Per-entity mutex registry serializing transitions.
///
/// Acquiring the gate for an id blocks until any in-flight operation on
/// the same id releases it. Entries are created on first touch and kept
/// for the life of the gate.
#[derive(Default)]
pub struct TransitionGate {
	locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TransitionGate {
	pub fn new() -> Self {
		Self::default()
	}

	/// Acquires the gate for the given id, waiting for any holder.
	pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
		let lock = self
			.locks
			.entry(id.to_string())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone();
		lock.lock_owned().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_happy_path_is_valid() {
		assert!(is_valid_transition(OrderStatus::Placed, OrderStatus::ToShip));
		assert!(is_valid_transition(
			OrderStatus::ToShip,
			OrderStatus::ToReceive
		));
		assert!(is_valid_transition(
			OrderStatus::ToReceive,
			OrderStatus::Completed
		));
	}

	#[test]
	fn test_cancellation_only_from_placed() {
		assert!(is_valid_transition(
			OrderStatus::Placed,
			OrderStatus::Cancelled
		));
		assert!(!is_valid_transition(
			OrderStatus::ToShip,
			OrderStatus::Cancelled
		));
		assert!(!is_valid_transition(
			OrderStatus::ToReceive,
			OrderStatus::Cancelled
		));
	}

	#[test]
	fn test_no_skipping_stages() {
		assert!(!is_valid_transition(
			OrderStatus::Placed,
			OrderStatus::ToReceive
		));
		assert!(!is_valid_transition(
			OrderStatus::Placed,
			OrderStatus::Completed
		));
		assert!(!is_valid_transition(
			OrderStatus::ToShip,
			OrderStatus::Completed
		));
	}

	#[test]
	fn test_terminal_states_have_no_exits() {
		for to in [
			OrderStatus::Placed,
			OrderStatus::ToShip,
			OrderStatus::ToReceive,
			OrderStatus::Completed,
			OrderStatus::Cancelled,
		] {
			assert!(!is_valid_transition(OrderStatus::Completed, to));
			assert!(!is_valid_transition(OrderStatus::Cancelled, to));
		}
	}

	#[test]
	fn test_validate_reports_pair() {
		let err = validate_transition(OrderStatus::Completed, OrderStatus::Placed).unwrap_err();
		let message = err.to_string();
		assert!(message.contains("Completed"));
		assert!(message.contains("Placed"));
	}

	#[tokio::test]
	async fn test_gate_serializes_same_id() {
		let gate = Arc::new(TransitionGate::new());
		let first = gate.acquire("ORD-1").await;

		let gate_clone = gate.clone();
		let handle = tokio::spawn(async move {
			let _second = gate_clone.acquire("ORD-1").await;
		});

		// The second acquire is blocked while the first guard is held.
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		assert!(!handle.is_finished());

		drop(first);
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn test_gate_does_not_block_other_ids() {
		let gate = TransitionGate::new();
		let _first = gate.acquire("ORD-1").await;
		// Different id acquires immediately.
		let _second = gate.acquire("ORD-2").await;
	}
}
