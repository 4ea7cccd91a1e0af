//! Identifier service for the tradepost engine.
//!
//! All identifiers the engine mints come from this one place. Log ids
//! keep the console's `LOG-<epochMillis>-<seq>` shape but draw the
//! suffix from a monotonic sequence instead of a random draw, so two
//! entries minted in the same millisecond can never collide. Removal
//! tokens are short uppercase hex strings drawn from UUID entropy.

use chrono::Utc;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Capacity of one millisecond slot. When a burst exhausts it, the
/// sequence borrows from the next millisecond and keeps counting.
const SLOTS_PER_MILLI: u32 = 1000;

#[derive(Debug)]
struct MintState {
	millis: u64,
	seq: u32,
}

/// Mints every identifier the engine needs.
///
/// Not `Clone`: hold it in an `Arc` and share it. Ids from one minter
/// are strictly increasing in `(millis, seq)` order.
#[derive(Debug)]
pub struct IdMinter {
	state: Mutex<MintState>,
}

impl IdMinter {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(MintState { millis: 0, seq: 0 }),
		}
	}

	/// Claims the next `(millis, seq)` slot.
	///
	/// When real time has moved past the last claimed millisecond the
	/// sequence resets; otherwise it advances within the millisecond,
	/// spilling into the next one once the slot capacity is reached.
	fn next_slot(&self) -> (u64, u32) {
		let now = Utc::now().timestamp_millis() as u64;
		let mut state = self
			.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner);
		if now > state.millis {
			state.millis = now;
			state.seq = 0;
		} else if state.seq + 1 < SLOTS_PER_MILLI {
			state.seq += 1;
		} else {
			state.millis += 1;
			state.seq = 0;
		}
		(state.millis, state.seq)
	}

	/// Mints an activity log id, `LOG-<epochMillis>-<seq>`.
	pub fn log_id(&self) -> String {
		let (millis, seq) = self.next_slot();
		format!("LOG-{}-{:03}", millis, seq)
	}

	/// Mints an order id for seeding and tests. Production orders arrive
	/// with ids assigned at checkout.
	pub fn order_id(&self) -> String {
		let (millis, seq) = self.next_slot();
		format!("ORD-{}-{:03}", millis, seq)
	}

	/// Mints a packing batch marker stamped onto orders at pack time.
	pub fn toship_id(&self) -> String {
		let (millis, seq) = self.next_slot();
		format!("TS-{}-{:03}", millis, seq)
	}

	/// Mints a return request id.
	pub fn return_id(&self) -> String {
		let (millis, seq) = self.next_slot();
		format!("RET-{}-{:03}", millis, seq)
	}

	/// Mints a removal token for admin archives, `R-` plus six uppercase
	/// hex digits.
	pub fn removal_token(&self) -> String {
		let bytes = Uuid::new_v4().into_bytes();
		format!("R-{:02X}{:02X}{:02X}", bytes[0], bytes[1], bytes[2])
	}
}

impl Default for IdMinter {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;
	use std::sync::Arc;

	fn slot_of(id: &str) -> (u64, u32) {
		let mut parts = id.split('-');
		parts.next();
		let millis = parts.next().unwrap().parse().unwrap();
		let seq = parts.next().unwrap().parse().unwrap();
		(millis, seq)
	}

	#[test]
	fn test_log_id_format() {
		let minter = IdMinter::new();
		let id = minter.log_id();
		assert!(id.starts_with("LOG-"));
		let (_, seq) = slot_of(&id);
		assert!(seq < SLOTS_PER_MILLI);
		// Three-digit zero-padded suffix
		assert_eq!(id.rsplit('-').next().unwrap().len(), 3);
	}

	#[test]
	fn test_burst_is_strictly_increasing_and_unique() {
		let minter = IdMinter::new();
		let mut last = (0u64, 0u32);
		let mut seen = HashSet::new();
		for _ in 0..5000 {
			let id = minter.log_id();
			let slot = slot_of(&id);
			assert!(slot > last, "slot {:?} not after {:?}", slot, last);
			assert!(seen.insert(id));
			last = slot;
		}
	}

	#[test]
	fn test_concurrent_minting_never_collides() {
		let minter = Arc::new(IdMinter::new());
		let mut handles = Vec::new();
		for _ in 0..8 {
			let minter = minter.clone();
			handles.push(std::thread::spawn(move || {
				(0..500).map(|_| minter.log_id()).collect::<Vec<_>>()
			}));
		}
		let mut seen = HashSet::new();
		for handle in handles {
			for id in handle.join().unwrap() {
				assert!(seen.insert(id));
			}
		}
		assert_eq!(seen.len(), 4000);
	}

	#[test]
	fn test_removal_token_shape() {
		let minter = IdMinter::new();
		let token = minter.removal_token();
		assert_eq!(token.len(), 8);
		assert!(token.starts_with("R-"));
		assert!(token[2..]
			.chars()
			.all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
	}

	#[test]
	fn test_prefixes_by_kind() {
		let minter = IdMinter::new();
		assert!(minter.order_id().starts_with("ORD-"));
		assert!(minter.toship_id().starts_with("TS-"));
		assert!(minter.return_id().starts_with("RET-"));
	}
}
