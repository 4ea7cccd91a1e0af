//! Common types module for the tradepost engine.
//!
//! This module defines the core data types and structures used throughout
//! the order lifecycle and archival system. It provides a centralized
//! location for shared types to ensure consistency across all engine
//! components.

/// Activity log types for the append-only audit trail.
pub mod activity;
/// Actor identity types for attributing operations to console users.
pub mod actor;
/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Archive record types wrapping documents moved out of live partitions.
pub mod archive;
/// Order lifecycle types including line items and return requests.
pub mod order;
/// Partition map for the document store collections.
pub mod partition;
/// Product and stock types for the inventory ledger.
pub mod product;
/// Registry trait for self-registering storage implementations.
pub mod registry;
/// Utility functions for identifiers and timestamps.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use activity::*;
pub use actor::*;
pub use api::*;
pub use archive::*;
pub use order::*;
pub use partition::*;
pub use product::*;
pub use registry::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
