//! Operation handlers.
//!
//! Each handler owns one slice of the operation surface: order
//! lifecycle transitions, return requests, archival, and restoration.
//! They share the storage service, the audit sink and the id minter,
//! and every multi-document effect they produce is committed as one
//! write batch.

pub mod archive;
pub mod orders;
pub mod restore;
pub mod returns;

pub use archive::ArchivalEngine;
pub use orders::OrderHandler;
pub use restore::RestorationEngine;
pub use returns::ReturnHandler;
