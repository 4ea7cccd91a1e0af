//! Core engine for the tradepost system.
//!
//! This crate provides the orchestration logic tying the services
//! together: the order lifecycle state machine and its handlers, the
//! archival and restoration engines, the reconciliation sweep, and the
//! retry policy applied to storage commits. The [`Engine`] owns one
//! instance of each service and is the single entry point the API
//! layer talks to.

pub mod engine;
pub mod handlers;
pub mod recovery;
pub mod retry;
pub mod state;

pub use engine::{Engine, EngineError};
pub use handlers::{ArchivalEngine, OrderHandler, RestorationEngine, ReturnHandler};
pub use recovery::{ReconciliationSweep, SweepReport};
pub use retry::RetryPolicy;
pub use state::{StateError, TransitionGate};
