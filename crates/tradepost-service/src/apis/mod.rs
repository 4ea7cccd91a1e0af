//! Console API endpoint implementations.
//!
//! Each module implements the endpoints for one slice of the surface:
//! order lifecycle, returns, inventory, archival and restoration, the
//! activity log, and administration. Handlers resolve the acting user
//! from headers, call into the engine, and map engine errors onto the
//! API error body.

pub mod admin;
pub mod archives;
pub mod logs;
pub mod orders;
pub mod products;
pub mod returns;

use tradepost_core::EngineError;
use tradepost_types::ApiError;

/// Maps a service error through the engine taxonomy onto the API error
/// body.
pub(crate) fn to_api_error(err: impl Into<EngineError>) -> ApiError {
	ApiError::from(err.into())
}
