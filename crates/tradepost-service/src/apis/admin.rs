//! Administration endpoints.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use tradepost_core::SweepReport;
use tradepost_types::ApiError;

use crate::server::{actor_from_headers, AppState};

/// Handles POST /api/admin/sweep requests. Admin only.
///
/// Triggers a reconciliation sweep on demand and reports what it
/// resolved. The same sweep also runs automatically at startup.
pub async fn run_sweep(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<SweepReport>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	if !actor.is_admin() {
		return Err(ApiError::Forbidden {
			error_type: "FORBIDDEN".to_string(),
			message: format!("Role '{}' may not trigger a reconciliation sweep", actor.role),
		});
	}
	let report = state.engine.run_sweep().await?;
	Ok(Json(report))
}
