//! Activity log endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::Deserialize;
use tradepost_types::{ActivityLog, ApiError};

use crate::apis::to_api_error;
use crate::server::{actor_from_headers, AppState};

/// Query parameters for listing activity logs.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
	/// Restrict to entries recorded by this actor email.
	pub actor: Option<String>,
}

/// Handles GET /api/logs requests.
pub async fn list_logs(
	State(state): State<AppState>,
	Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<ActivityLog>>, ApiError> {
	let logs = match query.actor {
		Some(email) => state.engine.audit().list_by_actor(&email).await,
		None => state.engine.audit().list().await,
	}
	.map_err(to_api_error)?;
	Ok(Json(logs))
}

/// Handles DELETE /api/logs/{id} requests. Admin only.
pub async fn delete_log(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
	let actor = actor_from_headers(&headers)?;
	state
		.engine
		.audit()
		.delete(&id, &actor)
		.await
		.map_err(to_api_error)?;
	Ok(StatusCode::NO_CONTENT)
}

/// Handles DELETE /api/logs requests, deleting the entire trail. Admin
/// only.
pub async fn purge_logs(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let deleted = state
		.engine
		.audit()
		.purge(&actor)
		.await
		.map_err(to_api_error)?;
	Ok(Json(serde_json::json!({ "deleted": deleted })))
}
