//! Archival and restoration endpoints.
//!
//! Archival moves documents into their archive partitions and is always
//! attributed to the acting user. Restoration is driven purely by the
//! archive records and carries no actor.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Json;
use tradepost_types::{
	ApiError, ArchiveOutcome, EntityKind, RestoreReport, RestoreStatusResponse,
};

use crate::server::{actor_from_headers, AppState};

/// Handles POST /api/archives/{kind}/{id} requests.
pub async fn archive_entity(
	State(state): State<AppState>,
	Path((kind, id)): Path<(String, String)>,
	headers: HeaderMap,
) -> Result<Json<ArchiveOutcome>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let kind = kind.parse::<EntityKind>().map_err(|_| ApiError::BadRequest {
		error_type: "VALIDATION".to_string(),
		message: format!("Unknown entity kind '{}'", kind),
		details: None,
	})?;
	let outcome = state
		.engine
		.archival()
		.archive_entity(kind, &id, &actor)
		.await?;
	Ok(Json(outcome))
}

/// Handles POST /api/users/{id}/archive requests.
pub async fn archive_user(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<ArchiveOutcome>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let outcome = state.engine.archival().archive_user(&id, &actor).await?;
	Ok(Json(outcome))
}

/// Handles POST /api/restores/{id} requests.
///
/// Restores a single archived document and returns it as stored, with
/// no archive metadata attached.
pub async fn restore_entity(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let document = state.engine.restoration().restore_entity(&id).await?;
	Ok(Json(document))
}

/// Handles POST /api/users/{id}/restore requests.
pub async fn restore_user(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<RestoreReport>, ApiError> {
	let report = state.engine.restoration().restore_user_only(&id).await?;
	Ok(Json(report))
}

/// Handles POST /api/users/{id}/restore-all requests.
pub async fn restore_user_all(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<RestoreReport>, ApiError> {
	let report = state
		.engine
		.restoration()
		.restore_user_with_all_data(&id)
		.await?;
	Ok(Json(report))
}

/// Handles GET /api/restores/{id}/status requests.
pub async fn restore_status(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Json<RestoreStatusResponse> {
	let attempt = state.engine.restoration().restore_state(&id);
	Json(RestoreStatusResponse { id, state: attempt })
}
