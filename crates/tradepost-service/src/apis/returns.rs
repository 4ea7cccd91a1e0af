//! Return request endpoints.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Json;
use tradepost_types::{ApiError, FileReturnRequest, ResolveReturnRequest, ReturnRequest};

use crate::server::{actor_from_headers, AppState};

/// Handles POST /api/orders/{id}/return requests.
///
/// Files a return against a completed order. Omitting the items means
/// the whole order is being returned.
pub async fn file_return(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(request): Json<FileReturnRequest>,
) -> Result<Json<ReturnRequest>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let filed = state
		.engine
		.returns()
		.file(&id, request.items, request.reason, &actor)
		.await?;
	Ok(Json(filed))
}

/// Handles POST /api/returns/{id}/resolve requests.
pub async fn resolve_return(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(request): Json<ResolveReturnRequest>,
) -> Result<Json<ReturnRequest>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let resolved = state
		.engine
		.returns()
		.resolve(&id, request.decision, &actor)
		.await?;
	Ok(Json(resolved))
}

/// Handles GET /api/returns requests.
pub async fn list_returns(
	State(state): State<AppState>,
) -> Result<Json<Vec<ReturnRequest>>, ApiError> {
	let requests = state.engine.returns().list().await?;
	Ok(Json(requests))
}
