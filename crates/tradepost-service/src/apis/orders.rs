//! Order lifecycle endpoints.
//!
//! These endpoints move orders through the fulfillment stages. Every
//! transition is attributed to the acting console user and committed by
//! the engine as one guarded write batch.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use tracing::warn;
use tradepost_types::{
	ApiError, CancelOrderResponse, FindOrderResponse, Order, PackBulkRequest, RestockResponse,
	ShipOrderRequest,
};

use crate::server::{actor_from_headers, AppState};

/// Handles POST /api/orders/{id}/pack requests.
pub async fn pack(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<Order>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let order = state.engine.orders().pack(&id, &actor).await?;
	Ok(Json(order))
}

/// Handles POST /api/orders/pack-bulk requests.
///
/// Every requested order gets its own outcome; any failure turns the
/// response into 207 Multi-Status with the full report.
pub async fn pack_bulk(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<PackBulkRequest>,
) -> Result<Response, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let report = state
		.engine
		.orders()
		.pack_bulk(&request.order_ids, &actor)
		.await?;
	let status = if report.has_failures() {
		warn!(failed = report.failed(), "bulk pack finished with failures");
		StatusCode::MULTI_STATUS
	} else {
		StatusCode::OK
	};
	Ok((status, Json(report)).into_response())
}

/// Handles POST /api/orders/{id}/ship requests.
pub async fn ship(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(request): Json<ShipOrderRequest>,
) -> Result<Json<Order>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let order = state
		.engine
		.orders()
		.ship(&id, &request.item, &actor)
		.await?;
	Ok(Json(order))
}

/// Handles POST /api/orders/{id}/receive requests.
pub async fn receive(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<Order>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let order = state.engine.orders().receive(&id, &actor).await?;
	Ok(Json(order))
}

/// Handles POST /api/orders/{id}/cancel requests.
pub async fn cancel(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<CancelOrderResponse>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let (order, summary) = state.engine.orders().cancel(&id, &actor).await?;
	Ok(Json(CancelOrderResponse {
		order,
		restock: RestockResponse {
			restored_units: summary.restored_units,
			skipped_products: summary.skipped_products,
		},
	}))
}

/// Handles DELETE /api/orders/{id}/to-receive requests.
pub async fn remove_to_receive(
	State(state): State<AppState>,
	Path(id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<RestockResponse>, ApiError> {
	let actor = actor_from_headers(&headers)?;
	let summary = state.engine.orders().remove_to_receive(&id, &actor).await?;
	Ok(Json(RestockResponse {
		restored_units: summary.restored_units,
		skipped_products: summary.skipped_products,
	}))
}

/// Handles GET /api/orders/{id} requests.
///
/// Reports the lifecycle partition currently holding the order along
/// with the order itself.
pub async fn get_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<FindOrderResponse>, ApiError> {
	let (partition, order) = state.engine.orders().find_order(&id).await?;
	Ok(Json(FindOrderResponse { partition, order }))
}
