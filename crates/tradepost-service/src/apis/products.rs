//! Inventory endpoints.

use axum::extract::{Path, State};
use axum::response::Json;
use tradepost_types::{AdjustStockRequest, ApiError, StockLevels};

use crate::apis::to_api_error;
use crate::server::AppState;

/// Handles POST /api/products/{id}/stock requests.
///
/// Adjusts one size bucket by a signed delta and reports the new bucket
/// and total levels. Deductions below zero are rejected by the ledger.
pub async fn adjust_stock(
	State(state): State<AppState>,
	Path(id): Path<String>,
	Json(request): Json<AdjustStockRequest>,
) -> Result<Json<StockLevels>, ApiError> {
	let levels = state
		.engine
		.ledger()
		.adjust_stock(&id, request.size, request.delta)
		.await
		.map_err(to_api_error)?;
	Ok(Json(levels))
}
