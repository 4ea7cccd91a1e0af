//! API types for the tradepost HTTP surface.
//!
//! This module defines the request and response types for the console
//! endpoints, plus the structured error type the service maps onto HTTP
//! status codes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{LineItem, Order, Partition, RestoreState, Size};

/// Request body for bulk packing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackBulkRequest {
	/// Orders to pack, each processed independently.
	pub order_ids: Vec<String>,
}

/// Request body for shipping an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipOrderRequest {
	/// The line item being dispatched. Must match one of the order's
	/// items.
	pub item: LineItem,
}

/// Request body for filing a return against a completed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReturnRequest {
	/// Customer-supplied reason for the return.
	pub reason: String,
	/// Items being returned. Omitted means the whole order.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub items: Option<Vec<LineItem>>,
}

/// Decision on a return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnDecision {
	Approve,
	Disapprove,
}

/// Request body for adjusting one size bucket of a product's stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStockRequest {
	/// Size bucket to adjust.
	pub size: Size,
	/// Signed unit delta. Negative values deduct stock.
	pub delta: i64,
}

/// Request body for resolving a return request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveReturnRequest {
	pub decision: ReturnDecision,
}

/// Outcome of one item within a bulk operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemOutcome {
	/// Id of the item this outcome refers to.
	pub id: String,
	/// Whether the item was processed successfully.
	pub success: bool,
	/// Failure description when `success` is false.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// Per-item report for bulk operations.
///
/// Bulk operations never collapse into a single pass/fail: every id gets
/// its own outcome, and an empty input yields an empty report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
	pub outcomes: Vec<BulkItemOutcome>,
}

impl BulkReport {
	/// Records a successful item.
	pub fn push_ok(&mut self, id: impl Into<String>) {
		self.outcomes.push(BulkItemOutcome {
			id: id.into(),
			success: true,
			error: None,
		});
	}

	/// Records a failed item with its failure description.
	pub fn push_failed(&mut self, id: impl Into<String>, error: impl Into<String>) {
		self.outcomes.push(BulkItemOutcome {
			id: id.into(),
			success: false,
			error: Some(error.into()),
		});
	}

	/// Number of successful items.
	pub fn succeeded(&self) -> usize {
		self.outcomes.iter().filter(|o| o.success).count()
	}

	/// Number of failed items.
	pub fn failed(&self) -> usize {
		self.outcomes.len() - self.succeeded()
	}

	/// True when at least one item failed.
	pub fn has_failures(&self) -> bool {
		self.outcomes.iter().any(|o| !o.success)
	}
}

/// Stock restored to the ledger by a cancellation, a removal or an
/// approved return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockResponse {
	/// Units added back across all restored line items.
	pub restored_units: u32,
	/// Products skipped because they no longer exist.
	pub skipped_products: Vec<String>,
}

/// Response body for order cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderResponse {
	pub order: Order,
	pub restock: RestockResponse,
}

/// Response body for order lookup across the lifecycle partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindOrderResponse {
	/// Partition currently holding the order.
	pub partition: Partition,
	pub order: Order,
}

/// Response body for restore-status polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatusResponse {
	pub id: String,
	/// State of the most recent restoration attempt. Absent when none
	/// was ever started.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub state: Option<RestoreState>,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum ApiError {
	/// Malformed request (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Actor's role does not permit the operation (403)
	Forbidden {
		error_type: String,
		message: String,
	},
	/// Referenced entity does not exist (404)
	NotFound {
		error_type: String,
		message: String,
	},
	/// State conflict such as an illegal transition or a concurrent
	/// restore (409)
	Conflict {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Business rule violation (422)
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Internal server error (500)
	InternalServerError {
		error_type: String,
		message: String,
	},
}

impl ApiError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			ApiError::BadRequest { .. } => 400,
			ApiError::Forbidden { .. } => 403,
			ApiError::NotFound { .. } => 404,
			ApiError::Conflict { .. } => 409,
			ApiError::UnprocessableEntity { .. } => 422,
			ApiError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			ApiError::BadRequest {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
			ApiError::Forbidden {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: None,
			},
			ApiError::NotFound {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: None,
			},
			ApiError::Conflict {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
			ApiError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
			ApiError::InternalServerError {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: None,
			},
		}
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApiError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			ApiError::Forbidden { message, .. } => write!(f, "Forbidden: {}", message),
			ApiError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			ApiError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			ApiError::UnprocessableEntity { message, .. } => {
				write!(f, "Unprocessable Entity: {}", message)
			},
			ApiError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for ApiError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ApiError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = match self.status_code() {
			400 => StatusCode::BAD_REQUEST,
			403 => StatusCode::FORBIDDEN,
			404 => StatusCode::NOT_FOUND,
			409 => StatusCode::CONFLICT,
			422 => StatusCode::UNPROCESSABLE_ENTITY,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};

		let error_response = self.to_error_response();
		(status, Json(error_response)).into_response()
	}
}
