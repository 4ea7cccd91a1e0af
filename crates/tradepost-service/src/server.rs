//! HTTP server for the tradepost console API.
//!
//! This module builds the axum router over the engine, resolves the
//! acting console user from request headers, and starts the server with
//! the CORS policy from configuration.

use axum::{
	extract::DefaultBodyLimit,
	http::{HeaderMap, HeaderName, HeaderValue, Method},
	routing::{delete, get, post},
	Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tradepost_config::{ApiConfig, CorsConfig};
use tradepost_core::Engine;
use tradepost_types::{Actor, ApiError, Role};

use crate::apis;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the engine for processing requests.
	pub engine: Arc<Engine>,
}

/// Resolves the acting console user from the request headers.
///
/// Mutating endpoints attribute their activity log entries to this
/// identity, so both headers are required and the role must be known.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
	let email = headers
		.get("x-actor-email")
		.and_then(|value| value.to_str().ok())
		.ok_or_else(|| validation_error("Missing or unreadable X-Actor-Email header"))?;
	let role = headers
		.get("x-actor-role")
		.and_then(|value| value.to_str().ok())
		.ok_or_else(|| validation_error("Missing or unreadable X-Actor-Role header"))?;
	let role = role
		.parse::<Role>()
		.map_err(|_| validation_error(&format!("Unknown role '{}'", role)))?;
	Ok(Actor::new(email, role))
}

fn validation_error(message: &str) -> ApiError {
	ApiError::BadRequest {
		error_type: "VALIDATION".to_string(),
		message: message.to_string(),
		details: None,
	}
}

/// Builds the API router over the given state.
pub fn router(state: AppState) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders/pack-bulk", post(apis::orders::pack_bulk))
				.route("/orders/{id}/pack", post(apis::orders::pack))
				.route("/orders/{id}/ship", post(apis::orders::ship))
				.route("/orders/{id}/receive", post(apis::orders::receive))
				.route("/orders/{id}/cancel", post(apis::orders::cancel))
				.route("/orders/{id}/return", post(apis::returns::file_return))
				.route(
					"/orders/{id}/to-receive",
					delete(apis::orders::remove_to_receive),
				)
				.route("/orders/{id}", get(apis::orders::get_order))
				.route("/returns", get(apis::returns::list_returns))
				.route("/returns/{id}/resolve", post(apis::returns::resolve_return))
				.route("/products/{id}/stock", post(apis::products::adjust_stock))
				.route("/users/{id}/archive", post(apis::archives::archive_user))
				.route("/users/{id}/restore", post(apis::archives::restore_user))
				.route(
					"/users/{id}/restore-all",
					post(apis::archives::restore_user_all),
				)
				.route("/archives/{kind}/{id}", post(apis::archives::archive_entity))
				.route("/restores/{id}", post(apis::archives::restore_entity))
				.route("/restores/{id}/status", get(apis::archives::restore_status))
				.route(
					"/logs",
					get(apis::logs::list_logs).delete(apis::logs::purge_logs),
				)
				.route("/logs/{id}", delete(apis::logs::delete_log))
				.route("/admin/sweep", post(apis::admin::run_sweep)),
		)
		.with_state(state)
}

/// Builds the CORS layer from configuration, permissive when absent.
fn cors_layer(config: Option<&CorsConfig>) -> Result<CorsLayer, Box<dyn std::error::Error>> {
	let cors = match config {
		Some(cors) => cors,
		None => return Ok(CorsLayer::permissive()),
	};
	let origins = cors
		.allowed_origins
		.iter()
		.map(|origin| origin.parse::<HeaderValue>())
		.collect::<Result<Vec<_>, _>>()?;
	let methods = cors
		.allowed_methods
		.iter()
		.map(|method| method.parse::<Method>())
		.collect::<Result<Vec<_>, _>>()?;
	let headers = cors
		.allowed_headers
		.iter()
		.map(|header| header.parse::<HeaderName>())
		.collect::<Result<Vec<_>, _>>()?;
	Ok(CorsLayer::new()
		.allow_origin(origins)
		.allow_methods(methods)
		.allow_headers(headers))
}

/// Starts the HTTP server for the console API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<Engine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let cors = cors_layer(api_config.cors.as_ref())?;
	let app = router(AppState { engine }).layer(
		ServiceBuilder::new()
			.layer(TraceLayer::new_for_http())
			.layer(cors)
			.layer(DefaultBodyLimit::max(api_config.max_request_size)),
	);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Tradepost API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::{Request, StatusCode};
	use serde_json::{json, Value};
	use tower::ServiceExt;
	use tradepost_config::Config;
	use tradepost_types::Partition;

	const TEST_CONFIG: &str = r#"
		[engine]
		id = "service-test"

		[storage]
		primary = "memory"

		[storage.implementations.memory]
	"#;

	fn test_engine() -> Arc<Engine> {
		let config: Config = TEST_CONFIG.parse().unwrap();
		Arc::new(Engine::from_config(config).unwrap())
	}

	fn placed_order(id: &str) -> Value {
		json!({
			"orderId": id,
			"userId": "U1",
			"shippingAddress": "12 Pier Lane",
			"items": [{
				"productId": "P1",
				"name": "Linen shirt",
				"size": "S",
				"quantity": 2,
				"unitPrice": "24.99"
			}],
			"total": "49.98",
			"status": "Placed",
			"createdAt": "2026-08-01T10:00:00Z"
		})
	}

	fn admin_request(method: &str, uri: &str, body: Option<&Value>) -> Request<Body> {
		let builder = Request::builder()
			.method(method)
			.uri(uri)
			.header("X-Actor-Email", "ops@tradepost.live")
			.header("X-Actor-Role", "admin");
		match body {
			Some(body) => builder
				.header("content-type", "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
			None => builder.body(Body::empty()).unwrap(),
		}
	}

	async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let body = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, body)
	}

	#[tokio::test]
	async fn test_mutations_require_actor_headers() {
		let app = router(AppState {
			engine: test_engine(),
		});
		let request = Request::builder()
			.method("POST")
			.uri("/api/orders/ORD-1/pack")
			.body(Body::empty())
			.unwrap();
		let (status, body) = send(&app, request).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION");
	}

	#[tokio::test]
	async fn test_unknown_role_is_rejected() {
		let app = router(AppState {
			engine: test_engine(),
		});
		let request = Request::builder()
			.method("POST")
			.uri("/api/orders/ORD-1/pack")
			.header("X-Actor-Email", "ops@tradepost.live")
			.header("X-Actor-Role", "intern")
			.body(Body::empty())
			.unwrap();
		let (status, body) = send(&app, request).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION");
	}

	#[tokio::test]
	async fn test_pack_moves_order_and_reports_new_state() {
		let engine = test_engine();
		engine
			.storage()
			.store(Partition::Orders, "ORD-1", &placed_order("ORD-1"))
			.await
			.unwrap();
		let app = router(AppState {
			engine: engine.clone(),
		});

		let (status, body) = send(&app, admin_request("POST", "/api/orders/ORD-1/pack", None)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "To Ship");
		assert!(body["packedAt"].is_string());
		assert!(body["toshipId"].as_str().unwrap().starts_with("TS-"));

		let (status, body) = send(&app, admin_request("GET", "/api/orders/ORD-1", None)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["partition"], "to_ship");
		assert_eq!(body["order"]["orderId"], "ORD-1");
	}

	#[tokio::test]
	async fn test_missing_order_maps_to_not_found() {
		let app = router(AppState {
			engine: test_engine(),
		});
		let (status, body) =
			send(&app, admin_request("POST", "/api/orders/ORD-404/pack", None)).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "NOT_FOUND");
	}

	#[tokio::test]
	async fn test_bulk_pack_with_failures_is_multi_status() {
		let engine = test_engine();
		engine
			.storage()
			.store(Partition::Orders, "ORD-1", &placed_order("ORD-1"))
			.await
			.unwrap();
		let app = router(AppState {
			engine: engine.clone(),
		});

		let body = json!({"orderIds": ["ORD-1", "ORD-404"]});
		let (status, report) = send(
			&app,
			admin_request("POST", "/api/orders/pack-bulk", Some(&body)),
		)
		.await;
		assert_eq!(status, StatusCode::MULTI_STATUS);
		assert_eq!(report["outcomes"].as_array().unwrap().len(), 2);
		assert_eq!(report["outcomes"][0]["success"], true);
		assert_eq!(report["outcomes"][1]["success"], false);
	}

	#[tokio::test]
	async fn test_bulk_pack_of_nothing_is_empty_ok() {
		let app = router(AppState {
			engine: test_engine(),
		});
		let body = json!({"orderIds": []});
		let (status, report) = send(
			&app,
			admin_request("POST", "/api/orders/pack-bulk", Some(&body)),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(report["outcomes"].as_array().unwrap().len(), 0);
	}

	#[tokio::test]
	async fn test_unknown_archive_kind_is_rejected() {
		let app = router(AppState {
			engine: test_engine(),
		});
		let (status, body) = send(
			&app,
			admin_request("POST", "/api/archives/warehouse/X1", None),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION");
	}

	#[tokio::test]
	async fn test_restore_status_for_unseen_user_has_no_state() {
		let app = router(AppState {
			engine: test_engine(),
		});
		let (status, body) = send(&app, admin_request("GET", "/api/restores/U9/status", None)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["id"], "U9");
		assert!(body.get("state").is_none());
	}

	#[tokio::test]
	async fn test_cors_layer_rejects_malformed_origin() {
		let cors = CorsConfig {
			allowed_origins: vec!["not a header value\u{0}".to_string()],
			allowed_headers: vec![],
			allowed_methods: vec![],
		};
		assert!(cors_layer(Some(&cors)).is_err());
	}
}
