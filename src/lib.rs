//! AquaFlow API Library
//!
//! Core of a bottled-water distribution backend: multi-warehouse inventory
//! ledger, order admission and fulfillment, delivery dispatch and driver
//! cash reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, patch, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{IntoParams, ToSchema};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: services::AppServices,
    pub auth: auth::AuthService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = services::AppServices::new(db.clone(), event_sender.clone());
        let auth = auth::AuthService::new(
            db.clone(),
            config.jwt_secret.clone(),
            config.jwt_expiration,
        );

        Self {
            db,
            config,
            event_sender,
            services,
            auth,
        }
    }
}

/// Common query parameters for list endpoints.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// Standard success envelope.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Standard API result type for JSON responses.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// All `/api/v1` routes.
pub fn api_v1_routes() -> Router<AppState> {
    let auth_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/me", get(handlers::auth::me));

    let order_routes = Router::new()
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route(
            "/orders/:id",
            get(handlers::orders::get_order).put(handlers::orders::update_order),
        )
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route("/orders/:id/reopen", post(handlers::orders::reopen_order))
        .route("/orders/:id/history", get(handlers::orders::get_order_history))
        .route("/orders/:id/movements", get(handlers::inventory::order_movements));

    let inventory_routes = Router::new()
        .route(
            "/inventory/movements",
            post(handlers::inventory::record_movement),
        )
        .route("/inventory/low-stock", get(handlers::inventory::low_stock))
        .route(
            "/inventory/availability/:product_id",
            get(handlers::inventory::product_availability),
        )
        .route("/warehouses/:id/stock", get(handlers::inventory::warehouse_stock));

    let directory_routes = Router::new()
        .route(
            "/customers",
            get(handlers::directory::list_customers).post(handlers::directory::create_customer),
        )
        .route("/customers/:id", get(handlers::directory::get_customer))
        .route(
            "/products",
            get(handlers::directory::list_products).post(handlers::directory::create_product),
        )
        .route(
            "/products/:id",
            axum::routing::delete(handlers::directory::deactivate_product),
        )
        .route(
            "/products/:id/prices",
            put(handlers::directory::set_product_price),
        )
        .route(
            "/warehouses",
            get(handlers::directory::list_warehouses).post(handlers::directory::create_warehouse),
        )
        .route(
            "/price-types",
            get(handlers::directory::list_price_types).post(handlers::directory::create_price_type),
        );

    let logistics_routes = Router::new()
        .route(
            "/logistics/trucks",
            get(handlers::logistics::list_trucks).post(handlers::logistics::create_truck),
        )
        .route(
            "/logistics/drivers",
            get(handlers::logistics::list_drivers).post(handlers::logistics::create_driver),
        )
        .route(
            "/deliveries",
            get(handlers::logistics::list_deliveries).post(handlers::logistics::assign_delivery),
        )
        .route("/deliveries/bulk", post(handlers::logistics::assign_bulk))
        .route("/deliveries/:id", get(handlers::logistics::get_delivery))
        .route(
            "/deliveries/:id/status",
            patch(handlers::logistics::update_delivery_status),
        )
        .route("/returns", post(handlers::logistics::record_return))
        .route(
            "/returns/settlements",
            get(handlers::logistics::list_settlements),
        );

    let report_routes = Router::new()
        .route("/reports/sales", get(handlers::reports::sales))
        .route(
            "/reports/orders-by-status",
            get(handlers::reports::orders_by_status),
        )
        .route(
            "/reports/deliveries-by-status",
            get(handlers::reports::deliveries_by_status),
        )
        .route(
            "/reports/stock-by-warehouse",
            get(handlers::reports::stock_by_warehouse),
        )
        .route(
            "/reports/performance",
            get(handlers::reports::fleet_performance),
        );

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(auth_routes)
        .merge(order_routes)
        .merge(inventory_routes)
        .merge(directory_routes)
        .merge(logistics_routes)
        .merge(report_routes)
}

/// Builds the full application router with middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_routes())
        .layer(axum::middleware::from_fn(crate::tracing::request_id_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn api_status() -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "service": "aquaflow-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn pagination_math() {
        let page = PaginatedResponse::<u32>::new(vec![], 41, 1, 20);
        assert_eq!(page.total_pages, 3);

        let page = PaginatedResponse::<u32>::new(vec![], 40, 1, 20);
        assert_eq!(page.total_pages, 2);

        let page = PaginatedResponse::<u32>::new(vec![], 0, 1, 20);
        assert_eq!(page.total_pages, 0);
    }
}
