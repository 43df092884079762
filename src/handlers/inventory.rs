use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{inventory_movement, stock_level},
    services::inventory::{AdjustStockRequest, MovementOutcome},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailabilityResponse {
    pub product_id: Uuid,
    pub available: i64,
}

/// Record a manual stock movement (receipt or correction).
#[utoipa::path(
    post,
    path = "/api/v1/inventory/movements",
    request_body = AdjustStockRequest,
    responses(
        (status = 201, description = "Movement appended", body = ApiResponse<MovementOutcome>),
        (status = 400, description = "Unknown movement kind or zero quantity")
    ),
    tag = "inventory"
)]
pub async fn record_movement(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AdjustStockRequest>,
) -> Result<impl IntoResponse, crate::errors::ServiceError> {
    let outcome = state.services.inventory.adjust_stock(&user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

/// Stock rows for one warehouse.
#[utoipa::path(
    get,
    path = "/api/v1/warehouses/{id}/stock",
    params(("id" = Uuid, Path, description = "Warehouse id")),
    responses((status = 200, description = "Stock levels for the warehouse")),
    tag = "inventory"
)]
pub async fn warehouse_stock(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<stock_level::Model>> {
    state.services.directory.get_warehouse(id).await?;
    let levels = state.services.inventory.stock_by_warehouse(id).await?;
    Ok(Json(ApiResponse::success(levels)))
}

/// Aggregate availability of one product across warehouses.
pub async fn product_availability(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> ApiResult<AvailabilityResponse> {
    state.services.directory.get_product(product_id).await?;
    let available = state.services.inventory.availability(product_id).await?;
    Ok(Json(ApiResponse::success(AvailabilityResponse {
        product_id,
        available,
    })))
}

/// Stock rows at or below their minimum threshold.
pub async fn low_stock(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<stock_level::Model>> {
    let levels = state.services.inventory.low_stock().await?;
    Ok(Json(ApiResponse::success(levels)))
}

/// Ledger entries referencing one order.
pub async fn order_movements(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Vec<inventory_movement::Model>> {
    let movements = state.services.inventory.movements_for_order(order_id).await?;
    Ok(Json(ApiResponse::success(movements)))
}
