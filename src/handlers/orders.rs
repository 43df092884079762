use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{order, order_status_history},
    services::orders::{
        CreateOrderRequest, OrderDetails, OrderListFilter, UpdateOrderRequest,
    },
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub note: Option<String>,
}

/// List orders with optional status/customer filters.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListQuery, OrderListFilter),
    responses((status = 200, description = "One page of orders")),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<ListQuery>,
    Query(filter): Query<OrderListFilter>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let (items, total) = state
        .services
        .orders
        .list_orders(filter, pagination.page, pagination.limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        pagination.page,
        pagination.limit,
    ))))
}

/// Fetch one order with its lines and status history.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with lines and history"),
        (status = 404, description = "Unknown order")
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetails> {
    let details = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Admit a new order.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order admitted in Pendiente"),
        (status = 422, description = "Insufficient stock, with shortage detail")
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, crate::errors::ServiceError> {
    let details = state.services.orders.create_order(&user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(details))))
}

/// Replace an order's lines and header fields.
pub async fn update_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> ApiResult<OrderDetails> {
    let details = state.services.orders.update_order(&user, id, request).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Cancel an order; no stock reversal happens.
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelOrderRequest>,
) -> ApiResult<order::Model> {
    let updated = state
        .services
        .fulfillment
        .cancel(id, request.note, &user)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Put a rescheduled order back into the pending pool.
pub async fn reopen_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<order::Model> {
    let updated = state.services.fulfillment.reopen(id, &user).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// The immutable status trail of an order.
pub async fn get_order_history(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<order_status_history::Model>> {
    let details = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(details.history)))
}
