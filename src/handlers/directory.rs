use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{customer, price_type, product, warehouse},
    errors::ServiceError,
    services::directory::{
        CreateCustomerRequest, CreateProductRequest, CreateWarehouseRequest,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePriceTypeRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetProductPriceRequest {
    pub price_type_id: Uuid,
    pub price: Decimal,
}

// ---- customers ----

pub async fn list_customers(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<customer::Model>> {
    let customers = state.services.directory.list_customers().await?;
    Ok(Json(ApiResponse::success(customers)))
}

pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.services.directory.create_customer(user.id, request).await?;
    state
        .services
        .audit
        .record(user.id, "customers", created.id, "CREATE", Some(created.full_name.clone()))
        .await;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn get_customer(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<customer::Model> {
    let found = state.services.directory.get_customer(id).await?;
    Ok(Json(ApiResponse::success(found)))
}

// ---- products ----

pub async fn list_products(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<product::Model>> {
    let products = state.services.directory.list_products().await?;
    Ok(Json(ApiResponse::success(products)))
}

pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.services.directory.create_product(request).await?;
    state
        .services
        .audit
        .record(user.id, "products", created.id, "CREATE", Some(created.name.clone()))
        .await;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// Soft delete: products referenced by orders are deactivated, never removed.
pub async fn deactivate_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.services.directory.deactivate_product(id).await?;
    state
        .services
        .audit
        .record(user.id, "products", id, "DEACTIVATE", None)
        .await;
    Ok(Json(ApiResponse::success(())))
}

/// Fix a product's price under a pricing tier.
pub async fn set_product_price(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<SetProductPriceRequest>,
) -> ApiResult<crate::entities::product_price::Model> {
    let saved = state
        .services
        .directory
        .set_product_price(id, request.price_type_id, request.price)
        .await?;
    state
        .services
        .audit
        .record(user.id, "product_prices", saved.id, "SET", None)
        .await;
    Ok(Json(ApiResponse::success(saved)))
}

// ---- warehouses ----

pub async fn list_warehouses(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<warehouse::Model>> {
    let warehouses = state.services.directory.list_warehouses().await?;
    Ok(Json(ApiResponse::success(warehouses)))
}

pub async fn create_warehouse(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateWarehouseRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.services.directory.create_warehouse(request).await?;
    state
        .services
        .audit
        .record(user.id, "warehouses", created.id, "CREATE", Some(created.name.clone()))
        .await;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

// ---- price types ----

pub async fn list_price_types(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<price_type::Model>> {
    let tiers = state.services.directory.list_price_types().await?;
    Ok(Json(ApiResponse::success(tiers)))
}

pub async fn create_price_type(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreatePriceTypeRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.services.directory.create_price_type(request.name).await?;
    state
        .services
        .audit
        .record(user.id, "price_types", created.id, "CREATE", Some(created.name.clone()))
        .await;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}
