use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{delivery, driver, return_settlement, truck},
    errors::ServiceError,
    services::{
        deliveries::{
            AssignDeliveryRequest, BulkAssignRequest, BulkAssignmentOutcome, DeliveryListFilter,
            UpdateDeliveryStatusRequest,
        },
        directory::{CreateDriverRequest, CreateTruckRequest},
        returns::{RecordReturnRequest, ReturnOutcome},
    },
    ApiResponse, ApiResult, AppState,
};

// ---- fleet ----

pub async fn list_trucks(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<truck::Model>> {
    let trucks = state.services.directory.list_trucks().await?;
    Ok(Json(ApiResponse::success(trucks)))
}

pub async fn create_truck(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateTruckRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.services.directory.create_truck(request).await?;
    state
        .services
        .audit
        .record(user.id, "trucks", created.id, "CREATE", Some(created.plate.clone()))
        .await;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn list_drivers(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<driver::Model>> {
    let drivers = state.services.directory.list_drivers().await?;
    Ok(Json(ApiResponse::success(drivers)))
}

pub async fn create_driver(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateDriverRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.services.directory.create_driver(request).await?;
    state
        .services
        .audit
        .record(user.id, "drivers", created.id, "CREATE", Some(created.name.clone()))
        .await;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

// ---- deliveries ----

/// Dispatch one order on a truck.
#[utoipa::path(
    post,
    path = "/api/v1/deliveries",
    request_body = AssignDeliveryRequest,
    responses(
        (status = 201, description = "Order dispatched"),
        (status = 409, description = "Order already has an active delivery")
    ),
    tag = "logistics"
)]
pub async fn assign_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AssignDeliveryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let assigned = state.services.deliveries.assign(&user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(assigned))))
}

/// Dispatch a batch of orders; partial success is reported, not rolled back.
#[utoipa::path(
    post,
    path = "/api/v1/deliveries/bulk",
    request_body = BulkAssignRequest,
    responses((status = 200, description = "Assigned/skipped counts", body = ApiResponse<BulkAssignmentOutcome>)),
    tag = "logistics"
)]
pub async fn assign_bulk(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<BulkAssignRequest>,
) -> ApiResult<BulkAssignmentOutcome> {
    let outcome = state.services.deliveries.assign_bulk(&user, request).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn list_deliveries(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<DeliveryListFilter>,
) -> ApiResult<Vec<delivery::Model>> {
    let deliveries = state.services.deliveries.list_deliveries(filter).await?;
    Ok(Json(ApiResponse::success(deliveries)))
}

pub async fn get_delivery(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<delivery::Model> {
    let found = state.services.deliveries.get_delivery(id).await?;
    Ok(Json(ApiResponse::success(found)))
}

/// Driver-side delivery status update, optionally with an incident.
pub async fn update_delivery_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDeliveryStatusRequest>,
) -> ApiResult<delivery::Model> {
    let updated = state
        .services
        .deliveries
        .update_status(&user, id, request)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

// ---- returns ----

/// Return an order's goods and reconcile the driver's cash in one call.
#[utoipa::path(
    post,
    path = "/api/v1/returns",
    request_body = RecordReturnRequest,
    responses(
        (status = 201, description = "Goods credited and cash settled"),
        (status = 409, description = "Cash mismatch, with expected vs received")
    ),
    tag = "logistics"
)]
pub async fn record_return(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RecordReturnRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.returns.record_return(&user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct SettlementFilter {
    pub truck_id: Option<Uuid>,
}

pub async fn list_settlements(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<SettlementFilter>,
) -> ApiResult<Vec<return_settlement::Model>> {
    let settlements = state.services.returns.list_settlements(filter.truck_id).await?;
    Ok(Json(ApiResponse::success(settlements)))
}
