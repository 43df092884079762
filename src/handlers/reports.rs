use axum::{
    extract::{Query, State},
    response::Json,
};

use crate::{
    auth::AuthUser,
    services::reports::{
        DailySales, FleetPerformanceRow, SalesReportFilter, StatusCount, WarehouseStockRow,
    },
    ApiResponse, ApiResult, AppState,
};

/// Sales totals per day, filtered by date range and status.
#[utoipa::path(
    get,
    path = "/api/v1/reports/sales",
    params(SalesReportFilter),
    responses((status = 200, description = "Daily sales totals")),
    tag = "reports"
)]
pub async fn sales(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(filter): Query<SalesReportFilter>,
) -> ApiResult<Vec<DailySales>> {
    let rows = state.services.reports.sales_by_day(filter).await?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn orders_by_status(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<StatusCount>> {
    let rows = state.services.reports.orders_by_status().await?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn deliveries_by_status(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<StatusCount>> {
    let rows = state.services.reports.deliveries_by_status().await?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn stock_by_warehouse(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<WarehouseStockRow>> {
    let rows = state.services.reports.stock_by_warehouse().await?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn fleet_performance(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Vec<FleetPerformanceRow>> {
    let rows = state.services.reports.fleet_performance().await?;
    Ok(Json(ApiResponse::success(rows)))
}
