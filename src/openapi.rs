//! OpenAPI document and swagger mount.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{errors, handlers, services, AppState};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AquaFlow API",
        description = "Inventory ledger, order fulfillment, delivery dispatch and driver cash reconciliation for a bottled-water distributor"
    ),
    paths(
        handlers::auth::login,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::create_order,
        handlers::inventory::record_movement,
        handlers::inventory::warehouse_stock,
        handlers::logistics::assign_delivery,
        handlers::logistics::assign_bulk,
        handlers::logistics::record_return,
        handlers::reports::sales,
    ),
    components(schemas(
        errors::ErrorResponse,
        errors::StockShortage,
        errors::CashDiscrepancy,
        services::orders::CreateOrderRequest,
        services::orders::OrderLineRequest,
        services::inventory::AdjustStockRequest,
        services::inventory::MovementOutcome,
        services::deliveries::AssignDeliveryRequest,
        services::deliveries::BulkAssignRequest,
        services::deliveries::BulkAssignmentOutcome,
        services::returns::RecordReturnRequest,
        services::returns::ExpenseBreakdown,
    )),
    tags(
        (name = "auth", description = "Authentication"),
        (name = "orders", description = "Order admission and lifecycle"),
        (name = "inventory", description = "Stock ledger"),
        (name = "logistics", description = "Dispatch, deliveries and returns"),
        (name = "reports", description = "Advisory reports"),
    )
)]
pub struct ApiDoc;

/// Swagger UI at /docs, serving the generated document.
pub fn swagger_routes() -> Router<AppState> {
    SwaggerUi::new("/docs")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
