//! Delivery confirmation: ledger effects, idempotence, the stricter
//! per-warehouse check, and cancellation without stock reversal.

mod common;

use assert_matches::assert_matches;
use aquaflow_api::{
    entities::{enums::MovementKind, inventory_movement},
    errors::ServiceError,
    services::deliveries::AssignDeliveryRequest,
};
use common::TestContext;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

async fn out_movement_count(ctx: &TestContext, order_id: Uuid) -> u64 {
    inventory_movement::Entity::find()
        .filter(inventory_movement::Column::OrderId.eq(order_id))
        .filter(inventory_movement::Column::Kind.eq(MovementKind::Out.to_string()))
        .count(&*ctx.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn confirming_delivery_ships_from_the_richest_warehouse() {
    let ctx = TestContext::new().await;
    let poor = ctx.seed_warehouse("Sur", false).await;
    let rich = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    let truck = ctx.seed_truck("ABC-123").await;
    let driver = ctx.seed_driver("Mario Paz").await;
    ctx.put_stock(poor.id, product.id, 3).await;
    ctx.put_stock(rich.id, product.id, 8).await;

    let details = ctx.simple_order(customer.id, product.id, 5, dec!(25.00)).await;
    let delivery = ctx
        .services
        .deliveries
        .assign(
            &ctx.actor,
            AssignDeliveryRequest {
                order_id: details.order.id,
                truck_id: truck.id,
                driver_id: driver.id,
                scheduled_at: None,
            },
        )
        .await
        .unwrap();

    let updated = ctx
        .services
        .fulfillment
        .confirm_delivered(details.order.id, &ctx.actor)
        .await
        .unwrap();
    assert_eq!(updated.status, "Entregado");

    // The OUT movement drained the warehouse holding the most stock.
    assert_eq!(
        ctx.services.inventory.availability(product.id).await.unwrap(),
        6
    );
    let movements = ctx
        .services
        .inventory
        .movements_for_order(details.order.id)
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].warehouse_id, rich.id);
    assert_eq!(movements[0].quantity, -5);
    assert_eq!(movements[0].kind, "OUT");

    let refreshed = ctx
        .services
        .deliveries
        .get_delivery(delivery.id)
        .await
        .unwrap();
    assert_eq!(refreshed.status, "Entregado");
    assert!(refreshed.delivered_at.is_some());
}

#[tokio::test]
async fn confirming_twice_leaves_exactly_one_out_movement_per_line() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    let truck = ctx.seed_truck("ABC-123").await;
    let driver = ctx.seed_driver("Mario Paz").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let details = ctx.simple_order(customer.id, product.id, 4, dec!(25.00)).await;
    ctx.services
        .deliveries
        .assign(
            &ctx.actor,
            AssignDeliveryRequest {
                order_id: details.order.id,
                truck_id: truck.id,
                driver_id: driver.id,
                scheduled_at: None,
            },
        )
        .await
        .unwrap();

    ctx.services
        .fulfillment
        .confirm_delivered(details.order.id, &ctx.actor)
        .await
        .unwrap();
    // Second confirmation is a no-op success, not an error.
    ctx.services
        .fulfillment
        .confirm_delivered(details.order.id, &ctx.actor)
        .await
        .unwrap();

    assert_eq!(out_movement_count(&ctx, details.order.id).await, 1);
    assert_eq!(
        ctx.services.inventory.availability(product.id).await.unwrap(),
        6
    );
}

#[tokio::test]
async fn aggregate_stock_split_across_warehouses_fails_the_per_warehouse_check() {
    let ctx = TestContext::new().await;
    let a = ctx.seed_warehouse("Norte", false).await;
    let b = ctx.seed_warehouse("Sur", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    let truck = ctx.seed_truck("ABC-123").await;
    let driver = ctx.seed_driver("Mario Paz").await;
    // 6 + 5 = 11 in aggregate, but no single warehouse can cover 8.
    ctx.put_stock(a.id, product.id, 6).await;
    ctx.put_stock(b.id, product.id, 5).await;

    let details = ctx.simple_order(customer.id, product.id, 8, dec!(25.00)).await;
    ctx.services
        .deliveries
        .assign(
            &ctx.actor,
            AssignDeliveryRequest {
                order_id: details.order.id,
                truck_id: truck.id,
                driver_id: driver.id,
                scheduled_at: None,
            },
        )
        .await
        .unwrap();

    let err = ctx
        .services
        .fulfillment
        .confirm_delivered(details.order.id, &ctx.actor)
        .await
        .expect_err("no single source warehouse suffices");

    let shortages = assert_matches!(err, ServiceError::InsufficientStock(s) => s);
    assert_eq!(shortages[0].available, 6);
    assert_eq!(shortages[0].required, 8);

    // The failed transition wrote nothing.
    assert_eq!(out_movement_count(&ctx, details.order.id).await, 0);
    let order = ctx.services.orders.get_order(details.order.id).await.unwrap();
    assert_eq!(order.order.status, "Despachado");
    assert_eq!(
        ctx.services.inventory.availability(product.id).await.unwrap(),
        11
    );
}

#[tokio::test]
async fn confirming_a_pending_order_is_a_state_error() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let details = ctx.simple_order(customer.id, product.id, 2, dec!(25.00)).await;

    let err = ctx
        .services
        .fulfillment
        .confirm_delivered(details.order.id, &ctx.actor)
        .await
        .expect_err("order was never dispatched");
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn cancelling_before_shipment_reverses_nothing() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let details = ctx.simple_order(customer.id, product.id, 3, dec!(25.00)).await;
    let cancelled = ctx
        .services
        .fulfillment
        .cancel(details.order.id, Some("Cliente desistió".to_string()), &ctx.actor)
        .await
        .unwrap();

    assert_eq!(cancelled.status, "Cancelado");
    assert_eq!(
        ctx.services.inventory.availability(product.id).await.unwrap(),
        10
    );
    assert_eq!(out_movement_count(&ctx, details.order.id).await, 0);

    // Cancellation frees the demand the order was holding.
    let second = ctx.simple_order(customer.id, product.id, 10, dec!(25.00)).await;
    assert_eq!(second.order.status, "Pendiente");

    let history = ctx
        .services
        .orders
        .get_order(details.order.id)
        .await
        .unwrap()
        .history;
    assert_eq!(history.len(), 2);
    assert_eq!(history.last().unwrap().status, "Cancelado");
}
