//! Delivery assignment: single, conflicting and bulk with partial success.

mod common;

use assert_matches::assert_matches;
use aquaflow_api::{
    errors::ServiceError,
    services::deliveries::{AssignDeliveryRequest, BulkAssignRequest, DeliveryListFilter},
};
use common::TestContext;
use rust_decimal_macros::dec;
use uuid::Uuid;

struct Fixture {
    ctx: TestContext,
    truck_id: Uuid,
    driver_id: Uuid,
    product_id: Uuid,
    customer_id: Uuid,
}

async fn fixture() -> Fixture {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    let truck = ctx.seed_truck("ABC-123").await;
    let driver = ctx.seed_driver("Mario Paz").await;
    ctx.put_stock(wh.id, product.id, 100).await;

    Fixture {
        ctx,
        truck_id: truck.id,
        driver_id: driver.id,
        product_id: product.id,
        customer_id: customer.id,
    }
}

#[tokio::test]
async fn assignment_dispatches_the_order() {
    let f = fixture().await;
    let details = f
        .ctx
        .simple_order(f.customer_id, f.product_id, 2, dec!(25.00))
        .await;

    let delivery = f
        .ctx
        .services
        .deliveries
        .assign(
            &f.ctx.actor,
            AssignDeliveryRequest {
                order_id: details.order.id,
                truck_id: f.truck_id,
                driver_id: f.driver_id,
                scheduled_at: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(delivery.status, "Despachado");
    assert_eq!(delivery.order_id, details.order.id);

    let order = f.ctx.services.orders.get_order(details.order.id).await.unwrap();
    assert_eq!(order.order.status, "Despachado");
    assert_eq!(order.history.last().unwrap().status, "Despachado");
}

#[tokio::test]
async fn second_assignment_for_the_same_order_conflicts() {
    let f = fixture().await;
    let details = f
        .ctx
        .simple_order(f.customer_id, f.product_id, 2, dec!(25.00))
        .await;

    let request = AssignDeliveryRequest {
        order_id: details.order.id,
        truck_id: f.truck_id,
        driver_id: f.driver_id,
        scheduled_at: None,
    };
    f.ctx.services.deliveries.assign(&f.ctx.actor, request).await.unwrap();

    let err = f
        .ctx
        .services
        .deliveries
        .assign(
            &f.ctx.actor,
            AssignDeliveryRequest {
                order_id: details.order.id,
                truck_id: f.truck_id,
                driver_id: f.driver_id,
                scheduled_at: None,
            },
        )
        .await
        .expect_err("active delivery already exists");
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn bulk_assignment_skips_orders_with_active_deliveries() {
    let f = fixture().await;
    let order1 = f
        .ctx
        .simple_order(f.customer_id, f.product_id, 1, dec!(25.00))
        .await;
    let order2 = f
        .ctx
        .simple_order(f.customer_id, f.product_id, 1, dec!(25.00))
        .await;
    let order3 = f
        .ctx
        .simple_order(f.customer_id, f.product_id, 1, dec!(25.00))
        .await;

    // Order 2 goes out early on a different truck.
    let other_truck = f.ctx.seed_truck("XYZ-789").await;
    let existing = f
        .ctx
        .services
        .deliveries
        .assign(
            &f.ctx.actor,
            AssignDeliveryRequest {
                order_id: order2.order.id,
                truck_id: other_truck.id,
                driver_id: f.driver_id,
                scheduled_at: None,
            },
        )
        .await
        .unwrap();

    let outcome = f
        .ctx
        .services
        .deliveries
        .assign_bulk(
            &f.ctx.actor,
            BulkAssignRequest {
                order_ids: vec![order1.order.id, order2.order.id, order3.order.id],
                truck_id: f.truck_id,
                driver_id: f.driver_id,
                scheduled_at: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.assigned, 2);
    assert_eq!(outcome.skipped, 1);

    // Order 2's delivery is untouched by the skip.
    let unchanged = f
        .ctx
        .services
        .deliveries
        .get_delivery(existing.id)
        .await
        .unwrap();
    assert_eq!(unchanged.truck_id, other_truck.id);
    assert_eq!(unchanged.status, "Despachado");
}

#[tokio::test]
async fn bulk_assignment_counts_unknown_orders_as_skipped() {
    let f = fixture().await;
    let order1 = f
        .ctx
        .simple_order(f.customer_id, f.product_id, 1, dec!(25.00))
        .await;

    let outcome = f
        .ctx
        .services
        .deliveries
        .assign_bulk(
            &f.ctx.actor,
            BulkAssignRequest {
                order_ids: vec![order1.order.id, Uuid::new_v4()],
                truck_id: f.truck_id,
                driver_id: f.driver_id,
                scheduled_at: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.assigned, 1);
    assert_eq!(outcome.skipped, 1);
}

#[tokio::test]
async fn assignment_requires_an_active_truck_and_driver() {
    let f = fixture().await;
    let details = f
        .ctx
        .simple_order(f.customer_id, f.product_id, 1, dec!(25.00))
        .await;

    let err = f
        .ctx
        .services
        .deliveries
        .assign(
            &f.ctx.actor,
            AssignDeliveryRequest {
                order_id: details.order.id,
                truck_id: Uuid::new_v4(),
                driver_id: f.driver_id,
                scheduled_at: None,
            },
        )
        .await
        .expect_err("unknown truck");
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn deliveries_are_listable_per_driver() {
    let f = fixture().await;
    let details = f
        .ctx
        .simple_order(f.customer_id, f.product_id, 1, dec!(25.00))
        .await;
    f.ctx
        .services
        .deliveries
        .assign(
            &f.ctx.actor,
            AssignDeliveryRequest {
                order_id: details.order.id,
                truck_id: f.truck_id,
                driver_id: f.driver_id,
                scheduled_at: None,
            },
        )
        .await
        .unwrap();

    let mine = f
        .ctx
        .services
        .deliveries
        .list_deliveries(DeliveryListFilter {
            driver_id: Some(f.driver_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);

    let other = f
        .ctx
        .services
        .deliveries
        .list_deliveries(DeliveryListFilter {
            driver_id: Some(Uuid::new_v4()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(other.is_empty());
}
