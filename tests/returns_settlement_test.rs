//! Returns and cash reconciliation: the round trip back to the central
//! warehouse, the all-deliveries-of-the-truck cash formula, and the
//! zero-write guarantee on a mismatch.

mod common;

use assert_matches::assert_matches;
use aquaflow_api::{
    entities::{inventory_movement, return_settlement},
    errors::ServiceError,
    services::{
        deliveries::AssignDeliveryRequest,
        returns::{ExpenseBreakdown, RecordReturnRequest},
    },
};
use common::TestContext;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

struct Fixture {
    ctx: TestContext,
    central_id: Uuid,
    truck_id: Uuid,
    driver_id: Uuid,
    product_id: Uuid,
    customer_id: Uuid,
}

async fn fixture() -> Fixture {
    let ctx = TestContext::new().await;
    let central = ctx.seed_warehouse("Central", true).await;
    let branch = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    let truck = ctx.seed_truck("ABC-123").await;
    let driver = ctx.seed_driver("Mario Paz").await;
    ctx.put_stock(branch.id, product.id, 20).await;

    Fixture {
        ctx,
        central_id: central.id,
        truck_id: truck.id,
        driver_id: driver.id,
        product_id: product.id,
        customer_id: customer.id,
    }
}

impl Fixture {
    async fn dispatched_order(&self, qty: i32, price: Decimal) -> Uuid {
        let details = self
            .ctx
            .simple_order(self.customer_id, self.product_id, qty, price)
            .await;
        self.ctx
            .services
            .deliveries
            .assign(
                &self.ctx.actor,
                AssignDeliveryRequest {
                    order_id: details.order.id,
                    truck_id: self.truck_id,
                    driver_id: self.driver_id,
                    scheduled_at: None,
                },
            )
            .await
            .unwrap();
        details.order.id
    }

    async fn delivered_order(&self, qty: i32, price: Decimal) -> Uuid {
        let order_id = self.dispatched_order(qty, price).await;
        self.ctx
            .services
            .fulfillment
            .confirm_delivered(order_id, &self.ctx.actor)
            .await
            .unwrap();
        order_id
    }
}

#[tokio::test]
async fn full_return_restores_stock_via_the_central_warehouse() {
    let f = fixture().await;
    // 4 units at 25.00 delivered today on the truck.
    let order_id = f.delivered_order(4, dec!(25.00)).await;
    assert_eq!(
        f.ctx.services.inventory.availability(f.product_id).await.unwrap(),
        16
    );

    let outcome = f
        .ctx
        .services
        .returns
        .record_return(
            &f.ctx.actor,
            RecordReturnRequest {
                order_id,
                truck_id: f.truck_id,
                cash_amount: dec!(100.00),
                expenses: ExpenseBreakdown {
                    fuel: Decimal::ZERO,
                    meal: Decimal::ZERO,
                    other: Decimal::ZERO,
                },
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.credited_warehouse_id, f.central_id);
    assert_eq!(outcome.order_status, "Reprogramado");
    assert_eq!(outcome.settlement.cash_expected, dec!(100.00));

    // Aggregate availability is back to the pre-delivery level, with the
    // returned units sitting in the central warehouse.
    assert_eq!(
        f.ctx.services.inventory.availability(f.product_id).await.unwrap(),
        20
    );
    let central_stock = f
        .ctx
        .services
        .inventory
        .stock_by_warehouse(f.central_id)
        .await
        .unwrap();
    assert_eq!(central_stock.len(), 1);
    assert_eq!(central_stock[0].quantity, 4);

    // The delivery mirrors the order state.
    let order = f.ctx.services.orders.get_order(order_id).await.unwrap();
    assert_eq!(order.order.status, "Reprogramado");
    assert_eq!(order.history.last().unwrap().status, "Reprogramado");

    // And the order can re-enter the pending pool.
    let reopened = f
        .ctx
        .services
        .fulfillment
        .reopen(order_id, &f.ctx.actor)
        .await
        .unwrap();
    assert_eq!(reopened.status, "Pendiente");
}

#[tokio::test]
async fn expected_cash_covers_every_delivery_of_the_truck_that_day() {
    let f = fixture().await;
    // Two orders delivered on the truck: 4x25 + 2x30 = 160. One order comes
    // back; the driver still settles against the full 160 minus expenses.
    let returned = f.delivered_order(4, dec!(25.00)).await;
    f.delivered_order(2, dec!(30.00)).await;

    let expenses = ExpenseBreakdown {
        fuel: dec!(20.00),
        meal: dec!(10.50),
        other: Decimal::ZERO,
    };

    let err = f
        .ctx
        .services
        .returns
        .record_return(
            &f.ctx.actor,
            RecordReturnRequest {
                order_id: returned,
                truck_id: f.truck_id,
                cash_amount: dec!(160.00),
                expenses,
            },
        )
        .await
        .expect_err("expenses were not subtracted");
    let discrepancy = assert_matches!(err, ServiceError::CashMismatch(d) => d);
    assert_eq!(discrepancy.expected, dec!(129.50));
    assert_eq!(discrepancy.received, dec!(160.00));

    let outcome = f
        .ctx
        .services
        .returns
        .record_return(
            &f.ctx.actor,
            RecordReturnRequest {
                order_id: returned,
                truck_id: f.truck_id,
                cash_amount: dec!(129.50),
                expenses,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.settlement.cash_expected, dec!(129.50));
    assert_eq!(outcome.settlement.fuel_expense, dec!(20.00));
}

#[tokio::test]
async fn expected_cash_is_floored_at_zero() {
    let f = fixture().await;
    let order_id = f.delivered_order(1, dec!(25.00)).await;

    // Expenses exceed the day's sales; the driver owes nothing.
    let outcome = f
        .ctx
        .services
        .returns
        .record_return(
            &f.ctx.actor,
            RecordReturnRequest {
                order_id,
                truck_id: f.truck_id,
                cash_amount: Decimal::ZERO,
                expenses: ExpenseBreakdown {
                    fuel: dec!(30.00),
                    meal: Decimal::ZERO,
                    other: Decimal::ZERO,
                },
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.settlement.cash_expected, Decimal::ZERO);
}

#[tokio::test]
async fn cash_mismatch_writes_zero_rows() {
    let f = fixture().await;
    let order_id = f.delivered_order(4, dec!(25.00)).await;

    let movements_before = f.ctx.count::<inventory_movement::Entity>().await;
    let order_before = f.ctx.services.orders.get_order(order_id).await.unwrap();

    let err = f
        .ctx
        .services
        .returns
        .record_return(
            &f.ctx.actor,
            RecordReturnRequest {
                order_id,
                truck_id: f.truck_id,
                cash_amount: dec!(90.00),
                expenses: ExpenseBreakdown {
                    fuel: Decimal::ZERO,
                    meal: Decimal::ZERO,
                    other: Decimal::ZERO,
                },
            },
        )
        .await
        .expect_err("driver is 10 short");
    assert_matches!(err, ServiceError::CashMismatch(_));

    assert_eq!(
        f.ctx.count::<inventory_movement::Entity>().await,
        movements_before
    );
    assert_eq!(f.ctx.count::<return_settlement::Entity>().await, 0);
    let order_after = f.ctx.services.orders.get_order(order_id).await.unwrap();
    assert_eq!(order_after.order.status, order_before.order.status);
    assert_eq!(order_after.history.len(), order_before.history.len());
}

#[tokio::test]
async fn returns_require_the_matching_truck() {
    let f = fixture().await;
    let order_id = f.delivered_order(1, dec!(25.00)).await;
    let other_truck = f.ctx.seed_truck("XYZ-789").await;

    let err = f
        .ctx
        .services
        .returns
        .record_return(
            &f.ctx.actor,
            RecordReturnRequest {
                order_id,
                truck_id: other_truck.id,
                cash_amount: dec!(25.00),
                expenses: ExpenseBreakdown {
                    fuel: Decimal::ZERO,
                    meal: Decimal::ZERO,
                    other: Decimal::ZERO,
                },
            },
        )
        .await
        .expect_err("order went out on a different truck");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn returns_fall_back_to_the_oldest_warehouse_without_a_central_flag() {
    let ctx = TestContext::new().await;
    let oldest = ctx.seed_warehouse("Primero", false).await;
    let newer = ctx.seed_warehouse("Segundo", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    let truck = ctx.seed_truck("ABC-123").await;
    let driver = ctx.seed_driver("Mario Paz").await;
    ctx.put_stock(newer.id, product.id, 10).await;

    let details = ctx.simple_order(customer.id, product.id, 2, dec!(25.00)).await;
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

    let outcome = ctx
        .services
        .returns
        .record_return(
            &ctx.actor,
            RecordReturnRequest {
                order_id: details.order.id,
                truck_id: truck.id,
                cash_amount: dec!(50.00),
                expenses: ExpenseBreakdown {
                    fuel: Decimal::ZERO,
                    meal: Decimal::ZERO,
                    other: Decimal::ZERO,
                },
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.credited_warehouse_id, oldest.id);
}
