//! Admission and pricing: availability boundaries, demand accounting,
//! price-type resolution and the immutability of terminal orders.

mod common;

use assert_matches::assert_matches;
use aquaflow_api::{
    errors::ServiceError,
    services::orders::{CreateOrderRequest, OrderLineRequest, UpdateOrderRequest},
};
use common::TestContext;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn one_line_request(
    customer_id: uuid::Uuid,
    product_id: uuid::Uuid,
    quantity: i32,
    unit_price: Decimal,
) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id,
        delivery_address: "Calle 5 #10".to_string(),
        payment_method: None,
        priority: "Normal".to_string(),
        notes: None,
        scheduled_date: None,
        lines: vec![OrderLineRequest {
            product_id,
            quantity,
            price_type_id: None,
            unit_price: Some(unit_price),
            discount: Decimal::ZERO,
        }],
    }
}

#[tokio::test]
async fn order_for_exactly_available_quantity_is_admitted() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let details = ctx.simple_order(customer.id, product.id, 10, dec!(25.00)).await;
    assert_eq!(details.order.status, "Pendiente");
    assert_eq!(details.lines.len(), 1);
    assert_eq!(details.history.len(), 1);
    assert_eq!(details.history[0].status, "Pendiente");
}

#[tokio::test]
async fn one_unit_over_available_fails_with_named_shortage() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let err = ctx
        .services
        .orders
        .create_order(
            &ctx.actor,
            one_line_request(customer.id, product.id, 11, dec!(25.00)),
        )
        .await
        .expect_err("should be short one unit");

    let shortages = assert_matches!(err, ServiceError::InsufficientStock(s) => s);
    assert_eq!(shortages.len(), 1);
    assert_eq!(shortages[0].product_id, product.id);
    assert_eq!(shortages[0].name, "Botellon 20L");
    assert_eq!(shortages[0].available, 10);
    assert_eq!(shortages[0].required, 11);

    // Nothing was persisted.
    assert_eq!(ctx.count::<aquaflow_api::entities::order::Entity>().await, 0);
    assert_eq!(
        ctx.count::<aquaflow_api::entities::order_line::Entity>().await,
        0
    );
}

#[tokio::test]
async fn open_orders_count_against_availability() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    // First order claims all ten units without shipping anything.
    ctx.simple_order(customer.id, product.id, 10, dec!(25.00)).await;

    // A second order for a single unit now exceeds the unshipped stock.
    let err = ctx
        .services
        .orders
        .create_order(
            &ctx.actor,
            one_line_request(customer.id, product.id, 1, dec!(25.00)),
        )
        .await
        .expect_err("demand is already at capacity");

    let shortages = assert_matches!(err, ServiceError::InsufficientStock(s) => s);
    assert_eq!(shortages[0].available, 10);
    assert_eq!(shortages[0].required, 11);
}

#[tokio::test]
async fn required_quantity_aggregates_across_lines_of_one_order() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let request = CreateOrderRequest {
        customer_id: customer.id,
        delivery_address: "Calle 5 #10".to_string(),
        payment_method: None,
        priority: "Normal".to_string(),
        notes: None,
        scheduled_date: None,
        lines: vec![
            OrderLineRequest {
                product_id: product.id,
                quantity: 6,
                price_type_id: None,
                unit_price: Some(dec!(25.00)),
                discount: Decimal::ZERO,
            },
            OrderLineRequest {
                product_id: product.id,
                quantity: 6,
                price_type_id: None,
                unit_price: Some(dec!(24.00)),
                discount: Decimal::ZERO,
            },
        ],
    };

    let err = ctx
        .services
        .orders
        .create_order(&ctx.actor, request)
        .await
        .expect_err("12 required, 10 available");

    let shortages = assert_matches!(err, ServiceError::InsufficientStock(s) => s);
    assert_eq!(shortages[0].required, 12);
}

#[tokio::test]
async fn price_type_without_mapping_rejects_naming_the_product() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let tier = ctx
        .services
        .directory
        .create_price_type("Mayorista".to_string())
        .await
        .unwrap();

    let mut request = one_line_request(customer.id, product.id, 1, dec!(25.00));
    request.lines[0].price_type_id = Some(tier.id);
    request.lines[0].unit_price = None;

    let err = ctx
        .services
        .orders
        .create_order(&ctx.actor, request)
        .await
        .expect_err("no (product, tier) price row exists");

    let message = assert_matches!(err, ServiceError::ValidationError(m) => m);
    assert!(message.contains("Botellon 20L"), "got: {message}");
}

#[tokio::test]
async fn mapped_price_type_overrides_and_discount_applies() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let tier = ctx
        .services
        .directory
        .create_price_type("Mayorista".to_string())
        .await
        .unwrap();
    ctx.services
        .directory
        .set_product_price(product.id, tier.id, dec!(22.00))
        .await
        .unwrap();

    let mut request = one_line_request(customer.id, product.id, 2, dec!(99.00));
    request.lines[0].price_type_id = Some(tier.id);
    request.lines[0].unit_price = None;
    request.lines[0].discount = dec!(2.50);

    let details = ctx
        .services
        .orders
        .create_order(&ctx.actor, request)
        .await
        .unwrap();

    assert_eq!(details.lines[0].unit_price, dec!(19.50));
    assert_eq!(details.lines[0].discount, dec!(2.50));
}

#[tokio::test]
async fn discount_floors_the_unit_price_at_zero() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let mut request = one_line_request(customer.id, product.id, 1, dec!(3.00));
    request.lines[0].discount = dec!(5.00);

    let details = ctx
        .services
        .orders
        .create_order(&ctx.actor, request)
        .await
        .unwrap();

    assert_eq!(details.lines[0].unit_price, Decimal::ZERO);
}

#[tokio::test]
async fn missing_caller_price_is_a_validation_error() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let mut request = one_line_request(customer.id, product.id, 1, dec!(25.00));
    request.lines[0].unit_price = None;

    let err = ctx
        .services
        .orders
        .create_order(&ctx.actor, request)
        .await
        .expect_err("no price source at all");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn updating_replaces_lines_and_excludes_own_demand() {
    let ctx = TestContext::new().await;
    let wh = ctx.seed_warehouse("Norte", false).await;
    let product = ctx.seed_product("Botellon 20L", dec!(25.00)).await;
    let customer = ctx.seed_customer("Juana Flores").await;
    ctx.put_stock(wh.id, product.id, 10).await;

    let details = ctx.simple_order(customer.id, product.id, 10, dec!(25.00)).await;

    // Re-pricing the full ten units must not double-count the order's own
    // previous lines as open demand.
    let updated = ctx
        .services
        .orders
        .update_order(
            &ctx.actor,
            details.order.id,
            UpdateOrderRequest {
                delivery_address: "Calle Nueva 1".to_string(),
                payment_method: None,
                priority: "Alta".to_string(),
                notes: None,
                scheduled_date: None,
                lines: vec![OrderLineRequest {
                    product_id: product.id,
                    quantity: 10,
                    price_type_id: None,
                    unit_price: Some(dec!(26.00)),
                    discount: Decimal::ZERO,
                }],
            },
        )
        .await
        .expect("update within availability");

    assert_eq!(updated.lines.len(), 1);
    assert_eq!(updated.lines[0].unit_price, dec!(26.00));
    assert_eq!(updated.order.delivery_address, "Calle Nueva 1");
    assert_eq!(updated.order.priority, "Alta");
}

#[tokio::test]
async fn delivered_orders_cannot_be_edited_and_prices_stay_frozen() {
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
            aquaflow_api::services::deliveries::AssignDeliveryRequest {
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

    let err = ctx
        .services
        .orders
        .update_order(
            &ctx.actor,
            details.order.id,
            UpdateOrderRequest {
                delivery_address: "Otra".to_string(),
                payment_method: None,
                priority: "Normal".to_string(),
                notes: None,
                scheduled_date: None,
                lines: vec![OrderLineRequest {
                    product_id: product.id,
                    quantity: 1,
                    price_type_id: None,
                    unit_price: Some(dec!(1.00)),
                    discount: Decimal::ZERO,
                }],
            },
        )
        .await
        .expect_err("terminal orders are immutable");
    assert_matches!(err, ServiceError::InvalidStatus(_));

    // The frozen price survives the rejected edit.
    let after = ctx.services.orders.get_order(details.order.id).await.unwrap();
    assert_eq!(after.lines[0].unit_price, dec!(25.00));
    assert_eq!(after.lines[0].quantity, 4);
}
