#![allow(dead_code)]

use std::sync::Arc;

use aquaflow_api::{
    auth::AuthUser,
    db::{self, DbConfig},
    entities::{customer, driver, product, truck, warehouse},
    events::{process_events, EventSender},
    services::{
        directory::{
            CreateCustomerRequest, CreateDriverRequest, CreateProductRequest,
            CreateTruckRequest, CreateWarehouseRequest,
        },
        inventory::AdjustStockRequest,
        orders::{CreateOrderRequest, OrderDetails, OrderLineRequest},
        AppServices,
    },
};
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Service-level test harness over an in-memory SQLite database.
///
/// The pool is capped at one connection so every query sees the same
/// in-memory database.
pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub event_sender: EventSender,
    pub actor: AuthUser,
}

impl TestContext {
    pub async fn new() -> Self {
        let cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&cfg)
            .await
            .expect("sqlite pool");
        db::run_migrations(&pool).await.expect("migrations");

        let db = Arc::new(pool);
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(process_events(rx));
        let event_sender = EventSender::new(tx);
        let services = AppServices::new(db.clone(), event_sender.clone());

        let actor = AuthUser {
            id: Uuid::new_v4(),
            name: "Operador de prueba".to_string(),
            email: "operador@test.local".to_string(),
        };

        Self {
            db,
            services,
            event_sender,
            actor,
        }
    }

    pub async fn seed_product(&self, name: &str, base_price: Decimal) -> product::Model {
        self.services
            .directory
            .create_product(CreateProductRequest {
                name: name.to_string(),
                description: None,
                base_price,
            })
            .await
            .expect("seed product")
    }

    pub async fn seed_warehouse(&self, name: &str, is_central: bool) -> warehouse::Model {
        self.services
            .directory
            .create_warehouse(CreateWarehouseRequest {
                name: name.to_string(),
                location: None,
                is_central,
            })
            .await
            .expect("seed warehouse")
    }

    pub async fn seed_customer(&self, name: &str) -> customer::Model {
        self.services
            .directory
            .create_customer(
                self.actor.id,
                CreateCustomerRequest {
                    full_name: name.to_string(),
                    phone: "555-0100".to_string(),
                    address: Some("Av. Los Pinos 12".to_string()),
                    zone: None,
                    notes: None,
                },
            )
            .await
            .expect("seed customer")
    }

    pub async fn seed_truck(&self, plate: &str) -> truck::Model {
        self.services
            .directory
            .create_truck(CreateTruckRequest {
                plate: plate.to_string(),
                capacity: Some(200),
            })
            .await
            .expect("seed truck")
    }

    pub async fn seed_driver(&self, name: &str) -> driver::Model {
        self.services
            .directory
            .create_driver(CreateDriverRequest {
                name: name.to_string(),
                phone: None,
            })
            .await
            .expect("seed driver")
    }

    /// Receives stock into a warehouse through the public movement path.
    pub async fn put_stock(&self, warehouse_id: Uuid, product_id: Uuid, quantity: i32) {
        self.services
            .inventory
            .adjust_stock(
                &self.actor,
                AdjustStockRequest {
                    warehouse_id,
                    product_id,
                    quantity,
                    kind: "IN".to_string(),
                    note: Some("seed".to_string()),
                },
            )
            .await
            .expect("seed stock");
    }

    /// One-line order at a caller-supplied price.
    pub async fn simple_order(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) -> OrderDetails {
        self.services
            .orders
            .create_order(
                &self.actor,
                CreateOrderRequest {
                    customer_id,
                    delivery_address: "Av. Los Pinos 12".to_string(),
                    payment_method: Some("Efectivo".to_string()),
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
                },
            )
            .await
            .expect("create order")
    }

    pub async fn count<E>(&self) -> u64
    where
        E: EntityTrait,
        E::Model: Send + Sync,
    {
        E::find().count(&*self.db).await.expect("count")
    }
}
