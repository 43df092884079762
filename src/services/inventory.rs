//! Inventory ledger.
//!
//! The movement log is the sole source of truth for stock; `stock_levels` is
//! a per-(warehouse, product) cache maintained in the same transaction as
//! each movement row. Movements are append-only: corrections are new
//! compensating rows, never updates.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{
        enums::MovementKind,
        inventory_movement, product,
        stock_level::{self, Entity as StockLevelEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::audit::AuditTrail,
};

/// A movement to append to the ledger.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    /// Signed delta; the ledger does not enforce non-negativity.
    pub delta: i32,
    pub kind: MovementKind,
    pub order_id: Option<Uuid>,
    pub note: Option<String>,
}

/// Result of appending a movement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MovementOutcome {
    pub movement_id: Uuid,
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    pub delta: i32,
    pub quantity_after: i32,
    pub min_stock: i32,
}

impl MovementOutcome {
    pub fn is_below_minimum(&self) -> bool {
        self.quantity_after < self.min_stock
    }
}

/// Request body for the public stock adjustment endpoint.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub kind: String,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    audit: AuditTrail,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, audit: AuditTrail) -> Self {
        Self {
            db,
            event_sender,
            audit,
        }
    }

    /// Appends a movement row and folds its delta into the stock aggregate.
    ///
    /// Generic over the connection so fulfillment and returns can compose it
    /// into their own transactions. The (warehouse, product) aggregate row is
    /// taken with an exclusive lock for the duration of the check-and-mutate.
    /// Returns the resulting quantity so callers can react to a negative
    /// result; no non-negativity is enforced here.
    pub async fn record_movement<C: ConnectionTrait>(
        &self,
        conn: &C,
        actor: &AuthUser,
        movement: NewMovement,
    ) -> Result<MovementOutcome, ServiceError> {
        let movement_id = Uuid::new_v4();
        let now = Utc::now();

        inventory_movement::ActiveModel {
            id: Set(movement_id),
            warehouse_id: Set(movement.warehouse_id),
            product_id: Set(movement.product_id),
            quantity: Set(movement.delta),
            kind: Set(movement.kind.to_string()),
            order_id: Set(movement.order_id),
            note: Set(movement.note),
            created_by: Set(actor.id),
            created_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        let existing = StockLevelEntity::find()
            .filter(stock_level::Column::WarehouseId.eq(movement.warehouse_id))
            .filter(stock_level::Column::ProductId.eq(movement.product_id))
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let (quantity_after, min_stock) = match existing {
            Some(level) => {
                let quantity_after = level.quantity + movement.delta;
                let min_stock = level.min_stock;
                let mut active: stock_level::ActiveModel = level.into();
                active.quantity = Set(quantity_after);
                active.updated_at = Set(now);
                active.update(conn).await.map_err(ServiceError::DatabaseError)?;
                (quantity_after, min_stock)
            }
            None => {
                stock_level::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    warehouse_id: Set(movement.warehouse_id),
                    product_id: Set(movement.product_id),
                    quantity: Set(movement.delta),
                    min_stock: Set(0),
                    updated_at: Set(now),
                }
                .insert(conn)
                .await
                .map_err(ServiceError::DatabaseError)?;
                (movement.delta, 0)
            }
        };

        Ok(MovementOutcome {
            movement_id,
            warehouse_id: movement.warehouse_id,
            product_id: movement.product_id,
            delta: movement.delta,
            quantity_after,
            min_stock,
        })
    }

    /// Sum of the product's stock aggregate across all warehouses.
    ///
    /// Locks the aggregate rows when called inside a transaction, so an
    /// admission check cannot race a concurrent movement on the same product.
    pub async fn aggregate_available<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<i64, ServiceError> {
        let levels = StockLevelEntity::find()
            .filter(stock_level::Column::ProductId.eq(product_id))
            .lock_exclusive()
            .all(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(levels.iter().map(|l| l.quantity as i64).sum())
    }

    /// The warehouse currently holding the most of the product.
    ///
    /// Fulfillment is single-source per line; there is no splitting across
    /// warehouses.
    pub async fn pick_source_warehouse<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<Option<stock_level::Model>, ServiceError> {
        StockLevelEntity::find()
            .filter(stock_level::Column::ProductId.eq(product_id))
            .order_by_desc(stock_level::Column::Quantity)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Public entry point for warehouse staff: receipts and corrections.
    #[instrument(skip(self, actor), fields(warehouse_id = %request.warehouse_id, product_id = %request.product_id))]
    pub async fn adjust_stock(
        &self,
        actor: &AuthUser,
        request: AdjustStockRequest,
    ) -> Result<MovementOutcome, ServiceError> {
        let kind = MovementKind::from_str(&request.kind).map_err(|_| {
            ServiceError::ValidationError(format!("Unknown movement kind: {}", request.kind))
        })?;
        if request.quantity == 0 {
            return Err(ServiceError::ValidationError(
                "Movement quantity must not be zero".into(),
            ));
        }

        let product_exists = product::Entity::find_by_id(request.product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .is_some();
        if !product_exists {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                request.product_id
            )));
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let outcome = self
            .record_movement(
                &txn,
                actor,
                NewMovement {
                    warehouse_id: request.warehouse_id,
                    product_id: request.product_id,
                    delta: request.quantity,
                    kind,
                    order_id: None,
                    note: request.note,
                },
            )
            .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            movement_id = %outcome.movement_id,
            quantity_after = outcome.quantity_after,
            "Stock movement recorded"
        );

        self.emit_movement_events(&outcome).await;
        self.audit
            .record(
                actor.id,
                "inventory",
                outcome.product_id,
                "MOVE",
                Some(format!("{}:{}", kind, request.quantity)),
            )
            .await;

        Ok(outcome)
    }

    /// Emits the movement event plus a low-stock warning when applicable.
    pub async fn emit_movement_events(&self, outcome: &MovementOutcome) {
        self.event_sender
            .send_or_log(Event::MovementRecorded {
                movement_id: outcome.movement_id,
                warehouse_id: outcome.warehouse_id,
                product_id: outcome.product_id,
                delta: outcome.delta,
                resulting_quantity: outcome.quantity_after,
            })
            .await;

        if outcome.is_below_minimum() {
            self.event_sender
                .send_or_log(Event::StockBelowMinimum {
                    warehouse_id: outcome.warehouse_id,
                    product_id: outcome.product_id,
                    quantity: outcome.quantity_after,
                    min_stock: outcome.min_stock,
                })
                .await;
        }
    }

    /// Stock rows for one warehouse.
    pub async fn stock_by_warehouse(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Vec<stock_level::Model>, ServiceError> {
        StockLevelEntity::find()
            .filter(stock_level::Column::WarehouseId.eq(warehouse_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Aggregate availability for one product, outside any transaction.
    pub async fn availability(&self, product_id: Uuid) -> Result<i64, ServiceError> {
        self.aggregate_available(&*self.db, product_id).await
    }

    /// Rows sitting at or below their minimum threshold.
    pub async fn low_stock(&self) -> Result<Vec<stock_level::Model>, ServiceError> {
        let levels = StockLevelEntity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(levels
            .into_iter()
            .filter(|l| l.quantity <= l.min_stock)
            .collect())
    }

    /// Movement log for one order, oldest first.
    pub async fn movements_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<inventory_movement::Model>, ServiceError> {
        inventory_movement::Entity::find()
            .filter(inventory_movement::Column::OrderId.eq(order_id))
            .order_by_asc(inventory_movement::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}
