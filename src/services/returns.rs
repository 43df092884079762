//! Returns and driver cash reconciliation.
//!
//! One atomic call couples "return the goods of order X to the central
//! warehouse" with "reconcile the driver's cash for every order this truck
//! delivered today". The cash check runs first: a mismatch rejects the call
//! before anything is written.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{
        delivery::{self, Entity as DeliveryEntity},
        enums::{DeliveryStatus, MovementKind, OrderStatus},
        order::Entity as OrderEntity,
        order_line, return_settlement,
    },
    errors::{CashDiscrepancy, ServiceError},
    events::{Event, EventSender},
    services::{
        audit::AuditTrail,
        directory::DirectoryService,
        fulfillment::FulfillmentService,
        inventory::{InventoryService, NewMovement},
    },
};

#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct ExpenseBreakdown {
    #[serde(default)]
    pub fuel: Decimal,
    #[serde(default)]
    pub meal: Decimal,
    #[serde(default)]
    pub other: Decimal,
}

impl ExpenseBreakdown {
    pub fn total(&self) -> Decimal {
        self.fuel + self.meal + self.other
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordReturnRequest {
    pub order_id: Uuid,
    pub truck_id: Uuid,
    /// Cash the driver hands over; must equal the day's delivered sales for
    /// the truck minus expenses, at two decimals.
    pub cash_amount: Decimal,
    pub expenses: ExpenseBreakdown,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReturnOutcome {
    pub settlement: return_settlement::Model,
    pub order_status: String,
    pub credited_warehouse_id: Uuid,
}

#[derive(Clone)]
pub struct ReturnService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    fulfillment: FulfillmentService,
    directory: DirectoryService,
    event_sender: EventSender,
    audit: AuditTrail,
}

impl ReturnService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        fulfillment: FulfillmentService,
        directory: DirectoryService,
        event_sender: EventSender,
        audit: AuditTrail,
    ) -> Self {
        Self {
            db,
            inventory,
            fulfillment,
            directory,
            event_sender,
            audit,
        }
    }

    /// Returns the goods of one order and settles the driver's cash.
    #[instrument(skip(self, actor), fields(order_id = %request.order_id, truck_id = %request.truck_id))]
    pub async fn record_return(
        &self,
        actor: &AuthUser,
        request: RecordReturnRequest,
    ) -> Result<ReturnOutcome, ServiceError> {
        if request.cash_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Cash amount must not be negative".into(),
            ));
        }
        if request.expenses.fuel < Decimal::ZERO
            || request.expenses.meal < Decimal::ZERO
            || request.expenses.other < Decimal::ZERO
        {
            return Err(ServiceError::ValidationError(
                "Expenses must not be negative".into(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = OrderEntity::find_by_id(request.order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", request.order_id))
            })?;

        let previous_status = OrderStatus::from_str(&order.status).map_err(|_| {
            ServiceError::InternalError(format!("Corrupt order status: {}", order.status))
        })?;
        if !matches!(
            previous_status,
            OrderStatus::Despachado | OrderStatus::Entregado
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is {} and cannot be returned",
                order.id, previous_status
            )));
        }

        let order_delivery = DeliveryEntity::find()
            .filter(delivery::Column::OrderId.eq(request.order_id))
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} has no delivery", request.order_id))
            })?;
        if order_delivery.truck_id != request.truck_id {
            return Err(ServiceError::ValidationError(format!(
                "Order {} was not dispatched on the given truck",
                request.order_id
            )));
        }

        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(request.order_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        // Cash reconciliation over every order this truck delivered today,
        // independent of the specific order being returned.
        let today = Utc::now().date_naive();
        let delivered_total = self.delivered_total(&txn, request.truck_id, today).await?;
        let expected = (delivered_total - request.expenses.total()).max(Decimal::ZERO).round_dp(2);
        let received = request.cash_amount.round_dp(2);
        if received != expected {
            return Err(ServiceError::CashMismatch(CashDiscrepancy {
                expected,
                received,
            }));
        }

        // Credit the central warehouse. The matching OUT movements are
        // presumed, not re-verified.
        let central = self.directory.central_warehouse(&txn).await?;
        let mut outcomes = Vec::with_capacity(lines.len());
        for line in &lines {
            let outcome = self
                .inventory
                .record_movement(
                    &txn,
                    actor,
                    NewMovement {
                        warehouse_id: central.id,
                        product_id: line.product_id,
                        delta: line.quantity,
                        kind: MovementKind::Return,
                        order_id: Some(request.order_id),
                        note: Some("Devolución al almacén central".to_string()),
                    },
                )
                .await?;
            outcomes.push(outcome);
        }

        let updated_order = self
            .fulfillment
            .apply_transition(
                &txn,
                order,
                OrderStatus::Reprogramado,
                Some("Retorno registrado".to_string()),
                actor,
            )
            .await?;

        let driver_id = order_delivery.driver_id;
        let mut active_delivery: delivery::ActiveModel = order_delivery.into();
        active_delivery.status = Set(DeliveryStatus::Reprogramado.to_string());
        active_delivery.updated_at = Set(Some(Utc::now()));
        active_delivery
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let settlement = return_settlement::ActiveModel {
            id: Set(Uuid::new_v4()),
            truck_id: Set(request.truck_id),
            driver_id: Set(driver_id),
            settlement_date: Set(today),
            cash_expected: Set(expected),
            cash_received: Set(received),
            fuel_expense: Set(request.expenses.fuel),
            meal_expense: Set(request.expenses.meal),
            other_expense: Set(request.expenses.other),
            created_by: Set(actor.id),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            order_id = %request.order_id,
            settlement_id = %settlement.id,
            expected = %expected,
            "Return recorded and cash settled"
        );

        for outcome in &outcomes {
            self.inventory.emit_movement_events(outcome).await;
        }
        self.fulfillment
            .emit_status_changed(request.order_id, previous_status, OrderStatus::Reprogramado)
            .await;
        self.event_sender
            .send_or_log(Event::ReturnRecorded {
                order_id: request.order_id,
                truck_id: request.truck_id,
                settlement_id: settlement.id,
                cash_received: received,
            })
            .await;
        self.audit
            .record(
                actor.id,
                "returns",
                request.order_id,
                "RETURN",
                Some(format!("cash:{}", received)),
            )
            .await;

        Ok(ReturnOutcome {
            settlement,
            order_status: updated_order.status,
            credited_warehouse_id: central.id,
        })
    }

    /// Sum of quantity × frozen unit price over all of the truck's orders
    /// delivered on the given date.
    async fn delivered_total<C: sea_orm::ConnectionTrait>(
        &self,
        conn: &C,
        truck_id: Uuid,
        date: NaiveDate,
    ) -> Result<Decimal, ServiceError> {
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| ServiceError::InternalError("Invalid settlement date".into()))?;
        let day_end = day_start + Duration::days(1);

        let delivered = DeliveryEntity::find()
            .filter(delivery::Column::TruckId.eq(truck_id))
            .filter(delivery::Column::Status.eq(DeliveryStatus::Entregado.to_string()))
            .filter(delivery::Column::DeliveredAt.gte(day_start))
            .filter(delivery::Column::DeliveredAt.lt(day_end))
            .all(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if delivered.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let order_ids: Vec<Uuid> = delivered.iter().map(|d| d.order_id).collect();
        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.is_in(order_ids))
            .all(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum())
    }

    pub async fn list_settlements(
        &self,
        truck_id: Option<Uuid>,
    ) -> Result<Vec<return_settlement::Model>, ServiceError> {
        let mut query = return_settlement::Entity::find()
            .order_by_desc(return_settlement::Column::CreatedAt);
        if let Some(truck_id) = truck_id {
            query = query.filter(return_settlement::Column::TruckId.eq(truck_id));
        }

        query.all(&*self.db).await.map_err(ServiceError::DatabaseError)
    }
}
