//! Order fulfillment state machine.
//!
//! Pendiente -> Despachado -> {Entregado, Cancelado}; Reprogramado is reached
//! only through the returns workflow and re-enters Pendiente. Every applied
//! transition appends an immutable history row. Delivery confirmation is the
//! single point where OUT movements hit the ledger.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{
        delivery,
        enums::{DeliveryStatus, MovementKind, OrderStatus},
        inventory_movement,
        order::{self, Entity as OrderEntity},
        order_line, order_status_history, product,
    },
    errors::{ServiceError, StockShortage},
    events::{Event, EventSender},
    services::{
        audit::AuditTrail,
        inventory::{InventoryService, MovementOutcome, NewMovement},
    },
};

/// Whether the state machine admits `from -> to`.
pub fn transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pendiente, Despachado)
            | (Pendiente, Cancelado)
            | (Despachado, Entregado)
            | (Despachado, Cancelado)
            | (Despachado, Reprogramado)
            | (Entregado, Reprogramado)
            | (Reprogramado, Pendiente)
    )
}

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw)
        .map_err(|_| ServiceError::InternalError(format!("Corrupt order status: {}", raw)))
}

#[derive(Clone)]
pub struct FulfillmentService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    event_sender: EventSender,
    audit: AuditTrail,
}

impl FulfillmentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        event_sender: EventSender,
        audit: AuditTrail,
    ) -> Self {
        Self {
            db,
            inventory,
            event_sender,
            audit,
        }
    }

    /// Validates and applies a transition: status write plus history append.
    ///
    /// Used by delivery assignment and the returns workflow as well, so every
    /// status change in the system funnels through one place.
    pub(crate) async fn apply_transition<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: order::Model,
        to: OrderStatus,
        note: Option<String>,
        actor: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        let from = parse_status(&order.status)?;
        if !transition_allowed(from, to) {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} cannot go from {} to {}",
                order.id, from, to
            )));
        }

        let order_id = order.id;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(to.to_string());
        active.updated_by = Set(Some(actor.id));
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(conn).await.map_err(ServiceError::DatabaseError)?;

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(to.to_string()),
            note: Set(note),
            created_by: Set(actor.id),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        Ok(updated)
    }

    /// Emits the status-change event once the surrounding transaction has
    /// committed.
    pub(crate) async fn emit_status_changed(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus) {
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: from.to_string(),
                new_status: to.to_string(),
            })
            .await;
    }

    /// Confirms delivery of an order, recording one OUT movement per line.
    ///
    /// Idempotent: when an OUT movement already references the order the call
    /// only performs status bookkeeping; confirming an order that is already
    /// `Entregado` is a plain no-op success.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn confirm_delivered(
        &self,
        order_id: Uuid,
        actor: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let status = parse_status(&order.status)?;
        if status == OrderStatus::Entregado {
            txn.commit().await.map_err(ServiceError::DatabaseError)?;
            info!(order_id = %order_id, "Order already delivered; nothing to do");
            return Ok(order);
        }
        if status != OrderStatus::Despachado {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is {} and cannot be confirmed as delivered",
                order_id, status
            )));
        }

        let already_shipped = inventory_movement::Entity::find()
            .filter(inventory_movement::Column::OrderId.eq(order_id))
            .filter(inventory_movement::Column::Kind.eq(MovementKind::Out.to_string()))
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .is_some();

        let mut outcomes: Vec<MovementOutcome> = Vec::new();
        if !already_shipped {
            outcomes = self.ship_lines(&txn, order_id, actor).await?;
        }

        let delivered_at = Utc::now();
        let delivery = delivery::Entity::find()
            .filter(delivery::Column::OrderId.eq(order_id))
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let delivery_id = delivery.as_ref().map(|d| d.id);
        if let Some(existing) = delivery {
            let mut active: delivery::ActiveModel = existing.into();
            active.status = Set(DeliveryStatus::Entregado.to_string());
            active.delivered_at = Set(Some(delivered_at));
            active.updated_at = Set(Some(delivered_at));
            active.update(&txn).await.map_err(ServiceError::DatabaseError)?;
        }

        let updated = self
            .apply_transition(
                &txn,
                order,
                OrderStatus::Entregado,
                Some("Entrega confirmada".to_string()),
                actor,
            )
            .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order_id, movements = outcomes.len(), "Delivery confirmed");

        self.emit_status_changed(order_id, OrderStatus::Despachado, OrderStatus::Entregado)
            .await;
        for outcome in &outcomes {
            self.inventory.emit_movement_events(outcome).await;
        }
        if let Some(delivery_id) = delivery_id {
            self.event_sender
                .send_or_log(Event::DeliveryConfirmed {
                    delivery_id,
                    order_id,
                    delivered_at,
                })
                .await;
        }
        self.audit
            .record(actor.id, "orders", order_id, "STATUS", Some("Entregado".into()))
            .await;

        Ok(updated)
    }

    /// Records the OUT movements for every line of the order.
    ///
    /// Each line ships from the single warehouse currently holding the most
    /// of its product, and that warehouse alone must cover the line quantity.
    /// This per-warehouse check is stricter than the aggregate one used at
    /// admission. Any shortfall fails the whole confirmation.
    async fn ship_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        actor: &AuthUser,
    ) -> Result<Vec<MovementOutcome>, ServiceError> {
        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .all(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut sources = Vec::with_capacity(lines.len());
        let mut shortages = Vec::new();
        for line in &lines {
            let source = self
                .inventory
                .pick_source_warehouse(conn, line.product_id)
                .await?;

            match source {
                Some(source) if source.quantity as i64 >= line.quantity as i64 => {
                    sources.push((line, source));
                }
                source => {
                    let available = source.map(|s| s.quantity as i64).unwrap_or(0);
                    let name = product::Entity::find_by_id(line.product_id)
                        .one(conn)
                        .await
                        .map_err(ServiceError::DatabaseError)?
                        .map(|p| p.name)
                        .unwrap_or_default();
                    shortages.push(StockShortage {
                        product_id: line.product_id,
                        name,
                        available,
                        required: line.quantity as i64,
                    });
                }
            }
        }

        if !shortages.is_empty() {
            return Err(ServiceError::InsufficientStock(shortages));
        }

        let mut outcomes = Vec::with_capacity(sources.len());
        for (line, source) in sources {
            let outcome = self
                .inventory
                .record_movement(
                    conn,
                    actor,
                    NewMovement {
                        warehouse_id: source.warehouse_id,
                        product_id: line.product_id,
                        delta: -line.quantity,
                        kind: MovementKind::Out,
                        order_id: Some(order_id),
                        note: Some("Confirmación de entrega".to_string()),
                    },
                )
                .await?;
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Cancels an order before or after dispatch.
    ///
    /// No stock reversal happens here: cancellation before shipment never
    /// produced an OUT movement.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn cancel(
        &self,
        order_id: Uuid,
        note: Option<String>,
        actor: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let previous = parse_status(&order.status)?;
        let updated = self
            .apply_transition(&txn, order, OrderStatus::Cancelado, note, actor)
            .await?;

        if let Some(existing) = delivery::Entity::find()
            .filter(delivery::Column::OrderId.eq(order_id))
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
        {
            let mut active: delivery::ActiveModel = existing.into();
            active.status = Set(DeliveryStatus::Cancelado.to_string());
            active.updated_at = Set(Some(Utc::now()));
            active.update(&txn).await.map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order_id, "Order cancelled");

        self.emit_status_changed(order_id, previous, OrderStatus::Cancelado)
            .await;
        self.audit
            .record(actor.id, "orders", order_id, "STATUS", Some("Cancelado".into()))
            .await;

        Ok(updated)
    }

    /// Puts a rescheduled order back into the pending pool.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn reopen(
        &self,
        order_id: Uuid,
        actor: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let updated = self
            .apply_transition(
                &txn,
                order,
                OrderStatus::Pendiente,
                Some("Pedido reactivado".to_string()),
                actor,
            )
            .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order_id, "Order reopened");

        self.emit_status_changed(order_id, OrderStatus::Reprogramado, OrderStatus::Pendiente)
            .await;
        self.audit
            .record(actor.id, "orders", order_id, "STATUS", Some("Pendiente".into()))
            .await;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn dispatch_and_cancel_from_pending() {
        assert!(transition_allowed(Pendiente, Despachado));
        assert!(transition_allowed(Pendiente, Cancelado));
        assert!(!transition_allowed(Pendiente, Entregado));
        assert!(!transition_allowed(Pendiente, Reprogramado));
    }

    #[test]
    fn delivered_and_cancelled_are_terminal_except_for_returns() {
        assert!(transition_allowed(Despachado, Entregado));
        assert!(transition_allowed(Despachado, Cancelado));
        assert!(transition_allowed(Entregado, Reprogramado));
        assert!(!transition_allowed(Entregado, Pendiente));
        assert!(!transition_allowed(Cancelado, Pendiente));
        assert!(!transition_allowed(Cancelado, Despachado));
    }

    #[test]
    fn rescheduled_reenters_pending_only() {
        assert!(transition_allowed(Reprogramado, Pendiente));
        assert!(!transition_allowed(Reprogramado, Despachado));
        assert!(!transition_allowed(Reprogramado, Entregado));
    }
}
