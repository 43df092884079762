//! Delivery assignment: binding orders to a truck and driver, singly or in
//! bulk. Bulk assignment is the one operation in the system with designed
//! partial success: each order commits on its own, and orders that cannot be
//! assigned are counted, not failed.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{
        delivery::{self, Entity as DeliveryEntity},
        delivery_incident, driver,
        enums::{DeliveryStatus, OrderStatus},
        order::Entity as OrderEntity,
        truck,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{audit::AuditTrail, fulfillment::FulfillmentService},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignDeliveryRequest {
    pub order_id: Uuid,
    pub truck_id: Uuid,
    pub driver_id: Uuid,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkAssignRequest {
    pub order_ids: Vec<Uuid>,
    pub truck_id: Uuid,
    pub driver_id: Uuid,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Result of a bulk assignment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct BulkAssignmentOutcome {
    pub assigned: u32,
    pub skipped: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDeliveryStatusRequest {
    pub status: String,
    pub incident_kind: Option<String>,
    pub note: Option<String>,
}

/// Filters accepted by the delivery listing.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DeliveryListFilter {
    pub truck_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct DeliveryService {
    db: Arc<DatabaseConnection>,
    fulfillment: FulfillmentService,
    event_sender: EventSender,
    audit: AuditTrail,
}

impl DeliveryService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        fulfillment: FulfillmentService,
        event_sender: EventSender,
        audit: AuditTrail,
    ) -> Self {
        Self {
            db,
            fulfillment,
            event_sender,
            audit,
        }
    }

    /// Assigns a single pending order to a truck and driver.
    ///
    /// An order with an active delivery is a conflict. A delivery left behind
    /// by a return or a cancellation is refreshed in place, keeping the
    /// one-delivery-per-order invariant.
    #[instrument(skip(self, actor), fields(order_id = %request.order_id, truck_id = %request.truck_id))]
    pub async fn assign(
        &self,
        actor: &AuthUser,
        request: AssignDeliveryRequest,
    ) -> Result<delivery::Model, ServiceError> {
        self.check_fleet(request.truck_id, request.driver_id).await?;
        let assigned = self.assign_checked(actor, &request).await?;

        self.event_sender
            .send_or_log(Event::DeliveryAssigned {
                delivery_id: assigned.id,
                order_id: assigned.order_id,
                truck_id: assigned.truck_id,
                driver_id: assigned.driver_id,
            })
            .await;
        self.fulfillment
            .emit_status_changed(assigned.order_id, OrderStatus::Pendiente, OrderStatus::Despachado)
            .await;
        self.audit
            .record(actor.id, "deliveries", assigned.id, "ASSIGN", None)
            .await;

        Ok(assigned)
    }

    /// Assigns a batch of orders, reporting partial success.
    ///
    /// Orders that already carry an active delivery, are missing, or are not
    /// in `Pendiente` are skipped and counted. Each successful assignment has
    /// already committed when a later one fails.
    #[instrument(skip(self, actor), fields(count = request.order_ids.len(), truck_id = %request.truck_id))]
    pub async fn assign_bulk(
        &self,
        actor: &AuthUser,
        request: BulkAssignRequest,
    ) -> Result<BulkAssignmentOutcome, ServiceError> {
        if request.order_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "No orders given for bulk assignment".into(),
            ));
        }
        self.check_fleet(request.truck_id, request.driver_id).await?;

        let mut outcome = BulkAssignmentOutcome {
            assigned: 0,
            skipped: 0,
        };

        for order_id in &request.order_ids {
            let single = AssignDeliveryRequest {
                order_id: *order_id,
                truck_id: request.truck_id,
                driver_id: request.driver_id,
                scheduled_at: request.scheduled_at,
            };
            match self.assign_checked(actor, &single).await {
                Ok(assigned) => {
                    outcome.assigned += 1;
                    self.event_sender
                        .send_or_log(Event::DeliveryAssigned {
                            delivery_id: assigned.id,
                            order_id: assigned.order_id,
                            truck_id: assigned.truck_id,
                            driver_id: assigned.driver_id,
                        })
                        .await;
                }
                Err(ServiceError::DatabaseError(e)) => {
                    // Infrastructure failure: stop here, but everything
                    // assigned so far stays assigned.
                    return Err(ServiceError::DatabaseError(e));
                }
                Err(reason) => {
                    warn!(order_id = %order_id, reason = %reason, "Skipping order in bulk assignment");
                    outcome.skipped += 1;
                }
            }
        }

        info!(
            assigned = outcome.assigned,
            skipped = outcome.skipped,
            "Bulk assignment finished"
        );

        self.audit
            .record(
                actor.id,
                "deliveries",
                request.truck_id,
                "ASSIGN_BULK",
                Some(format!("assigned:{} skipped:{}", outcome.assigned, outcome.skipped)),
            )
            .await;

        Ok(outcome)
    }

    /// Driver-side status updates. `Entregado` confirms the delivery through
    /// the fulfillment state machine; `Cancelado` cancels the order. An
    /// incident kind records a `delivery_incidents` row alongside.
    #[instrument(skip(self, actor), fields(delivery_id = %delivery_id))]
    pub async fn update_status(
        &self,
        actor: &AuthUser,
        delivery_id: Uuid,
        request: UpdateDeliveryStatusRequest,
    ) -> Result<delivery::Model, ServiceError> {
        let existing = DeliveryEntity::find_by_id(delivery_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Delivery {} not found", delivery_id)))?;

        let requested = DeliveryStatus::from_str(&request.status).map_err(|_| {
            ServiceError::ValidationError(format!("Unknown delivery status: {}", request.status))
        })?;

        match requested {
            DeliveryStatus::Entregado => {
                self.fulfillment.confirm_delivered(existing.order_id, actor).await?;
            }
            DeliveryStatus::Cancelado => {
                self.fulfillment
                    .cancel(existing.order_id, request.note.clone(), actor)
                    .await?;
            }
            DeliveryStatus::Reprogramado => {
                return Err(ServiceError::InvalidStatus(
                    "Rescheduling goes through the returns workflow".into(),
                ));
            }
            DeliveryStatus::Despachado => {
                return Err(ServiceError::InvalidStatus(
                    "Deliveries are dispatched through assignment".into(),
                ));
            }
        }

        // Incidents only accompany transitions that were actually applied.
        if let Some(kind) = &request.incident_kind {
            delivery_incident::ActiveModel {
                id: Set(Uuid::new_v4()),
                delivery_id: Set(delivery_id),
                kind: Set(kind.clone()),
                note: Set(request.note.clone()),
                created_at: Set(Utc::now()),
            }
            .insert(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        }

        DeliveryEntity::find_by_id(delivery_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Delivery {} not found", delivery_id)))
    }

    pub async fn get_delivery(&self, delivery_id: Uuid) -> Result<delivery::Model, ServiceError> {
        DeliveryEntity::find_by_id(delivery_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Delivery {} not found", delivery_id)))
    }

    pub async fn list_deliveries(
        &self,
        filter: DeliveryListFilter,
    ) -> Result<Vec<delivery::Model>, ServiceError> {
        let mut query = DeliveryEntity::find().order_by_desc(delivery::Column::CreatedAt);
        if let Some(truck_id) = filter.truck_id {
            query = query.filter(delivery::Column::TruckId.eq(truck_id));
        }
        if let Some(driver_id) = filter.driver_id {
            query = query.filter(delivery::Column::DriverId.eq(driver_id));
        }
        if let Some(status) = filter.status {
            DeliveryStatus::from_str(&status).map_err(|_| {
                ServiceError::ValidationError(format!("Unknown delivery status: {}", status))
            })?;
            query = query.filter(delivery::Column::Status.eq(status));
        }

        query.all(&*self.db).await.map_err(ServiceError::DatabaseError)
    }

    /// Validates the truck and driver once per call.
    async fn check_fleet(&self, truck_id: Uuid, driver_id: Uuid) -> Result<(), ServiceError> {
        let truck = truck::Entity::find_by_id(truck_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Truck {} not found", truck_id)))?;
        if !truck.is_active {
            return Err(ServiceError::ValidationError(format!(
                "Truck {} is inactive",
                truck.plate
            )));
        }

        let driver = driver::Entity::find_by_id(driver_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Driver {} not found", driver_id)))?;
        if !driver.is_active {
            return Err(ServiceError::ValidationError(format!(
                "Driver {} is inactive",
                driver.name
            )));
        }

        Ok(())
    }

    /// One order's assignment in its own transaction.
    async fn assign_checked(
        &self,
        actor: &AuthUser,
        request: &AssignDeliveryRequest,
    ) -> Result<delivery::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = OrderEntity::find_by_id(request.order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", request.order_id))
            })?;

        let status = OrderStatus::from_str(&order.status).map_err(|_| {
            ServiceError::InternalError(format!("Corrupt order status: {}", order.status))
        })?;
        if status != OrderStatus::Pendiente {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is {} and cannot be dispatched",
                order.id, status
            )));
        }

        let existing = DeliveryEntity::find()
            .filter(delivery::Column::OrderId.eq(request.order_id))
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        let assigned = match existing {
            Some(current) => {
                let current_status = DeliveryStatus::from_str(&current.status).map_err(|_| {
                    ServiceError::InternalError(format!("Corrupt delivery status: {}", current.status))
                })?;
                if matches!(
                    current_status,
                    DeliveryStatus::Despachado | DeliveryStatus::Entregado
                ) {
                    return Err(ServiceError::Conflict(format!(
                        "Order {} already has an active delivery",
                        request.order_id
                    )));
                }

                // Refresh the dormant delivery left behind by a return or a
                // cancellation instead of inserting a second row.
                let mut active: delivery::ActiveModel = current.into();
                active.truck_id = Set(request.truck_id);
                active.driver_id = Set(request.driver_id);
                active.status = Set(DeliveryStatus::Despachado.to_string());
                active.scheduled_at = Set(request.scheduled_at);
                active.delivered_at = Set(None);
                active.updated_at = Set(Some(now));
                active.update(&txn).await.map_err(ServiceError::DatabaseError)?
            }
            None => delivery::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(request.order_id),
                truck_id: Set(request.truck_id),
                driver_id: Set(request.driver_id),
                status: Set(DeliveryStatus::Despachado.to_string()),
                scheduled_at: Set(request.scheduled_at),
                delivered_at: Set(None),
                created_at: Set(now),
                updated_at: Set(None),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?,
        };

        self.fulfillment
            .apply_transition(
                &txn,
                order,
                OrderStatus::Despachado,
                Some("Asignado a camión".to_string()),
                actor,
            )
            .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %request.order_id, delivery_id = %assigned.id, "Order dispatched");

        Ok(assigned)
    }
}
