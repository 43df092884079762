//! In-process domain events.
//!
//! Mutating services emit an [`Event`] after their transaction commits; the
//! [`process_events`] loop consumes them on a dedicated task. Delivery is
//! best-effort: a full channel or a dead consumer must never fail the
//! operation that produced the event.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of propagating failure.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropped domain event");
        }
    }
}

/// The events emitted by the core services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderUpdated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    MovementRecorded {
        movement_id: Uuid,
        warehouse_id: Uuid,
        product_id: Uuid,
        delta: i32,
        resulting_quantity: i32,
    },
    StockBelowMinimum {
        warehouse_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        min_stock: i32,
    },
    DeliveryAssigned {
        delivery_id: Uuid,
        order_id: Uuid,
        truck_id: Uuid,
        driver_id: Uuid,
    },
    DeliveryConfirmed {
        delivery_id: Uuid,
        order_id: Uuid,
        delivered_at: DateTime<Utc>,
    },
    ReturnRecorded {
        order_id: Uuid,
        truck_id: Uuid,
        settlement_id: Uuid,
        cash_received: Decimal,
    },
}

impl Event {
    /// Stable name used for logging and downstream routing.
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated(_) => "order.created",
            Event::OrderUpdated(_) => "order.updated",
            Event::OrderStatusChanged { .. } => "order.status_changed",
            Event::MovementRecorded { .. } => "inventory.movement_recorded",
            Event::StockBelowMinimum { .. } => "inventory.stock_below_minimum",
            Event::DeliveryAssigned { .. } => "delivery.assigned",
            Event::DeliveryConfirmed { .. } => "delivery.confirmed",
            Event::ReturnRecorded { .. } => "return.recorded",
        }
    }
}

/// Consumes and reacts to domain events until the channel closes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockBelowMinimum {
                warehouse_id,
                product_id,
                quantity,
                min_stock,
            } => {
                warn!(
                    event = event.name(),
                    warehouse_id = %warehouse_id,
                    product_id = %product_id,
                    quantity,
                    min_stock,
                    "Stock fell below its minimum threshold"
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    event = event.name(),
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Order status changed"
                );
            }
            other => {
                info!(event = other.name(), payload = ?other, "Domain event");
            }
        }
    }

    error!("Event channel closed; processing loop terminated");
}
