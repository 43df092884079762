pub mod audit;
pub mod deliveries;
pub mod directory;
pub mod fulfillment;
pub mod inventory;
pub mod orders;
pub mod reports;
pub mod returns;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::events::EventSender;

/// Aggregated service handles shared by the HTTP layer.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: inventory::InventoryService,
    pub orders: orders::OrderService,
    pub fulfillment: fulfillment::FulfillmentService,
    pub deliveries: deliveries::DeliveryService,
    pub returns: returns::ReturnService,
    pub directory: directory::DirectoryService,
    pub reports: reports::ReportsService,
    pub audit: audit::AuditTrail,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        let audit = audit::AuditTrail::new(db.clone());
        let directory = directory::DirectoryService::new(db.clone());
        let inventory =
            inventory::InventoryService::new(db.clone(), event_sender.clone(), audit.clone());
        let fulfillment = fulfillment::FulfillmentService::new(
            db.clone(),
            inventory.clone(),
            event_sender.clone(),
            audit.clone(),
        );
        let orders = orders::OrderService::new(
            db.clone(),
            inventory.clone(),
            event_sender.clone(),
            audit.clone(),
        );
        let deliveries = deliveries::DeliveryService::new(
            db.clone(),
            fulfillment.clone(),
            event_sender.clone(),
            audit.clone(),
        );
        let returns = returns::ReturnService::new(
            db.clone(),
            inventory.clone(),
            fulfillment.clone(),
            directory.clone(),
            event_sender.clone(),
            audit.clone(),
        );
        let reports = reports::ReportsService::new(db.clone());

        Self {
            inventory,
            orders,
            fulfillment,
            deliveries,
            returns,
            directory,
            reports,
            audit,
        }
    }
}
