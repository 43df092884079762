//! Advisory reporting queries.
//!
//! These reads are not transactionally isolated from concurrent writes;
//! eventual consistency is acceptable here. Every filter travels as a bound
//! parameter through typed predicates.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    db::FilterBuilder,
    entities::{
        delivery, driver,
        enums::OrderStatus,
        order::{self, Entity as OrderEntity},
        order_line, product, stock_level, truck, warehouse,
    },
    errors::ServiceError,
};

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct SalesReportFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DailySales {
    pub day: NaiveDate,
    pub total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: String,
    pub total: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WarehouseStockRow {
    pub warehouse: String,
    pub product: String,
    pub quantity: i32,
    pub min_stock: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FleetPerformanceRow {
    pub plate: String,
    pub driver: String,
    pub total_deliveries: u64,
}

#[derive(Clone)]
pub struct ReportsService {
    db: Arc<DatabaseConnection>,
}

impl ReportsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Sales totals per day over the order creation date.
    pub async fn sales_by_day(
        &self,
        filter: SalesReportFilter,
    ) -> Result<Vec<DailySales>, ServiceError> {
        if let Some(status) = &filter.status {
            OrderStatus::from_str(status).map_err(|_| {
                ServiceError::ValidationError(format!("Unknown order status: {}", status))
            })?;
        }

        let mut builder = FilterBuilder::new().add_eq_opt(order::Column::Status, filter.status);
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            let start = from.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
            let end = to
                .succ_opt()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc());
            if let (Some(start), Some(end)) = (start, end) {
                builder = builder
                    .add_between(order::Column::CreatedAt, start, end);
            }
        }

        let mut query = OrderEntity::find();
        if let Some(condition) = builder.build() {
            query = query.filter(condition);
        }
        let orders = query.all(&*self.db).await.map_err(ServiceError::DatabaseError)?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let day_by_order: HashMap<Uuid, NaiveDate> = orders
            .iter()
            .map(|o| (o.id, o.created_at.date_naive()))
            .collect();

        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.is_in(day_by_order.keys().copied().collect::<Vec<_>>()))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut totals: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for line in lines {
            if let Some(day) = day_by_order.get(&line.order_id) {
                *totals.entry(*day).or_insert(Decimal::ZERO) +=
                    line.unit_price * Decimal::from(line.quantity);
            }
        }

        Ok(totals
            .into_iter()
            .map(|(day, total)| DailySales { day, total })
            .collect())
    }

    /// Order counts per status.
    pub async fn orders_by_status(&self) -> Result<Vec<StatusCount>, ServiceError> {
        let orders = OrderEntity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for o in orders {
            *counts.entry(o.status).or_insert(0) += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(status, total)| StatusCount { status, total })
            .collect())
    }

    /// Delivery counts per status.
    pub async fn deliveries_by_status(&self) -> Result<Vec<StatusCount>, ServiceError> {
        let deliveries = delivery::Entity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for d in deliveries {
            *counts.entry(d.status).or_insert(0) += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(status, total)| StatusCount { status, total })
            .collect())
    }

    /// Current stock per warehouse and product, with thresholds.
    pub async fn stock_by_warehouse(&self) -> Result<Vec<WarehouseStockRow>, ServiceError> {
        let levels = stock_level::Entity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let warehouses: HashMap<Uuid, String> = warehouse::Entity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(|w| (w.id, w.name))
            .collect();
        let products: HashMap<Uuid, String> = product::Entity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut rows: Vec<WarehouseStockRow> = levels
            .into_iter()
            .map(|l| WarehouseStockRow {
                warehouse: warehouses.get(&l.warehouse_id).cloned().unwrap_or_default(),
                product: products.get(&l.product_id).cloned().unwrap_or_default(),
                quantity: l.quantity,
                min_stock: l.min_stock,
            })
            .collect();
        rows.sort_by(|a, b| a.warehouse.cmp(&b.warehouse).then(a.product.cmp(&b.product)));

        Ok(rows)
    }

    /// Delivery counts per truck and driver pair, busiest first.
    pub async fn fleet_performance(&self) -> Result<Vec<FleetPerformanceRow>, ServiceError> {
        let deliveries = delivery::Entity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let trucks: HashMap<Uuid, String> = truck::Entity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(|t| (t.id, t.plate))
            .collect();
        let drivers: HashMap<Uuid, String> = driver::Entity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect();

        let mut counts: HashMap<(Uuid, Uuid), u64> = HashMap::new();
        for d in deliveries {
            *counts.entry((d.truck_id, d.driver_id)).or_insert(0) += 1;
        }

        let mut rows: Vec<FleetPerformanceRow> = counts
            .into_iter()
            .map(|((truck_id, driver_id), total_deliveries)| FleetPerformanceRow {
                plate: trucks.get(&truck_id).cloned().unwrap_or_default(),
                driver: drivers.get(&driver_id).cloned().unwrap_or_default(),
                total_deliveries,
            })
            .collect();
        rows.sort_by(|a, b| b.total_deliveries.cmp(&a.total_deliveries));

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sales_filter_accepts_known_status() {
        // Pure validation path; the status parse happens before any query.
        assert!(OrderStatus::from_str("Pendiente").is_ok());
        assert!(OrderStatus::from_str("EnCamino").is_err());
    }
}
