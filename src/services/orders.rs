//! Order admission and pricing.
//!
//! Admission is gated by availability alone; no inventory moves until
//! delivery is confirmed. Stock already promised to open orders counts
//! against availability, so admission cannot oversell a product even though
//! nothing is reserved in the ledger. The whole pipeline for a create or an
//! update runs in one transaction so a failed check never leaves a partial
//! order behind.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    db::{FilterBuilder, QueryBuilder},
    entities::{
        customer,
        enums::OrderStatus,
        order::{self, Entity as OrderEntity},
        order_line,
        order_status_history,
        product, product_price,
    },
    errors::{ServiceError, StockShortage},
    events::{Event, EventSender},
    services::{audit::AuditTrail, inventory::InventoryService},
};

fn default_priority() -> String {
    "Normal".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Line quantity must be positive"))]
    pub quantity: i32,
    /// Pricing tier reference; when present the (product, tier) price must
    /// exist, there is no fallback to the caller price.
    pub price_type_id: Option<Uuid>,
    /// Caller-supplied unit price, used only without a price type.
    pub unit_price: Option<Decimal>,
    /// Per-unit discount subtracted from the resolved price.
    #[serde(default)]
    pub discount: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "Delivery address is required"))]
    pub delivery_address: String,
    pub payment_method: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub notes: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    #[validate(length(min = 1, message = "Order must include at least one line"))]
    pub lines: Vec<OrderLineRequest>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderRequest {
    #[validate(length(min = 1, message = "Delivery address is required"))]
    pub delivery_address: String,
    pub payment_method: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub notes: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    #[validate(length(min = 1, message = "Order must include at least one line"))]
    pub lines: Vec<OrderLineRequest>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub lines: Vec<order_line::Model>,
    pub history: Vec<order_status_history::Model>,
}

/// Filters accepted by the order listing.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct OrderListFilter {
    pub status: Option<String>,
    pub customer_id: Option<Uuid>,
}

/// A validated line with its price frozen.
#[derive(Debug, Clone)]
struct PricedLine {
    product_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
    price_type_id: Option<Uuid>,
    discount: Decimal,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    event_sender: EventSender,
    audit: AuditTrail,
}

impl OrderService {
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

    /// Creates an order in `Pendiente` after validating availability and
    /// resolving line prices. Fails atomically with the full shortage list
    /// when any product cannot cover its required quantity.
    #[instrument(skip(self, actor, request), fields(customer_id = %request.customer_id))]
    pub async fn create_order(
        &self,
        actor: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        customer::Entity::find_by_id(request.customer_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", request.customer_id))
            })?;

        let priced = self.validate_and_price(&txn, &request.lines, None).await?;

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(request.customer_id),
            delivery_address: Set(request.delivery_address),
            status: Set(OrderStatus::Pendiente.to_string()),
            payment_method: Set(request.payment_method),
            priority: Set(request.priority),
            notes: Set(request.notes),
            scheduled_date: Set(request.scheduled_date),
            created_by: Set(actor.id),
            created_at: Set(now),
            updated_by: Set(None),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        self.insert_lines(&txn, order_id, &priced).await?;

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(OrderStatus::Pendiente.to_string()),
            note: Set(Some("Pedido creado".to_string())),
            created_by: Set(actor.id),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order_id, lines = priced.len(), "Order admitted");

        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;
        self.audit
            .record(actor.id, "orders", order_id, "CREATE", None)
            .await;

        self.get_order(order_id).await
    }

    /// Re-runs the admission pipeline and replaces every line.
    ///
    /// Terminal orders are immutable; their frozen prices must survive.
    #[instrument(skip(self, actor, request), fields(order_id = %order_id))]
    pub async fn update_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let existing = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let status = OrderStatus::from_str(&existing.status)
            .map_err(|_| ServiceError::InternalError(format!("Corrupt status: {}", existing.status)))?;
        if status.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is {} and can no longer be edited",
                order_id, status
            )));
        }

        let priced = self
            .validate_and_price(&txn, &request.lines, Some(order_id))
            .await?;

        order_line::Entity::delete_many()
            .filter(order_line::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        self.insert_lines(&txn, order_id, &priced).await?;

        let mut active: order::ActiveModel = existing.into();
        active.delivery_address = Set(request.delivery_address);
        active.payment_method = Set(request.payment_method);
        active.priority = Set(request.priority);
        active.notes = Set(request.notes);
        active.scheduled_date = Set(request.scheduled_date);
        active.updated_by = Set(Some(actor.id));
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await.map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order_id, "Order updated");

        self.event_sender.send_or_log(Event::OrderUpdated(order_id)).await;
        self.audit
            .record(actor.id, "orders", order_id, "UPDATE", None)
            .await;

        self.get_order(order_id).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let history = order_status_history::Entity::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(OrderDetails {
            order,
            lines,
            history,
        })
    }

    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        if let Some(status) = &filter.status {
            OrderStatus::from_str(status).map_err(|_| {
                ServiceError::ValidationError(format!("Unknown order status: {}", status))
            })?;
        }

        let mut builder = QueryBuilder::<OrderEntity>::new()
            .paginate(page, limit)
            .order_by(order::Column::CreatedAt, true);

        let condition = FilterBuilder::new()
            .add_eq_opt(order::Column::Status, filter.status)
            .add_eq_opt(order::Column::CustomerId, filter.customer_id)
            .build();
        if let Some(condition) = condition {
            builder = builder.filter(condition);
        }

        builder
            .execute(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Sum of line quantities already committed to open orders, per product.
    ///
    /// Admission has no reservation records; instead the stock already
    /// promised to `Pendiente` and `Despachado` orders counts against
    /// availability, so two orders cannot both claim the same units.
    async fn pending_demand<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_ids: &[Uuid],
        exclude_order: Option<Uuid>,
    ) -> Result<HashMap<Uuid, i64>, ServiceError> {
        let mut query = order_line::Entity::find()
            .filter(order_line::Column::ProductId.is_in(product_ids.to_vec()))
            .join(JoinType::InnerJoin, order_line::Relation::Order.def())
            .filter(order::Column::Status.is_in([
                OrderStatus::Pendiente.to_string(),
                OrderStatus::Despachado.to_string(),
            ]));
        if let Some(exclude) = exclude_order {
            query = query.filter(order_line::Column::OrderId.ne(exclude));
        }

        let lines = query.all(conn).await.map_err(ServiceError::DatabaseError)?;

        let mut demand: HashMap<Uuid, i64> = HashMap::new();
        for line in lines {
            *demand.entry(line.product_id).or_insert(0) += line.quantity as i64;
        }
        Ok(demand)
    }

    /// Shared admission pipeline: validates lines, checks aggregate
    /// availability against open demand and freezes unit prices.
    async fn validate_and_price<C: ConnectionTrait>(
        &self,
        conn: &C,
        lines: &[OrderLineRequest],
        exclude_order: Option<Uuid>,
    ) -> Result<Vec<PricedLine>, ServiceError> {
        let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        for line in lines {
            let product = products.get(&line.product_id).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Unknown product {} in order lines",
                    line.product_id
                ))
            })?;
            if !product.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "Product '{}' is inactive",
                    product.name
                )));
            }
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Invalid quantity for product '{}'",
                    product.name
                )));
            }
            if line.discount < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Negative discount for product '{}'",
                    product.name
                )));
            }
        }

        // Required quantity per product across all lines of the order.
        let mut required: HashMap<Uuid, i64> = HashMap::new();
        for line in lines {
            *required.entry(line.product_id).or_insert(0) += line.quantity as i64;
        }

        let product_id_list: Vec<Uuid> = required.keys().copied().collect();
        let demand = self
            .pending_demand(conn, &product_id_list, exclude_order)
            .await?;

        let mut shortages = Vec::new();
        for (product_id, needed) in &required {
            let outstanding = demand.get(product_id).copied().unwrap_or(0);
            let total_required = outstanding + *needed;
            let available = self.inventory.aggregate_available(conn, *product_id).await?;
            if available < total_required {
                let name = products
                    .get(product_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                shortages.push(StockShortage {
                    product_id: *product_id,
                    name,
                    available,
                    required: total_required,
                });
            }
        }
        if !shortages.is_empty() {
            shortages.sort_by(|a, b| a.name.cmp(&b.name));
            return Err(ServiceError::InsufficientStock(shortages));
        }

        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let product = &products[&line.product_id];

            let base = match line.price_type_id {
                Some(price_type_id) => {
                    let mapped = product_price::Entity::find()
                        .filter(product_price::Column::ProductId.eq(line.product_id))
                        .filter(product_price::Column::PriceTypeId.eq(price_type_id))
                        .filter(product_price::Column::IsActive.eq(true))
                        .one(conn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;

                    // A missing mapping is a hard error, never a silent
                    // fallback to the base or caller price.
                    mapped
                        .ok_or_else(|| {
                            ServiceError::ValidationError(format!(
                                "No active price for product '{}' under the requested price type",
                                product.name
                            ))
                        })?
                        .price
                }
                None => {
                    let price = line.unit_price.ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "Missing unit price for product '{}'",
                            product.name
                        ))
                    })?;
                    if price <= Decimal::ZERO {
                        return Err(ServiceError::ValidationError(format!(
                            "Unit price for product '{}' must be positive",
                            product.name
                        )));
                    }
                    price
                }
            };

            let frozen = (base - line.discount).max(Decimal::ZERO);
            priced.push(PricedLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: frozen,
                price_type_id: line.price_type_id,
                discount: line.discount,
            });
        }

        Ok(priced)
    }

    async fn insert_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        lines: &[PricedLine],
    ) -> Result<(), ServiceError> {
        for line in lines {
            order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                price_type_id: Set(line.price_type_id),
                discount: Set(line.discount),
            }
            .insert(conn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        }
        Ok(())
    }
}
