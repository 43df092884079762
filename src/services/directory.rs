//! Directory lookups and thin CRUD for customers, products, warehouses,
//! trucks, drivers and price types. These are simple data-access wrappers;
//! the interesting invariants live in the order/fulfillment services.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{customer, driver, price_type, product, product_price, truck, warehouse},
    errors::ServiceError,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    pub base_price: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(min = 1))]
    pub phone: String,
    pub address: Option<String>,
    pub zone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateWarehouseRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub location: Option<String>,
    #[serde(default)]
    pub is_central: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTruckRequest {
    #[validate(length(min = 1))]
    pub plate: String,
    pub capacity: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDriverRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Clone)]
pub struct DirectoryService {
    db: Arc<DatabaseConnection>,
}

impl DirectoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    // ---- products ----

    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        if request.base_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Base price must be positive".into(),
            ));
        }

        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            description: Set(request.description),
            base_price: Set(request.base_price),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::DatabaseError)
    }

    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    pub async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        product::Entity::find()
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn deactivate_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let model = self.get_product(id).await?;
        let mut active: product::ActiveModel = model.into();
        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await.map_err(ServiceError::DatabaseError)?;
        Ok(())
    }

    // ---- customers ----

    pub async fn create_customer(
        &self,
        created_by: Uuid,
        request: CreateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request.validate()?;

        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            full_name: Set(request.full_name),
            phone: Set(request.phone),
            address: Set(request.address),
            zone: Set(request.zone),
            notes: Set(request.notes),
            is_active: Set(true),
            created_by: Set(Some(created_by)),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::DatabaseError)
    }

    pub async fn get_customer(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))
    }

    pub async fn list_customers(&self) -> Result<Vec<customer::Model>, ServiceError> {
        customer::Entity::find()
            .order_by_asc(customer::Column::FullName)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    // ---- warehouses ----

    pub async fn create_warehouse(
        &self,
        request: CreateWarehouseRequest,
    ) -> Result<warehouse::Model, ServiceError> {
        request.validate()?;

        warehouse::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            location: Set(request.location),
            is_central: Set(request.is_central),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::DatabaseError)
    }

    pub async fn get_warehouse(&self, id: Uuid) -> Result<warehouse::Model, ServiceError> {
        warehouse::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Warehouse {} not found", id)))
    }

    pub async fn list_warehouses(&self) -> Result<Vec<warehouse::Model>, ServiceError> {
        warehouse::Entity::find()
            .order_by_asc(warehouse::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Default destination for returned goods.
    ///
    /// The warehouse flagged `is_central` wins; when none is flagged the
    /// oldest warehouse stands in, so returns keep working on partially
    /// configured directories.
    pub async fn central_warehouse<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<warehouse::Model, ServiceError> {
        if let Some(central) = warehouse::Entity::find()
            .filter(warehouse::Column::IsCentral.eq(true))
            .order_by_asc(warehouse::Column::CreatedAt)
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
        {
            return Ok(central);
        }

        warehouse::Entity::find()
            .order_by_asc(warehouse::Column::CreatedAt)
            .order_by_asc(warehouse::Column::Id)
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound("No warehouses configured".into()))
    }

    // ---- trucks / drivers ----

    pub async fn create_truck(
        &self,
        request: CreateTruckRequest,
    ) -> Result<truck::Model, ServiceError> {
        request.validate()?;

        truck::ActiveModel {
            id: Set(Uuid::new_v4()),
            plate: Set(request.plate),
            capacity: Set(request.capacity),
            is_active: Set(true),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::DatabaseError)
    }

    pub async fn list_trucks(&self) -> Result<Vec<truck::Model>, ServiceError> {
        truck::Entity::find()
            .order_by_asc(truck::Column::Plate)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn create_driver(
        &self,
        request: CreateDriverRequest,
    ) -> Result<driver::Model, ServiceError> {
        request.validate()?;

        driver::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            phone: Set(request.phone),
            is_active: Set(true),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::DatabaseError)
    }

    pub async fn list_drivers(&self) -> Result<Vec<driver::Model>, ServiceError> {
        driver::Entity::find()
            .order_by_asc(driver::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    // ---- price types ----

    pub async fn create_price_type(&self, name: String) -> Result<price_type::Model, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Price type name is required".into(),
            ));
        }

        price_type::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::DatabaseError)
    }

    pub async fn list_price_types(&self) -> Result<Vec<price_type::Model>, ServiceError> {
        price_type::Entity::find()
            .filter(price_type::Column::IsActive.eq(true))
            .order_by_asc(price_type::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Fixes the price of a product for a pricing tier.
    pub async fn set_product_price(
        &self,
        product_id: Uuid,
        price_type_id: Uuid,
        price: Decimal,
    ) -> Result<product_price::Model, ServiceError> {
        if price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError("Price must be positive".into()));
        }
        self.get_product(product_id).await?;
        price_type::Entity::find_by_id(price_type_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Price type {} not found", price_type_id))
            })?;

        if let Some(existing) = product_price::Entity::find()
            .filter(product_price::Column::ProductId.eq(product_id))
            .filter(product_price::Column::PriceTypeId.eq(price_type_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
        {
            let mut active: product_price::ActiveModel = existing.into();
            active.price = Set(price);
            active.is_active = Set(true);
            return active.update(&*self.db).await.map_err(ServiceError::DatabaseError);
        }

        product_price::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            price_type_id: Set(price_type_id),
            price: Set(price),
            is_active: Set(true),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::DatabaseError)
    }
}
