use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Truck + date cash reconciliation record written by the returns workflow.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "return_settlements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub truck_id: Uuid,
    pub driver_id: Uuid,
    pub settlement_date: NaiveDate,
    pub cash_expected: Decimal,
    pub cash_received: Decimal,
    pub fuel_expense: Decimal,
    pub meal_expense: Decimal,
    pub other_expense: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::truck::Entity",
        from = "Column::TruckId",
        to = "super::truck::Column::Id"
    )]
    Truck,
    #[sea_orm(
        belongs_to = "super::driver::Entity",
        from = "Column::DriverId",
        to = "super::driver::Column::Id"
    )]
    Driver,
}

impl Related<super::truck::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Truck.def()
    }
}

impl Related<super::driver::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Driver.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
