//! Embedded schema migrations, run at startup when `auto_migrate` is set.

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_users_table::Migration),
            Box::new(m20250301_000002_create_directory_tables::Migration),
            Box::new(m20250301_000003_create_inventory_tables::Migration),
            Box::new(m20250301_000004_create_order_tables::Migration),
            Box::new(m20250301_000005_create_logistics_tables::Migration),
            Box::new(m20250301_000006_create_audit_table::Migration),
        ]
    }
}

mod m20250301_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Name,
        Email,
        PasswordHash,
        IsActive,
        CreatedAt,
    }
}

mod m20250301_000002_create_directory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_directory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Customers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Customers::FullName).string().not_null())
                        .col(ColumnDef::new(Customers::Phone).string().not_null())
                        .col(ColumnDef::new(Customers::Address).string().null())
                        .col(ColumnDef::new(Customers::Zone).string().null())
                        .col(ColumnDef::new(Customers::Notes).string().null())
                        .col(
                            ColumnDef::new(Customers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Customers::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Customers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).string().null())
                        .col(
                            ColumnDef::new(Products::BasePrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PriceTypes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(PriceTypes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(PriceTypes::Name).string().not_null())
                        .col(
                            ColumnDef::new(PriceTypes::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(PriceTypes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductPrices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductPrices::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductPrices::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductPrices::PriceTypeId).uuid().not_null())
                        .col(
                            ColumnDef::new(ProductPrices::Price)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductPrices::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_prices_product")
                                .from(ProductPrices::Table, ProductPrices::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_prices_price_type")
                                .from(ProductPrices::Table, ProductPrices::PriceTypeId)
                                .to(PriceTypes::Table, PriceTypes::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_product_prices_pair")
                        .table(ProductPrices::Table)
                        .col(ProductPrices::ProductId)
                        .col(ProductPrices::PriceTypeId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Warehouses::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Warehouses::Name).string().not_null())
                        .col(ColumnDef::new(Warehouses::Location).string().null())
                        .col(
                            ColumnDef::new(Warehouses::IsCentral)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Warehouses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Trucks::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Trucks::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Trucks::Plate).string().not_null().unique_key())
                        .col(ColumnDef::new(Trucks::Capacity).integer().null())
                        .col(
                            ColumnDef::new(Trucks::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Drivers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Drivers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Drivers::Name).string().not_null())
                        .col(ColumnDef::new(Drivers::Phone).string().null())
                        .col(
                            ColumnDef::new(Drivers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Drivers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Trucks::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductPrices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PriceTypes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Customers {
        Table,
        Id,
        FullName,
        Phone,
        Address,
        Zone,
        Notes,
        IsActive,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Description,
        BasePrice,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PriceTypes {
        Table,
        Id,
        Name,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductPrices {
        Table,
        Id,
        ProductId,
        PriceTypeId,
        Price,
        IsActive,
    }

    #[derive(DeriveIden)]
    pub(super) enum Warehouses {
        Table,
        Id,
        Name,
        Location,
        IsCentral,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Trucks {
        Table,
        Id,
        Plate,
        Capacity,
        IsActive,
    }

    #[derive(DeriveIden)]
    pub(super) enum Drivers {
        Table,
        Id,
        Name,
        Phone,
        IsActive,
    }
}

mod m20250301_000003_create_inventory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLevels::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockLevels::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(StockLevels::WarehouseId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockLevels::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::MinStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One aggregate row per (warehouse, product) pair
            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_levels_pair")
                        .table(StockLevels::Table)
                        .col(StockLevels::WarehouseId)
                        .col(StockLevels::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryMovements::Kind).string().not_null())
                        .col(ColumnDef::new(InventoryMovements::OrderId).uuid().null())
                        .col(ColumnDef::new(InventoryMovements::Note).string().null())
                        .col(
                            ColumnDef::new(InventoryMovements::CreatedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_movements_pair")
                        .table(InventoryMovements::Table)
                        .col(InventoryMovements::WarehouseId)
                        .col(InventoryMovements::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_movements_order")
                        .table(InventoryMovements::Table)
                        .col(InventoryMovements::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockLevels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockLevels {
        Table,
        Id,
        WarehouseId,
        ProductId,
        Quantity,
        MinStock,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryMovements {
        Table,
        Id,
        WarehouseId,
        ProductId,
        Quantity,
        Kind,
        OrderId,
        Note,
        CreatedBy,
        CreatedAt,
    }
}

mod m20250301_000004_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000004_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::DeliveryAddress).string().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string().null())
                        .col(
                            ColumnDef::new(Orders::Priority)
                                .string()
                                .not_null()
                                .default("Normal"),
                        )
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(ColumnDef::new(Orders::ScheduledDate).date().null())
                        .col(ColumnDef::new(Orders::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::UpdatedBy).uuid().null())
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderLines::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(OrderLines::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderLines::UnitPrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLines::PriceTypeId).uuid().null())
                        .col(
                            ColumnDef::new(OrderLines::Discount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_order")
                                .from(OrderLines::Table, OrderLines::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_lines_order")
                        .table(OrderLines::Table)
                        .col(OrderLines::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderStatusHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderStatusHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderStatusHistory::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderStatusHistory::Status).string().not_null())
                        .col(ColumnDef::new(OrderStatusHistory::Note).string().null())
                        .col(
                            ColumnDef::new(OrderStatusHistory::CreatedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderStatusHistory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_status_history_order")
                                .from(OrderStatusHistory::Table, OrderStatusHistory::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_status_history_order")
                        .table(OrderStatusHistory::Table)
                        .col(OrderStatusHistory::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderStatusHistory::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        CustomerId,
        DeliveryAddress,
        Status,
        PaymentMethod,
        Priority,
        Notes,
        ScheduledDate,
        CreatedBy,
        CreatedAt,
        UpdatedBy,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderLines {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        UnitPrice,
        PriceTypeId,
        Discount,
    }

    #[derive(DeriveIden)]
    enum OrderStatusHistory {
        Table,
        Id,
        OrderId,
        Status,
        Note,
        CreatedBy,
        CreatedAt,
    }
}

mod m20250301_000005_create_logistics_tables {
    use sea_orm_migration::prelude::*;

    use super::m20250301_000002_create_directory_tables::{Drivers, Trucks};
    use super::m20250301_000004_create_order_tables::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000005_create_logistics_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Deliveries::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Deliveries::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Deliveries::OrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Deliveries::TruckId).uuid().not_null())
                        .col(ColumnDef::new(Deliveries::DriverId).uuid().not_null())
                        .col(ColumnDef::new(Deliveries::Status).string().not_null())
                        .col(
                            ColumnDef::new(Deliveries::ScheduledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_deliveries_order")
                                .from(Deliveries::Table, Deliveries::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_deliveries_truck")
                                .from(Deliveries::Table, Deliveries::TruckId)
                                .to(Trucks::Table, Trucks::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_deliveries_driver")
                                .from(Deliveries::Table, Deliveries::DriverId)
                                .to(Drivers::Table, Drivers::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_deliveries_truck")
                        .table(Deliveries::Table)
                        .col(Deliveries::TruckId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DeliveryIncidents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryIncidents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryIncidents::DeliveryId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryIncidents::Kind).string().not_null())
                        .col(ColumnDef::new(DeliveryIncidents::Note).string().null())
                        .col(
                            ColumnDef::new(DeliveryIncidents::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_delivery_incidents_delivery")
                                .from(DeliveryIncidents::Table, DeliveryIncidents::DeliveryId)
                                .to(Deliveries::Table, Deliveries::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnSettlements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnSettlements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnSettlements::TruckId).uuid().not_null())
                        .col(ColumnDef::new(ReturnSettlements::DriverId).uuid().not_null())
                        .col(
                            ColumnDef::new(ReturnSettlements::SettlementDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnSettlements::CashExpected)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnSettlements::CashReceived)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnSettlements::FuelExpense)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ReturnSettlements::MealExpense)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ReturnSettlements::OtherExpense)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ReturnSettlements::CreatedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnSettlements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_settlements_truck")
                                .from(ReturnSettlements::Table, ReturnSettlements::TruckId)
                                .to(Trucks::Table, Trucks::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_return_settlements_truck_date")
                        .table(ReturnSettlements::Table)
                        .col(ReturnSettlements::TruckId)
                        .col(ReturnSettlements::SettlementDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReturnSettlements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(DeliveryIncidents::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Deliveries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Deliveries {
        Table,
        Id,
        OrderId,
        TruckId,
        DriverId,
        Status,
        ScheduledAt,
        DeliveredAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum DeliveryIncidents {
        Table,
        Id,
        DeliveryId,
        Kind,
        Note,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ReturnSettlements {
        Table,
        Id,
        TruckId,
        DriverId,
        SettlementDate,
        CashExpected,
        CashReceived,
        FuelExpense,
        MealExpense,
        OtherExpense,
        CreatedBy,
        CreatedAt,
    }
}

mod m20250301_000006_create_audit_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000006_create_audit_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AuditEntries::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AuditEntries::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(AuditEntries::Entity).string().not_null())
                        .col(ColumnDef::new(AuditEntries::EntityId).string().not_null())
                        .col(ColumnDef::new(AuditEntries::Action).string().not_null())
                        .col(ColumnDef::new(AuditEntries::Detail).string().null())
                        .col(ColumnDef::new(AuditEntries::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(AuditEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_audit_entries_entity")
                        .table(AuditEntries::Table)
                        .col(AuditEntries::Entity)
                        .col(AuditEntries::EntityId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AuditEntries {
        Table,
        Id,
        Entity,
        EntityId,
        Action,
        Detail,
        UserId,
        CreatedAt,
    }
}
