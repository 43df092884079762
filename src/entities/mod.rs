pub mod enums;

pub mod audit_entry;
pub mod customer;
pub mod delivery;
pub mod delivery_incident;
pub mod driver;
pub mod inventory_movement;
pub mod order;
pub mod order_line;
pub mod order_status_history;
pub mod price_type;
pub mod product;
pub mod product_price;
pub mod return_settlement;
pub mod stock_level;
pub mod truck;
pub mod user;
pub mod warehouse;

pub use enums::{DeliveryStatus, MovementKind, OrderStatus};
