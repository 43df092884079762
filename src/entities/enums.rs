//! Domain enumerations persisted as their wire strings.
//!
//! Order and delivery states keep the Spanish names used throughout the
//! business; they are stored verbatim in the `status` columns and on the API.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Lifecycle of a sales order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    EnumIter, ToSchema,
)]
pub enum OrderStatus {
    Pendiente,
    Despachado,
    Entregado,
    Cancelado,
    Reprogramado,
}

impl OrderStatus {
    /// Terminal states admit no further ledger activity.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Entregado | OrderStatus::Cancelado)
    }
}

/// Lifecycle of a delivery, mirroring the order it carries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    EnumIter, ToSchema,
)]
pub enum DeliveryStatus {
    Despachado,
    Entregado,
    Cancelado,
    Reprogramado,
}

/// Kind of an inventory ledger movement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    EnumIter, ToSchema,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MovementKind {
    In,
    Out,
    Return,
    Adjustment,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn order_status_round_trips_through_wire_string() {
        for status in [
            OrderStatus::Pendiente,
            OrderStatus::Despachado,
            OrderStatus::Entregado,
            OrderStatus::Cancelado,
            OrderStatus::Reprogramado,
        ] {
            let parsed = OrderStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn movement_kind_uses_uppercase_wire_strings() {
        assert_eq!(MovementKind::Out.to_string(), "OUT");
        assert_eq!(MovementKind::Return.to_string(), "RETURN");
        assert_eq!(MovementKind::from_str("ADJUSTMENT").unwrap(), MovementKind::Adjustment);
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Entregado.is_terminal());
        assert!(OrderStatus::Cancelado.is_terminal());
        assert!(!OrderStatus::Pendiente.is_terminal());
        assert!(!OrderStatus::Reprogramado.is_terminal());
    }
}
