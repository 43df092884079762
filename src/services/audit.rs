//! Generic audit side-channel.
//!
//! Every mutating core operation appends a `{action, entity, entity_id,
//! detail}` row here. The trail is advisory: a failed write is logged and
//! swallowed so it can never fail the operation that produced it.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tracing::warn;
use uuid::Uuid;

use crate::entities::audit_entry;

#[derive(Clone)]
pub struct AuditTrail {
    db: Arc<DatabaseConnection>,
}

impl AuditTrail {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Best-effort append of an audit entry.
    pub async fn record(
        &self,
        actor_id: Uuid,
        entity: &str,
        entity_id: impl ToString,
        action: &str,
        detail: Option<String>,
    ) {
        let entry = audit_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            entity: Set(entity.to_string()),
            entity_id: Set(entity_id.to_string()),
            action: Set(action.to_string()),
            detail: Set(detail),
            user_id: Set(actor_id),
            created_at: Set(Utc::now()),
        };

        if let Err(e) = entry.insert(&*self.db).await {
            warn!(entity = entity, action = action, error = %e, "Failed to write audit entry");
        }
    }
}
