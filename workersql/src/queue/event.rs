use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::routing::TenantId;

/// Bus events. Base keys `{tenant}:{table}` expand to the query and
/// entity prefixes at consumption time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Invalidate {
        tenant: TenantId,
        tables: Vec<String>,
    },
}

impl Event {
    pub fn invalidate(tenant: TenantId, tables: Vec<String>) -> Self {
        Self::Invalidate { tenant, tables }
    }
}

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub attempts: u32,
    pub event: Event,
}

impl QueueMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            attempts: 0,
            event,
        }
    }
}
