//! Sticky transaction sessions. BEGIN pins a server-assigned
//! transaction id to one shard; every statement carrying the id
//! traverses that binding until COMMIT, ROLLBACK or disconnect
//! releases it.

use dashmap::DashMap;
use uuid::Uuid;

use crate::backend::ShardId;
use crate::routing::TenantId;

#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub shard: ShardId,
    pub tenant: TenantId,
}

#[derive(Debug, Default)]
pub struct Sessions {
    map: DashMap<String, SessionBinding>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a new transaction to a shard. Returns the server-assigned
    /// transaction id.
    pub fn begin(&self, tenant: TenantId, shard: ShardId) -> String {
        let id = Uuid::new_v4().to_string();
        self.map.insert(id.clone(), SessionBinding { shard, tenant });
        id
    }

    pub fn get(&self, id: &str) -> Option<SessionBinding> {
        self.map.get(id).map(|binding| binding.clone())
    }

    pub fn release(&self, id: &str) -> Option<SessionBinding> {
        self.map.remove(id).map(|(_, binding)| binding)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
