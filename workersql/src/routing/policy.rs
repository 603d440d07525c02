//! Immutable routing policies. A policy maps tenants to their owning
//! shards; tenants not explicitly mapped fall back to prefix ranges.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::Error;
use crate::backend::ShardId;

/// Opaque tenant identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where a tenant's traffic goes. During a shard split the route
/// carries mirror targets: writes land on `primary` first and are
/// mirrored to each target synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TenantRoute {
    Single { shard: ShardId },
    DualWrite { primary: ShardId, mirrors: Vec<ShardId> },
}

impl TenantRoute {
    pub fn single(shard: impl Into<ShardId>) -> Self {
        Self::Single {
            shard: shard.into(),
        }
    }

    pub fn dual_write(primary: impl Into<ShardId>, mirrors: Vec<ShardId>) -> Self {
        Self::DualWrite {
            primary: primary.into(),
            mirrors,
        }
    }

    /// The shard that serves reads and commits writes first.
    pub fn primary(&self) -> &ShardId {
        match self {
            TenantRoute::Single { shard } => shard,
            TenantRoute::DualWrite { primary, .. } => primary,
        }
    }

    pub fn mirrors(&self) -> &[ShardId] {
        match self {
            TenantRoute::Single { .. } => &[],
            TenantRoute::DualWrite { mirrors, .. } => mirrors,
        }
    }
}

/// Fallback rule for tenants without an explicit map entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRule {
    pub prefix: String,
    pub shard: ShardId,
}

/// One immutable routing version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub version: u64,
    pub tenants: IndexMap<TenantId, TenantRoute>,
    pub ranges: Vec<RangeRule>,
}

impl RoutingPolicy {
    pub fn new(ranges: Vec<RangeRule>) -> Self {
        Self {
            version: 0,
            tenants: IndexMap::new(),
            ranges,
        }
    }

    /// Resolve a tenant: direct map lookup first, then the first
    /// matching prefix range.
    pub fn resolve(&self, tenant: &TenantId) -> Result<TenantRoute, Error> {
        if let Some(route) = self.tenants.get(tenant) {
            return Ok(route.clone());
        }

        self.ranges
            .iter()
            .find(|rule| tenant.as_str().starts_with(&rule.prefix))
            .map(|rule| TenantRoute::single(rule.shard.clone()))
            .ok_or_else(|| Error::NoRoute(tenant.clone()))
    }

    /// Copy of this policy with one tenant's route replaced; the store
    /// assigns the next version on publish.
    pub fn with_route(&self, tenant: TenantId, route: TenantRoute) -> Self {
        let mut next = self.clone();
        next.tenants.insert(tenant, route);
        next
    }
}
