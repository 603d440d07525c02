//! Cache key shapes. Entity rows, secondary index lookups and query
//! results are cached under separate namespaces per tenant and table,
//! so invalidation can clear a table's entries by prefix.

use std::hash::Hasher;

use fnv::FnvHasher;

use crate::backend::shard::Param;
use crate::routing::TenantId;

/// `"{tenant}:e:{table}:{pk}"`
pub fn entity(tenant: &TenantId, table: &str, pk: &str) -> String {
    format!("{}:e:{}:{}", tenant, table, pk)
}

/// `"{tenant}:i:{table}:{index}:{val}"`
pub fn index(tenant: &TenantId, table: &str, index: &str, value: &str) -> String {
    format!("{}:i:{}:{}:{}", tenant, table, index, value)
}

/// `"{tenant}:q:{table}:{fingerprint}"`
pub fn query(tenant: &TenantId, table: &str, fingerprint: u64) -> String {
    format!("{}:q:{}:{:016x}", tenant, table, fingerprint)
}

pub fn query_prefix(tenant: &TenantId, table: &str) -> String {
    format!("{}:q:{}:", tenant, table)
}

pub fn entity_prefix(tenant: &TenantId, table: &str) -> String {
    format!("{}:e:{}:", tenant, table)
}

/// Stable fingerprint of a statement and its parameters.
pub fn fingerprint(sql: &str, params: &[Param]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(sql.as_bytes());
    if !params.is_empty() {
        hasher.write(&serde_json::to_vec(params).unwrap_or_default());
    }
    hasher.finish()
}
