//! Administer the gateway. Privileged endpoints parse operator
//! commands into handlers that run against the live controller,
//! policy store, breakers and cache.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{Row, ShardClient};
use crate::cache::Cache;
use crate::routing::PolicyStore;
use crate::split::SplitController;

pub mod error;
pub mod invalidate;
pub mod parser;
pub mod prelude;
pub mod row;
pub mod show_breakers;
pub mod show_policy;
pub mod show_splits;
pub mod show_stats;
pub mod show_version;
pub mod split;

pub use error::Error;
pub use parser::ParseResult;

/// Everything an admin command may touch.
pub struct AdminContext {
    pub controller: Arc<SplitController>,
    pub policy: Arc<dyn PolicyStore>,
    pub client: ShardClient,
    pub cache: Cache,
}

/// All admin commands implement this trait.
#[async_trait]
pub trait Command: Sized {
    /// Execute the command and return result rows.
    async fn execute(&self, context: &AdminContext) -> Result<Vec<Row>, Error>;
    /// Command name.
    fn name(&self) -> String;
    /// Parse the command text and construct a handler.
    fn parse(sql: &str) -> Result<Self, Error>;
}

#[cfg(test)]
mod tests;
