// Submodules
pub mod auth;
pub mod breaker;
pub mod cache;
pub mod core;
pub mod error;
pub mod general;
pub mod limits;
pub mod networking;
pub mod shards;
pub mod url;

pub use auth::{ApiToken, Auth, Jwt};
pub use breaker::Breaker;
pub use cache::CacheSettings;
pub use core::Config;
pub use error::Error;
pub use general::General;
pub use limits::Limits;
pub use networking::Networking;
pub use shards::{Shard, Sharding, TenantRange};
pub use url::Dsn;
