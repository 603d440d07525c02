use std::env;
use std::fs::read_to_string;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Auth, Breaker, CacheSettings, Error, General, Limits, Networking, Shard, Sharding};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub breaker: Breaker,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub networking: Networking,
    #[serde(default)]
    pub sharding: Sharding,
    #[serde(default)]
    pub shards: Vec<Shard>,
}

impl Config {
    /// Load the configuration file from disk and apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text =
            read_to_string(path).map_err(|err| Error::Io(path.to_path_buf(), err))?;
        let mut config: Config = toml::from_str(&text)?;
        config.apply_env();
        config.check()?;
        Ok(config)
    }

    /// Validate cross-section constraints.
    pub fn check(&self) -> Result<(), Error> {
        let mut names = std::collections::BTreeSet::new();
        for shard in &self.shards {
            if !names.insert(shard.name.as_str()) {
                return Err(Error::DuplicateShard(shard.name.clone()));
            }
        }

        for range in &self.sharding.ranges {
            if !names.contains(range.shard.as_str()) {
                return Err(Error::UnknownShard(
                    range.prefix.clone(),
                    range.shard.clone(),
                ));
            }
        }

        if let Some(count) = self.sharding.shard_count {
            if count != self.shards.len() {
                warn!(
                    "shard_count is {} but {} shards are configured",
                    count,
                    self.shards.len()
                );
            }
        }

        if self.limits.max_ops == 0 || self.limits.max_bytes == 0 {
            return Err(Error::Invalid("batch limits must be non-zero".into()));
        }

        Ok(())
    }

    /// Operator environment overrides. `DEFAULT_CACHE_TTL` and
    /// `DEFAULT_CACHE_SWR` are aliases applied only when the primary
    /// variable is absent.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_u64("CACHE_TTL_MS").or_else(|| env_u64("DEFAULT_CACHE_TTL")) {
            self.cache.ttl_ms = v;
        }
        if let Some(v) = env_u64("CACHE_SWR_MS").or_else(|| env_u64("DEFAULT_CACHE_SWR")) {
            self.cache.swr_ms = v;
        }
        if let Some(v) = env_u64("MAX_OPS") {
            self.limits.max_ops = v as usize;
        }
        if let Some(v) = env_u64("MAX_BYTES") {
            self.limits.max_bytes = v as usize;
        }
        if let Some(v) = env_u64("AUDIT_RETENTION_DAYS") {
            self.limits.audit_retention_days = v;
        }
        if let Some(v) = env_u64("SHARD_COUNT") {
            self.sharding.shard_count = Some(v as usize);
        }
        if let Some(v) = env_u64("MAX_SHARD_SIZE_GB") {
            self.sharding.max_shard_size_gb = v;
        }
        if let Ok(v) = env::var("ENFORCE_HTTPS") {
            self.networking.enforce_https = matches!(v.as_str(), "1" | "true" | "yes");
        }
        for (var, list) in [
            ("ALLOW_COUNTRIES", &mut self.networking.allow_countries),
            ("BLOCK_COUNTRIES", &mut self.networking.block_countries),
            ("ALLOW_IPS", &mut self.networking.allow_ips),
            ("BLOCK_IPS", &mut self.networking.block_ips),
        ] {
            if let Ok(v) = env::var(var) {
                *list = v
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
    }

    /// Look up a shard endpoint by name.
    pub fn shard(&self, name: &str) -> Option<&Shard> {
        self.shards.iter().find(|s| s.name == name)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
