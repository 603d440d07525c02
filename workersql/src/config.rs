//! Process-wide configuration.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;

pub use workersql_config::{Config, Error};

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Current configuration snapshot.
pub fn config() -> Arc<Config> {
    CONFIG.load().clone()
}

/// Load the configuration file from disk.
pub fn load(path: &Path) -> Result<Arc<Config>, Error> {
    let config = Config::load(path)?;
    Ok(set(config))
}

/// Swap in a new configuration.
pub fn set(config: Config) -> Arc<Config> {
    let config = Arc::new(config);
    CONFIG.store(config.clone());
    config
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut next = Config::default();
        next.general.port = 4242;
        set(next);
        assert_eq!(config().general.port, 4242);
    }
}
