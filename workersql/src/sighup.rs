//! Reload configuration on SIGHUP without a restart.

use std::path::PathBuf;

use tokio::select;
#[cfg(target_family = "unix")]
use tokio::signal::unix::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config;

pub struct Sighup {
    #[cfg(target_family = "unix")]
    sig: Signal,
}

impl Sighup {
    pub(crate) fn new() -> std::io::Result<Self> {
        #[cfg(target_family = "unix")]
        {
            let sig = signal(SignalKind::hangup())?;
            Ok(Self { sig })
        }
        #[cfg(not(target_family = "unix"))]
        Ok(Self {})
    }

    pub(crate) async fn listen(&mut self) {
        #[cfg(target_family = "unix")]
        self.sig.recv().await;

        #[cfg(not(target_family = "unix"))]
        {
            use std::time::Duration;
            use tokio::time::sleep;

            sleep(Duration::MAX).await;
        }
    }
}

/// Re-read the configuration file on every SIGHUP until shutdown.
/// A file that no longer parses keeps the running configuration.
pub async fn reload_loop(path: PathBuf, shutdown: CancellationToken) -> std::io::Result<()> {
    let mut sighup = Sighup::new()?;

    loop {
        select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = sighup.listen() => {
                match config::load(&path) {
                    Ok(_) => info!("configuration reloaded from {}", path.display()),
                    Err(err) => error!("configuration reload failed, keeping current: {}", err),
                }
            }
        }
    }
}
